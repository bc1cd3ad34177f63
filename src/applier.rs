//! Annotation Applier
//!
//! One scan pass: filter candidate images through the policy, fetch exactly one word
//! per surviving image and assign the words positionally, marking each image as
//! engine-annotated. The only suspension point is the word fetch.

use crate::document::Element;
use crate::error::EngineError;
use crate::policy::select_candidates;
use crate::word_source::WordSource;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one applier pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Images considered before filtering
    pub candidates: usize,
    /// Images that received a word and the marker
    pub annotated: usize,
    /// Annotated images that were detached from the document by the time words arrived
    pub detached: usize,
    /// The words came from the fallback branch
    pub used_fallback: bool,
}

/// Assigns generated alternative text to images that need it
#[derive(Clone)]
pub struct AnnotationApplier {
    word_source: Arc<dyn WordSource>,
    marker_attribute: String,
}

impl AnnotationApplier {
    pub fn new(word_source: Arc<dyn WordSource>, marker_attribute: impl Into<String>) -> Self {
        Self {
            word_source,
            marker_attribute: marker_attribute.into(),
        }
    }

    pub fn marker_attribute(&self) -> &str {
        &self.marker_attribute
    }

    /// Annotate the candidates that need it.
    ///
    /// Returns without a word fetch when nothing survives filtering. Fails only when
    /// the word source breaks its contract by returning the wrong number of words,
    /// in which case no image is touched.
    pub async fn apply(
        &self,
        candidates: &[Element],
        overwrite_existing: bool,
    ) -> Result<ApplyReport, EngineError> {
        let selected = select_candidates(candidates, &self.marker_attribute, overwrite_existing);
        let mut report = ApplyReport {
            candidates: candidates.len(),
            ..ApplyReport::default()
        };

        if selected.is_empty() {
            debug!(candidates = candidates.len(), "No images need annotation");
            return Ok(report);
        }

        let batch = self.word_source.fetch_words(selected.len()).await;
        report.used_fallback = batch.is_fallback();
        let words = batch.into_words();
        if words.len() != selected.len() {
            warn!(
                source = self.word_source.name(),
                requested = selected.len(),
                received = words.len(),
                "Word source returned a batch of the wrong size"
            );
            return Err(EngineError::WordCountMismatch {
                requested: selected.len(),
                received: words.len(),
            });
        }

        for (image, word) in selected.iter().zip(words) {
            // Writing to an image that left the document meanwhile is harmless
            if !image.is_connected() {
                report.detached += 1;
            }
            image.set_attribute("alt", &word);
            image.set_attribute(&self.marker_attribute, "");
            report.annotated += 1;
        }

        info!(
            candidates = report.candidates,
            annotated = report.annotated,
            fallback = report.used_fallback,
            "Annotated images"
        );
        Ok(report)
    }
}
