//! Annotation Policy
//!
//! Decides whether an image needs engine-generated alternative text. The decision is
//! a pure function of the image's current attributes and the overwrite setting, so
//! it is evaluated fresh for every scan: operator edits between scans are honored.

use crate::document::Element;

/// Attribute-derived inputs to the annotation decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageState {
    /// `alt` is present and non-empty
    pub has_alt: bool,
    /// The engine's marker attribute is present
    pub is_marked: bool,
}

impl ImageState {
    /// Read the current state of `image`
    pub fn of(image: &Element, marker_attribute: &str) -> Self {
        Self {
            has_alt: image
                .attribute("alt")
                .map(|alt| !alt.is_empty())
                .unwrap_or(false),
            is_marked: image.has_attribute(marker_attribute),
        }
    }
}

/// Whether an image in `state` should receive a generated word.
///
/// Without overwrite, any non-empty alt text is left alone. With overwrite, only
/// images the engine has already marked are skipped.
pub fn needs_annotation(state: ImageState, overwrite_existing: bool) -> bool {
    let keep_author_alt = !overwrite_existing && state.has_alt;
    let keep_engine_alt = overwrite_existing && state.is_marked;
    !(keep_author_alt || keep_engine_alt)
}

/// Keep the candidates that need annotation, preserving their order
pub fn select_candidates(
    candidates: &[Element],
    marker_attribute: &str,
    overwrite_existing: bool,
) -> Vec<Element> {
    candidates
        .iter()
        .filter(|image| needs_annotation(ImageState::of(image, marker_attribute), overwrite_existing))
        .cloned()
        .collect()
}
