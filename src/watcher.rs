//! Change Watcher
//!
//! Observes the document body for inserted nodes and forwards newly inserted images
//! to the [`AnnotationApplier`]. Mutation records that arrive together are coalesced
//! into one batch; each non-empty batch is applied in its own task so a failing
//! batch never ends observation.

use crate::applier::AnnotationApplier;
use crate::document::{Document, Element, MutationRecord, ObserveOptions, ObserverId};
use crate::error::EngineError;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Collect the images inserted by a batch of records, in insertion order.
///
/// An inserted subtree contributes its own image descendants; an image reported
/// more than once is kept once.
pub fn inserted_images(document: &Document, records: &[MutationRecord]) -> Vec<Element> {
    let mut seen = HashSet::new();
    let mut images = Vec::new();
    for record in records {
        for node in &record.added {
            let subtree = std::iter::once(node.clone()).chain(document.descendants(node));
            for element in subtree.filter(Element::is_image) {
                if seen.insert(element.id()) {
                    images.push(element);
                }
            }
        }
    }
    images
}

/// Watches a document for inserted images
pub struct ChangeWatcher {
    document: Document,
    applier: AnnotationApplier,
    overwrite_existing: bool,
}

impl ChangeWatcher {
    pub fn new(document: Document, applier: AnnotationApplier, overwrite_existing: bool) -> Self {
        Self {
            document,
            applier,
            overwrite_existing,
        }
    }

    /// Begin observing the body subtree; must be called inside a tokio runtime
    pub fn start(self) -> Result<WatchHandle, EngineError> {
        let body = self.document.body();
        let (observer, receiver) = self
            .document
            .observe(&body, ObserveOptions { subtree: true })?;
        info!("Watching document for inserted images");

        let document = self.document.clone();
        let task = tokio::spawn(self.run(receiver));
        Ok(WatchHandle {
            document,
            observer,
            task,
        })
    }

    async fn run(self, mut receiver: mpsc::UnboundedReceiver<MutationRecord>) {
        while let Some(first) = receiver.recv().await {
            let mut records = vec![first];
            while let Ok(record) = receiver.try_recv() {
                records.push(record);
            }
            self.handle_batch(&records);
        }
        debug!("Mutation channel closed");
    }

    fn handle_batch(&self, records: &[MutationRecord]) {
        let images = inserted_images(&self.document, records);
        if images.is_empty() {
            return;
        }

        debug!(
            records = records.len(),
            images = images.len(),
            "Inserted images observed"
        );
        let applier = self.applier.clone();
        let overwrite = self.overwrite_existing;
        tokio::spawn(async move {
            if let Err(e) = applier.apply(&images, overwrite).await {
                error!(error = %e, "Failed to annotate inserted images");
            }
        });
    }
}

/// Running watcher; stopping it discards records not yet handled
pub struct WatchHandle {
    document: Document,
    observer: ObserverId,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Disconnect the observer. Batches already handed to the applier still complete.
    pub fn stop(&self) {
        if self.document.disconnect(self.observer) {
            info!("Stopped watching document");
        }
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
