//! Annotated-image styling hook.

use crate::document::Document;
use tracing::{debug, warn};

/// Makes engine-annotated images visually distinguishable
pub trait Styler: Send + Sync {
    /// Activate styling for elements carrying `marker_attribute`
    fn mark_annotated_style(&self, document: &Document, marker_attribute: &str);
}

/// Injects one `<style>` rule keyed to the marker attribute into the document head
#[derive(Debug, Clone, Default)]
pub struct StylesheetStyler;

impl StylesheetStyler {
    pub fn rule_for(marker_attribute: &str) -> String {
        format!(
            "[{}] {{ border: .5rem solid blue; box-sizing: border-box; }}",
            marker_attribute
        )
    }
}

impl Styler for StylesheetStyler {
    fn mark_annotated_style(&self, document: &Document, marker_attribute: &str) {
        let style = document.create_element("style");
        style.set_text(&Self::rule_for(marker_attribute));
        match document.append_child(&document.head(), &style) {
            Ok(()) => debug!(marker = marker_attribute, "Injected annotated-image stylesheet"),
            Err(e) => warn!(error = %e, "Failed to inject annotated-image stylesheet"),
        }
    }
}

/// Styler that leaves the document untouched
#[derive(Debug, Clone, Default)]
pub struct NoopStyler;

impl Styler for NoopStyler {
    fn mark_annotated_style(&self, _document: &Document, _marker_attribute: &str) {}
}
