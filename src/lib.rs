//! Altscan: Incremental Image Annotation
//!
//! Keeps every image in a live document carrying alternative text. Images without
//! alt text get a generated word and a marker attribute; images inserted later are
//! picked up as they appear; clicking an image opens an inline editor for its alt text.

pub mod applier;
pub mod cli;
pub mod config;
pub mod document;
pub mod editor;
pub mod engine;
pub mod error;
pub mod logging;
pub mod policy;
pub mod styler;
pub mod watcher;
pub mod word_source;

pub use applier::{AnnotationApplier, ApplyReport};
pub use document::{Document, Element};
pub use editor::{EditOutcome, InlineEditor};
pub use engine::{Engine, EngineBuilder, EngineState, StopHandle};
pub use error::EngineError;
pub use word_source::{FixedWordSource, HttpWordSource, WordBatch, WordSource};
