//! Annotation Engine
//!
//! Owns the engine lifecycle (`Uninitialized -> Running -> Stopped`). Starting wires
//! the activation listener to a fresh [`InlineEditor`], activates styling, begins
//! watching for inserted images and runs one full-document scan. Stopping detaches
//! the watcher and the activation listener; work already in flight (a word fetch,
//! an open edit session) is left to finish.

use crate::applier::{AnnotationApplier, ApplyReport};
use crate::config::{AltscanConfig, WordSourceConfig, DEFAULT_MARKER_ATTRIBUTE};
use crate::document::{Document, DomEvent, EventType, Listener, ListenerId};
use crate::editor::{InlineEditor, Point};
use crate::error::EngineError;
use crate::styler::{StylesheetStyler, Styler};
use crate::watcher::{ChangeWatcher, WatchHandle};
use crate::word_source::{HttpWordSource, WordSource};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, info};

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Running,
    Stopped,
}

/// Resources attached to the document while running
struct Attachments {
    watcher: WatchHandle,
    activation: ListenerId,
    editor: InlineEditor,
}

struct EngineInner {
    document: Document,
    applier: AnnotationApplier,
    styler: Arc<dyn Styler>,
    overwrite_existing: bool,
    state: Mutex<EngineState>,
    attachments: Mutex<Option<Attachments>>,
}

impl EngineInner {
    fn detach(&self) {
        if let Some(attachments) = self.attachments.lock().take() {
            attachments.watcher.stop();
            self.document.remove_event_listener(attachments.activation);
            debug!(
                editing = attachments.editor.is_editing(),
                "Detached engine from document"
            );
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Incremental image annotation engine for one document
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn builder(document: Document) -> EngineBuilder {
        EngineBuilder::new(document)
    }

    pub fn state(&self) -> EngineState {
        *self.inner.state.lock()
    }

    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    pub fn overwrite_existing(&self) -> bool {
        self.inner.overwrite_existing
    }

    pub fn marker_attribute(&self) -> &str {
        self.inner.applier.marker_attribute()
    }

    /// The running engine's editor
    pub fn editor(&self) -> Option<InlineEditor> {
        self.inner
            .attachments
            .lock()
            .as_ref()
            .map(|a| a.editor.clone())
    }

    /// Start the engine and run the initial scan.
    ///
    /// Fails unless the engine has never been started, or with `NotRunning` when it is
    /// stopped before attaching completes. The returned handle stops it.
    pub async fn start(&self) -> Result<StopHandle, EngineError> {
        let runtime = Handle::try_current().map_err(|e| EngineError::Runtime(e.to_string()))?;
        {
            let mut state = self.inner.state.lock();
            if *state != EngineState::Uninitialized {
                return Err(EngineError::AlreadyStarted { state: *state });
            }
            *state = EngineState::Running;
        }
        info!(
            overwrite = self.inner.overwrite_existing,
            marker = self.marker_attribute(),
            "Starting annotation engine"
        );

        if let Err(e) = self.attach(runtime) {
            error!(error = %e, "Failed to start annotation engine");
            *self.inner.state.lock() = EngineState::Stopped;
            return Err(e);
        }

        let initial_report = match self.run_scan().await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Initial scan failed");
                ApplyReport::default()
            }
        };

        Ok(StopHandle {
            engine: self.clone(),
            initial_report,
        })
    }

    fn attach(&self, runtime: Handle) -> Result<(), EngineError> {
        let inner = &self.inner;
        let document = &inner.document;
        let editor = InlineEditor::new(document.clone());

        let activation = document.add_event_listener(
            &document.body(),
            EventType::Click,
            activation_listener(editor.clone(), runtime),
        )?;
        inner
            .styler
            .mark_annotated_style(document, inner.applier.marker_attribute());

        let watcher = match ChangeWatcher::new(
            document.clone(),
            inner.applier.clone(),
            inner.overwrite_existing,
        )
        .start()
        {
            Ok(watcher) => watcher,
            Err(e) => {
                document.remove_event_listener(activation);
                return Err(e);
            }
        };

        // A stop() that ran while attaching already found nothing to detach
        let mut attachments = inner.attachments.lock();
        let state = *inner.state.lock();
        if state != EngineState::Running {
            drop(attachments);
            watcher.stop();
            document.remove_event_listener(activation);
            return Err(EngineError::NotRunning { state });
        }
        *attachments = Some(Attachments {
            watcher,
            activation,
            editor,
        });
        Ok(())
    }

    /// Annotate every image currently in the document
    pub async fn scan(&self) -> Result<ApplyReport, EngineError> {
        let state = self.state();
        if state != EngineState::Running {
            return Err(EngineError::NotRunning { state });
        }
        self.run_scan().await
    }

    async fn run_scan(&self) -> Result<ApplyReport, EngineError> {
        let images = self.inner.document.images();
        debug!(images = images.len(), "Scanning document");
        self.inner
            .applier
            .apply(&images, self.inner.overwrite_existing)
            .await
    }

    /// Stop observing the document. Idempotent.
    pub fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state != EngineState::Running {
                return;
            }
            *state = EngineState::Stopped;
        }
        self.inner.detach();
        info!("Stopped annotation engine");
    }
}

/// Opens an edit session for clicked images and writes the result back
fn activation_listener(editor: InlineEditor, runtime: Handle) -> Listener {
    Arc::new(move |event: &DomEvent| {
        let DomEvent::Click { target, x, y } = event else {
            return;
        };
        if !target.is_image() {
            return;
        }
        let Some(pending) = editor.request_edit(target, Point::new(*x, *y)) else {
            return;
        };
        runtime.spawn(async move {
            let outcome = pending.await;
            outcome.write_back();
        });
    })
}

/// Returned by [`Engine::start`]
pub struct StopHandle {
    engine: Engine,
    initial_report: ApplyReport,
}

impl StopHandle {
    pub fn stop(&self) {
        self.engine.stop();
    }

    /// Result of the scan performed during start
    pub fn initial_report(&self) -> &ApplyReport {
        &self.initial_report
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

/// Builder for [`Engine`]
pub struct EngineBuilder {
    document: Document,
    overwrite_existing: bool,
    marker_attribute: String,
    word_source: Option<Arc<dyn WordSource>>,
    word_source_config: WordSourceConfig,
    styler: Option<Arc<dyn Styler>>,
}

impl EngineBuilder {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            overwrite_existing: false,
            marker_attribute: DEFAULT_MARKER_ATTRIBUTE.to_string(),
            word_source: None,
            word_source_config: WordSourceConfig::default(),
            styler: None,
        }
    }

    /// Take engine and word-source settings from a loaded configuration
    pub fn config(mut self, config: &AltscanConfig) -> Self {
        self.overwrite_existing = config.engine.overwrite_existing;
        self.marker_attribute = config.engine.marker_attribute.clone();
        self.word_source_config = config.word_source.clone();
        self
    }

    pub fn overwrite_existing(mut self, overwrite: bool) -> Self {
        self.overwrite_existing = overwrite;
        self
    }

    pub fn marker_attribute(mut self, marker: impl Into<String>) -> Self {
        self.marker_attribute = marker.into();
        self
    }

    pub fn word_source(mut self, source: Arc<dyn WordSource>) -> Self {
        self.word_source = Some(source);
        self
    }

    pub fn styler(mut self, styler: Arc<dyn Styler>) -> Self {
        self.styler = Some(styler);
        self
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        let engine_config = crate::config::EngineConfig {
            overwrite_existing: self.overwrite_existing,
            marker_attribute: self.marker_attribute,
        };
        engine_config.validate().map_err(EngineError::ConfigError)?;

        let word_source = match self.word_source {
            Some(source) => source,
            None => Arc::new(HttpWordSource::new(&self.word_source_config)?),
        };
        let styler = self
            .styler
            .unwrap_or_else(|| Arc::new(StylesheetStyler));

        Ok(Engine {
            inner: Arc::new(EngineInner {
                document: self.document,
                applier: AnnotationApplier::new(word_source, engine_config.marker_attribute),
                styler,
                overwrite_existing: engine_config.overwrite_existing,
                state: Mutex::new(EngineState::Uninitialized),
                attachments: Mutex::new(None),
            }),
        })
    }
}
