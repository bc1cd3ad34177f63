//! Inline Alt-Text Editor
//!
//! A single reusable input surface that lets an operator override an image's
//! alternative text. The editor is a two-state machine:
//!
//! - `Idle --request_edit--> Editing`: refused while a session is open. The surface
//!   is positioned at the activation point, seeded with the current alt text and
//!   focused.
//! - `Editing --Enter--> Idle`: resolves with the surface value.
//! - `Editing --Escape | click outside the surface--> Idle`: resolves with the
//!   original text.
//!
//! Every exit detaches the session's listeners and removes the surface, including
//! when the caller drops its [`PendingEdit`] before the operator answers.

use crate::document::{Document, DomEvent, Element, EventType, ListenerId, Listener};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

pub const COMMIT_KEY: &str = "Enter";
pub const CANCEL_KEY: &str = "Escape";

/// Alt value some pages carry for "no description"
const MISSING_ALT_PLACEHOLDER: &str = "undefined";

/// Client coordinates of an activation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    Idle,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Escape,
    OutsideClick,
    /// The pending edit was dropped before the operator answered
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Committed(String),
    Cancelled(CancelReason),
}

/// Final result of one edit session
#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub target: Element,
    pub original_text: String,
    pub resolution: Resolution,
}

impl EditOutcome {
    /// Text the session resolved with; the original text when cancelled
    pub fn final_text(&self) -> &str {
        match &self.resolution {
            Resolution::Committed(text) => text,
            Resolution::Cancelled(_) => &self.original_text,
        }
    }

    /// Write the result to the target's `alt`.
    ///
    /// Only changed, non-blank text is written; the annotation marker is left as is.
    /// Returns whether a write happened.
    pub fn write_back(&self) -> bool {
        let text = self.final_text();
        if text == self.original_text || text.trim().is_empty() {
            return false;
        }
        self.target.set_attribute("alt", text);
        info!(image = ?self.target, "Operator updated alt text");
        true
    }
}

/// Text a session starts from
fn seed_text(image: &Element) -> String {
    match image.attribute("alt") {
        Some(alt) if alt != MISSING_ALT_PLACEHOLDER => alt,
        _ => String::new(),
    }
}

fn surface_style(at: Point) -> String {
    format!("position: absolute; top: {}px; left: {}px;", at.y, at.x)
}

struct EditSession {
    id: u64,
    target: Element,
    original_text: String,
    position: Point,
    listeners: Vec<ListenerId>,
    resolver: oneshot::Sender<EditOutcome>,
}

struct EditorShared {
    document: Document,
    surface: Element,
    session: Mutex<Option<EditSession>>,
    next_session: AtomicU64,
}

impl EditorShared {
    /// `Editing -> Idle`; a no-op unless `session_id` is the open session
    fn finish(&self, session_id: Option<u64>, resolution: Resolution) {
        let session = {
            let mut slot = self.session.lock();
            match slot.as_ref() {
                Some(open) if session_id.map_or(true, |id| id == open.id) => slot.take(),
                _ => None,
            }
        };
        let Some(session) = session else {
            return;
        };

        for listener in &session.listeners {
            self.document.remove_event_listener(*listener);
        }
        if self.document.focused_element().as_ref() == Some(&self.surface) {
            self.document.blur();
        }
        self.surface.remove();

        debug!(
            session = session.id,
            x = session.position.x,
            y = session.position.y,
            resolution = ?resolution,
            "Edit session closed"
        );
        let outcome = EditOutcome {
            target: session.target,
            original_text: session.original_text,
            resolution,
        };
        // The receiver is gone only when the pending edit was dropped
        let _ = session.resolver.send(outcome);
    }

    fn commit(&self) {
        let text = self.surface.value();
        self.finish(None, Resolution::Committed(text));
    }

    fn cancel(&self, reason: CancelReason) {
        self.finish(None, Resolution::Cancelled(reason));
    }
}

/// Inline editor owning one reusable input surface
#[derive(Clone)]
pub struct InlineEditor {
    shared: Arc<EditorShared>,
}

impl InlineEditor {
    pub fn new(document: Document) -> Self {
        let surface = document.create_element("input");
        Self {
            shared: Arc::new(EditorShared {
                document,
                surface,
                session: Mutex::new(None),
                next_session: AtomicU64::new(1),
            }),
        }
    }

    /// The editing surface, attached to the body only while editing
    pub fn surface(&self) -> &Element {
        &self.shared.surface
    }

    pub fn state(&self) -> EditorState {
        if self.shared.session.lock().is_some() {
            EditorState::Editing
        } else {
            EditorState::Idle
        }
    }

    pub fn is_editing(&self) -> bool {
        self.state() == EditorState::Editing
    }

    /// Open an edit session for `image` at `at`.
    ///
    /// Returns `None`, without side effects, while another session is open.
    pub fn request_edit(&self, image: &Element, at: Point) -> Option<PendingEdit> {
        let shared = &self.shared;
        let mut slot = shared.session.lock();
        if slot.is_some() {
            debug!(image = ?image, "Edit session already open, activation dropped");
            return None;
        }

        let id = shared.next_session.fetch_add(1, Ordering::Relaxed);
        let original_text = seed_text(image);
        let document = &shared.document;
        let surface = &shared.surface;

        surface.set_attribute("style", &surface_style(at));
        surface.set_value(&original_text);
        if let Err(e) = document.append_child(&document.body(), surface) {
            warn!(error = %e, "Failed to place editing surface");
            return None;
        }
        document.focus(surface);

        let weak = Arc::downgrade(shared);
        let listeners = match self.attach_listeners(&weak) {
            Some(listeners) => listeners,
            None => {
                surface.remove();
                document.blur();
                return None;
            }
        };

        let (resolver, receiver) = oneshot::channel();
        *slot = Some(EditSession {
            id,
            target: image.clone(),
            original_text: original_text.clone(),
            position: at,
            listeners,
            resolver,
        });
        info!(session = id, image = ?image, x = at.x, y = at.y, "Edit session opened");

        Some(PendingEdit {
            session_id: id,
            target: image.clone(),
            original_text,
            receiver,
            editor: Arc::clone(shared),
        })
    }

    fn attach_listeners(&self, weak: &Weak<EditorShared>) -> Option<Vec<ListenerId>> {
        let document = &self.shared.document;

        let on_key: Listener = {
            let weak = weak.clone();
            Arc::new(move |event: &DomEvent| {
                let (Some(editor), DomEvent::KeyDown { key, .. }) = (weak.upgrade(), event) else {
                    return;
                };
                match key.as_str() {
                    COMMIT_KEY => editor.commit(),
                    CANCEL_KEY => editor.cancel(CancelReason::Escape),
                    _ => {}
                }
            })
        };
        let on_outside_click: Listener = {
            let weak = weak.clone();
            Arc::new(move |event: &DomEvent| {
                let (Some(editor), DomEvent::Click { target, .. }) = (weak.upgrade(), event) else {
                    return;
                };
                if *target != editor.surface {
                    editor.cancel(CancelReason::OutsideClick);
                }
            })
        };

        let key_listener = document
            .add_event_listener(&self.shared.surface, EventType::KeyDown, on_key)
            .ok()?;
        match document.add_event_listener(&document.root(), EventType::Click, on_outside_click) {
            Ok(click_listener) => Some(vec![key_listener, click_listener]),
            Err(e) => {
                warn!(error = %e, "Failed to attach outside-click listener");
                document.remove_event_listener(key_listener);
                None
            }
        }
    }
}

/// Pending result of one edit session.
///
/// Resolves once the operator commits or cancels. Dropping it early cancels the
/// session with [`CancelReason::Abandoned`].
pub struct PendingEdit {
    session_id: u64,
    target: Element,
    original_text: String,
    receiver: oneshot::Receiver<EditOutcome>,
    editor: Arc<EditorShared>,
}

impl PendingEdit {
    pub fn target(&self) -> &Element {
        &self.target
    }

    pub fn original_text(&self) -> &str {
        &self.original_text
    }
}

impl Future for PendingEdit {
    type Output = EditOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(EditOutcome {
                target: this.target.clone(),
                original_text: this.original_text.clone(),
                resolution: Resolution::Cancelled(CancelReason::Abandoned),
            }),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PendingEdit {
    fn drop(&mut self) {
        self.editor.finish(
            Some(self.session_id),
            Resolution::Cancelled(CancelReason::Abandoned),
        );
    }
}
