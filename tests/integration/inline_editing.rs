//! Integration tests for click-to-edit through a running engine

use super::test_utils::{engine_with, settle, wait_until, RecordingSource, MARKER};
use altscan::document::{Document, Element};
use altscan::editor::{EditorState, InlineEditor};
use altscan::engine::StopHandle;

async fn running_engine_with_image() -> (Document, Element, StopHandle, InlineEditor) {
    let doc = Document::new();
    let img = doc.create_element("img");
    doc.append_child(&doc.body(), &img).unwrap();
    let handle = engine_with(&doc, RecordingSource::new(), false)
        .start()
        .await
        .unwrap();
    let editor = handle.engine().editor().unwrap();
    assert_eq!(img.attribute("alt").as_deref(), Some("word1"));
    (doc, img, handle, editor)
}

#[tokio::test]
async fn test_click_opens_editor_at_pointer() {
    let (doc, img, handle, editor) = running_engine_with_image().await;

    doc.click(&img, 10.0, 20.0);

    assert_eq!(editor.state(), EditorState::Editing);
    let surface = editor.surface();
    assert!(surface.is_connected());
    assert_eq!(doc.focused_element().as_ref(), Some(surface));
    assert_eq!(surface.value(), "word1");
    assert_eq!(
        surface.attribute("style").as_deref(),
        Some("position: absolute; top: 20px; left: 10px;")
    );
    handle.stop();
}

#[tokio::test]
async fn test_enter_commits_new_alt_text() {
    let (doc, img, handle, editor) = running_engine_with_image().await;

    doc.click(&img, 10.0, 20.0);
    editor.surface().set_value("a cat");
    doc.key_down(editor.surface(), "Enter");

    wait_until(|| img.attribute("alt").as_deref() == Some("a cat")).await;
    assert!(img.has_attribute(MARKER));
    assert_eq!(editor.state(), EditorState::Idle);
    assert!(!editor.surface().is_connected());
    assert!(doc.focused_element().is_none());
    handle.stop();
}

#[tokio::test]
async fn test_escape_leaves_alt_unchanged() {
    let (doc, img, handle, editor) = running_engine_with_image().await;

    doc.click(&img, 10.0, 20.0);
    editor.surface().set_value("a dog");
    doc.key_down(editor.surface(), "Escape");
    settle().await;

    assert_eq!(img.attribute("alt").as_deref(), Some("word1"));
    assert_eq!(editor.state(), EditorState::Idle);
    assert!(!editor.surface().is_connected());
    handle.stop();
}

#[tokio::test]
async fn test_outside_click_cancels() {
    let (doc, img, handle, editor) = running_engine_with_image().await;

    doc.click(&img, 1.0, 1.0);
    editor.surface().set_value("draft");
    doc.click(&doc.body(), 300.0, 300.0);
    settle().await;

    assert_eq!(editor.state(), EditorState::Idle);
    assert_eq!(img.attribute("alt").as_deref(), Some("word1"));
    handle.stop();
}

#[tokio::test]
async fn test_clicks_inside_surface_keep_session_open() {
    let (doc, img, handle, editor) = running_engine_with_image().await;

    doc.click(&img, 1.0, 1.0);
    doc.click(editor.surface(), 2.0, 2.0);
    doc.key_down(editor.surface(), "a");

    assert_eq!(editor.state(), EditorState::Editing);
    handle.stop();
}

#[tokio::test]
async fn test_second_image_click_does_not_open_second_session() {
    let (doc, first, handle, editor) = running_engine_with_image().await;
    let second = doc.create_element("img");
    second.set_attribute("alt", "second");
    doc.append_child(&doc.body(), &second).unwrap();

    doc.click(&first, 1.0, 1.0);
    doc.click(&second, 5.0, 5.0);

    // The second activation is dropped and counts as a click outside the surface
    assert_eq!(editor.state(), EditorState::Idle);
    assert!(!editor.surface().is_connected());
    settle().await;
    assert_eq!(first.attribute("alt").as_deref(), Some("word1"));
    assert_eq!(second.attribute("alt").as_deref(), Some("second"));

    // The editor accepts a new session afterwards
    doc.click(&second, 5.0, 5.0);
    assert_eq!(editor.state(), EditorState::Editing);
    assert_eq!(editor.surface().value(), "second");
    handle.stop();
}

#[tokio::test]
async fn test_open_session_survives_stop() {
    let (doc, img, handle, editor) = running_engine_with_image().await;

    doc.click(&img, 10.0, 20.0);
    handle.stop();
    assert_eq!(editor.state(), EditorState::Editing);

    editor.surface().set_value("late edit");
    doc.key_down(editor.surface(), "Enter");
    wait_until(|| img.attribute("alt").as_deref() == Some("late edit")).await;

    // Activation is detached after stop
    doc.click(&img, 10.0, 20.0);
    assert_eq!(editor.state(), EditorState::Idle);
}

#[tokio::test]
async fn test_placeholder_alt_starts_empty() {
    let doc = Document::new();
    let img = doc.create_element("img");
    img.set_attribute("alt", "undefined");
    doc.append_child(&doc.body(), &img).unwrap();
    let handle = engine_with(&doc, RecordingSource::new(), false)
        .start()
        .await
        .unwrap();
    let editor = handle.engine().editor().unwrap();

    doc.click(&img, 0.0, 0.0);
    assert_eq!(editor.surface().value(), "");
    handle.stop();
}
