//! Integration tests for the engine lifecycle and full-document scans

use super::test_utils::{engine_with, settle, GatedSource, RecordingSource, MARKER};
use altscan::document::{Document, DocumentSnapshot, NodeSnapshot};
use altscan::engine::EngineState;
use altscan::error::EngineError;

fn document_with(alts: &[Option<&str>]) -> Document {
    let doc = Document::new();
    for alt in alts {
        let img = doc.create_element("img");
        if let Some(alt) = alt {
            img.set_attribute("alt", alt);
        }
        doc.append_child(&doc.body(), &img).unwrap();
    }
    doc
}

#[tokio::test]
async fn test_start_annotates_images_without_alt() {
    let doc = document_with(&[None, Some("a red door"), None]);
    let source = RecordingSource::new();
    let handle = engine_with(&doc, source.clone(), false).start().await.unwrap();

    let images = doc.images();
    assert_eq!(images[0].attribute("alt").as_deref(), Some("word1"));
    assert!(images[0].has_attribute(MARKER));
    assert_eq!(images[1].attribute("alt").as_deref(), Some("a red door"));
    assert!(!images[1].has_attribute(MARKER));
    assert_eq!(images[2].attribute("alt").as_deref(), Some("word2"));
    assert!(images[2].has_attribute(MARKER));

    assert_eq!(source.requests(), vec![2]);
    assert_eq!(handle.initial_report().annotated, 2);
    handle.stop();
}

#[tokio::test]
async fn test_document_without_candidates_makes_no_request() {
    let doc = document_with(&[Some("one"), Some("two")]);
    let source = RecordingSource::new();
    let handle = engine_with(&doc, source.clone(), false).start().await.unwrap();

    assert!(source.requests().is_empty());
    assert_eq!(handle.initial_report().candidates, 2);
    assert_eq!(handle.initial_report().annotated, 0);
    handle.stop();
}

#[tokio::test]
async fn test_rescan_is_idempotent() {
    let doc = document_with(&[None, None]);
    let source = RecordingSource::new();
    let engine = engine_with(&doc, source.clone(), false);
    let handle = engine.start().await.unwrap();

    let report = engine.scan().await.unwrap();
    assert_eq!(report.annotated, 0);
    assert_eq!(source.requests(), vec![2]);
    assert_eq!(doc.images()[0].attribute("alt").as_deref(), Some("word1"));
    handle.stop();
}

#[tokio::test]
async fn test_overwrite_replaces_foreign_alt_only() {
    let doc = document_with(&[Some("hand written"), None]);
    let first_run = RecordingSource::new();
    let handle = engine_with(&doc, first_run, false).start().await.unwrap();
    handle.stop();
    let images = doc.images();
    assert_eq!(images[1].attribute("alt").as_deref(), Some("word1"));

    // A second engine in overwrite mode replaces the hand-written text and keeps
    // the text the first engine generated
    let source = RecordingSource::new();
    let handle = engine_with(&doc, source.clone(), true).start().await.unwrap();
    assert_eq!(source.requests(), vec![1]);
    assert_eq!(images[0].attribute("alt").as_deref(), Some("word1"));
    assert!(images[0].has_attribute(MARKER));
    assert_eq!(images[1].attribute("alt").as_deref(), Some("word1"));
    handle.stop();
}

#[tokio::test]
async fn test_stopped_engine_rejects_scan_and_restart() {
    let doc = document_with(&[None]);
    let engine = engine_with(&doc, RecordingSource::new(), false);
    let handle = engine.start().await.unwrap();
    handle.stop();
    assert_eq!(engine.state(), EngineState::Stopped);

    assert!(matches!(
        engine.scan().await.unwrap_err(),
        EngineError::NotRunning {
            state: EngineState::Stopped
        }
    ));
    assert!(matches!(
        engine.start().await.err(),
        Some(EngineError::AlreadyStarted {
            state: EngineState::Stopped
        })
    ));
}

#[tokio::test]
async fn test_snapshot_round_trip_after_annotation() {
    let snapshot = DocumentSnapshot {
        head: vec![],
        body: vec![NodeSnapshot::new("div")
            .with_attribute("class", "gallery")
            .with_child(NodeSnapshot::new("img").with_attribute("src", "a.png"))
            .with_child(NodeSnapshot::new("IMG").with_attribute("alt", "kept"))],
    };
    let doc = Document::from_snapshot(&snapshot).unwrap();
    let handle = engine_with(&doc, RecordingSource::new(), false)
        .start()
        .await
        .unwrap();
    handle.stop();

    let out = doc.snapshot();
    let gallery = &out.body[0];
    assert_eq!(gallery.attributes.get("class").map(String::as_str), Some("gallery"));
    assert_eq!(
        gallery.children[0].attributes.get("alt").map(String::as_str),
        Some("word1")
    );
    assert!(gallery.children[0].attributes.contains_key(MARKER));
    assert_eq!(gallery.children[1].tag, "img");
    assert_eq!(
        gallery.children[1].attributes.get("alt").map(String::as_str),
        Some("kept")
    );
}

#[tokio::test]
async fn test_stop_during_initial_scan_keeps_its_writes() {
    let doc = document_with(&[None]);
    let source = GatedSource::new();
    let engine = engine_with(&doc, source.clone(), false);

    let starting = tokio::spawn({
        let engine = engine.clone();
        async move { engine.start().await.map(|handle| handle.initial_report().clone()) }
    });
    source.fetch_started().await;
    engine.stop();
    source.release();

    let report = starting.await.unwrap().unwrap();
    assert_eq!(report.annotated, 1);
    assert_eq!(engine.state(), EngineState::Stopped);
    let images = doc.images();
    let image = &images[0];
    assert_eq!(image.attribute("alt").as_deref(), Some("gated"));
    assert!(image.has_attribute(MARKER));

    // Detached: insertions after stop are not fetched for
    assert_eq!(doc.observer_count(), 0);
    doc.append_child(&doc.body(), &doc.create_element("img")).unwrap();
    settle().await;
    assert_eq!(source.requests(), vec![1]);
}
