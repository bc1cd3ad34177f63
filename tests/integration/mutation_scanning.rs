//! Integration tests for annotation of images inserted after start

use super::test_utils::{engine_with, settle, wait_until, GatedSource, RecordingSource, MARKER};
use altscan::document::Document;

#[tokio::test]
async fn test_inserted_image_is_annotated() {
    let doc = Document::new();
    let source = RecordingSource::new();
    let handle = engine_with(&doc, source.clone(), false).start().await.unwrap();
    assert!(source.requests().is_empty());

    let img = doc.create_element("img");
    doc.append_child(&doc.body(), &img).unwrap();
    wait_until(|| img.has_attribute(MARKER)).await;

    assert_eq!(img.attribute("alt").as_deref(), Some("word1"));
    assert_eq!(source.requests(), vec![1]);
    handle.stop();
}

#[tokio::test]
async fn test_inserted_subtree_is_one_batch() {
    let doc = Document::new();
    let source = RecordingSource::new();
    let handle = engine_with(&doc, source.clone(), false).start().await.unwrap();

    let figure = doc.create_element("figure");
    let first = doc.create_element("img");
    let second = doc.create_element("img");
    let captioned = doc.create_element("img");
    captioned.set_attribute("alt", "caption");
    for img in [&first, &second, &captioned] {
        doc.append_child(&figure, img).unwrap();
    }
    doc.append_child(&doc.body(), &figure).unwrap();

    wait_until(|| first.has_attribute(MARKER) && second.has_attribute(MARKER)).await;
    assert_eq!(source.requests(), vec![2]);
    assert_eq!(captioned.attribute("alt").as_deref(), Some("caption"));
    assert!(!captioned.has_attribute(MARKER));
    handle.stop();
}

#[tokio::test]
async fn test_non_candidate_insertions_make_no_request() {
    let doc = Document::new();
    let source = RecordingSource::new();
    let handle = engine_with(&doc, source.clone(), false).start().await.unwrap();

    doc.append_child(&doc.body(), &doc.create_element("p")).unwrap();
    let described = doc.create_element("img");
    described.set_attribute("alt", "already described");
    doc.append_child(&doc.body(), &described).unwrap();
    settle().await;

    assert!(source.requests().is_empty());
    handle.stop();
}

#[tokio::test]
async fn test_insertions_after_stop_are_ignored() {
    let doc = Document::new();
    let source = RecordingSource::new();
    let handle = engine_with(&doc, source.clone(), false).start().await.unwrap();
    handle.stop();

    let img = doc.create_element("img");
    doc.append_child(&doc.body(), &img).unwrap();
    settle().await;

    assert!(source.requests().is_empty());
    assert!(img.attribute("alt").is_none());
}

#[tokio::test]
async fn test_moved_annotated_image_is_not_refetched() {
    let doc = Document::new();
    let img = doc.create_element("img");
    doc.append_child(&doc.body(), &img).unwrap();
    let source = RecordingSource::new();
    let handle = engine_with(&doc, source.clone(), false).start().await.unwrap();
    assert_eq!(source.requests(), vec![1]);

    let section = doc.create_element("section");
    doc.append_child(&doc.body(), &section).unwrap();
    doc.append_child(&section, &img).unwrap();
    settle().await;

    assert_eq!(source.requests(), vec![1]);
    assert_eq!(img.attribute("alt").as_deref(), Some("word1"));
    handle.stop();
}

#[tokio::test]
async fn test_apply_in_flight_at_stop_still_lands() {
    let doc = Document::new();
    let source = GatedSource::new();
    let handle = engine_with(&doc, source.clone(), false).start().await.unwrap();

    let img = doc.create_element("img");
    doc.append_child(&doc.body(), &img).unwrap();
    source.fetch_started().await;
    handle.stop();
    source.release();

    wait_until(|| img.has_attribute(MARKER)).await;
    assert_eq!(img.attribute("alt").as_deref(), Some("gated"));

    let later = doc.create_element("img");
    doc.append_child(&doc.body(), &later).unwrap();
    settle().await;
    assert_eq!(source.requests(), vec![1]);
    assert!(!later.has_attribute(MARKER));
}

#[tokio::test]
async fn test_image_removed_during_fetch_is_written_without_failure() {
    let doc = Document::new();
    let source = GatedSource::new();
    let handle = engine_with(&doc, source.clone(), false).start().await.unwrap();

    let img = doc.create_element("img");
    doc.append_child(&doc.body(), &img).unwrap();
    source.fetch_started().await;
    img.remove();
    source.release();

    wait_until(|| img.has_attribute(MARKER)).await;
    assert!(!img.is_connected());
    assert_eq!(img.attribute("alt").as_deref(), Some("gated"));

    // Observation continues afterwards
    let next = doc.create_element("img");
    doc.append_child(&doc.body(), &next).unwrap();
    source.fetch_started().await;
    source.release();
    wait_until(|| next.has_attribute(MARKER)).await;
    assert_eq!(source.requests(), vec![1, 1]);
    handle.stop();
}
