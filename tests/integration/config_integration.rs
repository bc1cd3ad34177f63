//! Integration tests for configuration loading and config-driven engines

use super::test_utils::MARKER;
use altscan::config::ConfigLoader;
use altscan::document::Document;
use altscan::engine::Engine;
use altscan::styler::NoopStyler;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Serializes tests that touch `ALTSCAN_*` environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// An http endpoint on a port nothing listens on
fn unreachable_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/word", port)
}

#[test]
fn test_file_settings_reach_engine() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("altscan.toml");
    std::fs::write(
        &config_file,
        r#"
[engine]
overwrite_existing = true
marker_attribute = "data-generated-alt"

[word_source]
fallback_word = "image"
connect_timeout_secs = 2
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    let engine = Engine::builder(Document::new())
        .config(&config)
        .build()
        .unwrap();
    assert!(engine.overwrite_existing());
    assert_eq!(engine.marker_attribute(), "data-generated-alt");
}

#[test]
fn test_environment_overrides_file() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("altscan.toml");
    std::fs::write(&config_file, "[engine]\noverwrite_existing = false\n").unwrap();

    std::env::set_var("ALTSCAN_ENGINE__OVERWRITE_EXISTING", "true");
    let result = ConfigLoader::load_from_file(&config_file);
    std::env::remove_var("ALTSCAN_ENGINE__OVERWRITE_EXISTING");

    assert!(result.unwrap().engine.overwrite_existing);
}

#[test]
fn test_invalid_file_is_rejected() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("altscan.toml");
    std::fs::write(
        &config_file,
        "[engine]\nmarker_attribute = \"\"\n\n[word_source]\nfallback_word = \"\"\n",
    )
    .unwrap();

    let err = ConfigLoader::load_from_file(&config_file).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Marker attribute cannot be empty"), "{}", message);
    assert!(message.contains("Fallback word cannot be empty"), "{}", message);
}

#[tokio::test]
async fn test_unreachable_provider_uses_configured_fallback() {
    let config = {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("altscan.toml");
        std::fs::write(
            &config_file,
            format!(
                "[word_source]\nendpoint = \"{}\"\nfallback_word = \"image\"\n",
                unreachable_endpoint()
            ),
        )
        .unwrap();
        ConfigLoader::load_from_file(&config_file).unwrap()
    };

    let doc = Document::new();
    for _ in 0..2 {
        doc.append_child(&doc.body(), &doc.create_element("img")).unwrap();
    }
    let handle = Engine::builder(doc.clone())
        .config(&config)
        .styler(Arc::new(NoopStyler))
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    assert!(handle.initial_report().used_fallback);
    for img in doc.images() {
        assert_eq!(img.attribute("alt").as_deref(), Some("image"));
        assert!(img.has_attribute(MARKER));
    }
    handle.stop();
}
