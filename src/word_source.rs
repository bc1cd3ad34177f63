//! Word Source Abstraction
//!
//! Supplies replacement words for images that need alternative text. A fetch never
//! fails outward: transport, status and format problems select the fallback branch
//! of [`WordBatch`], which carries `n` copies of a fixed default word.

use crate::config::WordSourceConfig;
use crate::error::{EngineError, WordSourceError};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default word provider endpoint
pub const DEFAULT_ENDPOINT: &str = "https://random-word-api.herokuapp.com/word";

/// Word used for every entry of a fallback batch
pub const DEFAULT_FALLBACK_WORD: &str = "picture";

/// Result of one word fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordBatch {
    /// Words returned by the provider
    Fetched(Vec<String>),
    /// Degraded result after a provider failure
    Fallback { words: Vec<String>, reason: String },
}

impl WordBatch {
    /// Build a fallback batch of `count` copies of `word`
    pub fn fallback(count: usize, word: &str, reason: impl Into<String>) -> Self {
        WordBatch::Fallback {
            words: vec![word.to_string(); count],
            reason: reason.into(),
        }
    }

    pub fn words(&self) -> &[String] {
        match self {
            WordBatch::Fetched(words) | WordBatch::Fallback { words, .. } => words,
        }
    }

    pub fn into_words(self) -> Vec<String> {
        match self {
            WordBatch::Fetched(words) | WordBatch::Fallback { words, .. } => words,
        }
    }

    pub fn len(&self) -> usize {
        self.words().len()
    }

    pub fn is_empty(&self) -> bool {
        self.words().is_empty()
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, WordBatch::Fallback { .. })
    }
}

/// Provider of replacement words.
///
/// Implementations must return exactly `count` words and must not issue any
/// request when `count` is zero.
#[async_trait]
pub trait WordSource: Send + Sync {
    async fn fetch_words(&self, count: usize) -> WordBatch;

    /// Short name used in logs
    fn name(&self) -> &str;
}

/// Default connect timeout for the provider, in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

fn build_http_client(config: &WordSourceConfig) -> Result<Client, EngineError> {
    let mut builder = Client::builder()
        .no_proxy()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs));
    if let Some(secs) = config.request_timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder
        .build()
        .map_err(|e| EngineError::ConfigError(format!("Failed to create HTTP client: {}", e)))
}

fn map_http_error(error: reqwest::Error) -> WordSourceError {
    if let Some(status) = error.status() {
        WordSourceError::Status(status.as_u16())
    } else if error.is_timeout() {
        WordSourceError::Transport(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        WordSourceError::Transport(format!("Connection error: {}", error))
    } else {
        WordSourceError::Transport(format!("HTTP error: {}", error))
    }
}

/// Word source backed by an HTTP random-word provider.
///
/// Issues `GET {endpoint}?number={n}` and expects a JSON array of `n` strings.
pub struct HttpWordSource {
    client: Client,
    endpoint: String,
    fallback_word: String,
}

impl HttpWordSource {
    pub fn new(config: &WordSourceConfig) -> Result<Self, EngineError> {
        Ok(Self {
            client: build_http_client(config)?,
            endpoint: config.endpoint.clone(),
            fallback_word: config.fallback_word.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request_words(&self, count: usize) -> Result<Vec<String>, WordSourceError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("number", count)])
            .send()
            .await
            .map_err(map_http_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(WordSourceError::Status(status.as_u16()));
        }

        let words: Vec<String> = response
            .json()
            .await
            .map_err(|e| WordSourceError::InvalidBody(e.to_string()))?;

        if words.len() != count {
            return Err(WordSourceError::LengthMismatch {
                requested: count,
                received: words.len(),
            });
        }
        Ok(words)
    }
}

#[async_trait]
impl WordSource for HttpWordSource {
    async fn fetch_words(&self, count: usize) -> WordBatch {
        if count == 0 {
            return WordBatch::Fetched(Vec::new());
        }

        debug!(count, endpoint = %self.endpoint, "Requesting words");
        match self.request_words(count).await {
            Ok(words) => {
                info!(count, "Fetched words from provider");
                WordBatch::Fetched(words)
            }
            Err(e) => {
                warn!(count, error = %e, "Error during fetching words. Using default instead");
                WordBatch::fallback(count, &self.fallback_word, e.to_string())
            }
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Offline word source that always answers with one word
pub struct FixedWordSource {
    word: String,
}

impl FixedWordSource {
    pub fn new(word: impl Into<String>) -> Self {
        Self { word: word.into() }
    }
}

impl Default for FixedWordSource {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_WORD)
    }
}

#[async_trait]
impl WordSource for FixedWordSource {
    async fn fetch_words(&self, count: usize) -> WordBatch {
        WordBatch::Fetched(vec![self.word.clone(); count])
    }

    fn name(&self) -> &str {
        "fixed"
    }
}
