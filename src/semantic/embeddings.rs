//! Embedding clients.
//!
//! Provides:
//! - The `EmbeddingClient` seam used by the pipeline
//! - A blocking Cohere `/v1/embed` client
//! - A retry wrapper for transient service failures

use std::fmt;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::{EmbeddingConfig, RetryConfig};

/// Cohere accepts at most 96 texts per embed call.
pub const COHERE_MAX_BATCH: usize = 96;

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// Rate limiting, server errors, timeouts and connection failures.
    #[error("Embedding service temporarily unavailable ({}): {message}", status_label(.status))]
    Transient {
        status: Option<u16>,
        message: String,
    },

    #[error("Embedding service rejected the request ({}): {message}", status_label(.status))]
    Permanent {
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("Embedding client misconfigured: {0}")]
    Config(String),
}

fn status_label(status: &Option<u16>) -> String {
    status
        .map(|s| format!("status {s}"))
        .unwrap_or_else(|| "no status".to_string())
}

impl EmbeddingError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Classify a non-success HTTP response.
    fn from_status(status: StatusCode, body: String) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
            || status.is_server_error()
        {
            Self::Transient {
                status: Some(status.as_u16()),
                message: body,
            }
        } else {
            Self::Permanent {
                status: Some(status.as_u16()),
                message: body,
            }
        }
    }

    /// Classify a transport-level failure.
    fn from_transport(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            Self::Transient {
                status,
                message: err.to_string(),
            }
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Permanent {
                status,
                message: err.to_string(),
            }
        }
    }
}

/// Maps batches of text to embedding vectors.
///
/// Implementations return one vector per input, in input order, all of the
/// same dimension.
pub trait EmbeddingClient: Send + Sync {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Name of the embedding model, used to tag stored indexes.
    fn model_name(&self) -> &str;

    /// Largest batch a single `embed` call accepts.
    fn max_batch_size(&self) -> usize {
        usize::MAX
    }

    /// Compute SHA256 hash of the model name for storage identification.
    fn model_id(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.model_name().as_bytes());
        hasher.finalize().into()
    }
}

/// API key read from the environment. Never printed.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Result<Self, EmbeddingError> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            return Err(EmbeddingError::Config("API key is empty".to_string()));
        }
        Ok(Self(key))
    }

    /// Read the key from the named environment variable.
    pub fn from_env(var: &str) -> Result<Self, EmbeddingError> {
        let value = std::env::var(var)
            .map_err(|_| EmbeddingError::Config(format!("{var} is not set")))?;
        Self::new(value)
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Blocking client for Cohere's embed endpoint.
pub struct CohereEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    input_type: String,
}

impl CohereEmbedder {
    pub fn new(api_key: &ApiKey, config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        if config.model.trim().is_empty() {
            return Err(EmbeddingError::Config("missing model name".to_string()));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.expose()))
            .map_err(|_| EmbeddingError::Config("API key is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| EmbeddingError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            input_type: config.input_type.clone(),
        })
    }

    fn request_body<'a>(&'a self, texts: &'a [&'a str]) -> EmbedRequest<'a> {
        EmbedRequest {
            texts,
            model: &self.model,
            input_type: &self.input_type,
            embedding_types: &["float"],
        }
    }
}

impl EmbeddingClient for CohereEmbedder {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        log::debug!("Requesting {} embeddings from {}", texts.len(), self.endpoint);

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&self.request_body(texts))
            .send()
            .map_err(EmbeddingError::from_transport)?;

        let status = resp.status();
        let body = resp.text().map_err(EmbeddingError::from_transport)?;

        if !status.is_success() {
            return Err(EmbeddingError::from_status(status, body));
        }

        parse_embed_response(&body, texts.len())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn max_batch_size(&self) -> usize {
        COHERE_MAX_BATCH
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [&'a str],
    model: &'a str,
    input_type: &'a str,
    embedding_types: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: EmbeddingsField,
}

/// `embeddings` is a plain list unless `embedding_types` was sent.
#[derive(Deserialize)]
#[serde(untagged)]
enum EmbeddingsField {
    ByType { float: Vec<Vec<f32>> },
    Plain(Vec<Vec<f32>>),
}

/// Parse and check an embed response body.
fn parse_embed_response(body: &str, expected: usize) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let parsed: EmbedResponse = serde_json::from_str(body)
        .map_err(|e| EmbeddingError::InvalidResponse(format!("malformed body: {e}")))?;

    let embeddings = match parsed.embeddings {
        EmbeddingsField::ByType { float } => float,
        EmbeddingsField::Plain(list) => list,
    };

    if embeddings.len() != expected {
        return Err(EmbeddingError::InvalidResponse(format!(
            "service returned {} embeddings for {} inputs",
            embeddings.len(),
            expected
        )));
    }

    let dimension = embeddings.first().map(Vec::len).unwrap_or(0);
    if expected > 0 && dimension == 0 {
        return Err(EmbeddingError::InvalidResponse("empty embedding vector".into()));
    }
    if embeddings.iter().any(|e| e.len() != dimension) {
        return Err(EmbeddingError::InvalidResponse(
            "embeddings in one response have different dimensions".into(),
        ));
    }

    Ok(embeddings)
}

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 disables retrying
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Wraps a client and retries transient errors per `RetryPolicy`.
pub struct RetryingEmbedder<E> {
    inner: E,
    policy: RetryPolicy,
}

impl<E: EmbeddingClient> RetryingEmbedder<E> {
    pub fn new(inner: E, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<E: EmbeddingClient> EmbeddingClient for RetryingEmbedder<E> {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut attempt = 0u32;
        loop {
            match self.inner.embed(texts) {
                Ok(vectors) => return Ok(vectors),
                Err(err) if err.is_transient() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    let delay = self.policy.backoff(attempt);
                    log::warn!(
                        "embedding attempt {attempt} failed: {err}; retrying in {}ms",
                        delay.as_millis()
                    );
                    thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn max_batch_size(&self) -> usize {
        self.inner.max_batch_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fails with the queued errors, then succeeds.
    struct Flaky {
        failures: Mutex<Vec<EmbeddingError>>,
        calls: AtomicUsize,
    }

    impl Flaky {
        fn new(mut failures: Vec<EmbeddingError>) -> Self {
            failures.reverse();
            Self {
                failures: Mutex::new(failures),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl EmbeddingClient for &Flaky {
        fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.failures.lock().unwrap().pop() {
                Some(err) => Err(err),
                None => Ok(texts.iter().map(|t| vec![t.len() as f32]).collect()),
            }
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    fn transient() -> EmbeddingError {
        EmbeddingError::Transient {
            status: Some(503),
            message: "unavailable".into(),
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    #[test]
    fn test_retry_recovers_from_transient_errors() {
        let flaky = Flaky::new(vec![transient(), transient()]);
        let client = RetryingEmbedder::new(&flaky, fast_policy(3));

        let vectors = client.embed(&["abc"]).unwrap();
        assert_eq!(vectors, vec![vec![3.0]]);
        assert_eq!(flaky.calls(), 3);
    }

    #[test]
    fn test_retry_escalates_after_limit() {
        let flaky = Flaky::new(vec![transient(), transient(), transient()]);
        let client = RetryingEmbedder::new(&flaky, fast_policy(2));

        let result = client.embed(&["abc"]);
        assert!(matches!(result, Err(EmbeddingError::Transient { .. })));
        assert_eq!(flaky.calls(), 3);
    }

    #[test]
    fn test_permanent_error_not_retried() {
        let flaky = Flaky::new(vec![EmbeddingError::Permanent {
            status: Some(401),
            message: "invalid api token".into(),
        }]);
        let client = RetryingEmbedder::new(&flaky, fast_policy(5));

        let result = client.embed(&["abc"]);
        assert!(matches!(result, Err(EmbeddingError::Permanent { .. })));
        assert_eq!(flaky.calls(), 1);
    }

    #[test]
    fn test_no_retry_policy_fails_immediately() {
        let flaky = Flaky::new(vec![transient()]);
        let client = RetryingEmbedder::new(&flaky, fast_policy(0));

        assert!(client.embed(&["abc"]).is_err());
        assert_eq!(flaky.calls(), 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(3000),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff(4), Duration::from_millis(3000));
        assert_eq!(policy.backoff(40), Duration::from_millis(3000));
    }

    #[test]
    fn test_status_classification() {
        let cases = [
            (StatusCode::TOO_MANY_REQUESTS, true),
            (StatusCode::INTERNAL_SERVER_ERROR, true),
            (StatusCode::SERVICE_UNAVAILABLE, true),
            (StatusCode::BAD_REQUEST, false),
            (StatusCode::UNAUTHORIZED, false),
        ];
        for (status, transient) in cases {
            let err = EmbeddingError::from_status(status, String::new());
            assert_eq!(err.is_transient(), transient, "status {status}");
        }
    }

    #[test]
    fn test_parse_typed_response() {
        let body = r#"{"id":"x","embeddings":{"float":[[0.5,1.5],[2.0,-1.0]]},"texts":["a","b"]}"#;
        let vectors = parse_embed_response(body, 2).unwrap();
        assert_eq!(vectors, vec![vec![0.5, 1.5], vec![2.0, -1.0]]);
    }

    #[test]
    fn test_parse_plain_response() {
        let body = r#"{"embeddings":[[0.25,0.75]]}"#;
        let vectors = parse_embed_response(body, 1).unwrap();
        assert_eq!(vectors, vec![vec![0.25, 0.75]]);
    }

    #[test]
    fn test_parse_count_mismatch() {
        let body = r#"{"embeddings":[[0.25,0.75]]}"#;
        let result = parse_embed_response(body, 2);
        assert!(matches!(result, Err(EmbeddingError::InvalidResponse(_))));
    }

    #[test]
    fn test_parse_ragged_dimensions() {
        let body = r#"{"embeddings":[[0.25,0.75],[1.0]]}"#;
        let result = parse_embed_response(body, 2);
        assert!(matches!(result, Err(EmbeddingError::InvalidResponse(_))));
    }

    #[test]
    fn test_parse_malformed_body() {
        let result = parse_embed_response("<html>oops</html>", 1);
        assert!(matches!(result, Err(EmbeddingError::InvalidResponse(_))));
    }

    #[test]
    fn test_api_key_debug_is_redacted() {
        let key = ApiKey::new("super-secret").unwrap();
        assert_eq!(format!("{key:?}"), "ApiKey(***)");
    }

    #[test]
    fn test_empty_api_key_rejected() {
        assert!(matches!(ApiKey::new("   "), Err(EmbeddingError::Config(_))));
    }

    #[test]
    fn test_model_id_hash_consistency() {
        use sha2::{Digest, Sha256};
        let flaky = Flaky::new(vec![]);
        let client = &flaky;

        let mut hasher = Sha256::new();
        hasher.update("flaky".as_bytes());
        let expected: [u8; 32] = hasher.finalize().into();

        assert_eq!(client.model_id(), expected);
        assert_eq!(RetryingEmbedder::new(client, fast_policy(0)).model_id(), expected);
    }

    #[test]
    fn test_request_body_shape() {
        let config = EmbeddingConfig::default();
        let key = ApiKey::new("k").unwrap();
        let client = CohereEmbedder::new(&key, &config).unwrap();

        let texts = ["hello"];
        let body = serde_json::to_value(client.request_body(&texts)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "texts": ["hello"],
                "model": "embed-english-v3.0",
                "input_type": "search_query",
                "embedding_types": ["float"],
            })
        );
    }
}
