use crate::error::EmbedError;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Maps text to a fixed-length vector. Implementations may block; async
/// callers should run them on the blocking pool.
pub trait Embedder: Send + Sync {
    fn name(&self) -> String;

    /// Output length, when it is known before the first request.
    fn dimensions(&self) -> Option<usize>;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn name(&self) -> String {
        format!("char-trigram-{}", self.dimensions.max(1))
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.dimensions.max(1))
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return Ok(vector);
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        Ok(vector)
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiEmbedderConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Requested output length. When `None` the field is left out of the
    /// request and the model's native length is used.
    pub dimensions: Option<usize>,
    pub batch_size: usize,
    pub timeout: Option<Duration>,
}

/// Blocking client for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
    dimensions: Option<usize>,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiEmbedderConfig) -> Result<Self, EmbedError> {
        if config.api_key.trim().is_empty() {
            return Err(EmbedError::InvalidConfig("missing API key".to_string()));
        }
        if config.model.trim().is_empty() {
            return Err(EmbedError::InvalidConfig("missing model name".to_string()));
        }
        if config.dimensions == Some(0) {
            return Err(EmbedError::InvalidConfig(
                "dimensions must be greater than zero".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| EmbedError::InvalidConfig("invalid API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: endpoint_url(&config.base_url, "embeddings")?,
            model: config.model,
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
        })
    }

    fn request_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.dimensions,
        };
        let response = self.client.post(self.endpoint.clone()).json(&request).send()?;

        let status = response.status();
        let body = response.text()?;
        collect_embeddings(status, &body, inputs.len(), self.dimensions)
    }
}

impl Embedder for OpenAiEmbedder {
    fn name(&self) -> String {
        self.model.clone()
    }

    fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.request_batch(&[text.to_string()])?;
        vectors.pop().ok_or_else(|| EmbedError::BackendResponse {
            backend: "embeddings".to_string(),
            details: "no embedding returned".to_string(),
        })
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.request_batch(batch)?);
        }
        Ok(vectors)
    }
}

/// Decodes an `/embeddings` reply into one vector per input, in input order.
///
/// Without an expected length every vector must match the first one.
fn collect_embeddings(
    status: StatusCode,
    body: &str,
    inputs: usize,
    dimensions: Option<usize>,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    if !status.is_success() {
        return Err(backend_error(format!("{status}: {body}")));
    }

    let mut parsed: EmbeddingResponse = serde_json::from_str(body)?;
    parsed.data.sort_by_key(|entry| entry.index);
    if parsed.data.len() != inputs {
        return Err(backend_error(format!(
            "returned {} embeddings for {inputs} inputs",
            parsed.data.len()
        )));
    }

    let expected = dimensions.or_else(|| parsed.data.first().map(|entry| entry.embedding.len()));
    parsed
        .data
        .into_iter()
        .map(|entry| match expected {
            Some(expected) if entry.embedding.len() != expected => Err(backend_error(format!(
                "embedding dimension {} != {expected}",
                entry.embedding.len()
            ))),
            _ => Ok(entry.embedding),
        })
        .collect()
}

fn backend_error(details: String) -> EmbedError {
    EmbedError::BackendResponse {
        backend: "embeddings".to_string(),
        details,
    }
}

/// Joins `path` onto an OpenAI-style base URL such as `https://host/v1`.
pub(crate) fn endpoint_url(base_url: &str, path: &str) -> Result<Url, url::ParseError> {
    let base = format!("{}/", base_url.trim().trim_end_matches('/'));
    Url::parse(&base)?.join(path)
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}
