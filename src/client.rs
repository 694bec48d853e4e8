//! Generation backend client with NDJSON streaming
//!
//! `POST {api_url}/generate` with `{"temp", "context"}` and read the chunked
//! body as it arrives. Line framing lives in `ndjson`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::Duration;

use crate::error::StreamError;
use crate::params::GenerationRequest;

/// Raw body chunks, exactly as the transport delivers them
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, StreamError>>;

/// Anything that can open a generation stream
#[async_trait]
pub trait GenerationSource: Send + Sync {
    async fn open(&self, request: GenerationRequest) -> Result<ChunkStream, StreamError>;
}

/// Connect timeout only. The stream itself has no client-side timeout.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// reqwest-backed source talking to the real backend
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    generate_url: String,
}

impl HttpSource {
    pub fn new(api_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            generate_url: endpoint(api_url, "generate"),
        })
    }
}

#[async_trait]
impl GenerationSource for HttpSource {
    async fn open(&self, request: GenerationRequest) -> Result<ChunkStream, StreamError> {
        let response = self
            .client
            .post(&self.generate_url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Status { status, body });
        }

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(StreamError::from));

        Ok(chunks.boxed())
    }
}

/// Join a base URL and a path without doubling slashes
pub fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Check the backend answers at all
pub async fn check_connectivity(api_url: &str) -> Result<()> {
    let client = reqwest::Client::new();
    client
        .get(api_url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .with_context(|| format!("Failed to connect to {}", api_url))?;
    Ok(())
}
