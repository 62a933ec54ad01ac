//! HTTP transport: POSTs the generation request and reads the
//! response body as a chunked event stream.

use std::time::Duration;

use anyhow::{Context, Result};
use galley_core::GenerationRequest;

use crate::transport::{ChunkStream, GenerationTransport};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens generation streams against an HTTP endpoint. The request is
/// sent as JSON; the response body carries newline-delimited events.
pub struct HttpTransport {
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth_token: None,
        }
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }
}

#[async_trait::async_trait]
impl GenerationTransport for HttpTransport {
    async fn open(&self, request: &GenerationRequest) -> Result<Box<dyn ChunkStream>> {
        // Connect timeout only; overall stream lifetime is bounded by
        // the pipeline's own deadline.
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("building http client")?;

        let mut post = client.post(&self.endpoint).json(request);
        if let Some(token) = &self.auth_token {
            post = post.bearer_auth(token);
        }

        let response = post
            .send()
            .await
            .with_context(|| format!("opening generation stream at {}", self.endpoint))?
            .error_for_status()
            .context("generation endpoint rejected the request")?;

        Ok(Box::new(HttpStream { response }))
    }
}

struct HttpStream {
    response: reqwest::Response,
}

#[async_trait::async_trait]
impl ChunkStream for HttpStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let chunk = self
            .response
            .chunk()
            .await
            .context("reading generation stream")?;
        Ok(chunk.map(|bytes| bytes.to_vec()))
    }
}
