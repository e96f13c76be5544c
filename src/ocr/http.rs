//! JSON-over-HTTP OCR sidecar client.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{OcrFailure, OcrProvider};

#[derive(Serialize)]
struct OcrRequest<'a> {
    image: &'a str,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

/// Posts `{"image": "<base64>"}` to a configured URL.
#[derive(Clone)]
pub struct HttpOcrClient {
    url: String,
    client: Client,
    timeout: Option<Duration>,
}

impl HttpOcrClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client,
            timeout: None,
        }
    }

    /// Bound each call. Without this the request waits as long as the client allows.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl OcrProvider for HttpOcrClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn recognize(&self, image: &[u8]) -> Result<Option<String>, OcrFailure> {
        let encoded = BASE64.encode(image);

        info!(
            "HttpOcrClient: posting {} bytes ({} base64 chars) to {}",
            image.len(),
            encoded.len(),
            self.url
        );

        let mut request = self
            .client
            .post(&self.url)
            .json(&OcrRequest { image: &encoded });
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| OcrFailure::Transport(e.to_string()))?;

        if resp.status() != StatusCode::OK {
            return Err(OcrFailure::HttpStatus {
                status: resp.status().as_u16(),
            });
        }

        let raw_text = resp
            .text()
            .await
            .map_err(|e| OcrFailure::Transport(e.to_string()))?;
        debug!(
            "HttpOcrClient: raw response ({} bytes): {}",
            raw_text.len(),
            raw_text.chars().take(500).collect::<String>()
        );

        if raw_text.trim().is_empty() {
            return Err(OcrFailure::MalformedBody("empty body".to_string()));
        }

        let body: OcrResponse = serde_json::from_str(&raw_text)
            .map_err(|e| OcrFailure::MalformedBody(e.to_string()))?;

        match body.status.as_deref() {
            Some("success") => Ok(body.text),
            _ => Err(OcrFailure::Declined {
                status: body.status,
            }),
        }
    }
}
