//! OCR provider abstraction.
//!
//! The orchestrator only sees [`OcrProvider`]; the HTTP sidecar client is the
//! production implementation and tests substitute their own.

pub mod http;

use thiserror::Error;

pub use self::http::HttpOcrClient;

/// Why an OCR round trip produced no text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OcrFailure {
    /// Connection refused, reset, timed out, or the request could not be sent.
    #[error("OCR endpoint unreachable: {0}")]
    Transport(String),

    #[error("OCR endpoint returned HTTP {status}")]
    HttpStatus { status: u16 },

    /// Body was empty or not the expected JSON shape.
    #[error("OCR response malformed: {0}")]
    MalformedBody(String),

    /// Well-formed response whose status field was not "success".
    #[error("OCR endpoint declined the image (status: {status:?})")]
    Declined { status: Option<String> },
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Extract text from raw image bytes.
    ///
    /// `Ok(None)` is a successful recognition that reported no text.
    async fn recognize(&self, image: &[u8]) -> Result<Option<String>, OcrFailure>;
}
