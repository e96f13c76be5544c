//! Document entity and its OCR lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Processing state of an uploaded document.
///
/// Moves forward only: `PENDING -> PROCESSING -> COMPLETED | ERROR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
        }
    }

    /// Whether a document in this state may move to `next`.
    pub fn can_advance_to(&self, next: DocumentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Error)
        )
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "ERROR" => Ok(Self::Error),
            other => Err(format!("unknown document status: {}", other)),
        }
    }
}

/// An uploaded file and what OCR made of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: i64,
    pub file_name: String,
    pub file_path: String,
    pub file_type: Option<String>,
    pub status: DocumentStatus,
    pub extracted_text: Option<String>,
    pub upload_date: DateTime<Utc>,
}

/// A document that has not been assigned an id yet.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub file_name: String,
    pub file_path: String,
    pub file_type: Option<String>,
    pub upload_date: DateTime<Utc>,
}

impl NewDocument {
    pub fn new(
        file_name: impl Into<String>,
        file_path: impl Into<String>,
        file_type: Option<String>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            file_path: file_path.into(),
            file_type,
            upload_date: Utc::now(),
        }
    }
}

impl Document {
    /// Move to `next`, refusing anything but a forward step.
    pub fn advance(&mut self, next: DocumentStatus) -> Result<(), AppError> {
        if !self.status.can_advance_to(next) {
            return Err(AppError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Record the extracted text and finish the document.
    ///
    /// `None` is kept as-is: OCR succeeded but reported no text.
    pub fn complete(&mut self, text: Option<String>) -> Result<(), AppError> {
        self.advance(DocumentStatus::Completed)?;
        self.extracted_text = text;
        Ok(())
    }
}
