//! Upload-and-OCR orchestration.
//!
//! `submit` runs the whole pipeline inline: blob write, record insert, OCR
//! call, record update. The caller waits for the OCR round trip.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::blob_store::BlobStore;
use crate::db::DocumentStore;
use crate::document::{Document, DocumentStatus, NewDocument};
use crate::error::AppError;
use crate::ocr::{OcrFailure, OcrProvider};

/// Why a document ended in `ERROR`.
#[derive(Error, Debug)]
pub enum ProcessingFailure {
    #[error(transparent)]
    Ocr(#[from] OcrFailure),

    /// OCR succeeded but the result could not be written.
    #[error("Failed to record OCR result: {0}")]
    Persist(AppError),
}

/// Result of the OCR sub-flow for one document.
#[derive(Debug)]
pub enum OcrOutcome {
    Completed(Document),
    Failed {
        document: Document,
        reason: ProcessingFailure,
    },
}

#[derive(Clone)]
pub struct DocumentService {
    store: DocumentStore,
    blobs: BlobStore,
    ocr: Arc<dyn OcrProvider>,
}

impl DocumentService {
    pub fn new(store: DocumentStore, blobs: BlobStore, ocr: Arc<dyn OcrProvider>) -> Self {
        Self { store, blobs, ocr }
    }

    /// Persist an upload, run OCR on it, and return the finished record.
    ///
    /// Storage and database failures abort. OCR failures do not; they leave
    /// the document in `ERROR`.
    pub async fn submit(
        &self,
        data: &[u8],
        original_name: &str,
        content_type: Option<&str>,
    ) -> Result<Document, AppError> {
        let path = self.blobs.store(original_name, data).await?;

        let doc = self
            .store
            .insert(NewDocument::new(
                original_name,
                path.to_string_lossy(),
                content_type.map(str::to_string),
            ))
            .await?;
        info!(
            "Created document {} for {} ({} bytes)",
            doc.id,
            original_name,
            data.len()
        );

        match self.process_ocr(doc.id, data).await? {
            OcrOutcome::Completed(doc) => Ok(doc),
            OcrOutcome::Failed { document, reason } => {
                warn!("OCR failed for document {}: {}", document.id, reason);
                Ok(document)
            }
        }
    }

    /// Drive one document from `PENDING` through OCR to a terminal status.
    ///
    /// Once the document is `PROCESSING`, every failure ends in `ERROR`. An
    /// `AppError` is returned only when even that write fails.
    pub async fn process_ocr(&self, id: i64, image: &[u8]) -> Result<OcrOutcome, AppError> {
        let mut doc = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(AppError::NotFound(id))?;

        self.transition(&mut doc, DocumentStatus::Processing).await?;

        let reason = match self.ocr.recognize(image).await {
            Ok(text) => {
                info!(
                    "Document {}: {} recognized {} chars",
                    doc.id,
                    self.ocr.name(),
                    text.as_deref().map_or(0, |t| t.chars().count())
                );
                match self.record_completed(doc, text).await {
                    Ok(doc) => return Ok(OcrOutcome::Completed(doc)),
                    Err(e) => ProcessingFailure::Persist(e),
                }
            }
            Err(reason) => ProcessingFailure::Ocr(reason),
        };

        let document = self.record_error(id).await?;
        Ok(OcrOutcome::Failed { document, reason })
    }

    async fn record_completed(
        &self,
        mut doc: Document,
        text: Option<String>,
    ) -> Result<Document, AppError> {
        doc.complete(text)?;
        self.store.update(&doc).await?;
        info!("Document {} -> {}", doc.id, doc.status);
        Ok(doc)
    }

    /// Re-read the row and mark it `ERROR`; the in-memory copy may be ahead
    /// of what was persisted.
    async fn record_error(&self, id: i64) -> Result<Document, AppError> {
        let mut doc = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(AppError::NotFound(id))?;
        self.transition(&mut doc, DocumentStatus::Error).await?;
        Ok(doc)
    }

    async fn transition(&self, doc: &mut Document, next: DocumentStatus) -> Result<(), AppError> {
        doc.advance(next)?;
        self.store.update(doc).await?;
        info!("Document {} -> {}", doc.id, next);
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Document>, AppError> {
        self.store.find_all().await
    }

    pub async fn get(&self, id: i64) -> Result<Document, AppError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(AppError::NotFound(id))
    }

    pub async fn list_by_status(&self, status: &str) -> Result<Vec<Document>, AppError> {
        self.store.find_by_status(status).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    /// Replays canned OCR results and records what it was sent.
    pub(crate) struct ScriptedOcr {
        result: Result<Option<String>, OcrFailure>,
        seen: Mutex<Vec<Vec<u8>>>,
    }

    impl ScriptedOcr {
        pub(crate) fn new(result: Result<String, OcrFailure>) -> Arc<Self> {
            Self::replaying(result.map(Some))
        }

        /// Succeeds without reporting any text.
        pub(crate) fn without_text() -> Arc<Self> {
            Self::replaying(Ok(None))
        }

        fn replaying(result: Result<Option<String>, OcrFailure>) -> Arc<Self> {
            Arc::new(Self {
                result,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl OcrProvider for ScriptedOcr {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn recognize(&self, image: &[u8]) -> Result<Option<String>, OcrFailure> {
            self.seen.lock().unwrap().push(image.to_vec());
            self.result.clone()
        }
    }

    pub(crate) fn service_with(ocr: Arc<dyn OcrProvider>) -> (DocumentService, TempDir) {
        service_on(DocumentStore::in_memory().unwrap(), ocr)
    }

    fn service_on(store: DocumentStore, ocr: Arc<dyn OcrProvider>) -> (DocumentService, TempDir) {
        let dir = tempdir().unwrap();
        let service = DocumentService::new(store, BlobStore::new(dir.path().join("uploads")), ocr);
        (service, dir)
    }

    /// A store whose `documents` table aborts any update to `status`.
    fn store_rejecting(status: &str) -> DocumentStore {
        let conn = open_memory_database().unwrap();
        conn.execute_batch(&format!(
            "CREATE TRIGGER reject_status BEFORE UPDATE ON documents
             WHEN NEW.status = '{status}'
             BEGIN SELECT RAISE(ABORT, 'status write rejected'); END;"
        ))
        .unwrap();
        DocumentStore::new(conn)
    }

    #[tokio::test]
    async fn test_submit_completes_on_success() {
        let ocr = ScriptedOcr::new(Ok("hello".to_string()));
        let (service, _dir) = service_with(ocr.clone());

        let doc = service
            .submit(b"png bytes", "scan.png", Some("image/png"))
            .await
            .unwrap();

        assert_eq!(doc.status, DocumentStatus::Completed);
        assert_eq!(doc.extracted_text.as_deref(), Some("hello"));
        assert_eq!(doc.file_name, "scan.png");
        assert_eq!(doc.file_type.as_deref(), Some("image/png"));
        assert_eq!(std::fs::read(&doc.file_path).unwrap(), b"png bytes");
        assert_eq!(ocr.seen.lock().unwrap().as_slice(), &[b"png bytes".to_vec()]);

        assert_eq!(service.get(doc.id).await.unwrap(), doc);
    }

    #[tokio::test]
    async fn test_submit_completes_without_text() {
        let (service, _dir) = service_with(ScriptedOcr::without_text());

        let doc = service.submit(b"blank page", "blank.png", None).await.unwrap();

        assert_eq!(doc.status, DocumentStatus::Completed);
        assert_eq!(doc.extracted_text, None);
        assert_eq!(service.get(doc.id).await.unwrap(), doc);
    }

    #[tokio::test]
    async fn test_submit_records_error_on_ocr_failure() {
        for failure in [
            OcrFailure::HttpStatus { status: 500 },
            OcrFailure::Declined {
                status: Some("failed".to_string()),
            },
            OcrFailure::Transport("timed out".to_string()),
        ] {
            let (service, _dir) = service_with(ScriptedOcr::new(Err(failure)));

            let doc = service.submit(b"bytes", "scan.png", None).await.unwrap();

            assert_eq!(doc.status, DocumentStatus::Error);
            assert_eq!(doc.extracted_text, None);
            assert_eq!(
                service.get(doc.id).await.unwrap().status,
                DocumentStatus::Error
            );
        }
    }

    #[tokio::test]
    async fn test_failed_result_write_falls_back_to_error() {
        let (service, _dir) = service_on(
            store_rejecting("COMPLETED"),
            ScriptedOcr::new(Ok("hello".to_string())),
        );

        let doc = service.submit(b"x", "a.png", None).await.unwrap();

        assert_eq!(doc.status, DocumentStatus::Error);
        assert_eq!(doc.extracted_text, None);
        let stored = service.get(doc.id).await.unwrap();
        assert_eq!(stored.status, DocumentStatus::Error);
        assert_eq!(stored.extracted_text, None);
    }

    #[tokio::test]
    async fn test_failed_result_write_reports_persist_reason() {
        let (service, _dir) = service_on(
            store_rejecting("COMPLETED"),
            ScriptedOcr::new(Ok("hello".to_string())),
        );
        let doc = service
            .store
            .insert(NewDocument::new("a.png", "/tmp/a.png", None))
            .await
            .unwrap();

        match service.process_ocr(doc.id, b"x").await.unwrap() {
            OcrOutcome::Failed { document, reason } => {
                assert!(matches!(
                    reason,
                    ProcessingFailure::Persist(AppError::Database(_))
                ));
                assert_eq!(document.status, DocumentStatus::Error);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unwritable_error_status_surfaces() {
        let (service, _dir) = service_on(
            store_rejecting("ERROR"),
            ScriptedOcr::new(Err(OcrFailure::HttpStatus { status: 500 })),
        );

        let err = service.submit(b"x", "a.png", None).await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }

    #[tokio::test]
    async fn test_process_ocr_reports_reason() {
        let reason = OcrFailure::MalformedBody("empty body".to_string());
        let (service, _dir) = service_with(ScriptedOcr::new(Err(reason.clone())));

        let doc = service
            .store
            .insert(NewDocument::new("a.png", "/tmp/a.png", None))
            .await
            .unwrap();

        match service.process_ocr(doc.id, b"x").await.unwrap() {
            OcrOutcome::Failed {
                document,
                reason: ProcessingFailure::Ocr(got),
            } => {
                assert_eq!(got, reason);
                assert_eq!(document.status, DocumentStatus::Error);
            }
            other => panic!("expected OCR failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_process_ocr_missing_document() {
        let (service, _dir) = service_with(ScriptedOcr::new(Ok("x".to_string())));
        let err = service.process_ocr(7, b"x").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(7)));
    }

    #[tokio::test]
    async fn test_process_ocr_refuses_reprocessing() {
        let (service, _dir) = service_with(ScriptedOcr::new(Ok("x".to_string())));
        let doc = service.submit(b"x", "a.png", None).await.unwrap();

        let err = service.process_ocr(doc.id, b"x").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert_eq!(
            service.get(doc.id).await.unwrap().status,
            DocumentStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (service, _dir) = service_with(ScriptedOcr::new(Ok("x".to_string())));
        assert!(matches!(
            service.get(123).await,
            Err(AppError::NotFound(123))
        ));
    }

    #[tokio::test]
    async fn test_submit_fails_when_storage_unwritable() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        let service = DocumentService::new(
            DocumentStore::in_memory().unwrap(),
            BlobStore::new(&blocker),
            ScriptedOcr::new(Ok("x".to_string())),
        );

        let err = service.submit(b"x", "a.png", None).await.unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let (ok_service, _dir) = service_with(ScriptedOcr::new(Ok("x".to_string())));
        let failing = DocumentService::new(
            ok_service.store.clone(),
            ok_service.blobs.clone(),
            ScriptedOcr::new(Err(OcrFailure::HttpStatus { status: 503 })),
        );

        let done = ok_service.submit(b"a", "a.png", None).await.unwrap();
        let failed = failing.submit(b"b", "b.png", None).await.unwrap();

        let completed = ok_service.list_by_status("COMPLETED").await.unwrap();
        assert_eq!(completed, vec![done.clone()]);
        assert_eq!(
            ok_service.list_by_status("ERROR").await.unwrap(),
            vec![failed.clone()]
        );
        assert!(ok_service.list_by_status("bogus").await.unwrap().is_empty());
        assert_eq!(ok_service.list().await.unwrap(), vec![done, failed]);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_are_independent() {
        let (service, _dir) = service_with(ScriptedOcr::new(Ok("text".to_string())));

        let (a, b) = tokio::join!(
            service.submit(b"first", "same.png", None),
            service.submit(b"second", "same.png", None),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.id, b.id);
        assert_ne!(a.file_path, b.file_path);
        for doc in [&a, &b] {
            assert!(matches!(
                doc.status,
                DocumentStatus::Completed | DocumentStatus::Error
            ));
        }
        assert_eq!(std::fs::read(&a.file_path).unwrap(), b"first");
        assert_eq!(std::fs::read(&b.file_path).unwrap(), b"second");
    }
}
