//! REST surface for the document service.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::document::Document;
use crate::error::AppError;
use crate::service::DocumentService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub documents: DocumentService,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/documents", get(list_documents))
        .route("/api/documents/upload", post(upload_document))
        .route("/api/documents/{id}", get(get_document))
        .route("/api/documents/status/{status}", get(list_documents_by_status))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

/// Accept a multipart upload (field `file`) and run OCR on it.
async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Document>, AppError> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await?;
            upload = Some((filename, content_type, data));
            break;
        }
    }

    let (filename, content_type, data) = upload
        .ok_or_else(|| AppError::InvalidUpload("missing multipart field 'file'".to_string()))?;

    info!(
        "Received upload: {} ({} bytes, {})",
        filename,
        data.len(),
        content_type.as_deref().unwrap_or("no content type")
    );

    state
        .documents
        .submit(&data, &filename, content_type.as_deref())
        .await
        .map(Json)
}

async fn list_documents(State(state): State<AppState>) -> Result<Json<Vec<Document>>, AppError> {
    state.documents.list().await.map(Json)
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Document>, AppError> {
    state.documents.get(id).await.map(Json)
}

async fn list_documents_by_status(
    State(state): State<AppState>,
    Path(status): Path<String>,
) -> Result<Json<Vec<Document>>, AppError> {
    state.documents.list_by_status(&status).await.map(Json)
}
