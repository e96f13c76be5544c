//! SQLite-backed document record store.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::document::{Document, DocumentStatus, NewDocument};
use crate::error::AppError;

const DOCUMENT_COLUMNS: &str =
    "id, file_name, file_path, file_type, status, extracted_text, upload_date";

/// Open a SQLite database at `path` and run migrations.
pub fn open_database(path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open(path)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing).
#[cfg(test)]
pub fn open_memory_database() -> Result<Connection, AppError> {
    let conn = Connection::open_in_memory()?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), AppError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![(1, include_str!("../migrations/001_documents.sql"))];

    for (version, sql) in migrations {
        if version > current_version {
            info!("Running migration v{}", version);
            conn.execute_batch(sql)?;
        }
    }

    Ok(())
}

/// Current schema version (0 before the first migration).
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}

impl ToSql for DocumentStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for DocumentStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        file_name: row.get(1)?,
        file_path: row.get(2)?,
        file_type: row.get(3)?,
        status: row.get(4)?,
        extracted_text: row.get(5)?,
        upload_date: row.get(6)?,
    })
}

// ============================================================================
// Document repository
// ============================================================================

/// Insert a new document in `PENDING` state and return it with its id.
pub fn insert_document(conn: &Connection, doc: &NewDocument) -> Result<Document, AppError> {
    conn.execute(
        "INSERT INTO documents (file_name, file_path, file_type, status, extracted_text, upload_date)
         VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
        params![
            doc.file_name,
            doc.file_path,
            doc.file_type,
            DocumentStatus::Pending,
            doc.upload_date,
        ],
    )?;

    let id = conn.last_insert_rowid();
    debug!("Inserted document {}", id);

    Ok(Document {
        id,
        file_name: doc.file_name.clone(),
        file_path: doc.file_path.clone(),
        file_type: doc.file_type.clone(),
        status: DocumentStatus::Pending,
        extracted_text: None,
        upload_date: doc.upload_date,
    })
}

/// Overwrite every mutable column of an existing document.
pub fn update_document(conn: &Connection, doc: &Document) -> Result<(), AppError> {
    let changed = conn.execute(
        "UPDATE documents
         SET file_name = ?2, file_path = ?3, file_type = ?4, status = ?5, extracted_text = ?6, upload_date = ?7
         WHERE id = ?1",
        params![
            doc.id,
            doc.file_name,
            doc.file_path,
            doc.file_type,
            doc.status,
            doc.extracted_text,
            doc.upload_date,
        ],
    )?;

    if changed == 0 {
        return Err(AppError::NotFound(doc.id));
    }
    Ok(())
}

pub fn find_document(conn: &Connection, id: i64) -> Result<Option<Document>, AppError> {
    let doc = conn
        .query_row(
            &format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS),
            params![id],
            document_from_row,
        )
        .optional()?;
    Ok(doc)
}

pub fn list_documents(conn: &Connection) -> Result<Vec<Document>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM documents ORDER BY id",
        DOCUMENT_COLUMNS
    ))?;
    let docs = stmt
        .query_map([], document_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(docs)
}

/// Exact match on the stored status string. Unknown strings match nothing.
pub fn list_documents_by_status(conn: &Connection, status: &str) -> Result<Vec<Document>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM documents WHERE status = ?1 ORDER BY id",
        DOCUMENT_COLUMNS
    ))?;
    let docs = stmt
        .query_map(params![status], document_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(docs)
}

// ============================================================================
// Shared handle
// ============================================================================

/// Connection handle shared across request handlers.
///
/// Statements run on the blocking pool; each call holds the lock for its own
/// statement only.
#[derive(Clone)]
pub struct DocumentStore {
    conn: Arc<Mutex<Connection>>,
}

impl DocumentStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn open(path: &Path) -> Result<Self, AppError> {
        Ok(Self::new(open_database(path)?))
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self, AppError> {
        Ok(Self::new(open_memory_database()?))
    }

    async fn run<T, F>(&self, f: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, AppError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&*guard)
        })
        .await?
    }

    pub async fn insert(&self, doc: NewDocument) -> Result<Document, AppError> {
        self.run(move |conn| insert_document(conn, &doc)).await
    }

    pub async fn update(&self, doc: &Document) -> Result<(), AppError> {
        let doc = doc.clone();
        self.run(move |conn| update_document(conn, &doc)).await
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Document>, AppError> {
        self.run(move |conn| find_document(conn, id)).await
    }

    pub async fn find_all(&self) -> Result<Vec<Document>, AppError> {
        self.run(list_documents).await
    }

    pub async fn find_by_status(&self, status: &str) -> Result<Vec<Document>, AppError> {
        let status = status.to_string();
        self.run(move |conn| list_documents_by_status(conn, &status)).await
    }
}
