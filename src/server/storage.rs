//! Section content storage.
//!
//! Keeps the latest content of every section in a single SQLite table. Each
//! write replaces the previous content; there is no history.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};

/// Longest section id accepted.
const MAX_SECTION_ID_LEN: usize = 256;

/// Errors from the section store.
#[derive(Debug)]
pub enum SectionStoreError {
    /// I/O error preparing the database location.
    IoError(PathBuf, std::io::Error),
    /// Database error.
    Database(sqlx::Error),
    /// Migration failure at startup.
    Migrate(sqlx::migrate::MigrateError),
    /// Section id is empty or too long.
    InvalidSectionId(String),
    /// Stored content could not be decoded.
    Corrupt(String, serde_json::Error),
}

impl std::fmt::Display for SectionStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SectionStoreError::IoError(path, e) => {
                write!(f, "I/O error for {}: {}", path.display(), e)
            }
            SectionStoreError::Database(e) => write!(f, "Database error: {}", e),
            SectionStoreError::Migrate(e) => write!(f, "Migration failed: {}", e),
            SectionStoreError::InvalidSectionId(id) => write!(f, "Invalid section ID: {:?}", id),
            SectionStoreError::Corrupt(id, e) => {
                write!(f, "Stored content for section {} is corrupt: {}", id, e)
            }
        }
    }
}

impl std::error::Error for SectionStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SectionStoreError::IoError(_, e) => Some(e),
            SectionStoreError::Database(e) => Some(e),
            SectionStoreError::Migrate(e) => Some(e),
            SectionStoreError::Corrupt(_, e) => Some(e),
            SectionStoreError::InvalidSectionId(_) => None,
        }
    }
}

impl From<sqlx::Error> for SectionStoreError {
    fn from(e: sqlx::Error) -> Self {
        SectionStoreError::Database(e)
    }
}

/// A section's stored content.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSection {
    pub section_id: String,
    pub content: Value,
    /// Hex SHA-256 of the stored JSON text
    pub digest: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SectionRow {
    section_id: String,
    content: String,
    digest: String,
    updated_at: String,
}

impl SectionRow {
    fn into_section(self) -> Result<StoredSection, SectionStoreError> {
        let content = serde_json::from_str(&self.content)
            .map_err(|e| SectionStoreError::Corrupt(self.section_id.clone(), e))?;
        let updated_at = DateTime::parse_from_rfc3339(&self.updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(StoredSection {
            section_id: self.section_id,
            content,
            digest: self.digest,
            updated_at,
        })
    }
}

/// Returns the hex SHA-256 digest of `text`.
fn digest_of(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct SectionStore {
    pool: SqlitePool,
}

impl SectionStore {
    /// Opens (creating if needed) the database at `db_path` and runs
    /// migrations.
    pub async fn open(db_path: &Path) -> Result<Self, SectionStoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SectionStoreError::IoError(parent.to_path_buf(), e))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(SectionStoreError::Migrate)?;

        Ok(Self { pool })
    }

    fn validate_section_id(section_id: &str) -> Result<(), SectionStoreError> {
        if section_id.trim().is_empty() || section_id.len() > MAX_SECTION_ID_LEN {
            return Err(SectionStoreError::InvalidSectionId(section_id.to_string()));
        }
        Ok(())
    }

    /// Replaces the content of a section.
    pub async fn upsert(
        &self,
        section_id: &str,
        content: &Value,
    ) -> Result<StoredSection, SectionStoreError> {
        Self::validate_section_id(section_id)?;

        let text = content.to_string();
        let digest = digest_of(&text);
        let updated_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO sections (section_id, content, digest, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(section_id) DO UPDATE SET
                content = excluded.content,
                digest = excluded.digest,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(section_id)
        .bind(&text)
        .bind(&digest)
        .bind(updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(StoredSection {
            section_id: section_id.to_string(),
            content: content.clone(),
            digest,
            updated_at,
        })
    }

    /// Loads a section.
    ///
    /// Returns `Ok(None)` if nothing has been stored for it yet.
    pub async fn get(&self, section_id: &str) -> Result<Option<StoredSection>, SectionStoreError> {
        Self::validate_section_id(section_id)?;

        let row: Option<SectionRow> = sqlx::query_as(
            "SELECT section_id, content, digest, updated_at FROM sections WHERE section_id = ?",
        )
        .bind(section_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SectionRow::into_section).transpose()
    }
}
