//! Prompt-history extraction from editor state databases.
//!
//! A state database is a single SQLite file whose schema is not known ahead
//! of time. Extraction is heuristic:
//!
//! 1. Resolve the workspace from the sibling descriptor (`workspace.json`).
//! 2. Open the database read-only and list every table.
//! 3. Scan every row. A row matches when its `key` column holds text that
//!    contains the marker (`aiService.prompts`).
//! 4. Every other text column of a matched row is decoded as a JSON array of
//!    `{text, commandType}` objects.
//!
//! Failures in steps 1–2 abandon the pass and are returned as
//! [`ExtractError`]. Failures inside a single table or column are reported to
//! the [`EventLog`] and skipped.

use percent_encoding::percent_decode_str;
use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo, ValueRef};
use std::path::{Path, PathBuf};

use crate::config::WatchConfig;
use crate::logging::{EventLog, Level};
use crate::models::RawRecord;

/// Column whose value identifies prompt-history rows.
pub const KEY_COLUMN: &str = "key";

#[derive(Debug)]
pub enum ExtractError {
    /// Descriptor missing, unreadable, or not valid JSON.
    Descriptor { path: PathBuf, reason: String },
    /// Folder URI could not be percent-decoded.
    FolderUri(String),
    /// State database could not be opened or its tables listed.
    Database { path: PathBuf, reason: String },
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Descriptor { path, reason } => {
                write!(f, "failed to read descriptor {}: {}", path.display(), reason)
            }
            ExtractError::FolderUri(e) => write!(f, "failed to decode folder URI: {}", e),
            ExtractError::Database { path, reason } => {
                write!(f, "failed to read database {}: {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for ExtractError {}

/// What to look for inside a watched directory.
#[derive(Debug, Clone)]
pub struct ExtractSettings {
    pub descriptor_file: String,
    pub marker: String,
}

impl From<&WatchConfig> for ExtractSettings {
    fn from(config: &WatchConfig) -> Self {
        Self {
            descriptor_file: config.descriptor_file.clone(),
            marker: config.marker.clone(),
        }
    }
}

/// Result of one extraction pass.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub workspace: String,
    pub records: Vec<RawRecord>,
}

#[derive(Debug, Deserialize)]
struct WorkspaceDescriptor {
    #[serde(default)]
    folder: String,
}

/// Run one extraction pass over the state database at `db_path`.
pub async fn extract_records(
    db_path: &Path,
    settings: &ExtractSettings,
    log: &dyn EventLog,
) -> Result<Extraction, ExtractError> {
    let descriptor = db_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&settings.descriptor_file);
    let workspace = read_workspace(&descriptor)?;

    let db_err = |e: sqlx::Error| ExtractError::Database {
        path: db_path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut conn = SqliteConnectOptions::new()
        .filename(db_path)
        .read_only(true)
        .disable_statement_logging()
        .connect()
        .await
        .map_err(db_err)?;

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table'")
            .fetch_all(&mut conn)
            .await
            .map_err(db_err)?;

    let mut records = Vec::new();

    for table in &tables {
        let sql = format!("SELECT * FROM {}", quote_ident(table));
        let rows = match sqlx::query(&sql).fetch_all(&mut conn).await {
            Ok(rows) => rows,
            Err(e) => {
                log.log(
                    Level::Error,
                    &format!("failed to query table {}: {}", table, e),
                );
                continue;
            }
        };

        for row in &rows {
            if !row_matches(row, &settings.marker) {
                continue;
            }
            records.extend(decode_row(row, table, log));
        }
    }

    if let Err(e) = conn.close().await {
        log.log(
            Level::Warn,
            &format!("failed to close {}: {}", db_path.display(), e),
        );
    }

    Ok(Extraction { workspace, records })
}

/// Read the descriptor and return the decoded workspace path.
pub fn read_workspace(descriptor: &Path) -> Result<String, ExtractError> {
    let descriptor_err = |reason: String| ExtractError::Descriptor {
        path: descriptor.to_path_buf(),
        reason,
    };

    let content = std::fs::read_to_string(descriptor).map_err(|e| descriptor_err(e.to_string()))?;
    let parsed: WorkspaceDescriptor =
        serde_json::from_str(&content).map_err(|e| descriptor_err(e.to_string()))?;

    decode_folder_uri(&parsed.folder)
}

/// `file:///c%3A/Users/me/proj` → `c:/Users/me/proj`,
/// `file:///home/me/my%20proj` → `/home/me/my proj`.
pub fn decode_folder_uri(folder: &str) -> Result<String, ExtractError> {
    let stripped = folder.strip_prefix("file://").unwrap_or(folder);
    let decoded = percent_decode_str(stripped)
        .decode_utf8()
        .map_err(|e| ExtractError::FolderUri(e.to_string()))?
        .into_owned();

    // Windows drive paths arrive as `/c:/...`
    let bytes = decoded.as_bytes();
    if bytes.len() >= 3 && bytes[0] == b'/' && bytes[1].is_ascii_alphabetic() && bytes[2] == b':' {
        return Ok(decoded[1..].to_string());
    }

    Ok(decoded)
}

/// Decode one column value as a JSON array of records.
pub fn decode_column(value: &str) -> Result<Vec<RawRecord>, serde_json::Error> {
    serde_json::from_str(value)
}

fn row_matches(row: &SqliteRow, marker: &str) -> bool {
    row.columns().iter().any(|col| {
        col.name() == KEY_COLUMN
            && text_value(row, col.ordinal()).is_some_and(|v| v.contains(marker))
    })
}

fn decode_row(row: &SqliteRow, table: &str, log: &dyn EventLog) -> Vec<RawRecord> {
    let mut records = Vec::new();

    for col in row.columns() {
        if col.name() == KEY_COLUMN {
            continue;
        }
        let Some(value) = text_value(row, col.ordinal()) else {
            continue;
        };

        match decode_column(&value) {
            Ok(decoded) => records.extend(decoded),
            Err(e) => log.log(
                Level::Error,
                &format!(
                    "failed to decode {}.{} as prompt list: {}",
                    table,
                    col.name(),
                    e
                ),
            ),
        }
    }

    records
}

/// The value at `index` if its runtime storage class is TEXT.
fn text_value(row: &SqliteRow, index: usize) -> Option<String> {
    let raw = row.try_get_raw(index).ok()?;
    if raw.is_null() || raw.type_info().name() != "TEXT" {
        return None;
    }
    row.try_get_unchecked::<String, _>(index).ok()
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
