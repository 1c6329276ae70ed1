#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Occurrence record store.
//!
//! Records live in a single `ocorrencia` table, either in a local `DuckDB`
//! file ([`duckdb_store::DuckDbStore`]) or a remote `PostgreSQL` database
//! ([`pg_store::PgStore`], via `switchy_database`). Both sit behind the
//! [`OccurrenceStore`] trait; [`db::connect`] picks one from a single
//! connection URL shared by the trainer and the server.

pub mod db;
pub mod duckdb_store;
pub mod paths;
pub mod pg_store;
pub mod queries;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use siob_database_models::GroupCount;
use siob_occurrence_models::{DispatchTime, RawOccurrence};

/// Table holding one row per occurrence.
pub const OCCURRENCE_TABLE: &str = "ocorrencia";

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `PostgreSQL` query error.
    #[error("Database error: {0}")]
    Database(#[from] switchy_database::DatabaseError),

    /// `DuckDB` query error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking store task panicked or was cancelled.
    #[error("Store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Could not open a connection.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of what went wrong.
        message: String,
    },

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Read and write access to occurrence records.
#[async_trait]
pub trait OccurrenceStore: Send + Sync {
    /// Short backend name for logs (e.g. `"duckdb"`).
    fn backend(&self) -> &'static str;

    /// Returns every record, projected to the fields the trainer needs.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    async fn fetch_training_records(&self) -> Result<Vec<RawOccurrence>, DbError>;

    /// Counts records per `tipoNaturezaOcorrencia`, ordered by count
    /// descending then label. Null and empty categories are left out.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    async fn count_by_natureza(&self) -> Result<Vec<GroupCount>, DbError>;

    /// The `limit` busiest neighborhood groups, ordered by count descending
    /// then label.
    ///
    /// The null and empty groups compete for the `limit` slots and are
    /// removed only afterwards, so fewer than `limit` entries may come back
    /// even when more named neighborhoods exist.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    async fn top_bairros(&self, limit: u32) -> Result<Vec<GroupCount>, DbError>;

    /// Appends records, returning how many were written.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if any insert fails.
    async fn insert_occurrences(&self, records: &[RawOccurrence]) -> Result<u64, DbError>;
}

/// Converts a dispatch timestamp projected as text plus its SQL type name.
///
/// Timestamp-typed columns become [`DispatchTime::Native`]; anything else
/// is kept as text for best-effort parsing during feature extraction.
#[must_use]
pub fn dispatch_time_from_sql(text: Option<String>, sql_type: &str) -> Option<DispatchTime> {
    let text = text?;

    if !sql_type.trim().to_ascii_lowercase().starts_with("timestamp") {
        return Some(DispatchTime::Text(text));
    }

    Some(
        parse_native_timestamp(&text).map_or_else(
            || DispatchTime::Unsupported(serde_json::Value::String(text)),
            DispatchTime::Native,
        ),
    )
}

/// Parses a timestamp rendered as text by `DuckDB` or `PostgreSQL`.
fn parse_native_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.to_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%#z") {
        return Some(dt.to_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

/// Renders a dispatch time for a text column.
pub(crate) fn dispatch_time_to_sql(time: &DispatchTime) -> String {
    match time {
        DispatchTime::Text(s) => s.clone(),
        DispatchTime::Native(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        DispatchTime::Unsupported(v) => v.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike as _;

    #[test]
    fn text_columns_stay_text() {
        assert_eq!(
            dispatch_time_from_sql(Some("2024-03-05T14:30:00Z".to_string()), "VARCHAR"),
            Some(DispatchTime::Text("2024-03-05T14:30:00Z".to_string()))
        );
        assert_eq!(dispatch_time_from_sql(None, "TIMESTAMP"), None);
    }

    #[test]
    fn timestamp_columns_become_native() {
        for (text, sql_type) in [
            ("2024-03-05 09:15:00", "TIMESTAMP"),
            ("2024-03-05 09:15:00.250", "timestamp without time zone"),
            ("2024-03-05 09:15:00+00", "timestamp with time zone"),
            ("2024-03-05 06:15:00-03", "TIMESTAMP WITH TIME ZONE"),
        ] {
            let Some(DispatchTime::Native(dt)) =
                dispatch_time_from_sql(Some(text.to_string()), sql_type)
            else {
                panic!("{text} was not parsed as a native timestamp");
            };
            assert_eq!(dt.hour(), 9, "{text}");
        }
    }

    #[test]
    fn unreadable_native_timestamp_is_unsupported() {
        assert!(matches!(
            dispatch_time_from_sql(Some("infinity".to_string()), "timestamp"),
            Some(DispatchTime::Unsupported(_))
        ));
    }
}
