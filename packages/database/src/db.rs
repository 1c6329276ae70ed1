//! Store selection from a connection URL.

use std::path::PathBuf;
use std::sync::Arc;

use crate::duckdb_store::DuckDbStore;
use crate::pg_store::PgStore;
use crate::{DbError, OccurrenceStore};

/// Environment variable holding the store connection URL.
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

/// Where a connection URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// A `PostgreSQL` URL.
    Postgres(String),
    /// A `DuckDB` database file.
    DuckDbFile(PathBuf),
    /// A transient in-memory `DuckDB` database.
    DuckDbMemory,
}

impl StoreLocation {
    /// Classifies a connection URL.
    ///
    /// `postgres://` and `postgresql://` URLs select `PostgreSQL`. Anything
    /// else is a `DuckDB` path, with an optional `duckdb://` prefix;
    /// `:memory:` opens an in-memory database.
    #[must_use]
    pub fn parse(url: &str) -> Self {
        let url = url.trim();
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Self::Postgres(url.to_string());
        }

        let path = url.strip_prefix("duckdb://").unwrap_or(url);
        if path == ":memory:" {
            Self::DuckDbMemory
        } else {
            Self::DuckDbFile(PathBuf::from(path))
        }
    }
}

/// Opens the store a connection URL points to.
///
/// # Errors
///
/// Returns [`DbError`] if the connection fails.
pub async fn connect(url: &str) -> Result<Arc<dyn OccurrenceStore>, DbError> {
    Ok(match StoreLocation::parse(url) {
        StoreLocation::Postgres(url) => Arc::new(PgStore::connect(&url).await?),
        StoreLocation::DuckDbFile(path) => Arc::new(DuckDbStore::open(&path)?),
        StoreLocation::DuckDbMemory => Arc::new(DuckDbStore::open_in_memory()?),
    })
}

/// Opens the store named by `DATABASE_URL`, or the local `DuckDB` file
/// under `data/` when it is unset.
///
/// # Errors
///
/// Returns [`DbError`] if the connection fails.
pub async fn connect_from_env() -> Result<Arc<dyn OccurrenceStore>, DbError> {
    let store = match std::env::var(DATABASE_URL_VAR) {
        Ok(url) if !url.trim().is_empty() => connect(&url).await?,
        _ => Arc::new(DuckDbStore::open(&crate::paths::default_store_path())?),
    };

    log::info!("Connected to {} occurrence store", store.backend());
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_urls() {
        assert_eq!(
            StoreLocation::parse("postgres://u:p@localhost:5432/siob"),
            StoreLocation::Postgres("postgres://u:p@localhost:5432/siob".to_string())
        );
        assert!(matches!(
            StoreLocation::parse("postgresql://localhost/siob?sslmode=require"),
            StoreLocation::Postgres(_)
        ));
        assert_eq!(
            StoreLocation::parse("duckdb://data/siob.duckdb"),
            StoreLocation::DuckDbFile(PathBuf::from("data/siob.duckdb"))
        );
        assert_eq!(
            StoreLocation::parse("/tmp/x.duckdb"),
            StoreLocation::DuckDbFile(PathBuf::from("/tmp/x.duckdb"))
        );
        assert_eq!(StoreLocation::parse(":memory:"), StoreLocation::DuckDbMemory);
        assert_eq!(
            StoreLocation::parse("duckdb://:memory:"),
            StoreLocation::DuckDbMemory
        );
    }

    #[tokio::test]
    async fn connects_to_memory_store() {
        let store = connect(":memory:").await.unwrap();
        assert_eq!(store.backend(), "duckdb");
        assert!(store.fetch_training_records().await.unwrap().is_empty());
    }
}
