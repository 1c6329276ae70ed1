//! Occurrence store in a local `DuckDB` file.
//!
//! `DuckDB` calls are blocking, so every operation runs on the blocking
//! thread pool against a connection shared behind a mutex.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use duckdb::Connection;
use siob_database_models::GroupCount;
use siob_occurrence_models::RawOccurrence;

use crate::queries::{self, Dialect};
use crate::{DbError, OccurrenceStore, dispatch_time_from_sql, dispatch_time_to_sql};

/// `DuckDB`-backed [`OccurrenceStore`].
#[derive(Clone)]
pub struct DuckDbStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for DuckDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbStore").finish_non_exhaustive()
    }
}

impl DuckDbStore {
    /// Opens (or creates) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            crate::paths::ensure_dir(parent)?;
        }

        log::info!("Opening DuckDB store at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens an empty in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wraps an existing connection, creating the table if it is missing.
    ///
    /// An existing `ocorrencia` table is used as-is, whatever the type of its
    /// timestamp column.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if schema creation fails.
    pub fn from_connection(conn: Connection) -> Result<Self, DbError> {
        conn.execute_batch(&format!("{};", queries::create_table_sql()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, DbError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, DbError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|e| DbError::Connection {
                message: format!("DuckDB connection lock poisoned: {e}"),
            })?;
            f(&mut guard)
        })
        .await?
    }

    async fn group_counts(
        &self,
        column: &'static str,
        limit: Option<u32>,
    ) -> Result<Vec<GroupCount>, DbError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&queries::group_count_sql(column, limit))?;
            let mut rows = stmt.query([])?;

            let mut counts = Vec::new();
            while let Some(row) = rows.next()? {
                let label: Option<String> = row.get(0)?;
                let total: i64 = row.get(1)?;
                counts.push((label, total));
            }
            Ok(queries::drop_missing_labels(counts))
        })
        .await
    }
}

#[async_trait]
impl OccurrenceStore for DuckDbStore {
    fn backend(&self) -> &'static str {
        "duckdb"
    }

    async fn fetch_training_records(&self) -> Result<Vec<RawOccurrence>, DbError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&queries::training_records_sql(Dialect::DuckDb))?;
            let mut rows = stmt.query([])?;

            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                let time_text: Option<String> = row.get(2)?;
                let time_type: String = row.get(3)?;
                records.push(RawOccurrence {
                    bairro: row.get(0)?,
                    municipio: row.get(1)?,
                    data_hora_acionamento: dispatch_time_from_sql(time_text, &time_type),
                    tipo_natureza_ocorrencia: row.get(4)?,
                });
            }
            Ok(records)
        })
        .await
    }

    async fn count_by_natureza(&self) -> Result<Vec<GroupCount>, DbError> {
        self.group_counts("tipo_natureza_ocorrencia", None).await
    }

    async fn top_bairros(&self, limit: u32) -> Result<Vec<GroupCount>, DbError> {
        self.group_counts("bairro", Some(limit)).await
    }

    async fn insert_occurrences(&self, records: &[RawOccurrence]) -> Result<u64, DbError> {
        if records.is_empty() {
            return Ok(0);
        }

        let records = records.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&queries::insert_sql(Dialect::DuckDb))?;
                for record in &records {
                    let time = record
                        .data_hora_acionamento
                        .as_ref()
                        .map(dispatch_time_to_sql);
                    stmt.execute(duckdb::params![
                        record.bairro.as_deref(),
                        record.municipio.as_deref(),
                        time.as_deref(),
                        record.tipo_natureza_ocorrencia.as_deref(),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(records.len() as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike as _;
    use siob_occurrence_models::DispatchTime;

    fn occurrence(bairro: Option<&str>, natureza: Option<&str>) -> RawOccurrence {
        RawOccurrence {
            bairro: bairro.map(ToString::to_string),
            municipio: Some("Recife".to_string()),
            data_hora_acionamento: Some(DispatchTime::Text("2024-03-05T14:30:00Z".to_string())),
            tipo_natureza_ocorrencia: natureza.map(ToString::to_string),
        }
    }

    #[tokio::test]
    async fn top_bairros_skips_missing_neighborhoods() {
        let store = DuckDbStore::open_in_memory().unwrap();
        let mut records = Vec::new();
        records.extend((0..3).map(|_| occurrence(Some("Boa Vista"), Some("Incêndio"))));
        records.extend((0..5).map(|_| occurrence(Some("Centro"), Some("Resgate"))));
        records.extend((0..2).map(|_| occurrence(None, Some("Resgate"))));
        records.push(occurrence(Some(""), None));

        assert_eq!(store.insert_occurrences(&records).await.unwrap(), 11);

        let bairros = store.top_bairros(5).await.unwrap();
        assert_eq!(
            bairros,
            vec![GroupCount::new("Centro", 5), GroupCount::new("Boa Vista", 3)]
        );

        let natureza = store.count_by_natureza().await.unwrap();
        assert_eq!(
            natureza,
            vec![GroupCount::new("Resgate", 7), GroupCount::new("Incêndio", 3)]
        );
    }

    #[tokio::test]
    async fn missing_neighborhoods_take_a_top_slot_before_removal() {
        let store = DuckDbStore::open_in_memory().unwrap();
        let mut records: Vec<_> = (0..9).map(|_| occurrence(None, Some("X"))).collect();
        for (bairro, n) in [("A", 5), ("B", 4), ("C", 3), ("D", 2), ("E", 1), ("F", 1)] {
            records.extend((0..n).map(|_| occurrence(Some(bairro), Some("X"))));
        }
        store.insert_occurrences(&records).await.unwrap();

        let bairros = store.top_bairros(5).await.unwrap();
        assert_eq!(
            bairros,
            vec![
                GroupCount::new("A", 5),
                GroupCount::new("B", 4),
                GroupCount::new("C", 3),
                GroupCount::new("D", 2),
            ]
        );
    }

    #[tokio::test]
    async fn top_bairros_breaks_ties_by_label_and_limits() {
        let store = DuckDbStore::open_in_memory().unwrap();
        let records: Vec<_> = ["F", "E", "D", "C", "B", "A", "A"]
            .into_iter()
            .map(|b| occurrence(Some(b), Some("X")))
            .collect();
        store.insert_occurrences(&records).await.unwrap();

        let labels: Vec<_> = store
            .top_bairros(3)
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.label)
            .collect();
        assert_eq!(labels, ["A", "B", "C"]);
    }

    #[tokio::test]
    async fn text_timestamps_round_trip_as_text() {
        let store = DuckDbStore::open_in_memory().unwrap();
        store
            .insert_occurrences(&[occurrence(Some("Centro"), Some("Resgate")), RawOccurrence::default()])
            .await
            .unwrap();

        let records = store.fetch_training_records().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], occurrence(Some("Centro"), Some("Resgate")));
        assert_eq!(records[1], RawOccurrence::default());
    }

    #[tokio::test]
    async fn timestamp_columns_are_read_as_native_times() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE ocorrencia (
                bairro TEXT,
                municipio TEXT,
                data_hora_acionamento TIMESTAMP,
                tipo_natureza_ocorrencia TEXT
            );
            INSERT INTO ocorrencia VALUES
                ('Centro', 'Recife', TIMESTAMP '2024-03-05 21:45:00', 'Resgate'),
                ('Derby', 'Recife', NULL, 'Resgate');",
        )
        .unwrap();
        let store = DuckDbStore::from_connection(conn).unwrap();

        let records = store.fetch_training_records().await.unwrap();
        let Some(DispatchTime::Native(dt)) = &records[0].data_hora_acionamento else {
            panic!("expected a native timestamp, got {:?}", records[0]);
        };
        assert_eq!(dt.hour(), 21);
        assert_eq!(records[1].data_hora_acionamento, None);
    }

    #[tokio::test]
    async fn empty_store_has_empty_aggregates() {
        let store = DuckDbStore::open_in_memory().unwrap();
        assert!(store.count_by_natureza().await.unwrap().is_empty());
        assert!(store.top_bairros(5).await.unwrap().is_empty());
        assert!(store.fetch_training_records().await.unwrap().is_empty());
        assert_eq!(store.insert_occurrences(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dashboard_combines_both_aggregates() {
        let store = DuckDbStore::open_in_memory().unwrap();
        store
            .insert_occurrences(&[occurrence(Some("Centro"), Some("Resgate"))])
            .await
            .unwrap();

        let aggregates = queries::dashboard(&store).await.unwrap();
        assert_eq!(aggregates.natureza, vec![GroupCount::new("Resgate", 1)]);
        assert_eq!(aggregates.bairros, vec![GroupCount::new("Centro", 1)]);
    }
}
