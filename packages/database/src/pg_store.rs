//! Occurrence store in `PostgreSQL`, through `switchy_database`.

use std::sync::Arc;

use async_trait::async_trait;
use moosicbox_json_utils::database::ToValue as _;
use siob_database_models::GroupCount;
use siob_occurrence_models::RawOccurrence;
use switchy_database::{Database, DatabaseValue, Row};
use switchy_database_connection::Credentials;

use crate::queries::{self, Dialect};
use crate::{DbError, OccurrenceStore, dispatch_time_from_sql, dispatch_time_to_sql};

/// `PostgreSQL`-backed [`OccurrenceStore`].
#[derive(Clone)]
pub struct PgStore {
    db: Arc<dyn Database>,
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore").finish_non_exhaustive()
    }
}

impl PgStore {
    /// Connects to `url` and creates the table if it is missing.
    ///
    /// Sets a 120-second `statement_timeout` so stalled queries fail with
    /// an error instead of hanging.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the URL is invalid or the connection or schema
    /// creation fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        // Credentials::from_url does not understand query parameters such as
        // ?sslmode=require. TLS is negotiated by the native-tls connector.
        let url_base = url.split('?').next().unwrap_or(url);

        let creds = Credentials::from_url(url_base).map_err(|e| DbError::Connection {
            message: format!("Invalid database URL: {e}"),
        })?;
        let db = switchy_database_connection::init_postgres_raw_native_tls(creds)
            .await
            .map_err(|e| DbError::Connection {
                message: e.to_string(),
            })?;

        db.exec_raw("SET statement_timeout = '120s'").await?;

        Self::from_database(Arc::from(db)).await
    }

    /// Wraps an open connection, creating the table if it is missing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if schema creation fails.
    pub async fn from_database(db: Arc<dyn Database>) -> Result<Self, DbError> {
        db.exec_raw(&queries::create_table_sql()).await?;
        Ok(Self { db })
    }

    async fn group_counts(
        &self,
        column: &str,
        limit: Option<u32>,
    ) -> Result<Vec<GroupCount>, DbError> {
        let rows = self
            .db
            .query_raw_params(&queries::group_count_sql(column, limit), &[])
            .await?;

        let counts = rows
            .iter()
            .map(|row| {
                let label: Option<String> = row.to_value("label").map_err(|e| DbError::Conversion {
                    message: format!("Failed to parse {column}: {e}"),
                })?;
                let total: i64 = row.to_value("total").map_err(|e| DbError::Conversion {
                    message: format!("Failed to parse count for {column}: {e}"),
                })?;
                Ok((label, total))
            })
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(queries::drop_missing_labels(counts))
    }
}

/// Reads one projected training row. Only the timestamp is lenient: an
/// unreadable value there becomes a missing dispatch time.
fn record_from_row(row: &Row) -> Result<RawOccurrence, DbError> {
    let text = |column: &str| -> Result<Option<String>, DbError> {
        row.to_value(column).map_err(|e| DbError::Conversion {
            message: format!("Failed to parse {column}: {e}"),
        })
    };

    let time_text: Option<String> = row.to_value("data_hora_text").unwrap_or(None);
    let time_type: String = row.to_value("data_hora_type").unwrap_or_default();

    Ok(RawOccurrence {
        bairro: text("bairro")?,
        municipio: text("municipio")?,
        data_hora_acionamento: dispatch_time_from_sql(time_text, &time_type),
        tipo_natureza_ocorrencia: text("tipo_natureza_ocorrencia")?,
    })
}

fn text_param(value: Option<&str>) -> DatabaseValue {
    value.map_or(DatabaseValue::Null, |s| DatabaseValue::String(s.to_string()))
}

#[async_trait]
impl OccurrenceStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn fetch_training_records(&self) -> Result<Vec<RawOccurrence>, DbError> {
        let rows = self
            .db
            .query_raw_params(&queries::training_records_sql(Dialect::Postgres), &[])
            .await?;

        rows.iter().map(record_from_row).collect()
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

        let sql = queries::insert_sql(Dialect::Postgres);
        let txn = self.db.begin_transaction().await?;
        let mut inserted = 0u64;

        for record in records {
            let time = record
                .data_hora_acionamento
                .as_ref()
                .map(dispatch_time_to_sql);

            let result = txn
                .exec_raw_params(
                    &sql,
                    &[
                        text_param(record.bairro.as_deref()),
                        text_param(record.municipio.as_deref()),
                        text_param(time.as_deref()),
                        text_param(record.tipo_natureza_ocorrencia.as_deref()),
                    ],
                )
                .await;

            match result {
                Ok(n) => inserted += n,
                Err(e) => {
                    if let Err(rollback) = txn.rollback().await {
                        log::error!("Failed to roll back occurrence insert: {rollback}");
                    }
                    return Err(e.into());
                }
            }
        }

        txn.commit().await?;

        Ok(inserted)
    }
}
