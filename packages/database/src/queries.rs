//! SQL shared by both store backends, and the dashboard query.
//!
//! Statements differ between `DuckDB` and `PostgreSQL` only in how a value
//! is cast to text and how its type name is read, so each builder takes a
//! [`Dialect`].

use siob_database_models::{DashboardAggregates, GroupCount};

use crate::{DbError, OCCURRENCE_TABLE, OccurrenceStore};

/// Number of neighborhoods shown on the dashboard.
pub const DASHBOARD_TOP_BAIRROS: u32 = 5;

/// SQL flavor of a store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    DuckDb,
    Postgres,
}

impl Dialect {
    fn as_text(self, column: &str) -> String {
        match self {
            Self::DuckDb => format!("CAST({column} AS VARCHAR)"),
            Self::Postgres => format!("{column}::text"),
        }
    }

    fn type_name(self, column: &str) -> String {
        match self {
            Self::DuckDb => format!("typeof({column})"),
            Self::Postgres => format!("pg_typeof({column})::text"),
        }
    }

    fn placeholder(self, index: usize) -> String {
        match self {
            Self::DuckDb => "?".to_string(),
            Self::Postgres => format!("${index}"),
        }
    }
}

pub(crate) fn create_table_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {OCCURRENCE_TABLE} (
            bairro TEXT,
            municipio TEXT,
            data_hora_acionamento TEXT,
            tipo_natureza_ocorrencia TEXT
        )"
    )
}

/// Projects the four training fields plus the SQL type of the timestamp.
pub(crate) fn training_records_sql(dialect: Dialect) -> String {
    format!(
        "SELECT bairro, municipio,
                {} AS data_hora_text,
                {} AS data_hora_type,
                tipo_natureza_ocorrencia
         FROM {OCCURRENCE_TABLE}",
        dialect.as_text("data_hora_acionamento"),
        dialect.type_name("data_hora_acionamento"),
    )
}

/// Counts per distinct `column` value, busiest first.
///
/// Null and empty groups are ranked and limited like any other; callers
/// drop them afterwards with [`drop_missing_labels`].
pub(crate) fn group_count_sql(column: &str, limit: Option<u32>) -> String {
    let limit = limit.map_or_else(String::new, |n| format!("\n         LIMIT {n}"));
    format!(
        "SELECT {column} AS label, COUNT(*) AS total
         FROM {OCCURRENCE_TABLE}
         GROUP BY {column}
         ORDER BY total DESC, label ASC NULLS LAST{limit}"
    )
}

/// Removes null and empty groups from an already limited result.
pub(crate) fn drop_missing_labels(
    counts: impl IntoIterator<Item = (Option<String>, i64)>,
) -> Vec<GroupCount> {
    counts
        .into_iter()
        .filter_map(|(label, total)| {
            label
                .filter(|l| !l.is_empty())
                .map(|l| GroupCount::new(l, total))
        })
        .collect()
}

pub(crate) fn insert_sql(dialect: Dialect) -> String {
    let placeholders = (1..=4)
        .map(|i| dialect.placeholder(i))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {OCCURRENCE_TABLE}
            (bairro, municipio, data_hora_acionamento, tipo_natureza_ocorrencia)
         VALUES ({placeholders})"
    )
}

/// Loads both dashboard aggregates.
///
/// # Errors
///
/// Returns [`DbError`] if either aggregate query fails.
pub async fn dashboard(store: &dyn OccurrenceStore) -> Result<DashboardAggregates, DbError> {
    let natureza = store.count_by_natureza().await?;
    let bairros = store.top_bairros(DASHBOARD_TOP_BAIRROS).await?;

    log::debug!(
        "Dashboard: {} categories, {} neighborhoods ({})",
        natureza.len(),
        bairros.len(),
        store.backend()
    );

    Ok(DashboardAggregates { natureza, bairros })
}
