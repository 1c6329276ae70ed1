//! One-hot encoding of the categorical columns, with `hora` passed through.
//!
//! The encoded column order is fixed: every `bairro_*` indicator, then
//! every `municipio_*` indicator, then `hora`. Feature-importance output
//! relies on this order to name columns.

use std::collections::BTreeSet;

use ndarray::{Array1, Array2, ArrayViewMut1};
use serde::{Deserialize, Serialize};
use siob_occurrence_models::{DEFAULT_HOUR, FeatureColumn, FeatureRow};

/// The input columns of a single prediction.
///
/// A `None` categorical value encodes as unknown (all indicators zero).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInput {
    /// Neighborhood.
    pub bairro: Option<String>,
    /// Municipality.
    pub municipio: Option<String>,
    /// Hour of dispatch.
    pub hora: u8,
}

impl Default for ModelInput {
    fn default() -> Self {
        Self {
            bairro: None,
            municipio: None,
            hora: DEFAULT_HOUR,
        }
    }
}

impl ModelInput {
    /// Returns the value of a categorical column.
    #[must_use]
    pub fn categorical(&self, column: FeatureColumn) -> Option<&str> {
        match column {
            FeatureColumn::Bairro => self.bairro.as_deref(),
            FeatureColumn::Municipio => self.municipio.as_deref(),
            FeatureColumn::Hora => None,
        }
    }
}

impl From<&FeatureRow> for ModelInput {
    fn from(row: &FeatureRow) -> Self {
        Self {
            bairro: Some(row.bairro.clone()),
            municipio: Some(row.municipio.clone()),
            hora: row.hora,
        }
    }
}

/// Indicator expansion of one categorical column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneHotColumn {
    column: FeatureColumn,
    /// Sorted, distinct.
    categories: Vec<String>,
}

impl OneHotColumn {
    fn fit<'a>(column: FeatureColumn, values: impl IntoIterator<Item = &'a str>) -> Self {
        let categories: BTreeSet<&str> = values.into_iter().collect();
        Self {
            column,
            categories: categories.into_iter().map(str::to_string).collect(),
        }
    }

    /// Position of `value` among this column's indicators.
    #[must_use]
    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.categories
            .binary_search_by(|c| c.as_str().cmp(value))
            .ok()
    }

    /// Number of indicator columns.
    #[must_use]
    pub fn width(&self) -> usize {
        self.categories.len()
    }

    /// Categories seen during fit.
    #[must_use]
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    fn feature_names(&self) -> impl Iterator<Item = String> + '_ {
        self.categories
            .iter()
            .map(|c| format!("{}_{c}", self.column))
    }
}

/// Fitted column transformer for the prediction pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preprocessor {
    columns: Vec<OneHotColumn>,
}

impl Preprocessor {
    /// Fits one indicator expansion per categorical column.
    #[must_use]
    pub fn fit(rows: &[FeatureRow]) -> Self {
        let columns = FeatureColumn::categorical()
            .iter()
            .map(|&column| {
                OneHotColumn::fit(column, rows.iter().filter_map(|r| r.categorical(column)))
            })
            .collect();
        Self { columns }
    }

    /// Width of an encoded row.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.categorical_width() + 1
    }

    fn categorical_width(&self) -> usize {
        self.columns.iter().map(OneHotColumn::width).sum()
    }

    /// The fitted categorical columns.
    #[must_use]
    pub fn columns(&self) -> &[OneHotColumn] {
        &self.columns
    }

    /// Encodes a single input. Unknown or missing categories leave every
    /// indicator of their column at zero.
    #[must_use]
    pub fn transform_one(&self, input: &ModelInput) -> Array1<f64> {
        let mut row = Array1::zeros(self.n_features());
        self.encode_into(input, row.view_mut());
        row
    }

    /// Encodes a batch of feature rows, one matrix row per feature row.
    #[must_use]
    pub fn transform(&self, rows: &[FeatureRow]) -> Array2<f64> {
        let mut matrix = Array2::zeros((rows.len(), self.n_features()));
        for (row, out) in rows.iter().zip(matrix.rows_mut()) {
            self.encode_into(&ModelInput::from(row), out);
        }
        matrix
    }

    /// Writes the encoding of `input` into a zeroed row.
    fn encode_into(&self, input: &ModelInput, mut out: ArrayViewMut1<'_, f64>) {
        let mut offset = 0;
        for column in &self.columns {
            if let Some(i) = input
                .categorical(column.column)
                .and_then(|v| column.index_of(v))
            {
                out[offset + i] = 1.0;
            }
            offset += column.width();
        }
        out[offset] = f64::from(input.hora);
    }

    /// Names of the indicator columns only, as `<column>_<category>`.
    #[must_use]
    pub fn categorical_feature_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .flat_map(OneHotColumn::feature_names)
            .collect()
    }

    /// Names of every encoded column, in encoded order.
    #[must_use]
    pub fn feature_names_out(&self) -> Vec<String> {
        let mut names = self.categorical_feature_names();
        names.push(FeatureColumn::Hora.to_string());
        names
    }
}
