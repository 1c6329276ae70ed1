#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Row types returned by the occurrence record store.
//!
//! These are the shapes of grouped counts as they come out of the store.
//! They are distinct from the JSON response types in `siob_server_models`.

use serde::{Deserialize, Serialize};

/// Number of occurrences sharing one value of a grouping field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupCount {
    /// The grouped value. Never empty.
    pub label: String,
    /// Occurrences with that value.
    pub count: i64,
}

impl GroupCount {
    /// Creates a new group count.
    #[must_use]
    pub fn new(label: impl Into<String>, count: i64) -> Self {
        Self {
            label: label.into(),
            count,
        }
    }
}

/// Both dashboard aggregates, each ordered by count descending then label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardAggregates {
    /// Occurrences per `tipoNaturezaOcorrencia`.
    pub natureza: Vec<GroupCount>,
    /// The busiest neighborhoods.
    pub bairros: Vec<GroupCount>,
}
