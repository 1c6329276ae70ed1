#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! JSON response types for the SIOB API server.
//!
//! Field names follow the public contract of the dashboard frontend
//! (`previsao`, `confianca`, `erro`). These are kept separate from the store
//! and model types so the API contract can evolve on its own.

use std::collections::BTreeMap;

use serde::ser::SerializeMap as _;
use serde::{Serialize, Serializer};
use siob_database_models::{DashboardAggregates, GroupCount};
use siob_model::{FeatureScore, Prediction};

/// Label to count, serialized as a JSON object in the stored order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedCounts(pub Vec<GroupCount>);

impl Serialize for OrderedCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for group in &self.0 {
            map.serialize_entry(&group.label, &group.count)?;
        }
        map.end()
    }
}

/// `GET /api/dados/dashboard` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApiDashboard {
    /// Occurrences per nature category.
    pub natureza: OrderedCounts,
    /// Busiest neighborhoods, descending.
    pub bairros: OrderedCounts,
}

impl From<DashboardAggregates> for ApiDashboard {
    fn from(aggregates: DashboardAggregates) -> Self {
        Self {
            natureza: OrderedCounts(aggregates.natureza),
            bairros: OrderedCounts(aggregates.bairros),
        }
    }
}

/// `POST /api/predizer` response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiPrediction {
    /// Predicted category label.
    pub previsao: String,
    /// Probability of every known label.
    pub confianca: BTreeMap<String, f64>,
}

impl From<Prediction> for ApiPrediction {
    fn from(prediction: Prediction) -> Self {
        Self {
            previsao: prediction.label,
            confianca: prediction.probabilities,
        }
    }
}

/// One entry of `GET /api/modelo/importancia`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiFeatureScore {
    /// Encoded column name.
    pub feature: String,
    /// Normalized importance.
    pub score: f64,
}

impl From<FeatureScore> for ApiFeatureScore {
    fn from(score: FeatureScore) -> Self {
        Self {
            feature: score.feature,
            score: score.score,
        }
    }
}

/// Error payload returned with every non-2xx status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    /// Human-readable message.
    pub erro: String,
}

impl ApiError {
    /// Creates an error payload.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            erro: message.into(),
        }
    }
}

/// `GET /api/health` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Always `true` when the server answers.
    pub healthy: bool,
    /// Server version.
    pub version: String,
    /// Whether a model artifact was loaded at startup.
    pub model_loaded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dashboard_keeps_count_order() {
        let dashboard = ApiDashboard::from(DashboardAggregates {
            natureza: vec![GroupCount::new("Resgate", 7), GroupCount::new("Incêndio", 3)],
            bairros: vec![
                GroupCount::new("Centro", 5),
                GroupCount::new("Boa Vista", 3),
            ],
        });

        assert_eq!(
            serde_json::to_string(&dashboard).unwrap(),
            r#"{"natureza":{"Resgate":7,"Incêndio":3},"bairros":{"Centro":5,"Boa Vista":3}}"#
        );
    }

    #[test]
    fn empty_dashboard_has_empty_objects() {
        assert_eq!(
            serde_json::to_string(&ApiDashboard::default()).unwrap(),
            r#"{"natureza":{},"bairros":{}}"#
        );
    }

    #[test]
    fn prediction_uses_contract_field_names() {
        let api = ApiPrediction::from(Prediction {
            label: "B".to_string(),
            probabilities: BTreeMap::from([("A".to_string(), 0.25), ("B".to_string(), 0.75)]),
        });
        assert_eq!(
            serde_json::to_string(&api).unwrap(),
            r#"{"previsao":"B","confianca":{"A":0.25,"B":0.75}}"#
        );
    }

    #[test]
    fn health_is_camel_case() {
        let health = ApiHealth {
            healthy: true,
            version: "0.1.0".to_string(),
            model_loaded: false,
        };
        assert_eq!(
            serde_json::to_string(&health).unwrap(),
            r#"{"healthy":true,"version":"0.1.0","modelLoaded":false}"#
        );
        assert_eq!(
            serde_json::to_string(&ApiError::new("x")).unwrap(),
            r#"{"erro":"x"}"#
        );
    }
}
