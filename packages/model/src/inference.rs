//! Prediction and feature-importance queries against a fitted pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use siob_occurrence_models::{DEFAULT_HOUR, FeatureColumn};

use crate::artifact::TrainedArtifact;
use crate::pipeline::Pipeline;
use crate::preprocess::ModelInput;
use crate::{Classifier, LabelCodec, ModelError};

/// Importances at or below this are dropped from the summary.
pub const MIN_IMPORTANCE: f64 = 0.001;

/// Maximum number of features in the summary.
pub const TOP_FEATURES: usize = 10;

/// A decoded prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Most likely category label.
    pub label: String,
    /// Probability of every known label.
    pub probabilities: BTreeMap<String, f64>,
}

/// One entry of the feature-importance summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScore {
    /// Encoded column name, e.g. `bairro_Centro` or `hora`.
    pub feature: String,
    /// Normalized importance.
    pub score: f64,
}

impl ModelInput {
    /// Reads prediction input from a JSON object.
    ///
    /// Extra keys are ignored. Missing or null categorical values are
    /// unknown; a missing or null `hora` is [`DEFAULT_HOUR`].
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidInput`] if `value` is not an object, a
    /// categorical value is an array or object, or `hora` is not an integer
    /// hour.
    pub fn from_json(value: &Value) -> Result<Self, ModelError> {
        let Value::Object(map) = value else {
            return Err(invalid("request body must be a JSON object"));
        };

        let hora = match map.get(FeatureColumn::Hora.as_ref()) {
            None | Some(Value::Null) => DEFAULT_HOUR,
            Some(v) => parse_hour(v)?,
        };

        Ok(Self {
            bairro: categorical(map.get(FeatureColumn::Bairro.as_ref()), FeatureColumn::Bairro)?,
            municipio: categorical(
                map.get(FeatureColumn::Municipio.as_ref()),
                FeatureColumn::Municipio,
            )?,
            hora,
        })
    }
}

fn invalid(message: impl Into<String>) -> ModelError {
    ModelError::InvalidInput {
        message: message.into(),
    }
}

fn categorical(value: Option<&Value>, column: FeatureColumn) -> Result<Option<String>, ModelError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(v @ (Value::Number(_) | Value::Bool(_))) => Ok(Some(v.to_string())),
        Some(_) => Err(invalid(format!("'{column}' must be a string"))),
    }
}

fn parse_hour(value: &Value) -> Result<u8, ModelError> {
    let hour = match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= 23.0)
                .map(|f| {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let h = f as u64;
                    h
                })
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    hour.filter(|h| *h <= 23)
        .and_then(|h| u8::try_from(h).ok())
        .ok_or_else(|| invalid(format!("'hora' must be an integer between 0 and 23, got {value}")))
}

/// Predicts a label and the probability of every known label.
///
/// # Errors
///
/// Returns [`ModelError::Shape`] if the classifier's output does not line
/// up with the label mapping.
pub fn predict<C: Classifier, L: LabelCodec>(
    pipeline: &Pipeline<C>,
    labels: &L,
    input: &ModelInput,
) -> Result<Prediction, ModelError> {
    let index = pipeline.predict(input);
    let proba = pipeline.predict_proba(input);

    if proba.len() != labels.classes().len() {
        return Err(ModelError::Shape {
            message: format!(
                "classifier returned {} probabilities for {} labels",
                proba.len(),
                labels.classes().len()
            ),
        });
    }

    let label = labels
        .decode(index)
        .ok_or_else(|| ModelError::Shape {
            message: format!("predicted class index {index} has no label"),
        })?
        .to_string();

    let probabilities = proba
        .iter()
        .copied()
        .enumerate()
        .map(|(i, p)| {
            labels
                .decode(i)
                .map(|l| (l.to_string(), p))
                .ok_or_else(|| ModelError::Shape {
                    message: format!("class index {i} has no label"),
                })
        })
        .collect::<Result<_, _>>()?;

    Ok(Prediction {
        label,
        probabilities,
    })
}

/// Most important encoded columns, descending, above [`MIN_IMPORTANCE`],
/// at most [`TOP_FEATURES`].
///
/// # Errors
///
/// Returns [`ModelError::Shape`] if the feature names and importances
/// differ in length.
pub fn feature_importance<C: Classifier>(
    pipeline: &Pipeline<C>,
) -> Result<Vec<FeatureScore>, ModelError> {
    let names = pipeline.feature_names();
    let importances = pipeline.feature_importances();

    if names.len() != importances.len() {
        return Err(ModelError::Shape {
            message: format!(
                "{} feature names but {} importances",
                names.len(),
                importances.len()
            ),
        });
    }

    let mut scores: Vec<FeatureScore> = names
        .into_iter()
        .zip(importances.iter().copied())
        .filter(|(_, score)| *score > MIN_IMPORTANCE)
        .map(|(feature, score)| FeatureScore { feature, score })
        .collect();

    scores.sort_by(|a, b| b.score.total_cmp(&a.score));
    scores.truncate(TOP_FEATURES);

    Ok(scores)
}

impl TrainedArtifact {
    /// See [`predict`].
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Shape`] if the artifact is internally
    /// inconsistent.
    pub fn predict(&self, input: &ModelInput) -> Result<Prediction, ModelError> {
        predict(&self.pipeline, &self.label_encoder, input)
    }

    /// See [`feature_importance`].
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Shape`] if the artifact is internally
    /// inconsistent.
    pub fn feature_importance(&self) -> Result<Vec<FeatureScore>, ModelError> {
        feature_importance(&self.pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::LabelEncoder;
    use ndarray::{Array1, ArrayView1, ArrayView2};
    use serde_json::json;
    use siob_occurrence_models::FeatureRow;

    /// Fixed-output classifier.
    #[derive(Debug, Clone, PartialEq)]
    struct Fixed {
        proba: Vec<f64>,
        importances: Vec<f64>,
    }

    impl Classifier for Fixed {
        fn fit(&mut self, _: ArrayView2<'_, f64>, _: &[usize], _: usize) -> Result<(), ModelError> {
            Ok(())
        }

        fn predict_proba(&self, _: ArrayView1<'_, f64>) -> Array1<f64> {
            Array1::from(self.proba.clone())
        }

        fn feature_importances(&self) -> Array1<f64> {
            Array1::from(self.importances.clone())
        }
    }

    fn rows(n: usize) -> Vec<FeatureRow> {
        (0..n)
            .map(|i| FeatureRow {
                bairro: format!("B{i:02}"),
                municipio: "Recife".to_string(),
                hora: 8,
                target: "A".to_string(),
            })
            .collect()
    }

    fn pipeline(proba: Vec<f64>, importances: Vec<f64>, n_rows: usize) -> Pipeline<Fixed> {
        Pipeline::fit(&rows(n_rows), &vec![0; n_rows], 3, Fixed { proba, importances }).unwrap()
    }

    #[test]
    fn decodes_prediction_over_all_labels() {
        let labels = LabelEncoder::fit(["C", "A", "B"]);
        let p = pipeline(vec![0.2, 0.5, 0.3], Vec::new(), 1);

        let prediction = predict(&p, &labels, &ModelInput::default()).unwrap();

        assert_eq!(prediction.label, "B");
        assert_eq!(
            prediction.probabilities.keys().collect::<Vec<_>>(),
            ["A", "B", "C"]
        );
        let total: f64 = prediction.probabilities.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn mismatched_probability_vector_is_an_error() {
        let labels = LabelEncoder::fit(["A", "B"]);
        let p = pipeline(vec![0.2, 0.5, 0.3], Vec::new(), 1);
        assert!(matches!(
            predict(&p, &labels, &ModelInput::default()),
            Err(ModelError::Shape { .. })
        ));
    }

    #[test]
    fn importance_summary_filters_sorts_and_truncates() {
        // 12 bairros + 1 municipio + hora = 14 columns.
        let mut importances: Vec<f64> = (0..14u32).map(|i| f64::from(i) / 100.0).collect();
        importances[13] = 0.5;
        importances[1] = 0.0005;
        let p = pipeline(vec![1.0], importances, 12);

        let summary = feature_importance(&p).unwrap();

        assert_eq!(summary.len(), TOP_FEATURES);
        assert_eq!(summary[0].feature, "hora");
        assert_eq!(summary[1].feature, "municipio_Recife");
        assert_eq!(summary[2].feature, "bairro_B11");
        assert!(summary.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(summary.iter().all(|s| s.score > MIN_IMPORTANCE));
    }

    #[test]
    fn importance_length_mismatch_is_an_error() {
        let p = pipeline(vec![1.0], vec![0.5; 2], 3);
        assert!(feature_importance(&p).is_err());
    }

    #[test]
    fn reads_json_input() {
        let input = ModelInput::from_json(&json!({
            "bairro": "Centro",
            "municipio": "Recife",
            "hora": 14,
            "tipoNaturezaOcorrencia": "ignored"
        }))
        .unwrap();
        assert_eq!(input.bairro.as_deref(), Some("Centro"));
        assert_eq!(input.hora, 14);

        let sparse = ModelInput::from_json(&json!({"hora": "7"})).unwrap();
        assert_eq!(sparse.bairro, None);
        assert_eq!(sparse.municipio, None);
        assert_eq!(sparse.hora, 7);

        assert_eq!(ModelInput::from_json(&json!({})).unwrap().hora, DEFAULT_HOUR);
        assert_eq!(ModelInput::from_json(&json!({"hora": 9.0})).unwrap().hora, 9);
    }

    #[test]
    fn rejects_malformed_json_input() {
        for body in [
            json!([1, 2]),
            json!({"hora": 24}),
            json!({"hora": -1}),
            json!({"hora": "noon"}),
            json!({"hora": 3.5}),
            json!({"bairro": ["Centro"]}),
        ] {
            assert!(
                matches!(ModelInput::from_json(&body), Err(ModelError::InvalidInput { .. })),
                "accepted {body}"
            );
        }
    }
}
