//! HTTP handler functions for the SIOB API.

use actix_web::{HttpResponse, web};
use siob_database::queries;
use siob_model::{ModelError, ModelInput};
use siob_server_models::{ApiDashboard, ApiError, ApiFeatureScore, ApiHealth, ApiPrediction};

use crate::AppState;

/// Message returned while no model artifact is loaded.
pub const MODEL_UNAVAILABLE: &str = "Modelo indisponível";

/// `GET /api/health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: state.model.is_some(),
    })
}

/// `GET /api/dados/dashboard`
///
/// Occurrences per nature category and the five busiest neighborhoods.
/// Served from the store whether or not a model is loaded.
pub async fn dashboard(state: web::Data<AppState>) -> HttpResponse {
    match queries::dashboard(state.store.as_ref()).await {
        Ok(aggregates) => HttpResponse::Ok().json(ApiDashboard::from(aggregates)),
        Err(e) => {
            log::error!("Failed to load dashboard aggregates: {e}");
            HttpResponse::InternalServerError().json(ApiError::new(e.to_string()))
        }
    }
}

/// `POST /api/predizer`
///
/// Takes one record-like JSON object and returns the predicted category
/// with the probability of every known category.
pub async fn predizer(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let Some(model) = state.model.as_ref() else {
        return HttpResponse::ServiceUnavailable().json(ApiError::new(MODEL_UNAVAILABLE));
    };

    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            log::debug!("Rejected prediction body: {e}");
            return HttpResponse::BadRequest().json(ApiError::new(format!("Invalid JSON: {e}")));
        }
    };

    let result = ModelInput::from_json(&value).and_then(|input| model.predict(&input));

    match result {
        Ok(prediction) => HttpResponse::Ok().json(ApiPrediction::from(prediction)),
        Err(e @ ModelError::InvalidInput { .. }) => {
            log::debug!("Rejected prediction input: {e}");
            HttpResponse::BadRequest().json(ApiError::new(e.to_string()))
        }
        Err(e) => {
            log::error!("Prediction failed: {e}");
            HttpResponse::InternalServerError().json(ApiError::new(e.to_string()))
        }
    }
}

/// `GET /api/modelo/importancia`
///
/// The most important encoded features, or an empty list when no model is
/// loaded.
pub async fn importancia(state: web::Data<AppState>) -> HttpResponse {
    let Some(model) = state.model.as_ref() else {
        return HttpResponse::Ok().json(Vec::<ApiFeatureScore>::new());
    };

    match model.feature_importance() {
        Ok(scores) => HttpResponse::Ok().json(
            scores
                .into_iter()
                .map(ApiFeatureScore::from)
                .collect::<Vec<_>>(),
        ),
        Err(e) => {
            log::error!("Failed to compute feature importance: {e}");
            HttpResponse::InternalServerError().json(ApiError::new(e.to_string()))
        }
    }
}
