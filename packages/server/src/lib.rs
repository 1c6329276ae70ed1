#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for SIOB occurrence analytics and prediction.
//!
//! Serves the dashboard aggregates straight from the occurrence store and
//! answers prediction and feature-importance queries from a model artifact
//! loaded once at startup. When no artifact can be loaded the server still
//! starts; prediction answers 503 until the trainer is re-run and the
//! server restarted.

mod handlers;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use siob_database::{OccurrenceStore, db, paths};
use siob_model::TrainedArtifact;

/// Port used when `PORT` is unset or invalid.
pub const DEFAULT_PORT: u16 = 5000;

/// Shared application state. Immutable once the server starts.
pub struct AppState {
    /// Occurrence record store for the dashboard.
    pub store: Arc<dyn OccurrenceStore>,
    /// The trained model, if one was loaded.
    pub model: Option<Arc<TrainedArtifact>>,
}

/// Startup settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind (`BIND_ADDR`).
    pub bind_addr: String,
    /// Port to bind (`PORT`).
    pub port: u16,
    /// Model artifact location (`MODEL_PATH`).
    pub model_path: PathBuf,
}

impl ServerConfig {
    /// Reads `BIND_ADDR`, `PORT` and `MODEL_PATH`, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Self {
            bind_addr,
            port,
            model_path: paths::model_path_from_env(),
        }
    }
}

/// Loads the model artifact at `path`.
///
/// A missing or unreadable artifact is logged and yields `None`.
#[must_use]
pub fn load_model(path: &Path) -> Option<Arc<TrainedArtifact>> {
    match TrainedArtifact::load(path) {
        Ok(artifact) => {
            log::info!(
                "Loaded model from {} (trained {} on {} records, {} classes)",
                path.display(),
                artifact.trained_at,
                artifact.record_count,
                artifact.label_encoder.len()
            );
            Some(Arc::new(artifact))
        }
        Err(e) => {
            log::warn!(
                "Model unavailable at {}: {e}. Run the trainer to create it.",
                path.display()
            );
            None
        }
    }
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/dados/dashboard", web::get().to(handlers::dashboard))
            .route("/predizer", web::post().to(handlers::predizer))
            .route("/modelo/importancia", web::get().to(handlers::importancia)),
    );
}

/// Starts the API server.
///
/// Opens the store named by `DATABASE_URL`, loads the model artifact and
/// starts the Actix-Web HTTP server. The caller provides the async runtime
/// (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the store cannot be opened, the
/// HTTP server fails to bind, or it encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    let config = ServerConfig::from_env();

    log::info!("Connecting to occurrence store...");
    let store = db::connect_from_env()
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to open occurrence store: {e}")))?;

    log::info!("Loading model...");
    let model_path = config.model_path.clone();
    let model = actix_rt::task::spawn_blocking(move || load_model(&model_path))
        .await
        .map_err(std::io::Error::other)?;

    let state = web::Data::new(AppState { store, model });

    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.bind_addr, config.port))?
    .run()
    .await
}
