#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for the local data directory.
//!
//! All default paths are relative to the project root's `data/` directory.

use std::path::{Path, PathBuf};

/// Environment variable overriding the model artifact location.
pub const MODEL_PATH_VAR: &str = "MODEL_PATH";

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`.
///
/// # Panics
///
/// Panics if the project root cannot be resolved.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .expect("Failed to find project root from CARGO_MANIFEST_DIR")
        .to_path_buf()
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Returns the path of the local `DuckDB` occurrence store.
#[must_use]
pub fn default_store_path() -> PathBuf {
    data_dir().join("siob.duckdb")
}

/// Returns the default path of the trained model artifact.
#[must_use]
pub fn default_model_path() -> PathBuf {
    data_dir().join("model.msgpack")
}

/// Returns the model artifact path from `MODEL_PATH`, or the default.
#[must_use]
pub fn model_path_from_env() -> PathBuf {
    std::env::var_os(MODEL_PATH_VAR).map_or_else(default_model_path, PathBuf::from)
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_live_under_data_dir() {
        assert!(default_store_path().starts_with(data_dir()));
        assert!(default_model_path().starts_with(data_dir()));
        assert!(project_root().join("Cargo.toml").exists());
    }
}
