use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod annotation;
pub mod manifest;
pub mod probe;
pub mod registration;
pub mod samples;
pub mod text;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("missing input: {0}")]
    MissingInput(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("parse error: {0}")]
    Parse(String),
}

pub const MANIFEST_FILE: &str = "information.json";
pub const REGISTRATION_FILE: &str = "registration.json";

pub fn manifest_path(data_dir: &Path) -> PathBuf {
    data_dir.join(MANIFEST_FILE)
}

pub fn default_registration_path(data_dir: &Path) -> PathBuf {
    data_dir.join(REGISTRATION_FILE)
}

/// Splits a `"x_y"` spot key into its numeric pair.
pub fn parse_coordinate_key(key: &str) -> Result<[f64; 2], InputError> {
    let mut parts = key.split('_');
    let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(InputError::Parse(format!(
            "coordinate '{key}' is not of the form x_y"
        )));
    };
    let parse = |s: &str| {
        s.trim()
            .parse::<f64>()
            .map_err(|_| InputError::Parse(format!("coordinate '{key}' has non-numeric part '{s}'")))
    };
    Ok([parse(x)?, parse(y)?])
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/tests.rs"]
mod tests;
