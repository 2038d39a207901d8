use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::input::InputError;
use crate::input::manifest::ArrayMetadata;

/// count file → spot key → `"x_y"` position in the common coordinate frame.
pub type CommonCoordinateLookup = HashMap<String, HashMap<String, String>>;

/// Produces the common-frame lookup for every array of a run.
pub trait Registration {
    fn register(&self, metadata: &[ArrayMetadata]) -> Result<CommonCoordinateLookup, InputError>;
}

/// Loads a lookup precomputed by the registration step.
#[derive(Debug, Clone)]
pub struct FileRegistration {
    pub path: PathBuf,
}

impl FileRegistration {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Registration for FileRegistration {
    fn register(&self, metadata: &[ArrayMetadata]) -> Result<CommonCoordinateLookup, InputError> {
        let lookup = read_lookup(&self.path)?;
        for row in metadata {
            if !lookup.contains_key(&row.count_file) {
                tracing::debug!(
                    count_file = %row.count_file,
                    "registration lookup has no entry for array"
                );
            }
        }
        Ok(lookup)
    }
}

fn read_lookup(path: &Path) -> Result<CommonCoordinateLookup, InputError> {
    let bytes = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            InputError::MissingInput(format!("registration lookup {}", path.display()))
        } else {
            InputError::Io(e)
        }
    })?;
    serde_json::from_slice(&bytes).map_err(|source| InputError::Json {
        path: path.to_path_buf(),
        source,
    })
}
