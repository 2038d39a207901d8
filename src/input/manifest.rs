use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::input::InputError;

pub const BETA_LEVEL_1: &str = "beta_level_1";

/// One row of the array metadata table.
#[derive(Debug, Clone, Deserialize)]
pub struct ArrayMetadata {
    pub count_file: String,
    pub image_file: PathBuf,
    pub annotation_file: PathBuf,
    /// Level values, outermost first (`levels[0]` is the level-1 group).
    #[serde(default)]
    pub levels: Vec<String>,
}

/// Descriptor written next to the sampler output.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub genes: Vec<String>,
    pub metadata: Vec<ArrayMetadata>,
    pub n_levels: usize,
    #[serde(rename = "annotation_mapping")]
    pub region_names: Vec<String>,
    pub scaling_factor: f64,
    pub beta_mapping: BTreeMap<String, Vec<String>>,
    /// `(count file, spot key)` for every `log_lambda` column, in column order.
    pub filenames_and_coordinates: Vec<(String, String)>,
}

impl Manifest {
    pub fn level_1_variables(&self) -> Option<&[String]> {
        self.beta_mapping.get(BETA_LEVEL_1).map(Vec::as_slice)
    }
}

pub fn load_manifest(path: &Path) -> Result<Manifest, InputError> {
    let bytes = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            InputError::MissingInput(format!("manifest {}", path.display()))
        } else {
            InputError::Io(e)
        }
    })?;
    serde_json::from_slice(&bytes).map_err(|source| InputError::Json {
        path: path.to_path_buf(),
        source,
    })
}
