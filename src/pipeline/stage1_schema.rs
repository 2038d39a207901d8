use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::container::PATH_SEPARATOR;
use crate::error::PackError;
use crate::input::manifest::Manifest;

const ESCAPE_REPLACEMENT: char = ' ';

/// Makes `name` usable as a single container path segment.
pub fn escape_segment(name: &str) -> String {
    name.replace(PATH_SEPARATOR, &ESCAPE_REPLACEMENT.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneEntry {
    pub name: String,
    pub segment: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArraySchema {
    pub count_file: String,
    pub id: String,
    pub image_file: PathBuf,
    pub annotation_file: PathBuf,
    pub levels: Vec<String>,
    pub spot_keys: Vec<String>,
    /// Column of each spot in the per-gene `log_lambda` samples.
    pub spot_columns: Vec<usize>,
}

impl ArraySchema {
    pub fn image_basename(&self) -> String {
        basename(&self.image_file)
    }

    pub fn title(&self) -> String {
        format!("{} ({})", self.levels.join(" "), self.image_basename())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyGroup {
    pub name: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyLevel {
    pub name: String,
    pub groups: Vec<HierarchyGroup>,
}

/// level → group → member array ids, all escaped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HierarchyIndex {
    pub levels: Vec<HierarchyLevel>,
}

impl HierarchyIndex {
    pub fn level(&self, name: &str) -> Option<&HierarchyLevel> {
        self.levels.iter().find(|l| l.name == name)
    }
}

/// Full namespace of the output container, fixed before any data is computed.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub genes: Vec<GeneEntry>,
    pub arrays: Vec<ArraySchema>,
    pub hierarchy: HierarchyIndex,
    pub regions: Vec<String>,
    pub variables: Vec<String>,
    pub n_spots: usize,
}

pub fn level_name(level: usize) -> String {
    format!("level_{level}")
}

pub fn build_schema(manifest: &Manifest) -> Result<Schema, PackError> {
    if manifest.genes.is_empty() {
        return Err(PackError::Precondition("gene list is empty".to_string()));
    }
    let gene_segments = escape_unique("gene", &manifest.genes)?;
    let genes = manifest
        .genes
        .iter()
        .zip(gene_segments)
        .map(|(name, segment)| GeneEntry {
            name: name.clone(),
            segment,
        })
        .collect();

    if manifest.region_names.is_empty() {
        return Err(PackError::Precondition("region list is empty".to_string()));
    }
    let variables = manifest
        .level_1_variables()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            PackError::Precondition("beta_mapping declares no beta_level_1 variables".to_string())
        })?
        .to_vec();
    let level_1_groups = escape_unique("level-1 variable", &variables)?;

    if manifest.n_levels == 0 {
        return Err(PackError::Precondition(
            "n_levels must be at least 1".to_string(),
        ));
    }

    let mut arrays = Vec::with_capacity(manifest.metadata.len());
    let mut by_count_file: HashMap<&str, usize> = HashMap::new();
    let raw_ids: Vec<String> = manifest
        .metadata
        .iter()
        .map(|row| basename(Path::new(&row.count_file)))
        .collect();
    let ids = escape_unique("array", &raw_ids)?;

    for (row, id) in manifest.metadata.iter().zip(ids) {
        if by_count_file
            .insert(row.count_file.as_str(), arrays.len())
            .is_some()
        {
            return Err(PackError::Precondition(format!(
                "array {} is listed twice in the metadata table",
                row.count_file
            )));
        }
        if row.levels.len() < manifest.n_levels {
            return Err(PackError::Precondition(format!(
                "array {} has {} level values, expected {}",
                row.count_file,
                row.levels.len(),
                manifest.n_levels
            )));
        }
        arrays.push(ArraySchema {
            count_file: row.count_file.clone(),
            id,
            image_file: row.image_file.clone(),
            annotation_file: row.annotation_file.clone(),
            levels: row.levels.clone(),
            spot_keys: Vec::new(),
            spot_columns: Vec::new(),
        });
    }
    if arrays.is_empty() {
        return Err(PackError::Precondition(
            "metadata table lists no arrays".to_string(),
        ));
    }

    let mut seen_spots = HashSet::new();
    for (column, (count_file, key)) in manifest.filenames_and_coordinates.iter().enumerate() {
        let Some(&idx) = by_count_file.get(count_file.as_str()) else {
            return Err(PackError::Precondition(format!(
                "spot {key} refers to array {count_file}, which is not in the metadata table"
            )));
        };
        if !seen_spots.insert((count_file.as_str(), key.as_str())) {
            return Err(PackError::Precondition(format!(
                "spot {key} of array {count_file} is listed twice"
            )));
        }
        arrays[idx].spot_keys.push(key.clone());
        arrays[idx].spot_columns.push(column);
    }
    if let Some(empty) = arrays.iter().find(|a| a.spot_keys.is_empty()) {
        return Err(PackError::Precondition(format!(
            "array {} has no spots",
            empty.count_file
        )));
    }

    let hierarchy = build_hierarchy(&arrays, &level_1_groups, manifest.n_levels)?;

    Ok(Schema {
        genes,
        arrays,
        hierarchy,
        regions: manifest.region_names.clone(),
        variables,
        n_spots: manifest.filenames_and_coordinates.len(),
    })
}

fn build_hierarchy(
    arrays: &[ArraySchema],
    level_1_groups: &[String],
    n_levels: usize,
) -> Result<HierarchyIndex, PackError> {
    let mut levels = Vec::with_capacity(n_levels);

    let mut level_1: BTreeMap<&str, Vec<String>> = level_1_groups
        .iter()
        .map(|g| (g.as_str(), Vec::new()))
        .collect();
    for array in arrays {
        let group = escape_segment(&array.levels[0]);
        let Some(members) = level_1.get_mut(group.as_str()) else {
            return Err(PackError::Precondition(format!(
                "array {} belongs to level-1 group '{}', which is not a declared beta_level_1 variable",
                array.count_file, array.levels[0]
            )));
        };
        members.push(array.id.clone());
    }
    levels.push(HierarchyLevel {
        name: level_name(1),
        groups: level_1_groups
            .iter()
            .map(|g| HierarchyGroup {
                name: g.clone(),
                members: level_1.remove(g.as_str()).unwrap_or_default(),
            })
            .collect(),
    });

    for level in 2..=n_levels {
        let mut groups: Vec<HierarchyGroup> = Vec::new();
        for array in arrays {
            let name = escape_segment(&array.levels[level - 1]);
            if name.is_empty() {
                return Err(PackError::Precondition(format!(
                    "array {} has an empty level-{} value",
                    array.count_file, level
                )));
            }
            match groups.iter_mut().find(|g| g.name == name) {
                Some(group) => group.members.push(array.id.clone()),
                None => groups.push(HierarchyGroup {
                    name,
                    members: vec![array.id.clone()],
                }),
            }
        }
        levels.push(HierarchyLevel {
            name: level_name(level),
            groups,
        });
    }

    Ok(HierarchyIndex { levels })
}

/// Escapes every name and rejects empty or colliding segments.
fn escape_unique(kind: &str, names: &[String]) -> Result<Vec<String>, PackError> {
    let mut seen: HashMap<String, &str> = HashMap::with_capacity(names.len());
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let segment = escape_segment(name);
        if segment.trim().is_empty() {
            return Err(PackError::Precondition(format!("empty {kind} name")));
        }
        if let Some(prev) = seen.insert(segment.clone(), name) {
            return Err(PackError::Precondition(if prev == name.as_str() {
                format!("duplicate {kind} name '{name}'")
            } else {
                format!("{kind} names '{prev}' and '{name}' both escape to '{segment}'")
            }));
        }
        out.push(segment);
    }
    Ok(out)
}

pub fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage1_schema.rs"]
mod tests;
