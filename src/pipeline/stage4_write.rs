use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::container::codec::encode;
use crate::container::{Container, ContainerError, Data, Dataset, join_path};
use crate::error::PackError;
use crate::model::density::EvaluationGrid;
use crate::model::{ArrayRecord, DensityTable};
use crate::pipeline::stage1_schema::Schema;

pub const DATA_DIR: &str = "data";
pub const STATIC_DIR: &str = "static";
pub const CONTAINER_FILE: &str = "kira-spatialpack.bin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetPolicy {
    Copy,
    Link,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetReport {
    pub staged: Vec<PathBuf>,
    pub kept: Vec<PathBuf>,
}

pub struct Stage4Input<'a> {
    pub schema: &'a Schema,
    pub grid: &'a EvaluationGrid,
    pub densities: &'a [DensityTable],
    pub arrays: &'a [ArrayRecord],
}

pub fn container_path(server_dir: &Path) -> PathBuf {
    server_dir.join(DATA_DIR).join(CONTAINER_FILE)
}

/// Assembles the whole container tree in memory.
pub fn build_container(input: &Stage4Input<'_>) -> Result<Container, ContainerError> {
    let schema = input.schema;
    let mut c = Container::new();

    c.insert(
        "beta/density_evaluation_points",
        Dataset::vector_f64(input.grid.points().to_vec()),
    )?;
    c.insert("beta/aar_names", Dataset::strings(schema.regions.clone()))?;
    c.insert(
        "beta/beta_variables",
        Dataset::strings(schema.variables.clone()),
    )?;
    c.create_group("beta/density")?;
    c.create_group("beta/baseline")?;
    for (gene, table) in schema.genes.iter().zip(input.densities) {
        let shape = table.shape().to_vec();
        c.insert(
            &join_path(&["beta", "density", gene.segment.as_str()]),
            Dataset::new(shape.clone(), Data::F64(table.values.clone()))?,
        )?;
        c.insert(
            &join_path(&["beta", "baseline", gene.segment.as_str()]),
            Dataset::new(shape, Data::F64(vec![0.0; table.values.len()]))?,
        )?;
    }

    for level in &schema.hierarchy.levels {
        c.create_group(&level.name)?;
        for group in &level.groups {
            c.insert(
                &join_path(&[level.name.as_str(), group.name.as_str(), "files"]),
                Dataset::strings(group.members.clone()),
            )?;
        }
    }

    c.insert(
        "genes",
        Dataset::strings(schema.genes.iter().map(|g| g.segment.clone()).collect()),
    )?;

    c.create_group("arrays")?;
    for array in input.arrays {
        let base = |parts: &[&str]| array_path(&array.id, parts);
        c.insert(
            &base(&["image", "filename"]),
            Dataset::scalar_str(array.image_filename.clone()),
        )?;
        c.insert(
            &base(&["image", "resolution"]),
            Dataset::vector_u32(vec![array.resolution.0, array.resolution.1]),
        )?;
        c.insert(
            &base(&["image", "spot_radius"]),
            Dataset::scalar_f64(array.spot_radius),
        )?;
        c.insert(
            &base(&["image", "title"]),
            Dataset::scalar_str(array.title.clone()),
        )?;
        c.insert(
            &base(&["data", "coordinates"]),
            Dataset::points(&array.pixel_coordinates()),
        )?;
        c.insert(
            &base(&["data", "registered_coordinates"]),
            Dataset::points(&array.registered_coordinates()),
        )?;
        c.insert(
            &base(&["data", "annotations"]),
            Dataset::strings(array.annotations()),
        )?;
        c.create_group(&base(&["data", "expressions"]))?;
        for (idx, gene) in schema.genes.iter().enumerate() {
            c.insert(
                &base(&["data", "expressions", gene.segment.as_str()]),
                Dataset::vector_f64(array.expressions(idx)),
            )?;
        }
        c.insert(
            &base(&["metadata", "levels"]),
            Dataset::strings(array.levels.clone()),
        )?;
    }

    Ok(c)
}

fn array_path(id: &str, parts: &[&str]) -> String {
    let mut all = Vec::with_capacity(parts.len() + 2);
    all.push("arrays");
    all.push(id);
    all.extend_from_slice(parts);
    join_path(&all)
}

/// Places every referenced image under `static_dir`. Existing files are kept.
pub fn stage_assets(
    schema: &Schema,
    static_dir: &Path,
    policy: AssetPolicy,
) -> Result<AssetReport, PackError> {
    let mut report = AssetReport::default();
    for array in &schema.arrays {
        let dest = static_dir.join(array.image_basename());
        if fs::symlink_metadata(&dest).is_ok() {
            tracing::warn!("{} was not overwritten", dest.display());
            report.kept.push(dest);
            continue;
        }
        let source =
            std::path::absolute(&array.image_file).map_err(|e| PackError::io(&array.image_file, e))?;
        match policy {
            AssetPolicy::Copy => {
                fs::copy(&source, &dest).map_err(|e| PackError::io(&source, e))?;
            }
            AssetPolicy::Link => {
                symlink(&source, &dest).map_err(|e| PackError::io(&dest, e))?;
            }
        }
        report.staged.push(dest);
    }
    Ok(report)
}

#[cfg(unix)]
fn symlink(source: &Path, dest: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, dest)
}

#[cfg(windows)]
fn symlink(source: &Path, dest: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(source, dest)
}

/// Encodes `container` into a sibling temporary file and renames it over `path`.
pub fn write_container_atomic(container: &Container, path: &Path) -> Result<(), PackError> {
    let bytes = encode(container);
    let tmp = path.with_extension("bin.tmp");
    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(PackError::io(path, e));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage4_write.rs"]
mod tests;
