pub mod stage1_schema;
pub mod stage2_genes;
pub mod stage3_arrays;
pub mod stage4_write;

use std::path::{Path, PathBuf};

use crate::error::PackError;
use crate::input::annotation::AnnotationSource;
use crate::input::manifest::load_manifest;
use crate::input::probe::ImageProbe;
use crate::input::registration::Registration;
use crate::input::samples::discover_sample_files;
use crate::model::coords::GeometryConfig;
use crate::model::density::EvaluationGrid;
use stage1_schema::build_schema;
use stage2_genes::{resolve_sample_files, run_stage2};
use stage3_arrays::{Stage3Inputs, run_stage3};
use stage4_write::{
    AssetPolicy, DATA_DIR, STATIC_DIR, Stage4Input, build_container, container_path,
    stage_assets, write_container_atomic,
};

#[derive(Debug, Clone)]
pub struct PackConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub server_dir: PathBuf,
    pub assets: AssetPolicy,
    /// `None` uses every available core.
    pub threads: Option<usize>,
    pub grid_points: usize,
    pub grid_half_range: f64,
    pub geometry: GeometryConfig,
}

/// Boundary collaborators; swapped for in-memory doubles in tests.
pub struct Collaborators<'a> {
    pub registration: &'a dyn Registration,
    pub annotations: &'a dyn AnnotationSource,
    pub images: &'a dyn ImageProbe,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackSummary {
    pub container: PathBuf,
    pub n_genes: usize,
    pub n_arrays: usize,
    pub n_spots: usize,
    pub assets_staged: usize,
    pub assets_kept: usize,
}

pub fn run_prepare(
    config: &PackConfig,
    collaborators: &Collaborators<'_>,
) -> Result<PackSummary, PackError> {
    let grid = EvaluationGrid::symmetric(config.grid_half_range, config.grid_points)
        .map_err(|e| PackError::Precondition(e.to_string()))?;

    let manifest = load_manifest(&crate::input::manifest_path(&config.data_dir))?;
    tracing::info!(
        genes = manifest.genes.len(),
        arrays = manifest.metadata.len(),
        levels = manifest.n_levels,
        scaling_factor = manifest.scaling_factor,
        "manifest loaded"
    );

    let schema = build_schema(&manifest)?;
    let found = discover_sample_files(&config.output_dir)?;
    let sample_files = resolve_sample_files(&schema, found)?;
    tracing::info!(
        genes = schema.genes.len(),
        arrays = schema.arrays.len(),
        spots = schema.n_spots,
        variables = schema.variables.len(),
        regions = schema.regions.len(),
        "schema built"
    );

    let registered = collaborators.registration.register(&manifest.metadata)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads.unwrap_or(0))
        .build()?;

    let annotations = collaborators.annotations;
    let images = collaborators.images;
    let geometry = config.geometry;
    let (stage2, arrays) = pool.install(|| -> Result<_, PackError> {
        let stage2 = run_stage2(&schema, &sample_files, &grid)?;
        tracing::info!(genes = stage2.densities.len(), "posterior summaries computed");
        let arrays = run_stage3(&Stage3Inputs {
            schema: &schema,
            expression: &stage2.expression,
            registered: &registered,
            annotations,
            images,
            geometry,
        })?;
        tracing::info!(arrays = arrays.len(), "array records built");
        Ok((stage2, arrays))
    })?;

    let container = build_container(&Stage4Input {
        schema: &schema,
        grid: &grid,
        densities: &stage2.densities,
        arrays: &arrays,
    })?;

    let data_dir = config.server_dir.join(DATA_DIR);
    let static_dir = config.server_dir.join(STATIC_DIR);
    create_dir(&data_dir)?;
    create_dir(&static_dir)?;

    let assets = stage_assets(&schema, &static_dir, config.assets)?;
    let path = container_path(&config.server_dir);
    write_container_atomic(&container, &path)?;
    tracing::info!(path = %path.display(), nodes = container.len(), "container written");

    Ok(PackSummary {
        container: path,
        n_genes: schema.genes.len(),
        n_arrays: arrays.len(),
        n_spots: schema.n_spots,
        assets_staged: assets.staged.len(),
        assets_kept: assets.kept.len(),
    })
}

fn create_dir(path: &Path) -> Result<(), PackError> {
    std::fs::create_dir_all(path).map_err(|e| PackError::io(path, e))
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/tests.rs"]
mod tests;
