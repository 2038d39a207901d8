use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::error::PackError;
use crate::input::samples::{PosteriorSampleSet, SampleShape, read_stan_csv};
use crate::model::DensityTable;
use crate::model::density::{EvaluationGrid, density_table};
use crate::pipeline::stage1_schema::Schema;

/// Posterior-mean intensities, one row per gene over every `log_lambda` column.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionTable {
    pub rows: Vec<Vec<f64>>,
}

impl ExpressionTable {
    pub fn value(&self, gene: usize, column: usize) -> f64 {
        self.rows[gene][column]
    }

    pub fn n_genes(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone)]
pub struct Stage2Output {
    pub expression: ExpressionTable,
    pub densities: Vec<DensityTable>,
}

#[derive(Debug, Clone)]
struct GeneResult {
    expression: Vec<f64>,
    density: DensityTable,
}

/// Pairs every schema gene with its sample file; gaps and strays are fatal.
pub fn resolve_sample_files(
    schema: &Schema,
    found: BTreeMap<usize, PathBuf>,
) -> Result<Vec<PathBuf>, PackError> {
    let n_genes = schema.genes.len();
    if let Some((&idx, path)) = found.range(n_genes..).next() {
        return Err(PackError::Precondition(format!(
            "{} refers to gene {}, but only {} genes are declared",
            path.display(),
            idx + 1,
            n_genes
        )));
    }
    let mut found = found;
    let mut out = Vec::with_capacity(n_genes);
    for (idx, gene) in schema.genes.iter().enumerate() {
        let path = found.remove(&idx).ok_or_else(|| {
            PackError::Precondition(format!(
                "no posterior sample file for gene {} ({})",
                idx + 1,
                gene.name
            ))
        })?;
        out.push(path);
    }
    Ok(out)
}

/// `mean(exp(log_lambda))` per spot column.
pub fn posterior_means(samples: &PosteriorSampleSet) -> Vec<f64> {
    let n_spots = samples.shape.n_spots;
    let mut sums = vec![0.0f64; n_spots];
    for draw in samples.log_lambda.chunks_exact(n_spots.max(1)) {
        for (sum, &v) in sums.iter_mut().zip(draw) {
            *sum += v.exp();
        }
    }
    let n = samples.n_draws as f64;
    sums.iter_mut().for_each(|s| *s /= n);
    sums
}

fn process_gene(
    name: &str,
    path: &Path,
    shape: SampleShape,
    grid: &EvaluationGrid,
) -> Result<GeneResult, PackError> {
    let samples = read_stan_csv(path, shape)
        .map_err(|e| PackError::Data(format!("gene {name}: {e}")))?;
    if samples.n_draws == 0 {
        return Err(PackError::Data(format!(
            "gene {name}: {} holds no posterior draws",
            path.display()
        )));
    }
    if let Some(idx) = samples.log_lambda.iter().position(|v| !v.is_finite()) {
        return Err(PackError::Data(format!(
            "gene {name}: non-finite log_lambda draw for spot column {}",
            idx % shape.n_spots.max(1) + 1
        )));
    }
    let density = density_table(&samples, grid)
        .map_err(|e| PackError::Data(format!("gene {name}: {e}")))?;
    let expression = posterior_means(&samples);
    tracing::debug!(gene = name, draws = samples.n_draws, "gene processed");
    Ok(GeneResult {
        expression,
        density,
    })
}

/// Reads and reduces every gene in parallel; results keep schema gene order.
pub fn run_stage2(
    schema: &Schema,
    sample_files: &[PathBuf],
    grid: &EvaluationGrid,
) -> Result<Stage2Output, PackError> {
    let shape = SampleShape {
        n_spots: schema.n_spots,
        n_variables: schema.variables.len(),
        n_regions: schema.regions.len(),
    };

    let results = schema
        .genes
        .par_iter()
        .zip(sample_files.par_iter())
        .map(|(gene, path)| process_gene(&gene.name, path, shape, grid))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::with_capacity(results.len());
    let mut densities = Vec::with_capacity(results.len());
    for result in results {
        rows.push(result.expression);
        densities.push(result.density);
    }
    Ok(Stage2Output {
        expression: ExpressionTable { rows },
        densities,
    })
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage2_genes.rs"]
mod tests;
