use thiserror::Error;

use crate::input::samples::PosteriorSampleSet;
use crate::model::DensityTable;

pub const DEFAULT_POINTS: usize = 500;
pub const DEFAULT_HALF_RANGE: f64 = 10.0;

const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;

#[derive(Debug, Error, PartialEq)]
pub enum DensityError {
    #[error("empty sample set")]
    Empty,
    #[error("non-finite draw at index {0}")]
    NonFinite(usize),
    #[error("invalid evaluation grid: {0}")]
    InvalidGrid(String),
}

/// Evaluation points shared by every density of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationGrid {
    points: Vec<f64>,
}

impl EvaluationGrid {
    /// `n` evenly spaced points from `low` to `high`, both included.
    pub fn linspace(low: f64, high: f64, n: usize) -> Result<Self, DensityError> {
        if !low.is_finite() || !high.is_finite() || low >= high {
            return Err(DensityError::InvalidGrid(format!(
                "requires finite low < high, got ({low}, {high})"
            )));
        }
        if n < 2 {
            return Err(DensityError::InvalidGrid(format!(
                "requires at least 2 points, got {n}"
            )));
        }
        let step = (high - low) / (n - 1) as f64;
        let mut points: Vec<f64> = (0..n).map(|i| low + step * i as f64).collect();
        points[n - 1] = high;
        Ok(Self { points })
    }

    pub fn symmetric(half_range: f64, n: usize) -> Result<Self, DensityError> {
        Self::linspace(-half_range, half_range, n)
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn spacing(&self) -> f64 {
        self.points[1] - self.points[0]
    }
}

/// Scott's rule, `σ̂ · n^(-1/5)` with the unbiased standard deviation.
/// Returns `None` when the sample has no spread to measure.
pub fn scott_bandwidth(samples: &[f64]) -> Option<f64> {
    let n = samples.len();
    if n < 2 {
        return None;
    }
    let mean = samples.iter().sum::<f64>() / n as f64;
    let var = samples.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / (n - 1) as f64;
    let h = var.sqrt() * (n as f64).powf(-0.2);
    (h.is_finite() && h > 0.0).then_some(h)
}

/// Gaussian KDE of `samples` evaluated at every grid point.
///
/// Degenerate samples (a single draw or zero spread) use the grid spacing as
/// bandwidth and yield a sharply peaked curve instead of an error.
pub fn gaussian_kde(samples: &[f64], grid: &EvaluationGrid) -> Result<Vec<f64>, DensityError> {
    if samples.is_empty() {
        return Err(DensityError::Empty);
    }
    if let Some(idx) = samples.iter().position(|x| !x.is_finite()) {
        return Err(DensityError::NonFinite(idx));
    }
    let h = scott_bandwidth(samples).unwrap_or_else(|| grid.spacing());
    let inv_h = 1.0 / h;
    let norm = INV_SQRT_2PI * inv_h / samples.len() as f64;

    let curve = grid
        .points()
        .iter()
        .map(|&x| {
            let sum: f64 = samples
                .iter()
                .map(|&xi| {
                    let z = (x - xi) * inv_h;
                    (-0.5 * z * z).exp()
                })
                .sum();
            sum * norm
        })
        .collect();
    Ok(curve)
}

/// Density tensor of every `(variable, region)` coefficient of one gene.
pub fn density_table(
    samples: &PosteriorSampleSet,
    grid: &EvaluationGrid,
) -> Result<DensityTable, DensityError> {
    let shape = samples.shape;
    let mut table = DensityTable::zeros(grid.len(), shape.n_variables, shape.n_regions);
    for variable in 0..shape.n_variables {
        for region in 0..shape.n_regions {
            let curve = gaussian_kde(samples.beta_draws(variable, region), grid)?;
            table.set_curve(variable, region, &curve);
        }
    }
    Ok(table)
}

#[cfg(test)]
#[path = "../../tests/src_inline/model/density.rs"]
mod tests;
