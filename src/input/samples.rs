use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::input::InputError;
use crate::input::manifest::BETA_LEVEL_1;
use crate::input::text::{for_each_line, open_maybe_gz};

pub const LOG_LAMBDA: &str = "log_lambda";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleShape {
    pub n_spots: usize,
    pub n_variables: usize,
    pub n_regions: usize,
}

/// Posterior draws for one gene.
#[derive(Debug, Clone)]
pub struct PosteriorSampleSet {
    pub shape: SampleShape,
    pub n_draws: usize,
    /// draws × spots, row-major.
    pub log_lambda: Vec<f64>,
    /// variables × regions × draws, so each coefficient's draws are contiguous.
    pub beta: Vec<f64>,
}

impl PosteriorSampleSet {
    pub fn beta_draws(&self, variable: usize, region: usize) -> &[f64] {
        let start = (variable * self.shape.n_regions + region) * self.n_draws;
        &self.beta[start..start + self.n_draws]
    }
}

#[derive(Debug, Clone, Copy)]
enum Column {
    Spot(usize),
    Beta(usize),
}

/// Reads a Stan CSV (`#` comments, one header, one row per draw).
pub fn read_stan_csv(path: &Path, shape: SampleShape) -> Result<PosteriorSampleSet, InputError> {
    let mut reader = open_maybe_gz(path)?;
    let mut columns: Option<Vec<Option<Column>>> = None;
    let mut log_lambda = Vec::new();
    let mut beta_rows: Vec<Vec<f64>> = Vec::new();
    let n_beta = shape.n_variables * shape.n_regions;

    for_each_line(reader.as_mut(), |line_no, line| {
        if line.starts_with('#') {
            return Ok(());
        }
        let Some(cols) = &columns else {
            columns = Some(parse_header(path, line, shape)?);
            return Ok(());
        };
        let mut row_lambda = vec![f64::NAN; shape.n_spots];
        let mut row_beta = vec![f64::NAN; n_beta];
        let mut n_fields = 0usize;
        for (idx, field) in line.split(',').enumerate() {
            n_fields += 1;
            let Some(col) = cols.get(idx).copied().flatten() else {
                continue;
            };
            let value = field.trim().parse::<f64>().map_err(|_| {
                InputError::Parse(format!(
                    "{}: line {}: non-numeric value '{}'",
                    path.display(),
                    line_no,
                    field
                ))
            })?;
            match col {
                Column::Spot(i) => row_lambda[i] = value,
                Column::Beta(i) => row_beta[i] = value,
            }
        }
        if n_fields != cols.len() {
            return Err(InputError::Parse(format!(
                "{}: line {}: expected {} fields, found {}",
                path.display(),
                line_no,
                cols.len(),
                n_fields
            )));
        }
        log_lambda.extend_from_slice(&row_lambda);
        beta_rows.push(row_beta);
        Ok(())
    })?;

    if columns.is_none() {
        return Err(InputError::InvalidInput(format!(
            "{}: no header line",
            path.display()
        )));
    }

    let n_draws = beta_rows.len();
    let mut beta = vec![0.0; n_beta * n_draws];
    for (draw, row) in beta_rows.iter().enumerate() {
        for (k, &v) in row.iter().enumerate() {
            beta[k * n_draws + draw] = v;
        }
    }

    Ok(PosteriorSampleSet {
        shape,
        n_draws,
        log_lambda,
        beta,
    })
}

fn parse_header(
    path: &Path,
    line: &str,
    shape: SampleShape,
) -> Result<Vec<Option<Column>>, InputError> {
    let mut seen_spots = vec![false; shape.n_spots];
    let mut seen_beta = vec![false; shape.n_variables * shape.n_regions];
    let mut out = Vec::new();

    for name in line.split(',') {
        let name = name.trim().trim_matches('"');
        let col = if let Some(rest) = name.strip_prefix(LOG_LAMBDA).and_then(|r| r.strip_prefix('.')) {
            let idx = parse_indices(path, name, rest, &[shape.n_spots])?;
            mark_seen(path, name, &mut seen_spots, idx[0])?;
            Some(Column::Spot(idx[0]))
        } else if let Some(rest) = name
            .strip_prefix(BETA_LEVEL_1)
            .and_then(|r| r.strip_prefix('.'))
        {
            let idx = parse_indices(path, name, rest, &[shape.n_variables, shape.n_regions])?;
            let flat = idx[0] * shape.n_regions + idx[1];
            mark_seen(path, name, &mut seen_beta, flat)?;
            Some(Column::Beta(flat))
        } else {
            None
        };
        out.push(col);
    }

    if let Some(missing) = seen_spots.iter().position(|s| !s) {
        return Err(InputError::InvalidInput(format!(
            "{}: missing column {}.{}",
            path.display(),
            LOG_LAMBDA,
            missing + 1
        )));
    }
    if let Some(missing) = seen_beta.iter().position(|s| !s) {
        return Err(InputError::InvalidInput(format!(
            "{}: missing column {}.{}.{}",
            path.display(),
            BETA_LEVEL_1,
            missing / shape.n_regions + 1,
            missing % shape.n_regions + 1
        )));
    }
    Ok(out)
}

/// Parses `1`-based dotted indices and converts them to `0`-based.
fn parse_indices(
    path: &Path,
    name: &str,
    rest: &str,
    bounds: &[usize],
) -> Result<Vec<usize>, InputError> {
    let parts: Vec<&str> = rest.split('.').collect();
    if parts.len() != bounds.len() {
        return Err(InputError::InvalidInput(format!(
            "{}: column '{}' expects {} indices",
            path.display(),
            name,
            bounds.len()
        )));
    }
    let mut out = Vec::with_capacity(parts.len());
    for (part, &bound) in parts.iter().zip(bounds) {
        let idx = part.parse::<usize>().ok().filter(|&i| i >= 1 && i <= bound);
        let Some(idx) = idx else {
            return Err(InputError::InvalidInput(format!(
                "{}: column '{}' index out of range (1..={})",
                path.display(),
                name,
                bound
            )));
        };
        out.push(idx - 1);
    }
    Ok(out)
}

fn mark_seen(path: &Path, name: &str, seen: &mut [bool], idx: usize) -> Result<(), InputError> {
    if seen[idx] {
        return Err(InputError::InvalidInput(format!(
            "{}: duplicate column '{}'",
            path.display(),
            name
        )));
    }
    seen[idx] = true;
    Ok(())
}

/// Maps 0-based gene index to its `combined_<N>.csv[.gz]` file under `output_dir/*/`.
pub fn discover_sample_files(output_dir: &Path) -> Result<BTreeMap<usize, PathBuf>, InputError> {
    let mut found = BTreeMap::new();
    let mut subdirs = Vec::new();
    for entry in std::fs::read_dir(output_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            subdirs.push(entry.path());
        }
    }
    subdirs.sort();

    for dir in subdirs {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(number) = sample_file_number(name) else {
                continue;
            };
            if number == 0 {
                return Err(InputError::InvalidInput(format!(
                    "{}: gene numbers are 1-based",
                    path.display()
                )));
            }
            if let Some(prev) = found.insert(number - 1, path.clone()) {
                return Err(InputError::InvalidInput(format!(
                    "gene {} has two sample files: {} and {}",
                    number,
                    prev.display(),
                    path.display()
                )));
            }
        }
    }
    Ok(found)
}

fn sample_file_number(name: &str) -> Option<usize> {
    let stem = name
        .strip_suffix(".csv.gz")
        .or_else(|| name.strip_suffix(".csv"))?;
    let digits = stem.strip_prefix("combined_")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/samples.rs"]
mod tests;
