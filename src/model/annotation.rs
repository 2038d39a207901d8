use thiserror::Error;

use crate::input::annotation::IndicatorMatrix;

#[derive(Debug, Error, PartialEq)]
pub enum AnnotationError {
    #[error("spot {0} is missing from the annotation matrix")]
    MissingSpot(String),
    #[error("spot {0} has no region indicator set")]
    Unassigned(String),
    #[error("spot {key} is assigned to several regions: {regions:?}")]
    Ambiguous { key: String, regions: Vec<String> },
}

/// One region label per spot, in `keys` order.
pub fn match_regions(
    matrix: &IndicatorMatrix,
    keys: &[String],
) -> Result<Vec<String>, AnnotationError> {
    keys.iter()
        .map(|key| {
            let column = matrix
                .spot_column(key)
                .ok_or_else(|| AnnotationError::MissingSpot(key.clone()))?;
            let mut hits = (0..matrix.regions.len()).filter(|&row| matrix.is_set(row, column));
            let first = hits
                .next()
                .ok_or_else(|| AnnotationError::Unassigned(key.clone()))?;
            let rest: Vec<usize> = hits.collect();
            if !rest.is_empty() {
                let regions = std::iter::once(first)
                    .chain(rest)
                    .map(|row| matrix.regions[row].clone())
                    .collect();
                return Err(AnnotationError::Ambiguous {
                    key: key.clone(),
                    regions,
                });
            }
            Ok(matrix.regions[first].clone())
        })
        .collect()
}

#[cfg(test)]
#[path = "../../tests/src_inline/model/annotation.rs"]
mod tests;
