use std::collections::HashMap;
use std::path::Path;

use crate::input::InputError;
use crate::input::text::{for_each_line, open_maybe_gz};

/// Region × spot indicator matrix of one annotation file.
#[derive(Debug, Clone, Default)]
pub struct IndicatorMatrix {
    pub regions: Vec<String>,
    pub spots: Vec<String>,
    /// regions × spots, row-major.
    pub set: Vec<bool>,
    spot_index: HashMap<String, usize>,
}

impl IndicatorMatrix {
    pub fn new(regions: Vec<String>, spots: Vec<String>, set: Vec<bool>) -> Result<Self, InputError> {
        if set.len() != regions.len() * spots.len() {
            return Err(InputError::InvalidInput(format!(
                "indicator matrix has {} cells, expected {}x{}",
                set.len(),
                regions.len(),
                spots.len()
            )));
        }
        let mut spot_index = HashMap::with_capacity(spots.len());
        for (idx, spot) in spots.iter().enumerate() {
            if spot_index.insert(spot.clone(), idx).is_some() {
                return Err(InputError::InvalidInput(format!(
                    "indicator matrix lists spot '{spot}' twice"
                )));
            }
        }
        Ok(Self {
            regions,
            spots,
            set,
            spot_index,
        })
    }

    pub fn spot_column(&self, key: &str) -> Option<usize> {
        self.spot_index.get(key).copied()
    }

    pub fn is_set(&self, region: usize, spot: usize) -> bool {
        self.set[region * self.spots.len() + spot]
    }
}

/// Source of per-array annotation matrices.
pub trait AnnotationSource: Sync {
    fn read_matrix(&self, path: &Path) -> Result<IndicatorMatrix, InputError>;
}

/// Reads tab-separated matrices: a header of spot keys after one label cell,
/// then one `region<TAB>value...` row per region. Non-zero values are set.
#[derive(Debug, Clone, Copy, Default)]
pub struct TsvAnnotationReader;

impl AnnotationSource for TsvAnnotationReader {
    fn read_matrix(&self, path: &Path) -> Result<IndicatorMatrix, InputError> {
        let mut reader = open_maybe_gz(path)?;
        let mut spots: Option<Vec<String>> = None;
        let mut regions = Vec::new();
        let mut set = Vec::new();

        for_each_line(reader.as_mut(), |line_no, line| {
            let mut fields = line.split('\t');
            let first = fields.next().unwrap_or("").trim();
            let Some(header) = &spots else {
                spots = Some(fields.map(|s| s.trim().to_string()).collect());
                return Ok(());
            };
            let mut n = 0usize;
            for field in fields {
                let value = field.trim().parse::<f64>().map_err(|_| {
                    InputError::Parse(format!(
                        "{}: line {}: non-numeric indicator '{}'",
                        path.display(),
                        line_no,
                        field
                    ))
                })?;
                set.push(value != 0.0);
                n += 1;
            }
            if n != header.len() {
                return Err(InputError::Parse(format!(
                    "{}: line {}: expected {} indicators, found {}",
                    path.display(),
                    line_no,
                    header.len(),
                    n
                )));
            }
            regions.push(first.to_string());
            Ok(())
        })?;

        let spots = spots.ok_or_else(|| {
            InputError::InvalidInput(format!("{}: annotation file is empty", path.display()))
        })?;
        IndicatorMatrix::new(regions, spots, set)
    }
}
