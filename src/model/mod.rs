pub mod annotation;
pub mod coords;
pub mod density;

/// One spot of one array. Geometry, annotation and expression travel together
/// so their alignment cannot drift.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotRecord {
    pub key: String,
    pub pixel: [f64; 2],
    pub registered: [f64; 2],
    pub region: String,
    /// Posterior-mean intensity per gene, in schema gene order.
    pub expression: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayRecord {
    /// Escaped array identifier used as a container path segment.
    pub id: String,
    pub image_filename: String,
    pub resolution: (u32, u32),
    pub spot_radius: f64,
    pub title: String,
    pub levels: Vec<String>,
    pub spots: Vec<SpotRecord>,
}

impl ArrayRecord {
    pub fn pixel_coordinates(&self) -> Vec<[f64; 2]> {
        self.spots.iter().map(|s| s.pixel).collect()
    }

    pub fn registered_coordinates(&self) -> Vec<[f64; 2]> {
        self.spots.iter().map(|s| s.registered).collect()
    }

    pub fn annotations(&self) -> Vec<String> {
        self.spots.iter().map(|s| s.region.clone()).collect()
    }

    pub fn expressions(&self, gene: usize) -> Vec<f64> {
        self.spots.iter().map(|s| s.expression[gene]).collect()
    }
}

/// Coefficient densities of one gene, `[point × variable × region]` row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityTable {
    pub n_points: usize,
    pub n_variables: usize,
    pub n_regions: usize,
    pub values: Vec<f64>,
}

impl DensityTable {
    pub fn zeros(n_points: usize, n_variables: usize, n_regions: usize) -> Self {
        Self {
            n_points,
            n_variables,
            n_regions,
            values: vec![0.0; n_points * n_variables * n_regions],
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.n_points, self.n_variables, self.n_regions]
    }

    pub fn set_curve(&mut self, variable: usize, region: usize, curve: &[f64]) {
        for (point, &v) in curve.iter().enumerate() {
            let idx = (point * self.n_variables + variable) * self.n_regions + region;
            self.values[idx] = v;
        }
    }

    pub fn curve(&self, variable: usize, region: usize) -> Vec<f64> {
        (0..self.n_points)
            .map(|p| self.values[(p * self.n_variables + variable) * self.n_regions + region])
            .collect()
    }
}
