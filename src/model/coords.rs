use thiserror::Error;

use crate::input::parse_coordinate_key;
use crate::input::registration::CommonCoordinateLookup;

#[derive(Debug, Error)]
pub enum CoordinateError {
    #[error("array {array}: invalid spot key: {message}")]
    InvalidKey { array: String, message: String },
    #[error("registration has no entry for array {0}")]
    UnregisteredArray(String),
    #[error("array {array}: registration has no entry for spot {key}")]
    UnregisteredSpot { array: String, key: String },
    #[error("array {array}: spot {key} has malformed registered coordinate: {message}")]
    InvalidRegistered {
        array: String,
        key: String,
        message: String,
    },
}

/// Physical constants linking the spot grid to image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryConfig {
    /// Spot-to-spot distance in pixels on an image of `reference_width_px`.
    pub spot_pitch_px: f64,
    pub reference_width_px: f64,
    pub spot_diameter_m: f64,
    pub array_width_m: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            spot_pitch_px: 194.0,
            reference_width_px: 6200.0,
            spot_diameter_m: 100.0e-6,
            array_width_m: 6.2e-3,
        }
    }
}

impl GeometryConfig {
    pub fn pixel_scale(&self, image_width: u32) -> f64 {
        self.spot_pitch_px / (self.reference_width_px / image_width as f64)
    }

    pub fn spot_radius(&self, image_width: u32) -> f64 {
        0.5 * self.spot_diameter_m * image_width as f64 / self.array_width_m
    }

    /// 1-indexed grid position to image pixels, y measured from the top edge.
    pub fn to_pixel(&self, raw: [f64; 2], resolution: (u32, u32)) -> [f64; 2] {
        let scale = self.pixel_scale(resolution.0);
        let x = scale * (raw[0] - 1.0);
        let y = scale * (raw[1] - 1.0);
        [x, resolution.1 as f64 - y]
    }
}

pub fn map_pixels(
    array: &str,
    keys: &[String],
    geometry: &GeometryConfig,
    resolution: (u32, u32),
) -> Result<Vec<[f64; 2]>, CoordinateError> {
    keys.iter()
        .map(|key| {
            let raw = parse_coordinate_key(key).map_err(|e| CoordinateError::InvalidKey {
                array: array.to_string(),
                message: e.to_string(),
            })?;
            Ok(geometry.to_pixel(raw, resolution))
        })
        .collect()
}

/// Looks every spot key up in the registration output, in `keys` order.
pub fn resolve_registered(
    count_file: &str,
    keys: &[String],
    lookup: &CommonCoordinateLookup,
) -> Result<Vec<[f64; 2]>, CoordinateError> {
    let spots = lookup
        .get(count_file)
        .ok_or_else(|| CoordinateError::UnregisteredArray(count_file.to_string()))?;
    keys.iter()
        .map(|key| {
            let value = spots
                .get(key)
                .ok_or_else(|| CoordinateError::UnregisteredSpot {
                    array: count_file.to_string(),
                    key: key.clone(),
                })?;
            parse_coordinate_key(value).map_err(|e| CoordinateError::InvalidRegistered {
                array: count_file.to_string(),
                key: key.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "../../tests/src_inline/model/coords.rs"]
mod tests;
