use rayon::prelude::*;

use crate::error::PackError;
use crate::input::annotation::AnnotationSource;
use crate::input::probe::ImageProbe;
use crate::input::registration::CommonCoordinateLookup;
use crate::model::annotation::match_regions;
use crate::model::coords::{GeometryConfig, map_pixels, resolve_registered};
use crate::model::{ArrayRecord, SpotRecord};
use crate::pipeline::stage1_schema::{ArraySchema, Schema};
use crate::pipeline::stage2_genes::ExpressionTable;

pub struct Stage3Inputs<'a> {
    pub schema: &'a Schema,
    pub expression: &'a ExpressionTable,
    pub registered: &'a CommonCoordinateLookup,
    pub annotations: &'a dyn AnnotationSource,
    pub images: &'a dyn ImageProbe,
    pub geometry: GeometryConfig,
}

pub fn build_array_record(
    array: &ArraySchema,
    inputs: &Stage3Inputs<'_>,
) -> Result<ArrayRecord, PackError> {
    let resolution = inputs
        .images
        .dimensions(&array.image_file)
        .map_err(|e| PackError::Data(format!("array {}: {e}", array.count_file)))?;

    let pixels = map_pixels(
        &array.count_file,
        &array.spot_keys,
        &inputs.geometry,
        resolution,
    )
    .map_err(|e| PackError::Data(e.to_string()))?;
    let registered = resolve_registered(&array.count_file, &array.spot_keys, inputs.registered)
        .map_err(|e| PackError::Data(e.to_string()))?;

    let matrix = inputs
        .annotations
        .read_matrix(&array.annotation_file)
        .map_err(|e| PackError::Data(format!("array {}: {e}", array.count_file)))?;
    let regions = match_regions(&matrix, &array.spot_keys)
        .map_err(|e| PackError::Data(format!("array {}: {e}", array.count_file)))?;
    for region in &regions {
        if !inputs.schema.regions.contains(region) {
            tracing::warn!(
                array = %array.count_file,
                region = %region,
                "annotation region is not among the manifest regions"
            );
            break;
        }
    }

    let n_genes = inputs.expression.n_genes();
    let spots = array
        .spot_keys
        .iter()
        .zip(&array.spot_columns)
        .zip(pixels)
        .zip(registered)
        .zip(regions)
        .map(|((((key, &column), pixel), registered), region)| SpotRecord {
            key: key.clone(),
            pixel,
            registered,
            region,
            expression: (0..n_genes)
                .map(|gene| inputs.expression.value(gene, column))
                .collect(),
        })
        .collect();

    Ok(ArrayRecord {
        id: array.id.clone(),
        image_filename: array.image_basename(),
        resolution,
        spot_radius: inputs.geometry.spot_radius(resolution.0),
        title: array.title(),
        levels: array.levels.clone(),
        spots,
    })
}

/// Builds every array record in parallel, in schema array order.
pub fn run_stage3(inputs: &Stage3Inputs<'_>) -> Result<Vec<ArrayRecord>, PackError> {
    inputs
        .schema
        .arrays
        .par_iter()
        .map(|array| build_array_record(array, inputs))
        .collect()
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage3_arrays.rs"]
mod tests;
