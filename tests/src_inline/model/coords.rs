use std::collections::HashMap;

use super::*;

fn keys(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|k| k.to_string()).collect()
}

#[test]
fn test_geometry_defaults() {
    let geom = GeometryConfig::default();
    let scale = geom.pixel_scale(620);
    assert!((scale - 194.0 / (6200.0 / 620.0)).abs() < 1e-12);
    let radius = geom.spot_radius(620);
    assert!((radius - 0.5 * 100e-6 * 620.0 / 6.2e-3).abs() < 1e-9);
}

#[test]
fn test_map_pixels_flips_y() {
    let geom = GeometryConfig::default();
    let pixels = map_pixels("A1", &keys(&["1_1", "1_2", "2_1"]), &geom, (620, 620)).unwrap();
    let s = 194.0 / (6200.0 / 620.0);
    assert_eq!(pixels.len(), 3);
    assert_eq!(pixels[0], [0.0, 620.0]);
    assert!((pixels[1][0] - 0.0).abs() < 1e-12);
    assert!((pixels[1][1] - (620.0 - s)).abs() < 1e-9);
    assert!((pixels[2][0] - s).abs() < 1e-9);
    assert!((pixels[2][1] - 620.0).abs() < 1e-9);
}

#[test]
fn test_map_pixels_uses_width_for_scale_and_height_for_flip() {
    let geom = GeometryConfig::default();
    let pixels = map_pixels("A1", &keys(&["3_2"]), &geom, (1240, 500)).unwrap();
    let s = geom.pixel_scale(1240);
    assert!((pixels[0][0] - 2.0 * s).abs() < 1e-9);
    assert!((pixels[0][1] - (500.0 - s)).abs() < 1e-9);
}

#[test]
fn test_map_pixels_rejects_bad_key() {
    let geom = GeometryConfig::default();
    let err = map_pixels("A1", &keys(&["1_1", "oops"]), &geom, (620, 620)).unwrap_err();
    assert!(matches!(err, CoordinateError::InvalidKey { .. }));
}

#[test]
fn test_resolve_registered() {
    let mut spots = HashMap::new();
    spots.insert("1_1".to_string(), "10_20".to_string());
    spots.insert("2_1".to_string(), "11.5_20".to_string());
    spots.insert("3_3".to_string(), "bad".to_string());
    let mut lookup = CommonCoordinateLookup::new();
    lookup.insert("A1.tsv".to_string(), spots);

    let out = resolve_registered("A1.tsv", &keys(&["2_1", "1_1"]), &lookup).unwrap();
    assert_eq!(out, vec![[11.5, 20.0], [10.0, 20.0]]);

    assert!(matches!(
        resolve_registered("B1.tsv", &keys(&["1_1"]), &lookup),
        Err(CoordinateError::UnregisteredArray(_))
    ));
    assert!(matches!(
        resolve_registered("A1.tsv", &keys(&["9_9"]), &lookup),
        Err(CoordinateError::UnregisteredSpot { .. })
    ));
    assert!(matches!(
        resolve_registered("A1.tsv", &keys(&["3_3"]), &lookup),
        Err(CoordinateError::InvalidRegistered { .. })
    ));
}
