use super::*;

fn matrix() -> IndicatorMatrix {
    let regions = vec!["Cortex".to_string(), "Striatum".to_string()];
    let spots = vec![
        "1_1".to_string(),
        "1_2".to_string(),
        "2_1".to_string(),
        "2_2".to_string(),
    ];
    let set = vec![
        true, false, false, true, // Cortex
        false, true, false, true, // Striatum
    ];
    IndicatorMatrix::new(regions, spots, set).unwrap()
}

fn keys(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|k| k.to_string()).collect()
}

#[test]
fn test_match_regions_follows_key_order() {
    let out = match_regions(&matrix(), &keys(&["1_2", "1_1"])).unwrap();
    assert_eq!(out, vec!["Striatum", "Cortex"]);
}

#[test]
fn test_unassigned_spot_is_an_error() {
    let err = match_regions(&matrix(), &keys(&["1_1", "2_1"])).unwrap_err();
    assert_eq!(err, AnnotationError::Unassigned("2_1".to_string()));
}

#[test]
fn test_multiple_regions_is_an_error() {
    let err = match_regions(&matrix(), &keys(&["2_2"])).unwrap_err();
    assert_eq!(
        err,
        AnnotationError::Ambiguous {
            key: "2_2".to_string(),
            regions: vec!["Cortex".to_string(), "Striatum".to_string()],
        }
    );
}

#[test]
fn test_missing_spot_is_an_error() {
    let err = match_regions(&matrix(), &keys(&["5_5"])).unwrap_err();
    assert_eq!(err, AnnotationError::MissingSpot("5_5".to_string()));
}

#[test]
fn test_indicator_matrix_validation() {
    let err = IndicatorMatrix::new(vec!["R".to_string()], vec!["1_1".to_string()], vec![])
        .unwrap_err();
    assert!(err.to_string().contains("cells"));
    let err = IndicatorMatrix::new(
        vec!["R".to_string()],
        vec!["1_1".to_string(), "1_1".to_string()],
        vec![true, false],
    )
    .unwrap_err();
    assert!(err.to_string().contains("twice"));
}
