use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::input::manifest::{ArrayMetadata, BETA_LEVEL_1, Manifest};
use crate::pipeline::stage1_schema::build_schema;

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn make_temp_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    let id = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!(
        "kira_spatialpack_stage2_{}_{}",
        std::process::id(),
        id
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_file(path: &Path, contents: &str) {
    let mut f = BufWriter::new(File::create(path).unwrap());
    f.write_all(contents.as_bytes()).unwrap();
}

fn schema() -> Schema {
    let mut beta_mapping = BTreeMap::new();
    beta_mapping.insert(BETA_LEVEL_1.to_string(), vec!["WT".to_string()]);
    let manifest = Manifest {
        genes: vec!["Actb".to_string(), "Gapdh".to_string()],
        metadata: vec![ArrayMetadata {
            count_file: "A1".to_string(),
            image_file: PathBuf::from("A1.jpg"),
            annotation_file: PathBuf::from("A1.tsv"),
            levels: vec!["WT".to_string()],
        }],
        n_levels: 1,
        region_names: vec!["Cortex".to_string(), "Striatum".to_string()],
        scaling_factor: 1.0,
        beta_mapping,
        filenames_and_coordinates: ["1_1", "1_2", "2_1"]
            .iter()
            .map(|k| ("A1".to_string(), k.to_string()))
            .collect(),
    };
    build_schema(&manifest).unwrap()
}

const HEADER: &str =
    "lp__,log_lambda.1,log_lambda.2,log_lambda.3,beta_level_1.1.1,beta_level_1.1.2\n";

fn write_gene(dir: &Path, n: usize, rows: &[&str]) -> PathBuf {
    let path = dir.join(format!("combined_{n}.csv"));
    let mut contents = String::from("# stan\n");
    contents.push_str(HEADER);
    for row in rows {
        contents.push_str(row);
        contents.push('\n');
    }
    write_file(&path, &contents);
    path
}

#[test]
fn test_resolve_sample_files_pairs_in_gene_order() {
    let schema = schema();
    let mut found = BTreeMap::new();
    found.insert(1, PathBuf::from("b/combined_2.csv"));
    found.insert(0, PathBuf::from("a/combined_1.csv"));
    let files = resolve_sample_files(&schema, found).unwrap();
    assert_eq!(
        files,
        vec![
            PathBuf::from("a/combined_1.csv"),
            PathBuf::from("b/combined_2.csv")
        ]
    );
}

#[test]
fn test_resolve_sample_files_rejects_gaps_and_strays() {
    let schema = schema();
    let mut missing = BTreeMap::new();
    missing.insert(0, PathBuf::from("a/combined_1.csv"));
    let err = resolve_sample_files(&schema, missing).unwrap_err();
    assert!(matches!(err, PackError::Precondition(ref m) if m.contains("Gapdh")));

    let mut stray = BTreeMap::new();
    stray.insert(0, PathBuf::from("a/combined_1.csv"));
    stray.insert(1, PathBuf::from("a/combined_2.csv"));
    stray.insert(2, PathBuf::from("a/combined_3.csv"));
    let err = resolve_sample_files(&schema, stray).unwrap_err();
    assert!(matches!(err, PackError::Precondition(ref m) if m.contains("combined_3")));
}

#[test]
fn test_posterior_means() {
    let samples = PosteriorSampleSet {
        shape: SampleShape {
            n_spots: 2,
            n_variables: 0,
            n_regions: 0,
        },
        n_draws: 2,
        log_lambda: vec![0.0, 1.0, 2.0f64.ln(), 3.0],
        beta: Vec::new(),
    };
    let means = posterior_means(&samples);
    assert!((means[0] - 1.5).abs() < 1e-12);
    assert!((means[1] - 0.5 * (1f64.exp() + 3f64.exp())).abs() < 1e-12);
}

#[test]
fn test_run_stage2_keeps_gene_order() {
    let dir = make_temp_dir();
    let schema = schema();
    let actb = write_gene(&dir, 1, &["-5,0,0,0,0.1,0.2", "-5,0,0,0,0.3,0.4"]);
    let gapdh = write_gene(&dir, 2, &["-5,1,1,1,0.5,0.6"]);
    let grid = EvaluationGrid::symmetric(10.0, 50).unwrap();

    let out = run_stage2(&schema, &[actb, gapdh], &grid).unwrap();
    assert_eq!(out.expression.n_genes(), 2);
    assert_eq!(out.expression.rows[0], vec![1.0, 1.0, 1.0]);
    assert!((out.expression.value(1, 2) - 1f64.exp()).abs() < 1e-12);
    assert_eq!(out.densities.len(), 2);
    for table in &out.densities {
        assert_eq!(table.shape(), [50, 1, 2]);
        assert!(table.values.iter().all(|v| *v >= 0.0));
    }
}

#[test]
fn test_run_stage2_rejects_empty_and_non_finite_samples() {
    let dir = make_temp_dir();
    let schema = schema();
    let grid = EvaluationGrid::symmetric(10.0, 50).unwrap();
    let ok = write_gene(&dir, 1, &["-5,0,0,0,0.1,0.2"]);

    let empty = write_gene(&make_temp_dir(), 2, &[]);
    let err = run_stage2(&schema, &[ok.clone(), empty], &grid).unwrap_err();
    assert!(matches!(err, PackError::Data(ref m) if m.contains("Gapdh")));

    let inf = write_gene(&make_temp_dir(), 2, &["-5,0,inf,0,0.1,0.2"]);
    let err = run_stage2(&schema, &[ok.clone(), inf], &grid).unwrap_err();
    assert!(matches!(err, PackError::Data(ref m) if m.contains("spot column 2")));

    let nan_beta = write_gene(&make_temp_dir(), 2, &["-5,0,0,0,NaN,0.2"]);
    let err = run_stage2(&schema, &[ok, nan_beta], &grid).unwrap_err();
    assert!(matches!(err, PackError::Data(_)));
}
