use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use flate2::Compression;
use flate2::write::GzEncoder;

use super::*;

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn make_temp_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    let id = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!(
        "kira_spatialpack_samples_{}_{}",
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

const SHAPE: SampleShape = SampleShape {
    n_spots: 2,
    n_variables: 1,
    n_regions: 2,
};

const CSV: &str = "# model = spatial\n\
lp__,accept_stat__,log_lambda.1,log_lambda.2,beta_level_1.1.1,beta_level_1.1.2\n\
# adaptation terminated\n\
-10,0.9,0.5,1.5,0.1,-0.1\n\
-11,0.8,0.7,1.7,0.3,-0.3\n\
-12,0.7,0.9,1.9,0.5,-0.5\n";

#[test]
fn test_read_stan_csv() {
    let dir = make_temp_dir();
    let path = dir.join("combined_1.csv");
    write_file(&path, CSV);
    let set = read_stan_csv(&path, SHAPE).unwrap();
    assert_eq!(set.n_draws, 3);
    assert_eq!(set.log_lambda, vec![0.5, 1.5, 0.7, 1.7, 0.9, 1.9]);
    assert_eq!(set.beta_draws(0, 0), &[0.1, 0.3, 0.5]);
    assert_eq!(set.beta_draws(0, 1), &[-0.1, -0.3, -0.5]);
}

#[test]
fn test_read_stan_csv_gz_with_reordered_columns() {
    let dir = make_temp_dir();
    let path = dir.join("combined_2.csv.gz");
    let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
    enc.write_all(
        b"beta_level_1.1.2,log_lambda.2,beta_level_1.1.1,log_lambda.1\n-1,2,1,-2\n",
    )
    .unwrap();
    enc.finish().unwrap();
    let set = read_stan_csv(&path, SHAPE).unwrap();
    assert_eq!(set.n_draws, 1);
    assert_eq!(set.log_lambda, vec![-2.0, 2.0]);
    assert_eq!(set.beta_draws(0, 0), &[1.0]);
    assert_eq!(set.beta_draws(0, 1), &[-1.0]);
}

#[test]
fn test_read_stan_csv_header_only_has_zero_draws() {
    let dir = make_temp_dir();
    let path = dir.join("combined_1.csv");
    write_file(
        &path,
        "log_lambda.1,log_lambda.2,beta_level_1.1.1,beta_level_1.1.2\n",
    );
    let set = read_stan_csv(&path, SHAPE).unwrap();
    assert_eq!(set.n_draws, 0);
    assert!(set.log_lambda.is_empty());
}

#[test]
fn test_read_stan_csv_rejects_bad_headers() {
    let dir = make_temp_dir();
    let cases = [
        ("missing", "log_lambda.1,beta_level_1.1.1,beta_level_1.1.2\n"),
        (
            "duplicate",
            "log_lambda.1,log_lambda.1,log_lambda.2,beta_level_1.1.1,beta_level_1.1.2\n",
        ),
        (
            "range",
            "log_lambda.1,log_lambda.3,log_lambda.2,beta_level_1.1.1,beta_level_1.1.2\n",
        ),
        ("empty", "# only comments\n"),
    ];
    for (name, contents) in cases {
        let path = dir.join(format!("{name}.csv"));
        write_file(&path, contents);
        let err = read_stan_csv(&path, SHAPE).unwrap_err();
        assert!(matches!(err, InputError::InvalidInput(_)), "{name}: {err}");
    }
}

#[test]
fn test_read_stan_csv_rejects_bad_rows() {
    let dir = make_temp_dir();
    let header = "log_lambda.1,log_lambda.2,beta_level_1.1.1,beta_level_1.1.2\n";

    let short = dir.join("short.csv");
    write_file(&short, &format!("{header}1,2,3\n"));
    assert!(matches!(
        read_stan_csv(&short, SHAPE).unwrap_err(),
        InputError::Parse(_)
    ));

    let text = dir.join("text.csv");
    write_file(&text, &format!("{header}1,x,3,4\n"));
    assert!(matches!(
        read_stan_csv(&text, SHAPE).unwrap_err(),
        InputError::Parse(_)
    ));
}

#[test]
fn test_discover_sample_files() {
    let dir = make_temp_dir();
    fs::create_dir_all(dir.join("chain_a")).unwrap();
    fs::create_dir_all(dir.join("chain_b")).unwrap();
    write_file(&dir.join("chain_a").join("combined_1.csv"), "");
    write_file(&dir.join("chain_b").join("combined_2.csv.gz"), "");
    write_file(&dir.join("chain_b").join("combined_x.csv"), "");
    write_file(&dir.join("chain_b").join("notes.txt"), "");
    write_file(&dir.join("combined_3.csv"), "");

    let found = discover_sample_files(&dir).unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[&0], dir.join("chain_a").join("combined_1.csv"));
    assert_eq!(found[&1], dir.join("chain_b").join("combined_2.csv.gz"));
}

#[test]
fn test_discover_sample_files_rejects_duplicates_and_zero() {
    let dir = make_temp_dir();
    fs::create_dir_all(dir.join("a")).unwrap();
    fs::create_dir_all(dir.join("b")).unwrap();
    write_file(&dir.join("a").join("combined_1.csv"), "");
    write_file(&dir.join("b").join("combined_1.csv.gz"), "");
    assert!(matches!(
        discover_sample_files(&dir).unwrap_err(),
        InputError::InvalidInput(_)
    ));

    let zero = make_temp_dir();
    fs::create_dir_all(zero.join("a")).unwrap();
    write_file(&zero.join("a").join("combined_0.csv"), "");
    assert!(matches!(
        discover_sample_files(&zero).unwrap_err(),
        InputError::InvalidInput(_)
    ));
}
