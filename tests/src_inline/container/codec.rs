use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::container::join_path;

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn make_temp_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    let id = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("kira_spatialpack_codec_{}_{}", std::process::id(), id));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn sample_container() -> Container {
    let mut c = Container::new();
    c.insert(
        "beta/density_evaluation_points",
        Dataset::vector_f64(vec![-1.0, 0.0, 1.0]),
    )
    .unwrap();
    c.insert(
        &join_path(&["beta", "density", "Actb"]),
        Dataset::new(vec![3, 1, 2], Data::F64(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6])).unwrap(),
    )
    .unwrap();
    c.insert(
        "genes",
        Dataset::strings(vec!["Actb".to_string(), "H2 K1".to_string(), String::new()]),
    )
    .unwrap();
    c.insert("level_1/KO/files", Dataset::strings(Vec::new())).unwrap();
    c.insert("arrays/A1/image/resolution", Dataset::vector_u32(vec![620, 480]))
        .unwrap();
    c.insert("arrays/A1/image/spot_radius", Dataset::scalar_f64(5.0))
        .unwrap();
    c.insert("arrays/A1/image/title", Dataset::scalar_str("WT (a.jpg)"))
        .unwrap();
    c.create_group("arrays/A1/data/expressions").unwrap();
    c
}

fn write(bytes: &[u8]) -> PathBuf {
    let dir = make_temp_dir();
    let path = dir.join("pack.bin");
    fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn test_encode_open_load_round_trip() {
    let c = sample_container();
    let bytes = encode(&c);
    assert_eq!(&bytes[0..4], MAGIC);
    assert_eq!(bytes.len() as u64, u64::from_le_bytes(bytes[56..64].try_into().unwrap()));

    let file = ContainerFile::open(&write(&bytes)).unwrap();
    assert_eq!(file.header.n_nodes as usize, c.len());
    assert_eq!(file.header.data_offset % 64, 0);
    assert_eq!(file.load().unwrap(), c);
}

#[test]
fn test_entries_describe_nodes() {
    let file = ContainerFile::open(&write(&encode(&sample_container()))).unwrap();
    let density = file.entry("beta/density/Actb").unwrap();
    assert_eq!(density.dtype, Some(DType::F64));
    assert_eq!(density.shape, vec![3, 1, 2]);
    assert_eq!(density.bytes, 48);
    assert_eq!(density.offset % 8, 0);
    assert_eq!(file.entry("beta").unwrap().dtype, None);
    assert!(file.entry("missing").is_none());

    let paths: Vec<&str> = file.entries().map(|(p, _)| p).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);
}

#[test]
fn test_read_single_dataset() {
    let file = ContainerFile::open(&write(&encode(&sample_container()))).unwrap();
    let genes = file.read_dataset("genes").unwrap();
    assert_eq!(
        genes.as_strings().unwrap(),
        &["Actb".to_string(), "H2 K1".to_string(), String::new()]
    );
    let res = file.read_dataset("arrays/A1/image/resolution").unwrap();
    assert_eq!(res.as_u32().unwrap(), &[620, 480]);
    assert!(matches!(
        file.read_dataset("beta"),
        Err(ContainerError::TypeMismatch { .. })
    ));
    assert!(matches!(
        file.read_dataset("nope"),
        Err(ContainerError::NotFound(_))
    ));
}

#[test]
fn test_empty_container_round_trip() {
    let c = Container::new();
    let file = ContainerFile::open(&write(&encode(&c))).unwrap();
    assert_eq!(file.header.n_nodes, 0);
    assert_eq!(file.load().unwrap(), c);
}

#[test]
fn test_detects_corruption() {
    let bytes = encode(&sample_container());

    let mut data_flip = bytes.clone();
    let last = data_flip.len() - 1;
    data_flip[last] ^= 0xFF;
    let err = ContainerFile::open(&write(&data_flip)).err().unwrap();
    assert!(err.to_string().contains("data_crc64"), "{err}");

    let mut header_flip = bytes.clone();
    header_flip[20] ^= 0x01;
    let err = ContainerFile::open(&write(&header_flip)).err().unwrap();
    assert!(err.to_string().contains("header_crc64"), "{err}");

    let mut magic = bytes.clone();
    magic[0] = b'X';
    assert!(matches!(
        ContainerFile::open(&write(&magic)),
        Err(ContainerError::Format(_))
    ));

    let truncated = &bytes[..bytes.len() - 1];
    assert!(matches!(
        ContainerFile::open(&write(truncated)),
        Err(ContainerError::Format(_))
    ));
}

#[test]
fn test_crc64_ecma_reference_value() {
    assert_eq!(crc64_ecma(b""), 0);
    assert_eq!(crc64_ecma(b"123456789"), 0x6C40_DF5F_0B49_7347);
}
