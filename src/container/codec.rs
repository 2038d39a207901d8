use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::container::{Container, ContainerError, DType, Data, Dataset, Node};

pub const MAGIC: &[u8; 4] = b"KSPK";
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;
pub const HEADER_SIZE: usize = 128;
const ENDIAN_TAG: u32 = 0x1234_5678;
const HEADER_CRC_RANGE: std::ops::Range<usize> = 72..80;

const KIND_GROUP: u8 = 0;
const KIND_DATASET: u8 = 1;

#[derive(Debug, Clone)]
pub struct Header {
    pub n_nodes: u64,
    pub index_offset: u64,
    pub index_bytes: u64,
    pub data_offset: u64,
    pub data_bytes: u64,
    pub file_bytes: u64,
    pub data_crc64: u64,
    pub header_crc64: u64,
}

/// Index record of one node; dataset bytes are located relative to the data section.
#[derive(Debug, Clone)]
pub struct Entry {
    pub dtype: Option<DType>,
    pub shape: Vec<usize>,
    pub offset: u64,
    pub bytes: u64,
}

/// Serializes the whole tree. Layout: header, path index, 64-byte aligned data section.
pub fn encode(container: &Container) -> Vec<u8> {
    let mut index = Vec::new();
    let mut data = Vec::new();

    for (path, node) in container.nodes() {
        put_u32(&mut index, path.len() as u32);
        index.extend_from_slice(path.as_bytes());
        match node {
            Node::Group => {
                index.push(KIND_GROUP);
                index.push(0);
                put_u16(&mut index, 0);
                put_u64(&mut index, 0);
                put_u64(&mut index, 0);
            }
            Node::Dataset(ds) => {
                pad_to(&mut data, 8);
                let offset = data.len() as u64;
                encode_data(&mut data, &ds.data);
                index.push(KIND_DATASET);
                index.push(ds.data.dtype() as u8);
                put_u16(&mut index, ds.shape.len() as u16);
                for &dim in &ds.shape {
                    put_u64(&mut index, dim as u64);
                }
                put_u64(&mut index, offset);
                put_u64(&mut index, data.len() as u64 - offset);
            }
        }
    }

    let index_offset = HEADER_SIZE;
    let data_offset = align64(index_offset + index.len());
    let file_bytes = data_offset + data.len();

    let mut out = vec![0u8; file_bytes];
    out[0..4].copy_from_slice(MAGIC);
    out[4..6].copy_from_slice(&VERSION_MAJOR.to_le_bytes());
    out[6..8].copy_from_slice(&VERSION_MINOR.to_le_bytes());
    out[8..12].copy_from_slice(&ENDIAN_TAG.to_le_bytes());
    out[12..16].copy_from_slice(&(HEADER_SIZE as u32).to_le_bytes());
    out[16..24].copy_from_slice(&(container.len() as u64).to_le_bytes());
    out[24..32].copy_from_slice(&(index_offset as u64).to_le_bytes());
    out[32..40].copy_from_slice(&(index.len() as u64).to_le_bytes());
    out[40..48].copy_from_slice(&(data_offset as u64).to_le_bytes());
    out[48..56].copy_from_slice(&(data.len() as u64).to_le_bytes());
    out[56..64].copy_from_slice(&(file_bytes as u64).to_le_bytes());
    out[64..72].copy_from_slice(&crc64_ecma(&data).to_le_bytes());

    out[index_offset..index_offset + index.len()].copy_from_slice(&index);
    out[data_offset..].copy_from_slice(&data);

    let crc = crc64_ecma(&out[0..HEADER_SIZE]);
    out[HEADER_CRC_RANGE].copy_from_slice(&crc.to_le_bytes());
    out
}

fn encode_data(out: &mut Vec<u8>, data: &Data) {
    match data {
        Data::F64(values) => {
            for v in values {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        Data::U32(values) => {
            for v in values {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        Data::Utf8(values) => {
            put_u32(out, values.len() as u32);
            let mut end = 0u32;
            put_u32(out, 0);
            for s in values {
                end += s.len() as u32;
                put_u32(out, end);
            }
            for s in values {
                out.extend_from_slice(s.as_bytes());
            }
        }
    }
}

/// Memory-mapped, validated container file.
pub struct ContainerFile {
    mmap: Mmap,
    pub header: Header,
    entries: BTreeMap<String, Entry>,
}

impl ContainerFile {
    pub fn open(path: &Path) -> Result<Self, ContainerError> {
        let file = File::open(path)?;
        // The file is never mutated after the final rename.
        let mmap = unsafe { Mmap::map(&file)? };
        let header = parse_header(&mmap)?;
        validate_header(&header, &mmap)?;
        let index = slice(&mmap, header.index_offset, header.index_bytes)?;
        let entries = parse_index(index, header.n_nodes as usize)?;
        Ok(Self {
            mmap,
            header,
            entries,
        })
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn entry(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    pub fn read_dataset(&self, path: &str) -> Result<Dataset, ContainerError> {
        let entry = self
            .entries
            .get(path)
            .ok_or_else(|| ContainerError::NotFound(path.to_string()))?;
        let Some(dtype) = entry.dtype else {
            return Err(ContainerError::TypeMismatch {
                path: path.to_string(),
                expected: "dataset",
            });
        };
        let data_section = slice(&self.mmap, self.header.data_offset, self.header.data_bytes)?;
        let bytes = slice(data_section, entry.offset, entry.bytes)?;
        let n = entry.shape.iter().product::<usize>();
        let data = decode_data(bytes, dtype, n)?;
        Dataset::new(entry.shape.clone(), data)
    }

    /// Loads every node into an in-memory tree.
    pub fn load(&self) -> Result<Container, ContainerError> {
        let mut container = Container::new();
        for (path, entry) in &self.entries {
            let node = match entry.dtype {
                None => Node::Group,
                Some(_) => Node::Dataset(self.read_dataset(path)?),
            };
            container.insert_node(path.clone(), node)?;
        }
        Ok(container)
    }
}

fn parse_header(bytes: &[u8]) -> Result<Header, ContainerError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ContainerError::Format("file smaller than header".to_string()));
    }
    if &bytes[0..4] != MAGIC {
        return Err(ContainerError::Format(
            "invalid magic; expected KSPK".to_string(),
        ));
    }
    let major = read_u16(bytes, 4)?;
    let minor = read_u16(bytes, 6)?;
    if major != VERSION_MAJOR || minor != VERSION_MINOR {
        return Err(ContainerError::Format(format!(
            "unsupported version: {major}.{minor}"
        )));
    }
    if read_u32(bytes, 8)? != ENDIAN_TAG {
        return Err(ContainerError::Format(
            "unsupported endianness tag".to_string(),
        ));
    }
    if read_u32(bytes, 12)? as usize != HEADER_SIZE {
        return Err(ContainerError::Format(format!(
            "invalid header_size; expected {HEADER_SIZE}"
        )));
    }
    Ok(Header {
        n_nodes: read_u64(bytes, 16)?,
        index_offset: read_u64(bytes, 24)?,
        index_bytes: read_u64(bytes, 32)?,
        data_offset: read_u64(bytes, 40)?,
        data_bytes: read_u64(bytes, 48)?,
        file_bytes: read_u64(bytes, 56)?,
        data_crc64: read_u64(bytes, 64)?,
        header_crc64: read_u64(bytes, 72)?,
    })
}

fn validate_header(header: &Header, bytes: &[u8]) -> Result<(), ContainerError> {
    if header.file_bytes as usize != bytes.len() {
        return Err(ContainerError::Format(
            "file_bytes does not match file length".to_string(),
        ));
    }
    let mut hdr = bytes[0..HEADER_SIZE].to_vec();
    hdr[HEADER_CRC_RANGE].fill(0);
    if crc64_ecma(&hdr) != header.header_crc64 {
        return Err(ContainerError::Format("header_crc64 mismatch".to_string()));
    }
    let data = slice(bytes, header.data_offset, header.data_bytes)?;
    if crc64_ecma(data) != header.data_crc64 {
        return Err(ContainerError::Format("data_crc64 mismatch".to_string()));
    }
    Ok(())
}

fn parse_index(index: &[u8], n_nodes: usize) -> Result<BTreeMap<String, Entry>, ContainerError> {
    let mut entries = BTreeMap::new();
    let mut pos = 0usize;
    for _ in 0..n_nodes {
        let path_len = read_u32(index, pos)? as usize;
        pos += 4;
        let path = std::str::from_utf8(slice(index, pos as u64, path_len as u64)?)
            .map_err(|_| ContainerError::Format("invalid utf-8 in path".to_string()))?
            .to_string();
        pos += path_len;
        let kind = *index
            .get(pos)
            .ok_or_else(|| ContainerError::Format("index truncated".to_string()))?;
        let dtype_tag = *index
            .get(pos + 1)
            .ok_or_else(|| ContainerError::Format("index truncated".to_string()))?;
        let rank = read_u16(index, pos + 2)? as usize;
        pos += 4;
        let mut shape = Vec::with_capacity(rank);
        for _ in 0..rank {
            shape.push(read_u64(index, pos)? as usize);
            pos += 8;
        }
        let offset = read_u64(index, pos)?;
        let bytes = read_u64(index, pos + 8)?;
        pos += 16;

        let dtype = match kind {
            KIND_GROUP => None,
            KIND_DATASET => Some(DType::from_tag(dtype_tag).ok_or_else(|| {
                ContainerError::Format(format!("unknown dtype {dtype_tag} at '{path}'"))
            })?),
            other => {
                return Err(ContainerError::Format(format!(
                    "unknown node kind {other} at '{path}'"
                )));
            }
        };
        if entries
            .insert(
                path.clone(),
                Entry {
                    dtype,
                    shape,
                    offset,
                    bytes,
                },
            )
            .is_some()
        {
            return Err(ContainerError::Format(format!("duplicate path '{path}'")));
        }
    }
    if pos != index.len() {
        return Err(ContainerError::Format(
            "index has trailing bytes".to_string(),
        ));
    }
    Ok(entries)
}

fn decode_data(bytes: &[u8], dtype: DType, n: usize) -> Result<Data, ContainerError> {
    match dtype {
        DType::F64 => {
            if bytes.len() != n * 8 {
                return Err(ContainerError::Format("f64 dataset size mismatch".to_string()));
            }
            let mut out = Vec::with_capacity(n);
            for i in 0..n {
                out.push(f64::from_bits(read_u64(bytes, i * 8)?));
            }
            Ok(Data::F64(out))
        }
        DType::U32 => {
            if bytes.len() != n * 4 {
                return Err(ContainerError::Format("u32 dataset size mismatch".to_string()));
            }
            let mut out = Vec::with_capacity(n);
            for i in 0..n {
                out.push(read_u32(bytes, i * 4)?);
            }
            Ok(Data::U32(out))
        }
        DType::Utf8 => parse_string_table(bytes, n).map(Data::Utf8),
    }
}

fn parse_string_table(tbl: &[u8], expected_count: usize) -> Result<Vec<String>, ContainerError> {
    let count = read_u32(tbl, 0)? as usize;
    if count != expected_count {
        return Err(ContainerError::Format(
            "string table count mismatch".to_string(),
        ));
    }
    let blob_start = 4 + (count + 1) * 4;
    let blob = tbl
        .get(blob_start..)
        .ok_or_else(|| ContainerError::Format("string table offsets out of bounds".to_string()))?;
    let mut out = Vec::with_capacity(count);
    let mut start = read_u32(tbl, 4)? as usize;
    for i in 0..count {
        let end = read_u32(tbl, 4 + (i + 1) * 4)? as usize;
        let raw = blob.get(start..end).ok_or_else(|| {
            ContainerError::Format("string table offsets not monotonic".to_string())
        })?;
        let s = std::str::from_utf8(raw)
            .map_err(|_| ContainerError::Format("invalid utf-8 in string table".to_string()))?;
        out.push(s.to_string());
        start = end;
    }
    Ok(out)
}

fn slice(bytes: &[u8], offset: u64, len: u64) -> Result<&[u8], ContainerError> {
    let start = offset as usize;
    let end = start
        .checked_add(len as usize)
        .ok_or_else(|| ContainerError::Format("offset overflow".to_string()))?;
    bytes
        .get(start..end)
        .ok_or_else(|| ContainerError::Format(format!("range {start}..{end} out of bounds")))
}

fn read_u16(bytes: &[u8], offset: usize) -> Result<u16, ContainerError> {
    let raw = slice(bytes, offset as u64, 2)?;
    Ok(u16::from_le_bytes([raw[0], raw[1]]))
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, ContainerError> {
    let raw = slice(bytes, offset as u64, 4)?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(raw);
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(bytes: &[u8], offset: usize) -> Result<u64, ContainerError> {
    let raw = slice(bytes, offset as u64, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(raw);
    Ok(u64::from_le_bytes(buf))
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn pad_to(out: &mut Vec<u8>, align: usize) {
    let rem = out.len() % align;
    if rem != 0 {
        out.resize(out.len() + align - rem, 0);
    }
}

fn align64(v: usize) -> usize {
    let rem = v % 64;
    if rem == 0 { v } else { v + (64 - rem) }
}

pub fn crc64_ecma(bytes: &[u8]) -> u64 {
    let mut crc = 0u64;
    for &b in bytes {
        crc ^= (b as u64) << 56;
        for _ in 0..8 {
            if (crc & 0x8000_0000_0000_0000) != 0 {
                crc = (crc << 1) ^ 0x42F0_E1EB_A9EA_3693;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

#[cfg(test)]
#[path = "../../tests/src_inline/container/codec.rs"]
mod tests;
