//! Hierarchical, self-describing binary container.
//!
//! A container is a tree of groups and typed n-dimensional datasets addressed
//! by `/`-separated paths. It is assembled fully in memory and serialized in
//! one pass by [`codec::encode`]; [`codec::ContainerFile`] maps a file back.

use std::collections::BTreeMap;

use thiserror::Error;

pub mod codec;

pub const PATH_SEPARATOR: char = '/';

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid path '{0}'")]
    InvalidPath(String),
    #[error("'{0}' already exists")]
    Exists(String),
    #[error("'{0}' not found")]
    NotFound(String),
    #[error("'{0}' is a dataset, not a group")]
    NotAGroup(String),
    #[error("shape {shape:?} needs {expected} values, got {actual}")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    #[error("'{path}' does not hold {expected} data")]
    TypeMismatch { path: String, expected: &'static str },
    #[error("invalid container: {0}")]
    Format(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DType {
    F64 = 1,
    U32 = 2,
    Utf8 = 3,
}

impl DType {
    pub fn name(self) -> &'static str {
        match self {
            DType::F64 => "f64",
            DType::U32 => "u32",
            DType::Utf8 => "utf8",
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(DType::F64),
            2 => Some(DType::U32),
            3 => Some(DType::Utf8),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    F64(Vec<f64>),
    U32(Vec<u32>),
    Utf8(Vec<String>),
}

impl Data {
    pub fn len(&self) -> usize {
        match self {
            Data::F64(v) => v.len(),
            Data::U32(v) => v.len(),
            Data::Utf8(v) => v.len(),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            Data::F64(_) => DType::F64,
            Data::U32(_) => DType::U32,
            Data::Utf8(_) => DType::Utf8,
        }
    }
}

/// Row-major n-dimensional array. Rank 0 is a scalar.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub shape: Vec<usize>,
    pub data: Data,
}

impl Dataset {
    pub fn new(shape: Vec<usize>, data: Data) -> Result<Self, ContainerError> {
        let expected = shape.iter().product::<usize>();
        if expected != data.len() {
            return Err(ContainerError::ShapeMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn scalar_f64(value: f64) -> Self {
        Self {
            shape: Vec::new(),
            data: Data::F64(vec![value]),
        }
    }

    pub fn scalar_str(value: impl Into<String>) -> Self {
        Self {
            shape: Vec::new(),
            data: Data::Utf8(vec![value.into()]),
        }
    }

    pub fn vector_f64(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            data: Data::F64(values),
        }
    }

    pub fn vector_u32(values: Vec<u32>) -> Self {
        Self {
            shape: vec![values.len()],
            data: Data::U32(values),
        }
    }

    pub fn strings(values: Vec<String>) -> Self {
        Self {
            shape: vec![values.len()],
            data: Data::Utf8(values),
        }
    }

    /// `n × 2` matrix of points.
    pub fn points(points: &[[f64; 2]]) -> Self {
        Self {
            shape: vec![points.len(), 2],
            data: Data::F64(points.iter().flatten().copied().collect()),
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match &self.data {
            Data::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<&[u32]> {
        match &self.data {
            Data::U32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match &self.data {
            Data::Utf8(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Group,
    Dataset(Dataset),
}

/// In-memory container tree. The root group has the empty path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Container {
    nodes: BTreeMap<String, Node>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `path` and any missing ancestors. Existing groups are kept.
    pub fn create_group(&mut self, path: &str) -> Result<(), ContainerError> {
        validate_path(path)?;
        let mut end = 0usize;
        for segment in path.split(PATH_SEPARATOR) {
            end += segment.len();
            let prefix = &path[..end];
            match self.nodes.get(prefix) {
                Some(Node::Group) => {}
                Some(Node::Dataset(_)) => return Err(ContainerError::NotAGroup(prefix.to_string())),
                None => {
                    self.nodes.insert(prefix.to_string(), Node::Group);
                }
            }
            end += 1;
        }
        Ok(())
    }

    pub fn insert(&mut self, path: &str, dataset: Dataset) -> Result<(), ContainerError> {
        validate_path(path)?;
        if self.nodes.contains_key(path) {
            return Err(ContainerError::Exists(path.to_string()));
        }
        if let Some((parent, _)) = path.rsplit_once(PATH_SEPARATOR) {
            self.create_group(parent)?;
        }
        self.nodes.insert(path.to_string(), Node::Dataset(dataset));
        Ok(())
    }

    pub fn dataset(&self, path: &str) -> Result<&Dataset, ContainerError> {
        match self.nodes.get(path) {
            Some(Node::Dataset(d)) => Ok(d),
            Some(Node::Group) => Err(ContainerError::TypeMismatch {
                path: path.to_string(),
                expected: "dataset",
            }),
            None => Err(ContainerError::NotFound(path.to_string())),
        }
    }

    pub fn is_group(&self, path: &str) -> bool {
        path.is_empty() || matches!(self.nodes.get(path), Some(Node::Group))
    }

    /// Direct child names of a group, sorted.
    pub fn children(&self, path: &str) -> Vec<&str> {
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}{PATH_SEPARATOR}")
        };
        self.nodes
            .keys()
            .filter_map(|key| key.strip_prefix(prefix.as_str()))
            .filter(|rest| !rest.is_empty() && !rest.contains(PATH_SEPARATOR))
            .collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.nodes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn insert_node(&mut self, path: String, node: Node) -> Result<(), ContainerError> {
        validate_path(&path)?;
        if self.nodes.insert(path.clone(), node).is_some() {
            return Err(ContainerError::Exists(path));
        }
        Ok(())
    }
}

pub fn join_path(segments: &[&str]) -> String {
    let mut sep = [0u8; 4];
    segments.join(PATH_SEPARATOR.encode_utf8(&mut sep))
}

fn validate_path(path: &str) -> Result<(), ContainerError> {
    if path.is_empty() || path.split(PATH_SEPARATOR).any(str::is_empty) {
        return Err(ContainerError::InvalidPath(path.to_string()));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/src_inline/container/tests.rs"]
mod tests;
