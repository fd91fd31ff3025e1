use std::io;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub const AGENTS_ROOT: &str = "agents";
pub const AGENT_INDEX_KEY: &str = "agent_index";
pub const PENDING_AGENTS_KEY: &str = "pending_agents";
pub const RUNTIME_KEY: &str = "runtime";
pub const LOGGING_KEY: &str = "logging";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store path '{path}'")]
    InvalidPath { path: String },
    #[error("store node at '{path}' is not an object")]
    NotAnObject { path: String },
    #[error("failed to read store file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write store file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("store file {path} is malformed at '{location}': {message}")]
    Parse {
        path: PathBuf,
        location: String,
        message: String,
    },
    #[error("failed to encode '{path}': {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("record at '{path}' is malformed at '{field}': {message}")]
    Record {
        path: String,
        field: String,
        message: String,
    },
}

/// JSON object tree addressed by dot-separated paths such as `agents.a000001`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTree {
    root: Map<String, Value>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Object(root) => Ok(Self { root }),
            Value::Null => Ok(Self::default()),
            _ => Err(StoreError::NotAnObject {
                path: String::new(),
            }),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn clear(&mut self) {
        self.root.clear();
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        let segments = split_path(path).ok()?;
        let (last, parents) = segments.split_last()?;
        let mut node = &self.root;
        for segment in parents {
            node = node.get(*segment)?.as_object()?;
        }
        node.get(*last)
    }

    pub fn set(&mut self, path: &str, value: Value) -> Result<(), StoreError> {
        let segments = split_path(path)?;
        let Some((last, parents)) = segments.split_last() else {
            return Err(invalid_path(path));
        };
        let mut node = &mut self.root;
        for segment in parents {
            let entry = node
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            node = match entry {
                Value::Object(child) => child,
                _ => {
                    return Err(StoreError::NotAnObject {
                        path: path.to_string(),
                    })
                }
            };
        }
        node.insert((*last).to_string(), value);
        Ok(())
    }

    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let segments = split_path(path).ok()?;
        let (last, parents) = segments.split_last()?;
        let mut node = &mut self.root;
        for segment in parents {
            node = node.get_mut(*segment)?.as_object_mut()?;
        }
        node.remove(*last)
    }

    pub fn read<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, StoreError> {
        let Some(value) = self.get(path) else {
            return Ok(None);
        };
        decode_value(path, value.clone()).map(Some)
    }

    pub fn write<T: Serialize>(&mut self, path: &str, value: &T) -> Result<(), StoreError> {
        let encoded = serde_json::to_value(value).map_err(|source| StoreError::Encode {
            path: path.to_string(),
            source,
        })?;
        self.set(path, encoded)
    }
}

pub(crate) fn decode_value<T: DeserializeOwned>(path: &str, value: Value) -> Result<T, StoreError> {
    serde_path_to_error::deserialize(value).map_err(|error| {
        let field = error.path().to_string();
        StoreError::Record {
            path: path.to_string(),
            field,
            message: error.into_inner().to_string(),
        }
    })
}

/// Default persisted location of an agent record.
pub fn agent_path(id: &str) -> String {
    format!("{AGENTS_ROOT}.{id}")
}

fn split_path(path: &str) -> Result<Vec<&str>, StoreError> {
    let segments = path.split('.').collect::<Vec<_>>();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(invalid_path(path));
    }
    Ok(segments)
}

fn invalid_path(path: &str) -> StoreError {
    StoreError::InvalidPath {
        path: path.to_string(),
    }
}
