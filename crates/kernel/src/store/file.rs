use std::fs;
use std::io;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

use super::atomic_io::write_text_atomic;
use super::tree::{MemoryTree, StoreError};

/// Loads the persisted tree. A missing file is an empty store.
pub fn load_tree(path: &Path) -> Result<MemoryTree, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "store_file_missing_starting_empty");
            return Ok(MemoryTree::new());
        }
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    parse_tree_json(&raw, path)
}

pub fn parse_tree_json(raw: &str, path: &Path) -> Result<MemoryTree, StoreError> {
    if raw.trim().is_empty() {
        return Ok(MemoryTree::new());
    }
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let value = serde_path_to_error::deserialize::<_, Value>(&mut deserializer).map_err(|error| {
        let location = error.path().to_string();
        StoreError::Parse {
            path: path.to_path_buf(),
            location,
            message: error.into_inner().to_string(),
        }
    })?;
    MemoryTree::from_value(value)
}

pub fn save_tree(path: &Path, tree: &MemoryTree) -> Result<(), StoreError> {
    let text = serde_json::to_string_pretty(tree.as_map()).map_err(|source| {
        StoreError::Encode {
            path: path.display().to_string(),
            source,
        }
    })?;
    write_text_atomic(path, &text).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = text.len(), "store_file_saved");
    Ok(())
}
