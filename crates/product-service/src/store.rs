//! JSON file storage for the product map.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::Product;

/// Errors raised while reading or writing the data file.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The data file does not exist.
    #[error("data file not found: {0}")]
    Missing(PathBuf),

    /// The data file could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The data file does not hold a valid product map.
    #[error("invalid product data in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A JSON object keyed by product name, stored at `path`.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole product map.
    pub async fn load(&self) -> Result<HashMap<String, Product>, StoreError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StoreError::Missing(self.path.clone())
            } else {
                StoreError::Io {
                    path: self.path.clone(),
                    source: e,
                }
            }
        })?;

        serde_json::from_slice(&bytes).map_err(|e| StoreError::Parse {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Replaces the file contents with `products`.
    ///
    /// Writes a sibling temporary file first and renames it over the data
    /// file, so readers never observe a partial write.
    pub async fn save(&self, products: &HashMap<String, Product>) -> Result<(), StoreError> {
        let ordered: BTreeMap<&String, &Product> = products.iter().collect();
        let bytes = serde_json::to_vec_pretty(&ordered).map_err(|e| StoreError::Parse {
            path: self.path.clone(),
            source: e,
        })?;

        let tmp = self.temp_path();
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
