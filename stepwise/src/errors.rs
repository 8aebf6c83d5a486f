//! Named fatal errors.
//!
//! Everything else flows through `anyhow`; these two are distinct types so the
//! CLI and tests can `downcast_ref` them out of an `anyhow::Error` chain.

use std::fmt;
use std::path::{Path, PathBuf};

/// Invalid run configuration, detected before anything is written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationError {
    pub message: String,
}

impl ConfigurationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigurationError {}

/// Missing or malformed scenario catalog data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogError {
    pub path: PathBuf,
    pub message: String,
}

impl CatalogError {
    pub fn new(path: &Path, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "catalog error in {}: {}", self.path.display(), self.message)
    }
}

impl std::error::Error for CatalogError {}
