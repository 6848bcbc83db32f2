//! Error taxonomy for loading, querying and managing datasets.

use polars::prelude::PolarsError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Building a [`crate::Table`] from a directory of source files failed.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Cannot read source directory {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot parse source file {}: {source}", path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    #[error("Source file {} has no columns", path.display())]
    MissingIdentifier { path: PathBuf },

    #[error("Failed to merge source files: {0}")]
    Merge(#[from] PolarsError),
}

/// A query descriptor could not be applied to a table.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Unknown column: {column}")]
    UnknownColumn { column: String },

    #[error("Range filter on non-numeric column: {column}")]
    NotNumeric { column: String },

    #[error("Invalid numeric bound for {column}: {value:?}")]
    InvalidBound { column: String, value: String },

    #[error("Invalid value for {name}: {value:?}")]
    InvalidParameter { name: String, value: String },

    #[error("Query evaluation failed: {0}")]
    Engine(#[from] PolarsError),
}

#[derive(Error, Debug)]
#[error("Dataset not found: {id}")]
pub struct NotFoundError {
    pub id: String,
}

/// The registry flat file could not be read or written.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Registry file {} is not valid JSON: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl Error {
    /// True when the caller sent something invalid (bad parameters or an unknown dataset id).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Query(q) if !matches!(q, QueryError::Engine(_)))
            || matches!(self, Error::NotFound(_))
    }
}

impl NotFoundError {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}
