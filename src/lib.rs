//! Browse video-clip datasets described by directories of CSV metadata.
//!
//! A dataset's CSV files are merged into one immutable [`Table`] keyed by clip `path`;
//! [`query::query`] filters, sorts and pages that table into a [`ResultPage`].
//! [`DatasetStore`] keeps a registry of datasets and their loaded tables.

pub mod caption;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod error_display;
pub mod logging;
pub mod query;
pub mod registry;
pub mod store;
pub mod table;
pub mod value;

pub use caption::CaptionCategory;
pub use cli::Args;
pub use config::{AppConfig, ConfigManager};
pub use descriptor::{FilterDescriptor, RangeBound, SortOrder};
pub use error::{Error, LoadError, NotFoundError, QueryError, RegistryError, Result};
pub use query::{column_ranges, ColumnRange, ResultPage};
pub use registry::{DatasetInfo, DatasetRegistry, DatasetStatus, NewDataset};
pub use store::DatasetStore;
pub use table::Table;
pub use value::{Row, Value};

/// Application name used for config and data directories
pub const APP_NAME: &str = "dsbrowse";

/// How source files are discovered and merged into a table
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    /// File names skipped when scanning a source directory
    pub excluded_files: Vec<String>,
    /// Candidate identifying columns, in priority order; the first column is the fallback
    pub id_columns: Vec<String>,
    /// Rows used for CSV type inference; `None` scans the whole file
    pub infer_schema_length: Option<usize>,
    /// Merge sources in file-name order instead of directory-listing order
    pub sort_sources: bool,
}

/// `0` rows of type inference means the whole file.
fn whole_file_if_zero(rows: Option<usize>) -> Option<usize> {
    rows.filter(|&n| n > 0)
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::from_config(&config::LoadingConfig::default())
    }
}

impl LoadOptions {
    pub fn from_config(config: &config::LoadingConfig) -> Self {
        Self {
            excluded_files: config.excluded_files.clone(),
            id_columns: config.id_columns.clone(),
            infer_schema_length: whole_file_if_zero(config.infer_schema_length),
            sort_sources: config.sort_sources,
        }
    }

    /// Create LoadOptions from CLI args and config, with CLI args taking precedence
    pub fn from_args_and_config(args: &cli::LoadArgs, config: &AppConfig) -> Self {
        let mut opts = Self::from_config(&config.loading);

        // An explicit exclusion list replaces the configured one
        if !args.exclude.is_empty() {
            opts.excluded_files = args.exclude.clone();
        }
        if args.infer_schema_length.is_some() {
            opts.infer_schema_length = whole_file_if_zero(args.infer_schema_length);
        }
        opts.sort_sources = args.sort_sources.unwrap_or(opts.sort_sources);
        opts
    }

    pub fn with_excluded_files(mut self, files: Vec<String>) -> Self {
        self.excluded_files = files;
        self
    }

    pub fn with_id_columns(mut self, columns: Vec<String>) -> Self {
        self.id_columns = columns;
        self
    }

    pub fn with_sort_sources(mut self, sort_sources: bool) -> Self {
        self.sort_sources = sort_sources;
        self
    }
}
