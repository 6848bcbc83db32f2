//! Command-line definitions, shared with the build script through the `dsbrowse-cli` crate.

pub use dsbrowse_cli::{Args, Command, DatasetCommand, LoadArgs, OutputFormat, TableSource};
