//! Shared CLI definitions for dsbrowse.
//!
//! Used by the main application and by the build script (manpage).

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// How JSON results are written to stdout
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// One JSON document per line
    #[default]
    Json,
    /// Indented JSON
    Pretty,
}

/// Command-line arguments for dsbrowse
#[derive(Clone, Parser, Debug)]
#[command(
    name = "dsbrowse",
    version,
    about = "Filter, sort and page through video-clip datasets built from CSV metadata"
)]
pub struct Args {
    /// Path to a config file (default: <config dir>/dsbrowse/config.toml)
    #[arg(long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Path to the dataset registry file (overrides config [registry] path)
    #[arg(long = "registry", value_name = "PATH", global = true)]
    pub registry: Option<PathBuf>,

    /// Log level or filter directives (e.g. info,dsbrowse=debug). RUST_LOG takes precedence.
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Output format for JSON results
    #[arg(long = "output", value_enum, global = true, default_value_t = OutputFormat::Json)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Which table a read command runs against
#[derive(Clone, ClapArgs, Debug, Default)]
#[group(required = true, multiple = false)]
pub struct TableSource {
    /// Load the table directly from a directory of CSV metadata files
    #[arg(long = "dir", value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Use a registered dataset by id
    #[arg(long = "dataset", value_name = "ID")]
    pub dataset: Option<String>,
}

/// Options that control how source CSV files are merged into a table
#[derive(Clone, ClapArgs, Debug, Default)]
pub struct LoadArgs {
    /// Source file name to skip (repeatable). Replaces config [loading] excluded_files.
    #[arg(long = "exclude", value_name = "FILE")]
    pub exclude: Vec<String>,

    /// Number of rows to use when inferring CSV column types (0 = whole file)
    #[arg(long = "infer-schema-length", value_name = "N")]
    pub infer_schema_length: Option<usize>,

    /// Sort source files by name before merging (default: true)
    #[arg(long = "sort-sources", value_name = "BOOL", value_parser = clap::value_parser!(bool))]
    pub sort_sources: Option<bool>,
}

#[derive(Clone, Subcommand, Debug)]
pub enum Command {
    /// Run a filter/sort/paginate query and print the result page
    Query {
        #[command(flatten)]
        source: TableSource,

        #[command(flatten)]
        load: LoadArgs,

        /// Query string, e.g. "filters[num_frames][0]=100&filters[num_frames][1]=200&sort=aes&order=desc&page=1&page_size=10"
        #[arg(value_name = "QUERY", default_value = "")]
        query: String,
    },

    /// Print the min/max of every numeric column
    Ranges {
        #[command(flatten)]
        source: TableSource,

        #[command(flatten)]
        load: LoadArgs,
    },

    /// Manage registered datasets
    #[command(subcommand)]
    Datasets(DatasetCommand),

    /// Generate a default configuration file
    GenerateConfig {
        /// Overwrite an existing config file
        #[arg(long = "force", action)]
        force: bool,
    },
}

#[derive(Clone, Subcommand, Debug)]
pub enum DatasetCommand {
    /// List registered datasets
    List,

    /// Register a dataset and build its table
    Create {
        #[arg(long = "name")]
        name: String,

        #[arg(long = "author")]
        author: String,

        /// Directory containing the CSV metadata files
        #[arg(long = "csv-meta-dir", value_name = "DIR")]
        csv_meta_dir: PathBuf,

        /// Directory containing the video clips
        #[arg(long = "video-clip-dir", value_name = "DIR")]
        video_clip_dir: PathBuf,

        #[arg(long = "description", default_value = "")]
        description: String,

        #[command(flatten)]
        load: LoadArgs,
    },

    /// Remove a dataset from the registry
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Re-read the registry file and rebuild every table
    Reload {
        #[command(flatten)]
        load: LoadArgs,
    },
}
