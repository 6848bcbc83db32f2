use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use dsbrowse::cli::{Args, Command, DatasetCommand, LoadArgs, OutputFormat, TableSource};
use dsbrowse::store::ReloadOutcome;
use dsbrowse::{
    error_display, query, AppConfig, ConfigManager, DatasetRegistry, DatasetStore, Error,
    FilterDescriptor, LoadOptions, NewDataset, Table, APP_NAME,
};
use serde::Serialize;
use std::sync::Arc;

/// Per-dataset line of `datasets reload` output
#[derive(Debug, Serialize, PartialEq)]
struct ReloadReport {
    id: String,
    rows: Option<usize>,
    error: Option<String>,
}

impl From<&ReloadOutcome> for ReloadReport {
    fn from(outcome: &ReloadOutcome) -> Self {
        match &outcome.result {
            Ok(rows) => Self {
                id: outcome.id.clone(),
                rows: Some(*rows),
                error: None,
            },
            Err(e) => Self {
                id: outcome.id.clone(),
                rows: None,
                error: Some(error_display::user_message(e)),
            },
        }
    }
}

fn load_config(args: &Args) -> Result<AppConfig> {
    match &args.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(APP_NAME),
    }
}

fn print_json<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let out = match format {
        OutputFormat::Json => serde_json::to_string(value)?,
        OutputFormat::Pretty => serde_json::to_string_pretty(value)?,
    };
    println!("{}", out);
    Ok(())
}

fn open_store(args: &Args, config: &AppConfig, load: &LoadArgs) -> Result<DatasetStore> {
    let path = match &args.registry {
        Some(path) => path.clone(),
        None => config.registry_path(APP_NAME)?,
    };
    let registry = DatasetRegistry::open(path).map_err(Error::from)?;
    Ok(DatasetStore::new(
        registry,
        LoadOptions::from_args_and_config(load, config),
    ))
}

/// Table for a read command: built from a directory, or a registered dataset's table.
fn resolve_table(
    args: &Args,
    config: &AppConfig,
    source: &TableSource,
    load: &LoadArgs,
) -> Result<Arc<Table>> {
    match (&source.dir, &source.dataset) {
        (Some(dir), _) => {
            let opts = LoadOptions::from_args_and_config(load, config);
            Ok(Arc::new(Table::from_dir(dir, &opts).map_err(Error::from)?))
        }
        (None, Some(id)) => Ok(open_store(args, config, load)?.table(id)?),
        (None, None) => Err(eyre!("Either --dir or --dataset is required")),
    }
}

fn run(args: &Args, config: &AppConfig) -> Result<()> {
    match &args.command {
        Command::Query {
            source,
            load,
            query: query_string,
        } => {
            let desc = FilterDescriptor::from_query_string(
                query_string,
                config.query.default_page_size,
            )
            .map_err(Error::from)?;
            let table = resolve_table(args, config, source, load)?;
            let page = query::query(&table, &desc).map_err(Error::from)?;
            print_json(&page, args.output)
        }
        Command::Ranges { source, load } => {
            let table = resolve_table(args, config, source, load)?;
            let ranges = query::column_ranges(&table).map_err(Error::from)?;
            print_json(&ranges, args.output)
        }
        Command::Datasets(DatasetCommand::List) => {
            let store = open_store(args, config, &LoadArgs::default())?;
            print_json(&store.list(), args.output)
        }
        Command::Datasets(DatasetCommand::Create {
            name,
            author,
            csv_meta_dir,
            video_clip_dir,
            description,
            load,
        }) => {
            let store = open_store(args, config, load)?;
            let info = store.create_dataset(NewDataset {
                name: name.clone(),
                author: author.clone(),
                description: description.clone(),
                csv_meta_dir: csv_meta_dir.clone(),
                video_clip_dir: video_clip_dir.clone(),
            })?;
            print_json(&info, args.output)
        }
        Command::Datasets(DatasetCommand::Delete { id }) => {
            let store = open_store(args, config, &LoadArgs::default())?;
            let removed = store.delete(id)?;
            print_json(&removed, args.output)
        }
        Command::Datasets(DatasetCommand::Reload { load }) => {
            let store = open_store(args, config, load)?;
            let outcomes = store.reload()?;
            let reports: Vec<ReloadReport> = outcomes.iter().map(ReloadReport::from).collect();
            print_json(&reports, args.output)
        }
        Command::GenerateConfig { force } => {
            let config_manager = ConfigManager::new(APP_NAME)?;
            let path = config_manager.write_default_config(*force)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    color_eyre::install()?;

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    dsbrowse::logging::init(&level)?;

    if let Err(report) = run(&args, &config) {
        let msg = match report.downcast_ref::<Error>() {
            Some(e) => error_display::user_message(e),
            None => report.to_string(),
        };
        eprintln!("Error: {}", msg);
        std::process::exit(1);
    }
    Ok(())
}
