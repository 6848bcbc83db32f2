//! Merged, immutable tables and the loader that builds them from a directory of CSV files.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::caption::{CaptionCategory, CAPTION_CATEGORY_COLUMN, CAPTION_TEXT_COLUMN};
use crate::error::LoadError;
use crate::LoadOptions;

/// Canonical name of the merge key
pub const PATH_COLUMN: &str = "path";
/// Rows without a frame count are dropped during load
pub const FRAME_COUNT_COLUMN: &str = "num_frames";
/// Aesthetic score; synthesized as all-null when no source provides it
pub const AESTHETIC_COLUMN: &str = "aes";
/// Provenance column whose values are concatenated instead of overwritten on collision
pub const SOURCE_COLUMN: &str = "source";

const SOURCE_SEPARATOR: &str = ",";
/// Suffix polars gives to the right-hand copy of a colliding column in a join
const RIGHT_SUFFIX: &str = "_right";

/// One dataset's rows, keyed uniquely by `path`.
///
/// A `Table` is never mutated after it is built; queries project from it.
#[derive(Clone, Debug)]
pub struct Table {
    df: DataFrame,
    schema: SchemaRef,
}

impl Table {
    pub fn new(df: DataFrame) -> PolarsResult<Self> {
        let schema = df.clone().lazy().collect_schema()?;
        Ok(Self { df, schema })
    }

    /// A table with no rows and only the guaranteed columns.
    pub fn empty() -> PolarsResult<Self> {
        let df = df!(
            PATH_COLUMN => Vec::<String>::new(),
            AESTHETIC_COLUMN => Vec::<f64>::new(),
            CAPTION_CATEGORY_COLUMN => Vec::<String>::new()
        )?;
        Self::new(df)
    }

    /// Build a table by merging every recognised source file in `dir`.
    pub fn from_dir(dir: &Path, options: &LoadOptions) -> Result<Self, LoadError> {
        let sources = list_sources(dir, options)?;
        if sources.is_empty() {
            info!(dir = %dir.display(), "no source files found, table is empty");
            return Ok(Self::empty()?);
        }

        let mut frames = Vec::with_capacity(sources.len());
        for path in &sources {
            frames.push(read_source(path, options)?);
        }

        let merged = merge_sources(frames)?;
        let df = finalize(merged)?;
        info!(
            dir = %dir.display(),
            sources = sources.len(),
            rows = df.height(),
            columns = df.width(),
            "loaded table"
        );
        Ok(Self::new(df)?)
    }

    pub fn df(&self) -> &DataFrame {
        &self.df
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.schema.contains(name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema.iter_names().map(|s| s.to_string()).collect()
    }
}

/// CSV files in `dir`, minus the excluded names, optionally sorted by file name.
fn list_sources(dir: &Path, options: &LoadOptions) -> Result<Vec<PathBuf>, LoadError> {
    let unreadable = |source| LoadError::Unreadable {
        path: dir.to_path_buf(),
        source,
    };

    let mut sources = Vec::new();
    for entry in fs::read_dir(dir).map_err(unreadable)? {
        let path = entry.map_err(unreadable)?.path();
        if !path.is_file() || !is_csv(&path) {
            continue;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if options.excluded_files.iter().any(|ex| ex == &file_name) {
            warn!(file = %file_name, "skipping excluded source file");
            continue;
        }
        sources.push(path);
    }

    if options.sort_sources {
        sources.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    }
    Ok(sources)
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

/// Read one source file, rename its identifying column to `path`, and keep the first row per path.
fn read_source(path: &Path, options: &LoadOptions) -> Result<DataFrame, LoadError> {
    let source_err = |source| LoadError::Source {
        path: path.to_path_buf(),
        source,
    };

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(options.infer_schema_length)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(source_err)?;

    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    let id_column = options
        .id_columns
        .iter()
        .find(|candidate| names.contains(candidate))
        .or_else(|| names.first())
        .cloned()
        .ok_or_else(|| LoadError::MissingIdentifier {
            path: path.to_path_buf(),
        })?;

    let exprs: Vec<Expr> = names
        .iter()
        .filter_map(|name| {
            if *name == id_column {
                Some(col(name.as_str()).cast(DataType::String).alias(PATH_COLUMN))
            } else if name == PATH_COLUMN {
                // A non-identifying column that happens to be called "path" would shadow the key
                None
            } else {
                Some(col(name.as_str()))
            }
        })
        .collect();

    let df = df.lazy().select(exprs).collect().map_err(source_err)?;
    let df = first_per_path(df).map_err(source_err)?;
    debug!(
        file = %path.display(),
        id_column = %id_column,
        rows = df.height(),
        columns = df.width(),
        "read source file"
    );
    Ok(df)
}

/// Full outer join of all sources on `path`, reconciling columns that appear in more than one.
fn merge_sources(frames: Vec<DataFrame>) -> Result<LazyFrame, LoadError> {
    let mut frames = frames.into_iter();
    let Some(first) = frames.next() else {
        return Ok(Table::empty()?.df.lazy());
    };

    let mut blank = blank_columns(&first);
    let mut acc = first.lazy();
    for next in frames {
        let left_schema = acc.collect_schema()?;
        let right_schema = next.schema().clone();
        let right_blank = blank_columns(&next);

        let collisions: Vec<(String, DataType)> = right_schema
            .iter()
            .filter(|(name, _)| name.as_str() != PATH_COLUMN)
            .filter_map(|(name, right_dtype)| {
                let left_dtype = left_schema.get(name.as_str())?;
                let dtype = if right_blank.contains(name.as_str()) {
                    left_dtype.clone()
                } else if blank.contains(name.as_str()) {
                    right_dtype.clone()
                } else {
                    unified_dtype(name.as_str(), left_dtype, right_dtype)
                };
                Some((name.to_string(), dtype))
            })
            .collect();

        // A merged column stays blank only while every side seen so far is blank
        blank = left_schema
            .iter_names()
            .filter(|name| {
                blank.contains(name.as_str())
                    && (right_blank.contains(name.as_str())
                        || !right_schema.contains(name.as_str()))
            })
            .chain(
                right_schema
                    .iter_names()
                    .filter(|name| !left_schema.contains(name.as_str()))
                    .filter(|name| right_blank.contains(name.as_str())),
            )
            .map(|name| name.to_string())
            .collect();

        let casts: Vec<Expr> = collisions
            .iter()
            .map(|(name, dtype)| col(name.as_str()).cast(dtype.clone()))
            .collect();
        let mut right = next.lazy();
        if !casts.is_empty() {
            acc = acc.with_columns(casts.clone());
            right = right.with_columns(casts);
        }

        let joined = acc.join(
            right,
            [col(PATH_COLUMN)],
            [col(PATH_COLUMN)],
            JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
        );

        // Keep left-hand column order, then append the right-hand columns that are new
        let collided: HashSet<&str> = collisions.iter().map(|(n, _)| n.as_str()).collect();
        let mut exprs: Vec<Expr> = left_schema
            .iter_names()
            .map(|name| {
                if collided.contains(name.as_str()) {
                    reconcile(name.as_str())
                } else {
                    col(name.as_str())
                }
            })
            .collect();
        exprs.extend(
            right_schema
                .iter_names()
                .filter(|name| {
                    name.as_str() != PATH_COLUMN
                        && !left_schema.contains(name.as_str())
                })
                .map(|name| col(name.as_str())),
        );

        acc = joined.select(exprs);
    }

    Ok(acc)
}

/// Columns of a source with no non-null value.
///
/// CSV readers type an all-blank column as `String`; such a column should not decide the
/// merged type.
fn blank_columns(df: &DataFrame) -> HashSet<String> {
    df.get_columns()
        .iter()
        .filter(|c| c.name().as_str() != PATH_COLUMN && c.null_count() == c.len())
        .map(|c| c.name().to_string())
        .collect()
}

/// Common type for a column present on both sides of a merge.
fn unified_dtype(name: &str, left: &DataType, right: &DataType) -> DataType {
    if name == SOURCE_COLUMN {
        DataType::String
    } else if left == right {
        left.clone()
    } else if left.is_numeric() && right.is_numeric() {
        DataType::Float64
    } else {
        DataType::String
    }
}

/// Expression combining the left and right copies of a colliding column.
///
/// The left (earlier) value wins unless it is null; `source` values are concatenated.
fn reconcile(name: &str) -> Expr {
    let left = col(name);
    let right = col(format!("{}{}", name, RIGHT_SUFFIX).as_str());
    if name == SOURCE_COLUMN {
        when(left.clone().is_null().and(right.clone().is_null()))
            .then(lit(NULL).cast(DataType::String))
            .otherwise(concat_str([left, right], SOURCE_SEPARATOR, true))
            .alias(name)
    } else {
        coalesce(&[left, right]).alias(name)
    }
}

/// Post-merge clean-up: order by key, drop rows without a frame count, reduce paths to base
/// names, derive the caption category, and make sure the aesthetic column exists.
fn finalize(merged: LazyFrame) -> Result<DataFrame, LoadError> {
    let mut merged = merged.sort_by_exprs(
        [col(PATH_COLUMN)],
        SortMultipleOptions {
            maintain_order: true,
            ..Default::default()
        },
    );
    if !merged.collect_schema()?.contains(FRAME_COUNT_COLUMN) {
        merged = merged.with_column(lit(NULL).cast(DataType::Float64).alias(FRAME_COUNT_COLUMN));
    }
    let mut df = merged
        .filter(col(FRAME_COUNT_COLUMN).is_not_null())
        .collect()?;

    let base_names: Vec<Option<String>> = df
        .column(PATH_COLUMN)?
        .str()?
        .into_iter()
        .map(|p| p.map(|p| base_name(p).to_string()))
        .collect();
    df.with_column(Series::new(PATH_COLUMN.into(), base_names))?;
    let mut df = first_per_path(df)?;

    let categories: Vec<&'static str> = if has_column(&df, CAPTION_TEXT_COLUMN) {
        let text = df.column(CAPTION_TEXT_COLUMN)?.cast(&DataType::String)?;
        text.str()?
            .into_iter()
            .map(|t| CaptionCategory::from_caption(t).as_str())
            .collect()
    } else {
        vec![CaptionCategory::None.as_str(); df.height()]
    };
    df.with_column(Series::new(CAPTION_CATEGORY_COLUMN.into(), categories))?;

    if !has_column(&df, AESTHETIC_COLUMN) {
        let height = df.height();
        df.with_column(Series::full_null(
            AESTHETIC_COLUMN.into(),
            height,
            &DataType::Float64,
        ))?;
    }

    // path first, caption_category last, everything else in merge order
    let mut order = vec![PATH_COLUMN.to_string()];
    order.extend(
        df.get_column_names()
            .iter()
            .map(|n| n.to_string())
            .filter(|n| n != PATH_COLUMN && n != CAPTION_CATEGORY_COLUMN),
    );
    order.push(CAPTION_CATEGORY_COLUMN.to_string());
    Ok(df.select(order)?)
}

fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|n| n.as_str() == name)
}

/// Keep the first row for each distinct non-null path.
fn first_per_path(df: DataFrame) -> PolarsResult<DataFrame> {
    let mask: Vec<bool> = {
        let paths = df.column(PATH_COLUMN)?.str()?;
        let mut seen: HashSet<&str> = HashSet::with_capacity(paths.len());
        paths
            .into_iter()
            .map(|p| p.map(|p| seen.insert(p)).unwrap_or(false))
            .collect()
    };
    if mask.iter().all(|keep| *keep) {
        return Ok(df);
    }
    df.filter(&BooleanChunked::from_slice("keep".into(), &mask))
}
