//! User-facing error message formatting.
//!
//! Uses typed error matching (crate error variants, PolarsError variants,
//! io::ErrorKind) rather than string parsing to produce actionable messages.

use crate::error::{Error, LoadError, QueryError, RegistryError};
use polars::prelude::PolarsError;
use std::io;

/// Format any crate error as a single-line message suitable for a client response.
pub fn user_message(err: &Error) -> String {
    match err {
        Error::Load(e) => user_message_from_load(e),
        Error::Query(e) => user_message_from_query(e),
        Error::NotFound(e) => format!("Dataset not found: {}. List datasets to see valid ids.", e.id),
        Error::Registry(RegistryError::Io { path, source }) => {
            let ctx = format!("({})", path.display());
            user_message_from_io(source, Some(&ctx))
        }
        Error::Registry(RegistryError::Format { path, .. }) => format!(
            "Registry file {} is corrupted. Fix or remove it and reload.",
            path.display()
        ),
    }
}

fn user_message_from_load(err: &LoadError) -> String {
    match err {
        LoadError::Unreadable { path, source } => {
            let ctx = format!("({})", path.display());
            user_message_from_io(source, Some(&ctx))
        }
        LoadError::Source { path, source } => format!(
            "Failed to load {}: {}",
            path.display(),
            user_message_from_polars(source)
        ),
        LoadError::MissingIdentifier { path } => format!(
            "Source file {} has no columns; expected a path column.",
            path.display()
        ),
        LoadError::Merge(e) => format!("Failed to merge sources: {}", user_message_from_polars(e)),
    }
}

fn user_message_from_query(err: &QueryError) -> String {
    match err {
        QueryError::UnknownColumn { column } => format!(
            "Column not found: {}. Check spelling and that the column exists.",
            column
        ),
        QueryError::NotNumeric { column } => format!(
            "Column {} is not numeric and cannot be filtered by range.",
            column
        ),
        QueryError::InvalidBound { column, value } => format!(
            "Range bound for {} must be a number, got {:?}.",
            column, value
        ),
        QueryError::InvalidParameter { name, value } => {
            format!("Invalid value for {}: {:?}.", name, value)
        }
        QueryError::Engine(e) => user_message_from_polars(e),
    }
}

/// Format a PolarsError as a user-facing message by matching on its variant.
pub fn user_message_from_polars(err: &PolarsError) -> String {
    use polars::prelude::PolarsError as PE;

    match err {
        PE::ColumnNotFound(msg) => format!(
            "Column not found: {}. Check spelling and that the column exists.",
            msg
        ),
        PE::IO { error, msg } => {
            user_message_from_io(error.as_ref(), msg.as_ref().map(|m| m.as_ref()))
        }
        PE::NoData(msg) => format!("No data: {}", msg),
        PE::SchemaMismatch(msg) => format!("Schema mismatch: {}", msg),
        PE::InvalidOperation(msg) => format!("Operation not allowed: {}", msg),
        PE::ComputeError(msg) => format!("Could not compute result: {}", msg),
        PE::Context { error, msg } => {
            let inner = user_message_from_polars(error);
            format!("{}: {}", msg, inner)
        }
        #[allow(unreachable_patterns)]
        _ => err.to_string(),
    }
}

/// Format an io::Error as a user-facing message by matching on ErrorKind.
pub fn user_message_from_io(err: &io::Error, context: Option<&str>) -> String {
    use std::io::ErrorKind;

    let base: String = match err.kind() {
        ErrorKind::NotFound => "File or directory not found.".to_string(),
        ErrorKind::PermissionDenied => "Permission denied. Check read access.".to_string(),
        ErrorKind::InvalidData | ErrorKind::InvalidInput => {
            "Invalid or corrupted data.".to_string()
        }
        ErrorKind::UnexpectedEof => "Unexpected end of file.".to_string(),
        ErrorKind::Interrupted => "Operation interrupted.".to_string(),
        ErrorKind::OutOfMemory => "Out of memory.".to_string(),
        _ => format!("I/O error: {}", err),
    };

    match context {
        Some(ctx) if !ctx.is_empty() => format!("{} {}", base, ctx),
        _ => base,
    }
}
