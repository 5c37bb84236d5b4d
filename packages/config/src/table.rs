//! CSV and JSON artifact reading and writing.
//!
//! Every stage exchanges flat files: typed rows as CSV with a header
//! derived from the row struct, run records and reports as pretty JSON.
//! Writers create parent directories as needed.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write as _};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::paths::ensure_parent;

/// Errors from artifact I/O.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// The file could not be opened or created.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Offending file.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A CSV row failed to parse or serialize.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A JSON document failed to parse or serialize.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> TableError + '_ {
    move |source| TableError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Reads every row of a CSV file with a header.
///
/// # Errors
///
/// Returns [`TableError`] if the file is missing or any row fails to
/// deserialize.
pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, TableError> {
    let file = File::open(path).map_err(io_error(path))?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()?;
    log::debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Writes rows to a CSV file, replacing any previous content.
///
/// Returns the number of rows written.
///
/// # Errors
///
/// Returns [`TableError`] if the file cannot be created or a row fails to
/// serialize.
pub fn write_csv<'a, T, I>(path: &Path, rows: I) -> Result<usize, TableError>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    ensure_parent(path).map_err(io_error(path))?;
    let file = File::create(path).map_err(io_error(path))?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    let mut count = 0usize;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush().map_err(io_error(path))?;
    log::debug!("Wrote {count} rows to {}", path.display());
    Ok(count)
}

/// Reads a JSON document.
///
/// # Errors
///
/// Returns [`TableError`] if the file is missing or not valid JSON for `T`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, TableError> {
    let file = File::open(path).map_err(io_error(path))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Writes a value as pretty-printed JSON with a trailing newline.
///
/// # Errors
///
/// Returns [`TableError`] if the file cannot be created or serialization
/// fails.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), TableError> {
    ensure_parent(path).map_err(io_error(path))?;
    let file = File::create(path).map_err(io_error(path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n").map_err(io_error(path))?;
    writer.flush().map_err(io_error(path))?;
    Ok(())
}
