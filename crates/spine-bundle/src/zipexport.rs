//! Deterministic zip export: fixed caller-supplied `mtime`, caller-chosen
//! compression method, entries in ascending byte order, no extra fields,
//! no comments.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use chrono::{Datelike, DateTime, Timelike, Utc};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime as ZipDateTime, ZipWriter};

use spine_error::{ErrorCode, SpineError};

/// Compression mode for a zip export. Either choice produces a
/// byte-identical archive across repeated builds of the same tree with
/// the same `mtime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZipCompression {
    Stored,
    Deflated,
}

impl From<ZipCompression> for CompressionMethod {
    fn from(value: ZipCompression) -> Self {
        match value {
            ZipCompression::Stored => CompressionMethod::Stored,
            ZipCompression::Deflated => CompressionMethod::Deflated,
        }
    }
}

fn to_zip_datetime(mtime: DateTime<Utc>) -> Result<ZipDateTime, SpineError> {
    ZipDateTime::from_date_and_time(
        mtime.year() as u16,
        mtime.month() as u8,
        mtime.day() as u8,
        mtime.hour() as u8,
        mtime.minute() as u8,
        mtime.second() as u8,
    )
    .map_err(|_| {
        SpineError::new(ErrorCode::InputInvalid, "mtime is outside the zip DOS date-time range")
    })
}

/// Write `files` (already keyed by bundle-relative path) into a zip archive.
/// `files` is a `BTreeMap`, so iteration order is already ascending byte
/// order on the path — the only ordering the format permits.
pub fn write_zip(
    files: &BTreeMap<String, Vec<u8>>,
    mtime: DateTime<Utc>,
    compression: ZipCompression,
) -> Result<Vec<u8>, SpineError> {
    let zip_mtime = to_zip_datetime(mtime)?;
    let options = FileOptions::default()
        .compression_method(compression.into())
        .last_modified_time(zip_mtime)
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in files {
        writer.start_file(name, options).map_err(|e| {
            SpineError::new(ErrorCode::InputInvalid, format!("zip entry '{name}' failed: {e}"))
        })?;
        writer.write_all(bytes).map_err(|e| {
            SpineError::new(ErrorCode::InputInvalid, format!("zip write for '{name}' failed: {e}"))
        })?;
    }
    let cursor = writer
        .finish()
        .map_err(|e| SpineError::new(ErrorCode::InputInvalid, format!("zip finish failed: {e}")))?;
    Ok(cursor.into_inner())
}
