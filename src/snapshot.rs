//! Tabular snapshot files exchanged between pipeline stages.
//!
//! Every intermediate artifact is a CSV file with a header row, written
//! atomically: rows are encoded in memory, staged to a `.tmp` sibling, then
//! renamed into place so consumers never observe a partial snapshot.

use crate::error::{CreateSnafu, EncodeSnafu, OpenSnafu, PublishSnafu, ReadSnafu, SnapshotError};
use snafu::ResultExt;
use std::path::{Path, PathBuf};

/// Encode a header row plus data rows as CSV and publish them to `path`.
pub async fn write_rows(
    path: &Path,
    columns: &[String],
    rows: &[Vec<String>],
) -> Result<(), SnapshotError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns).context(EncodeSnafu { path })?;
    for row in rows {
        writer.write_record(row).context(EncodeSnafu { path })?;
    }
    let encoded = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
        .context(EncodeSnafu { path })?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context(CreateSnafu { path })?;
    }
    let staged = staging_path(path);
    tokio::fs::write(&staged, encoded)
        .await
        .context(CreateSnafu { path })?;
    tokio::fs::rename(&staged, path)
        .await
        .context(PublishSnafu { path })
}

/// Read a snapshot back as its header columns and data rows.
pub async fn read_rows(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), SnapshotError> {
    let bytes = tokio::fs::read(path).await.context(OpenSnafu { path })?;
    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let columns = reader
        .headers()
        .context(ReadSnafu { path })?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context(ReadSnafu { path })?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok((columns, rows))
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
