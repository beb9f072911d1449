//! Parquet output for reconciled score tables.

use std::fs::File;
use std::path::Path;

use anyhow::Context;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

/// Write `batch` to `path` as a single-row-group Parquet file.
pub fn write_parquet(path: &Path, batch: &RecordBatch) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close().context("finalising parquet file")?;
    tracing::info!(path = %path.display(), rows = batch.num_rows(), "wrote score table");
    Ok(())
}
