//! JSON metadata written next to each series file.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tickstore_core::SeriesMetadata;

use crate::WarehouseError;

/// Write `metadata` to `path` through a temporary file in the same directory.
pub fn write_metadata(path: &Path, metadata: &SeriesMetadata) -> Result<(), WarehouseError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut staged, metadata)?;
    staged.write_all(b"\n")?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|error| error.error)?;
    Ok(())
}

pub fn read_metadata(path: &Path) -> Result<SeriesMetadata, WarehouseError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
