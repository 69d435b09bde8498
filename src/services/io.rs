//! File input/output for one invocation
//!
//! Inputs are checked before any processing starts, and outputs are written
//! only once the result is complete, so a failed run never leaves a file
//! behind.

use crate::error::{BgRemovalError, Result};
use std::path::Path;

/// Fail with `InputNotFound` unless `path` is an existing file
pub fn ensure_input_exists(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(BgRemovalError::InputNotFound(path.to_path_buf()))
    }
}

/// Read the whole input image into memory
///
/// A path that vanished after [`ensure_input_exists`] still reports
/// `InputNotFound`.
pub async fn read_input(path: &Path) -> Result<Vec<u8>> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BgRemovalError::InputNotFound(path.to_path_buf())
        } else {
            BgRemovalError::file_io_error("read input image", path, &e)
        }
    })?;
    log::debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

/// Write `bytes` to `path`, creating missing parent directories
pub async fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| BgRemovalError::file_io_error("create output directory", parent, &e))?;
    }

    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| BgRemovalError::file_io_error("write output image", path, &e))?;
    log::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
