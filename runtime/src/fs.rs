//! Filesystem helpers shared by leases and owner identities.

use std::io::{self, Write};
use std::path::Path;

/// Write `data` to `target` atomically.
///
/// The bytes go to a hidden temp file in the same directory, are synced, and
/// the temp file is renamed over `target`. Readers see either the old file,
/// no file, or the complete new one.
pub(crate) fn atomic_write(target: &Path, data: &[u8]) -> io::Result<()> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut temp = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|e| e.error)?;
    Ok(())
}
