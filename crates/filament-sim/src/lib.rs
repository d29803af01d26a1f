//! Simulation toolkit for integration-testing the Filament stack.
//!
//! Real node processes share a channel directory and pace themselves with
//! a one-second sleep; the [`Cluster`] harness instead drives any number
//! of in-process nodes tick by tick over the same file substrate, with no
//! wall-clock delay and with hooks for fault injection (frame corruption,
//! node halts) between ticks.

pub mod cluster;

pub use cluster::Cluster;

use std::fs;
use std::io;
use std::path::Path;

/// Delete every regular file directly inside `dir`, returning how many
/// were removed. Missing directories count as already clean.
pub fn clear_dir(dir: &Path) -> io::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            fs::remove_file(entry.path())?;
            tracing::info!(path = %entry.path().display(), "removed");
            removed += 1;
        }
    }
    Ok(removed)
}
