//! CLI Commands

pub mod inspect;
pub mod replay;

use allure_bridge_reporter::replay::{load_events, HostEvent};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Event stream files under a path: the file itself, or every `.ndjson` and
/// `.jsonl` file below a directory in sorted order
pub fn event_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        bail!("No such event file or directory: {}", path.display());
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == "ndjson" || ext == "jsonl")
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    Ok(files)
}

/// Read and parse one recorded event stream
pub async fn read_events(path: &Path) -> Result<Vec<HostEvent>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    load_events(content.as_bytes())
        .with_context(|| format!("Invalid event stream {}", path.display()))
}
