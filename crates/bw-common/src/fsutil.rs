//! Small filesystem helpers shared by the config and state writers.

use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;

/// Write `value` as pretty JSON via a temp file and rename.
///
/// Readers never observe a partially written file. Serialization failures
/// are reported as `InvalidData`.
pub fn write_json_pretty_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_vec_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("state.json");
    let tmp_path = path.with_file_name(format!("{}.tmp.{}", file_name, std::process::id()));
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(&content)?;
        file.write_all(b"\n")?;
        let _ = file.sync_all();
    }
    std::fs::rename(&tmp_path, path)
}
