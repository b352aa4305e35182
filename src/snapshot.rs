use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use std::fs;
use std::path::{Path, PathBuf};

pub const SNAPSHOT_FILE: &str = "data.json";

/// Save the raw feed items, untouched, to `<dir>/data.json`
pub fn save_snapshot(dir: &Path, items: &[Value]) -> Result<PathBuf> {
    let path = dir.join(SNAPSHOT_FILE);

    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    items.serialize(&mut ser)?;

    fs::write(&path, buf)
        .with_context(|| format!("Failed to write snapshot '{}'", path.display()))?;
    Ok(path)
}

/// Load raw feed items from a snapshot written by [`save_snapshot`]
pub fn load_snapshot(path: &Path) -> Result<Vec<Value>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot '{}'", path.display()))?;
    if contents.trim().is_empty() {
        bail!("Snapshot '{}' is empty", path.display());
    }

    let items: Vec<Value> = serde_json::from_str(&contents)
        .with_context(|| format!("Snapshot '{}' is not a JSON array of items", path.display()))?;
    Ok(items)
}
