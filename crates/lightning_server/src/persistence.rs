use anyhow::{Context, Result};
use lightning_core::Pattern;
use std::fs;
use std::path::Path;

/// Load a pattern snapshot from a JSON file
pub fn load_pattern(path: &Path) -> Result<Pattern> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read pattern from {}", path.display()))?;
    let pattern: Pattern = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse pattern JSON in {}", path.display()))?;
    Ok(pattern)
}
