//! Target list files: one target per line, `#` starts a comment.

use anyhow::{bail, Context, Result};
use lodestar_core::TargetRef;
use std::path::Path;

/// Parse target list text.
pub fn parse_targets(text: &str) -> Result<Vec<TargetRef>> {
    let mut targets = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let target =
            TargetRef::new(line).with_context(|| format!("line {}: invalid target", index + 1))?;
        targets.push(target);
    }

    if targets.is_empty() {
        bail!("target list is empty");
    }
    Ok(targets)
}

/// Read and parse a target list file.
pub fn read_targets(path: &Path) -> Result<Vec<TargetRef>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read targets from {}", path.display()))?;
    parse_targets(&text)
}
