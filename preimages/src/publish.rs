//! Two-location artifact staging.
//!
//! Runs accumulate into a working copy and only promote it to the stable
//! output path after a successful commit, so readers of the output path
//! never observe a partially written index.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

/// Seeds the staging path from the last published artifact, if one exists,
/// so the run continues from it. Any leftover staging file from an
/// interrupted run is replaced.
pub fn resume_from_published(output: &Path, staging: &Path) -> Result<()> {
    if !output.exists() {
        return Ok(());
    }
    if let Some(parent) = staging.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating staging directory {}", parent.display()))?;
    }
    fs::copy(output, staging)
        .with_context(|| format!("restoring published index from {}", output.display()))?;
    info!(from = %output.display(), to = %staging.display(), "resuming from published index");
    Ok(())
}

/// Promotes the staging file to the output path.
///
/// The artifact is copied next to the output and renamed over it, so the
/// output path always holds either the previous or the new complete index.
pub fn publish(staging: &Path, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }
    let incoming = output.with_extension("incoming");
    fs::copy(staging, &incoming)
        .with_context(|| format!("staging index next to {}", output.display()))?;
    fs::rename(&incoming, output)
        .with_context(|| format!("publishing index to {}", output.display()))?;
    info!(output = %output.display(), "published preimage index");
    Ok(())
}
