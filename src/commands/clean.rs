//! Remove sandboxes left behind by a crashed or killed server.
//!
//! Only containers carrying the managed label are touched.

use anyhow::{Context, Result};
use colored::Colorize;
use std::fmt::Write;

use crate::sandbox::DockerBackend;

/// Format the clean results as a displayable string
fn format_results(removed: u32) -> String {
    let mut out = String::new();
    let _ = if removed == 0 {
        writeln!(&mut out, "\n{} No stray sandboxes found.", "ℹ".blue())
    } else {
        let noun = if removed == 1 { "sandbox" } else { "sandboxes" };
        writeln!(
            &mut out,
            "\n{} Removed {} stray {}.",
            "✓".green(),
            removed,
            noun
        )
    };
    out
}

/// Entry point: connects to Docker and removes every managed container
pub(crate) async fn run() -> Result<()> {
    let backend = DockerBackend::connect()
        .await
        .context("Docker is not available")?;

    let removed = backend
        .remove_managed()
        .await
        .context("Failed to clean up sandboxes")?;

    print!("{}", format_results(removed));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_results_empty() {
        let output = format_results(0);
        assert!(output.contains("No stray sandboxes"));
    }

    #[test]
    fn test_format_results_counts() {
        assert!(format_results(1).contains("Removed 1 stray sandbox."));
        assert!(format_results(3).contains("Removed 3 stray sandboxes."));
    }
}
