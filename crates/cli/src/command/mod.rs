mod changes;
mod plan;
mod scan;

pub use changes::{run_changes, ChangesArgs};
pub use plan::{run_plan, PlanArgs};
pub use scan::{run_scan, ScanArgs};

use anyhow::{Context, Result};
use clap::ValueEnum;
use mapper_protocol::{ChangeSet, Snapshot};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::config::ConfigError;
use crate::exit::ExitStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Machine-readable JSON document
    Json,
    /// Human-readable listing
    Text,
}

/// Merge every `--changed` list into one set. `-` reads stdin.
pub(crate) fn read_changed_lists(sources: &[PathBuf]) -> Result<Option<ChangeSet>> {
    if sources.is_empty() {
        return Ok(None);
    }
    let mut merged = ChangeSet::default();
    for source in sources {
        let text = if source.as_os_str() == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read changed list from stdin")?;
            buf
        } else {
            std::fs::read_to_string(source).map_err(|err| {
                ConfigError(format!(
                    "cannot read changed list {}: {err}",
                    source.display()
                ))
            })?
        };
        merged.merge(ChangeSet::parse_list(&text));
    }
    log::debug!("Changed list holds {} paths", merged.len());
    Ok(Some(merged))
}

/// A snapshot named on the command line. Missing or unparsable files are input errors.
pub(crate) fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let bytes = std::fs::read(path).map_err(|err| {
        ConfigError(format!("cannot read snapshot {}: {err}", path.display()))
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|err| ConfigError(format!("invalid snapshot {}: {err}", path.display())).into())
}

/// Write `body` to `output`, or to stdout when no path is given.
pub(crate) fn write_output(output: Option<&Path>, body: &str) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Cannot create {}", parent.display()))?;
            }
            let tmp = path.with_extension("tmp");
            std::fs::write(&tmp, body)
                .with_context(|| format!("Failed to write {}", tmp.display()))?;
            std::fs::rename(&tmp, path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Wrote {}", path.display());
        }
        None => print_stdout(body)?,
    }
    Ok(())
}

/// Print to stdout; a closed pipe (`mapper scan | head`) is not an error.
fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = std::io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == std::io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize output")
}

pub(crate) fn status_for_warnings(warnings: usize) -> ExitStatus {
    if warnings > 0 {
        ExitStatus::PartialData
    } else {
        ExitStatus::Success
    }
}
