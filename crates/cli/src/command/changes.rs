use anyhow::Result;
use clap::Args;
use mapper_scanner::{list_changed, ChangeListOptions, ChangeRange};
use std::path::PathBuf;

use super::{to_json, write_output, OutputFormat};
use crate::exit::ExitStatus;

#[derive(Args, Debug)]
pub struct ChangesArgs {
    /// Repository root
    #[arg(default_value = ".")]
    pub root: PathBuf,

    /// Revision range, e.g. `main..HEAD`
    #[arg(long, conflicts_with_all = ["since", "since_date"])]
    pub range: Option<String>,

    /// Changes from this revision to HEAD
    #[arg(long, conflicts_with = "since_date")]
    pub since: Option<String>,

    /// Files touched by commits after this date (anything `git log --since` accepts)
    #[arg(long, value_name = "DATE")]
    pub since_date: Option<String>,

    /// Also list untracked files that are not ignored
    #[arg(long)]
    pub include_untracked: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Write the list to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ChangesArgs {
    fn range(&self) -> ChangeRange {
        if let Some(range) = &self.range {
            ChangeRange::Range(range.clone())
        } else if let Some(rev) = &self.since {
            ChangeRange::Since(rev.clone())
        } else if let Some(date) = &self.since_date {
            ChangeRange::SinceDate(date.clone())
        } else {
            ChangeRange::LastCommit
        }
    }
}

pub async fn run_changes(args: ChangesArgs) -> Result<ExitStatus> {
    let options = ChangeListOptions {
        range: args.range(),
        include_untracked: args.include_untracked,
    };
    let set = list_changed(&args.root, &options).await?;

    let body = match args.format {
        OutputFormat::Json => to_json(&set)?,
        OutputFormat::Text => set.to_text(),
    };
    write_output(args.output.as_deref(), &body)?;
    Ok(ExitStatus::Success)
}
