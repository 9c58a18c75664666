use anyhow::Result;
use clap::{Args, ValueEnum};
use mapper_protocol::ChangedScope;
use std::path::{Path, PathBuf};

use super::{read_changed_lists, read_snapshot, to_json, write_output, OutputFormat};
use crate::config::MapperConfig;
use crate::exit::ExitStatus;
use crate::ConfigArgs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScopeArg {
    /// Only the changed files themselves
    Files,
    /// Every file of a module that contains a change
    Modules,
}

impl From<ScopeArg> for ChangedScope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Files => ChangedScope::Files,
            ScopeArg::Modules => ChangedScope::Modules,
        }
    }
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Snapshot JSON produced by `mapper scan`
    pub snapshot: PathBuf,

    /// Token budget per bucket (defaults to the config value, then 150000)
    #[arg(long)]
    pub max_tokens: Option<u64>,

    /// Restrict planning to these changes (one path per line or JSON; `-` reads stdin)
    #[arg(long = "changed", value_name = "FILE")]
    pub changed: Vec<PathBuf>,

    /// How changed paths select files
    #[arg(long, value_enum)]
    pub scope: Option<ScopeArg>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Write the plan to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

pub async fn run_plan(args: PlanArgs) -> Result<ExitStatus> {
    let snapshot = read_snapshot(&args.snapshot)?;
    let config = MapperConfig::load(Path::new(&snapshot.root), &args.config.source())?;

    let max_tokens = args.max_tokens.unwrap_or(config.max_tokens_per_bucket);
    let scope = args.scope.map(ChangedScope::from).unwrap_or(config.changed_scope);
    let changes = read_changed_lists(&args.changed)?;

    let plan = mapper_planner::plan(&snapshot, max_tokens, changes.as_ref(), scope)?;
    let body = match args.format {
        OutputFormat::Json => to_json(&plan)?,
        OutputFormat::Text => plan.to_text(),
    };
    write_output(args.output.as_deref(), &body)?;

    // A plan over a partial snapshot is still a plan; the scan already reported the gaps.
    Ok(ExitStatus::Success)
}
