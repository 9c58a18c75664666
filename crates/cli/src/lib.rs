use clap::{Args, Parser, Subcommand};
use command::{ChangesArgs, PlanArgs, ScanArgs};
use config::ConfigSource;
use exit::ExitStatus;
use std::path::PathBuf;
use std::process::ExitCode;

mod command;
pub mod config;
pub mod exit;

#[derive(Parser)]
#[command(name = "mapper")]
#[command(about = "Token-cost snapshots and budget-bounded bucket plans for source trees", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for output documents)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a project and print its token snapshot
    Scan(ScanArgs),

    /// Split a snapshot into token-bounded buckets
    Plan(PlanArgs),

    /// List files changed in git history
    Changes(ChangesArgs),

    /// Print the JSON Schema of the snapshot (or plan) document
    Schema(SchemaArgs),
}

/// Config file selection shared by commands that read `.mapper.toml`.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Explicit config file (TOML, or JSON by extension)
    #[arg(long, value_name = "FILE", conflicts_with = "no_config")]
    pub config: Option<PathBuf>,

    /// Ignore `.mapper.toml` / `.mapper.json` at the root
    #[arg(long)]
    pub no_config: bool,
}

impl ConfigArgs {
    pub fn source(&self) -> ConfigSource {
        ConfigSource {
            explicit: self.config.clone(),
            disabled: self.no_config,
        }
    }
}

#[derive(Args)]
struct SchemaArgs {
    /// Print the bucket plan schema instead of the snapshot schema
    #[arg(long)]
    plan: bool,
}

pub async fn main_entry() -> ExitCode {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // tokenizers logs every file it loads at info
    if !cli.verbose {
        builder.filter_module("tokenizers", log::LevelFilter::Warn);
    }
    builder.target(env_logger::Target::Stderr).init();

    let result = match cli.command {
        Commands::Scan(args) => command::run_scan(args).await,
        Commands::Plan(args) => command::run_plan(args).await,
        Commands::Changes(args) => command::run_changes(args).await,
        Commands::Schema(args) => run_schema(&args),
    };

    match result {
        Ok(status) => status.into(),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitStatus::classify(&err).into()
        }
    }
}

fn run_schema(args: &SchemaArgs) -> anyhow::Result<ExitStatus> {
    let schema = if args.plan {
        mapper_protocol::plan_schema()
    } else {
        mapper_protocol::snapshot_schema()
    };
    command::write_output(None, &command::to_json(&schema)?)?;
    Ok(ExitStatus::Success)
}
