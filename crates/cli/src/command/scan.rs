use anyhow::Result;
use clap::{Args, ValueEnum};
use mapper_protocol::{ChangedScope, HashMode, ModuleStatus, Snapshot, TokenizerMode};
use mapper_scanner::{
    list_changed, ChangeError, ChangeListOptions, ChangeRange, ScanConfig, ScanRequest, Scanner,
};
use std::fmt::Write as _;
use std::path::PathBuf;

use super::plan::ScopeArg;
use super::{read_changed_lists, read_snapshot, status_for_warnings, to_json, write_output};
use crate::config::MapperConfig;
use crate::exit::ExitStatus;
use crate::ConfigArgs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScanFormat {
    /// Full snapshot as JSON
    Json,
    /// Totals, modules and warnings for humans
    Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TokenizerArg {
    Exact,
    Heuristic,
}

impl From<TokenizerArg> for TokenizerMode {
    fn from(arg: TokenizerArg) -> Self {
        match arg {
            TokenizerArg::Exact => TokenizerMode::Exact,
            TokenizerArg::Heuristic => TokenizerMode::Heuristic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HashModeArg {
    Fast,
    Full,
}

impl From<HashModeArg> for HashMode {
    fn from(arg: HashModeArg) -> Self {
        match arg {
            HashModeArg::Fast => HashMode::Fast,
            HashModeArg::Full => HashMode::Full,
        }
    }
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Project root to scan
    #[arg(default_value = ".")]
    pub root: PathBuf,

    /// Write the snapshot JSON to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = ScanFormat::Json)]
    pub format: ScanFormat,

    /// Changed-file list (one path per line or JSON; `-` reads stdin). Repeatable
    #[arg(long = "changed", value_name = "FILE")]
    pub changed: Vec<PathBuf>,

    /// Restrict the scan to files changed in a git revision range (e.g. `main..HEAD`)
    #[arg(long, value_name = "RANGE", conflicts_with = "changed")]
    pub changed_range: Option<String>,

    /// Scan only the changed files, or every file of the modules they touch (default from
    /// config: modules)
    #[arg(long, value_enum)]
    pub changed_scope: Option<ScopeArg>,

    /// Previous snapshot to diff against
    #[arg(long, value_name = "SNAPSHOT")]
    pub previous: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ScanOverrides,

    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Command-line values that take precedence over the config file.
#[derive(Args, Debug, Default)]
pub struct ScanOverrides {
    /// Require git enumeration (fails when the root is not a work tree)
    #[arg(long, conflicts_with = "no_git")]
    pub git: bool,

    /// Never use git; walk the filesystem
    #[arg(long)]
    pub no_git: bool,

    /// Do not push include/exclude globs into `git ls-files`
    #[arg(long)]
    pub no_git_pathspec: bool,

    /// Tokenization workers (0 = sequential)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Disable the scan cache
    #[arg(long)]
    pub no_cache: bool,

    /// Store the cache gzip-compressed
    #[arg(long)]
    pub cache_compress: bool,

    /// Cache file location (relative paths resolve against the root)
    #[arg(long)]
    pub cache_path: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub tokenizer: Option<TokenizerArg>,

    /// `tokenizer.json` for the exact tokenizer
    #[arg(long)]
    pub tokenizer_path: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub hash_mode: Option<HashModeArg>,

    /// Size ceiling in bytes; larger files are recorded but not tokenized
    #[arg(long)]
    pub max_file_size: Option<u64>,

    /// Directory components that form a module id (0 = one module)
    #[arg(long)]
    pub module_depth: Option<usize>,

    /// Include glob (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub include: Vec<String>,

    /// Exclude glob (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    #[arg(long)]
    pub follow_symlinks: bool,

    /// Per-file tokenization timeout in milliseconds
    #[arg(long)]
    pub token_timeout_ms: Option<u64>,

    /// Number of largest files listed in the snapshot
    #[arg(long)]
    pub top_files: Option<usize>,

    /// Number of entry points listed in the snapshot (0 = all)
    #[arg(long)]
    pub entrypoints_limit: Option<usize>,

    /// Count per-file commits over this many recent commits (0 = off)
    #[arg(long)]
    pub churn_commits: Option<usize>,
}

impl ScanOverrides {
    pub fn apply(&self, config: &mut ScanConfig) {
        if self.git {
            config.use_git = Some(true);
        }
        if self.no_git {
            config.use_git = Some(false);
        }
        if self.no_git_pathspec {
            config.git_pathspec = false;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.no_cache {
            config.cache_enabled = false;
        }
        if self.cache_compress {
            config.cache_compress = true;
        }
        if let Some(path) = &self.cache_path {
            config.cache_path = Some(path.clone());
        }
        if let Some(tokenizer) = self.tokenizer {
            config.tokenizer = tokenizer.into();
        }
        if let Some(path) = &self.tokenizer_path {
            config.tokenizer_path = Some(path.clone());
        }
        if let Some(mode) = self.hash_mode {
            config.hash_mode = mode.into();
        }
        if let Some(size) = self.max_file_size {
            config.max_file_size = size;
        }
        if let Some(depth) = self.module_depth {
            config.module_depth = depth;
        }
        config.include.extend(self.include.iter().cloned());
        config.exclude.extend(self.exclude.iter().cloned());
        if self.follow_symlinks {
            config.follow_symlinks = true;
        }
        if let Some(ms) = self.token_timeout_ms {
            config.token_timeout_ms = ms;
        }
        if let Some(limit) = self.top_files {
            config.top_files = limit;
        }
        if let Some(limit) = self.entrypoints_limit {
            config.entrypoints_limit = limit;
        }
        if let Some(commits) = self.churn_commits {
            config.churn_commits = commits;
        }
    }
}

pub async fn run_scan(args: ScanArgs) -> Result<ExitStatus> {
    let mut config = MapperConfig::load(&args.root, &args.config.source())?;
    args.overrides.apply(&mut config.scan);

    let scanner = Scanner::new(&args.root, config.scan).await?;
    let previous = args.previous.as_deref().map(read_snapshot).transpose()?;

    let mut changed = read_changed_lists(&args.changed)?;
    if let Some(range) = &args.changed_range {
        let options = ChangeListOptions {
            range: ChangeRange::Range(range.clone()),
            include_untracked: false,
        };
        match list_changed(scanner.root(), &options).await {
            Ok(set) => changed = Some(set),
            Err(ChangeError::Unavailable(msg)) => {
                log::warn!("{msg}; running a full scan instead");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let scope = args
        .changed_scope
        .map(ChangedScope::from)
        .unwrap_or(config.changed_scope);
    let cache = scanner.load_cache().await;
    let outcome = scanner
        .scan(
            ScanRequest {
                changed: changed.as_ref(),
                scope,
                previous: previous.as_ref(),
            },
            cache,
        )
        .await?;
    scanner.save_cache(&outcome.cache).await?;

    let snapshot = outcome.snapshot;
    match args.format {
        ScanFormat::Json => write_output(args.output.as_deref(), &to_json(&snapshot)?)?,
        ScanFormat::Summary => {
            if let Some(output) = args.output.as_deref() {
                write_output(Some(output), &to_json(&snapshot)?)?;
            }
            println!("{}", render_summary(&snapshot));
        }
    }

    for record in snapshot.flagged().filter(|r| r.is_warning()) {
        log::warn!(
            "{}: {}",
            record.path,
            record.error.as_deref().unwrap_or("flagged")
        );
    }
    Ok(status_for_warnings(snapshot.warnings))
}

fn render_summary(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    let completeness = if snapshot.complete { "" } else { " (incomplete)" };
    let _ = writeln!(
        out,
        "Scanned {} files, {} tokens, {} modules{completeness}",
        snapshot.total_files,
        snapshot.total_tokens,
        snapshot.modules.len()
    );
    let _ = writeln!(
        out,
        "Cache: {} hits, {} misses, {} tokenized",
        snapshot.cache.hits, snapshot.cache.misses, snapshot.cache.tokenized
    );
    let _ = writeln!(out, "Warnings: {}", snapshot.warnings);

    let _ = writeln!(out, "Modules:");
    for (module, summary) in &snapshot.modules {
        let status = snapshot
            .diff
            .as_ref()
            .and_then(|diff| diff.modules.get(module))
            .map(|status| match status {
                ModuleStatus::Unchanged => "",
                ModuleStatus::Added => " [added]",
                ModuleStatus::Removed => " [removed]",
                ModuleStatus::Modified => " [modified]",
            })
            .unwrap_or("");
        let _ = writeln!(
            out,
            "  {module}: {} tokens in {} files{status}",
            summary.tokens, summary.files
        );
    }
    if let Some(diff) = &snapshot.diff {
        for module in diff.modules_with(ModuleStatus::Removed) {
            let _ = writeln!(out, "  {module}: [removed]");
        }
    }

    if !snapshot.top_files.is_empty() {
        let _ = writeln!(out, "Top files:");
        for top in &snapshot.top_files {
            let _ = writeln!(out, "  {} ({} tokens)", top.path, top.tokens);
        }
    }
    if !snapshot.entrypoints.is_empty() {
        let _ = writeln!(out, "Entry points:");
        for entry in &snapshot.entrypoints {
            let _ = writeln!(out, "  {} ({} tokens)", entry.path, entry.tokens);
        }
    }
    if !snapshot.churn.is_empty() {
        let _ = writeln!(out, "Churn:");
        for entry in &snapshot.churn {
            let _ = writeln!(out, "  {} ({} commits)", entry.path, entry.commits);
        }
    }
    out.trim_end().to_string()
}
