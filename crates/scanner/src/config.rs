use mapper_protocol::{HashMode, TokenizerMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, ScanError};
use crate::limits::MAX_WORKERS;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 1_000_000;
pub const DEFAULT_MODULE_DEPTH: usize = 1;
pub const DEFAULT_TOKEN_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_TOP_FILES: usize = 20;
pub const DEFAULT_ENTRYPOINTS_LIMIT: usize = 20;

/// Options recognized by the scanner. Field names double as config-file keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanConfig {
    /// `None` detects a git work tree at startup; `Some(true)` requires one.
    pub use_git: Option<bool>,
    /// Push include/exclude globs down into `git ls-files` as pathspecs.
    pub git_pathspec: bool,
    /// Parallel tokenization workers; 0 runs sequentially.
    pub workers: usize,
    pub cache_enabled: bool,
    pub cache_compress: bool,
    pub cache_path: Option<PathBuf>,
    pub tokenizer: TokenizerMode,
    /// `tokenizer.json` used by the exact tokenizer.
    pub tokenizer_path: Option<PathBuf>,
    pub hash_mode: HashMode,
    pub max_file_size: u64,
    pub module_depth: usize,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub follow_symlinks: bool,
    pub token_timeout_ms: u64,
    pub top_files: usize,
    /// Maximum entry points reported; 0 reports all of them.
    pub entrypoints_limit: usize,
    /// Recent commits inspected for churn; 0 skips churn.
    pub churn_commits: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            use_git: None,
            git_pathspec: true,
            workers: 0,
            cache_enabled: true,
            cache_compress: false,
            cache_path: None,
            tokenizer: TokenizerMode::Heuristic,
            tokenizer_path: None,
            hash_mode: HashMode::Fast,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            module_depth: DEFAULT_MODULE_DEPTH,
            include: Vec::new(),
            exclude: Vec::new(),
            follow_symlinks: false,
            token_timeout_ms: DEFAULT_TOKEN_TIMEOUT_MS,
            top_files: DEFAULT_TOP_FILES,
            entrypoints_limit: DEFAULT_ENTRYPOINTS_LIMIT,
            churn_commits: 0,
        }
    }
}

impl ScanConfig {
    /// Reject option combinations that cannot run. Called before any work begins.
    pub fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 {
            return Err(ScanError::Configuration(
                "max_file_size must be greater than zero".into(),
            ));
        }
        if self.token_timeout_ms == 0 {
            return Err(ScanError::Configuration(
                "token_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.workers > MAX_WORKERS {
            return Err(ScanError::Configuration(format!(
                "workers must be at most {MAX_WORKERS} (got {})",
                self.workers
            )));
        }
        if self.tokenizer == TokenizerMode::Exact && self.tokenizer_path.is_none() {
            return Err(ScanError::TokenizerUnavailable(
                "exact tokenizer selected but no tokenizer_path configured (use the heuristic tokenizer or set MAPPER_TOKENIZER_PATH)".into(),
            ));
        }
        Ok(())
    }
}
