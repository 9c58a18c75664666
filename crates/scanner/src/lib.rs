//! # Mapper Scanner
//!
//! Token-cost snapshots of a source tree.
//!
//! ## Pipeline
//!
//! ```text
//! Root
//!     │
//!     ├──> File Enumerator (git ls-files │ .gitignore-aware walk │ changed list)
//!     │      └─> Candidate paths
//!     │
//!     ├──> Fingerprints + Scan Cache
//!     │      └─> Hits reuse token counts
//!     │
//!     ├──> Tokenizer workers (bounded, per-file timeout)
//!     │      └─> File records
//!     │
//!     └──> Module summaries, root fingerprint, diff, entry points, churn
//!            └─> Snapshot
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use mapper_scanner::{ScanConfig, ScanRequest, Scanner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let scanner = Scanner::new("/path/to/project", ScanConfig::default()).await?;
//!     let cache = scanner.load_cache().await;
//!     let outcome = scanner.scan(ScanRequest::default(), cache).await?;
//!     scanner.save_cache(&outcome.cache).await?;
//!
//!     println!(
//!         "{} files, {} tokens",
//!         outcome.snapshot.total_files, outcome.snapshot.total_tokens
//!     );
//!     Ok(())
//! }
//! ```

mod cache;
mod changes;
mod config;
mod diff;
mod enumerate;
mod error;
mod fingerprint;
mod git;
mod limits;
mod scan;
mod signals;
mod tokenizer;

pub use cache::{default_cache_path, CacheEntry, CacheIdentity, ScanCache, CACHE_DIR, CACHE_VERSION};
pub use changes::{list_changed, list_changed_in, ChangeListOptions, ChangeRange};
pub use config::{
    ScanConfig, DEFAULT_ENTRYPOINTS_LIMIT, DEFAULT_MAX_FILE_SIZE, DEFAULT_MODULE_DEPTH,
    DEFAULT_TOKEN_TIMEOUT_MS, DEFAULT_TOP_FILES,
};
pub use diff::{compute_diff, effective_records, summarize_modules};
pub use enumerate::{Enumeration, FileEnumerator};
pub use error::{ChangeError, Result, ScanError, TokenizeError};
pub use fingerprint::{content_fingerprint, fast_fingerprint, module_fingerprint, root_fingerprint};
pub use git::GitRepo;
pub use limits::{effective_workers, workers_from_env, WorkerPool, WorkerPoolSnapshot, MAX_WORKERS};
pub use scan::{scan_root, ScanOutcome, ScanRequest, Scanner};
pub use signals::{detect_entrypoints, parent_directories, ENTRYPOINT_PATTERNS};
pub use tokenizer::{build_tokenizer, ExactTokenizer, HeuristicTokenizer, TokenCounter};
