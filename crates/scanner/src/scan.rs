use mapper_protocol::{
    module_id, CacheStats, ChangeSet, ChangedScope, ChurnEntry, FileFlag, FileRecord,
    FileSourceKind, HashMode, Snapshot, SnapshotConfig, TopFile, SNAPSHOT_SCHEMA_VERSION,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio::time::{timeout, Duration};

use crate::cache::{default_cache_path, CacheEntry, CacheIdentity, ScanCache};
use crate::config::ScanConfig;
use crate::diff::{compute_diff, effective_records, summarize_modules};
use crate::enumerate::FileEnumerator;
use crate::error::{Result, ScanError};
use crate::fingerprint::{
    content_fingerprint, fast_fingerprint, mtime_parts, root_fingerprint, unix_now_ms,
};
use crate::git::GitRepo;
use crate::limits::{WorkerPool, WorkerPoolSnapshot};
use crate::signals::{detect_entrypoints, parent_directories, rank_churn};
use crate::tokenizer::{build_tokenizer, TokenCounter};

const BINARY_SNIFF_BYTES: usize = 8 * 1024;

/// Optional inputs of one scan.
#[derive(Debug, Clone, Copy)]
pub struct ScanRequest<'a> {
    /// Restrict the scan to these paths; the snapshot is then marked incomplete.
    pub changed: Option<&'a ChangeSet>,
    /// Whether `changed` names the files to scan or the modules to rescan. Defaults to files.
    pub scope: ChangedScope,
    /// Compute a module and file diff against this snapshot.
    pub previous: Option<&'a Snapshot>,
}

impl Default for ScanRequest<'_> {
    fn default() -> Self {
        Self {
            changed: None,
            scope: ChangedScope::Files,
            previous: None,
        }
    }
}

/// Paths an incremental scan answers for: the changed paths, plus every path in a touched module
/// under [`ChangedScope::Modules`].
struct Coverage<'a> {
    changed: &'a ChangeSet,
    modules: Option<(BTreeSet<String>, usize)>,
}

impl<'a> Coverage<'a> {
    fn new(changed: &'a ChangeSet, scope: ChangedScope, depth: usize) -> Self {
        let modules = match scope {
            ChangedScope::Files => None,
            ChangedScope::Modules => Some((changed.modules(depth), depth)),
        };
        Self { changed, modules }
    }

    fn covers(&self, path: &str) -> bool {
        self.changed.contains(path)
            || self
                .modules
                .as_ref()
                .is_some_and(|(modules, depth)| modules.contains(&module_id(path, *depth)))
    }
}

#[derive(Debug)]
pub struct ScanOutcome {
    pub snapshot: Snapshot,
    /// The cache after this scan; persisting it is the caller's decision.
    pub cache: ScanCache,
    pub workers: WorkerPoolSnapshot,
}

/// Scans one root with a fixed configuration.
///
/// All optional capabilities (tokenizer backend, git) are resolved in the constructor, so a
/// missing backend fails before any file is touched.
pub struct Scanner {
    root: PathBuf,
    config: ScanConfig,
    tokenizer: Arc<dyn TokenCounter>,
    git: Option<GitRepo>,
    enumerator: FileEnumerator,
}

/// Token-count work for one file that missed the cache.
struct Job {
    path: String,
    abs: PathBuf,
    size_bytes: u64,
    mtime_ms: u64,
    fingerprint: String,
}

impl Scanner {
    pub async fn new(root: impl AsRef<Path>, config: ScanConfig) -> Result<Self> {
        config.validate()?;
        let tokenizer = build_tokenizer(&config)?;
        Self::with_tokenizer(root, config, tokenizer).await
    }

    /// Like [`Scanner::new`] with a caller-supplied tokenizer.
    pub async fn with_tokenizer(
        root: impl AsRef<Path>,
        config: ScanConfig,
        tokenizer: Arc<dyn TokenCounter>,
    ) -> Result<Self> {
        config.validate()?;
        let root = root.as_ref();
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|err| ScanError::InvalidPath(format!("{}: {err}", root.display())))?;
        if !root.is_dir() {
            return Err(ScanError::InvalidPath(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let git = match config.use_git {
            Some(false) => None,
            Some(true) => Some(GitRepo::detect(&root).await?),
            None => match GitRepo::detect(&root).await {
                Ok(git) => Some(git),
                Err(err) => {
                    log::debug!("Git unavailable, using filesystem walk: {err}");
                    None
                }
            },
        };

        let mut enumerator = FileEnumerator::new(&root, &config)?;
        if config.cache_enabled {
            let cache_path = resolve_cache_path(&root, &config);
            if let Ok(rel) = cache_path.strip_prefix(&root) {
                enumerator.skip_path(&rel.to_string_lossy());
                if let Ok(tmp) = cache_path.with_extension("tmp").strip_prefix(&root) {
                    enumerator.skip_path(&tmp.to_string_lossy());
                }
            }
        }
        Ok(Self {
            root,
            config,
            tokenizer,
            git,
            enumerator,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn uses_git(&self) -> bool {
        self.git.is_some()
    }

    pub fn snapshot_config(&self) -> SnapshotConfig {
        SnapshotConfig {
            tokenizer: self.tokenizer.mode(),
            tokenizer_id: self.tokenizer.id().to_string(),
            hash_mode: self.config.hash_mode,
            module_depth: self.config.module_depth,
            max_file_size: self.config.max_file_size,
        }
    }

    pub fn cache_identity(&self) -> CacheIdentity {
        CacheIdentity {
            tokenizer_id: self.tokenizer.id().to_string(),
            hash_mode: self.config.hash_mode,
            max_file_size: self.config.max_file_size,
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        resolve_cache_path(&self.root, &self.config)
    }

    fn cache_compressed(&self) -> bool {
        self.config.cache_compress
            || self
                .cache_path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
    }

    /// The persisted cache, or an empty one when caching is disabled.
    pub async fn load_cache(&self) -> ScanCache {
        if !self.config.cache_enabled {
            return ScanCache::empty(self.cache_identity());
        }
        ScanCache::load(&self.cache_path(), &self.cache_identity()).await
    }

    pub async fn save_cache(&self, cache: &ScanCache) -> Result<()> {
        if !self.config.cache_enabled {
            return Ok(());
        }
        cache.save(&self.cache_path(), self.cache_compressed()).await
    }

    pub async fn scan(
        &self,
        request: ScanRequest<'_>,
        mut cache: ScanCache,
    ) -> Result<ScanOutcome> {
        let start = Instant::now();
        let snapshot_config = self.snapshot_config();

        if let Some(previous) = request.previous {
            if !previous.config.comparable_with(&snapshot_config) {
                return Err(ScanError::IncomparableSnapshot(format!(
                    "previous snapshot was built with [{}], current configuration is [{}]",
                    previous.config.identity(),
                    snapshot_config.identity()
                )));
            }
            if !previous.complete {
                log::warn!(
                    "Previous snapshot is incomplete; modules it did not cover show as added"
                );
            }
        }

        let enumeration = self
            .enumerator
            .enumerate(self.git.as_ref(), request.changed, request.scope)
            .await?;
        let coverage = request
            .changed
            .map(|changed| Coverage::new(changed, request.scope, self.config.module_depth));
        let use_cache = self.config.cache_enabled;
        let mut stats = CacheStats {
            enabled: use_cache,
            ..CacheStats::default()
        };

        let mut records = Vec::with_capacity(enumeration.paths.len());
        let mut jobs = Vec::new();
        for path in &enumeration.paths {
            let abs = self.root.join(path);
            let meta = match tokio::fs::metadata(&abs).await {
                Ok(meta) => meta,
                Err(err) => {
                    log::warn!("Cannot stat {path}: {err}");
                    let record = self.flagged(path, 0, 0, 0, FileFlag::Unreadable, err.to_string());
                    records.push(record);
                    continue;
                }
            };
            let size_bytes = meta.len();
            let (mtime_ms, mtime_ns) = mtime_parts(meta.modified().ok());

            if size_bytes > self.config.max_file_size {
                log::debug!(
                    "Skipping large file {path} ({size_bytes} bytes > {})",
                    self.config.max_file_size
                );
                records.push(self.flagged(
                    path,
                    size_bytes,
                    mtime_ms,
                    mtime_ns,
                    FileFlag::Oversized,
                    format!("exceeds max_file_size ({size_bytes} bytes)"),
                ));
                continue;
            }

            let fingerprint = match self.config.hash_mode {
                HashMode::Fast => fast_fingerprint(size_bytes, mtime_ns),
                HashMode::Full => match tokio::fs::read(&abs).await {
                    Ok(bytes) => content_fingerprint(&bytes),
                    Err(err) => {
                        log::warn!("Cannot read {path}: {err}");
                        records.push(self.flagged(
                            path,
                            size_bytes,
                            mtime_ms,
                            mtime_ns,
                            FileFlag::Unreadable,
                            err.to_string(),
                        ));
                        continue;
                    }
                },
            };

            if use_cache {
                if let Some(entry) = cache.lookup(path, &fingerprint) {
                    stats.hits += 1;
                    records.push(FileRecord {
                        path: path.clone(),
                        size_bytes,
                        mtime_ms,
                        fingerprint,
                        tokens: entry.tokens,
                        module: module_id(path, self.config.module_depth),
                        flag: entry.flag,
                        error: None,
                    });
                    continue;
                }
                stats.misses += 1;
            }

            jobs.push(Job {
                path: path.clone(),
                abs,
                size_bytes,
                mtime_ms,
                fingerprint,
            });
        }

        let pool = WorkerPool::new(self.config.workers);
        log::debug!(
            "Tokenizing {} files with {} workers",
            jobs.len(),
            pool.limit()
        );
        let (tokenized, counted) = self.run_jobs(jobs, &pool).await?;
        stats.tokenized = counted;
        records.extend(tokenized);
        records.sort_by(|a, b| a.path.cmp(&b.path));

        if use_cache {
            self.refresh_cache(&mut cache, &records, coverage.as_ref());
        }

        let modules = summarize_modules(&records);
        let diff = request.previous.map(|previous| {
            let covered: Option<BTreeSet<String>> = coverage.as_ref().map(|coverage| {
                previous
                    .files
                    .iter()
                    .map(|record| &record.path)
                    .chain(&coverage.changed.paths)
                    .filter(|path| coverage.covers(path))
                    .cloned()
                    .collect()
            });
            let effective = effective_records(&previous.files, &records, covered.as_ref());
            let effective_modules = if covered.is_some() {
                summarize_modules(&effective)
            } else {
                modules.clone()
            };
            compute_diff(
                &previous.root_fingerprint,
                &previous.files,
                &previous.modules,
                &effective,
                &effective_modules,
            )
        });

        let git = match &self.git {
            Some(git) => Some(git.info().await),
            None => None,
        };
        let churn = self.churn(&records).await;

        let warnings = records.iter().filter(|r| r.is_warning()).count();
        let snapshot = Snapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            root: self.root.display().to_string(),
            created_at_unix_ms: unix_now_ms(),
            complete: request.changed.is_none(),
            root_fingerprint: root_fingerprint(&snapshot_config, &records),
            directories: parent_directories(&records),
            config: snapshot_config,
            source: enumeration.source,
            total_files: records.len(),
            total_tokens: records.iter().map(|r| r.tokens).sum(),
            top_files: top_files(&records, self.config.top_files),
            entrypoints: detect_entrypoints(&records, self.config.entrypoints_limit),
            churn,
            modules,
            warnings,
            cache: stats,
            git,
            changed_paths: request
                .changed
                .map(|set| set.paths.iter().cloned().collect()),
            changed_scope: request.changed.map(|_| request.scope),
            diff,
            elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            files: records,
        };

        log::info!(
            "Scanned {} files ({} tokens, {} modules, {} warnings) from {}",
            snapshot.total_files,
            snapshot.total_tokens,
            snapshot.modules.len(),
            snapshot.warnings,
            source_label(snapshot.source)
        );

        Ok(ScanOutcome {
            snapshot,
            cache,
            workers: pool.snapshot(),
        })
    }

    /// Read, classify and tokenize cache misses on the worker pool. Returns the records and the
    /// number of files actually handed to the tokenizer.
    async fn run_jobs(
        &self,
        jobs: Vec<Job>,
        pool: &WorkerPool,
    ) -> Result<(Vec<FileRecord>, usize)> {
        let budget = Duration::from_millis(self.config.token_timeout_ms);
        let mut tasks = JoinSet::new();
        for job in jobs {
            let pool = pool.clone();
            let tokenizer = Arc::clone(&self.tokenizer);
            let hash_mode = self.config.hash_mode;
            let depth = self.config.module_depth;
            tasks.spawn(async move {
                let _permit = pool.acquire().await;
                tokenize_job(job, tokenizer, hash_mode, depth, budget).await
            });
        }

        let mut records = Vec::with_capacity(tasks.len());
        let mut counted = 0usize;
        while let Some(joined) = tasks.join_next().await {
            let (record, was_counted) = joined
                .map_err(|err| ScanError::Other(format!("tokenization task failed: {err}")))?;
            if was_counted {
                counted += 1;
            }
            records.push(record);
        }
        Ok((records, counted))
    }

    /// Commit activity of the scanned files; empty when disabled or git is unusable.
    async fn churn(&self, records: &[FileRecord]) -> Vec<ChurnEntry> {
        let Some(git) = &self.git else {
            return Vec::new();
        };
        if self.config.churn_commits == 0 {
            return Vec::new();
        }
        match git.churn(self.config.churn_commits).await {
            Ok(counts) => rank_churn(counts, records),
            Err(err) => {
                log::warn!("Churn unavailable: {err}");
                Vec::new()
            }
        }
    }

    /// Store fresh results and drop entries for paths that are gone.
    fn refresh_cache(
        &self,
        cache: &mut ScanCache,
        records: &[FileRecord],
        coverage: Option<&Coverage<'_>>,
    ) {
        for record in records {
            match record.flag {
                None | Some(FileFlag::Binary) => cache.update(
                    record.path.clone(),
                    CacheEntry {
                        fingerprint: record.fingerprint.clone(),
                        tokens: record.tokens,
                        size_bytes: record.size_bytes,
                        mtime_ms: record.mtime_ms,
                        flag: record.flag,
                    },
                ),
                Some(_) => {
                    cache.remove(&record.path);
                }
            }
        }

        let recorded: BTreeSet<&str> = records.iter().map(|r| r.path.as_str()).collect();
        let pruned = match coverage {
            None => cache.retain(|path| recorded.contains(path)),
            Some(coverage) => {
                cache.retain(|path| !coverage.covers(path) || recorded.contains(path))
            }
        };
        if pruned > 0 {
            log::debug!("Pruned {pruned} stale cache entries");
        }
    }

    fn flagged(
        &self,
        path: &str,
        size_bytes: u64,
        mtime_ms: u64,
        mtime_ns: u128,
        flag: FileFlag,
        error: String,
    ) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            size_bytes,
            mtime_ms,
            fingerprint: fast_fingerprint(size_bytes, mtime_ns),
            tokens: 0,
            module: module_id(path, self.config.module_depth),
            flag: Some(flag),
            error: Some(error),
        }
    }
}

async fn tokenize_job(
    job: Job,
    tokenizer: Arc<dyn TokenCounter>,
    hash_mode: HashMode,
    depth: usize,
    budget: Duration,
) -> (FileRecord, bool) {
    let mut record = FileRecord {
        module: module_id(&job.path, depth),
        path: job.path,
        size_bytes: job.size_bytes,
        mtime_ms: job.mtime_ms,
        fingerprint: job.fingerprint,
        tokens: 0,
        flag: None,
        error: None,
    };

    let bytes = match tokio::fs::read(&job.abs).await {
        Ok(bytes) => bytes,
        Err(err) => {
            log::warn!("Cannot read {}: {err}", record.path);
            record.flag = Some(FileFlag::Unreadable);
            record.error = Some(err.to_string());
            return (record, false);
        }
    };
    if hash_mode == HashMode::Full {
        // The file may have changed since it was fingerprinted; describe what was counted.
        record.fingerprint = content_fingerprint(&bytes);
    }
    if is_binary(&bytes) {
        record.flag = Some(FileFlag::Binary);
        return (record, false);
    }

    let text = String::from_utf8_lossy(&bytes).into_owned();
    let counting = tokio::task::spawn_blocking(move || tokenizer.count(&text));
    match timeout(budget, counting).await {
        Ok(Ok(Ok(tokens))) => record.tokens = tokens,
        Ok(Ok(Err(err))) => {
            log::warn!("Tokenizer failed on {}: {err}", record.path);
            record.flag = Some(FileFlag::Unreadable);
            record.error = Some(format!("tokenizer failed: {err}"));
        }
        Ok(Err(err)) => {
            log::warn!("Tokenizer panicked on {}: {err}", record.path);
            record.flag = Some(FileFlag::Unreadable);
            record.error = Some(format!("tokenizer panicked: {err}"));
        }
        Err(_) => {
            log::warn!(
                "Tokenizing {} exceeded {}ms",
                record.path,
                budget.as_millis()
            );
            record.flag = Some(FileFlag::TimedOut);
            record.error = Some(format!("tokenization exceeded {}ms", budget.as_millis()));
        }
    }
    (record, true)
}

fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_SNIFF_BYTES).any(|b| *b == 0)
}

/// Largest records by token count, ties broken by path.
fn top_files(records: &[FileRecord], limit: usize) -> Vec<TopFile> {
    let mut ranked: Vec<&FileRecord> = records.iter().filter(|r| r.tokens > 0).collect();
    ranked.sort_by(|a, b| b.tokens.cmp(&a.tokens).then_with(|| a.path.cmp(&b.path)));
    ranked
        .into_iter()
        .take(limit)
        .map(|r| TopFile {
            path: r.path.clone(),
            tokens: r.tokens,
        })
        .collect()
}

fn resolve_cache_path(root: &Path, config: &ScanConfig) -> PathBuf {
    match &config.cache_path {
        Some(path) if path.is_absolute() => path.clone(),
        Some(path) => root.join(path),
        None => default_cache_path(root, config.cache_compress),
    }
}

fn source_label(source: FileSourceKind) -> &'static str {
    match source {
        FileSourceKind::Git => "git",
        FileSourceKind::Filesystem => "filesystem",
        FileSourceKind::ChangedList => "changed list",
    }
}

/// Scan `root` end to end: load the cache, scan, and persist the updated cache.
pub async fn scan_root(
    root: impl AsRef<Path>,
    config: ScanConfig,
    changed: Option<&ChangeSet>,
    previous: Option<&Snapshot>,
) -> Result<Snapshot> {
    let scanner = Scanner::new(root, config).await?;
    let cache = scanner.load_cache().await;
    let request = ScanRequest {
        changed,
        previous,
        ..ScanRequest::default()
    };
    let outcome = scanner.scan(request, cache).await?;
    scanner.save_cache(&outcome.cache).await?;
    Ok(outcome.snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(path: &str, tokens: u64) -> FileRecord {
        FileRecord {
            path: path.into(),
            size_bytes: 0,
            mtime_ms: 0,
            fingerprint: String::new(),
            tokens,
            module: ".".into(),
            flag: None,
            error: None,
        }
    }

    #[test]
    fn binary_sniff_looks_at_leading_bytes_only() {
        assert!(is_binary(b"abc\0def"));
        assert!(!is_binary(b"plain text"));
        let mut late = vec![b'a'; BINARY_SNIFF_BYTES];
        late.push(0);
        assert!(!is_binary(&late));
    }

    #[test]
    fn top_files_rank_by_tokens_then_path() {
        let records = vec![
            record("b.rs", 10),
            record("a.rs", 10),
            record("c.rs", 30),
            record("empty.rs", 0),
        ];
        let top: Vec<String> = top_files(&records, 3).into_iter().map(|t| t.path).collect();
        assert_eq!(top, vec!["c.rs", "a.rs", "b.rs"]);
        assert!(top_files(&records, 0).is_empty());
    }
}
