use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::changes::ChangedScope;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerMode {
    /// Subword tokenizer loaded from a `tokenizer.json`.
    Exact,
    /// `chars / 4` estimate.
    #[default]
    Heuristic,
}

impl TokenizerMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            TokenizerMode::Exact => "exact",
            TokenizerMode::Heuristic => "heuristic",
        }
    }
}

/// How a file's content fingerprint is derived.
///
/// - `Fast` hashes size and modification time without reading the file. A fingerprint is stable
///   only while both stay untouched; an edit that preserves size and mtime goes unnoticed.
/// - `Full` hashes the complete content. A fingerprint is stable exactly as long as the bytes are.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum HashMode {
    #[default]
    Fast,
    Full,
}

impl HashMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            HashMode::Fast => "fast",
            HashMode::Full => "full",
        }
    }
}

/// Why a record carries no (or no trustworthy) token count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileFlag {
    /// Metadata or content could not be read.
    Unreadable,
    /// Larger than the configured size ceiling; not tokenized.
    Oversized,
    /// Content looks binary; not tokenized.
    Binary,
    /// Tokenization exceeded the per-file timeout.
    TimedOut,
}

impl FileFlag {
    /// Flags that count as partial-data warnings for the scan.
    pub const fn is_warning(self) -> bool {
        !matches!(self, FileFlag::Binary)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct FileRecord {
    /// Root-relative path with `/` separators; the record's identity.
    pub path: String,
    pub size_bytes: u64,
    pub mtime_ms: u64,
    /// Hex SHA-256 fingerprint, derived according to the snapshot's hash mode.
    pub fingerprint: String,
    pub tokens: u64,
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<FileFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileRecord {
    pub fn is_warning(&self) -> bool {
        self.flag.is_some_and(FileFlag::is_warning)
    }
}

/// The configuration fields that decide whether two snapshots are comparable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct SnapshotConfig {
    pub tokenizer: TokenizerMode,
    /// Identifies the concrete tokenizer (e.g. the heuristic ratio or the vocabulary hash).
    pub tokenizer_id: String,
    pub hash_mode: HashMode,
    pub module_depth: usize,
    pub max_file_size: u64,
}

impl SnapshotConfig {
    /// Snapshots are comparable only when built with the same tokenizer, hash mode and module
    /// depth. The size ceiling only changes which files get flagged.
    pub fn comparable_with(&self, other: &SnapshotConfig) -> bool {
        self.tokenizer_id == other.tokenizer_id
            && self.hash_mode == other.hash_mode
            && self.module_depth == other.module_depth
    }

    /// Stable identity string mixed into the root fingerprint.
    pub fn identity(&self) -> String {
        format!(
            "tokenizer={};hash={};depth={}",
            self.tokenizer_id,
            self.hash_mode.as_str(),
            self.module_depth
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct ModuleSummary {
    pub files: usize,
    pub tokens: u64,
    /// Hex SHA-256 over the module's `(path, fingerprint)` pairs in path order.
    pub fingerprint: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Unchanged,
    Added,
    Removed,
    Modified,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
pub struct ScanDiff {
    /// Root fingerprint of the snapshot this diff was computed against.
    pub previous_root_fingerprint: String,
    pub modules: BTreeMap<String, ModuleStatus>,
    #[serde(default)]
    pub files_added: Vec<String>,
    #[serde(default)]
    pub files_removed: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
}

impl ScanDiff {
    pub fn modules_with(&self, status: ModuleStatus) -> Vec<&str> {
        self.modules
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(module, _)| module.as_str())
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        self.modules
            .values()
            .any(|status| *status != ModuleStatus::Unchanged)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
pub struct CacheStats {
    pub enabled: bool,
    pub hits: usize,
    pub misses: usize,
    /// Files whose content was actually handed to the tokenizer.
    pub tokenized: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct GitInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dirty: Option<bool>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileSourceKind {
    Git,
    Filesystem,
    ChangedList,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct TopFile {
    pub path: String,
    pub tokens: u64,
}

/// A file whose name looks like a program entry point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct Entrypoint {
    pub path: String,
    pub tokens: u64,
    /// `pattern:<glob>` naming the pattern that matched.
    pub reason: String,
}

/// How many recent commits touched a file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct ChurnEntry {
    pub path: String,
    pub commits: usize,
}

/// Result of one scan. The JSON form of this type is the contract consumed by planning and
/// report generation; field names must stay stable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct Snapshot {
    pub schema_version: u32,
    pub root: String,
    pub created_at_unix_ms: u64,
    /// `false` when the scan was restricted to a changed-file list.
    pub complete: bool,
    pub config: SnapshotConfig,
    pub source: FileSourceKind,
    /// Records sorted by path.
    pub files: Vec<FileRecord>,
    pub total_files: usize,
    pub total_tokens: u64,
    pub modules: BTreeMap<String, ModuleSummary>,
    pub root_fingerprint: String,
    /// Sorted parent directories of the scanned files, root excluded.
    #[serde(default)]
    pub directories: Vec<String>,
    /// Number of records flagged unreadable, oversized or timed out.
    pub warnings: usize,
    pub cache: CacheStats,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top_files: Vec<TopFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoints: Vec<Entrypoint>,
    /// Most frequently committed files, most active first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub churn: Vec<ChurnEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitInfo>,
    /// Paths the scan was restricted to, for incomplete snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_paths: Option<Vec<String>>,
    /// How `changed_paths` widened into the scanned set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_scope: Option<ChangedScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<ScanDiff>,
    pub elapsed_ms: u64,
}

impl Snapshot {
    pub fn file(&self, path: &str) -> Option<&FileRecord> {
        self.files
            .binary_search_by(|record| record.path.as_str().cmp(path))
            .ok()
            .map(|idx| &self.files[idx])
    }

    pub fn flagged(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.iter().filter(|record| record.flag.is_some())
    }

    pub fn module_tokens(&self, module: &str) -> u64 {
        self.modules.get(module).map_or(0, |summary| summary.tokens)
    }
}
