use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::changes::ChangedScope;
use crate::snapshot::FileFlag;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct PlannedFile {
    pub path: String,
    pub tokens: u64,
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<FileFlag>,
}

/// A token-bounded group of files handed to one downstream worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct Bucket {
    /// 1-based position in the plan.
    pub id: usize,
    pub tokens: u64,
    /// Set when the bucket holds a single file whose own count exceeds the budget.
    pub oversized: bool,
    /// Distinct modules in first-seen order.
    pub modules: Vec<String>,
    pub files: Vec<PlannedFile>,
}

impl Bucket {
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|file| file.path.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
pub struct PlanStats {
    pub buckets: usize,
    pub files: usize,
    pub total_tokens: u64,
    pub oversized_buckets: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct BucketPlan {
    pub max_tokens_per_bucket: u64,
    /// Present when the plan was restricted to a change set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_scope: Option<ChangedScope>,
    pub changed_count: usize,
    pub snapshot_root_fingerprint: String,
    pub buckets: Vec<Bucket>,
    pub stats: PlanStats,
}

impl BucketPlan {
    /// Human-readable listing: one header per bucket followed by its files.
    pub fn to_text(&self) -> String {
        let mut lines = Vec::new();
        for bucket in &self.buckets {
            let marker = if bucket.oversized { " [oversized]" } else { "" };
            lines.push(format!(
                "Bucket {} ({} tokens){marker}",
                bucket.id, bucket.tokens
            ));
            for file in &bucket.files {
                lines.push(format!("  - {} ({} tokens)", file.path, file.tokens));
            }
            lines.push(String::new());
        }
        lines.push(format!(
            "Total: {} buckets, {} files, {} tokens, {} oversized",
            self.stats.buckets,
            self.stats.files,
            self.stats.total_tokens,
            self.stats.oversized_buckets
        ));
        lines.join("\n")
    }
}
