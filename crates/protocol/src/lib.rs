//! Shared data model for scanning and planning.
//!
//! The [`Snapshot`] and [`BucketPlan`] documents defined here are the integration contract
//! between the scanner, the planner and whatever consumes their JSON output.

pub mod changes;
pub mod path_filters;
pub mod paths;
pub mod plan;
pub mod snapshot;

pub use changes::{ChangeSet, ChangedScope};
pub use path_filters::{git_pathspecs, PathFilter, DEFAULT_IGNORE_PATTERNS};
pub use paths::{escapes_root, module_id, normalize_rel_path, ROOT_MODULE};
pub use plan::{Bucket, BucketPlan, PlanStats, PlannedFile};
pub use snapshot::{
    CacheStats, ChurnEntry, Entrypoint, FileFlag, FileRecord, FileSourceKind, GitInfo, HashMode,
    ModuleStatus, ModuleSummary, ScanDiff, Snapshot, SnapshotConfig, TokenizerMode, TopFile,
    SNAPSHOT_SCHEMA_VERSION,
};

/// JSON Schema of the [`Snapshot`] document.
pub fn snapshot_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(Snapshot)).unwrap_or(serde_json::Value::Null)
}

/// JSON Schema of the [`BucketPlan`] document.
pub fn plan_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(BucketPlan)).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemas_describe_contract_fields() {
        let schema = snapshot_schema();
        let props = &schema["properties"];
        for field in ["files", "modules", "root_fingerprint", "total_tokens", "complete"] {
            assert!(props.get(field).is_some(), "missing {field}");
        }
        assert!(plan_schema()["properties"].get("buckets").is_some());
    }
}
