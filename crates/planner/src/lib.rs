//! # Mapper Planner
//!
//! Packs the records of a [`Snapshot`] into token-bounded buckets, one per downstream worker.
//!
//! ```text
//! Snapshot ──> scope (all │ changed files │ changed modules) ──> greedy packing ──> BucketPlan
//! ```

mod error;
mod pack;
mod scope;

pub use error::{PlanError, Result};
pub use pack::pack;
pub use scope::select;

use mapper_protocol::{BucketPlan, ChangeSet, ChangedScope, PlanStats, Snapshot};

pub const DEFAULT_MAX_TOKENS_PER_BUCKET: u64 = 150_000;

/// Plan `snapshot` into buckets of at most `max_tokens` tokens.
///
/// Every in-scope record lands in exactly one bucket. A single record above the budget is placed
/// alone in a bucket flagged `oversized`. The output is a pure function of the inputs.
pub fn plan(
    snapshot: &Snapshot,
    max_tokens: u64,
    changes: Option<&ChangeSet>,
    scope: ChangedScope,
) -> Result<BucketPlan> {
    if max_tokens == 0 {
        return Err(PlanError::InvalidBudget(max_tokens));
    }
    if !snapshot.complete {
        log::warn!("Planning from an incomplete snapshot; only its scanned files are covered");
    }

    let records = select(snapshot, changes, scope)?;
    let buckets = pack(&records, max_tokens);

    let stats = PlanStats {
        buckets: buckets.len(),
        files: buckets.iter().map(|b| b.files.len()).sum(),
        total_tokens: buckets.iter().map(|b| b.tokens).sum(),
        oversized_buckets: buckets.iter().filter(|b| b.oversized).count(),
    };
    log::info!(
        "Planned {} files into {} buckets ({} tokens, {} oversized)",
        stats.files,
        stats.buckets,
        stats.total_tokens,
        stats.oversized_buckets
    );

    Ok(BucketPlan {
        max_tokens_per_bucket: max_tokens,
        changed_scope: changes.map(|_| scope),
        changed_count: changes.map_or(0, ChangeSet::len),
        snapshot_root_fingerprint: snapshot.root_fingerprint.clone(),
        buckets,
        stats,
    })
}
