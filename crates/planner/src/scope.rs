use mapper_protocol::{ChangeSet, ChangedScope, FileRecord, Snapshot};

use crate::error::{PlanError, Result};

/// Records the plan must cover.
///
/// Without a change set every record is in scope. `Files` keeps literally changed paths;
/// `Modules` keeps every record whose module contains at least one changed path, including
/// changed paths that no longer exist in the snapshot.
pub fn select<'a>(
    snapshot: &'a Snapshot,
    changes: Option<&ChangeSet>,
    scope: ChangedScope,
) -> Result<Vec<&'a FileRecord>> {
    let Some(changes) = changes else {
        return Ok(snapshot.files.iter().collect());
    };

    let selected: Vec<&FileRecord> = match scope {
        ChangedScope::Files => snapshot
            .files
            .iter()
            .filter(|record| changes.contains(&record.path))
            .collect(),
        ChangedScope::Modules => {
            let modules = changes.modules(snapshot.config.module_depth);
            snapshot
                .files
                .iter()
                .filter(|record| modules.contains(&record.module))
                .collect()
        }
    };

    if selected.is_empty() {
        return Err(PlanError::NoMatchingFiles {
            scope: scope.as_str(),
            changed: changes.len(),
        });
    }
    log::debug!(
        "{} of {} records in {} scope",
        selected.len(),
        snapshot.files.len(),
        scope.as_str()
    );
    Ok(selected)
}
