use mapper_protocol::{FileRecord, ModuleStatus, ModuleSummary, ScanDiff};
use std::collections::{BTreeMap, BTreeSet};

use crate::fingerprint::module_fingerprint;

/// Per-module totals and fingerprints. `records` must be sorted by path.
pub fn summarize_modules(records: &[FileRecord]) -> BTreeMap<String, ModuleSummary> {
    let mut grouped: BTreeMap<&str, Vec<&FileRecord>> = BTreeMap::new();
    for record in records {
        grouped.entry(record.module.as_str()).or_default().push(record);
    }

    grouped
        .into_iter()
        .map(|(module, members)| {
            let summary = ModuleSummary {
                files: members.len(),
                tokens: members.iter().map(|r| r.tokens).sum(),
                fingerprint: module_fingerprint(members.iter().copied()),
            };
            (module.to_string(), summary)
        })
        .collect()
}

/// Records of the tree the current scan stands for.
///
/// A full scan stands for itself. An incremental scan stands for the previous tree with every
/// changed path replaced by whatever the scan found for it (nothing, for deleted paths).
pub fn effective_records(
    previous: &[FileRecord],
    current: &[FileRecord],
    changed: Option<&BTreeSet<String>>,
) -> Vec<FileRecord> {
    let Some(changed) = changed else {
        return current.to_vec();
    };

    let mut merged: BTreeMap<&str, &FileRecord> = previous
        .iter()
        .filter(|record| !changed.contains(&record.path))
        .map(|record| (record.path.as_str(), record))
        .collect();
    for record in current {
        merged.insert(record.path.as_str(), record);
    }
    merged.into_values().cloned().collect()
}

/// Classify every module and file present on either side.
pub fn compute_diff(
    previous_root_fingerprint: &str,
    previous: &[FileRecord],
    previous_modules: &BTreeMap<String, ModuleSummary>,
    current: &[FileRecord],
    current_modules: &BTreeMap<String, ModuleSummary>,
) -> ScanDiff {
    let module_ids: BTreeSet<&String> = previous_modules
        .keys()
        .chain(current_modules.keys())
        .collect();
    let modules = module_ids
        .into_iter()
        .map(|module| {
            let status = match (previous_modules.get(module), current_modules.get(module)) {
                (None, _) => ModuleStatus::Added,
                (_, None) => ModuleStatus::Removed,
                (Some(before), Some(after)) if before.fingerprint == after.fingerprint => {
                    ModuleStatus::Unchanged
                }
                _ => ModuleStatus::Modified,
            };
            (module.clone(), status)
        })
        .collect();

    let before: BTreeMap<&str, &str> = previous
        .iter()
        .map(|r| (r.path.as_str(), r.fingerprint.as_str()))
        .collect();
    let after: BTreeMap<&str, &str> = current
        .iter()
        .map(|r| (r.path.as_str(), r.fingerprint.as_str()))
        .collect();

    let mut diff = ScanDiff {
        previous_root_fingerprint: previous_root_fingerprint.to_string(),
        modules,
        ..ScanDiff::default()
    };
    for (path, fingerprint) in &after {
        match before.get(path) {
            None => diff.files_added.push((*path).to_string()),
            Some(old) if old != fingerprint => diff.files_modified.push((*path).to_string()),
            Some(_) => {}
        }
    }
    diff.files_removed = before
        .keys()
        .filter(|path| !after.contains_key(*path))
        .map(|path| (*path).to_string())
        .collect();
    diff
}
