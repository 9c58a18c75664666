use globset::{Glob, GlobSet, GlobSetBuilder};
use mapper_protocol::{ChurnEntry, Entrypoint, FileRecord};
use std::collections::{BTreeMap, BTreeSet};

/// File name patterns that usually mark where a program starts. Each one also matches at any
/// depth.
pub const ENTRYPOINT_PATTERNS: &[&str] = &[
    "main.*",
    "index.*",
    "app.*",
    "server.*",
    "cli.*",
    "cmd/*/main.go",
    "cmd/*/main.rs",
    "cmd/*/main.py",
    "bin/*",
    "src/main.*",
    "src/index.*",
    "src/app.*",
    "src/server.*",
];

fn entrypoint_globs() -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in ENTRYPOINT_PATTERNS {
        builder.add(Glob::new(pattern)?);
        builder.add(Glob::new(&format!("**/{pattern}"))?);
    }
    builder.build()
}

/// Records matching [`ENTRYPOINT_PATTERNS`], largest first, ties broken by path. A `limit` of 0
/// keeps every match.
pub fn detect_entrypoints(records: &[FileRecord], limit: usize) -> Vec<Entrypoint> {
    let globs = match entrypoint_globs() {
        Ok(globs) => globs,
        Err(err) => {
            log::warn!("Entry point patterns failed to compile: {err}");
            return Vec::new();
        }
    };

    let mut found: Vec<Entrypoint> = records
        .iter()
        .filter_map(|record| {
            // Two globs per pattern; the lowest index is the first pattern in list order.
            let first = globs.matches(&record.path).into_iter().min()?;
            Some(Entrypoint {
                path: record.path.clone(),
                tokens: record.tokens,
                reason: format!("pattern:{}", ENTRYPOINT_PATTERNS[first / 2]),
            })
        })
        .collect();
    found.sort_by(|a, b| b.tokens.cmp(&a.tokens).then_with(|| a.path.cmp(&b.path)));
    if limit > 0 {
        found.truncate(limit);
    }
    found
}

/// Distinct parent directories of `records`, sorted. Root-level files contribute nothing.
pub fn parent_directories(records: &[FileRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|record| record.path.rsplit_once('/').map(|(dir, _)| dir.to_string()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Commit counts restricted to scanned files, most active first, ties broken by path.
pub(crate) fn rank_churn(
    counts: BTreeMap<String, usize>,
    records: &[FileRecord],
) -> Vec<ChurnEntry> {
    let scanned: BTreeSet<&str> = records.iter().map(|r| r.path.as_str()).collect();
    let mut ranked: Vec<ChurnEntry> = counts
        .into_iter()
        .filter(|(path, _)| scanned.contains(path.as_str()))
        .map(|(path, commits)| ChurnEntry { path, commits })
        .collect();
    ranked.sort_by(|a, b| b.commits.cmp(&a.commits).then_with(|| a.path.cmp(&b.path)));
    ranked
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
    fn entrypoints_match_at_any_depth_and_rank_by_tokens() {
        let records = vec![
            record("README.md", 50),
            record("cmd/tool/main.go", 30),
            record("crates/cli/src/main.rs", 40),
            record("scripts/bin/run", 5),
            record("src/lib.rs", 90),
            record("web/index.ts", 30),
        ];
        let found = detect_entrypoints(&records, 0);
        let summary: Vec<(&str, &str)> = found
            .iter()
            .map(|e| (e.path.as_str(), e.reason.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("crates/cli/src/main.rs", "pattern:main.*"),
                ("cmd/tool/main.go", "pattern:main.*"),
                ("web/index.ts", "pattern:index.*"),
                ("scripts/bin/run", "pattern:bin/*"),
            ]
        );

        let limited = detect_entrypoints(&records, 2);
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].tokens, 40);
    }

    #[test]
    fn directories_are_distinct_immediate_parents() {
        let records = vec![
            record("Cargo.toml", 1),
            record("src/lib.rs", 1),
            record("src/scan/mod.rs", 1),
            record("src/scan/walk.rs", 1),
        ];
        assert_eq!(parent_directories(&records), vec!["src", "src/scan"]);
    }

    #[test]
    fn churn_keeps_scanned_files_only() {
        let counts = BTreeMap::from([
            ("a.rs".to_string(), 2),
            ("b.rs".to_string(), 5),
            ("deleted.rs".to_string(), 9),
            ("c.rs".to_string(), 2),
        ]);
        let records = vec![record("a.rs", 1), record("b.rs", 1), record("c.rs", 1)];
        let ranked: Vec<(String, usize)> = rank_churn(counts, &records)
            .into_iter()
            .map(|entry| (entry.path, entry.commits))
            .collect();
        assert_eq!(
            ranked,
            vec![
                ("b.rs".to_string(), 5),
                ("a.rs".to_string(), 2),
                ("c.rs".to_string(), 2),
            ]
        );
    }
}
