use mapper_protocol::{FileRecord, SnapshotConfig};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Metadata-only fingerprint: size plus modification time (nanoseconds).
pub fn fast_fingerprint(size_bytes: u64, mtime_ns: u128) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"fast");
    hasher.update(size_bytes.to_be_bytes());
    hasher.update(mtime_ns.to_be_bytes());
    format!("{:x}", hasher.finalize())
}

/// Content fingerprint over the complete file bytes.
pub fn content_fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Fingerprint of a set of records belonging to one module. `records` must be path-sorted.
pub fn module_fingerprint<'a>(records: impl IntoIterator<Item = &'a FileRecord>) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.path.as_bytes());
        hasher.update([0u8]);
        hasher.update(record.fingerprint.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Fingerprint summarizing a whole snapshot. Mixing in the configuration identity keeps
/// snapshots built under different tokenizers, hash modes or module depths from ever comparing
/// equal.
pub fn root_fingerprint(config: &SnapshotConfig, records: &[FileRecord]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(config.identity().as_bytes());
    hasher.update([0u8]);
    for record in records {
        hasher.update(record.path.as_bytes());
        hasher.update([0u8]);
        hasher.update(record.fingerprint.as_bytes());
        hasher.update(record.tokens.to_be_bytes());
    }
    format!("{:x}", hasher.finalize())
}

pub(crate) fn mtime_parts(modified: Option<SystemTime>) -> (u64, u128) {
    let Some(modified) = modified else {
        return (0, 0);
    };
    let since_epoch = modified.duration_since(UNIX_EPOCH).unwrap_or_default();
    let ms = u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX);
    (ms, since_epoch.as_nanos())
}

pub(crate) fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapper_protocol::{HashMode, TokenizerMode};
    use pretty_assertions::assert_eq;

    fn record(path: &str, fingerprint: &str, tokens: u64) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            size_bytes: 10,
            mtime_ms: 0,
            fingerprint: fingerprint.to_string(),
            tokens,
            module: ".".to_string(),
            flag: None,
            error: None,
        }
    }

    fn config(depth: usize) -> SnapshotConfig {
        SnapshotConfig {
            tokenizer: TokenizerMode::Heuristic,
            tokenizer_id: "heuristic:chars/4".into(),
            hash_mode: HashMode::Full,
            module_depth: depth,
            max_file_size: 100,
        }
    }

    #[test]
    fn fast_fingerprint_tracks_size_and_mtime() {
        let base = fast_fingerprint(10, 1_000);
        assert_eq!(base, fast_fingerprint(10, 1_000));
        assert_ne!(base, fast_fingerprint(11, 1_000));
        assert_ne!(base, fast_fingerprint(10, 1_001));
        assert_eq!(base.len(), 64);
    }

    #[test]
    fn content_fingerprint_tracks_bytes() {
        assert_eq!(content_fingerprint(b"abc"), content_fingerprint(b"abc"));
        assert_ne!(content_fingerprint(b"abc"), content_fingerprint(b"abd"));
    }

    #[test]
    fn module_fingerprint_detects_equal_size_swaps() {
        let before = [record("m/a", "f1", 5), record("m/b", "f2", 5)];
        let swapped = [record("m/a", "f2", 5), record("m/b", "f1", 5)];
        assert_ne!(module_fingerprint(&before), module_fingerprint(&swapped));
    }

    #[test]
    fn path_boundaries_are_unambiguous() {
        let a = [record("ab", "c", 1)];
        let b = [record("a", "bc", 1)];
        assert_ne!(module_fingerprint(&a), module_fingerprint(&b));
    }

    #[test]
    fn root_fingerprint_depends_on_config_identity() {
        let records = vec![record("a.rs", "f1", 3)];
        assert_eq!(
            root_fingerprint(&config(1), &records),
            root_fingerprint(&config(1), &records)
        );
        assert_ne!(
            root_fingerprint(&config(1), &records),
            root_fingerprint(&config(2), &records)
        );
        let changed = vec![record("a.rs", "f2", 3)];
        assert_ne!(
            root_fingerprint(&config(1), &records),
            root_fingerprint(&config(1), &changed)
        );
    }
}
