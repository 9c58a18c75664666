use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use mapper_protocol::{FileFlag, HashMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const CACHE_VERSION: u32 = 1;
pub const CACHE_DIR: &str = ".mapper";
const CACHE_FILE: &str = "scan-cache.json";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Default cache location under the scanned root.
pub fn default_cache_path(root: &Path, compress: bool) -> PathBuf {
    let name = if compress {
        format!("{CACHE_FILE}.gz")
    } else {
        CACHE_FILE.to_string()
    };
    root.join(CACHE_DIR).join(name)
}

/// Settings a cached token count depends on. Entries written under a different identity are
/// never reused.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheIdentity {
    pub tokenizer_id: String,
    pub hash_mode: HashMode,
    pub max_file_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub tokens: u64,
    pub size_bytes: u64,
    pub mtime_ms: u64,
    /// Only [`FileFlag::Binary`] is ever cached; warning flags are retried on the next scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<FileFlag>,
}

/// Path → last known (fingerprint, token count). Loaded before a scan, handed to the scanner by
/// value and returned updated; the caller saves it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanCache {
    pub version: u32,
    pub identity: CacheIdentity,
    pub entries: BTreeMap<String, CacheEntry>,
}

impl ScanCache {
    pub fn empty(identity: CacheIdentity) -> Self {
        Self {
            version: CACHE_VERSION,
            identity,
            entries: BTreeMap::new(),
        }
    }

    /// Load the cache at `path`. Missing, corrupt or foreign caches load as empty; this never
    /// fails.
    pub async fn load(path: &Path, identity: &CacheIdentity) -> Self {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No scan cache at {}", path.display());
                return Self::empty(identity.clone());
            }
            Err(err) => {
                log::warn!("Scan cache unreadable {}: {err}", path.display());
                return Self::empty(identity.clone());
            }
        };

        let cache = match decode(&bytes) {
            Ok(cache) => cache,
            Err(err) => {
                log::warn!("Scan cache corrupted {}: {err}", path.display());
                return Self::empty(identity.clone());
            }
        };

        if cache.version != CACHE_VERSION || &cache.identity != identity {
            log::info!(
                "Scan cache {} was built with different settings; starting empty",
                path.display()
            );
            return Self::empty(identity.clone());
        }

        log::debug!(
            "Loaded scan cache {} ({} entries)",
            path.display(),
            cache.entries.len()
        );
        cache
    }

    /// Write atomically (tmp file + rename). `compress` writes gzip; loading detects either form.
    pub async fn save(&self, path: &Path, compress: bool) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec(self)?;
        let bytes = if compress {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&json)?;
            encoder.finish()?
        } else {
            json
        };

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        log::debug!(
            "Saved scan cache {} ({} entries)",
            path.display(),
            self.entries.len()
        );
        Ok(())
    }

    /// Entry for `path` if it was recorded with the same fingerprint.
    pub fn lookup(&self, path: &str, fingerprint: &str) -> Option<&CacheEntry> {
        self.entries
            .get(path)
            .filter(|entry| entry.fingerprint == fingerprint)
    }

    pub fn update(&mut self, path: impl Into<String>, entry: CacheEntry) {
        self.entries.insert(path.into(), entry);
    }

    pub fn remove(&mut self, path: &str) -> Option<CacheEntry> {
        self.entries.remove(path)
    }

    /// Drop every entry whose path fails `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|path, _| keep(path));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn decode(bytes: &[u8]) -> std::result::Result<ScanCache, String> {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut json = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut json)
            .map_err(|err| format!("gzip: {err}"))?;
        serde_json::from_slice(&json).map_err(|err| err.to_string())
    } else {
        serde_json::from_slice(bytes).map_err(|err| err.to_string())
    }
}
