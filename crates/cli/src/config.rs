use anyhow::Result;
use mapper_planner::DEFAULT_MAX_TOKENS_PER_BUCKET;
use mapper_protocol::ChangedScope;
use mapper_scanner::{workers_from_env, ScanConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const TOML_CONFIG_FILE: &str = ".mapper.toml";
pub const JSON_CONFIG_FILE: &str = ".mapper.json";
pub const TOKENIZER_PATH_ENV: &str = "MAPPER_TOKENIZER_PATH";

/// Invalid or unreadable user input detected before any work starts.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct ConfigError(pub String);

/// Everything a config file may set: scanner options plus planning defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MapperConfig {
    #[serde(flatten)]
    pub scan: ScanConfig,
    pub max_tokens_per_bucket: u64,
    pub changed_scope: ChangedScope,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            max_tokens_per_bucket: DEFAULT_MAX_TOKENS_PER_BUCKET,
            changed_scope: ChangedScope::Modules,
        }
    }
}

/// Where configuration comes from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    pub explicit: Option<PathBuf>,
    pub disabled: bool,
}

impl MapperConfig {
    /// Load `--config`, or the first of `.mapper.toml` / `.mapper.json` found at `root`, then
    /// fill unset values from the environment.
    pub fn load(root: &Path, source: &ConfigSource) -> Result<Self> {
        let mut config = match Self::locate(root, source)? {
            Some(path) => {
                log::debug!("Using config {}", path.display());
                Self::parse_file(&path)?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn locate(root: &Path, source: &ConfigSource) -> Result<Option<PathBuf>> {
        if let Some(explicit) = &source.explicit {
            if !explicit.is_file() {
                return Err(ConfigError(format!(
                    "config file {} does not exist",
                    explicit.display()
                ))
                .into());
            }
            return Ok(Some(explicit.clone()));
        }
        if source.disabled {
            return Ok(None);
        }
        Ok([TOML_CONFIG_FILE, JSON_CONFIG_FILE]
            .iter()
            .map(|name| root.join(name))
            .find(|path| path.is_file()))
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            ConfigError(format!("cannot read config {}: {err}", path.display()))
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let parsed: std::result::Result<Self, String> = if is_json {
            serde_json::from_str(&text).map_err(|err| err.to_string())
        } else {
            toml::from_str(&text).map_err(|err| err.to_string())
        };
        parsed.map_err(|err| {
            ConfigError(format!("invalid config {}: {err}", path.display())).into()
        })
    }

    fn apply_env(&mut self) {
        if self.scan.tokenizer_path.is_none() {
            if let Some(path) = std::env::var_os(TOKENIZER_PATH_ENV).filter(|v| !v.is_empty()) {
                self.scan.tokenizer_path = Some(PathBuf::from(path));
            }
        }
        if self.scan.workers == 0 {
            self.scan.workers = workers_from_env(0);
        }
    }
}
