use mapper_protocol::TokenizerMode;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;

use crate::config::ScanConfig;
use crate::error::{Result, ScanError, TokenizeError};

/// Converts text into a token count.
///
/// Implementations are shared across tokenization workers and must not carry per-call state.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> std::result::Result<u64, TokenizeError>;

    /// Identifies the concrete counting scheme; counts are comparable only between equal ids.
    fn id(&self) -> &str;

    fn mode(&self) -> TokenizerMode;
}

/// Cheap estimate: roughly four characters per token.
#[derive(Debug, Default, Clone)]
pub struct HeuristicTokenizer;

impl HeuristicTokenizer {
    pub const ID: &'static str = "heuristic:chars/4";
}

impl TokenCounter for HeuristicTokenizer {
    fn count(&self, text: &str) -> std::result::Result<u64, TokenizeError> {
        let chars = text.chars().count() as u64;
        if chars == 0 {
            return Ok(0);
        }
        Ok((chars / 4).max(1))
    }

    fn id(&self) -> &str {
        Self::ID
    }

    fn mode(&self) -> TokenizerMode {
        TokenizerMode::Heuristic
    }
}

/// Subword tokenizer backed by a HuggingFace `tokenizer.json`.
pub struct ExactTokenizer {
    inner: tokenizers::Tokenizer,
    id: String,
}

impl ExactTokenizer {
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|err| {
            ScanError::TokenizerUnavailable(format!("read {}: {err}", path.display()))
        })?;

        // Tokenization already runs on our own worker pool.
        if !tokenizers::utils::parallelism::is_parallelism_configured() {
            tokenizers::utils::parallelism::set_parallelism(false);
        }

        let inner = tokenizers::Tokenizer::from_bytes(&bytes).map_err(|err| {
            ScanError::TokenizerUnavailable(format!("load {}: {err}", path.display()))
        })?;

        let digest = format!("{:x}", Sha256::digest(&bytes));
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "tokenizer".to_string());
        let id = format!("exact:{name}:{}", &digest[..16]);

        Ok(Self { inner, id })
    }
}

impl TokenCounter for ExactTokenizer {
    fn count(&self, text: &str) -> std::result::Result<u64, TokenizeError> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|err| TokenizeError(format!("encode failed: {err}")))?;
        Ok(encoding.len() as u64)
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn mode(&self) -> TokenizerMode {
        TokenizerMode::Exact
    }
}

/// Build the configured tokenizer once at startup.
///
/// A missing or unloadable exact backend is a configuration error; there is no silent
/// fallback to the heuristic.
pub fn build_tokenizer(config: &ScanConfig) -> Result<Arc<dyn TokenCounter>> {
    match config.tokenizer {
        TokenizerMode::Heuristic => Ok(Arc::new(HeuristicTokenizer)),
        TokenizerMode::Exact => {
            let path = config.tokenizer_path.as_deref().ok_or_else(|| {
                ScanError::TokenizerUnavailable("no tokenizer_path configured".into())
            })?;
            let tokenizer = ExactTokenizer::from_file(path)?;
            log::info!("Loaded tokenizer {}", tokenizer.id());
            Ok(Arc::new(tokenizer))
        }
    }
}
