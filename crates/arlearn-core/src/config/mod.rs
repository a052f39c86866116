//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// ARLearn configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            temperature: 0.2,
            max_tokens: 512,
            timeout_secs: 60,
        }
    }
}

/// What the pipeline does when the dense branch cannot be reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DenseFailurePolicy {
    /// Propagate the failure to the caller
    #[default]
    Strict,
    /// Continue with graph-only context
    Degraded,
}

impl fmt::Display for DenseFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenseFailurePolicy::Strict => write!(f, "strict"),
            DenseFailurePolicy::Degraded => write!(f, "degraded"),
        }
    }
}

impl FromStr for DenseFailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "degraded" => Ok(Self::Degraded),
            other => Err(anyhow!(
                "Invalid dense failure policy: {}. Valid options: strict, degraded",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Passages requested from the vector store
    pub top_k: usize,
    /// Fused entries kept before context assembly
    pub max_chunks: usize,
    /// RRF smoothing constant
    pub rrf_k: u32,
    pub embedding_dimensions: usize,
    pub dense_timeout_ms: u64,
    pub graph_timeout_ms: u64,
    pub dense_failure_policy: DenseFailurePolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 6,
            max_chunks: 8,
            rrf_k: 60,
            embedding_dimensions: 1536,
            dense_timeout_ms: 10_000,
            graph_timeout_ms: 5_000,
            dense_failure_policy: DenseFailurePolicy::Strict,
        }
    }
}

impl RetrievalConfig {
    pub fn dense_timeout(&self) -> Duration {
        Duration::from_millis(self.dense_timeout_ms)
    }

    pub fn graph_timeout(&self) -> Duration {
        Duration::from_millis(self.graph_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path; defaults to the platform data directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(crate::storage::database::default_database_path)
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("ARLEARN_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .ok())
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| {
            opt.map(|key| {
                if key.len() <= 4 {
                    "***".to_string()
                } else {
                    let suffix = &key[key.len() - 4..];
                    format!("***{}", suffix)
                }
            })
        })
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "LLM API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

const KEYS: [&str; 16] = [
    "llm.base_url",
    "llm.chat_model",
    "llm.embedding_model",
    "llm.temperature",
    "llm.max_tokens",
    "llm.timeout_secs",
    "llm.api_key",
    "retrieval.top_k",
    "retrieval.max_chunks",
    "retrieval.rrf_k",
    "retrieval.embedding_dimensions",
    "retrieval.dense_timeout_ms",
    "retrieval.graph_timeout_ms",
    "retrieval.dense_failure_policy",
    "storage.database_path",
    "config.path",
];

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("ARLEARN_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("arlearn")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or fall back to defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;

        let r = &self.retrieval;
        if r.top_k == 0 {
            return Err(anyhow!("retrieval.top_k must be at least 1"));
        }
        if r.max_chunks == 0 {
            return Err(anyhow!("retrieval.max_chunks must be at least 1"));
        }
        if r.embedding_dimensions == 0 {
            return Err(anyhow!("retrieval.embedding_dimensions must be at least 1"));
        }
        // A zero deadline expires before either branch can answer
        if r.dense_timeout_ms == 0 {
            return Err(anyhow!("retrieval.dense_timeout_ms must be at least 1"));
        }
        if r.graph_timeout_ms == 0 {
            return Err(anyhow!("retrieval.graph_timeout_ms must be at least 1"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "llm.base_url" => Ok(self.llm.base_url.clone()),
            "llm.chat_model" => Ok(self.llm.chat_model.clone()),
            "llm.embedding_model" => Ok(self.llm.embedding_model.clone()),
            "llm.temperature" => Ok(self.llm.temperature.to_string()),
            "llm.max_tokens" => Ok(self.llm.max_tokens.to_string()),
            "llm.timeout_secs" => Ok(self.llm.timeout_secs.to_string()),

            "retrieval.top_k" => Ok(self.retrieval.top_k.to_string()),
            "retrieval.max_chunks" => Ok(self.retrieval.max_chunks.to_string()),
            "retrieval.rrf_k" => Ok(self.retrieval.rrf_k.to_string()),
            "retrieval.embedding_dimensions" => {
                Ok(self.retrieval.embedding_dimensions.to_string())
            }
            "retrieval.dense_timeout_ms" => Ok(self.retrieval.dense_timeout_ms.to_string()),
            "retrieval.graph_timeout_ms" => Ok(self.retrieval.graph_timeout_ms.to_string()),
            "retrieval.dense_failure_policy" => {
                Ok(self.retrieval.dense_failure_policy.to_string())
            }

            "storage.database_path" => Ok(self
                .storage
                .resolved_database_path()
                .display()
                .to_string()),

            "config.path" => Ok(Self::config_path()?.display().to_string()),

            // API key (special handling - show redacted)
            "llm.api_key" | "api_key" => match self.llm.redacted_api_key()? {
                Some(redacted) => Ok(redacted),
                None => Ok("(not set - use ARLEARN_API_KEY or OPENAI_API_KEY env var)".to_string()),
            },

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `arlearn config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "llm.base_url" => {
                self.llm.base_url = value.trim_end_matches('/').to_string();
            }
            "llm.chat_model" => {
                self.llm.chat_model = value.to_string();
            }
            "llm.embedding_model" => {
                self.llm.embedding_model = value.to_string();
            }
            "llm.temperature" => {
                let temp: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid temperature value: {}", value))?;
                if !(0.0..=2.0).contains(&temp) {
                    return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
                }
                self.llm.temperature = temp;
            }
            "llm.max_tokens" => {
                self.llm.max_tokens = value
                    .parse()
                    .with_context(|| format!("Invalid max_tokens value: {}", value))?;
            }
            "llm.timeout_secs" => {
                self.llm.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }

            "retrieval.top_k" => {
                self.retrieval.top_k = parse_positive(key, value)?;
            }
            "retrieval.max_chunks" => {
                self.retrieval.max_chunks = parse_positive(key, value)?;
            }
            "retrieval.rrf_k" => {
                self.retrieval.rrf_k = value
                    .parse()
                    .with_context(|| format!("Invalid rrf_k value: {}", value))?;
            }
            "retrieval.embedding_dimensions" => {
                self.retrieval.embedding_dimensions = parse_positive(key, value)?;
            }
            "retrieval.dense_timeout_ms" => {
                self.retrieval.dense_timeout_ms = parse_positive(key, value)? as u64;
            }
            "retrieval.graph_timeout_ms" => {
                self.retrieval.graph_timeout_ms = parse_positive(key, value)? as u64;
            }
            "retrieval.dense_failure_policy" => {
                self.retrieval.dense_failure_policy = value.parse()?;
            }

            "storage.database_path" => {
                self.storage.database_path = if value.trim().is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }

            // API key cannot be set via config
            "llm.api_key" | "api_key" => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration for security. \
                     Set the ARLEARN_API_KEY or OPENAI_API_KEY environment variable instead."
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `arlearn config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn parse_positive(key: &str, value: &str) -> anyhow::Result<usize> {
    let parsed: usize = value
        .parse()
        .with_context(|| format!("Invalid {} value: {}", key, value))?;
    if parsed == 0 {
        return Err(anyhow!("{} must be at least 1", key));
    }
    Ok(parsed)
}
