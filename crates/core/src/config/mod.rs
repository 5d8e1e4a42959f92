use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

pub const API_KEY_ENV: &str = "GALLEY_API_KEY";
pub const BASE_URL_ENV: &str = "GALLEY_BASE_URL";
pub const MODEL_ENV: &str = "GALLEY_MODEL";

fn default_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout() -> u64 {
    600
}

fn default_max_attempts() -> u32 {
    3
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("missing LLM API key (set {API_KEY_ENV} or the config file's llm.api_key)")]
    MissingApiKey,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LlmSettings {
    #[serde(default)]
    pub api_key: String,
    /// Optional gateway in front of the model endpoint. Empty means the
    /// provider's public URL.
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout: default_timeout(),
        }
    }
}

/// USD per million tokens, input and output sides.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ModelRates {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl ModelRates {
    pub const fn new(input_per_mtok: f64, output_per_mtok: f64) -> Self {
        Self {
            input_per_mtok,
            output_per_mtok,
        }
    }

    pub fn cost_usd(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_per_mtok
            + (output_tokens as f64 / 1_000_000.0) * self.output_per_mtok
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PricingTable {
    #[serde(default)]
    models: BTreeMap<String, ModelRates>,
    /// Applied when a model has no explicit entry.
    #[serde(default = "PricingTable::default_fallback")]
    fallback: ModelRates,
}

impl PricingTable {
    fn default_fallback() -> ModelRates {
        ModelRates::new(3.0, 15.0)
    }

    pub fn rates_for(&self, model: &str) -> ModelRates {
        self.models.get(model).copied().unwrap_or(self.fallback)
    }

    pub fn insert(&mut self, model: impl Into<String>, rates: ModelRates) {
        self.models.insert(model.into(), rates);
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        let mut models = BTreeMap::new();
        models.insert(
            "claude-3-5-sonnet-20241022".to_string(),
            ModelRates::new(3.0, 15.0),
        );
        models.insert(
            "claude-3-5-haiku-20241022".to_string(),
            ModelRates::new(0.8, 4.0),
        );
        models.insert(
            "claude-3-opus-20240229".to_string(),
            ModelRates::new(15.0, 75.0),
        );
        Self {
            models,
            fallback: Self::default_fallback(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QueueSettings {
    /// Platform-level redelivery bound for both job queues.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PromptConfig {
    /// Directories of TOML prompt files that override the built-ins.
    #[serde(default)]
    pub custom_directories: Vec<PathBuf>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub pricing: PricingTable,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub prompts: PromptConfig,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(input)?)
    }

    /// Environment values win over whatever the file said.
    pub fn apply_env(&mut self) {
        if let Ok(key) = env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.llm.api_key = key;
            }
        }
        if let Ok(url) = env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.llm.base_url = url;
            }
        }
        if let Ok(model) = env::var(MODEL_ENV) {
            if !model.trim().is_empty() {
                self.llm.model = model;
            }
        }
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        let key = self.llm.api_key.trim();
        if key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(key)
    }
}

#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: Config,
}

impl ConfigStore {
    pub fn open(path: PathBuf) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            Config::from_json_str(&contents)?
        } else {
            Config::default()
        };
        Ok(Self { path, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(&self.config)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}
