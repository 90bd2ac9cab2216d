//! Configuration models for wikirag.
//!
//! Every tunable lives here and is loaded from a TOML file. Missing sections
//! and fields fall back to the defaults the research scripts used.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for wikirag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Language-model completion endpoint
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Knowledge-base endpoint pool
    #[serde(default)]
    pub lookup: LookupConfig,

    /// Dataset, prompt and output settings
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// OpenAI-compatible completion endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// API key (can also be set via the `api_key_env` variable)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable name for the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL for the API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Maximum tokens in the generated answer
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,

    /// Maximum attempts per completion call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f64 {
    0.4
}

fn default_max_tokens() -> u32 {
    256
}

fn default_completion_timeout() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_completion_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// Knowledge-base lookup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    /// File listing one endpoint address per line
    #[serde(default = "default_addresses_file")]
    pub addresses_file: PathBuf,

    /// Upper bound on a single endpoint attempt, in seconds
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
}

fn default_addresses_file() -> PathBuf {
    PathBuf::from("./server_urls.txt")
}

fn default_attempt_timeout() -> u64 {
    30
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            addresses_file: default_addresses_file(),
            attempt_timeout_secs: default_attempt_timeout(),
        }
    }
}

/// What the driver does with a record whose lookup or completion failed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure and continue with the next record
    #[default]
    Skip,
    /// Stop the run and surface the error
    Abort,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            other => Err(format!("unknown failure policy '{other}' (expected skip or abort)")),
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Dataset name (selects the question field and default file)
    #[serde(default = "default_dataset")]
    pub dataset: String,

    /// Override for the dataset file location
    #[serde(default)]
    pub dataset_path: Option<PathBuf>,

    /// Few-shot prompt prefix
    #[serde(default = "default_few_shot_path")]
    pub few_shot_path: PathBuf,

    /// JSON-lines result log (opened in append mode)
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Policy once a record's retries are used up
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Extra whole-record attempts on a recoverable failure
    #[serde(default)]
    pub record_retries: u32,
}

fn default_dataset() -> String {
    "webqsp".to_string()
}

fn default_few_shot_path() -> PathBuf {
    PathBuf::from("./rag_prompt.txt")
}

fn default_output_path() -> PathBuf {
    PathBuf::from("./rag_results.jsonl")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset: default_dataset(),
            dataset_path: None,
            few_shot_path: default_few_shot_path(),
            output_path: default_output_path(),
            failure_policy: FailurePolicy::default(),
            record_retries: 0,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every request fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookup.attempt_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "lookup.attempt_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.completion.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "completion.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.completion.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "completion.max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn from_file_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the completion API key from config or environment.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = &self.completion.api_key {
            let key = expand_env_vars(key);
            if !key.is_empty() {
                return Ok(key);
            }
        }

        std::env::var(&self.completion.api_key_env).map_err(|_| ConfigError::MissingApiKey {
            env_var: self.completion.api_key_env.clone(),
        })
    }

    /// Per-attempt timeout for knowledge-base lookups.
    pub fn attempt_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.lookup.attempt_timeout_secs)
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");

    re.replace_all(s, |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing API key: set {env_var} env var or completion.api_key in config")]
    MissingApiKey { env_var: String },

    #[error("Failed to read endpoint list {path}: {source}")]
    AddressFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Endpoint pool is empty ({0})")]
    EmptyEndpointPool(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.completion.model, "gpt-3.5-turbo");
        assert_eq!(config.completion.max_tokens, 256);
        assert!((config.completion.temperature - 0.4).abs() < f64::EPSILON);
        assert_eq!(config.pipeline.dataset, "webqsp");
        assert_eq!(config.pipeline.failure_policy, FailurePolicy::Skip);
        assert_eq!(config.lookup.attempt_timeout_secs, 30);
    }

    #[test]
    fn test_parse_overrides() {
        let toml = r#"
[completion]
model = "gpt-4"
max_retries = 5

[lookup]
addresses_file = "servers.txt"
attempt_timeout_secs = 5

[pipeline]
dataset = "cwq"
failure_policy = "abort"
record_retries = 2
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.completion.model, "gpt-4");
        assert_eq!(config.completion.max_retries, 5);
        assert_eq!(config.lookup.addresses_file, PathBuf::from("servers.txt"));
        assert_eq!(config.attempt_timeout(), std::time::Duration::from_secs(5));
        assert_eq!(config.pipeline.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.pipeline.record_retries, 2);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::from_file_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.pipeline.dataset, "webqsp");
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[completion\nmodel = ").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_zero_attempt_timeout_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wikirag.toml");
        std::fs::write(&path, "[lookup]\nattempt_timeout_secs = 0\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("attempt_timeout_secs"));

        std::fs::write(&path, "[lookup]\nattempt_timeout_secs = 1\n").unwrap();
        assert!(Config::from_file(&path).is_ok());
    }

    #[test]
    fn test_zero_completion_retries_is_rejected() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());
        config.completion.max_retries = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let mut config = Config::default();
        config.completion.api_key = Some("sk-inline".to_string());
        config.completion.api_key_env = "WIKIRAG_TEST_UNSET_KEY_VAR".to_string();
        assert_eq!(config.resolve_api_key().unwrap(), "sk-inline");
    }

    #[test]
    fn test_missing_api_key() {
        let mut config = Config::default();
        config.completion.api_key_env = "WIKIRAG_TEST_UNSET_KEY_VAR".to_string();
        assert!(matches!(
            config.resolve_api_key(),
            Err(ConfigError::MissingApiKey { .. })
        ));
    }

    #[test]
    fn test_expand_env_vars_leaves_unknown_placeholders() {
        assert_eq!(
            expand_env_vars("key-${WIKIRAG_TEST_UNSET_KEY_VAR}"),
            "key-${WIKIRAG_TEST_UNSET_KEY_VAR}"
        );
        assert_eq!(expand_env_vars("plain"), "plain");
    }

    #[test]
    fn test_failure_policy_from_str() {
        assert_eq!("Skip".parse::<FailurePolicy>().unwrap(), FailurePolicy::Skip);
        assert_eq!("abort".parse::<FailurePolicy>().unwrap(), FailurePolicy::Abort);
        assert!("retry".parse::<FailurePolicy>().is_err());
    }
}
