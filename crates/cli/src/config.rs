use anyhow::{Context as AnyhowContext, Result};
use ashguard_retrieval::{InitStrategy, ServiceConfig};
use ashguard_vector_store::EmbeddingMode;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "ASHGUARD_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "ashguard.toml";

/// Everything the binary needs: retrieval core, HTTP surface, LLM provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Requests admitted per window across all clients
    pub rate_limit_requests: usize,
    pub rate_limit_window_secs: u64,
    /// Sent as `Retry-After` while the knowledge base initializes
    pub retry_after_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            rate_limit_requests: 60,
            rate_limit_window_secs: 60,
            retry_after_secs: 5,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub const fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub max_tokens: usize,
    pub timeout_secs: u64,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-sonnet-20241022".to_string(),
            max_tokens: 500,
            timeout_secs: 60,
            api_key: None,
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AppConfig {
    /// File (explicit path, `ASHGUARD_CONFIG`, or `./ashguard.toml` if present), then env overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));
        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(dir) = get("ASHGUARD_DATA_DIR") {
            self.service.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get("ASHGUARD_EMBEDDING_MODE") {
            self.service.embedding.mode =
                EmbeddingMode::parse(&raw).context("Invalid ASHGUARD_EMBEDDING_MODE")?;
        }
        if let Some(dir) = get("ASHGUARD_MODEL_DIR") {
            self.service.embedding.model_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get("ASHGUARD_INIT_STRATEGY") {
            self.service.init_strategy = InitStrategy::parse(&raw).with_context(|| {
                format!("Invalid ASHGUARD_INIT_STRATEGY '{raw}' (expected eager|lazy|background)")
            })?;
        }
        if let Some(raw) = get("PORT") {
            self.server.port = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT '{raw}'"))?;
        }
        if let Some(key) = get("ANTHROPIC_API_KEY") {
            self.llm.api_key = Some(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_file_then_env_precedence() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("ashguard.toml");
        std::fs::write(
            &path,
            r#"
            [service]
            data_dir = "/srv/kb"
            init_strategy = "eager"
            default_k = 5

            [server]
            port = 8080

            [llm]
            max_tokens = 256
            "#,
        )
        .unwrap();

        let mut config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.service.default_k, 5);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.llm.max_tokens, 256);
        assert_eq!(config.llm.model, "claude-3-5-sonnet-20241022");

        config
            .apply_env(env_of(&[
                ("PORT", "9000"),
                ("ASHGUARD_INIT_STRATEGY", "lazy"),
                ("ASHGUARD_EMBEDDING_MODE", "stub"),
                ("ANTHROPIC_API_KEY", "sk-test"),
                ("ASHGUARD_DATA_DIR", ""),
            ]))
            .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.service.init_strategy, InitStrategy::Lazy);
        assert_eq!(config.service.embedding.mode, EmbeddingMode::Stub);
        assert_eq!(config.service.data_dir, PathBuf::from("/srv/kb"));
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert!(!format!("{:?}", config.llm).contains("sk-test"));
    }

    #[test]
    fn test_invalid_env_values_are_errors() {
        let mut config = AppConfig::default();
        assert!(config.apply_env(env_of(&[("PORT", "http")])).is_err());
        assert!(config
            .apply_env(env_of(&[("ASHGUARD_INIT_STRATEGY", "whenever")]))
            .is_err());
    }

    #[test]
    fn test_defaults_bind_public_port_5000() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_addr(), "0.0.0.0:5000");
        assert_eq!(config.service.default_k, 3);
    }
}
