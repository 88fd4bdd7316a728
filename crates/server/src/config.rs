use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

pub const VYVE_DIR: &str = ".vyve";
pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_DB_NAME: &str = "vyve.db";
pub const DEFAULT_PORT: u16 = 3001;

const OPENAI_KEY_PREFIX: &str = "sk-";
const OPENAI_KEY_MIN_LEN: usize = 40;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid OpenAI API key format: {0}")]
    InvalidApiKey(String),

    #[error("Invalid {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Static front-end bundle served as the router fallback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            app_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: format!("sqlite:{}/{}", VYVE_DIR, DEFAULT_DB_NAME),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub default_model: String,
    pub openai_base_url: String,
    pub deepseek_base_url: String,
    /// Keys are normally supplied through the environment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deepseek_api_key: Option<String>,
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_model: llm::DEFAULT_MODEL.to_string(),
            openai_base_url: llm::OPENAI_BASE_URL.to_string(),
            deepseek_base_url: llm::DEEPSEEK_BASE_URL.to_string(),
            openai_api_key: None,
            deepseek_api_key: None,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Base URL of the hosted retrieval functions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub functions_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anon_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    /// Informational only; results are stored locally
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,
}

/// Service configuration stored in `.vyve/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
}

impl AppConfig {
    pub fn path(project_dir: &Path) -> PathBuf {
        project_dir.join(VYVE_DIR).join(CONFIG_FILE)
    }

    /// Defaults, then the first config file found (project, then user), then
    /// the process environment seeded from `.env`.
    pub async fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::from_path(project_dir.join(".env")) {
            debug!(error = %e, "No .env file loaded");
        }

        let mut config = Self::read_first(&Self::search_paths(project_dir)).await?;
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn search_paths(project_dir: &Path) -> Vec<PathBuf> {
        let mut paths = vec![Self::path(project_dir)];
        if let Some(user_dir) = dirs::config_dir() {
            paths.push(user_dir.join("vyve").join(CONFIG_FILE));
        }
        paths
    }

    async fn read_first(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        for path in paths {
            if !path.exists() {
                continue;
            }
            let content = fs::read_to_string(path).await?;
            let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
            debug!(path = %path.display(), "Config loaded");
            return Ok(config);
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Overlays recognised environment variables. `var` is the lookup, so
    /// tests can pass a map instead of the process environment.
    pub fn apply_env<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(port) = non_empty("PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                name: "PORT",
                value: port,
            })?;
        }
        if let Some(key) = non_empty("OPENAI_API_KEY").or_else(|| non_empty("VITE_OPENAI_API_KEY")) {
            self.llm.openai_api_key = Some(key);
        }
        if let Some(key) = non_empty("DEEPSEEK_API_KEY") {
            self.llm.deepseek_api_key = Some(key);
        }
        if let Some(url) = non_empty("OPENAI_BASE_URL") {
            self.llm.openai_base_url = url;
        }
        if let Some(url) = non_empty("DEEPSEEK_BASE_URL") {
            self.llm.deepseek_base_url = url;
        }
        if let Some(url) = non_empty("VITE_SUPABASE_FUNCTIONS_URL") {
            self.retrieval.functions_url = Some(url);
        }
        if let Some(key) = non_empty("VITE_SUPABASE_ANON_KEY") {
            self.retrieval.anon_key = Some(key);
        }
        if let Some(key) = non_empty("VITE_PINECONE_API_KEY") {
            self.retrieval.index_api_key = Some(key);
        }
        if let Some(url) = non_empty("VITE_SUPABASE_URL") {
            self.retrieval.project_url = Some(url);
        }

        Ok(())
    }

    /// A present OpenAI key must look like one. Missing keys are allowed;
    /// the chat client reports them when a call is made.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(key) = &self.llm.openai_api_key {
            if !key.starts_with(OPENAI_KEY_PREFIX) {
                return Err(ConfigError::InvalidApiKey(format!(
                    "key must start with '{}'",
                    OPENAI_KEY_PREFIX
                )));
            }
            if key.len() < OPENAI_KEY_MIN_LEN {
                return Err(ConfigError::InvalidApiKey(format!(
                    "key must be at least {} characters",
                    OPENAI_KEY_MIN_LEN
                )));
            }
        }

        if self.llm.openai_api_key.is_none() {
            warn!("OPENAI_API_KEY is not set, OpenAI models will be unavailable");
        }
        if self.retrieval.functions_url.is_none() {
            warn!("VITE_SUPABASE_FUNCTIONS_URL is not set, retrieval will return no citations");
        }

        Ok(())
    }

    /// Writes the config without secrets, creating `.vyve/` when needed.
    pub async fn write(&self, project_dir: &Path) -> Result<PathBuf, ConfigError> {
        let config_dir = project_dir.join(VYVE_DIR);
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).await?;
        }

        let mut stored = self.clone();
        stored.llm.openai_api_key = None;
        stored.llm.deepseek_api_key = None;
        stored.retrieval.anon_key = None;
        stored.retrieval.index_api_key = None;

        let path = Self::path(project_dir);
        fs::write(&path, toml::to_string_pretty(&stored)?).await?;
        debug!(path = %path.display(), "Config saved");
        Ok(path)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
