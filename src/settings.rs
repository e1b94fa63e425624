use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::dataset::DataPaths;
use crate::matcher::MatchPolicy;

const ENV_PREFIX: &str = "MOODMATE";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub data: DataPaths,
    #[serde(default)]
    pub matching: MatchPolicy,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub program: String,
    pub name: String,
    pub timeout_secs: u64,
    pub max_words: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            program: "ollama".to_string(),
            name: "gemma3:1b".to_string(),
            timeout_secs: 120,
            max_words: 300,
        }
    }
}

impl ModelSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Idle sessions older than this are dropped when a new chat starts.
    pub session_ttl_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            session_ttl_secs: 3600,
        }
    }
}

impl ServerSettings {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

impl Settings {
    /// Reads `<name>.toml` (or any format `config` recognises), then
    /// `MOODMATE__SECTION__KEY` environment overrides.
    pub fn load(name: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(name))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize()
    }
}
