use std::path::Path;

use anyhow::Context;
use costbook_import::ClassifierConfig;
use serde::Deserialize;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:costbook.db";

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default)]
    pub classification: ClassifierConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            classification: ClassifierConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(content).context("invalid config file")?;
        config.classification.validate()?;
        Ok(config)
    }

    /// Reads `path` when given; otherwise the built-in defaults apply.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            tracing::debug!("no config file given, using defaults");
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("in config {}", path.display()))
    }
}
