use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::ollama::DEFAULT_BASE_URL;

pub const DEFAULT_CHAT_MODEL: &str = "gemma3:1b";
pub const DEFAULT_VISION_MODEL: &str = "llava";
pub const DEFAULT_WEB_MODEL: &str = "llama3.2";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub base_url: Option<String>,
    pub chat_model: Option<String>,
    pub vision_model: Option<String>,
    pub web_model: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            base_url: None,
            chat_model: None,
            vision_model: None,
            web_model: None,
        }
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn chat_model(&self) -> &str {
        self.chat_model.as_deref().unwrap_or(DEFAULT_CHAT_MODEL)
    }

    pub fn vision_model(&self) -> &str {
        self.vision_model.as_deref().unwrap_or(DEFAULT_VISION_MODEL)
    }

    pub fn web_model(&self) -> &str {
        self.web_model.as_deref().unwrap_or(DEFAULT_WEB_MODEL)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("charla").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_fields_are_unset() {
        let config = Config::new();
        assert_eq!(config.base_url(), "http://localhost:11434");
        assert_eq!(config.chat_model(), DEFAULT_CHAT_MODEL);
        assert_eq!(config.vision_model(), DEFAULT_VISION_MODEL);
        assert_eq!(config.web_model(), DEFAULT_WEB_MODEL);
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let mut config = Config::new();
        config.chat_model = Some("qwen3:4b".into());
        config.base_url = Some("http://10.0.0.2:11434".into());
        assert_eq!(config.chat_model(), "qwen3:4b");
        assert_eq!(config.base_url(), "http://10.0.0.2:11434");
    }

    #[test]
    fn round_trips_through_json() {
        let mut config = Config::new();
        config.web_model = Some("llama3.2".into());

        let json = serde_json::to_string(&config).unwrap();
        let loaded: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.web_model(), "llama3.2");
        assert!(loaded.chat_model.is_none());
    }
}
