//! Configuration: the HF call plan and other options that don't fit as CLI
//! positionals are read from an optional TOML file.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub hf: HfConfig,
    #[serde(default)]
    pub congestion_target: Option<u32>,
    #[serde(default)]
    pub recipients_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HfConfig {
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub call_list: Vec<String>,
    #[serde(default)]
    pub radio_id_letter: Option<char>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_owned(), source })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_owned(), source })
    }
}
