//! Runtime configuration.
//!
//! Loaded from an optional `mass-times.toml`; every field has a default so
//! the crate runs with no config file at all. The API key falls back to the
//! `ANTHROPIC_API_KEY` environment variable.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::llm::LlmRates;

pub const DEFAULT_CONFIG_FILE: &str = "mass-times.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root for fetched archives and extraction results.
    pub data_dir: PathBuf,
    /// Where parish templates are persisted.
    pub templates_dir: PathBuf,
    /// Tier-3 API key; empty disables the LLM fallback.
    pub api_key: String,
    /// Model used for tier-3 extraction.
    pub fallback_model: String,
    pub llm_input_usd_per_mtok: f64,
    pub llm_output_usd_per_mtok: f64,
    /// Shadow mode marks every result provisional regardless of tier.
    pub shadow_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("data"),
            templates_dir: PathBuf::from("templates"),
            api_key: String::new(),
            fallback_model: "claude-sonnet-4-5".to_string(),
            llm_input_usd_per_mtok: 3.0,
            llm_output_usd_per_mtok: 15.0,
            shadow_mode: false,
        }
    }
}

impl Config {
    /// Load from the given path, or from `mass-times.toml` when present, or
    /// fall back to defaults. A missing explicit path is an error; a missing
    /// default file is not.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    let raw = fs::read_to_string(default_path).context("reading mass-times.toml")?;
                    toml::from_str(&raw).context("parsing mass-times.toml")?
                } else {
                    Config::default()
                }
            }
        };

        if config.api_key.is_empty() {
            if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
                config.api_key = key;
            }
        }
        Ok(config)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.data_dir.join("results")
    }

    pub fn llm_rates(&self) -> LlmRates {
        LlmRates {
            input_usd_per_mtok: self.llm_input_usd_per_mtok,
            output_usd_per_mtok: self.llm_output_usd_per_mtok,
        }
    }
}
