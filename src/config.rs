//! Application configuration persisted as `config.toml`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::audio::AudioConfig;
use crate::validation;

/// How the meter is presented on stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Single refreshing line with a level bar
    #[default]
    Bar,
    /// One JSON object per render
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Cells drawn when the meter is full
    pub bar_width: u16,
    /// Minimum time between renders; 0 renders every chunk
    pub render_interval_ms: u32,
    pub format: OutputFormat,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            bar_width: 40,
            render_interval_ms: 50,
            format: OutputFormat::Bar,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

impl AppConfig {
    /// Load config from file or create default
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let config: AppConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?;
            config.validate()?;
            log::info!("Config loaded from: {}", path.display());
            Ok(config)
        } else {
            let config = Self::default();
            config.save(path)?;
            log::info!("Default config created at: {}", path.display());
            Ok(config)
        }
    }

    /// Write config to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, toml_str)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Reject values outside the supported ranges
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate_hz != crate::audio::TARGET_SAMPLE_RATE {
            anyhow::bail!(
                "audio.sample_rate_hz must be {}, got {}",
                crate::audio::TARGET_SAMPLE_RATE,
                self.audio.sample_rate_hz
            );
        }
        validation::validate_chunk_ms(self.audio.chunk_ms).context("audio.chunk_ms")?;
        validation::validate_opt_device_name(&self.audio.device_name)
            .context("audio.device_name")?;
        validation::validate_bar_width(self.display.bar_width).context("display.bar_width")?;
        validation::validate_render_interval_ms(self.display.render_interval_ms)
            .context("display.render_interval_ms")?;
        Ok(())
    }
}
