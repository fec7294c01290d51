use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::PathBuf;

/// Application paths following OS conventions
#[derive(Clone, Debug)]
pub struct AppPaths {
    /// Configuration directory (config.toml)
    pub config: PathBuf,
}

impl AppPaths {
    /// Resolve OS-specific paths for Sound Meter
    ///
    /// # Platform Paths
    ///
    /// - Linux: `~/.config/soundmeter/`
    /// - macOS: `~/Library/Application Support/dev.LotusEmberLabs.SoundMeter/`
    /// - Windows: `%APPDATA%\LotusEmberLabs\SoundMeter\config\`
    pub fn new() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("dev", "LotusEmberLabs", "SoundMeter")
            .context("Failed to determine project directories")?;

        Ok(Self {
            config: proj_dirs.config_dir().to_path_buf(),
        })
    }

    /// Create the configuration directory if missing
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.config).context("Failed to create config directory")?;
        log::debug!("Config directory: {}", self.config.display());
        Ok(())
    }

    /// Get path to config file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }
}
