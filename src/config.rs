//! Configuration
//!
//! Loads configuration from TOML at `~/.config/stratum/config.toml`.
//! Auto-generates a default config file on first run if missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub window: WindowConfig,
    pub stacks: StacksConfig,
    pub bar: BarConfig,
    pub lock: LockConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if the file is absent.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("config file not found at {config_path:?}, using defaults");
            if let Err(err) = Self::save_default(&config_path) {
                warn!("failed to create default config file: {err}");
            }
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).context("failed to read config file")?;
        let config: Config = toml::from_str(&content).context("failed to parse config file")?;

        info!("configuration loaded from {config_path:?}");
        Ok(config)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("failed to get config directory")?
            .join("stratum");
        Ok(config_dir.join("config.toml"))
    }

    fn save_default(path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("failed to serialize default config")?;
        fs::write(path, toml_string).context("failed to write default config file")?;

        info!("created default config file at {path:?}");
        Ok(())
    }
}

/// Window border configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Border width in pixels
    pub border_width: u16,
    /// Border color of the focused window (hex: 0xRRGGBB)
    pub focused_color: u32,
    /// Border color of every other window (hex: 0xRRGGBB)
    pub unfocused_color: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            border_width: 2,
            focused_color: 0xffffff,
            unfocused_color: 0x000000,
        }
    }
}

/// Minimize/hide stack configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StacksConfig {
    /// Capacity of each stack; pushes beyond it are dropped
    pub capacity: usize,
}

impl Default for StacksConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

/// Status bar configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarConfig {
    /// Bar height in pixels
    pub height: u16,
    /// Redraw interval in seconds
    pub interval_secs: u64,
    /// Core-protocol font name
    pub font: String,
}

impl Default for BarConfig {
    fn default() -> Self {
        Self {
            height: 20,
            interval_secs: 1,
            font: "fixed".to_string(),
        }
    }
}

/// Lock screen configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LockConfig {
    /// Path to the SHA-512 passphrase digest; defaults to ~/.swmhash
    pub hash_path: Option<PathBuf>,
}
