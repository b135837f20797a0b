use crate::model::LoopMode;
use crate::transport::{DEFAULT_POLL_INTERVAL, DEFAULT_VOLUME_STEP, PlayerOptions};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const APP_DIR: &str = "spindle";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_volume")]
    pub volume: u8,
    #[serde(default = "default_volume_step")]
    pub volume_step: u8,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub music_dir: Option<PathBuf>,
    #[serde(default)]
    pub loop_mode: LoopMode,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub output_device: Option<String>,
}

fn default_volume() -> u8 {
    50
}

fn default_volume_step() -> u8 {
    DEFAULT_VOLUME_STEP
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            volume_step: default_volume_step(),
            poll_interval_ms: default_poll_interval_ms(),
            music_dir: None,
            loop_mode: LoopMode::None,
            shuffle: false,
            output_device: None,
        }
    }
}

impl Settings {
    pub fn player_options(&self) -> PlayerOptions {
        PlayerOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(10)),
            volume: self.volume.min(100),
            volume_step: self.volume_step.max(1),
            loop_mode: self.loop_mode,
            shuffle: self.shuffle,
            shuffle_seed: None,
        }
    }
}

pub fn config_root() -> Result<PathBuf> {
    if let Ok(override_dir) = env::var("SPINDLE_CONFIG_DIR") {
        return Ok(PathBuf::from(override_dir));
    }

    let base = dirs::config_dir().context("no configuration directory for this platform")?;
    Ok(base.join(APP_DIR))
}

pub fn settings_path() -> Result<PathBuf> {
    Ok(config_root()?.join(SETTINGS_FILE))
}

pub fn log_dir() -> Result<PathBuf> {
    Ok(config_root()?.join("logs"))
}

pub fn ensure_config_dir() -> Result<PathBuf> {
    let root = config_root()?;
    fs::create_dir_all(&root).with_context(|| format!("failed to create {}", root.display()))?;
    Ok(root)
}

pub fn load_settings() -> Result<Settings> {
    let path = settings_path()?;
    if !path.exists() {
        return Ok(Settings::default());
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    let settings: Settings = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse settings file {}", path.display()))?;
    Ok(settings)
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    ensure_config_dir()?;
    let path = settings_path()?;
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
