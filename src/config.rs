use std::path::{Path, PathBuf};

use eyre::Result;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::vtt::TimingPolicy;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_STATIC_DIR: &str = "client/dist";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_MAX_CHARS: usize = 30_000;
pub const DEFAULT_CAPTION_LANG: &str = "en";
pub const DEFAULT_YT_DLP: &str = "yt-dlp";
pub const DEFAULT_SOCKET_TIMEOUT: u64 = 30;

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub static_dir: Option<PathBuf>,
    pub model: Option<String>,
    pub max_chars: Option<usize>,
    pub caption_lang: Option<String>,
    pub yt_dlp: Option<PathBuf>,
    pub socket_timeout: Option<u64>,
    pub cue_timing: Option<TimingPolicy>,
}

impl Config {
    /// Load config from ~/.config/ytgist/config.toml if it exists
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            debug!("Loading config from {}", path.display());
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            debug!("No config file found at {}", path.display());
            Ok(Config::default())
        }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars.unwrap_or(DEFAULT_MAX_CHARS)
    }

    pub fn caption_lang(&self) -> &str {
        self.caption_lang.as_deref().unwrap_or(DEFAULT_CAPTION_LANG)
    }

    pub fn yt_dlp(&self) -> PathBuf {
        self.yt_dlp.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_YT_DLP))
    }

    pub fn socket_timeout(&self) -> u64 {
        self.socket_timeout.unwrap_or(DEFAULT_SOCKET_TIMEOUT)
    }

    pub fn cue_timing(&self) -> TimingPolicy {
        self.cue_timing.unwrap_or_default()
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("ytgist")
        .join("config.toml")
}
