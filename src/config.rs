use std::{fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::media::{FadeIn, FadeOut};

pub const CONFIG_ENV: &str = "QUICKCALM_CONFIG";
pub const DURATION_ENV: &str = "QUICKCALM_DURATION";
pub const DEBUG_ENV: &str = "QUICKCALM_DEBUG";
pub const DEFAULT_CONFIG_FILE: &str = "quickcalm.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Session lengths, in minutes, that may be requested.
    pub allowed_durations: Vec<u32>,
    pub default_duration: u32,
    pub preroll_seconds: u32,
    pub tick_interval_ms: u64,
    pub fade_in: FadeIn,
    pub fade_out: FadeOut,
    pub snapshot_max_age_secs: u64,
    pub audio_path: PathBuf,
    pub video_path: PathBuf,
    pub store_path: PathBuf,
    #[serde(skip)]
    pub debug: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            allowed_durations: vec![3, 5, 10, 15],
            default_duration: 5,
            preroll_seconds: 3,
            tick_interval_ms: 1000,
            fade_in: FadeIn::default(),
            fade_out: FadeOut::default(),
            snapshot_max_age_secs: 5 * 60,
            audio_path: PathBuf::from("assets/audio/music.mp3"),
            video_path: PathBuf::from("assets/videos/candle.mp4"),
            store_path: PathBuf::from("quickcalm.sqlite3"),
            debug: false,
        }
    }
}

impl AppConfig {
    /// Read the config file. A missing file means defaults; a malformed one
    /// is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config in {}", path.display()))
    }

    /// Config path from the environment, then env overrides on top.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let mut config = Self::load(Path::new(&path))?;
        config.apply_overrides(
            std::env::var(DURATION_ENV).ok().as_deref(),
            std::env::var(DEBUG_ENV).ok().as_deref(),
        )?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, duration: Option<&str>, debug: Option<&str>) -> Result<()> {
        if let Some(raw) = duration {
            self.default_duration = raw
                .trim()
                .parse()
                .with_context(|| format!("{DURATION_ENV} must be whole minutes, got '{raw}'"))?;
        }
        if let Some(value) = debug {
            self.debug = value == "1" || value.eq_ignore_ascii_case("true");
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn snapshot_max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.snapshot_max_age_secs as i64)
    }
}
