use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::MediaPlayer;

// Per-step volume logging is noisy; flip on when tuning fades.
const ENABLE_LOGS: bool = false;

use crate::log_debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FadeIn {
    pub duration_ms: u64,
    pub steps: u32,
    pub target_volume: f32,
}

impl Default for FadeIn {
    fn default() -> Self {
        Self {
            duration_ms: 1500,
            steps: 30,
            target_volume: 0.55,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FadeOut {
    pub duration_ms: u64,
    pub steps: u32,
}

impl Default for FadeOut {
    fn default() -> Self {
        Self {
            duration_ms: 1200,
            steps: 24,
        }
    }
}

fn step_interval(duration_ms: u64, steps: u32) -> Duration {
    Duration::from_millis(duration_ms / u64::from(steps.max(1)))
}

/// Start looping playback at zero volume and ramp to the target.
pub async fn fade_in(player: &dyn MediaPlayer, spec: &FadeIn) -> Result<()> {
    let steps = spec.steps.max(1);
    let interval = step_interval(spec.duration_ms, steps);

    player.set_volume(0.0)?;
    player.set_looping(true)?;
    player.play()?;

    for i in 0..=steps {
        let volume = i as f32 / steps as f32 * spec.target_volume;
        log_debug!("fade in step {i}/{steps}: volume {volume:.3}");
        player.set_volume(volume)?;
        if i < steps {
            tokio::time::sleep(interval).await;
        }
    }
    Ok(())
}

/// Ramp from `from_volume` down to silence, then stop.
pub async fn fade_out(player: &dyn MediaPlayer, spec: &FadeOut, from_volume: f32) -> Result<()> {
    let steps = spec.steps.max(1);
    let interval = step_interval(spec.duration_ms, steps);
    let decrement = from_volume / steps as f32;

    for i in 1..=steps {
        tokio::time::sleep(interval).await;
        let volume = (from_volume - i as f32 * decrement).max(0.0);
        log_debug!("fade out step {i}/{steps}: volume {volume:.3}");
        player.set_volume(volume)?;
    }
    player.stop()
}
