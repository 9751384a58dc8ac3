pub mod fade;
pub mod headless;
#[cfg(feature = "playback")]
pub mod rodio_player;

use std::{path::Path, sync::Arc};

use anyhow::Result;

pub use fade::{fade_in, fade_out, FadeIn, FadeOut};
pub use headless::{HeadlessPlayer, PlaybackState};
#[cfg(feature = "playback")]
pub use rodio_player::RodioPlayer;

/// A looping media resource the session can start, pause and fade.
///
/// Calls are requests: implementations may queue them on their own thread,
/// so `Ok` means "accepted", not "audible".
pub trait MediaPlayer: Send + Sync {
    fn load(&self, resource: &Path) -> Result<()>;
    fn play(&self) -> Result<()>;
    fn pause(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    /// Volume in `0.0..=1.0`; out-of-range values are clamped.
    fn set_volume(&self, volume: f32) -> Result<()>;
    fn set_looping(&self, looping: bool) -> Result<()>;
}

/// Background audio player used by the runner: rodio when built with the
/// `playback` feature, otherwise a headless stand-in.
pub fn default_audio_player() -> Arc<dyn MediaPlayer> {
    #[cfg(feature = "playback")]
    {
        Arc::new(RodioPlayer::new())
    }

    #[cfg(not(feature = "playback"))]
    {
        Arc::new(HeadlessPlayer::new("audio"))
    }
}
