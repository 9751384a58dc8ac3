use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{anyhow, bail, Result};
use log::debug;

use super::MediaPlayer;

/// What a [`HeadlessPlayer`] has been asked to do so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackState {
    pub resource: Option<PathBuf>,
    pub playing: bool,
    pub stopped: bool,
    pub looping: bool,
    pub volume: f32,
    pub volume_changes: usize,
    pub plays: usize,
    pub pauses: usize,
}

/// Player with no output device. Tracks requests so hosts without a
/// renderer (and tests) can observe what the session asked for.
pub struct HeadlessPlayer {
    label: &'static str,
    state: Mutex<PlaybackState>,
    require_existing: bool,
}

impl HeadlessPlayer {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            state: Mutex::new(PlaybackState {
                volume: 1.0,
                ..PlaybackState::default()
            }),
            require_existing: false,
        }
    }

    /// Make `load` fail for paths that don't exist on disk, like a real
    /// decoder would.
    pub fn requiring_existing_files(mut self) -> Self {
        self.require_existing = true;
        self
    }

    pub fn state(&self) -> PlaybackState {
        match self.state.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut PlaybackState),
    {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| anyhow!("{} player state poisoned", self.label))?;
        apply(&mut guard);
        Ok(())
    }
}

impl MediaPlayer for HeadlessPlayer {
    fn load(&self, resource: &Path) -> Result<()> {
        if self.require_existing && !resource.exists() {
            bail!("{} resource {} not found", self.label, resource.display());
        }
        debug!("{} player: load {}", self.label, resource.display());
        self.update(|state| {
            state.resource = Some(resource.to_path_buf());
            state.stopped = false;
        })
    }

    fn play(&self) -> Result<()> {
        debug!("{} player: play", self.label);
        self.update(|state| {
            state.playing = true;
            state.stopped = false;
            state.plays += 1;
        })
    }

    fn pause(&self) -> Result<()> {
        debug!("{} player: pause", self.label);
        self.update(|state| {
            state.playing = false;
            state.pauses += 1;
        })
    }

    fn stop(&self) -> Result<()> {
        debug!("{} player: stop", self.label);
        self.update(|state| {
            state.playing = false;
            state.stopped = true;
        })
    }

    fn set_volume(&self, volume: f32) -> Result<()> {
        self.update(|state| {
            state.volume = volume.clamp(0.0, 1.0);
            state.volume_changes += 1;
        })
    }

    fn set_looping(&self, looping: bool) -> Result<()> {
        self.update(|state| state.looping = looping)
    }
}
