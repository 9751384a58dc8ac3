//! Device capabilities the session drives but does not implement: haptic
//! pulses, screen keep-awake and host lifecycle notifications.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Host application lifecycle state, as reported by the platform shell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HostState {
    Active,
    Inactive,
    Background,
}

impl HostState {
    /// Inactive (e.g. the app switcher is up) is handled like background.
    pub fn is_foreground(self) -> bool {
        self == HostState::Active
    }
}

pub trait Haptics: Send + Sync {
    fn pulse(&self);
}

pub trait KeepAwake: Send + Sync {
    fn acquire(&self);
    fn release(&self);
}

/// Haptics for hosts without a vibration motor; logs at debug.
#[derive(Debug, Default)]
pub struct NoopHaptics;

impl Haptics for NoopHaptics {
    fn pulse(&self) {
        debug!("haptic pulse");
    }
}

/// Tracks whether keep-awake is held without talking to any device API.
#[derive(Debug, Default)]
pub struct HeadlessKeepAwake {
    held: AtomicBool,
}

impl HeadlessKeepAwake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

impl KeepAwake for HeadlessKeepAwake {
    fn acquire(&self) {
        if !self.held.swap(true, Ordering::SeqCst) {
            info!("Keep-awake acquired");
        }
    }

    fn release(&self) {
        if self.held.swap(false, Ordering::SeqCst) {
            info!("Keep-awake released");
        }
    }
}
