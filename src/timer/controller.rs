use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use uuid::Uuid;

use crate::{
    breathing::BreathingPhase,
    config::AppConfig,
    lifecycle::SnapshotStore,
    media::{fade_in, fade_out, FadeIn, HeadlessPlayer, MediaPlayer},
    platform::{Haptics, HeadlessKeepAwake, HostState, KeepAwake, NoopHaptics},
    store::KeyValueStore,
};

use super::{
    events::{EndReason, SessionEvent},
    state::{SessionConfig, SessionStage, SessionState, StageTransition},
};

// Per-tick trace output; the `debug` config flag promotes it to info.
const ENABLE_LOGS: bool = true;

use crate::log_debug;

const EVENT_CAPACITY: usize = 256;

/// External collaborators one controller drives exclusively.
#[derive(Clone)]
pub struct Capabilities {
    pub audio: Arc<dyn MediaPlayer>,
    pub video: Arc<dyn MediaPlayer>,
    pub haptics: Arc<dyn Haptics>,
    pub keep_awake: Arc<dyn KeepAwake>,
    pub store: Arc<dyn KeyValueStore>,
}

impl Capabilities {
    /// Headless video, haptics and keep-awake around the given audio player
    /// and store.
    pub fn headless(audio: Arc<dyn MediaPlayer>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            audio,
            video: Arc::new(HeadlessPlayer::new("video")),
            haptics: Arc::new(NoopHaptics),
            keep_awake: Arc::new(HeadlessKeepAwake::new()),
            store,
        }
    }
}

/// Read-only view of the session for hosts.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: Option<String>,
    pub stage: SessionStage,
    pub remaining_seconds: u32,
    pub current_phase: BreathingPhase,
    pub phase_remaining_seconds: u32,
    pub cycle_count: u32,
    pub is_paused: bool,
    pub is_active: bool,
    pub is_in_countdown: bool,
    pub countdown_seconds: u32,
    pub host_state: HostState,
}

struct ActiveSession {
    session_id: Option<String>,
    config: Option<SessionConfig>,
    state: SessionState,
    host: HostState,
    backgrounded_at: Option<DateTime<Utc>>,
    keep_awake_held: bool,
    media_started: bool,
    /// Bumped on every ticker spawn; ticks from older tickers are dropped.
    ticker_generation: u64,
}

impl ActiveSession {
    fn new() -> Self {
        Self {
            session_id: None,
            config: None,
            state: SessionState::new(),
            host: HostState::Active,
            backgrounded_at: None,
            keep_awake_held: false,
            media_started: false,
            ticker_generation: 0,
        }
    }

    fn view(&self) -> SessionView {
        SessionView {
            session_id: self.session_id.clone(),
            stage: self.state.stage(),
            remaining_seconds: self.state.remaining_seconds(),
            current_phase: self.state.current_phase(),
            phase_remaining_seconds: self.state.phase_remaining_seconds(),
            cycle_count: self.state.cycle_count(),
            is_paused: self.state.is_paused(),
            is_active: self.state.is_active(),
            is_in_countdown: self.state.is_in_countdown(),
            countdown_seconds: self.state.countdown_seconds(),
            host_state: self.host,
        }
    }
}

#[derive(Default)]
struct Tasks {
    ticker: Option<JoinHandle<()>>,
    media: Option<JoinHandle<()>>,
}

struct Shared {
    config: AppConfig,
    session: Mutex<ActiveSession>,
    tasks: Mutex<Tasks>,
    caps: Capabilities,
    snapshots: SnapshotStore,
    events: broadcast::Sender<SessionEvent>,
    /// Host visibility as last reported, read by media tasks before video plays.
    foreground: Arc<AtomicBool>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut();
        if let Some(handle) = tasks.ticker.take() {
            handle.abort();
        }
        // A running media task may be a fade-out that already cleared
        // `media_started`.
        let media_task_running = match tasks.media.take() {
            Some(handle) => {
                let running = !handle.is_finished();
                handle.abort();
                running
            }
            None => false,
        };

        let session = self.session.get_mut();
        if session.media_started || media_task_running {
            stop_player(&*self.caps.audio, "audio");
            stop_player(&*self.caps.video, "video");
        }
        if session.keep_awake_held {
            self.caps.keep_awake.release();
        }
    }
}

/// Owns one breathing session end to end: the single tick source, media,
/// haptics, keep-awake and the background snapshot.
#[derive(Clone)]
pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    pub fn new(config: AppConfig, caps: Capabilities) -> Self {
        let snapshots = SnapshotStore::new(caps.store.clone(), config.snapshot_max_age());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                config,
                session: Mutex::new(ActiveSession::new()),
                tasks: Mutex::new(Tasks::default()),
                caps,
                snapshots,
                events,
                foreground: Arc::new(AtomicBool::new(true)),
            }),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.shared.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Validate a requested length against the configured allowed set.
    pub fn session_config(&self, duration_minutes: u32) -> Result<SessionConfig> {
        SessionConfig::new(duration_minutes, &self.shared.config.allowed_durations)
    }

    pub async fn get_state(&self) -> SessionView {
        self.shared.session.lock().await.view()
    }

    /// Run the pre-roll, then begin. A recent snapshot for the same length
    /// is adopted instead of starting fresh.
    pub async fn start_countdown_then_session(&self, config: SessionConfig) -> Result<SessionView> {
        let mut session = self.shared.session.lock().await;
        if session.state.is_active() {
            bail!("a session is already active");
        }

        if let Some(restored) = self
            .shared
            .snapshots
            .restore(config.duration_minutes())
            .await
        {
            self.adopt_restored(&mut session, config, restored).await;
            return Ok(session.view());
        }

        let preroll = self.shared.config.preroll_seconds;
        session.config = Some(config);
        session.session_id = None;
        session.media_started = false;
        self.acquire_keep_awake(&mut session);

        if preroll == 0 {
            self.begin_inner(&mut session, config).await;
            self.shared.caps.haptics.pulse();
        } else {
            let first = session.state.begin_countdown(config, preroll);
            info!("Pre-roll started: {preroll}s before a {} min session", config.duration_minutes());
            self.emit(first);
        }
        self.spawn_ticker(&mut session).await;

        Ok(session.view())
    }

    /// Start the session immediately, skipping the pre-roll.
    pub async fn begin(&self, config: SessionConfig) -> Result<SessionView> {
        let mut session = self.shared.session.lock().await;
        if session.state.is_active() {
            bail!("a session is already active");
        }
        session.config = Some(config);
        self.acquire_keep_awake(&mut session);
        self.begin_inner(&mut session, config).await;
        self.shared.caps.haptics.pulse();
        self.spawn_ticker(&mut session).await;
        Ok(session.view())
    }

    /// Stop ticking and playback. No-op unless running.
    pub async fn pause(&self) -> SessionView {
        let mut session = self.shared.session.lock().await;
        if !session.state.pause() {
            return session.view();
        }

        self.cancel_ticker().await;
        self.interrupt_media_start(&mut session).await;
        if session.media_started {
            pause_player(&*self.shared.caps.audio, "audio");
            pause_player(&*self.shared.caps.video, "video");
        }

        info!(
            "Session paused with {}s remaining ({} {}s)",
            session.state.remaining_seconds(),
            session.state.current_phase().as_str(),
            session.state.phase_remaining_seconds()
        );
        self.emit(SessionEvent::Paused);
        session.view()
    }

    /// Continue from the retained state. No-op unless paused.
    pub async fn resume(&self) -> SessionView {
        let mut session = self.shared.session.lock().await;
        if !session.state.resume() {
            return session.view();
        }

        self.spawn_ticker(&mut session).await;
        if session.state.stage() == SessionStage::Breathing {
            if session.media_started {
                play_player(&*self.shared.caps.audio, "audio");
                if session.host.is_foreground() {
                    play_player(&*self.shared.caps.video, "video");
                }
            } else {
                self.start_media(&mut session).await;
            }
        }

        info!("Session resumed with {}s remaining", session.state.remaining_seconds());
        self.emit(SessionEvent::Resumed);
        session.view()
    }

    /// End the session before the timer runs out.
    pub async fn finish_early(&self) -> Result<SessionView> {
        let mut session = self.shared.session.lock().await;
        if !session.state.is_active() {
            bail!("no active session to finish");
        }
        session.state.finish();
        self.finish_inner(&mut session, EndReason::FinishedEarly, false)
            .await;
        Ok(session.view())
    }

    /// Host moved between foreground and background. Playback keeps going in
    /// the background; only video rendering is paused and a snapshot taken.
    pub async fn handle_host_state(&self, next: HostState) {
        let mut session = self.shared.session.lock().await;
        let previous = session.host;
        session.host = next;
        self.shared
            .foreground
            .store(next.is_foreground(), Ordering::SeqCst);

        if previous.is_foreground() && !next.is_foreground() {
            let now = Utc::now();
            session.backgrounded_at = Some(now);
            if !session.state.is_active() {
                return;
            }
            if session.media_started {
                pause_player(&*self.shared.caps.video, "video");
            }
            self.shared.snapshots.save(&session.state, now).await;
        } else if !previous.is_foreground() && next.is_foreground() {
            if let Some(since) = session.backgrounded_at.take() {
                // Ticking continued while the process was alive; time lost to
                // a full suspension is not caught up.
                let away = Utc::now().signed_duration_since(since);
                info!("Returned to foreground after {}s", away.num_seconds());
            }
            if session.state.is_active() && !session.state.is_paused() && session.media_started {
                play_player(&*self.shared.caps.video, "video");
            }
        }
    }

    /// Abrupt teardown: cancel every pending task, stop media, release
    /// keep-awake. The background snapshot is left in place.
    pub async fn shutdown(&self) {
        let mut session = self.shared.session.lock().await;
        session.state.finish();
        session.ticker_generation = session.ticker_generation.wrapping_add(1);

        {
            let mut tasks = self.shared.tasks.lock().await;
            if let Some(handle) = tasks.ticker.take() {
                handle.abort();
            }
            if let Some(handle) = tasks.media.take() {
                handle.abort();
            }
        }

        stop_player(&*self.shared.caps.audio, "audio");
        stop_player(&*self.shared.caps.video, "video");
        session.media_started = false;
        self.release_keep_awake(&mut session);
        info!("Session controller shut down");
    }

    async fn adopt_restored(
        &self,
        session: &mut ActiveSession,
        config: SessionConfig,
        restored: SessionState,
    ) {
        info!(
            "Restoring session: {}s remaining, {} {}s",
            restored.remaining_seconds(),
            restored.current_phase().as_str(),
            restored.phase_remaining_seconds()
        );

        session.state = restored;
        session.config = Some(config);
        session.session_id = Some(Uuid::new_v4().to_string());
        session.media_started = false;
        self.acquire_keep_awake(session);

        self.emit(SessionEvent::Restored {
            remaining_seconds: session.state.remaining_seconds(),
            phase: session.state.current_phase(),
        });

        if session.state.is_paused() {
            return;
        }
        if session.state.stage() == SessionStage::Breathing {
            self.start_media(session).await;
        }
        self.spawn_ticker(session).await;
    }

    async fn begin_inner(&self, session: &mut ActiveSession, config: SessionConfig) {
        let session_id = Uuid::new_v4().to_string();
        let events = session.state.begin(config);
        session.session_id = Some(session_id.clone());

        info!(
            "Session {session_id} started: {} min ({}s)",
            config.duration_minutes(),
            config.total_seconds()
        );
        self.emit(SessionEvent::SessionStarted {
            session_id,
            total_seconds: config.total_seconds(),
        });
        for event in events {
            self.emit(event);
        }

        self.start_media(session).await;
    }

    async fn finish_inner(&self, session: &mut ActiveSession, reason: EndReason, from_ticker: bool) {
        {
            let mut tasks = self.shared.tasks.lock().await;
            if let Some(handle) = tasks.ticker.take() {
                // The ticker can't abort itself mid-tick; it exits on its own.
                if !from_ticker {
                    handle.abort();
                }
            }
            session.ticker_generation = session.ticker_generation.wrapping_add(1);

            let fade_in_running = match tasks.media.take() {
                Some(handle) if !handle.is_finished() => {
                    handle.abort();
                    true
                }
                _ => false,
            };

            let audio = self.shared.caps.audio.clone();
            stop_player(&*self.shared.caps.video, "video");
            if session.media_started && !fade_in_running {
                let spec = self.shared.config.fade_out;
                let from = self.shared.config.fade_in.target_volume;
                tasks.media = Some(tokio::spawn(async move {
                    if let Err(err) = fade_out(&*audio, &spec, from).await {
                        warn!("Audio fade-out failed: {err:#}");
                        stop_player(&*audio, "audio");
                    }
                }));
            } else {
                stop_player(&*audio, "audio");
            }
        }
        session.media_started = false;

        self.release_keep_awake(session);
        self.shared.snapshots.clear().await;

        let session_id = session.session_id.clone().unwrap_or_default();
        info!(
            "Session {session_id} ended ({reason:?}) after {} cycles",
            session.state.cycle_count()
        );
        self.emit(session.state.end_event(&session_id, reason));
    }

    async fn start_media(&self, session: &mut ActiveSession) {
        let audio = self.shared.caps.audio.clone();
        let video = self.shared.caps.video.clone();
        let audio_path = self.shared.config.audio_path.clone();
        let video_path = self.shared.config.video_path.clone();
        let fade = self.shared.config.fade_in;
        let foreground = self.shared.foreground.clone();

        let handle = tokio::spawn(async move {
            start_media_task(audio, video, audio_path, video_path, fade, foreground).await;
        });

        session.media_started = true;
        let mut tasks = self.shared.tasks.lock().await;
        if let Some(previous) = tasks.media.replace(handle) {
            previous.abort();
        }
    }

    /// Abort a media start that is still fading in, so a later resume starts
    /// it over instead of racing it.
    async fn interrupt_media_start(&self, session: &mut ActiveSession) {
        let mut tasks = self.shared.tasks.lock().await;
        if let Some(handle) = tasks.media.take() {
            if !handle.is_finished() {
                handle.abort();
                stop_player(&*self.shared.caps.audio, "audio");
                stop_player(&*self.shared.caps.video, "video");
                session.media_started = false;
            }
        }
    }

    async fn spawn_ticker(&self, session: &mut ActiveSession) {
        let mut ticker_guard = self.shared.tasks.lock().await;
        if let Some(handle) = ticker_guard.ticker.take() {
            handle.abort();
        }

        session.ticker_generation = session.ticker_generation.wrapping_add(1);
        let generation = session.ticker_generation;
        let period = self.shared.config.tick_interval();
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let controller = SessionController { shared };
                if !controller.on_tick(generation).await {
                    break;
                }
            }
        });

        ticker_guard.ticker = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.shared.tasks.lock().await.ticker.take() {
            handle.abort();
        }
    }

    /// One elapsed second. Returns false when the ticker should exit.
    async fn on_tick(&self, generation: u64) -> bool {
        let mut session = self.shared.session.lock().await;
        if session.ticker_generation != generation
            || !session.state.is_active()
            || session.state.is_paused()
        {
            return false;
        }

        let outcome = session.state.tick();
        let pulse = outcome.events.iter().any(SessionEvent::is_pulse);
        for event in outcome.events {
            if self.shared.config.debug {
                info!("tick: {event:?}");
            } else {
                log_debug!("tick: {event:?}");
            }
            self.emit(event);
        }
        if pulse {
            self.shared.caps.haptics.pulse();
        }

        match outcome.transition {
            None => true,
            Some(StageTransition::CountdownFinished) => {
                let Some(config) = session.config else {
                    error!("Pre-roll finished without a session config");
                    return false;
                };
                self.begin_inner(&mut session, config).await;
                true
            }
            Some(StageTransition::Completed) => {
                self.finish_inner(&mut session, EndReason::Completed, true)
                    .await;
                false
            }
        }
    }

    fn acquire_keep_awake(&self, session: &mut ActiveSession) {
        if !session.keep_awake_held {
            self.shared.caps.keep_awake.acquire();
            session.keep_awake_held = true;
        }
    }

    fn release_keep_awake(&self, session: &mut ActiveSession) {
        if session.keep_awake_held {
            self.shared.caps.keep_awake.release();
            session.keep_awake_held = false;
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.shared.events.send(event);
    }
}

async fn start_media_task(
    audio: Arc<dyn MediaPlayer>,
    video: Arc<dyn MediaPlayer>,
    audio_path: PathBuf,
    video_path: PathBuf,
    fade: FadeIn,
    foreground: Arc<AtomicBool>,
) {
    let video_result = video
        .load(&video_path)
        .and_then(|_| video.set_volume(0.0))
        .and_then(|_| video.set_looping(true))
        .and_then(|_| {
            if foreground.load(Ordering::SeqCst) {
                video.play()
            } else {
                Ok(())
            }
        });
    if let Err(err) = video_result {
        error!("Failed to initialize video, continuing without it: {err:#}");
    }

    if let Err(err) = audio.load(&audio_path) {
        error!("Failed to initialize audio, continuing without it: {err:#}");
        return;
    }
    if let Err(err) = fade_in(&*audio, &fade).await {
        error!("Audio fade-in failed: {err:#}");
    }
}

fn play_player(player: &dyn MediaPlayer, label: &str) {
    if let Err(err) = player.play() {
        warn!("Failed to resume {label}: {err:#}");
    }
}

fn pause_player(player: &dyn MediaPlayer, label: &str) {
    if let Err(err) = player.pause() {
        warn!("Failed to pause {label}: {err:#}");
    }
}

fn stop_player(player: &dyn MediaPlayer, label: &str) {
    if let Err(err) = player.stop() {
        warn!("Failed to stop {label}: {err:#}");
    }
}
