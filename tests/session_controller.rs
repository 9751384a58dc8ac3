//! End-to-end session behavior on a paused tokio clock: ticking, pause and
//! resume, completion, the pre-roll, backgrounding and snapshot restore.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::Utc;
use quickcalm_lib::{
    breathing::BreathingPhase,
    config::AppConfig,
    lifecycle::{SessionSnapshot, SNAPSHOT_KEY},
    media::HeadlessPlayer,
    platform::{Haptics, HeadlessKeepAwake, HostState},
    store::{KeyValueStore, MemoryStore},
    timer::{Capabilities, EndReason, SessionController, SessionEvent, SessionStage},
};
use tokio::{sync::broadcast, time::sleep};

#[derive(Default)]
struct CountingHaptics {
    pulses: AtomicUsize,
}

impl CountingHaptics {
    fn count(&self) -> usize {
        self.pulses.load(Ordering::SeqCst)
    }
}

impl Haptics for CountingHaptics {
    fn pulse(&self) {
        self.pulses.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    controller: SessionController,
    events: broadcast::Receiver<SessionEvent>,
    audio: Arc<HeadlessPlayer>,
    video: Arc<HeadlessPlayer>,
    haptics: Arc<CountingHaptics>,
    keep_awake: Arc<HeadlessKeepAwake>,
    store: MemoryStore,
}

fn test_config() -> AppConfig {
    AppConfig {
        allowed_durations: vec![1, 3, 5, 10, 15],
        ..AppConfig::default()
    }
}

fn harness_with(config: AppConfig, audio: HeadlessPlayer, store: MemoryStore) -> Harness {
    let audio = Arc::new(audio);
    let video = Arc::new(HeadlessPlayer::new("video"));
    let haptics = Arc::new(CountingHaptics::default());
    let keep_awake = Arc::new(HeadlessKeepAwake::new());

    let caps = Capabilities {
        audio: audio.clone(),
        video: video.clone(),
        haptics: haptics.clone(),
        keep_awake: keep_awake.clone(),
        store: Arc::new(store.clone()),
    };
    let controller = SessionController::new(config, caps);
    let events = controller.subscribe();

    Harness {
        controller,
        events,
        audio,
        video,
        haptics,
        keep_awake,
        store,
    }
}

fn harness() -> Harness {
    harness_with(test_config(), HeadlessPlayer::new("audio"), MemoryStore::new())
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn ended(events: &[SessionEvent]) -> Vec<EndReason> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::SessionEnded { reason, .. } => Some(*reason),
            _ => None,
        })
        .collect()
}

fn breathing_snapshot(
    remaining: u32,
    phase: BreathingPhase,
    phase_remaining: u32,
    age: chrono::Duration,
) -> SessionSnapshot {
    SessionSnapshot {
        remaining_seconds: remaining,
        current_phase: phase,
        phase_remaining_seconds: phase_remaining,
        is_paused: false,
        is_in_countdown: false,
        countdown_seconds: 0,
        is_session_active: true,
        cycle_count: 3,
        duration: 5,
        timestamp: Utc::now() - age,
    }
}

fn snapshot(
    remaining: u32,
    phase: BreathingPhase,
    phase_remaining: u32,
    age: chrono::Duration,
) -> String {
    serde_json::to_string(&breathing_snapshot(remaining, phase, phase_remaining, age)).unwrap()
}

async fn store_holding(snapshot: &SessionSnapshot) -> MemoryStore {
    let store = MemoryStore::new();
    store
        .set(SNAPSHOT_KEY, serde_json::to_string(snapshot).unwrap())
        .await
        .unwrap();
    store
}

#[tokio::test(start_paused = true)]
async fn begin_runs_breathing_phases_off_one_clock() {
    let mut h = harness();
    let config = h.controller.session_config(5).unwrap();

    let view = h.controller.begin(config).await.unwrap();
    assert_eq!(view.stage, SessionStage::Breathing);
    assert_eq!(view.remaining_seconds, 300);
    assert_eq!(view.current_phase, BreathingPhase::Inhale);
    assert_eq!(view.phase_remaining_seconds, 4);
    assert!(view.is_active);
    assert!(h.keep_awake.is_held());

    let started = drain(&mut h.events);
    assert!(matches!(
        started[0],
        SessionEvent::SessionStarted { total_seconds: 300, .. }
    ));
    assert_eq!(started[1], SessionEvent::phase_changed(BreathingPhase::Inhale));

    sleep(Duration::from_millis(4_500)).await;

    let view = h.controller.get_state().await;
    assert_eq!(view.remaining_seconds, 296);
    assert_eq!(view.current_phase, BreathingPhase::Hold);
    assert_eq!(view.phase_remaining_seconds, 7);
    // One pulse at start, one per elapsed second.
    assert_eq!(h.haptics.count(), 5);

    let events = drain(&mut h.events);
    assert!(events.contains(&SessionEvent::Tick { remaining_seconds: 296 }));
    assert!(events.contains(&SessionEvent::phase_changed(BreathingPhase::Hold)));

    let audio = h.audio.state();
    assert!(audio.playing);
    assert!(audio.looping);
    assert!((audio.volume - 0.55).abs() < 1e-6);
    assert!(h.video.state().playing);
}

#[tokio::test(start_paused = true)]
async fn pause_freezes_phase_and_resume_continues_from_it() {
    let mut h = harness();
    let config = h.controller.session_config(5).unwrap();
    h.controller.begin(config).await.unwrap();

    // Inhale takes 4s, then 4 more seconds into the 7s hold.
    sleep(Duration::from_millis(8_500)).await;
    let view = h.controller.pause().await;
    assert!(view.is_paused);
    assert_eq!(view.current_phase, BreathingPhase::Hold);
    assert_eq!(view.phase_remaining_seconds, 3);
    assert_eq!(view.remaining_seconds, 292);
    assert!(!h.audio.state().playing);
    assert!(!h.video.state().playing);

    sleep(Duration::from_secs(100)).await;
    let view = h.controller.get_state().await;
    assert_eq!(view.phase_remaining_seconds, 3);
    assert_eq!(view.remaining_seconds, 292);

    drain(&mut h.events);
    let view = h.controller.resume().await;
    assert!(!view.is_paused);
    assert_eq!(view.phase_remaining_seconds, 3);
    assert!(h.audio.state().playing);
    assert!(h.video.state().playing);

    sleep(Duration::from_millis(1_500)).await;
    let view = h.controller.get_state().await;
    assert_eq!(view.current_phase, BreathingPhase::Hold);
    assert_eq!(view.phase_remaining_seconds, 2);
    assert_eq!(view.remaining_seconds, 291);
    assert_eq!(drain(&mut h.events)[0], SessionEvent::Resumed);
}

#[tokio::test(start_paused = true)]
async fn pause_and_resume_are_idempotent() {
    let mut h = harness();

    let view = h.controller.pause().await;
    assert!(!view.is_paused);
    assert!(!view.is_active);
    assert!(drain(&mut h.events).is_empty());

    let config = h.controller.session_config(5).unwrap();
    h.controller.begin(config).await.unwrap();
    drain(&mut h.events);

    h.controller.pause().await;
    h.controller.pause().await;
    h.controller.resume().await;
    h.controller.resume().await;

    assert_eq!(
        drain(&mut h.events),
        vec![SessionEvent::Paused, SessionEvent::Resumed]
    );
}

#[tokio::test(start_paused = true)]
async fn pause_during_fade_in_restarts_media_on_resume() {
    let h = harness();
    let config = h.controller.session_config(5).unwrap();
    h.controller.begin(config).await.unwrap();

    sleep(Duration::from_millis(500)).await;
    h.controller.pause().await;
    let audio = h.audio.state();
    assert!(!audio.playing);
    assert!(audio.stopped);

    h.controller.resume().await;
    sleep(Duration::from_millis(2_000)).await;
    let audio = h.audio.state();
    assert!(audio.playing);
    assert!((audio.volume - 0.55).abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn completion_ends_once_and_releases_resources() {
    let mut h = harness();
    let config = h.controller.session_config(1).unwrap();
    h.controller.begin(config).await.unwrap();

    // A background snapshot exists until the session ends.
    sleep(Duration::from_millis(10_500)).await;
    h.controller.handle_host_state(HostState::Background).await;
    h.controller.handle_host_state(HostState::Active).await;
    assert!(!h.store.is_empty());

    sleep(Duration::from_secs(50)).await;
    let view = h.controller.get_state().await;
    assert_eq!(view.stage, SessionStage::Ended);
    assert_eq!(view.remaining_seconds, 0);
    assert!(!view.is_active);
    assert!(!h.keep_awake.is_held());
    assert!(h.store.is_empty());

    let events = drain(&mut h.events);
    assert_eq!(ended(&events), vec![EndReason::Completed]);
    assert!(events.contains(&SessionEvent::Tick { remaining_seconds: 0 }));

    sleep(Duration::from_secs(10)).await;
    assert!(drain(&mut h.events).is_empty());
    assert_eq!(h.controller.get_state().await, view);
    assert!(h.audio.state().stopped);
    assert!(h.video.state().stopped);
}

#[tokio::test(start_paused = true)]
async fn finish_early_stops_the_clock() {
    let mut h = harness();
    let config = h.controller.session_config(5).unwrap();
    h.controller.begin(config).await.unwrap();

    sleep(Duration::from_millis(2_500)).await;
    let view = h.controller.finish_early().await.unwrap();
    assert_eq!(view.stage, SessionStage::Ended);
    assert_eq!(view.remaining_seconds, 298);
    assert!(!h.keep_awake.is_held());
    assert_eq!(ended(&drain(&mut h.events)), vec![EndReason::FinishedEarly]);

    assert!(h.controller.finish_early().await.is_err());

    sleep(Duration::from_secs(5)).await;
    assert_eq!(h.controller.get_state().await.remaining_seconds, 298);
    assert!(drain(&mut h.events).is_empty());
    let audio = h.audio.state();
    assert!(audio.stopped);
    assert!(audio.volume < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn countdown_runs_before_session_starts() {
    let mut h = harness();
    let config = h.controller.session_config(5).unwrap();

    let view = h.controller.start_countdown_then_session(config).await.unwrap();
    assert_eq!(view.stage, SessionStage::Countdown);
    assert!(view.is_in_countdown);
    assert_eq!(view.countdown_seconds, 3);
    assert_eq!(view.remaining_seconds, 300);
    assert!(h.keep_awake.is_held());

    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(h.controller.get_state().await.countdown_seconds, 2);
    assert_eq!(h.audio.state().resource, None);

    sleep(Duration::from_secs(2)).await;
    let view = h.controller.get_state().await;
    assert_eq!(view.stage, SessionStage::Breathing);
    assert!(!view.is_in_countdown);
    assert_eq!(view.remaining_seconds, 300);
    assert_eq!(view.current_phase, BreathingPhase::Inhale);
    assert_eq!(h.haptics.count(), 3);

    let events = drain(&mut h.events);
    let countdown: Vec<u32> = events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::CountdownTick { seconds_left } => Some(*seconds_left),
            _ => None,
        })
        .collect();
    assert_eq!(countdown, vec![3, 2, 1, 0]);
    assert!(matches!(events[4], SessionEvent::SessionStarted { .. }));
    assert_eq!(events[5], SessionEvent::phase_changed(BreathingPhase::Inhale));
}

#[tokio::test(start_paused = true)]
async fn paused_countdown_holds_its_place() {
    let h = harness();
    let config = h.controller.session_config(5).unwrap();
    h.controller.start_countdown_then_session(config).await.unwrap();

    sleep(Duration::from_millis(1_500)).await;
    h.controller.pause().await;
    sleep(Duration::from_secs(10)).await;
    assert_eq!(h.controller.get_state().await.countdown_seconds, 2);

    h.controller.resume().await;
    sleep(Duration::from_millis(2_500)).await;
    assert_eq!(
        h.controller.get_state().await.stage,
        SessionStage::Breathing
    );
}

#[tokio::test(start_paused = true)]
async fn background_keeps_audio_and_timer_running() {
    let h = harness();
    let config = h.controller.session_config(5).unwrap();
    h.controller.begin(config).await.unwrap();
    sleep(Duration::from_millis(2_500)).await;

    h.controller.handle_host_state(HostState::Background).await;
    assert!(!h.video.state().playing);
    assert!(h.audio.state().playing);

    let raw = h.store.get(SNAPSHOT_KEY).await.unwrap().unwrap();
    let saved: SessionSnapshot = serde_json::from_str(&raw).unwrap();
    assert_eq!(saved.duration, 5);
    assert_eq!(saved.remaining_seconds, 298);
    assert!(saved.is_session_active);
    assert!(!saved.is_paused);

    sleep(Duration::from_secs(3)).await;
    let view = h.controller.get_state().await;
    assert_eq!(view.remaining_seconds, 295);
    assert!(!view.is_paused);
    assert_eq!(view.host_state, HostState::Background);

    h.controller.handle_host_state(HostState::Active).await;
    let view = h.controller.get_state().await;
    assert_eq!(view.host_state, HostState::Active);
    assert!(h.video.state().playing);
}

#[tokio::test(start_paused = true)]
async fn backgrounding_before_media_starts_keeps_video_hidden() {
    let h = harness();
    let config = h.controller.session_config(5).unwrap();
    h.controller.begin(config).await.unwrap();
    h.controller.handle_host_state(HostState::Background).await;

    sleep(Duration::from_millis(2_500)).await;
    let video = h.video.state();
    assert!(video.resource.is_some());
    assert!(!video.playing);
    assert!(h.audio.state().playing);
    assert_eq!(h.controller.get_state().await.remaining_seconds, 298);

    h.controller.handle_host_state(HostState::Active).await;
    assert!(h.video.state().playing);
}

#[tokio::test(start_paused = true)]
async fn recent_snapshot_is_adopted_verbatim() {
    let store = MemoryStore::new();
    store
        .set(
            SNAPSHOT_KEY,
            snapshot(200, BreathingPhase::Exhale, 5, chrono::Duration::minutes(2)),
        )
        .await
        .unwrap();
    let mut h = harness_with(test_config(), HeadlessPlayer::new("audio"), store);
    let config = h.controller.session_config(5).unwrap();

    let view = h.controller.start_countdown_then_session(config).await.unwrap();
    assert_eq!(view.stage, SessionStage::Breathing);
    assert!(!view.is_in_countdown);
    assert_eq!(view.remaining_seconds, 200);
    assert_eq!(view.current_phase, BreathingPhase::Exhale);
    assert_eq!(view.phase_remaining_seconds, 5);
    assert_eq!(view.cycle_count, 3);
    assert!(h.keep_awake.is_held());
    assert_eq!(
        drain(&mut h.events)[0],
        SessionEvent::Restored {
            remaining_seconds: 200,
            phase: BreathingPhase::Exhale,
        }
    );

    sleep(Duration::from_millis(1_500)).await;
    let view = h.controller.get_state().await;
    assert_eq!(view.remaining_seconds, 199);
    assert_eq!(view.phase_remaining_seconds, 4);
}

#[tokio::test(start_paused = true)]
async fn stale_snapshot_starts_fresh() {
    let store = MemoryStore::new();
    store
        .set(
            SNAPSHOT_KEY,
            snapshot(200, BreathingPhase::Exhale, 5, chrono::Duration::minutes(10)),
        )
        .await
        .unwrap();
    let h = harness_with(test_config(), HeadlessPlayer::new("audio"), store);
    let config = h.controller.session_config(5).unwrap();

    let view = h.controller.start_countdown_then_session(config).await.unwrap();
    assert!(view.is_in_countdown);
    assert_eq!(view.remaining_seconds, 300);
    assert!(h.store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn snapshot_taken_mid_countdown_continues_the_countdown() {
    let saved = SessionSnapshot {
        is_in_countdown: true,
        countdown_seconds: 2,
        is_session_active: false,
        cycle_count: 0,
        ..breathing_snapshot(300, BreathingPhase::Inhale, 4, chrono::Duration::seconds(20))
    };
    let store = store_holding(&saved).await;
    let mut h = harness_with(test_config(), HeadlessPlayer::new("audio"), store);
    let config = h.controller.session_config(5).unwrap();

    let view = h.controller.start_countdown_then_session(config).await.unwrap();
    assert_eq!(view.stage, SessionStage::Countdown);
    assert!(view.is_in_countdown);
    assert_eq!(view.countdown_seconds, 2);
    assert!(h.keep_awake.is_held());
    assert!(matches!(
        drain(&mut h.events)[0],
        SessionEvent::Restored { remaining_seconds: 300, .. }
    ));

    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(h.controller.get_state().await.countdown_seconds, 1);
    assert_eq!(h.audio.state().resource, None);

    sleep(Duration::from_secs(1)).await;
    let view = h.controller.get_state().await;
    assert_eq!(view.stage, SessionStage::Breathing);
    assert_eq!(view.remaining_seconds, 300);
    assert_eq!(view.current_phase, BreathingPhase::Inhale);

    let events = drain(&mut h.events);
    assert_eq!(events[0], SessionEvent::CountdownTick { seconds_left: 1 });
    assert_eq!(events[1], SessionEvent::CountdownTick { seconds_left: 0 });
    assert!(matches!(events[2], SessionEvent::SessionStarted { .. }));
}

#[tokio::test(start_paused = true)]
async fn paused_snapshot_waits_for_resume() {
    let saved = SessionSnapshot {
        is_paused: true,
        ..breathing_snapshot(200, BreathingPhase::Exhale, 5, chrono::Duration::minutes(1))
    };
    let store = store_holding(&saved).await;
    let mut h = harness_with(test_config(), HeadlessPlayer::new("audio"), store);
    let config = h.controller.session_config(5).unwrap();

    let view = h.controller.start_countdown_then_session(config).await.unwrap();
    assert_eq!(view.stage, SessionStage::Breathing);
    assert!(view.is_paused);
    assert_eq!(view.remaining_seconds, 200);

    sleep(Duration::from_secs(5)).await;
    let view = h.controller.get_state().await;
    assert_eq!(view.remaining_seconds, 200);
    assert_eq!(view.phase_remaining_seconds, 5);
    assert_eq!(h.audio.state().resource, None);
    assert!(!h.audio.state().playing);
    drain(&mut h.events);

    let view = h.controller.resume().await;
    assert!(!view.is_paused);
    assert_eq!(drain(&mut h.events), vec![SessionEvent::Resumed]);

    sleep(Duration::from_millis(2_500)).await;
    let view = h.controller.get_state().await;
    assert_eq!(view.remaining_seconds, 198);
    assert_eq!(view.current_phase, BreathingPhase::Exhale);
    assert_eq!(view.phase_remaining_seconds, 3);
    let audio = h.audio.state();
    assert!(audio.playing);
    assert!((audio.volume - 0.55).abs() < 1e-6);
    assert!(h.video.state().playing);
}

#[tokio::test(start_paused = true)]
async fn restored_last_second_completes_once() {
    let store = MemoryStore::new();
    store
        .set(
            SNAPSHOT_KEY,
            snapshot(1, BreathingPhase::Inhale, 2, chrono::Duration::seconds(30)),
        )
        .await
        .unwrap();
    let mut h = harness_with(test_config(), HeadlessPlayer::new("audio"), store);
    let config = h.controller.session_config(5).unwrap();
    h.controller.start_countdown_then_session(config).await.unwrap();

    sleep(Duration::from_secs(5)).await;
    let view = h.controller.get_state().await;
    assert_eq!(view.stage, SessionStage::Ended);
    assert_eq!(ended(&drain(&mut h.events)), vec![EndReason::Completed]);
    assert!(h.store.is_empty());
    assert!(!h.keep_awake.is_held());
}

#[tokio::test(start_paused = true)]
async fn missing_media_does_not_hold_up_the_timer() {
    let config = AppConfig {
        audio_path: "/nonexistent/quickcalm/music.mp3".into(),
        ..test_config()
    };
    let h = harness_with(
        config,
        HeadlessPlayer::new("audio").requiring_existing_files(),
        MemoryStore::new(),
    );
    let session = h.controller.session_config(5).unwrap();
    h.controller.begin(session).await.unwrap();

    sleep(Duration::from_millis(2_500)).await;
    assert_eq!(h.controller.get_state().await.remaining_seconds, 298);
    let audio = h.audio.state();
    assert_eq!(audio.resource, None);
    assert!(!audio.playing);
}

#[tokio::test(start_paused = true)]
async fn rejects_bad_requests() {
    let h = harness();
    assert!(h.controller.session_config(7).is_err());
    assert!(h.controller.finish_early().await.is_err());

    let config = h.controller.session_config(5).unwrap();
    h.controller.begin(config).await.unwrap();
    assert!(h.controller.begin(config).await.is_err());
    assert!(h
        .controller
        .start_countdown_then_session(config)
        .await
        .is_err());
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_everything() {
    let mut h = harness();
    let config = h.controller.session_config(5).unwrap();
    h.controller.begin(config).await.unwrap();
    sleep(Duration::from_millis(2_500)).await;

    h.controller.shutdown().await;
    assert!(!h.keep_awake.is_held());
    assert!(h.audio.state().stopped);
    assert!(h.video.state().stopped);
    drain(&mut h.events);

    sleep(Duration::from_secs(5)).await;
    assert!(drain(&mut h.events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_controller_tears_down() {
    let h = harness();
    let config = h.controller.session_config(5).unwrap();
    h.controller.begin(config).await.unwrap();
    sleep(Duration::from_millis(2_500)).await;
    assert!(h.keep_awake.is_held());

    let Harness {
        controller,
        audio,
        keep_awake,
        ..
    } = h;
    drop(controller);

    assert!(!keep_awake.is_held());
    assert!(audio.state().stopped);
}

#[tokio::test(start_paused = true)]
async fn dropping_during_fade_out_stops_audio() {
    let h = harness();
    let config = h.controller.session_config(5).unwrap();
    h.controller.begin(config).await.unwrap();
    sleep(Duration::from_millis(2_500)).await;

    h.controller.finish_early().await.unwrap();
    sleep(Duration::from_millis(300)).await;
    assert!(h.audio.state().playing);

    let Harness {
        controller, audio, ..
    } = h;
    drop(controller);

    let stopped = audio.state();
    assert!(stopped.stopped);
    assert!(!stopped.playing);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(audio.state(), stopped);
}
