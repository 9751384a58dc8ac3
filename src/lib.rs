pub mod breathing;
pub mod config;
pub mod db;
pub mod lifecycle;
pub mod media;
pub mod platform;
pub mod quotes;
pub mod store;
pub mod timer;
mod utils;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use log::{info, warn};
use tokio::sync::broadcast::error::RecvError;

use config::AppConfig;
use db::Database;
use media::default_audio_player;
use store::{KeyValueStore, MemoryStore};
use timer::{Capabilities, SessionController, SessionEvent};

// Event echo from the headless runner.
const ENABLE_LOGS: bool = true;

/// Headless host: runs one session with the configured duration, logging
/// every event, and prints a closing quote when it ends.
///
/// Ctrl-C finishes the session early. On unix, `SIGUSR1` toggles pause and
/// `SIGUSR2` toggles between foreground and background.
pub async fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("QuickCalm starting up...");

    let config = AppConfig::from_env()?;

    let store: Arc<dyn KeyValueStore> = match Database::new(config.store_path.clone()) {
        Ok(database) => Arc::new(database),
        Err(err) => {
            warn!("Session store unavailable, snapshots stay in memory: {err:#}");
            Arc::new(MemoryStore::new())
        }
    };

    let caps = Capabilities::headless(default_audio_player(), store);
    let controller = SessionController::new(config.clone(), caps);
    let session_config = controller.session_config(config.default_duration)?;

    let mut events = controller.subscribe();
    #[cfg(unix)]
    spawn_host_signals(controller.clone())?;

    controller
        .start_countdown_then_session(session_config)
        .await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::SessionEnded { session_id, reason, cycle_count }) => {
                    info!("Session {session_id} ended ({reason:?}), {cycle_count} breathing cycles");
                    break;
                }
                Ok(event) => {
                    log_info!("{}", serde_json::to_string(&event)?);
                }
                Err(RecvError::Lagged(skipped)) => warn!("Event log fell behind by {skipped} events"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, finishing session early");
                if let Err(err) = controller.finish_early().await {
                    warn!("{err:#}");
                    break;
                }
            }
        }
    }

    info!("{}", quotes::random_quote(&mut rand::thread_rng()));

    // Let the audio fade-out play before tearing everything down.
    tokio::time::sleep(Duration::from_millis(config.fade_out.duration_ms)).await;
    controller.shutdown().await;
    Ok(())
}

#[cfg(unix)]
fn spawn_host_signals(controller: SessionController) -> Result<()> {
    use platform::HostState;
    use tokio::signal::unix::{signal, SignalKind};

    let mut toggle_pause = signal(SignalKind::user_defined1())?;
    let mut toggle_background = signal(SignalKind::user_defined2())?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(()) = toggle_pause.recv() => {
                    if controller.get_state().await.is_paused {
                        controller.resume().await;
                    } else {
                        controller.pause().await;
                    }
                }
                Some(()) = toggle_background.recv() => {
                    let next = if controller.get_state().await.host_state.is_foreground() {
                        HostState::Background
                    } else {
                        HostState::Active
                    };
                    controller.handle_host_state(next).await;
                }
                else => break,
            }
        }
    });

    Ok(())
}
