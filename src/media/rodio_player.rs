use std::{
    io::Cursor,
    path::Path,
    sync::{
        mpsc::{self, Sender},
        Arc, Mutex,
    },
    thread,
};

use anyhow::{anyhow, Context, Result};
use log::error;
use rodio::{Decoder, OutputStream, Sink};

use super::MediaPlayer;

enum AudioCommand {
    Load(Arc<Vec<u8>>),
    Play,
    Pause,
    Stop,
    SetVolume(f32),
    SetLooping(bool),
}

/// Audio output through a rodio sink. The output stream is not `Send`, so it
/// lives on a dedicated thread that receives commands over a channel.
pub struct RodioPlayer {
    tx: Arc<Mutex<Option<Sender<AudioCommand>>>>,
}

impl Default for RodioPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl RodioPlayer {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>> {
        let mut guard = self
            .tx
            .lock()
            .map_err(|_| anyhow!("audio command channel poisoned"))?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();

        thread::Builder::new()
            .name("quickcalm-audio".to_string())
            .spawn(move || {
                let mut _stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;
                let mut source: Option<Arc<Vec<u8>>> = None;
                let mut looping = false;
                let mut volume = 1.0_f32;

                fn ensure_sink(
                    stream: &mut Option<OutputStream>,
                    sink: &mut Option<Sink>,
                    volume: f32,
                ) -> Result<(), String> {
                    if sink.is_none() {
                        let (s, handle) = OutputStream::try_default()
                            .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
                        let new_sink = Sink::try_new(&handle)
                            .map_err(|e| format!("Failed to create audio sink: {}", e))?;
                        new_sink.set_volume(volume);
                        *stream = Some(s);
                        *sink = Some(new_sink);
                    }
                    Ok(())
                }

                fn append_source(sink: &Sink, bytes: &Arc<Vec<u8>>, looping: bool) -> Result<(), String> {
                    let cursor = Cursor::new(bytes.as_ref().clone());
                    if looping {
                        let decoder = Decoder::new_looped(cursor).map_err(|e| e.to_string())?;
                        sink.append(decoder);
                    } else {
                        let decoder = Decoder::new(cursor).map_err(|e| e.to_string())?;
                        sink.append(decoder);
                    }
                    Ok(())
                }

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::Load(bytes) => {
                            if let Some(s_old) = sink.take() {
                                s_old.stop();
                            }
                            _stream = None;
                            source = Some(bytes);
                        }
                        AudioCommand::Play => {
                            if let Err(err) = ensure_sink(&mut _stream, &mut sink, volume) {
                                error!("{err}");
                                continue;
                            }
                            if let Some(ref s) = sink {
                                if s.empty() {
                                    if let Some(ref bytes) = source {
                                        if let Err(err) = append_source(s, bytes, looping) {
                                            error!("Failed to decode audio: {err}");
                                        }
                                    }
                                }
                                s.play();
                            }
                        }
                        AudioCommand::Pause => {
                            if let Some(ref s) = sink {
                                s.pause();
                            }
                        }
                        AudioCommand::Stop => {
                            if let Some(s_old) = sink.take() {
                                s_old.stop();
                            }
                            _stream = None;
                        }
                        AudioCommand::SetVolume(v) => {
                            volume = v.clamp(0.0, 1.0);
                            if let Some(ref s) = sink {
                                s.set_volume(volume);
                            }
                        }
                        AudioCommand::SetLooping(value) => {
                            looping = value;
                        }
                    }
                }
            })
            .context("failed to spawn audio thread")?;

        *guard = Some(tx.clone());
        Ok(tx)
    }

    fn send(&self, command: AudioCommand) -> Result<()> {
        let tx = self.ensure_thread()?;
        tx.send(command)
            .map_err(|_| anyhow!("audio thread is no longer running"))
    }
}

impl MediaPlayer for RodioPlayer {
    fn load(&self, resource: &Path) -> Result<()> {
        let bytes = std::fs::read(resource)
            .with_context(|| format!("failed to read audio {}", resource.display()))?;
        // Probe on the caller's thread so bad files surface as an error here.
        Decoder::new(Cursor::new(bytes.clone()))
            .with_context(|| format!("unsupported audio format in {}", resource.display()))?;
        self.send(AudioCommand::Load(Arc::new(bytes)))
    }

    fn play(&self) -> Result<()> {
        self.send(AudioCommand::Play)
    }

    fn pause(&self) -> Result<()> {
        self.send(AudioCommand::Pause)
    }

    fn stop(&self) -> Result<()> {
        if let Ok(Some(tx)) = self.tx.lock().map(|g| g.clone()) {
            let _ = tx.send(AudioCommand::Stop);
        }
        Ok(())
    }

    fn set_volume(&self, volume: f32) -> Result<()> {
        self.send(AudioCommand::SetVolume(volume))
    }

    fn set_looping(&self, looping: bool) -> Result<()> {
        self.send(AudioCommand::SetLooping(looping))
    }
}
