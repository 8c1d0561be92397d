pub mod pink_noise;
pub mod wake_voice;

pub use wake_voice::{SynthParams, SynthTargets, WakeVoice};

use rodio::{OutputStream, Sink};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Output-context collaborator for the wake engine.
///
/// `ensure_ready` must be cheap and idempotent: callers invoke it once after a
/// user interaction and the engine invokes it again on every `start`.
pub trait SoundOutput: Send + Sync {
    fn ensure_ready(&self) -> Result<(), String>;

    /// Begin continuous synthesis from silence.
    fn begin_voice(&self) -> Result<(), String>;

    /// Move the running voice toward new targets.
    fn apply(&self, targets: SynthTargets);

    /// Tear the voice down. Safe to call when nothing is playing.
    fn end_voice(&self);
}

/// Output that accepts everything and plays nothing, for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentOutput;

impl SoundOutput for SilentOutput {
    fn ensure_ready(&self) -> Result<(), String> {
        Ok(())
    }

    fn begin_voice(&self) -> Result<(), String> {
        Ok(())
    }

    fn apply(&self, _targets: SynthTargets) {}

    fn end_voice(&self) {}
}

enum AudioCommand {
    EnsureReady(Sender<Result<(), String>>),
    BeginVoice,
    EndVoice,
}

/// Handle to the dedicated audio thread.
///
/// rodio's output stream is not `Send`, so the device lives on its own thread
/// and is driven through a command channel. Synthesis targets bypass the
/// channel and go straight into the shared [`SynthParams`].
pub struct AudioEngineHandle {
    tx: Arc<Mutex<Option<Sender<AudioCommand>>>>,
    params: Arc<SynthParams>,
    ready: Arc<AtomicBool>,
}

impl Default for AudioEngineHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngineHandle {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
            params: Arc::new(SynthParams::new(SynthTargets::SILENT)),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>, String> {
        if let Some(tx) = self.tx.lock().map_err(|e| e.to_string())?.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();
        let params = Arc::clone(&self.params);
        let ready = Arc::clone(&self.ready);

        // Spawn dedicated audio thread holding non-Send audio objects
        thread::Builder::new()
            .name("softwake-audio".to_string())
            .spawn(move || {
                let mut stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;

                fn ensure_sink(
                    stream: &mut Option<OutputStream>,
                    sink: &mut Option<Sink>,
                ) -> Result<(), String> {
                    if sink.is_none() {
                        let (s, handle) = OutputStream::try_default()
                            .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
                        let new_sink = Sink::try_new(&handle)
                            .map_err(|e| format!("Failed to create audio sink: {}", e))?;
                        *stream = Some(s);
                        *sink = Some(new_sink);
                    }
                    Ok(())
                }

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::EnsureReady(reply) => {
                            let result = ensure_sink(&mut stream, &mut sink);
                            ready.store(result.is_ok(), Ordering::SeqCst);
                            let _ = reply.send(result);
                        }
                        AudioCommand::BeginVoice => {
                            // Replace whatever was queued; the stream stays open.
                            if let Some(old) = sink.take() {
                                old.stop();
                            }
                            match ensure_sink(&mut stream, &mut sink) {
                                Ok(()) => {
                                    params.store(SynthTargets::SILENT);
                                    if let Some(ref s) = sink {
                                        s.append(WakeVoice::new(Arc::clone(&params)));
                                        s.play();
                                    }
                                    log_debug!("wake voice appended");
                                }
                                Err(err) => {
                                    ready.store(false, Ordering::SeqCst);
                                    log_warn!("wake voice unavailable: {}", err);
                                }
                            }
                        }
                        AudioCommand::EndVoice => {
                            if let Some(old) = sink.take() {
                                old.stop();
                            }
                            params.store(SynthTargets::SILENT);
                        }
                    }
                }

                log_info!("audio thread exiting");
            })
            .map_err(|e| e.to_string())?;

        let tx_clone = tx.clone();
        *self.tx.lock().map_err(|e| e.to_string())? = Some(tx);
        Ok(tx_clone)
    }
}

impl SoundOutput for AudioEngineHandle {
    fn ensure_ready(&self) -> Result<(), String> {
        if self.ready.load(Ordering::SeqCst) {
            return Ok(());
        }

        let tx = self.ensure_thread()?;
        let (reply_tx, reply_rx) = mpsc::channel();
        tx.send(AudioCommand::EnsureReady(reply_tx))
            .map_err(|e| e.to_string())?;
        reply_rx.recv().map_err(|e| e.to_string())?
    }

    fn begin_voice(&self) -> Result<(), String> {
        let tx = self.ensure_thread()?;
        tx.send(AudioCommand::BeginVoice).map_err(|e| e.to_string())
    }

    fn apply(&self, targets: SynthTargets) {
        self.params.store(targets);
    }

    fn end_voice(&self) {
        if let Ok(Some(tx)) = self.tx.lock().map(|g| g.clone()) {
            let _ = tx.send(AudioCommand::EndVoice);
        }
    }
}
