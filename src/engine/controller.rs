use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::Utc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::audio::SoundOutput;

use super::phase::{
    fraction_complete, format_remaining, targets_at, WakePhase, TOTAL_DURATION_SECS,
};
use super::state::{ActiveSession, WakeSnapshot, WakeState};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(60);

type ProgressFn = Arc<dyn Fn(f64, &str) + Send + Sync>;
type PhaseFn = Arc<dyn Fn(WakePhase) + Send + Sync>;
type StopFn = Arc<dyn Fn() + Send + Sync>;

/// One slot per event; registering again replaces the previous callback.
#[derive(Default)]
struct Callbacks {
    progress: Option<ProgressFn>,
    phase: Option<PhaseFn>,
    stop: Option<StopFn>,
}

struct EngineInner {
    state: Mutex<WakeState>,
    callbacks: Mutex<Callbacks>,
    output: Arc<dyn SoundOutput>,
    tick_interval: Duration,
}

/// Drives one five-minute wake session at a time.
///
/// `start` and `stop` are synchronous so they can be called from anywhere,
/// including from inside the progress, phase and stop callbacks. `start` must
/// be called from within a tokio runtime since it spawns the tick loop.
#[derive(Clone)]
pub struct WakeEngine {
    inner: Arc<EngineInner>,
}

impl WakeEngine {
    pub fn new(output: Arc<dyn SoundOutput>) -> Self {
        Self::with_tick_interval(output, DEFAULT_TICK_INTERVAL)
    }

    pub fn with_tick_interval(output: Arc<dyn SoundOutput>, tick_interval: Duration) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                state: Mutex::new(WakeState::Idle),
                callbacks: Mutex::new(Callbacks::default()),
                output,
                tick_interval,
            }),
        }
    }

    /// Create or resume the output context. Cheap after the first success.
    pub fn ensure_context(&self) -> Result<(), String> {
        self.inner.output.ensure_ready()
    }

    /// Begin a session. Returns `false` without side effects if one is
    /// already active.
    ///
    /// An unavailable output context does not prevent the session: the
    /// timeline still runs, silently.
    pub fn start(&self) -> bool {
        let cancel = {
            let mut state = self.inner.lock_state();
            if state.is_active() {
                return false;
            }

            if let Err(err) = self.inner.output.ensure_ready() {
                log_warn!("output context unavailable, session will be silent: {}", err);
            }
            if let Err(err) = self.inner.output.begin_voice() {
                log_warn!("failed to begin wake voice: {}", err);
            }

            let session = ActiveSession::new(Uuid::new_v4().to_string(), Utc::now(), Instant::now());
            log_info!("wake session {} started", session.session_id);
            let cancel = session.cancel_token();
            *state = WakeState::Active(session);
            cancel
        };

        tokio::spawn(tick_loop(Arc::clone(&self.inner), cancel));
        true
    }

    /// Tear the session down. Returns `false`, and skips the stop callback,
    /// when nothing was playing.
    pub fn stop(&self) -> bool {
        self.inner.teardown("stopped")
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock_state().is_active()
    }

    pub fn snapshot(&self) -> Option<WakeSnapshot> {
        self.inner.lock_state().session().map(ActiveSession::snapshot)
    }

    pub fn on_progress<F>(&self, callback: F)
    where
        F: Fn(f64, &str) + Send + Sync + 'static,
    {
        self.inner.lock_callbacks().progress = Some(Arc::new(callback));
    }

    pub fn on_phase<F>(&self, callback: F)
    where
        F: Fn(WakePhase) + Send + Sync + 'static,
    {
        self.inner.lock_callbacks().phase = Some(Arc::new(callback));
    }

    pub fn on_stop<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.lock_callbacks().stop = Some(Arc::new(callback));
    }
}

impl EngineInner {
    fn lock_state(&self) -> MutexGuard<'_, WakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_callbacks(&self) -> MutexGuard<'_, Callbacks> {
        match self.callbacks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn teardown(&self, reason: &str) -> bool {
        let session = {
            let mut state = self.lock_state();
            match state.take() {
                Some(session) => {
                    // Clear the ticker before anything else so a late tick
                    // cannot touch a voice that is being torn down.
                    session.cancel_ticker();
                    session
                }
                None => return false,
            }
        };

        self.output.end_voice();
        log_info!(
            "wake session {} {} after {:.1}s",
            session.session_id,
            reason,
            session.elapsed_secs()
        );

        let on_stop = self.lock_callbacks().stop.clone();
        if let Some(callback) = on_stop {
            callback();
        }
        true
    }

    /// One re-evaluation. Returns `false` once the loop should exit.
    fn tick(&self) -> bool {
        let elapsed = {
            let state = self.lock_state();
            let Some(session) = state.session() else {
                return false;
            };
            let elapsed = session.elapsed_secs();
            if elapsed < TOTAL_DURATION_SECS {
                self.output.apply(targets_at(elapsed));
            }
            elapsed
        };

        if elapsed >= TOTAL_DURATION_SECS {
            self.teardown("completed");
            return false;
        }

        let phase = WakePhase::at(elapsed);
        let remaining = format_remaining(elapsed);
        log_debug!("tick {:.2}s phase={} remaining={}", elapsed, phase.as_str(), remaining);

        let (on_phase, on_progress) = {
            let callbacks = self.lock_callbacks();
            (callbacks.phase.clone(), callbacks.progress.clone())
        };
        if let Some(callback) = on_phase {
            callback(phase);
        }
        if let Some(callback) = on_progress {
            callback(fraction_complete(elapsed), &remaining);
        }
        true
    }
}

async fn tick_loop(inner: Arc<EngineInner>, cancel: CancellationToken) {
    let mut interval = time::interval(inner.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if cancel.is_cancelled() || !inner.tick() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SynthTargets;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingOutput {
        fail_ready: AtomicBool,
        begun: AtomicUsize,
        ended: AtomicUsize,
        applied: Mutex<Vec<SynthTargets>>,
    }

    impl SoundOutput for RecordingOutput {
        fn ensure_ready(&self) -> Result<(), String> {
            if self.fail_ready.load(Ordering::SeqCst) {
                Err("no user gesture yet".into())
            } else {
                Ok(())
            }
        }

        fn begin_voice(&self) -> Result<(), String> {
            self.begun.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn apply(&self, targets: SynthTargets) {
            self.applied.lock().unwrap().push(targets);
        }

        fn end_voice(&self) {
            self.ended.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn engine() -> (WakeEngine, Arc<RecordingOutput>) {
        let output = Arc::new(RecordingOutput::default());
        (WakeEngine::new(output.clone()), output)
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_a_no_op() {
        let (engine, output) = engine();
        assert!(engine.start());
        let first = engine.snapshot().unwrap().session_id;

        assert!(!engine.start());
        assert_eq!(engine.snapshot().unwrap().session_id, first);
        assert_eq!(output.begun.load(Ordering::SeqCst), 1);
        assert!(engine.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_when_idle_skips_callback() {
        let (engine, output) = engine();
        let stops = Arc::new(AtomicUsize::new(0));
        let counter = stops.clone();
        engine.on_stop(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!engine.stop());
        assert_eq!(stops.load(Ordering::SeqCst), 0);
        assert_eq!(output.ended.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_tears_down_once() {
        let (engine, output) = engine();
        let stops = Arc::new(AtomicUsize::new(0));
        let counter = stops.clone();
        engine.on_stop(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        engine.start();
        time::sleep(Duration::from_secs(5)).await;
        assert!(engine.stop());
        assert!(!engine.stop());

        assert!(!engine.is_playing());
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(output.ended.load(Ordering::SeqCst), 1);

        let applied = output.applied.lock().unwrap().len();
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(output.applied.lock().unwrap().len(), applied);
    }

    #[tokio::test(start_paused = true)]
    async fn session_ends_naturally_after_five_minutes() {
        let (engine, output) = engine();
        let stops = Arc::new(AtomicUsize::new(0));
        let counter = stops.clone();
        engine.on_stop(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        engine.start();
        time::sleep(Duration::from_secs(299)).await;
        assert!(engine.is_playing());

        time::sleep(Duration::from_secs(2)).await;
        assert!(!engine.is_playing());
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(output.ended.load(Ordering::SeqCst), 1);

        let applied = output.applied.lock().unwrap();
        let last = applied.last().unwrap();
        assert_eq!(last.frequency_hz, 528.0);
        assert!(last.tone_gain < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn emits_phase_and_progress_each_tick() {
        let (engine, _output) = engine();
        let phases = Arc::new(Mutex::new(Vec::new()));
        let progress = Arc::new(Mutex::new(Vec::new()));

        let sink = phases.clone();
        engine.on_phase(move |phase| sink.lock().unwrap().push(phase));
        let sink = progress.clone();
        engine.on_progress(move |fraction, remaining| {
            sink.lock().unwrap().push((fraction, remaining.to_string()));
        });

        engine.start();
        time::sleep(Duration::from_secs(150)).await;

        let phases = phases.lock().unwrap();
        assert_eq!(phases.first(), Some(&WakePhase::Early));
        assert_eq!(phases.last(), Some(&WakePhase::Transition));

        let progress = progress.lock().unwrap();
        assert_eq!(progress.first().unwrap().1, "5:00");
        let (fraction, remaining) = progress.last().unwrap();
        assert!((fraction - 0.5).abs() < 0.01);
        assert!(remaining == "2:30" || remaining == "2:31", "{remaining}");
        assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[tokio::test(start_paused = true)]
    async fn last_callback_registration_wins() {
        let (engine, _output) = engine();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        engine.on_stop(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = second.clone();
        engine.on_stop(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        engine.start();
        engine.stop();
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_from_inside_progress_callback() {
        let (engine, _output) = engine();
        let stops = Arc::new(AtomicUsize::new(0));

        let handle = engine.clone();
        engine.on_progress(move |fraction, _| {
            if fraction >= 0.1 {
                handle.stop();
            }
        });
        let counter = stops.clone();
        engine.on_stop(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        engine.start();
        time::sleep(Duration::from_secs(60)).await;

        assert!(!engine.is_playing());
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_output_still_runs_timeline() {
        let (engine, output) = engine();
        output.fail_ready.store(true, Ordering::SeqCst);
        assert!(engine.ensure_context().is_err());

        assert!(engine.start());
        time::sleep(Duration::from_secs(301)).await;
        assert!(!engine.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_stop_creates_fresh_session() {
        let (engine, output) = engine();
        engine.start();
        let first = engine.snapshot().unwrap().session_id;
        engine.stop();

        assert!(engine.start());
        let second = engine.snapshot().unwrap();
        assert_ne!(second.session_id, first);
        assert!(second.elapsed_secs < 1.0);
        assert_eq!(output.begun.load(Ordering::SeqCst), 2);
    }
}
