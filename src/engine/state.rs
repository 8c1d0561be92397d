use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::phase::{fraction_complete, format_remaining, WakePhase};

/// The single wake session slot.
///
/// At most one session exists; the tag makes that explicit instead of
/// inferring it from optional fields.
#[derive(Debug, Default)]
pub enum WakeState {
    #[default]
    Idle,
    Active(ActiveSession),
}

impl WakeState {
    pub fn is_active(&self) -> bool {
        matches!(self, WakeState::Active(_))
    }

    pub fn session(&self) -> Option<&ActiveSession> {
        match self {
            WakeState::Idle => None,
            WakeState::Active(session) => Some(session),
        }
    }

    /// Leave the slot `Idle` and hand back the session it held, if any.
    pub fn take(&mut self) -> Option<ActiveSession> {
        match std::mem::take(self) {
            WakeState::Idle => None,
            WakeState::Active(session) => Some(session),
        }
    }
}

#[derive(Debug)]
pub struct ActiveSession {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    /// Monotonic start instant. Elapsed time is always derived from this,
    /// never accumulated tick by tick.
    anchor: Instant,
    cancel: CancellationToken,
}

impl ActiveSession {
    pub fn new(session_id: String, started_at: DateTime<Utc>, anchor: Instant) -> Self {
        Self {
            session_id,
            started_at,
            anchor,
            cancel: CancellationToken::new(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.anchor.elapsed().as_secs_f64()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel_ticker(&self) {
        self.cancel.cancel();
    }

    pub fn snapshot(&self) -> WakeSnapshot {
        let elapsed_secs = self.elapsed_secs();
        WakeSnapshot {
            session_id: self.session_id.clone(),
            started_at: self.started_at,
            elapsed_secs,
            phase: WakePhase::at(elapsed_secs),
            fraction: fraction_complete(elapsed_secs),
            remaining: format_remaining(elapsed_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WakeSnapshot {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub phase: WakePhase,
    pub fraction: f64,
    pub remaining: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn elapsed_is_derived_from_anchor() {
        let session = ActiveSession::new("s1".into(), Utc::now(), Instant::now());
        tokio::time::advance(Duration::from_secs(130)).await;

        let snapshot = session.snapshot();
        assert!((snapshot.elapsed_secs - 130.0).abs() < 0.01);
        assert_eq!(snapshot.phase, WakePhase::Transition);
        assert_eq!(snapshot.remaining, "2:50");
    }

    #[test]
    fn take_leaves_slot_idle() {
        let mut state = WakeState::Active(ActiveSession::new(
            "s1".into(),
            Utc::now(),
            Instant::now(),
        ));
        assert!(state.is_active());

        let session = state.take();
        assert_eq!(session.map(|s| s.session_id), Some("s1".to_string()));
        assert!(!state.is_active());
        assert!(state.take().is_none());
    }

    #[test]
    fn cancelling_ticker_fires_token() {
        let session = ActiveSession::new("s1".into(), Utc::now(), Instant::now());
        let token = session.cancel_token();
        session.cancel_ticker();
        assert!(token.is_cancelled());
    }
}
