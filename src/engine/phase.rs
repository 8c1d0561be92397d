//! Parameter curves of the five-minute wake session.
//!
//! Everything here is a pure function of elapsed seconds. The controller
//! recomputes elapsed time from the session anchor on every tick, so a late or
//! throttled tick simply lands further along the same curve.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

use crate::audio::SynthTargets;

pub const TOTAL_DURATION_SECS: f64 = 300.0;
pub const TRANSITION_START_SECS: f64 = 120.0;
pub const NATURAL_START_SECS: f64 = 240.0;

pub const BASE_FREQUENCY_HZ: f64 = 432.0;
pub const PEAK_FREQUENCY_HZ: f64 = 528.0;

const EARLY_TONE_GAIN: f64 = 0.04;
const EARLY_WOBBLE_DEPTH: f64 = 0.015;
const EARLY_WOBBLE_RATE: f64 = 0.4;
const TRANSITION_TONE_FLOOR: f64 = 0.055;
const TRANSITION_TONE_RISE: f64 = 0.145;
const TRANSITION_NOISE_PEAK: f64 = 0.10;
const NATURAL_TONE_START: f64 = 0.20;
const NATURAL_NOISE_FLOOR: f64 = 0.10;
const NATURAL_NOISE_SWELL: f64 = 0.15;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum WakePhase {
    /// [0, 120s): quiet 432 Hz tone with a slow wobble.
    Early,
    /// [120, 240s): glide to 528 Hz, tone rises, noise fades in.
    Transition,
    /// [240, 300s): tone fades out under a swelling noise bed.
    Natural,
}

impl WakePhase {
    /// Classify elapsed seconds. Anything past the end still reads as
    /// `Natural`; the controller stops before asking.
    pub fn at(elapsed_secs: f64) -> Self {
        if elapsed_secs < TRANSITION_START_SECS {
            WakePhase::Early
        } else if elapsed_secs < NATURAL_START_SECS {
            WakePhase::Transition
        } else {
            WakePhase::Natural
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WakePhase::Early => "early",
            WakePhase::Transition => "transition",
            WakePhase::Natural => "natural",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WakePhase::Early => "432 Hz · very gentle",
            WakePhase::Transition => "Gliding to 528 Hz · rising",
            WakePhase::Natural => "Natural wake · final minute",
        }
    }
}

impl fmt::Display for WakePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Cubic ease `3t² - 2t³`, clamped to [0, 1].
pub fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Synthesis targets at `elapsed_secs` into the session.
pub fn targets_at(elapsed_secs: f64) -> SynthTargets {
    let elapsed = elapsed_secs.max(0.0);

    let (frequency, tone, noise) = match WakePhase::at(elapsed) {
        WakePhase::Early => {
            let wobble = (elapsed * EARLY_WOBBLE_RATE).sin() * EARLY_WOBBLE_DEPTH;
            (BASE_FREQUENCY_HZ, (EARLY_TONE_GAIN + wobble).max(0.0), 0.0)
        }
        WakePhase::Transition => {
            let t = (elapsed - TRANSITION_START_SECS)
                / (NATURAL_START_SECS - TRANSITION_START_SECS);
            let frequency =
                BASE_FREQUENCY_HZ + (PEAK_FREQUENCY_HZ - BASE_FREQUENCY_HZ) * smoothstep(t);
            let tone = TRANSITION_TONE_FLOOR + t * t * TRANSITION_TONE_RISE;
            (frequency, tone, t * TRANSITION_NOISE_PEAK)
        }
        WakePhase::Natural => {
            let t = ((elapsed - NATURAL_START_SECS) / (TOTAL_DURATION_SECS - NATURAL_START_SECS))
                .min(1.0);
            let tone = NATURAL_TONE_START * (1.0 - t);
            let noise = NATURAL_NOISE_FLOOR + (t * PI).sin() * NATURAL_NOISE_SWELL;
            (PEAK_FREQUENCY_HZ, tone, noise)
        }
    };

    SynthTargets {
        frequency_hz: frequency as f32,
        tone_gain: tone as f32,
        noise_gain: noise as f32,
    }
}

/// Fraction of the session completed, in [0, 1].
pub fn fraction_complete(elapsed_secs: f64) -> f64 {
    (elapsed_secs / TOTAL_DURATION_SECS).clamp(0.0, 1.0)
}

/// Remaining time rounded up to whole seconds, as `m:ss`.
pub fn format_remaining(elapsed_secs: f64) -> String {
    let remaining = (TOTAL_DURATION_SECS - elapsed_secs).max(0.0).ceil() as u64;
    format!("{}:{:02}", remaining / 60, remaining % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_partition_the_session() {
        let mut elapsed = 0.0;
        while elapsed < TOTAL_DURATION_SECS {
            let phase = WakePhase::at(elapsed);
            let expected = if elapsed < 120.0 {
                WakePhase::Early
            } else if elapsed < 240.0 {
                WakePhase::Transition
            } else {
                WakePhase::Natural
            };
            assert_eq!(phase, expected, "elapsed {elapsed}");
            elapsed += 0.25;
        }
    }

    #[test]
    fn phase_boundaries_belong_to_later_phase() {
        assert_eq!(WakePhase::at(119.999), WakePhase::Early);
        assert_eq!(WakePhase::at(120.0), WakePhase::Transition);
        assert_eq!(WakePhase::at(239.999), WakePhase::Transition);
        assert_eq!(WakePhase::at(240.0), WakePhase::Natural);
    }

    #[test]
    fn glide_hits_endpoints_exactly() {
        assert_eq!(smoothstep(0.0), 0.0);
        assert_eq!(smoothstep(1.0), 1.0);
        assert_eq!(targets_at(120.0).frequency_hz, 432.0);
        assert_eq!(targets_at(240.0).frequency_hz, 528.0);
        assert!((targets_at(239.9999).frequency_hz - 528.0).abs() < 0.01);
    }

    #[test]
    fn glide_is_monotonic_over_transition() {
        let mut previous = targets_at(120.0).frequency_hz;
        let mut elapsed = 120.0;
        while elapsed < 240.0 {
            let frequency = targets_at(elapsed).frequency_hz;
            assert!(frequency >= previous, "dropped at {elapsed}");
            previous = frequency;
            elapsed += 0.06;
        }
    }

    #[test]
    fn early_phase_is_quiet_tone_without_noise() {
        for elapsed in [0.0, 10.0, 60.0, 119.0] {
            let targets = targets_at(elapsed);
            assert_eq!(targets.frequency_hz, 432.0);
            assert_eq!(targets.noise_gain, 0.0);
            assert!(targets.tone_gain >= 0.025 - 1e-6 && targets.tone_gain <= 0.055 + 1e-6);
        }
    }

    #[test]
    fn transition_fades_noise_in_from_silence() {
        assert_eq!(targets_at(120.0).noise_gain, 0.0);
        assert!((targets_at(180.0).noise_gain - 0.05).abs() < 1e-6);
        assert!(targets_at(200.0).tone_gain > targets_at(150.0).tone_gain);
    }

    #[test]
    fn natural_phase_fades_tone_and_swells_noise() {
        assert!((targets_at(240.0).tone_gain - 0.20).abs() < 1e-6);
        assert!((targets_at(270.0).noise_gain - 0.25).abs() < 1e-6);
        assert!(targets_at(299.9).tone_gain < 0.001);
        assert!((targets_at(299.999).noise_gain - 0.10).abs() < 0.001);
        assert_eq!(targets_at(260.0).frequency_hz, 528.0);
    }

    #[test]
    fn remaining_rounds_up_to_whole_seconds() {
        assert_eq!(format_remaining(0.0), "5:00");
        assert_eq!(format_remaining(0.5), "5:00");
        assert_eq!(format_remaining(1.0), "4:59");
        assert_eq!(format_remaining(250.2), "0:50");
        assert_eq!(format_remaining(299.99), "0:01");
        assert_eq!(format_remaining(400.0), "0:00");
    }

    #[test]
    fn fraction_is_clamped() {
        assert_eq!(fraction_complete(0.0), 0.0);
        assert_eq!(fraction_complete(150.0), 0.5);
        assert_eq!(fraction_complete(301.0), 1.0);
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(WakePhase::Early.as_str(), "early");
        assert_eq!(WakePhase::Natural.to_string(), "Natural wake · final minute");
    }
}
