use rodio::Source;
use std::f32::consts::TAU;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::pink_noise::PinkNoise;

pub const SAMPLE_RATE: u32 = 44_100;

/// Time constant of the per-sample approach toward each target, in seconds.
pub const RAMP_SECONDS: f32 = 0.08;

/// Carrier frequency the voice starts on before the first tick lands.
pub const REST_FREQUENCY_HZ: f32 = 432.0;

/// Parameter set the engine asks the voice to move toward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthTargets {
    pub frequency_hz: f32,
    pub tone_gain: f32,
    pub noise_gain: f32,
}

impl SynthTargets {
    pub const SILENT: Self = Self {
        frequency_hz: REST_FREQUENCY_HZ,
        tone_gain: 0.0,
        noise_gain: 0.0,
    };
}

/// Targets shared between the engine thread and the audio callback.
///
/// Each value is an `f32` stored by bit pattern so the audio side never
/// takes a lock.
#[derive(Debug)]
pub struct SynthParams {
    frequency_hz: AtomicU32,
    tone_gain: AtomicU32,
    noise_gain: AtomicU32,
}

impl SynthParams {
    pub fn new(targets: SynthTargets) -> Self {
        Self {
            frequency_hz: AtomicU32::new(targets.frequency_hz.to_bits()),
            tone_gain: AtomicU32::new(targets.tone_gain.to_bits()),
            noise_gain: AtomicU32::new(targets.noise_gain.to_bits()),
        }
    }

    pub fn store(&self, targets: SynthTargets) {
        self.frequency_hz
            .store(targets.frequency_hz.to_bits(), Ordering::Relaxed);
        self.tone_gain
            .store(targets.tone_gain.to_bits(), Ordering::Relaxed);
        self.noise_gain
            .store(targets.noise_gain.to_bits(), Ordering::Relaxed);
    }

    pub fn load(&self) -> SynthTargets {
        SynthTargets {
            frequency_hz: f32::from_bits(self.frequency_hz.load(Ordering::Relaxed)),
            tone_gain: f32::from_bits(self.tone_gain.load(Ordering::Relaxed)),
            noise_gain: f32::from_bits(self.noise_gain.load(Ordering::Relaxed)),
        }
    }
}

/// Sine carrier plus pink noise bed, mixed to mono.
///
/// Every sample glides the current frequency and gains toward the shared
/// targets with a one-pole ramp, so a new tick never produces a click.
pub struct WakeVoice {
    params: Arc<SynthParams>,
    noise: PinkNoise,
    sample_rate: u32,
    ramp_coeff: f32,
    phase: f32,
    current: SynthTargets,
}

impl WakeVoice {
    pub fn new(params: Arc<SynthParams>) -> Self {
        Self::with_noise(params, PinkNoise::new(SAMPLE_RATE), SAMPLE_RATE)
    }

    pub fn with_noise(params: Arc<SynthParams>, noise: PinkNoise, sample_rate: u32) -> Self {
        let ramp_coeff = 1.0 - (-1.0 / (RAMP_SECONDS * sample_rate as f32)).exp();
        Self {
            params,
            noise,
            sample_rate,
            ramp_coeff,
            phase: 0.0,
            current: SynthTargets::SILENT,
        }
    }

    pub fn current(&self) -> SynthTargets {
        self.current
    }

    fn approach(&mut self, target: SynthTargets) {
        let k = self.ramp_coeff;
        self.current.frequency_hz += (target.frequency_hz - self.current.frequency_hz) * k;
        self.current.tone_gain += (target.tone_gain - self.current.tone_gain) * k;
        self.current.noise_gain += (target.noise_gain - self.current.noise_gain) * k;
    }
}

impl Iterator for WakeVoice {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let target = self.params.load();
        self.approach(target);

        self.phase += self.current.frequency_hz / self.sample_rate as f32;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        let tone = (TAU * self.phase).sin() * self.current.tone_gain;
        let noise = self.noise.next().unwrap_or(0.0) * self.current.noise_gain;

        Some(tone + noise)
    }
}

impl Source for WakeVoice {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
