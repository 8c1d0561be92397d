use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seconds of noise rendered into the loop buffer.
pub const LOOP_SECONDS: f32 = 4.0;

/// Output scale applied after filtering so the bed sits near the tone level.
const OUTPUT_SCALE: f32 = 0.11;

/// Paul Kellet's refined pink filter.
///
/// Six leaky integrators plus a one-sample white tap turn white noise into an
/// approximately -3 dB/octave spectrum.
#[derive(Debug, Default, Clone)]
pub struct PinkFilter {
    b0: f32,
    b1: f32,
    b2: f32,
    b3: f32,
    b4: f32,
    b5: f32,
    b6: f32,
}

impl PinkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, white: f32) -> f32 {
        self.b0 = 0.99886 * self.b0 + white * 0.055_517_9;
        self.b1 = 0.99332 * self.b1 + white * 0.075_075_9;
        self.b2 = 0.96900 * self.b2 + white * 0.153_852;
        self.b3 = 0.86650 * self.b3 + white * 0.310_485_6;
        self.b4 = 0.55000 * self.b4 + white * 0.532_952_2;
        self.b5 = -0.7616 * self.b5 - white * 0.016_898;
        let pink =
            self.b0 + self.b1 + self.b2 + self.b3 + self.b4 + self.b5 + self.b6 + white * 0.5362;
        self.b6 = white * 0.115_926;
        pink
    }
}

/// Looping pink noise.
///
/// A few seconds are rendered once up front and replayed forever; the loop
/// point is inaudible in broadband noise.
pub struct PinkNoise {
    buffer: Vec<f32>,
    position: usize,
}

impl PinkNoise {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_rng(sample_rate, StdRng::from_entropy())
    }

    pub fn with_rng(sample_rate: u32, mut rng: StdRng) -> Self {
        let length = ((sample_rate as f32 * LOOP_SECONDS) as usize).max(1);
        let mut filter = PinkFilter::new();
        let buffer = (0..length)
            .map(|_| {
                let white: f32 = rng.gen_range(-1.0..1.0);
                filter.process(white) * OUTPUT_SCALE
            })
            .collect();

        Self {
            buffer,
            position: 0,
        }
    }

    pub fn loop_len(&self) -> usize {
        self.buffer.len()
    }
}

impl Iterator for PinkNoise {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let sample = self.buffer[self.position];
        self.position += 1;
        if self.position == self.buffer.len() {
            self.position = 0;
        }
        Some(sample)
    }
}
