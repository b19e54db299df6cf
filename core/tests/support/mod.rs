//! Test support: tone generation, a minimal rendering backend honouring
//! the control-signal contract, and spectral assertions.

use std::sync::Arc;

use platterbox_core::engine::PlayerInput;
use platterbox_core::track::{self, Track};

/// Build an in-memory sine track at half amplitude.
pub fn sine_track(freq: f64, rate: u32, frames: u32) -> Arc<Track> {
    let track = track::acquire_for_recording(rate);
    let samples: Vec<[i16; 2]> = (0..frames)
        .map(|n| {
            let t = f64::from(n) / f64::from(rate);
            let v = (0.5 * (2.0 * std::f64::consts::PI * freq * t).sin() * 32767.0) as i16;
            [v, v]
        })
        .collect();
    track.write_frames(0, &samples).expect("tone fits in memory");
    track.set_length(frames);
    track
}

/// A deck of the reference renderer: reads the shared control record each
/// block and linearly interpolates track samples, the way the production
/// DSP consumes the same contract.
pub struct SimDeck {
    track: Arc<Track>,
    pub position: f64,
}

impl SimDeck {
    pub fn new(track: Arc<Track>) -> Self {
        Self {
            track,
            position: 0.0,
        }
    }

    fn sample_at(&self, seconds: f64) -> (f32, f32) {
        let rate = f64::from(self.track.rate());
        let pos = seconds * rate;
        if pos < 0.0 {
            return (0.0, 0.0);
        }
        let base = pos.floor();
        let frac = (pos - base) as f32;
        let n = base as u32;
        let (l0, r0) = match self.track.frame(n) {
            Some(f) => f,
            None => return (0.0, 0.0),
        };
        let (l1, r1) = self.track.frame(n + 1).unwrap_or((l0, r0));
        let lerp = |a: i16, b: i16| {
            (f32::from(a) + (f32::from(b) - f32::from(a)) * frac) / 32768.0
        };
        (lerp(l0, l1), lerp(r0, r1))
    }

    /// Render one block of interleaved stereo into `out`.
    pub fn render_block(&mut self, input: &PlayerInput, out: &mut Vec<f32>, frames: usize) {
        if let Some(seek) = input.take_seek() {
            self.position = seek;
        }
        if frames == 0 {
            return;
        }

        let rate = f64::from(self.track.rate());
        let dt = frames as f64 / rate;
        let gain = (input.crossfader() * input.volume_knob()) as f32;

        // Held platter: chase the target over the block. Free-running:
        // advance at the combined pitch.
        let velocity = if input.stopped() {
            0.0
        } else if input.touched() && !input.just_play() {
            (input.target_position() - self.position) / dt
        } else {
            input.pitch_note() * input.pitch_fader()
        };

        for _ in 0..frames {
            let (l, r) = self.sample_at(self.position + input.position_offset());
            out.push(l * gain);
            out.push(r * gain);
            self.position += velocity / rate;
        }
    }
}

/// RMS of one channel.
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum / samples.len() as f64).sqrt()
}

/// Every even-index sample (left channel) of an interleaved buffer.
pub fn left_channel(interleaved: &[f32]) -> Vec<f32> {
    interleaved.iter().step_by(2).copied().collect()
}

fn goertzel_power(samples: &[f32], rate: f64, freq: f64) -> f64 {
    let omega = 2.0 * std::f64::consts::PI * freq / rate;
    let coeff = 2.0 * omega.cos();
    let (mut s_prev, mut s_prev2) = (0.0f64, 0.0f64);
    for &sample in samples {
        let s = f64::from(sample) + coeff * s_prev - s_prev2;
        s_prev2 = s_prev;
        s_prev = s;
    }
    s_prev2 * s_prev2 + s_prev * s_prev - coeff * s_prev * s_prev2
}

/// Dominant frequency in `[lo, hi]`, scanned at 2 Hz resolution.
pub fn find_peak_frequency(samples: &[f32], rate: f64, lo: f64, hi: f64) -> f64 {
    let mut best = lo;
    let mut best_power = f64::MIN;
    let mut freq = lo;
    while freq <= hi {
        let power = goertzel_power(samples, rate, freq);
        if power > best_power {
            best_power = power;
            best = freq;
        }
        freq += 2.0;
    }
    best
}
