use std::collections::VecDeque;
use std::f32::consts::TAU;
use std::time::{Duration, Instant};

use crate::frame::{FrameFormat, encode_frame};
use crate::source::{ByteSource, SourceError};

const FRAME_INTERVAL: Duration = Duration::from_millis(40);
const NOISE_FLOOR: f32 = 8.0;
const PEAK_HEIGHT: f32 = 150.0;
const PEAK_WIDTH_BINS: f32 = 1.6;
const SWEEP_RATE_HZ: f32 = 0.15;
/// Every this many frames a short burst of line noise precedes the frame.
const GLITCH_EVERY: u64 = 25;

/// Stand-in for a microcontroller streaming FFT magnitudes.
///
/// Emits real wire frames: a dominant peak sweeping across the bins, a
/// weaker second harmonic, and a noisy floor. Occasionally injects stray
/// non-marker bytes between frames so resynchronization gets exercised.
pub struct SimulatedSource {
    format: FrameFormat,
    timeout: Duration,
    pending: VecDeque<u8>,
    next_frame_at: Instant,
    sweep_phase: f32,
    frames: u64,
    noise_seed: u32,
    values: Vec<f32>,
}

impl SimulatedSource {
    pub fn new(format: FrameFormat, timeout: Duration) -> Self {
        Self {
            format,
            timeout,
            pending: VecDeque::with_capacity(format.frame_len() * 2),
            next_frame_at: Instant::now(),
            sweep_phase: 0.0,
            frames: 0,
            noise_seed: 0x1234_5678,
            values: vec![0.0; format.batch_len],
        }
    }

    fn next_noise(&mut self) -> f32 {
        self.noise_seed = self
            .noise_seed
            .wrapping_mul(1_664_525)
            .wrapping_add(1_013_904_223);
        ((self.noise_seed >> 9) & 0x7FFFFF) as f32 / 0x7FFFFF as f32
    }

    fn fill_spectrum(&mut self) {
        let bins = self.format.batch_len as f32;
        let sweep = 0.5 - 0.5 * (TAU * self.sweep_phase).cos();
        let center = 2.0 + sweep * (bins * 0.45);
        self.sweep_phase += SWEEP_RATE_HZ * FRAME_INTERVAL.as_secs_f32();
        if self.sweep_phase >= 1.0 {
            self.sweep_phase -= 1.0;
        }

        for i in 0..self.format.batch_len {
            let bin = i as f32;
            let noise = self.next_noise();
            let fundamental = gaussian(bin, center, PEAK_WIDTH_BINS) * PEAK_HEIGHT;
            let harmonic = gaussian(bin, center * 2.0, PEAK_WIDTH_BINS) * PEAK_HEIGHT * 0.35;
            self.values[i] = NOISE_FLOOR * (0.5 + noise) + fundamental + harmonic;
        }
    }

    fn queue_frame(&mut self) {
        self.frames += 1;
        if self.frames % GLITCH_EVERY == 0 {
            for _ in 0..3 {
                let byte = (self.next_noise() * 255.0) as u8;
                if byte != self.format.marker {
                    self.pending.push_back(byte);
                }
            }
        }
        self.fill_spectrum();
        self.pending
            .extend(encode_frame(self.format.marker, &self.values));
        self.next_frame_at += FRAME_INTERVAL;
    }
}

fn gaussian(x: f32, center: f32, width: f32) -> f32 {
    let d = (x - center) / width;
    (-0.5 * d * d).exp()
}

impl ByteSource for SimulatedSource {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        if self.pending.is_empty() {
            let now = Instant::now();
            if now < self.next_frame_at {
                std::thread::sleep((self.next_frame_at - now).min(self.timeout));
            }
            if Instant::now() >= self.next_frame_at {
                self.queue_frame();
            }
        }

        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn describe(&self) -> String {
        "simulated spectrum".to_string()
    }
}
