use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Windowed magnitude spectrum of fixed-size frames.
pub struct Spectrum {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    size: usize,
}

impl Spectrum {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(size);
        Self {
            fft,
            window: hann_window(size),
            size,
        }
    }

    /// Magnitudes of bins `0..=size/2`. Frames shorter than `size` are
    /// zero-padded at the end.
    pub fn magnitudes(&self, frame: &[f32]) -> Vec<f32> {
        let mut buffer: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); self.size];
        for (i, &s) in frame.iter().take(self.size).enumerate() {
            buffer[i] = Complex::new(s * self.window[i], 0.0);
        }
        self.fft.process(&mut buffer);
        buffer[..=self.size / 2].iter().map(|c| c.norm()).collect()
    }
}

/// Start offsets of full frames, or a single zero-padded frame when the
/// signal is shorter than one frame.
pub fn frame_starts(len: usize, frame: usize, hop: usize) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    if len <= frame {
        return vec![0];
    }
    (0..=(len - frame) / hop).map(|i| i * hop).collect()
}

pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}
