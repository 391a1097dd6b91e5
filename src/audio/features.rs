use serde::Serialize;

use super::spectrum::{frame_starts, Spectrum};

const ONSET_FFT_SIZE: usize = 2048;
const ONSET_HOP_SIZE: usize = 512;
const CHROMA_FFT_SIZE: usize = 4096;
const CHROMA_HOP_SIZE: usize = 2048;

/// Tempo search range and prior centre, in BPM.
const MIN_BPM: f32 = 30.0;
const MAX_BPM: f32 = 300.0;
const PRIOR_BPM: f32 = 120.0;

/// Frequency band used for pitch-class energy.
const CHROMA_MIN_HZ: f32 = 55.0;
const CHROMA_MAX_HZ: f32 = 5000.0;

/// Krumhansl-Kessler key profiles, tonic first.
pub const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
pub const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

pub const PITCH_CLASS_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Major,
    Minor,
    Unknown,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Major => "major",
            Mode::Minor => "minor",
            Mode::Unknown => "unknown",
        }
    }
}

/// Acoustic summary of one chunk.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ChunkFeatures {
    pub energy: f32,
    pub tempo_bpm: f32,
    pub mode: Mode,
}

impl ChunkFeatures {
    /// Compute all three features. Each extractor is guarded on its own,
    /// so a degenerate read in one leaves the others intact.
    pub fn extract(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            energy: energy(samples),
            tempo_bpm: tempo(samples, sample_rate),
            mode: mode(samples, sample_rate),
        }
    }

    /// Replace invalid readings with the last valid ones.
    ///
    /// Energy and tempo are valid when finite and strictly positive, mode when
    /// it is not `Unknown`. Without a previous value an invalid energy or
    /// tempo reads as 0.0.
    pub fn or_last_known(self, previous: Option<&ChunkFeatures>) -> ChunkFeatures {
        ChunkFeatures {
            energy: last_known_good(previous.map(|p| p.energy), self.energy).unwrap_or(0.0),
            tempo_bpm: last_known_good(previous.map(|p| p.tempo_bpm), self.tempo_bpm)
                .unwrap_or(0.0),
            mode: match (self.mode, previous) {
                (Mode::Unknown, Some(p)) => p.mode,
                (m, _) => m,
            },
        }
    }
}

/// `candidate` when it is a usable reading, else `previous`.
pub fn last_known_good(previous: Option<f32>, candidate: f32) -> Option<f32> {
    if candidate.is_finite() && candidate > 0.0 {
        Some(candidate)
    } else {
        previous.filter(|p| p.is_finite() && *p > 0.0)
    }
}

/// Mean squared amplitude.
pub fn energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64) as f32
}

/// Spectral-flux onset strength, one value per STFT hop.
pub fn onset_envelope(samples: &[f32]) -> Vec<f32> {
    let spectrum = Spectrum::new(ONSET_FFT_SIZE);
    let starts = frame_starts(samples.len(), ONSET_FFT_SIZE, ONSET_HOP_SIZE);

    let mut envelope = Vec::with_capacity(starts.len());
    let mut prev: Option<Vec<f32>> = None;
    for start in starts {
        let end = (start + ONSET_FFT_SIZE).min(samples.len());
        let log_mags: Vec<f32> = spectrum
            .magnitudes(&samples[start..end])
            .into_iter()
            .map(|m| m.ln_1p())
            .collect();

        let flux = match prev {
            Some(ref p) => {
                log_mags
                    .iter()
                    .zip(p.iter())
                    .map(|(cur, prev)| (cur - prev).max(0.0))
                    .sum::<f32>()
                    / log_mags.len() as f32
            }
            None => 0.0,
        };
        envelope.push(flux);
        prev = Some(log_mags);
    }
    envelope
}

/// Tempo estimate in BPM from the autocorrelation of the onset envelope,
/// weighted by a log-normal prior around 120 BPM. Returns 0.0 when no
/// periodicity can be measured.
pub fn tempo(samples: &[f32], sample_rate: u32) -> f32 {
    if samples.is_empty() || sample_rate == 0 {
        return 0.0;
    }

    let envelope = onset_envelope(samples);
    if envelope.len() < 3 {
        return 0.0;
    }
    let peak = envelope.iter().copied().fold(0.0f32, f32::max);
    if !peak.is_finite() || peak <= 1e-6 {
        return 0.0;
    }

    let mean = envelope.iter().sum::<f32>() / envelope.len() as f32;
    let centered: Vec<f32> = envelope.iter().map(|v| v - mean).collect();

    let frame_rate = sample_rate as f32 / ONSET_HOP_SIZE as f32;
    let min_lag = ((60.0 * frame_rate / MAX_BPM).floor() as usize).max(1);
    let max_lag = ((60.0 * frame_rate / MIN_BPM).ceil() as usize).min(centered.len() - 1);
    if min_lag > max_lag {
        return 0.0;
    }

    let mut best: Option<(usize, f32)> = None;
    for lag in min_lag..=max_lag {
        let ac: f32 = centered[..centered.len() - lag]
            .iter()
            .zip(&centered[lag..])
            .map(|(a, b)| a * b)
            .sum();
        let bpm = 60.0 * frame_rate / lag as f32;
        let octaves = (bpm / PRIOR_BPM).log2();
        let score = ac * (-0.5 * octaves * octaves).exp();
        if score > best.map_or(0.0, |(_, s)| s) {
            best = Some((lag, score));
        }
    }

    match best {
        Some((lag, _)) => 60.0 * frame_rate / lag as f32,
        None => 0.0,
    }
}

/// Time-averaged 12-bin pitch-class profile, C first. Each frame is scaled
/// to a peak of 1 before averaging.
pub fn chroma(samples: &[f32], sample_rate: u32) -> [f32; 12] {
    let mut profile = [0.0f32; 12];
    if samples.is_empty() || sample_rate == 0 {
        return profile;
    }

    let spectrum = Spectrum::new(CHROMA_FFT_SIZE);
    let freq_resolution = sample_rate as f32 / CHROMA_FFT_SIZE as f32;
    let starts = frame_starts(samples.len(), CHROMA_FFT_SIZE, CHROMA_HOP_SIZE);
    let frames = starts.len();

    for start in starts {
        let end = (start + CHROMA_FFT_SIZE).min(samples.len());
        let mags = spectrum.magnitudes(&samples[start..end]);

        let mut frame_chroma = [0.0f32; 12];
        for (bin, &mag) in mags.iter().enumerate().skip(1) {
            let freq = bin as f32 * freq_resolution;
            if freq < CHROMA_MIN_HZ || freq > CHROMA_MAX_HZ {
                continue;
            }
            let midi = 69.0 + 12.0 * (freq / 440.0).log2();
            let pc = (midi.round() as i64).rem_euclid(12) as usize;
            frame_chroma[pc] += mag * mag;
        }

        let frame_peak = frame_chroma.iter().copied().fold(0.0f32, f32::max);
        if frame_peak > 0.0 {
            for (acc, v) in profile.iter_mut().zip(frame_chroma.iter()) {
                *acc += v / frame_peak;
            }
        }
    }

    if frames > 0 {
        for v in profile.iter_mut() {
            *v /= frames as f32;
        }
    }
    profile
}

/// Best-matching key for a chroma profile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeyEstimate {
    pub tonic: usize,
    pub mode: Mode,
    pub correlation: f64,
}

impl KeyEstimate {
    pub fn name(&self) -> String {
        format!("{} {}", PITCH_CLASS_NAMES[self.tonic % 12], self.mode.as_str())
    }
}

/// Correlate `chroma` against all 24 rotated key profiles. `None` when every
/// correlation is undefined, e.g. for silence.
pub fn estimate_key(chroma: &[f32; 12]) -> Option<KeyEstimate> {
    let values: Vec<f64> = chroma.iter().map(|&v| v as f64).collect();
    let mut best_major: Option<(usize, f64)> = None;
    let mut best_minor: Option<(usize, f64)> = None;

    for shift in 0..12 {
        let major = pearson(&rotate(&MAJOR_PROFILE, shift), &values);
        let minor = pearson(&rotate(&MINOR_PROFILE, shift), &values);
        if major.is_finite() && best_major.map_or(true, |(_, r)| major > r) {
            best_major = Some((shift, major));
        }
        if minor.is_finite() && best_minor.map_or(true, |(_, r)| minor > r) {
            best_minor = Some((shift, minor));
        }
    }

    let estimate = |(tonic, correlation): (usize, f64), mode| KeyEstimate {
        tonic,
        mode,
        correlation,
    };
    match (best_major, best_minor) {
        (Some(maj), Some(min)) if maj.1 > min.1 => Some(estimate(maj, Mode::Major)),
        (_, Some(min)) => Some(estimate(min, Mode::Minor)),
        (Some(maj), None) => Some(estimate(maj, Mode::Major)),
        (None, None) => None,
    }
}

/// Major/minor decision for a chunk; `Unknown` when it cannot be made.
pub fn mode(samples: &[f32], sample_rate: u32) -> Mode {
    if samples.is_empty() {
        return Mode::Unknown;
    }
    match estimate_key(&chroma(samples, sample_rate)) {
        Some(key) => {
            log::debug!("Key estimate: {} (r={:.3})", key.name(), key.correlation);
            key.mode
        }
        None => Mode::Unknown,
    }
}

/// Circular shift to the right, so the tonic lands on `shift`.
fn rotate(profile: &[f64; 12], shift: usize) -> [f64; 12] {
    let mut out = [0.0; 12];
    for (j, v) in out.iter_mut().enumerate() {
        *v = profile[(j + 12 - shift % 12) % 12];
    }
    out
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return f64::NAN;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a[..n].iter().zip(&b[..n]) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    cov / (var_a * var_b).sqrt()
}
