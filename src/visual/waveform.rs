use rayon::prelude::*;
use serde::Serialize;

use super::color::{emotion_color, Rgb};
use crate::audio::decode::Track;
use crate::audio::spectrum::Spectrum;

pub const FRAME_LENGTH: usize = 2048;
pub const HOP_LENGTH: usize = 1024;
/// Frames sharing one colour.
pub const BLOCK_SIZE: usize = 30;
/// Keep every Nth frame in the transported trace.
pub const TRACE_STRIDE: usize = 3;

/// One point of the full-track waveform visualization.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WaveformFrame {
    #[serde(rename = "time")]
    pub time_seconds: f32,
    pub amplitude: f32,
    pub color: String,
}

/// Raw per-frame loudness (RMS) and brightness (spectral centroid, Hz).
#[derive(Clone, Debug, Default)]
pub struct FrameCurves {
    pub rms: Vec<f32>,
    pub centroid: Vec<f32>,
}

impl FrameCurves {
    pub fn len(&self) -> usize {
        self.rms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rms.is_empty()
    }
}

/// Centred analysis frames over the whole track, zero-padded at the edges.
pub fn frame_curves(track: &Track) -> FrameCurves {
    let samples = &track.samples;
    if samples.is_empty() || track.sample_rate == 0 {
        return FrameCurves::default();
    }

    let n_frames = 1 + samples.len() / HOP_LENGTH;
    let freq_resolution = track.sample_rate as f32 / FRAME_LENGTH as f32;
    let half = FRAME_LENGTH / 2;

    let (rms, centroid): (Vec<f32>, Vec<f32>) = (0..n_frames)
        .into_par_iter()
        .map_init(
            || Spectrum::new(FRAME_LENGTH),
            |spectrum, frame_idx| {
                let center = frame_idx * HOP_LENGTH;
                let mut frame = vec![0.0f32; FRAME_LENGTH];
                let first = center.saturating_sub(half);
                let last = (center + half).min(samples.len());
                let offset = first + half - center;
                frame[offset..offset + (last - first)].copy_from_slice(&samples[first..last]);

                let rms = (frame.iter().map(|s| s * s).sum::<f32>() / FRAME_LENGTH as f32).sqrt();

                let mags = spectrum.magnitudes(&frame);
                let total: f32 = mags.iter().sum();
                let centroid = if total > 1e-10 {
                    mags.iter()
                        .enumerate()
                        .map(|(i, &mag)| i as f32 * freq_resolution * mag)
                        .sum::<f32>()
                        / total
                } else {
                    0.0
                };

                (rms, centroid)
            },
        )
        .unzip();

    FrameCurves { rms, centroid }
}

/// Min-max scale to 0.0-1.0. A flat curve maps to all zeros.
pub fn normalize(values: &[f32]) -> Vec<f32> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if !(range.is_finite() && range > 0.0) {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| ((v - min) / range).clamp(0.0, 1.0)).collect()
}

/// One colour per frame; every frame of a block takes the colour of the
/// block's first frame.
pub fn frame_colors(curves: &FrameCurves) -> Vec<Rgb> {
    let loudness = normalize(&curves.rms);
    let brightness = normalize(&curves.centroid);

    let mut colors = Vec::with_capacity(curves.len());
    let mut block_color = None;
    for i in 0..curves.len() {
        if i % BLOCK_SIZE == 0 || block_color.is_none() {
            block_color = Some(emotion_color(loudness[i], brightness[i]));
        }
        if let Some(c) = block_color {
            colors.push(c);
        }
    }
    colors
}

/// Full-track trace, downsampled by `TRACE_STRIDE`.
pub fn waveform_trace(track: &Track) -> Vec<WaveformFrame> {
    let curves = frame_curves(track);
    let colors = frame_colors(&curves);
    let duration = track.duration();
    let n = curves.len();

    let trace: Vec<WaveformFrame> = (0..n)
        .step_by(TRACE_STRIDE)
        .map(|i| WaveformFrame {
            time_seconds: if n > 1 {
                duration * i as f32 / (n - 1) as f32
            } else {
                0.0
            },
            amplitude: curves.rms[i],
            color: colors[i].to_hex(),
        })
        .collect();

    log::info!(
        "Waveform trace: {} frames analysed, {} transported",
        n,
        trace.len()
    );
    trace
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const SR: u32 = 22050;

    /// Tone whose pitch and level both rise over time.
    fn sweep(seconds: f32) -> Track {
        let n = (seconds * SR as f32) as usize;
        let samples = (0..n)
            .map(|i| {
                let t = i as f32 / SR as f32;
                let progress = t / seconds;
                let freq = 200.0 + 3000.0 * progress;
                (0.1 + 0.8 * progress) * (2.0 * PI * freq * t).sin()
            })
            .collect();
        Track::new(samples, SR)
    }

    #[test]
    fn frame_count_matches_centred_framing() {
        let track = sweep(2.0);
        let curves = frame_curves(&track);
        assert_eq!(curves.len(), 1 + track.samples.len() / HOP_LENGTH);
        assert_eq!(curves.centroid.len(), curves.rms.len());
    }

    #[test]
    fn colours_are_block_quantized() {
        let track = sweep(5.0);
        let colors = frame_colors(&frame_curves(&track));
        assert!(colors.len() > 2 * BLOCK_SIZE);
        for (i, c) in colors.iter().enumerate() {
            assert_eq!(*c, colors[i / BLOCK_SIZE * BLOCK_SIZE]);
        }
        assert_ne!(colors[0], colors[BLOCK_SIZE * 3]);
    }

    #[test]
    fn trace_frames_in_one_block_share_colour() {
        let track = sweep(5.0);
        let trace = waveform_trace(&track);
        for (a, fa) in trace.iter().enumerate() {
            for (b, fb) in trace.iter().enumerate() {
                if a * TRACE_STRIDE / BLOCK_SIZE == b * TRACE_STRIDE / BLOCK_SIZE {
                    assert_eq!(fa.color, fb.color);
                }
            }
        }
    }

    #[test]
    fn trace_is_strided_and_spans_duration() {
        let track = sweep(4.0);
        let n = frame_curves(&track).len();
        let trace = waveform_trace(&track);
        assert_eq!(trace.len(), (n + TRACE_STRIDE - 1) / TRACE_STRIDE);
        assert_eq!(trace[0].time_seconds, 0.0);
        assert!(trace.windows(2).all(|w| w[1].time_seconds > w[0].time_seconds));
        assert!(trace.last().unwrap().time_seconds <= track.duration() + 1e-4);
        assert!(trace.iter().all(|f| f.amplitude >= 0.0));
        assert!(trace.iter().all(|f| f.color.len() == 7 && f.color.starts_with('#')));
    }

    #[test]
    fn amplitude_is_raw_rms() {
        let samples: Vec<f32> = (0..SR as usize).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        let trace = waveform_trace(&Track::new(samples, SR));
        // interior frames are fully covered by signal
        assert!((trace[3].amplitude - 0.5).abs() < 1e-4);
    }

    #[test]
    fn normalize_spans_unit_range() {
        let n = normalize(&[2.0, 4.0, 3.0]);
        assert_eq!(n, vec![0.0, 1.0, 0.5]);
        assert_eq!(normalize(&[1.5; 4]), vec![0.0; 4]);
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn empty_track_has_empty_trace() {
        assert!(waveform_trace(&Track::new(Vec::new(), SR)).is_empty());
    }

    #[test]
    fn serializes_with_time_key() {
        let frame = WaveformFrame {
            time_seconds: 1.5,
            amplitude: 0.25,
            color: "#112233".into(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["time"], 1.5);
        assert_eq!(json["color"], "#112233");
    }
}
