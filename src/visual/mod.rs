pub mod color;
pub mod waveform;
