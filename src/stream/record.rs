use serde::Serialize;

use crate::audio::features::ChunkFeatures;
use crate::emotion::{EmotionDistribution, RankedEmotion};
use crate::visual::waveform::WaveformFrame;

/// One line of the progress stream.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StreamRecord {
    Starting {
        progress: u8,
    },
    LoadingAudio {
        progress: u8,
    },
    WaveformReady {
        progress: u8,
        duration_seconds: f32,
        total_chunks: usize,
        waveform: Vec<WaveformFrame>,
    },
    /// `data` is null when the chunk has just started.
    ProcessingChunk {
        progress: u8,
        chunk_index: usize,
        total_chunks: usize,
        data: Option<ChunkData>,
    },
    Complete {
        progress: u8,
        summary: Option<TrackSummary>,
    },
    Error {
        progress: u8,
        message: String,
    },
}

impl StreamRecord {
    pub fn progress(&self) -> u8 {
        match self {
            StreamRecord::Starting { progress }
            | StreamRecord::LoadingAudio { progress }
            | StreamRecord::WaveformReady { progress, .. }
            | StreamRecord::ProcessingChunk { progress, .. }
            | StreamRecord::Complete { progress, .. }
            | StreamRecord::Error { progress, .. } => *progress,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            StreamRecord::Starting { .. } => "starting",
            StreamRecord::LoadingAudio { .. } => "loading_audio",
            StreamRecord::WaveformReady { .. } => "waveform_ready",
            StreamRecord::ProcessingChunk { .. } => "processing_chunk",
            StreamRecord::Complete { .. } => "complete",
            StreamRecord::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamRecord::Complete { .. } | StreamRecord::Error { .. })
    }

    /// The finished result carried by a chunk record, if any.
    #[cfg(test)]
    pub fn chunk_data(&self) -> Option<&ChunkData> {
        match self {
            StreamRecord::ProcessingChunk { data, .. } => data.as_ref(),
            _ => None,
        }
    }
}

/// Result of one processed chunk.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChunkData {
    #[serde(flatten)]
    pub features: ChunkFeatures,
    pub start_seconds: f32,
    pub end_seconds: f32,
    pub emotion: EmotionDistribution,
    pub image_ref: Option<String>,
}

/// Track-level aggregate sent with `complete`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackSummary {
    pub chunks: usize,
    pub average: EmotionDistribution,
    pub dominant: Vec<RankedEmotion>,
}
