use serde::Deserialize;

use crate::error::PipelineError;

/// Window length and stride, in seconds.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub struct ChunkConfig {
    #[serde(default = "default_chunk_seconds")]
    pub chunk_seconds: f32,
    #[serde(default = "default_hop_seconds")]
    pub hop_seconds: f32,
}

impl ChunkConfig {
    /// Short first-pass windowing.
    pub const QUICK: ChunkConfig = ChunkConfig {
        chunk_seconds: 2.0,
        hop_seconds: 1.0,
    };
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_seconds: default_chunk_seconds(),
            hop_seconds: default_hop_seconds(),
        }
    }
}

fn default_chunk_seconds() -> f32 { 7.0 }
fn default_hop_seconds() -> f32 { 6.0 }

/// A window of a track's samples.
#[derive(Clone, Copy, Debug)]
pub struct Chunk<'a> {
    /// 1-based position in the chunk sequence.
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub samples: &'a [f32],
}

/// Fixed-size overlapping windowing in sample units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunker {
    pub samples_per_chunk: usize,
    pub hop_samples: usize,
}

impl Chunker {
    pub fn new(config: ChunkConfig, sample_rate: u32) -> Result<Self, PipelineError> {
        if !(config.chunk_seconds.is_finite() && config.hop_seconds.is_finite()) {
            return Err(PipelineError::Config("chunk and hop durations must be finite".into()));
        }
        let samples_per_chunk = (config.chunk_seconds as f64 * sample_rate as f64).floor().max(0.0) as usize;
        let hop_samples = (config.hop_seconds as f64 * sample_rate as f64).floor().max(0.0) as usize;
        if samples_per_chunk == 0 || hop_samples == 0 {
            return Err(PipelineError::Config(format!(
                "chunk of {}s with hop {}s is empty at {}Hz",
                config.chunk_seconds, config.hop_seconds, sample_rate
            )));
        }
        Ok(Self {
            samples_per_chunk,
            hop_samples,
        })
    }

    /// Number of chunks `chunks` yields for `len` samples. Zero when the
    /// track is shorter than one chunk.
    pub fn total_chunks(&self, len: usize) -> usize {
        if len < self.samples_per_chunk {
            return 0;
        }
        (len - self.samples_per_chunk) / self.hop_samples
    }

    /// Lazy iteration over the chunks of `samples`. A trailing partial
    /// window is dropped. Calling this again restarts from the beginning.
    pub fn chunks<'a>(&self, samples: &'a [f32]) -> Chunks<'a> {
        Chunks {
            samples,
            samples_per_chunk: self.samples_per_chunk,
            hop_samples: self.hop_samples,
            next: 0,
            total: self.total_chunks(samples.len()),
        }
    }
}

pub struct Chunks<'a> {
    samples: &'a [f32],
    samples_per_chunk: usize,
    hop_samples: usize,
    next: usize,
    total: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Chunk<'a>> {
        if self.next >= self.total {
            return None;
        }
        let start = self.next * self.hop_samples;
        let end = start + self.samples_per_chunk;
        self.next += 1;
        Some(Chunk {
            index: self.next,
            start,
            end,
            samples: &self.samples[start..end],
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Chunks<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk: f32, hop: f32) -> ChunkConfig {
        ChunkConfig {
            chunk_seconds: chunk,
            hop_seconds: hop,
        }
    }

    #[test]
    fn twenty_second_track_yields_two_chunks() {
        let sr = 22050;
        let samples = vec![0.0f32; 20 * sr as usize];
        let chunker = Chunker::new(ChunkConfig::default(), sr).unwrap();
        assert_eq!(chunker.samples_per_chunk, 7 * 22050);
        assert_eq!(chunker.hop_samples, 6 * 22050);
        assert_eq!(chunker.total_chunks(samples.len()), 2);

        let chunks: Vec<_> = chunker.chunks(&samples).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].index, 1);
        assert_eq!((chunks[1].start, chunks[1].end), (6 * 22050, 13 * 22050));
        assert!(chunks.iter().all(|c| c.samples.len() == 7 * 22050));
    }

    #[test]
    fn short_track_yields_nothing() {
        let chunker = Chunker::new(config(7.0, 6.0), 100).unwrap();
        let samples = vec![0.5f32; 699];
        assert_eq!(chunker.total_chunks(samples.len()), 0);
        assert_eq!(chunker.chunks(&samples).count(), 0);
        assert_eq!(chunker.total_chunks(0), 0);
    }

    #[test]
    fn reported_total_matches_iteration() {
        for (chunk, hop) in [(2.0, 1.0), (7.0, 6.0), (1.0, 1.0), (0.5, 0.25), (3.0, 4.0)] {
            let chunker = Chunker::new(config(chunk, hop), 100).unwrap();
            for len in [0usize, 50, 99, 100, 199, 200, 701, 1300, 1999, 2000, 2001] {
                let samples = vec![0.0f32; len];
                let expected = if len >= chunker.samples_per_chunk {
                    (len - chunker.samples_per_chunk) / chunker.hop_samples
                } else {
                    0
                };
                assert_eq!(chunker.total_chunks(len), expected);
                assert_eq!(chunker.chunks(&samples).count(), expected, "len={len} chunk={chunk} hop={hop}");
            }
        }
    }

    #[test]
    fn chunks_overlap_by_chunk_minus_hop() {
        let chunker = Chunker::new(ChunkConfig::QUICK, 10).unwrap();
        let samples: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let chunks: Vec<_> = chunker.chunks(&samples).collect();
        assert_eq!(chunks[0].samples[10..], chunks[1].samples[..10]);
    }

    #[test]
    fn iteration_is_restartable() {
        let chunker = Chunker::new(ChunkConfig::QUICK, 10).unwrap();
        let samples = vec![0.0f32; 95];
        let first: Vec<_> = chunker.chunks(&samples).map(|c| c.start).collect();
        let second: Vec<_> = chunker.chunks(&samples).map(|c| c.start).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_hop_is_rejected() {
        assert!(matches!(Chunker::new(config(7.0, 0.0), 22050), Err(PipelineError::Config(_))));
        assert!(matches!(Chunker::new(config(0.001, 0.001), 100), Err(PipelineError::Config(_))));
    }
}
