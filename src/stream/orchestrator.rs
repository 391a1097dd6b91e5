use reqwest::Url;

use super::record::{ChunkData, StreamRecord, TrackSummary};
use super::sink::RecordSink;
use crate::audio::chunker::{ChunkConfig, Chunker};
use crate::audio::decode::AudioSource;
use crate::audio::features::ChunkFeatures;
use crate::emotion::{
    ClassifierRequest, EmotionClassifier, EmotionDistribution, EmotionHistory,
};
use crate::error::{ClassifyError, PipelineError, SinkClosed};
use crate::imagery::{synthesize, ImageRequest, ImageSynthesizer, PollPolicy, PROMPT_EMOTIONS};
use crate::source::validate_source;
use crate::visual::waveform::waveform_trace;

const PROGRESS_LOADING: u8 = 5;
/// Floor once the waveform is out; chunks share the rest.
const PROGRESS_WAVEFORM: u8 = 10;
const PROGRESS_DONE: u8 = 100;

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub allowed_hosts: Vec<String>,
    pub chunking: ChunkConfig,
    /// Extra attempts after a classifier timeout.
    pub classify_timeout_retries: u32,
    pub poll: PollPolicy,
}

/// How a stream ended once it started.
#[derive(Debug)]
pub enum StreamOutcome {
    Completed { chunks: usize },
    /// A terminal error record was written.
    Failed(PipelineError),
    /// The consumer went away; nothing more was scheduled.
    Disconnected,
}

/// Reasons chunk processing stops early.
enum Interrupt {
    Fatal(PipelineError),
    Closed(SinkClosed),
}

impl From<PipelineError> for Interrupt {
    fn from(e: PipelineError) -> Self {
        Interrupt::Fatal(e)
    }
}

impl From<SinkClosed> for Interrupt {
    fn from(e: SinkClosed) -> Self {
        Interrupt::Closed(e)
    }
}

/// Writes records while keeping progress non-decreasing.
struct Emitter<'a> {
    sink: &'a mut dyn RecordSink,
    progress: u8,
}

impl<'a> Emitter<'a> {
    fn new(sink: &'a mut dyn RecordSink) -> Self {
        Self { sink, progress: 0 }
    }

    fn send(&mut self, progress: u8, build: impl FnOnce(u8) -> StreamRecord) -> Result<(), SinkClosed> {
        self.progress = self.progress.max(progress.min(PROGRESS_DONE));
        self.sink.emit(&build(self.progress))
    }
}

fn chunk_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return PROGRESS_WAVEFORM;
    }
    let span = (PROGRESS_DONE - PROGRESS_WAVEFORM) as usize;
    PROGRESS_WAVEFORM + (span * done.min(total) / total) as u8
}

/// One processing request: fetch, trace, then per-chunk analysis.
pub struct Pipeline {
    pub source: Box<dyn AudioSource>,
    pub classifier: Box<dyn EmotionClassifier>,
    /// `None` leaves every chunk without an image.
    pub synthesizer: Option<Box<dyn ImageSynthesizer>>,
    pub settings: PipelineSettings,
}

impl Pipeline {
    /// Process `audio_url`, writing records to `sink`.
    ///
    /// A rejected URL returns `Err` before anything is written. Every other
    /// failure ends the stream with a single error record.
    pub fn run(&self, audio_url: &str, sink: &mut dyn RecordSink) -> Result<StreamOutcome, PipelineError> {
        let url = validate_source(audio_url, &self.settings.allowed_hosts)?;
        let mut out = Emitter::new(sink);

        match self.stream(&url, &mut out) {
            Ok(chunks) => Ok(StreamOutcome::Completed { chunks }),
            Err(Interrupt::Closed(e)) => {
                log::warn!("Stopping: {}", e);
                Ok(StreamOutcome::Disconnected)
            }
            Err(Interrupt::Fatal(err)) => {
                log::error!("{}", err);
                let message = err.to_string();
                let progress = out.progress;
                match out.send(progress, |progress| StreamRecord::Error { progress, message }) {
                    Ok(()) => Ok(StreamOutcome::Failed(err)),
                    Err(_) => Ok(StreamOutcome::Disconnected),
                }
            }
        }
    }

    fn stream(&self, url: &Url, out: &mut Emitter) -> Result<usize, Interrupt> {
        out.send(0, |progress| StreamRecord::Starting { progress })?;
        out.send(PROGRESS_LOADING, |progress| StreamRecord::LoadingAudio { progress })?;

        let track = self.source.load(url)?;
        log::info!(
            "Decoded {} samples at {} Hz ({:.1}s)",
            track.samples.len(),
            track.sample_rate,
            track.duration()
        );

        let chunker = Chunker::new(self.settings.chunking, track.sample_rate)?;
        let total = chunker.total_chunks(track.samples.len());
        log::info!(
            "{} chunks of {:.1}s every {:.1}s",
            total,
            self.settings.chunking.chunk_seconds,
            self.settings.chunking.hop_seconds
        );

        let waveform = waveform_trace(&track);
        out.send(PROGRESS_WAVEFORM, |progress| StreamRecord::WaveformReady {
            progress,
            duration_seconds: track.duration(),
            total_chunks: total,
            waveform,
        })?;

        let mut history = EmotionHistory::default();
        let mut previous: Option<ChunkFeatures> = None;
        let rate = track.sample_rate as f32;

        for chunk in chunker.chunks(&track.samples) {
            out.send(chunk_progress(chunk.index - 1, total), |progress| {
                StreamRecord::ProcessingChunk {
                    progress,
                    chunk_index: chunk.index,
                    total_chunks: total,
                    data: None,
                }
            })?;

            let raw = ChunkFeatures::extract(chunk.samples, track.sample_rate);
            let features = raw.or_last_known(previous.as_ref());
            if features != raw {
                log::warn!(
                    "Chunk {}: unusable reading {:?}, using {:?}",
                    chunk.index,
                    raw,
                    features
                );
            }
            log::info!(
                "Chunk {}/{}: energy {:.5}, tempo {:.1} BPM, {}",
                chunk.index,
                total,
                features.energy,
                features.tempo_bpm,
                features.mode.as_str()
            );

            let emotion = self.classify(&features)?;
            let image_ref = self.image_for(&history, &emotion, &features);
            history.push(emotion.clone());
            previous = Some(features);

            let data = ChunkData {
                features,
                start_seconds: chunk.start as f32 / rate,
                end_seconds: chunk.end as f32 / rate,
                emotion,
                image_ref,
            };
            out.send(chunk_progress(chunk.index, total), |progress| {
                StreamRecord::ProcessingChunk {
                    progress,
                    chunk_index: chunk.index,
                    total_chunks: total,
                    data: Some(data),
                }
            })?;
        }

        let summary = history.average().map(|average| {
            let dominant = average.ranked().into_iter().take(PROMPT_EMOTIONS).collect();
            TrackSummary {
                chunks: history.len(),
                average,
                dominant,
            }
        });
        out.send(PROGRESS_DONE, |progress| StreamRecord::Complete { progress, summary })?;

        Ok(history.len())
    }

    fn classify(&self, features: &ChunkFeatures) -> Result<EmotionDistribution, PipelineError> {
        let request = ClassifierRequest::from_features(features);
        let mut retries = 0;
        loop {
            match self.classifier.classify(&request) {
                Ok(distribution) => {
                    distribution.validate().map_err(PipelineError::Classification)?;
                    distribution.check_total();
                    return Ok(distribution);
                }
                Err(ClassifyError::Timeout(reason)) if retries < self.settings.classify_timeout_retries => {
                    retries += 1;
                    log::warn!(
                        "Classifier timed out ({}), retry {}/{}",
                        reason,
                        retries,
                        self.settings.classify_timeout_retries
                    );
                }
                Err(e) => return Err(PipelineError::Classification(e.to_string())),
            }
        }
    }

    /// Image for the chunk, or `None` when disabled, failed, or timed out.
    fn image_for(
        &self,
        history: &EmotionHistory,
        emotion: &EmotionDistribution,
        features: &ChunkFeatures,
    ) -> Option<String> {
        let synthesizer = self.synthesizer.as_deref()?;
        let source = history.prompt_source(emotion);
        let request = ImageRequest::new(&source.ranked(), features);

        match synthesize(synthesizer, &request, &self.settings.poll) {
            Ok(url) => Some(url),
            Err(e) => {
                log::warn!("No image for this chunk: {}", e);
                None
            }
        }
    }
}
