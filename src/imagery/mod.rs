pub mod openai;
pub mod replicate;

use std::time::Duration;

use crate::audio::features::{ChunkFeatures, Mode};
use crate::emotion::RankedEmotion;
use crate::error::SynthesisError;

/// Emotions named in an image prompt.
pub const PROMPT_EMOTIONS: usize = 3;

/// Longest wait between two polls, whatever the backoff.
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Typed input to the image synthesizer.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageRequest {
    /// Strongest first.
    pub emotions: Vec<RankedEmotion>,
    pub tempo_bpm: f32,
    pub mode: Mode,
    pub energy: f32,
}

impl ImageRequest {
    pub fn new(ranked: &[RankedEmotion], features: &ChunkFeatures) -> Self {
        Self {
            emotions: ranked.iter().take(PROMPT_EMOTIONS).copied().collect(),
            tempo_bpm: features.tempo_bpm,
            mode: features.mode,
            energy: features.energy,
        }
    }

    pub fn prompt(&self) -> String {
        let emotions = self
            .emotions
            .iter()
            .map(|r| format!("{} ({:.1}%)", r.emotion.label(), r.percent))
            .collect::<Vec<_>>()
            .join(", ");
        let mode = match self.mode {
            Mode::Unknown => "an ambiguous tonality".to_string(),
            m => format!("a {} key", m.as_str()),
        };
        format!(
            "An abstract painting of how a moment of music feels. Dominant emotions: {}. \
             The music moves at {:.0} BPM in {} with an energy of {:.4}. \
             Let colour, shape and motion carry those feelings; no text, no instruments, \
             no people. Style: abstract, fluid, expressive, vivid.",
            emotions, self.tempo_bpm, mode, self.energy
        )
    }
}

/// Outcome of submitting an image request.
#[derive(Clone, Debug, PartialEq)]
pub enum Submission {
    Ready(String),
    /// Job accepted; poll with this id.
    Pending(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum PollStatus {
    Ready(String),
    Pending,
    Failed(String),
}

/// Produces an image reference for a chunk.
pub trait ImageSynthesizer {
    fn submit(&self, request: &ImageRequest) -> Result<Submission, SynthesisError>;
    fn poll(&self, job_id: &str) -> Result<PollStatus, SynthesisError>;
}

/// Bounded polling schedule for pending jobs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    /// Growth of the interval per attempt; 1.0 keeps it fixed.
    pub backoff: f32,
}

impl PollPolicy {
    /// Wait before poll number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        if !(self.backoff.is_finite() && self.backoff > 1.0) {
            return self.interval;
        }
        let factor = (self.backoff as f64).powi(attempt.saturating_sub(1).min(64) as i32);
        self.interval.mul_f64(factor.min(1e6)).min(MAX_POLL_INTERVAL.max(self.interval))
    }
}

/// Submit and poll until the image is ready, the job fails, or the
/// attempt budget runs out.
pub fn synthesize(
    synthesizer: &dyn ImageSynthesizer,
    request: &ImageRequest,
    policy: &PollPolicy,
) -> Result<String, SynthesisError> {
    log::debug!("Image prompt: {}", request.prompt());

    let job_id = match synthesizer.submit(request)? {
        Submission::Ready(url) => return Ok(url),
        Submission::Pending(id) => id,
    };

    for attempt in 1..=policy.max_attempts {
        std::thread::sleep(policy.delay(attempt));
        match synthesizer.poll(&job_id)? {
            PollStatus::Ready(url) => return Ok(url),
            PollStatus::Pending => {
                log::debug!("Image job {} pending (attempt {}/{})", job_id, attempt, policy.max_attempts);
            }
            PollStatus::Failed(reason) => return Err(SynthesisError::Failed(reason)),
        }
    }

    Err(SynthesisError::Timeout {
        attempts: policy.max_attempts,
    })
}
