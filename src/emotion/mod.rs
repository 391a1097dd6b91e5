pub mod openai;

use serde::{Deserialize, Serialize};

use crate::audio::features::{ChunkFeatures, Mode};
use crate::error::ClassifyError;

/// How far the percentages may drift from 100 before a warning is logged.
pub const SUM_TOLERANCE: f32 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Calm,
    Energetic,
    Excited,
    Relaxed,
    Angry,
    Romantic,
    Other,
}

impl Emotion {
    pub const ALL: [Emotion; 9] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Calm,
        Emotion::Energetic,
        Emotion::Excited,
        Emotion::Relaxed,
        Emotion::Angry,
        Emotion::Romantic,
        Emotion::Other,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Calm => "calm",
            Emotion::Energetic => "energetic",
            Emotion::Excited => "excited",
            Emotion::Relaxed => "relaxed",
            Emotion::Angry => "angry",
            Emotion::Romantic => "romantic",
            Emotion::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Emotion::Happy => "Happy",
            Emotion::Sad => "Sad",
            Emotion::Calm => "Calm",
            Emotion::Energetic => "Energetic",
            Emotion::Excited => "Excited",
            Emotion::Relaxed => "Relaxed",
            Emotion::Angry => "Angry",
            Emotion::Romantic => "Romantic",
            Emotion::Other => "Other",
        }
    }
}

/// Percentage per emotion (0-100 each) plus the classifier's explanation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionDistribution {
    pub happy: f32,
    pub sad: f32,
    pub calm: f32,
    pub energetic: f32,
    pub excited: f32,
    pub relaxed: f32,
    pub angry: f32,
    pub romantic: f32,
    pub other: f32,
    #[serde(alias = "reasoning", default)]
    pub rationale: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RankedEmotion {
    pub emotion: Emotion,
    pub percent: f32,
}

impl EmotionDistribution {
    pub fn get(&self, emotion: Emotion) -> f32 {
        match emotion {
            Emotion::Happy => self.happy,
            Emotion::Sad => self.sad,
            Emotion::Calm => self.calm,
            Emotion::Energetic => self.energetic,
            Emotion::Excited => self.excited,
            Emotion::Relaxed => self.relaxed,
            Emotion::Angry => self.angry,
            Emotion::Romantic => self.romantic,
            Emotion::Other => self.other,
        }
    }

    fn get_mut(&mut self, emotion: Emotion) -> &mut f32 {
        match emotion {
            Emotion::Happy => &mut self.happy,
            Emotion::Sad => &mut self.sad,
            Emotion::Calm => &mut self.calm,
            Emotion::Energetic => &mut self.energetic,
            Emotion::Excited => &mut self.excited,
            Emotion::Relaxed => &mut self.relaxed,
            Emotion::Angry => &mut self.angry,
            Emotion::Romantic => &mut self.romantic,
            Emotion::Other => &mut self.other,
        }
    }

    /// Every field must be a finite percentage.
    pub fn validate(&self) -> Result<(), String> {
        for emotion in Emotion::ALL {
            let v = self.get(emotion);
            if !v.is_finite() || !(0.0..=100.0).contains(&v) {
                return Err(format!("{} = {} is outside 0-100", emotion.name(), v));
            }
        }
        Ok(())
    }

    pub fn total(&self) -> f32 {
        Emotion::ALL.iter().map(|&e| self.get(e)).sum()
    }

    /// Whether any emotion carries weight.
    pub fn is_informative(&self) -> bool {
        self.total() > 0.0
    }

    /// Emotions by descending percentage; ties keep declaration order.
    pub fn ranked(&self) -> Vec<RankedEmotion> {
        let mut ranked: Vec<RankedEmotion> = Emotion::ALL
            .iter()
            .map(|&emotion| RankedEmotion {
                emotion,
                percent: self.get(emotion),
            })
            .collect();
        ranked.sort_by(|a, b| b.percent.total_cmp(&a.percent));
        ranked
    }

    /// Log a warning when the percentages do not add up to roughly 100.
    /// The classifier owns that constraint, so a mismatch is not an error.
    pub fn check_total(&self) -> bool {
        let total = self.total();
        let ok = (total - 100.0).abs() <= SUM_TOLERANCE;
        if !ok {
            log::warn!("Emotion percentages sum to {:.1}, expected 100", total);
        }
        ok
    }
}

/// Typed input to the emotion classifier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClassifierRequest {
    pub energy: f32,
    pub tempo_bpm: f32,
    pub mode: Mode,
}

impl ClassifierRequest {
    pub fn from_features(features: &ChunkFeatures) -> Self {
        Self {
            energy: features.energy,
            tempo_bpm: features.tempo_bpm,
            mode: features.mode,
        }
    }

    pub fn prompt(&self) -> String {
        format!(
            "Classify the emotional content of a short excerpt of music from these features:\n\
             - Energy (mean squared amplitude): {:.6}\n\
             - Tempo: {:.1} BPM\n\
             - Tonal mode: {}\n\n\
             Give a percentage likelihood (0-100) for each of: happy, sad, calm, energetic, \
             excited, relaxed, angry, romantic, other. The percentages should add up to 100. \
             Explain briefly in `reasoning` how energy, tempo and mode led to the distribution.",
            self.energy,
            self.tempo_bpm,
            self.mode.as_str()
        )
    }
}

/// Maps a chunk's features to an emotion distribution.
pub trait EmotionClassifier {
    fn classify(&self, request: &ClassifierRequest) -> Result<EmotionDistribution, ClassifyError>;
}

/// Append-only record of the distributions seen during one request.
#[derive(Debug, Default)]
pub struct EmotionHistory {
    entries: Vec<EmotionDistribution>,
}

impl EmotionHistory {
    pub fn push(&mut self, distribution: EmotionDistribution) {
        self.entries.push(distribution);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_informative(&self) -> Option<&EmotionDistribution> {
        self.entries.iter().rev().find(|d| d.is_informative())
    }

    /// `current` when it carries weight, else the last distribution that did.
    pub fn prompt_source<'a>(&'a self, current: &'a EmotionDistribution) -> &'a EmotionDistribution {
        if current.is_informative() {
            return current;
        }
        self.last_informative().unwrap_or(current)
    }

    /// Field-wise mean of every entry.
    pub fn average(&self) -> Option<EmotionDistribution> {
        if self.entries.is_empty() {
            return None;
        }
        let n = self.entries.len() as f32;
        let mut avg = EmotionDistribution::default();
        for entry in &self.entries {
            for emotion in Emotion::ALL {
                *avg.get_mut(emotion) += entry.get(emotion) / n;
            }
        }
        avg.rationale = format!("Mean over {} chunks", self.entries.len());
        Some(avg)
    }
}
