use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::chunker::ChunkConfig;
use crate::imagery::PollPolicy;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub chunking: ChunkConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
}

#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_openai_url")]
    pub base_url: String,
    #[serde(default = "default_classifier_model")]
    pub model: String,
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_timeout_retries")]
    pub timeout_retries: u32,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageBackend {
    #[default]
    Openai,
    Replicate,
    Disabled,
}

#[derive(Debug, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default)]
    pub backend: ImageBackend,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_image_model")]
    pub model: String,
    #[serde(default = "default_image_size")]
    pub size: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff")]
    pub backoff: f32,
    #[serde(default = "default_synthesis_timeout")]
    pub timeout_secs: u64,
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SynthesisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_url(&self) -> &str {
        match (&self.base_url, self.backend) {
            (Some(url), _) => url,
            (None, ImageBackend::Replicate) => "https://api.replicate.com/v1",
            (None, _) => "https://api.openai.com/v1",
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_attempts,
            backoff: self.backoff,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: default_allowed_hosts(),
            timeout_secs: default_fetch_timeout(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_url(),
            model: default_classifier_model(),
            timeout_secs: default_classifier_timeout(),
            timeout_retries: default_timeout_retries(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            backend: ImageBackend::default(),
            base_url: None,
            model: default_image_model(),
            size: default_image_size(),
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            backoff: default_backoff(),
            timeout_secs: default_synthesis_timeout(),
        }
    }
}

fn default_allowed_hosts() -> Vec<String> { vec!["dsxcdn.adi.gg".into()] }
fn default_fetch_timeout() -> u64 { 60 }
fn default_openai_url() -> String { "https://api.openai.com/v1".into() }
fn default_classifier_model() -> String { "gpt-4o-mini".into() }
fn default_classifier_timeout() -> u64 { 60 }
fn default_timeout_retries() -> u32 { 1 }
fn default_image_model() -> String { "dall-e-3".into() }
fn default_image_size() -> String { "1024x1024".into() }
fn default_poll_interval_ms() -> u64 { 1000 }
fn default_max_attempts() -> u32 { 30 }
fn default_backoff() -> f32 { 1.0 }
fn default_synthesis_timeout() -> u64 { 120 }

/// Explicit path, then `./moodscope.toml`, then the per-user config files.
pub fn find_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("moodscope.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("moodscope").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("moodscope").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.source.allowed_hosts, vec!["dsxcdn.adi.gg"]);
        assert_eq!(cfg.chunking, ChunkConfig::default());
        assert_eq!(cfg.classifier.model, "gpt-4o-mini");
        assert_eq!(cfg.synthesis.backend, ImageBackend::Openai);
        assert_eq!(cfg.synthesis.poll_policy().max_attempts, 30);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse_config(
            r#"
            [chunking]
            chunk_seconds = 2.0

            [synthesis]
            backend = "replicate"
            poll_interval_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(cfg.chunking.chunk_seconds, 2.0);
        assert_eq!(cfg.chunking.hop_seconds, 6.0);
        assert_eq!(cfg.synthesis.base_url(), "https://api.replicate.com/v1");
        assert_eq!(cfg.synthesis.poll_policy().interval, Duration::from_millis(250));
        assert_eq!(cfg.synthesis.max_attempts, 30);
    }

    #[test]
    fn unknown_backend_is_an_error() {
        assert!(parse_config("[synthesis]\nbackend = \"midjourney\"").is_err());
    }

    #[test]
    fn explicit_path_wins() {
        let p = Path::new("/tmp/elsewhere.toml");
        assert_eq!(find_config_path(Some(p)), Some(p.to_path_buf()));
    }
}
