use thiserror::Error;

/// Errors that end a processing request.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The source URL is not acceptable. Raised before any stream starts.
    #[error("Source rejected: {0}")]
    Validation(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Emotion classification failed: {0}")]
    Classification(String),
}

/// Failure of a single emotion classifier call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifyError {
    /// The call did not answer in time; the caller may retry.
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Failed(String),
}

/// Failure of image synthesis. Never fatal to a stream.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    #[error("image not ready after {attempts} polls")]
    Timeout { attempts: u32 },

    #[error("image generation failed: {0}")]
    Failed(String),
}

/// The consumer of the record stream went away.
#[derive(Error, Debug)]
#[error("record consumer disconnected: {0}")]
pub struct SinkClosed(pub String);

pub fn friendly_network_error(e: &reqwest::Error) -> String {
    if e.is_builder() {
        if let Some(url) = e.url() {
            return format!("Invalid URL: {url}");
        }
        return "Invalid URL".to_string();
    }
    if e.is_connect() {
        if let Some(url) = e.url() {
            return format!("Could not connect to {}", url.host_str().unwrap_or("server"));
        }
        return "Could not connect to server".to_string();
    }
    if e.is_timeout() {
        return "Connection timed out".to_string();
    }
    if let Some(status) = e.status() {
        return format!("HTTP {}", status.as_u16());
    }
    if e.is_decode() {
        return "Invalid response from server".to_string();
    }
    format!("Network error: {e}")
}
