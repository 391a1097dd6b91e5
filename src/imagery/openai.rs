use serde::Deserialize;
use serde_json::{json, Value};

use super::{ImageRequest, ImageSynthesizer, PollStatus, Submission};
use crate::config::SynthesisConfig;
use crate::error::{friendly_network_error, PipelineError, SynthesisError};

/// OpenAI image generation. The endpoint answers synchronously, so every
/// successful submission is immediately ready.
pub struct OpenAiImages {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    size: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    url: Option<String>,
}

impl OpenAiImages {
    pub fn new(config: &SynthesisConfig, api_key: String) -> Result<Self, PipelineError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| PipelineError::Config(friendly_network_error(&e)))?;
        Ok(Self {
            client,
            endpoint: format!("{}/images/generations", config.base_url().trim_end_matches('/')),
            model: config.model.clone(),
            size: config.size.clone(),
            api_key,
        })
    }

    fn request_body(&self, request: &ImageRequest) -> Value {
        json!({
            "model": self.model,
            "prompt": request.prompt(),
            "size": self.size,
            "quality": "standard",
            "n": 1,
        })
    }
}

impl ImageSynthesizer for OpenAiImages {
    fn submit(&self, request: &ImageRequest) -> Result<Submission, SynthesisError> {
        let body = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| SynthesisError::Failed(friendly_network_error(&e)))?;

        parse_images(&body).map(Submission::Ready)
    }

    fn poll(&self, job_id: &str) -> Result<PollStatus, SynthesisError> {
        Err(SynthesisError::Failed(format!(
            "image generation has no pending jobs to poll (got '{job_id}')"
        )))
    }
}

fn parse_images(body: &str) -> Result<String, SynthesisError> {
    let response: ImagesResponse = serde_json::from_str(body)
        .map_err(|e| SynthesisError::Failed(format!("Malformed image response: {e}")))?;
    response
        .data
        .into_iter()
        .find_map(|d| d.url)
        .ok_or_else(|| SynthesisError::Failed("Image response has no URL".into()))
}
