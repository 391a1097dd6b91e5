use serde::Deserialize;
use serde_json::{json, Value};

use super::{ImageRequest, ImageSynthesizer, PollStatus, Submission};
use crate::config::SynthesisConfig;
use crate::error::{friendly_network_error, PipelineError, SynthesisError};

/// Replicate predictions API: a submitted prediction is polled until it
/// reaches a terminal status.
pub struct ReplicateImages {
    client: reqwest::blocking::Client,
    base_url: String,
    version: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl ReplicateImages {
    pub fn new(config: &SynthesisConfig, api_token: String) -> Result<Self, PipelineError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| PipelineError::Config(friendly_network_error(&e)))?;
        Ok(Self {
            client,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            version: config.model.clone(),
            api_token,
        })
    }

    fn fetch(&self, builder: reqwest::blocking::RequestBuilder) -> Result<Prediction, SynthesisError> {
        let body = builder
            .bearer_auth(&self.api_token)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| SynthesisError::Failed(friendly_network_error(&e)))?;
        serde_json::from_str(&body)
            .map_err(|e| SynthesisError::Failed(format!("Malformed prediction: {e}")))
    }
}

impl ImageSynthesizer for ReplicateImages {
    fn submit(&self, request: &ImageRequest) -> Result<Submission, SynthesisError> {
        let body = json!({
            "version": self.version,
            "input": { "prompt": request.prompt() },
        });
        let prediction = self.fetch(
            self.client
                .post(format!("{}/predictions", self.base_url))
                .json(&body),
        )?;
        log::debug!("Submitted prediction {} ({})", prediction.id, prediction.status);

        match status_of(&prediction) {
            PollStatus::Ready(url) => Ok(Submission::Ready(url)),
            PollStatus::Pending => Ok(Submission::Pending(prediction.id)),
            PollStatus::Failed(reason) => Err(SynthesisError::Failed(reason)),
        }
    }

    fn poll(&self, job_id: &str) -> Result<PollStatus, SynthesisError> {
        let prediction = self.fetch(
            self.client
                .get(format!("{}/predictions/{}", self.base_url, job_id)),
        )?;
        Ok(status_of(&prediction))
    }
}

fn status_of(prediction: &Prediction) -> PollStatus {
    match prediction.status.as_str() {
        "succeeded" => match prediction.output.as_ref().and_then(first_url) {
            Some(url) => PollStatus::Ready(url),
            None => PollStatus::Failed("prediction succeeded without output".into()),
        },
        "failed" | "canceled" => PollStatus::Failed(
            prediction
                .error
                .as_ref()
                .map(|e| match e {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| format!("prediction {}", prediction.status)),
        ),
        _ => PollStatus::Pending,
    }
}

/// Output is either a URL or a list of URLs.
fn first_url(output: &Value) -> Option<String> {
    match output {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_url),
        _ => None,
    }
}
