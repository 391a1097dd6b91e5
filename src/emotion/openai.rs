use serde::Deserialize;
use serde_json::{json, Value};

use super::{ClassifierRequest, Emotion, EmotionClassifier, EmotionDistribution};
use crate::config::ClassifierConfig;
use crate::error::{friendly_network_error, ClassifyError, PipelineError};

const SYSTEM_PROMPT: &str = "You are an expert in the emotional analysis of music.";

/// Emotion classifier backed by an OpenAI-compatible chat completions API,
/// using a strict JSON schema for the response.
pub struct OpenAiClassifier {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

impl OpenAiClassifier {
    pub fn new(config: &ClassifierConfig, api_key: String) -> Result<Self, PipelineError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| PipelineError::Config(friendly_network_error(&e)))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
        })
    }

    fn request_body(&self, request: &ClassifierRequest) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": request.prompt() },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "emotion_distribution",
                    "strict": true,
                    "schema": response_schema(),
                },
            },
        })
    }
}

impl EmotionClassifier for OpenAiClassifier {
    fn classify(&self, request: &ClassifierRequest) -> Result<EmotionDistribution, ClassifyError> {
        log::debug!("Classifier prompt: {}", request.prompt());

        let body = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| {
                let msg = friendly_network_error(&e);
                if e.is_timeout() {
                    ClassifyError::Timeout(msg)
                } else {
                    ClassifyError::Failed(msg)
                }
            })?;

        parse_completion(&body)
    }
}

fn response_schema() -> Value {
    let mut properties = serde_json::Map::new();
    for emotion in Emotion::ALL {
        properties.insert(
            emotion.name().to_string(),
            json!({
                "type": "number",
                "description": format!("Percentage likelihood of {} (0-100)", emotion.label()),
            }),
        );
    }
    properties.insert(
        "reasoning".into(),
        json!({
            "type": "string",
            "description": "How the musical features led to the distribution",
        }),
    );
    let required: Vec<&str> = Emotion::ALL
        .iter()
        .map(|e| e.name())
        .chain(std::iter::once("reasoning"))
        .collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// Extract the distribution from a chat completions response body.
pub fn parse_completion(body: &str) -> Result<EmotionDistribution, ClassifyError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ClassifyError::Failed(format!("Malformed completion: {e}")))?;

    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| ClassifyError::Failed("Completion has no choices".into()))?;

    if let Some(refusal) = message.refusal {
        return Err(ClassifyError::Failed(format!("Model refused: {refusal}")));
    }

    let content = message
        .content
        .ok_or_else(|| ClassifyError::Failed("Completion has no content".into()))?;

    serde_json::from_str(&content)
        .map_err(|e| ClassifyError::Failed(format!("Content is not an emotion distribution: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::features::Mode;

    fn completion(content: &str) -> String {
        json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
        .to_string()
    }

    #[test]
    fn parses_structured_content() {
        let content = r#"{"happy":40,"sad":5,"calm":5,"energetic":30,"excited":10,
            "relaxed":2,"angry":3,"romantic":2,"other":3,"reasoning":"fast and major"}"#;
        let d = parse_completion(&completion(content)).unwrap();
        assert_eq!(d.happy, 40.0);
        assert_eq!(d.energetic, 30.0);
        assert_eq!(d.rationale, "fast and major");
    }

    #[test]
    fn refusal_is_failure() {
        let body = json!({
            "choices": [{ "message": { "content": null, "refusal": "no" } }]
        })
        .to_string();
        assert!(matches!(parse_completion(&body), Err(ClassifyError::Failed(_))));
    }

    #[test]
    fn missing_fields_are_failure() {
        let err = parse_completion(&completion(r#"{"happy": 100}"#)).unwrap_err();
        assert!(matches!(err, ClassifyError::Failed(_)));
        assert!(parse_completion("not json").is_err());
        assert!(parse_completion(r#"{"choices": []}"#).is_err());
    }

    #[test]
    fn schema_requires_all_emotions() {
        let schema = response_schema();
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 10);
        assert!(required.iter().any(|v| v == "romantic"));
        assert_eq!(schema["additionalProperties"], false);
    }

    #[test]
    fn request_body_carries_prompt_and_schema() {
        let classifier = OpenAiClassifier::new(&ClassifierConfig::default(), "key".into()).unwrap();
        let body = classifier.request_body(&ClassifierRequest {
            energy: 0.02,
            tempo_bpm: 90.0,
            mode: Mode::Major,
        });
        assert_eq!(body["model"], "gpt-4o-mini");
        assert!(body["messages"][1]["content"].as_str().unwrap().contains("90.0 BPM"));
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert_eq!(classifier.endpoint, "https://api.openai.com/v1/chat/completions");
    }
}
