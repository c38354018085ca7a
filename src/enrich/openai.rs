use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::GenerationError;

/// A text-generation backend: system instruction + prompt in, free text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiGenerator {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiGenerator {
    pub fn new(settings: &Settings) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(settings.generation_timeout())
            .build()?;
        Ok(OpenAiGenerator {
            http,
            base_url: settings.openai_base_url.trim_end_matches('/').to_string(),
            api_key: settings.openai_api_key.clone().filter(|k| !k.is_empty()),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, GenerationError> {
        let api_key = self.api_key.as_deref().ok_or(GenerationError::MissingApiKey)?;

        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: prompt },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(classify)?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(GenerationError::EmptyResponse)
    }
}

fn classify(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::Network(e)
    }
}
