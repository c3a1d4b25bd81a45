use crate::config::KeyFromEnv;
use crate::core::LowLevelClient;
use crate::error::{AIError, OpenAIError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

pub mod models;
pub use models::OpenAIModel;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub model: OpenAIModel,
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: OpenAIClient::find_key().unwrap_or_default(),
            model: OpenAIModel::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: 4096,
            // High temperature keeps distractors varied between generations
            temperature: 0.9,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OpenAIClient {
    config: OpenAIConfig,
    http: reqwest::Client,
}

impl KeyFromEnv for OpenAIClient {
    const KEY_NAME: &'static str = "OPENAI_API_KEY";
}

impl Default for OpenAIClient {
    fn default() -> Self {
        Self::new(OpenAIConfig::default())
    }
}

impl OpenAIClient {
    pub fn new(config: OpenAIConfig) -> Self {
        info!(model = %config.model.id(), "Creating new OpenAI client");
        Self { config, http: reqwest::Client::new() }
    }

    /// Client configured from the environment; fails if `OPENAI_API_KEY` is unset.
    pub fn from_env() -> Result<Self, AIError> {
        let api_key = Self::require_key()?;
        Ok(Self::new(OpenAIConfig { api_key, ..OpenAIConfig::default() }))
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, prompt: String) -> ChatRequest<'_> {
        ChatRequest {
            model: self.config.model.id(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            messages: vec![ChatMessage { role: "user".to_string(), content: prompt }],
        }
    }
}

fn first_choice_content(parsed: ChatResponse) -> Result<String, AIError> {
    let choice = parsed.choices.into_iter().next()
        .ok_or_else(|| AIError::OpenAI(OpenAIError::Api("No choices in response".into())))?;
    choice.message.content
        .ok_or_else(|| AIError::OpenAI(OpenAIError::Api("Response message has no content".into())))
}

#[async_trait]
impl LowLevelClient for OpenAIClient {
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len(), model = %self.config.model.id()))]
    async fn ask_raw(&self, prompt: String) -> Result<String, AIError> {
        if self.config.api_key.is_empty() {
            return Err(AIError::MissingApiKey(Self::KEY_NAME));
        }

        let body = self.request_body(prompt);
        debug!("Sending request to OpenAI API");
        let resp = self.http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send().await
            .map_err(|e| {
                error!(error = %e, "HTTP request failed");
                AIError::OpenAI(OpenAIError::Http(e.to_string()))
            })?;

        let status = resp.status();
        debug!(%status, "Received response from OpenAI API");
        if status == 401 {
            error!("OpenAI API authentication failed");
            return Err(AIError::OpenAI(OpenAIError::Authentication));
        }
        if status == 429 {
            warn!("OpenAI API rate limit exceeded");
            return Err(AIError::OpenAI(OpenAIError::RateLimit));
        }
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(%status, error = %txt, "OpenAI API error");
            return Err(AIError::OpenAI(OpenAIError::Api(txt)));
        }

        let parsed: ChatResponse = resp.json().await
            .map_err(|e| AIError::OpenAI(OpenAIError::Http(e.to_string())))?;
        let content = first_choice_content(parsed)?;

        info!(response_len = content.len(), "Successfully received OpenAI response");
        Ok(content)
    }

    fn clone_box(&self) -> Box<dyn LowLevelClient> { Box::new(self.clone()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<String, AIError> {
        first_choice_content(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn content_comes_from_the_first_choice() {
        let json = r#"{"choices":[{"message":{"content":"Stem"}},{"message":{"content":"other"}}]}"#;
        assert_eq!(parse(json).unwrap(), "Stem");
    }

    #[test]
    fn missing_choices_and_null_content_are_reported_apart() {
        let empty = parse(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(empty, AIError::OpenAI(OpenAIError::Api(ref m)) if m == "No choices in response"));

        let null = parse(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap_err();
        assert!(matches!(null, AIError::OpenAI(OpenAIError::Api(ref m)) if m == "Response message has no content"));

        let absent = parse(r#"{"choices":[{"message":{"role":"assistant"}}]}"#).unwrap_err();
        assert!(matches!(absent, AIError::OpenAI(OpenAIError::Api(ref m)) if m == "Response message has no content"));
    }
}
