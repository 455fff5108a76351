//! Chat-completions request and response bodies, and the scoring prompt.

use feedguard_core::{ClassificationResult, ClassifierConfig, ClassifierError, CoreError, TopicRule};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            kind: "json_object".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub stream: bool,
    pub response_format: ResponseFormat,
    pub stop: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Sampling parameters shared by every classification request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
}

impl From<&ClassifierConfig> for RequestOptions {
    fn from(config: &ClassifierConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
        }
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::from(&ClassifierConfig::default())
    }
}

/// System instruction listing one output field per rule, then each rule's
/// description as scoring guidance.
pub fn build_system_prompt(rules: &[TopicRule]) -> String {
    let fields = rules
        .iter()
        .map(|rule| format!("    {}: 0.0", Value::String(rule.name.clone())))
        .collect::<Vec<_>>()
        .join(",\n");

    let guidance = rules
        .iter()
        .map(|rule| format!("{}: {}", rule.name, rule.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Your task is to evaluate Tweets/X posts. Always respond in JSON. Follow this format:\n\n\
         {{\n{}\n}}\n\n\
         Rate the provided post from 0.0 to 1.0 for each topic. \
         Here are the descriptions for each topic:\n\n{}",
        fields, guidance
    )
}

pub fn build_request(text: &str, rules: &[TopicRule], options: &RequestOptions) -> ChatRequest {
    ChatRequest {
        messages: vec![
            ChatMessage::system(build_system_prompt(rules)),
            ChatMessage::user(text),
        ],
        model: options.model.clone(),
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        top_p: options.top_p,
        stream: false,
        response_format: ResponseFormat::json_object(),
        stop: None,
    }
}

/// Pulls the JSON object out of the first generated message.
pub fn parse_scores(response: &ChatResponse, provider: &str) -> Result<ClassificationResult, CoreError> {
    let choice = response
        .choices
        .first()
        .ok_or_else(|| ClassifierError::EmptyChoices {
            provider: provider.to_string(),
        })?;

    let content = choice
        .message
        .content
        .as_deref()
        .ok_or_else(|| ClassifierError::InvalidResponseFormat {
            provider: provider.to_string(),
            details: "message has no content".to_string(),
        })?;

    let payload: Value = serde_json::from_str(content)?;
    ClassificationResult::from_value(payload).ok_or_else(|| {
        ClassifierError::InvalidResponseFormat {
            provider: provider.to_string(),
            details: "content is not a JSON object".to_string(),
        }
        .into()
    })
}
