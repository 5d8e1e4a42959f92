use std::time::Duration;

use log::warn;
use reqwest::blocking::Client;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use galley_core::config::LlmSettings;
use galley_core::model::{ChatModel, ModelCallError, ModelReply, ModelRequest, TokenUsage};

use crate::base_url::resolve_endpoint;
use crate::error::AdapterError;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Blocking client for the messages endpoint. One instance is shared across
/// worker threads; reqwest's blocking client is internally pooled.
pub struct AnthropicModel {
    client: Client,
    url: String,
    api_key: String,
    model: String,
}

impl AnthropicModel {
    pub fn new(
        api_key: String,
        base_url: &str,
        model: String,
        timeout: u64,
    ) -> Result<Self, AdapterError> {
        if api_key.trim().is_empty() {
            return Err(AdapterError::InvalidConfig(
                "api_key must not be empty".to_string(),
            ));
        }
        if model.trim().is_empty() {
            return Err(AdapterError::InvalidConfig(
                "model must not be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout.max(1)))
            .build()?;

        Ok(Self {
            client,
            url: resolve_endpoint(base_url),
            api_key,
            model,
        })
    }

    pub fn from_settings(settings: &LlmSettings) -> Result<Self, AdapterError> {
        Self::new(
            settings.api_key.clone(),
            &settings.base_url,
            settings.model.clone(),
            settings.timeout,
        )
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    fn headers(&self) -> Result<HeaderMap, ModelCallError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|err| ModelCallError::Transport(format!("invalid api key: {err}")))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        Ok(headers)
    }
}

impl ChatModel for AnthropicModel {
    fn complete(&self, request: &ModelRequest<'_>) -> Result<ModelReply, ModelCallError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: vec![Message {
                role: "user",
                content: request.prompt,
            }],
        };

        let response = self
            .client
            .post(&self.url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .map_err(|err| ModelCallError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ModelCallError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .map_err(|err| ModelCallError::Transport(format!("invalid response body: {err}")))?;

        let mut text = String::new();
        for block in parsed.content {
            if let Some(part) = block.text {
                text.push_str(&part);
            }
        }
        if text.trim().is_empty() {
            warn!("model `{}` returned an empty reply", self.model);
            return Err(ModelCallError::EmptyReply);
        }

        Ok(ModelReply {
            text,
            usage: TokenUsage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
            },
        })
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_credentials() {
        assert!(matches!(
            AnthropicModel::new(String::new(), "", "claude-3-5-sonnet-20241022".into(), 60),
            Err(AdapterError::InvalidConfig(_))
        ));
        assert!(matches!(
            AnthropicModel::new("sk-test".into(), "", String::new(), 60),
            Err(AdapterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn response_shape_parses() {
        let raw = r#"{
            "content": [{"type": "text", "text": "{\"overallScore\": 8}"}],
            "usage": {"input_tokens": 1200, "output_tokens": 340}
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.content.len(), 1);
        assert_eq!(parsed.usage.input_tokens, 1200);
        assert_eq!(parsed.usage.output_tokens, 340);
    }

    #[test]
    fn request_shape_serializes() {
        let body = MessagesRequest {
            model: "claude-3-5-sonnet-20241022",
            max_tokens: 2048,
            temperature: 0.3,
            messages: vec![Message {
                role: "user",
                content: "analyze this",
            }],
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "claude-3-5-sonnet-20241022");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "analyze this");
    }
}
