//! OpenAI-compatible `chat/completions` client.
//!
//! Used for OpenAI itself and for locally hosted endpoints that speak the same
//! protocol (GLM-OCR behind vLLM).

use crate::error::{DeckbenchError, Result};
use crate::utils::EncodedImage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub max_completion_tokens: u32,
    pub messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: MessageContent<'a>,
}

impl<'a> ChatMessage<'a> {
    pub fn system(text: &'a str) -> Self {
        Self {
            role: "system",
            content: MessageContent::Text(text),
        }
    }

    pub fn user(text: &'a str) -> Self {
        Self {
            role: "user",
            content: MessageContent::Text(text),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart<'a>>) -> Self {
        Self {
            role: "user",
            content: MessageContent::Parts(parts),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

impl<'a> ContentPart<'a> {
    pub fn text(text: &'a str) -> Self {
        ContentPart::Text { text }
    }

    /// High-detail inline image.
    pub fn image(image: &EncodedImage) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: image.data_url(),
                detail: "high",
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ImageUrl {
    pub url: String,
    pub detail: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the first choice's text. A null content is an empty string.
pub fn parse_chat_response(label: &str, body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| DeckbenchError::malformed_response_with_source(format!("{} returned invalid JSON", label), e))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| DeckbenchError::malformed_response(format!("{} returned no choices", label)))?;

    Ok(choice.message.content.unwrap_or_default())
}

/// Client bound to one endpoint and key.
#[derive(Debug, Clone)]
pub struct ChatCompletions {
    http: reqwest::Client,
    label: String,
    base_url: String,
    api_key: String,
}

impl ChatCompletions {
    /// `label` names the backend in errors (`openai`, `glm-ocr`).
    pub fn new(label: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            label: label.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Send `request` and return the first choice's text.
    pub async fn create(&self, request: &ChatRequest<'_>) -> Result<String> {
        tracing::debug!("POST {} (model {})", self.endpoint(), request.model);

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| DeckbenchError::backend(&self.label, format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(DeckbenchError::backend(&self.label, format!("status {}: {}", status, body)));
        }

        parse_chat_response(&self.label, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_request_shape() {
        let request = ChatRequest {
            model: "gpt-5.2",
            temperature: Some(0.0),
            max_completion_tokens: 4096,
            messages: vec![ChatMessage::system("sys"), ChatMessage::user("hi")],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "gpt-5.2",
                "temperature": 0.0,
                "max_completion_tokens": 4096,
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "hi"}
                ]
            })
        );
    }

    #[test]
    fn test_image_part_shape() {
        let image = EncodedImage {
            data: "QUJD".into(),
            media_type: "image/png",
        };
        let message = ChatMessage::user_parts(vec![ContentPart::text("Lies das"), ContentPart::image(&image)]);
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["content"][0], json!({"type": "text", "text": "Lies das"}));
        assert_eq!(
            value["content"][1],
            json!({"type": "image_url", "image_url": {"url": "data:image/png;base64,QUJD", "detail": "high"}})
        );
    }

    #[test]
    fn test_temperature_omitted_when_unset() {
        let request = ChatRequest {
            model: "m",
            temperature: None,
            max_completion_tokens: 1,
            messages: vec![],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("temperature").is_none());
    }

    #[test]
    fn test_parse_chat_response() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Rechnung"}}]}"#;
        assert_eq!(parse_chat_response("openai", body).unwrap(), "Rechnung");
    }

    #[test]
    fn test_parse_chat_response_null_content() {
        let body = r#"{"choices":[{"message":{"content":null}}]}"#;
        assert_eq!(parse_chat_response("glm-ocr", body).unwrap(), "");
    }

    #[test]
    fn test_parse_chat_response_without_choices() {
        let err = parse_chat_response("openai", r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, DeckbenchError::MalformedResponse { .. }));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = ChatCompletions::new("glm-ocr", "http://127.0.0.1:8000/v1/", "EMPTY");
        assert_eq!(client.endpoint(), "http://127.0.0.1:8000/v1/chat/completions");
    }
}
