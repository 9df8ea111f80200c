//! Anthropic Messages API client.

use crate::error::{DeckbenchError, Result};
use crate::utils::EncodedImage;
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
pub struct MessagesRequest<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    pub system: &'a str,
    pub messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
pub struct Message<'a> {
    pub role: &'static str,
    pub content: Content<'a>,
}

impl<'a> Message<'a> {
    pub fn user(text: &'a str) -> Self {
        Self {
            role: "user",
            content: Content::Text(text),
        }
    }

    pub fn user_blocks(blocks: Vec<Block<'a>>) -> Self {
        Self {
            role: "user",
            content: Content::Blocks(blocks),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Content<'a> {
    Text(&'a str),
    Blocks(Vec<Block<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Block<'a> {
    Image { source: ImageSource<'a> },
    Text { text: &'a str },
}

impl<'a> Block<'a> {
    pub fn image(image: &'a EncodedImage) -> Self {
        Block::Image {
            source: ImageSource {
                kind: "base64",
                media_type: image.media_type,
                data: &image.data,
            },
        }
    }

    pub fn text(text: &'a str) -> Self {
        Block::Text { text }
    }
}

#[derive(Debug, Serialize)]
pub struct ImageSource<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub media_type: &'static str,
    pub data: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Text of the first content block.
pub fn parse_messages_response(body: &str) -> Result<String> {
    let response: MessagesResponse = serde_json::from_str(body)
        .map_err(|e| DeckbenchError::malformed_response_with_source("anthropic returned invalid JSON", e))?;

    let block = response
        .content
        .into_iter()
        .next()
        .ok_or_else(|| DeckbenchError::malformed_response("anthropic returned no content blocks"))?;

    Ok(block.text.unwrap_or_default())
}

#[derive(Debug, Clone)]
pub struct MessagesClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl MessagesClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/messages", self.base_url)
    }

    pub async fn create(&self, request: &MessagesRequest<'_>) -> Result<String> {
        tracing::debug!("POST {} (model {})", self.endpoint(), request.model);

        let response = self
            .http
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| DeckbenchError::backend("anthropic", format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(DeckbenchError::backend("anthropic", format!("status {}: {}", status, body)));
        }

        parse_messages_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_vision_request_shape() {
        let image = EncodedImage {
            data: "QUJD".into(),
            media_type: "image/png",
        };
        let request = MessagesRequest {
            model: "claude-opus-4-5-20251101",
            max_tokens: 4096,
            system: "sys",
            messages: vec![Message::user_blocks(vec![Block::image(&image), Block::text("Analysiere")])],
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["system"], "sys");
        assert_eq!(
            value["messages"][0]["content"][0],
            json!({"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "QUJD"}})
        );
        assert_eq!(value["messages"][0]["content"][1], json!({"type": "text", "text": "Analysiere"}));
    }

    #[test]
    fn test_text_message_is_plain_string() {
        let value = serde_json::to_value(Message::user("hallo")).unwrap();
        assert_eq!(value, json!({"role": "user", "content": "hallo"}));
    }

    #[test]
    fn test_parse_messages_response() {
        let body = r##"{"content":[{"type":"text","text":"# Agenda"}],"stop_reason":"end_turn"}"##;
        assert_eq!(parse_messages_response(body).unwrap(), "# Agenda");
    }

    #[test]
    fn test_parse_messages_response_empty() {
        assert!(matches!(
            parse_messages_response(r#"{"content":[]}"#),
            Err(DeckbenchError::MalformedResponse { .. })
        ));
    }
}
