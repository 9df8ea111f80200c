//! GLM-OCR behind a locally hosted OpenAI-compatible endpoint.
//!
//! Typically served with `vllm serve zai-org/GLM-OCR-9B --served-model-name glm-ocr`.

use super::{ExtractOptions, ExtractionBackend, Source, collect_pages};
use crate::core::config::GlmConfig;
use crate::error::{DeckbenchError, Result};
use crate::llm::openai::{ChatCompletions, ChatMessage, ChatRequest, ContentPart};
use crate::types::ExtractedUnit;
use crate::utils::encode_image_file;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

const MAX_COMPLETION_TOKENS: u32 = 4096;

/// Prompt selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlmMode {
    #[default]
    Structured,
    Free,
    Figure,
    Describe,
    Invoice,
}

impl GlmMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GlmMode::Structured => "structured",
            GlmMode::Free => "free",
            GlmMode::Figure => "figure",
            GlmMode::Describe => "describe",
            GlmMode::Invoice => "invoice",
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            GlmMode::Structured => {
                "Extract all visible text from this document image and preserve layout in Markdown. \
                 Include headings, tables, bullets, and labels."
            }
            GlmMode::Free => "Transcribe all visible text as plain text. Keep line breaks where useful.",
            GlmMode::Figure => {
                "Analyze the diagram/figure and produce a detailed textual process description, \
                 including nodes, transitions, conditions, and dependencies."
            }
            GlmMode::Describe => {
                "Describe this document image in detail for semantic retrieval. Include structure, \
                 entities, relations, and key facts."
            }
            GlmMode::Invoice => {
                "Extract this invoice/document as structured Markdown with sender, recipient, \
                 invoice numbers/dates, line items, totals, and payment details."
            }
        }
    }
}

impl fmt::Display for GlmMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GlmMode {
    type Err = DeckbenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "structured" => Ok(GlmMode::Structured),
            "free" => Ok(GlmMode::Free),
            "figure" => Ok(GlmMode::Figure),
            "describe" => Ok(GlmMode::Describe),
            "invoice" => Ok(GlmMode::Invoice),
            other => Err(DeckbenchError::configuration(format!(
                "Unknown GLM-OCR prompt mode '{}' (expected structured, free, figure, describe or invoice)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GlmBackend {
    client: ChatCompletions,
    model: String,
    mode: GlmMode,
}

impl GlmBackend {
    pub fn new(config: &GlmConfig) -> Self {
        Self {
            client: ChatCompletions::new("glm-ocr", &config.base_url, &config.api_key),
            model: config.model.clone(),
            mode: config.prompt_mode,
        }
    }

    pub fn with_prompt_mode(mut self, mode: GlmMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> GlmMode {
        self.mode
    }

    async fn transcribe(&self, image: &crate::utils::EncodedImage) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: Some(0.0),
            max_completion_tokens: MAX_COMPLETION_TOKENS,
            messages: vec![ChatMessage::user_parts(vec![
                ContentPart::text(self.mode.prompt()),
                ContentPart::image(image),
            ])],
        };
        Ok(self.client.create(&request).await?.trim().to_string())
    }
}

#[async_trait]
impl ExtractionBackend for GlmBackend {
    fn name(&self) -> &'static str {
        "glm"
    }

    fn method_tag(&self) -> String {
        format!("glm-ocr/{}/{}", self.model, self.mode)
    }

    fn requires_gpu(&self) -> bool {
        true
    }

    fn notes(&self) -> String {
        format!("Lokal gehostet, Modus: {}", self.mode)
    }

    async fn extract(&self, source: &Source, options: &ExtractOptions) -> Result<Vec<ExtractedUnit>> {
        let pages = collect_pages(source, options).await?;
        let tag = self.method_tag();
        let mut units = Vec::with_capacity(pages.len());

        for page in pages.pages() {
            tracing::debug!("GLM-OCR page {}: {}", page.number, page.path.display());

            let start = Instant::now();
            let image = encode_image_file(&page.path).await?;
            let text = self.transcribe(&image).await?;
            let unit = ExtractedUnit::new(page.number, text, tag.clone(), start.elapsed())
                .with_title(page.title.clone().unwrap_or_default());

            units.push(unit);
        }

        Ok(units)
    }
}
