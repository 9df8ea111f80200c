//! DeepSeek OCR 2, a local vision-language OCR model.
//!
//! The model runs in a worker process started through the [`ModelContext`]. Two
//! inference strategies exist: `transformers` runs one image per call and
//! measures real per-page latency, `vllm` runs every page in a single batch and
//! splits the measured time evenly across pages.

use super::{ExtractOptions, ExtractionBackend, Source, collect_pages};
use crate::core::config::DeepSeekConfig;
use crate::error::{DeckbenchError, Result};
use crate::models::{LaunchSpec, ModelContext, ModelRuntime, RuntimeKey, infer_batch, infer_single};
use crate::types::ExtractedUnit;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Prompt selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeepSeekMode {
    /// Layout-preserving Markdown with grounding.
    #[default]
    Structured,
    Free,
    Figure,
    Describe,
}

impl DeepSeekMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DeepSeekMode::Structured => "structured",
            DeepSeekMode::Free => "free",
            DeepSeekMode::Figure => "figure",
            DeepSeekMode::Describe => "describe",
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            DeepSeekMode::Structured => "<image>\n<|grounding|>Convert the document to markdown.",
            DeepSeekMode::Free => "<image>\nFree OCR.",
            DeepSeekMode::Figure => "<image>\nParse the figure.",
            DeepSeekMode::Describe => "<image>\nDescribe this image in detail.",
        }
    }
}

impl fmt::Display for DeepSeekMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeepSeekMode {
    type Err = DeckbenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "structured" => Ok(DeepSeekMode::Structured),
            "free" => Ok(DeepSeekMode::Free),
            "figure" => Ok(DeepSeekMode::Figure),
            "describe" => Ok(DeepSeekMode::Describe),
            other => Err(DeckbenchError::configuration(format!(
                "Unknown DeepSeek prompt mode '{}' (expected structured, free, figure or describe)",
                other
            ))),
        }
    }
}

/// Inference strategy of the worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeepSeekStrategy {
    /// Sequential, one image per call.
    #[default]
    Transformers,
    /// Batched, all images in one call. No quantization.
    Vllm,
}

impl DeepSeekStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            DeepSeekStrategy::Transformers => "transformers",
            DeepSeekStrategy::Vllm => "vllm",
        }
    }
}

impl fmt::Display for DeepSeekStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeepSeekStrategy {
    type Err = DeckbenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "transformers" => Ok(DeepSeekStrategy::Transformers),
            "vllm" => Ok(DeepSeekStrategy::Vllm),
            other => Err(DeckbenchError::configuration(format!(
                "Unknown DeepSeek strategy '{}' (expected transformers or vllm)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeepSeekBackend {
    context: Arc<ModelContext>,
    command: Vec<String>,
    model: String,
    strategy: DeepSeekStrategy,
    quantize: bool,
    mode: DeepSeekMode,
}

impl DeepSeekBackend {
    pub fn new(context: Arc<ModelContext>, config: &DeepSeekConfig) -> Self {
        Self {
            context,
            command: config.worker_command.clone(),
            model: config.model.clone(),
            strategy: config.strategy,
            quantize: config.quantize,
            mode: config.prompt_mode,
        }
    }

    pub fn with_prompt_mode(mut self, mode: DeepSeekMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_quantize(mut self, quantize: bool) -> Self {
        self.quantize = quantize;
        self
    }

    pub fn mode(&self) -> DeepSeekMode {
        self.mode
    }

    /// Quantization actually applied. vLLM always runs at full precision.
    pub fn effective_quantize(&self) -> bool {
        self.strategy == DeepSeekStrategy::Transformers && self.quantize
    }

    pub fn runtime_key(&self) -> RuntimeKey {
        RuntimeKey::DeepSeek {
            strategy: self.strategy,
            quantize: self.effective_quantize(),
        }
    }

    fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            command: self.command.clone(),
            load: json!({
                "model": self.model,
                "strategy": self.strategy.as_str(),
                "quantize": self.effective_quantize(),
            }),
        }
    }

    async fn runtime(&self) -> Result<Arc<dyn ModelRuntime>> {
        self.context.runtime(self.runtime_key(), &self.launch_spec()).await
    }
}

#[async_trait]
impl ExtractionBackend for DeepSeekBackend {
    fn name(&self) -> &'static str {
        "deepseek"
    }

    fn method_tag(&self) -> String {
        format!("deepseek-ocr2/{}/{}", self.strategy, self.mode)
    }

    fn requires_gpu(&self) -> bool {
        true
    }

    fn notes(&self) -> String {
        let precision = if self.effective_quantize() {
            "4-bit"
        } else {
            "volle Präzision"
        };
        format!("Lokal, {}, Modus: {}", precision, self.mode)
    }

    async fn extract(&self, source: &Source, options: &ExtractOptions) -> Result<Vec<ExtractedUnit>> {
        let pages = collect_pages(source, options).await?;
        let runtime = self.runtime().await?;
        let tag = self.method_tag();
        let prompt = self.mode.prompt();

        let units = match self.strategy {
            DeepSeekStrategy::Vllm => {
                if pages.is_empty() {
                    return Ok(Vec::new());
                }

                let start = Instant::now();
                let texts = infer_batch(runtime.as_ref(), self.name(), &pages.paths(), prompt).await?;
                let per_page = start.elapsed().as_secs_f64() / pages.len() as f64;
                tracing::debug!("DeepSeek batch of {} pages, {:.3}s per page", pages.len(), per_page);

                pages
                    .pages()
                    .iter()
                    .zip(texts)
                    .map(|(page, text)| {
                        ExtractedUnit::new(page.number, text, tag.clone(), Duration::from_secs_f64(per_page))
                            .with_title(page.title.clone().unwrap_or_default())
                    })
                    .collect()
            }
            DeepSeekStrategy::Transformers => {
                let mut units = Vec::with_capacity(pages.len());
                for page in pages.pages() {
                    tracing::debug!("DeepSeek OCR page {}: {}", page.number, page.path.display());

                    let start = Instant::now();
                    let text = infer_single(runtime.as_ref(), self.name(), &page.path, prompt).await?;
                    let unit = ExtractedUnit::new(page.number, text, tag.clone(), start.elapsed())
                        .with_title(page.title.clone().unwrap_or_default());

                    tracing::debug!("  {} chars, {:.2}s", unit.char_count(), unit.elapsed_seconds);
                    units.push(unit);
                }
                units
            }
        };

        Ok(units)
    }
}
