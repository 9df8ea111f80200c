//! EasyOCR, the second local OCR model in the local benchmark.

use super::{ExtractOptions, ExtractionBackend, Source, collect_pages};
use crate::core::config::EasyOcrConfig;
use crate::error::Result;
use crate::models::{LaunchSpec, ModelContext, RuntimeKey, infer_single};
use crate::types::ExtractedUnit;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

pub const EASYOCR_METHOD: &str = "easyocr-local";

/// Join recognised paragraphs, dropping blank ones.
pub fn join_paragraphs(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone)]
pub struct EasyOcrBackend {
    context: Arc<ModelContext>,
    command: Vec<String>,
    languages: Vec<String>,
    gpu: bool,
}

impl EasyOcrBackend {
    pub fn new(context: Arc<ModelContext>, config: &EasyOcrConfig) -> Self {
        Self {
            context,
            command: config.worker_command.clone(),
            languages: config.languages.clone(),
            gpu: config.gpu,
        }
    }

    pub fn with_gpu(mut self, gpu: bool) -> Self {
        self.gpu = gpu;
        self
    }

    pub fn runtime_key(&self) -> RuntimeKey {
        RuntimeKey::EasyOcr {
            languages: self.languages.clone(),
            gpu: self.gpu,
        }
    }

    fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            command: self.command.clone(),
            load: json!({ "languages": self.languages, "gpu": self.gpu }),
        }
    }
}

#[async_trait]
impl ExtractionBackend for EasyOcrBackend {
    fn name(&self) -> &'static str {
        "easyocr"
    }

    fn method_tag(&self) -> String {
        EASYOCR_METHOD.to_string()
    }

    fn requires_gpu(&self) -> bool {
        true
    }

    fn notes(&self) -> String {
        format!(
            "Lokal, Sprachen: {}, GPU: {}",
            self.languages.join("+"),
            if self.gpu { "ja" } else { "nein" }
        )
    }

    async fn extract(&self, source: &Source, options: &ExtractOptions) -> Result<Vec<ExtractedUnit>> {
        let pages = collect_pages(source, options).await?;
        let runtime = self.context.runtime(self.runtime_key(), &self.launch_spec()).await?;
        let mut units = Vec::with_capacity(pages.len());

        for page in pages.pages() {
            tracing::debug!("EasyOCR page {}: {}", page.number, page.path.display());

            let start = Instant::now();
            let raw = infer_single(runtime.as_ref(), self.name(), &page.path, "").await?;
            let unit = ExtractedUnit::new(page.number, join_paragraphs(&raw), EASYOCR_METHOD, start.elapsed())
                .with_title(page.title.clone().unwrap_or_default());

            units.push(unit);
        }

        Ok(units)
    }
}
