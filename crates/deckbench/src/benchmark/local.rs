//! Local OCR benchmark over two corpora.
//!
//! Each local method reads a folder of handwriting scans (throughput only) and
//! a folder of invoice PDFs. Invoice text is turned into [`InvoiceProperties`]
//! and, where ground truth exists for a file, scored field by field.

use crate::backends::deepseek::DeepSeekMode;
use crate::backends::{DeepSeekBackend, EasyOcrBackend, ExtractOptions, ExtractionBackend, Source};
use crate::core::collect_files;
use crate::core::config::DeckbenchConfig;
use crate::error::{DeckbenchError, Result};
use crate::invoice::scoring::lookup_truth;
use crate::invoice::{
    GroundTruth, GroundTruthScore, InvoiceProperties, extract_heuristic, extract_with_llm, load_ground_truth, score,
};
use crate::llm::{LlmClient, TextLlm};
use crate::models::ModelContext;
use crate::types::{ExtractedUnit, round_to};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Suffixes of handwriting scans.
pub const HANDWRITING_SUFFIXES: [&str; 7] = ["png", "jpg", "jpeg", "tif", "tiff", "webp", "bmp"];

/// Suffixes of invoice documents.
pub const INVOICE_SUFFIXES: [&str; 1] = ["pdf"];

/// Methods the local benchmark knows.
pub const LOCAL_METHODS: [&str; 2] = ["deepseek", "easyocr"];

/// How invoice text becomes properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyExtractor {
    #[default]
    Llm,
    Heuristic,
}

impl PropertyExtractor {
    pub fn as_str(self) -> &'static str {
        match self {
            PropertyExtractor::Llm => "llm",
            PropertyExtractor::Heuristic => "heuristic",
        }
    }
}

impl fmt::Display for PropertyExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyExtractor {
    type Err = DeckbenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "llm" => Ok(PropertyExtractor::Llm),
            "heuristic" => Ok(PropertyExtractor::Heuristic),
            other => Err(DeckbenchError::configuration(format!(
                "Unknown property extractor '{}' (expected llm or heuristic)",
                other
            ))),
        }
    }
}

/// The two local OCR models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalMethod {
    DeepSeek,
    EasyOcr,
}

impl LocalMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            LocalMethod::DeepSeek => "deepseek",
            LocalMethod::EasyOcr => "easyocr",
        }
    }
}

/// Validate local method names, keeping request order.
///
/// # Errors
///
/// One `Configuration` error naming every invalid method.
pub fn parse_local_methods<S: AsRef<str>>(names: &[S]) -> Result<Vec<LocalMethod>> {
    let mut methods = Vec::new();
    let mut invalid = BTreeSet::new();

    for name in names {
        let method = match name.as_ref().trim() {
            "" => continue,
            "deepseek" => LocalMethod::DeepSeek,
            "easyocr" => LocalMethod::EasyOcr,
            other => {
                invalid.insert(other.to_string());
                continue;
            }
        };
        if !methods.contains(&method) {
            methods.push(method);
        }
    }

    if !invalid.is_empty() || methods.is_empty() {
        return Err(DeckbenchError::configuration(format!(
            "Invalid local benchmark methods: {}. Allowed: {}",
            invalid.into_iter().collect::<Vec<_>>().join(", "),
            LOCAL_METHODS.join(", ")
        )));
    }
    Ok(methods)
}

/// Inputs of one local benchmark run.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalBenchmarkOptions {
    pub handwriting_dir: PathBuf,
    pub invoices_dir: PathBuf,
    pub methods: Vec<String>,
    pub quantize: bool,
    pub dpi: u32,
    pub ground_truth: Option<PathBuf>,
    pub extractor: PropertyExtractor,
}

impl LocalBenchmarkOptions {
    /// Options for two folders with the benchmark defaults from `config`.
    pub fn new(handwriting_dir: impl Into<PathBuf>, invoices_dir: impl Into<PathBuf>, config: &DeckbenchConfig) -> Self {
        Self {
            handwriting_dir: handwriting_dir.into(),
            invoices_dir: invoices_dir.into(),
            methods: config.benchmark.local_methods.clone(),
            quantize: config.benchmark.local_quantize,
            dpi: config.benchmark.local_dpi,
            ground_truth: None,
            extractor: config.benchmark.property_extractor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalInputs {
    pub handwriting_dir: String,
    pub invoices_dir: String,
    pub handwriting_files: Vec<String>,
    pub invoice_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandwritingItem {
    pub file: String,
    pub text: String,
    pub chars: usize,
    pub tokens_estimate: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandwritingRun {
    pub model: String,
    pub total_items: usize,
    pub total_time_seconds: f64,
    pub avg_time_seconds: f64,
    pub items: Vec<HandwritingItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub file: String,
    pub ocr_text: String,
    pub properties: InvoiceProperties,
    pub filled_properties: usize,
    pub filled_ratio: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_truth_eval: Option<GroundTruthScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRun {
    pub total_items: usize,
    pub total_time_seconds: f64,
    pub avg_time_seconds: f64,
    pub avg_property_fill_ratio: f64,
    pub items: Vec<InvoiceItem>,
}

/// Result of [`LocalBenchmark::run`], keyed by corpus and then by method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalBenchmarkReport {
    pub inputs: LocalInputs,
    pub methods: Vec<String>,
    pub handwriting: IndexMap<String, HandwritingRun>,
    pub invoices: IndexMap<String, InvoiceRun>,
}

fn average_seconds(total: Duration, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        round_to(total.as_secs_f64() / count as f64, 3)
    }
}

fn path_strings(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|p| p.display().to_string()).collect()
}

/// Pair each unit with the scan at its 1-based position.
fn handwriting_items(backend: &str, images: &[PathBuf], units: &[ExtractedUnit]) -> Result<Vec<HandwritingItem>> {
    if units.len() != images.len() {
        return Err(DeckbenchError::backend(
            backend,
            format!("{} units for {} images", units.len(), images.len()),
        ));
    }

    units
        .iter()
        .map(|unit| {
            let path = (unit.slide_number as usize)
                .checked_sub(1)
                .and_then(|i| images.get(i))
                .ok_or_else(|| {
                    DeckbenchError::backend(backend, format!("unit {} has no matching image", unit.slide_number))
                })?;
            Ok(HandwritingItem {
                file: path.display().to_string(),
                text: unit.content.clone(),
                chars: unit.char_count(),
                tokens_estimate: unit.token_count,
            })
        })
        .collect()
}

/// Join page texts with blank lines, skipping empty pages.
pub fn join_page_texts(units: &[ExtractedUnit]) -> String {
    units
        .iter()
        .map(|u| u.content.as_str())
        .filter(|c| !c.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Local benchmark over handwriting scans and invoice PDFs.
pub struct LocalBenchmark {
    config: DeckbenchConfig,
    models: Arc<ModelContext>,
    llm: Option<Arc<dyn TextLlm>>,
}

impl LocalBenchmark {
    pub fn new(config: DeckbenchConfig) -> Self {
        Self::with_models(config, Arc::new(ModelContext::new()))
    }

    pub fn with_models(config: DeckbenchConfig, models: Arc<ModelContext>) -> Self {
        Self {
            config,
            models,
            llm: None,
        }
    }

    /// Use `llm` for invoice properties instead of the configured client.
    pub fn with_llm(mut self, llm: Arc<dyn TextLlm>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn models(&self) -> &Arc<ModelContext> {
        &self.models
    }

    fn backend(&self, method: LocalMethod, mode: DeepSeekMode, quantize: bool) -> Box<dyn ExtractionBackend> {
        match method {
            LocalMethod::DeepSeek => Box::new(
                DeepSeekBackend::new(Arc::clone(&self.models), &self.config.deepseek)
                    .with_prompt_mode(mode)
                    .with_quantize(quantize),
            ),
            LocalMethod::EasyOcr => {
                Box::new(EasyOcrBackend::new(Arc::clone(&self.models), &self.config.easyocr).with_gpu(true))
            }
        }
    }

    fn property_llm(&self, extractor: PropertyExtractor) -> Result<Option<Arc<dyn TextLlm>>> {
        match (extractor, &self.llm) {
            (PropertyExtractor::Heuristic, _) => Ok(None),
            (PropertyExtractor::Llm, Some(llm)) => Ok(Some(Arc::clone(llm))),
            (PropertyExtractor::Llm, None) => Ok(Some(Arc::new(LlmClient::from_config(&self.config.llm)?))),
        }
    }

    /// Run every method over both corpora.
    ///
    /// Folders, methods, ground truth and the LLM client are all checked before
    /// the first model is loaded.
    ///
    /// # Errors
    ///
    /// - `NotFound` for a missing folder, a folder without matching files, or a missing ground-truth file
    /// - `Configuration` for unknown methods or a missing LLM key
    /// - any backend error, which aborts the run
    pub async fn run(&self, options: &LocalBenchmarkOptions) -> Result<LocalBenchmarkReport> {
        let methods = parse_local_methods(&options.methods)?;
        let images = collect_files(&options.handwriting_dir, &HANDWRITING_SUFFIXES)?;
        let pdfs = collect_files(&options.invoices_dir, &INVOICE_SUFFIXES)?;
        let truth = match &options.ground_truth {
            Some(path) => load_ground_truth(path).await?,
            None => GroundTruth::new(),
        };
        let llm = self.property_llm(options.extractor)?;

        let mut report = LocalBenchmarkReport {
            inputs: LocalInputs {
                handwriting_dir: options.handwriting_dir.display().to_string(),
                invoices_dir: options.invoices_dir.display().to_string(),
                handwriting_files: path_strings(&images),
                invoice_files: path_strings(&pdfs),
            },
            methods: methods.iter().map(|m| m.as_str().to_string()).collect(),
            handwriting: IndexMap::new(),
            invoices: IndexMap::new(),
        };

        for method in methods {
            tracing::info!("=== Handwriting benchmark: {} ===", method.as_str());
            let run = self.handwriting(method, &images, options.quantize).await?;
            report.handwriting.insert(method.as_str().to_string(), run);

            tracing::info!("=== Invoice benchmark: {} ===", method.as_str());
            let run = self
                .invoices(method, &pdfs, options, &truth, llm.as_deref())
                .await?;
            report.invoices.insert(method.as_str().to_string(), run);
        }

        Ok(report)
    }

    async fn handwriting(&self, method: LocalMethod, images: &[PathBuf], quantize: bool) -> Result<HandwritingRun> {
        let backend = self.backend(method, DeepSeekMode::Free, quantize);

        let start = Instant::now();
        let units = backend
            .extract(&Source::Images(images.to_vec()), &ExtractOptions::default())
            .await?;
        let elapsed = start.elapsed();

        let items = handwriting_items(backend.name(), images, &units)?;

        Ok(HandwritingRun {
            model: method.as_str().to_string(),
            total_items: units.len(),
            total_time_seconds: round_to(elapsed.as_secs_f64(), 3),
            avg_time_seconds: average_seconds(elapsed, units.len()),
            items,
        })
    }

    async fn invoices(
        &self,
        method: LocalMethod,
        pdfs: &[PathBuf],
        options: &LocalBenchmarkOptions,
        truth: &GroundTruth,
        llm: Option<&dyn TextLlm>,
    ) -> Result<InvoiceRun> {
        let backend = self.backend(method, DeepSeekMode::Structured, options.quantize);
        let extract = ExtractOptions {
            render: self.config.render.clone(),
            ..Default::default()
        }
        .with_dpi(options.dpi);

        let start = Instant::now();
        let mut items = Vec::with_capacity(pdfs.len());
        for pdf in pdfs {
            let units = backend.extract(&Source::Document(pdf.clone()), &extract).await?;
            let ocr_text = join_page_texts(&units);
            let properties = match llm {
                Some(llm) => extract_with_llm(llm, &ocr_text).await?,
                None => extract_heuristic(&ocr_text),
            };
            items.push(invoice_item(pdf, ocr_text, properties, truth));
        }
        let elapsed = start.elapsed();

        let avg_property_fill_ratio = if items.is_empty() {
            0.0
        } else {
            round_to(
                items.iter().map(|i| i.filled_ratio).sum::<f64>() / items.len() as f64,
                4,
            )
        };

        Ok(InvoiceRun {
            total_items: items.len(),
            total_time_seconds: round_to(elapsed.as_secs_f64(), 3),
            avg_time_seconds: average_seconds(elapsed, items.len()),
            avg_property_fill_ratio,
            items,
        })
    }
}

fn invoice_item(pdf: &Path, ocr_text: String, properties: InvoiceProperties, truth: &GroundTruth) -> InvoiceItem {
    let ground_truth_eval = lookup_truth(truth, pdf).map(|t| score(&properties, t));
    InvoiceItem {
        file: pdf.display().to_string(),
        ocr_text,
        filled_properties: properties.filled_count(),
        filled_ratio: round_to(properties.filled_ratio(), 4),
        properties,
        ground_truth_eval,
    }
}
