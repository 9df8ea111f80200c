//! Comparative benchmark over one source.
//!
//! [`BenchmarkHarness`] validates the requested method names against the closed
//! backend set, constructs every backend before any work starts, then runs them
//! one after another over the same [`Source`] and aggregates each run into a
//! [`BenchmarkResult`].

use super::cost::per_unit_cost;
use crate::backends::deepseek::DeepSeekMode;
use crate::backends::glm::GlmMode;
use crate::backends::vision::VisionPrompt;
use crate::backends::{
    Backend, BackendKind, DeepSeekBackend, DirectBackend, EasyOcrBackend, ExtractOptions, ExtractionBackend,
    GlmBackend, Source, VisionBackend,
};
use crate::core::config::DeckbenchConfig;
use crate::error::{DeckbenchError, Result};
use crate::models::ModelContext;
use crate::types::BenchmarkResult;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

/// Parse method names into backend kinds, keeping request order.
///
/// Duplicates are dropped after their first occurrence.
///
/// # Errors
///
/// A single `Configuration` error naming every invalid method and the allowed
/// set, or one saying that no method was given.
pub fn parse_methods<S: AsRef<str>>(names: &[S]) -> Result<Vec<BackendKind>> {
    let mut kinds = Vec::new();
    let mut invalid = BTreeSet::new();

    for name in names {
        let name = name.as_ref().trim();
        if name.is_empty() {
            continue;
        }
        match name.parse::<BackendKind>() {
            Ok(kind) if !kinds.contains(&kind) => kinds.push(kind),
            Ok(_) => {}
            Err(_) => {
                invalid.insert(name.to_string());
            }
        }
    }

    if !invalid.is_empty() {
        return Err(DeckbenchError::configuration(format!(
            "Invalid benchmark methods: {}. Allowed: {}",
            invalid.into_iter().collect::<Vec<_>>().join(", "),
            BackendKind::allowed()
        )));
    }
    if kinds.is_empty() {
        return Err(DeckbenchError::configuration(format!(
            "No benchmark method given. Allowed: {}",
            BackendKind::allowed()
        )));
    }

    Ok(kinds)
}

/// Per-run settings shared by every method.
#[derive(Debug, Clone, Default)]
pub struct BenchmarkOptions {
    pub extract: ExtractOptions,
    /// Slide or invoice content. Selects the model prompts for image input.
    pub prompt: VisionPrompt,
    /// Overrides `deepseek.quantize` from the configuration.
    pub quantize: Option<bool>,
}

impl BenchmarkOptions {
    pub fn with_prompt(mut self, prompt: VisionPrompt) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_quantize(mut self, quantize: Option<bool>) -> Self {
        self.quantize = quantize;
        self
    }
}

/// DeepSeek prompt for the image benchmark. Both content kinds use the structured prompt.
pub fn deepseek_mode_for(_prompt: VisionPrompt) -> DeepSeekMode {
    DeepSeekMode::Structured
}

/// GLM prompt for the image benchmark.
pub fn glm_mode_for(prompt: VisionPrompt) -> GlmMode {
    match prompt {
        VisionPrompt::Invoice => GlmMode::Invoice,
        VisionPrompt::Slide => GlmMode::Structured,
    }
}

/// Runs several backends over the same input.
pub struct BenchmarkHarness {
    config: DeckbenchConfig,
    models: Arc<ModelContext>,
}

impl BenchmarkHarness {
    /// Harness that starts local model workers as needed.
    pub fn new(config: DeckbenchConfig) -> Self {
        Self::with_models(config, Arc::new(ModelContext::new()))
    }

    /// Harness sharing an existing model context.
    pub fn with_models(config: DeckbenchConfig, models: Arc<ModelContext>) -> Self {
        Self { config, models }
    }

    pub fn config(&self) -> &DeckbenchConfig {
        &self.config
    }

    pub fn models(&self) -> &Arc<ModelContext> {
        &self.models
    }

    /// Construct the backend for `kind` as configured for `source`.
    ///
    /// # Errors
    ///
    /// `Configuration` when `direct` is asked to read images or when the vision
    /// provider's API key is missing.
    pub fn build_backend(&self, kind: BackendKind, source: &Source, options: &BenchmarkOptions) -> Result<Backend> {
        let images = source.is_images();

        let backend = match kind {
            BackendKind::Direct => {
                if images {
                    return Err(DeckbenchError::configuration(
                        "Method 'direct' reads documents only, not images",
                    ));
                }
                Backend::Direct(DirectBackend)
            }
            BackendKind::Vision => {
                let backend = VisionBackend::from_config(&self.config.vision, &self.config.llm)?;
                Backend::Vision(if images { backend.with_prompt(options.prompt) } else { backend })
            }
            BackendKind::DeepSeek => {
                let mut backend = DeepSeekBackend::new(Arc::clone(&self.models), &self.config.deepseek);
                if images {
                    backend = backend.with_prompt_mode(deepseek_mode_for(options.prompt));
                }
                if let Some(quantize) = options.quantize {
                    backend = backend.with_quantize(quantize);
                }
                Backend::DeepSeek(backend)
            }
            BackendKind::Glm => {
                let backend = GlmBackend::new(&self.config.glm);
                Backend::Glm(if images {
                    backend.with_prompt_mode(glm_mode_for(options.prompt))
                } else {
                    backend
                })
            }
            BackendKind::EasyOcr => Backend::EasyOcr(EasyOcrBackend::new(Arc::clone(&self.models), &self.config.easyocr)),
        };

        Ok(backend)
    }

    /// Benchmark the named methods over `source`.
    ///
    /// Method names are validated and every backend is constructed before the
    /// first extraction starts. One result per method is returned, in request
    /// order. A failure on any item aborts the run.
    pub async fn run<S: AsRef<str>>(
        &self,
        source: &Source,
        methods: &[S],
        options: &BenchmarkOptions,
    ) -> Result<Vec<BenchmarkResult>> {
        let kinds = parse_methods(methods)?;
        let backends = kinds
            .into_iter()
            .map(|kind| self.build_backend(kind, source, options))
            .collect::<Result<Vec<_>>>()?;

        let mut results = Vec::with_capacity(backends.len());
        for backend in &backends {
            results.push(self.run_backend(backend, source, &options.extract).await?);
        }
        Ok(results)
    }

    /// Time one backend over `source` and aggregate its units.
    pub async fn run_backend(
        &self,
        backend: &Backend,
        source: &Source,
        options: &ExtractOptions,
    ) -> Result<BenchmarkResult> {
        tracing::info!("=== Benchmark: {} on {} ===", backend.method_tag(), source.describe());

        let start = Instant::now();
        let units = backend.extract(source, options).await?;
        let elapsed = start.elapsed();

        let method = units
            .first()
            .map(|u| u.method.clone())
            .unwrap_or_else(|| backend.method_tag());
        let result = BenchmarkResult::from_units(
            &method,
            units,
            elapsed,
            per_unit_cost(&method),
            backend.kind().requires_gpu(),
            backend.notes(),
        );

        tracing::info!(
            "{}: {} units in {:.2}s ({:.3}s per unit)",
            result.method,
            result.total_slides,
            result.total_time_seconds,
            result.avg_time_per_slide
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LaunchSpec, ModelRuntime, RuntimeKey, RuntimeLauncher};
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct EchoRuntime;

    #[async_trait]
    impl ModelRuntime for EchoRuntime {
        async fn infer(&self, images: &[PathBuf], _prompt: &str) -> Result<Vec<String>> {
            Ok(images
                .iter()
                .map(|p| format!("Text aus {}", p.file_name().unwrap().to_string_lossy()))
                .collect())
        }
    }

    struct EchoLauncher;

    #[async_trait]
    impl RuntimeLauncher for EchoLauncher {
        async fn launch(&self, _key: &RuntimeKey, _spec: &LaunchSpec) -> Result<Arc<dyn ModelRuntime>> {
            Ok(Arc::new(EchoRuntime))
        }
    }

    fn harness() -> BenchmarkHarness {
        BenchmarkHarness::with_models(
            DeckbenchConfig::default(),
            Arc::new(ModelContext::with_launcher(Arc::new(EchoLauncher))),
        )
    }

    fn images(count: usize) -> (tempfile::TempDir, Source) {
        let dir = tempfile::tempdir().unwrap();
        let paths = (1..=count)
            .map(|i| {
                let path = dir.path().join(format!("scan_{}.png", i));
                std::fs::write(&path, b"x").unwrap();
                path
            })
            .collect();
        (dir, Source::Images(paths))
    }

    #[test]
    fn test_parse_methods_keeps_order_and_dedups() {
        let kinds = parse_methods(&["glm", "deepseek", "glm"]).unwrap();
        assert_eq!(kinds, vec![BackendKind::Glm, BackendKind::DeepSeek]);
    }

    #[test]
    fn test_parse_methods_aggregates_invalid_names() {
        let err = parse_methods(&["foo", "deepseek", "bar"]).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, DeckbenchError::Configuration { .. }));
        assert!(message.contains("bar, foo"));
        assert!(message.contains("direct, vision, deepseek, glm, easyocr"));
    }

    #[test]
    fn test_parse_methods_rejects_empty() {
        assert!(parse_methods::<&str>(&[]).is_err());
        assert!(parse_methods(&[" "]).is_err());
    }

    #[test]
    fn test_image_prompt_mapping() {
        assert_eq!(glm_mode_for(VisionPrompt::Invoice), GlmMode::Invoice);
        assert_eq!(glm_mode_for(VisionPrompt::Slide), GlmMode::Structured);
        assert_eq!(deepseek_mode_for(VisionPrompt::Invoice), DeepSeekMode::Structured);
    }

    #[test]
    fn test_direct_rejects_images_before_running() {
        let (_dir, source) = images(1);
        let err = harness()
            .build_backend(BackendKind::Direct, &source, &BenchmarkOptions::default())
            .unwrap_err();
        assert!(matches!(err, DeckbenchError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_unknown_method_fails_before_any_backend_runs() {
        let harness = harness();
        let (_dir, source) = images(2);
        let err = harness
            .run(&source, &["deepseek", "foo"], &BenchmarkOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("foo"));
        assert_eq!(harness.models().loaded(), 0);
    }

    #[tokio::test]
    async fn test_run_local_methods() {
        let harness = harness();
        let (_dir, source) = images(3);
        let options = BenchmarkOptions::default()
            .with_prompt(VisionPrompt::Invoice)
            .with_quantize(Some(true));

        let results = harness.run(&source, &["easyocr", "deepseek"], &options).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].method, "easyocr-local");
        assert_eq!(results[1].method, "deepseek-ocr2/transformers/structured");
        assert_eq!(results[1].notes, "Lokal, 4-bit, Modus: structured");
        for result in &results {
            assert_eq!(result.total_slides, 3);
            assert!(result.gpu_required);
            assert_eq!(result.estimated_cost_usd, 0.0);
            assert_eq!(result.slides[2].content, "Text aus scan_3.png");
        }
        assert_eq!(harness.models().loaded(), 2);
    }

    #[tokio::test]
    async fn test_empty_filter_falls_back_to_backend_tag() {
        let harness = harness();
        let (_dir, source) = images(2);
        let options = BenchmarkOptions {
            extract: ExtractOptions::default().with_slides(Some(vec![9])),
            ..Default::default()
        };

        let results = harness.run(&source, &["easyocr"], &options).await.unwrap();
        assert_eq!(results[0].method, "easyocr-local");
        assert_eq!(results[0].total_slides, 0);
        assert_eq!(results[0].avg_time_per_slide, 0.0);
    }
}
