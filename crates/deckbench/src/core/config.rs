//! Configuration loading and management.
//!
//! [`DeckbenchConfig`] groups one section per backend plus rendering, LLM and
//! benchmark defaults. Every section has serde defaults, so an empty file is a
//! valid configuration.

use crate::backends::deepseek::{DeepSeekMode, DeepSeekStrategy};
use crate::backends::glm::GlmMode;
use crate::backends::vision::VisionPrompt;
use crate::benchmark::local::PropertyExtractor;
use crate::error::{DeckbenchError, Result};
use crate::llm::Provider;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name searched for by [`DeckbenchConfig::discover`].
pub const CONFIG_FILE_NAME: &str = "deckbench.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeckbenchConfig {
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub deepseek: DeepSeekConfig,
    #[serde(default)]
    pub glm: GlmConfig,
    #[serde(default)]
    pub easyocr: EasyOcrConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
}

/// Page rendering (LibreOffice + pdftoppm).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    /// Timeout for a single LibreOffice conversion, in seconds.
    #[serde(default = "default_convert_timeout")]
    pub timeout_secs: u64,
    /// Explicit soffice executable. Searched for when unset.
    #[serde(default)]
    pub libreoffice_path: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            dpi: default_dpi(),
            timeout_secs: default_convert_timeout(),
            libreoffice_path: None,
        }
    }
}

/// Cloud vision backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_vision_provider")]
    pub provider: Provider,
    /// Model name. Defaults to the provider's default model.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub prompt_mode: VisionPrompt,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            provider: default_vision_provider(),
            model: None,
            prompt_mode: VisionPrompt::default(),
        }
    }
}

/// DeepSeek OCR 2 local worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepSeekConfig {
    /// Command that starts the inference worker (program followed by arguments).
    #[serde(default = "default_deepseek_worker")]
    pub worker_command: Vec<String>,
    #[serde(default = "default_deepseek_model")]
    pub model: String,
    #[serde(default)]
    pub strategy: DeepSeekStrategy,
    /// Load the model with 4-bit quantization.
    #[serde(default)]
    pub quantize: bool,
    #[serde(default)]
    pub prompt_mode: DeepSeekMode,
}

impl Default for DeepSeekConfig {
    fn default() -> Self {
        Self {
            worker_command: default_deepseek_worker(),
            model: default_deepseek_model(),
            strategy: DeepSeekStrategy::default(),
            quantize: false,
            prompt_mode: DeepSeekMode::default(),
        }
    }
}

/// GLM-OCR behind a local OpenAI-compatible endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlmConfig {
    #[serde(default = "default_glm_base_url")]
    pub base_url: String,
    #[serde(default = "default_glm_model")]
    pub model: String,
    #[serde(default = "default_glm_api_key")]
    pub api_key: String,
    #[serde(default)]
    pub prompt_mode: GlmMode,
}

impl Default for GlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_glm_base_url(),
            model: default_glm_model(),
            api_key: default_glm_api_key(),
            prompt_mode: GlmMode::default(),
        }
    }
}

/// EasyOCR local worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EasyOcrConfig {
    #[serde(default = "default_easyocr_worker")]
    pub worker_command: Vec<String>,
    #[serde(default = "default_easyocr_languages")]
    pub languages: Vec<String>,
    #[serde(default)]
    pub gpu: bool,
}

impl Default for EasyOcrConfig {
    fn default() -> Self {
        Self {
            worker_command: default_easyocr_worker(),
            languages: default_easyocr_languages(),
            gpu: false,
        }
    }
}

/// Text LLM used for invoice properties and post-processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: Provider,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            max_tokens: default_max_tokens(),
            anthropic_base_url: default_anthropic_base_url(),
            openai_base_url: default_openai_base_url(),
        }
    }
}

/// Benchmark defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    #[serde(default = "default_benchmark_methods")]
    pub methods: Vec<String>,
    #[serde(default = "default_local_methods")]
    pub local_methods: Vec<String>,
    #[serde(default = "default_local_dpi")]
    pub local_dpi: u32,
    #[serde(default = "default_true")]
    pub local_quantize: bool,
    #[serde(default)]
    pub property_extractor: PropertyExtractor,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            methods: default_benchmark_methods(),
            local_methods: default_local_methods(),
            local_dpi: default_local_dpi(),
            local_quantize: true,
            property_extractor: PropertyExtractor::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_dpi() -> u32 {
    200
}

fn default_convert_timeout() -> u64 {
    300
}

fn default_vision_provider() -> Provider {
    Provider::Anthropic
}

fn default_llm_provider() -> Provider {
    Provider::OpenAi
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_deepseek_worker() -> Vec<String> {
    vec!["python3".into(), "-m".into(), "deepseek_ocr_worker".into()]
}

fn default_deepseek_model() -> String {
    "deepseek-ai/DeepSeek-OCR-2".to_string()
}

fn default_glm_base_url() -> String {
    "http://127.0.0.1:8000/v1".to_string()
}

fn default_glm_model() -> String {
    "glm-ocr".to_string()
}

fn default_glm_api_key() -> String {
    "EMPTY".to_string()
}

fn default_easyocr_worker() -> Vec<String> {
    vec!["python3".into(), "-m".into(), "easyocr_worker".into()]
}

fn default_easyocr_languages() -> Vec<String> {
    vec!["de".into(), "en".into()]
}

fn default_benchmark_methods() -> Vec<String> {
    vec!["deepseek".into(), "glm".into()]
}

fn default_local_methods() -> Vec<String> {
    vec!["deepseek".into(), "easyocr".into()]
}

fn default_local_dpi() -> u32 {
    250
}

impl DeckbenchConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `DeckbenchError::Configuration` if the file cannot be read or is invalid TOML.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;
        toml::from_str(&content).map_err(|e| {
            DeckbenchError::configuration(format!("Invalid TOML in {}: {}", path.as_ref().display(), e))
        })
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;
        serde_yaml_ng::from_str(&content).map_err(|e| {
            DeckbenchError::configuration(format!("Invalid YAML in {}: {}", path.as_ref().display(), e))
        })
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;
        serde_json::from_str(&content).map_err(|e| {
            DeckbenchError::configuration(format!("Invalid JSON in {}: {}", path.as_ref().display(), e))
        })
    }

    /// Load configuration, picking the format from the file extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "toml" => Self::from_toml_file(path),
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            other => Err(DeckbenchError::configuration(format!(
                "Unsupported config format '{}' for {} (expected .toml, .yaml or .json)",
                other,
                path.display()
            ))),
        }
    }

    /// Discover `deckbench.toml` in the current directory or any parent.
    ///
    /// # Returns
    ///
    /// - `Some(config)` if found
    /// - `None` if no config file found
    pub fn discover() -> Result<Option<Self>> {
        let mut current = std::env::current_dir().map_err(DeckbenchError::Io)?;

        loop {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                tracing::debug!("Using configuration at {}", candidate.display());
                return Ok(Some(Self::from_toml_file(candidate)?));
            }

            if let Some(parent) = current.parent() {
                current = parent.to_path_buf();
            } else {
                break;
            }
        }

        Ok(None)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("GLM_OCR_BASE_URL") {
            self.glm.base_url = url;
        }
        if let Some(model) = get("GLM_OCR_MODEL") {
            self.glm.model = model;
        }
        if let Some(key) = get("GLM_OCR_API_KEY") {
            self.glm.api_key = key;
        }
        if let Some(path) = get("DECKBENCH_LIBREOFFICE_PATH") {
            self.render.libreoffice_path = Some(PathBuf::from(path));
        }
    }

    /// Check values that serde cannot constrain.
    pub fn validate(&self) -> Result<()> {
        if self.render.dpi == 0 {
            return Err(DeckbenchError::configuration("render.dpi must be greater than 0"));
        }
        if self.benchmark.local_dpi == 0 {
            return Err(DeckbenchError::configuration(
                "benchmark.local_dpi must be greater than 0",
            ));
        }
        if self.deepseek.worker_command.is_empty() {
            return Err(DeckbenchError::configuration("deepseek.worker_command must not be empty"));
        }
        if self.easyocr.worker_command.is_empty() {
            return Err(DeckbenchError::configuration("easyocr.worker_command must not be empty"));
        }
        if self.easyocr.languages.is_empty() {
            return Err(DeckbenchError::configuration("easyocr.languages must not be empty"));
        }
        if self.glm.base_url.trim().is_empty() {
            return Err(DeckbenchError::configuration("glm.base_url must not be empty"));
        }
        Ok(())
    }
}

fn read_config(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        DeckbenchError::configuration(format!("Failed to read config file {}: {}", path.display(), e))
    })
}
