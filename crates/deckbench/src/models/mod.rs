//! Local model runtimes and their load-once cache.
//!
//! Local OCR models run out of process behind [`ModelRuntime`]. A
//! [`ModelContext`] owns the cache of started runtimes and the
//! [`RuntimeLauncher`] used to start them. Create one per application run and
//! pass it to the backends that need local models.

pub mod cache;
pub mod worker;

pub use cache::ModelCache;
pub use worker::WorkerProcess;

use crate::backends::deepseek::DeepSeekStrategy;
use crate::error::{DeckbenchError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A loaded model that turns images plus a prompt into text.
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    /// Run `prompt` over `images` in one call. Returns one text per image, in order.
    async fn infer(&self, images: &[PathBuf], prompt: &str) -> Result<Vec<String>>;
}

fn count_mismatch(backend: &str, texts: usize, images: usize) -> DeckbenchError {
    DeckbenchError::backend(backend, format!("model returned {} texts for {} images", texts, images))
}

/// [`ModelRuntime::infer`] that fails unless exactly one text per image comes back.
pub async fn infer_batch(
    runtime: &dyn ModelRuntime,
    backend: &str,
    images: &[PathBuf],
    prompt: &str,
) -> Result<Vec<String>> {
    let texts = runtime.infer(images, prompt).await?;
    if texts.len() != images.len() {
        return Err(count_mismatch(backend, texts.len(), images.len()));
    }
    Ok(texts)
}

/// Run `prompt` over a single image and return its one text.
pub async fn infer_single(runtime: &dyn ModelRuntime, backend: &str, image: &Path, prompt: &str) -> Result<String> {
    let texts = runtime.infer(&[image.to_path_buf()], prompt).await?;
    let [text]: [String; 1] = texts
        .try_into()
        .map_err(|texts: Vec<String>| count_mismatch(backend, texts.len(), 1))?;
    Ok(text)
}

/// Identity of a loaded runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuntimeKey {
    DeepSeek { strategy: DeepSeekStrategy, quantize: bool },
    EasyOcr { languages: Vec<String>, gpu: bool },
}

impl RuntimeKey {
    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            RuntimeKey::DeepSeek { .. } => "deepseek-ocr2",
            RuntimeKey::EasyOcr { .. } => "easyocr",
        }
    }
}

/// How to start a runtime: the worker command and its `load` request.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
    pub command: Vec<String>,
    pub load: serde_json::Value,
}

/// Starts runtimes on a cache miss.
#[async_trait]
pub trait RuntimeLauncher: Send + Sync {
    async fn launch(&self, key: &RuntimeKey, spec: &LaunchSpec) -> Result<Arc<dyn ModelRuntime>>;
}

/// Launcher that starts a [`WorkerProcess`] per runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerLauncher;

#[async_trait]
impl RuntimeLauncher for WorkerLauncher {
    async fn launch(&self, key: &RuntimeKey, spec: &LaunchSpec) -> Result<Arc<dyn ModelRuntime>> {
        let worker = WorkerProcess::spawn(key.name(), &spec.command, spec.load.clone()).await?;
        Ok(Arc::new(worker))
    }
}

/// Owner of every loaded local runtime.
pub struct ModelContext {
    launcher: Arc<dyn RuntimeLauncher>,
    cache: ModelCache<RuntimeKey, dyn ModelRuntime>,
}

impl std::fmt::Debug for ModelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelContext").field("cache", &self.cache).finish()
    }
}

impl Default for ModelContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelContext {
    /// Context that starts worker processes.
    pub fn new() -> Self {
        Self::with_launcher(Arc::new(WorkerLauncher))
    }

    pub fn with_launcher(launcher: Arc<dyn RuntimeLauncher>) -> Self {
        Self {
            launcher,
            cache: ModelCache::new(),
        }
    }

    /// Runtime for `key`, started on first use and reused afterwards.
    pub async fn runtime(&self, key: RuntimeKey, spec: &LaunchSpec) -> Result<Arc<dyn ModelRuntime>> {
        if let Some(runtime) = self.cache.get(&key) {
            tracing::debug!("Reusing cached {} runtime", key.name());
            return Ok(runtime);
        }

        let launcher = Arc::clone(&self.launcher);
        let launch_key = key.clone();
        self.cache
            .get_or_load(key, || async move { launcher.launch(&launch_key, spec).await })
            .await
    }

    /// Number of runtimes currently loaded.
    pub fn loaded(&self) -> usize {
        self.cache.len()
    }

    /// Drop every loaded runtime. Worker processes exit once no backend holds them.
    pub fn shutdown(&self) {
        self.cache.clear();
    }
}
