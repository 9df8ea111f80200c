//! Extraction backends.
//!
//! Every backend implements [`ExtractionBackend`]: it takes a [`Source`] (a
//! document or a list of images) plus [`ExtractOptions`] and returns one
//! [`ExtractedUnit`] per page, slide or image, in source order.
//!
//! The set of backends is closed. [`BackendKind`] names them and is what method
//! identifiers parse into; [`Backend`] holds a constructed instance of any of
//! them and dispatches statically.

pub mod deepseek;
pub mod direct;
pub mod easyocr;
pub mod glm;
pub mod vision;

pub use deepseek::DeepSeekBackend;
pub use direct::DirectBackend;
pub use easyocr::EasyOcrBackend;
pub use glm::GlmBackend;
pub use vision::VisionBackend;

use crate::core::config::RenderConfig;
use crate::error::{DeckbenchError, Result};
use crate::render::{RenderedPages, render_document};
use crate::types::ExtractedUnit;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// What a backend reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A PPTX, PDF or other document LibreOffice can convert.
    Document(PathBuf),
    /// Image files, one unit each.
    Images(Vec<PathBuf>),
}

impl Source {
    pub fn is_images(&self) -> bool {
        matches!(self, Source::Images(_))
    }

    /// Short description for logs and report headers.
    pub fn describe(&self) -> String {
        match self {
            Source::Document(path) => path.display().to_string(),
            Source::Images(paths) => match paths.as_slice() {
                [single] => single.display().to_string(),
                _ => format!("{} Bilder", paths.len()),
            },
        }
    }
}

/// Options shared by every backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    /// Restrict output to these 1-based positions. Numbering stays that of the source.
    pub slides: Option<Vec<u32>>,
    pub include_notes: bool,
    /// Rendering for document input, including the dpi.
    pub render: RenderConfig,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            slides: None,
            include_notes: false,
            render: RenderConfig::default(),
        }
    }
}

impl ExtractOptions {
    pub fn with_slides(mut self, slides: Option<Vec<u32>>) -> Self {
        self.slides = slides;
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.render.dpi = dpi;
        self
    }

    pub fn dpi(&self) -> u32 {
        self.render.dpi
    }
}

/// Pluggable extraction strategy.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Method identifier (`direct`, `vision`, ...).
    fn name(&self) -> &'static str;

    /// Tag put on every unit, including the sub-configuration.
    fn method_tag(&self) -> String;

    /// Whether this backend needs an accelerator. Static, never measured.
    fn requires_gpu(&self) -> bool;

    /// Free-text description for reports.
    fn notes(&self) -> String;

    /// Extract every page, slide or image of `source` in order.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the document or an image does not exist
    /// - `DependencyUnavailable` if a model, worker or converter cannot be loaded
    /// - `Configuration` for credentials or unsupported inputs
    async fn extract(&self, source: &Source, options: &ExtractOptions) -> Result<Vec<ExtractedUnit>>;
}

/// Closed set of backend identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Direct,
    Vision,
    DeepSeek,
    Glm,
    EasyOcr,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Direct,
        BackendKind::Vision,
        BackendKind::DeepSeek,
        BackendKind::Glm,
        BackendKind::EasyOcr,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Direct => "direct",
            BackendKind::Vision => "vision",
            BackendKind::DeepSeek => "deepseek",
            BackendKind::Glm => "glm",
            BackendKind::EasyOcr => "easyocr",
        }
    }

    pub fn requires_gpu(self) -> bool {
        matches!(self, BackendKind::DeepSeek | BackendKind::Glm | BackendKind::EasyOcr)
    }

    /// Comma-separated list of every identifier.
    pub fn allowed() -> String {
        Self::ALL.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = DeckbenchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| DeckbenchError::configuration(format!("Unknown method '{}'. Allowed: {}", s, Self::allowed())))
    }
}

/// A constructed backend of any kind.
pub enum Backend {
    Direct(DirectBackend),
    Vision(VisionBackend),
    DeepSeek(DeepSeekBackend),
    Glm(GlmBackend),
    EasyOcr(EasyOcrBackend),
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Backend").field(&self.method_tag()).finish()
    }
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Direct(_) => BackendKind::Direct,
            Backend::Vision(_) => BackendKind::Vision,
            Backend::DeepSeek(_) => BackendKind::DeepSeek,
            Backend::Glm(_) => BackendKind::Glm,
            Backend::EasyOcr(_) => BackendKind::EasyOcr,
        }
    }

    fn inner(&self) -> &dyn ExtractionBackend {
        match self {
            Backend::Direct(b) => b,
            Backend::Vision(b) => b,
            Backend::DeepSeek(b) => b,
            Backend::Glm(b) => b,
            Backend::EasyOcr(b) => b,
        }
    }
}

#[async_trait]
impl ExtractionBackend for Backend {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn method_tag(&self) -> String {
        self.inner().method_tag()
    }

    fn requires_gpu(&self) -> bool {
        self.inner().requires_gpu()
    }

    fn notes(&self) -> String {
        self.inner().notes()
    }

    async fn extract(&self, source: &Source, options: &ExtractOptions) -> Result<Vec<ExtractedUnit>> {
        self.inner().extract(source, options).await
    }
}

/// One image to run a model over.
#[derive(Debug, Clone, PartialEq)]
pub struct PageImage {
    pub number: u32,
    pub path: PathBuf,
    /// File stem for image input. Unset for rendered pages.
    pub title: Option<String>,
}

/// Page images of a source. Rendered pages are deleted when this is dropped.
#[derive(Debug)]
pub struct PageSet {
    pages: Vec<PageImage>,
    _rendered: Option<RenderedPages>,
}

impl PageSet {
    pub fn pages(&self) -> &[PageImage] {
        &self.pages
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.pages.iter().map(|p| p.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

fn image_title(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

/// Resolve `source` into numbered page images.
///
/// Images are checked for existence and numbered 1.. in input order. Documents
/// are rendered at `options.dpi()`. The slide filter applies to both.
pub async fn collect_pages(source: &Source, options: &ExtractOptions) -> Result<PageSet> {
    let filter = options.slides.as_deref();

    match source {
        Source::Images(paths) => {
            let mut pages = Vec::with_capacity(paths.len());
            for (idx, path) in paths.iter().enumerate() {
                if !path.exists() {
                    return Err(DeckbenchError::not_found("image", path));
                }
                let number = idx as u32 + 1;
                if filter.is_some_and(|f| !f.contains(&number)) {
                    continue;
                }
                pages.push(PageImage {
                    number,
                    path: path.clone(),
                    title: image_title(path),
                });
            }
            Ok(PageSet { pages, _rendered: None })
        }
        Source::Document(path) => {
            let rendered = render_document(path, options.dpi(), &options.render).await?;
            let pages = rendered
                .numbered(filter)
                .into_iter()
                .map(|(number, path)| PageImage {
                    number,
                    path,
                    title: None,
                })
                .collect();
            Ok(PageSet {
                pages,
                _rendered: Some(rendered),
            })
        }
    }
}
