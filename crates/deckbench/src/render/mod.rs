//! Document to page-image rendering.
//!
//! PDFs are rasterized directly. Every other input goes through LibreOffice
//! first. The page images live in a temporary directory owned by
//! [`RenderedPages`] and are removed when it is dropped, on every exit path.

pub mod libreoffice;
pub mod raster;

use crate::core::config::RenderConfig;
use crate::error::{DeckbenchError, Result};
use std::path::{Path, PathBuf};

/// Page images produced for one document.
#[derive(Debug)]
pub struct RenderedPages {
    dir: tempfile::TempDir,
    pages: Vec<PathBuf>,
}

impl RenderedPages {
    /// Page image paths in page order.
    pub fn pages(&self) -> &[PathBuf] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Directory holding the images. Removed on drop.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// `(page_number, path)` pairs, optionally restricted to `filter`.
    ///
    /// Numbers come from the file names, so a filtered set keeps the original
    /// document positions.
    pub fn numbered(&self, filter: Option<&[u32]>) -> Vec<(u32, PathBuf)> {
        self.pages
            .iter()
            .enumerate()
            .map(|(idx, path)| {
                let n = page_number_from_path(path).unwrap_or(idx as u32 + 1);
                (n, path.clone())
            })
            .filter(|(n, _)| filter.is_none_or(|f| f.contains(n)))
            .collect()
    }
}

/// Recover the page number from a `slide_NNN.png` file name.
pub fn page_number_from_path(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    stem.strip_prefix("slide_")?.parse().ok()
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Render `path` to page images at `dpi`.
///
/// # Errors
///
/// - `NotFound` if the document does not exist
/// - `Configuration` if `dpi` is 0
/// - `DependencyUnavailable` if LibreOffice or pdftoppm is missing
/// - `EmptyRender` if no pages were produced
pub async fn render_document(path: &Path, dpi: u32, config: &RenderConfig) -> Result<RenderedPages> {
    if !path.exists() {
        return Err(DeckbenchError::not_found("document", path));
    }
    if dpi == 0 {
        return Err(DeckbenchError::configuration("dpi must be greater than 0"));
    }

    let dir = tempfile::Builder::new().prefix("deckbench_").tempdir()?;
    let pages_dir = dir.path().join("pages");

    let pdf_path = if is_pdf(path) {
        path.to_path_buf()
    } else {
        libreoffice::convert_to_pdf(
            path,
            &dir.path().join("pdf"),
            config.libreoffice_path.as_deref(),
            config.timeout_secs,
        )
        .await?
    };

    let pages = raster::rasterize_pdf(&pdf_path, &pages_dir, dpi).await?;
    if pages.is_empty() {
        return Err(DeckbenchError::EmptyRender {
            path: path.to_path_buf(),
        });
    }

    tracing::info!("{} page images rendered from {}", pages.len(), path.display());
    Ok(RenderedPages { dir, pages })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages_for(names: &[&str]) -> RenderedPages {
        let dir = tempfile::tempdir().unwrap();
        let pages = names.iter().map(|n| dir.path().join(n)).collect();
        RenderedPages { dir, pages }
    }

    #[test]
    fn test_page_number_from_path() {
        assert_eq!(page_number_from_path(Path::new("/x/slide_003.png")), Some(3));
        assert_eq!(page_number_from_path(Path::new("/x/slide_120.png")), Some(120));
        assert_eq!(page_number_from_path(Path::new("/x/scan.png")), None);
    }

    #[test]
    fn test_numbered_keeps_original_positions_under_filter() {
        let pages = pages_for(&["slide_001.png", "slide_002.png", "slide_003.png", "slide_004.png"]);
        let selected: Vec<u32> = pages.numbered(Some(&[2, 4])).into_iter().map(|(n, _)| n).collect();
        assert_eq!(selected, vec![2, 4]);
        assert_eq!(pages.numbered(None).len(), 4);
    }

    #[test]
    fn test_temp_dir_removed_on_drop() {
        let pages = pages_for(&["slide_001.png"]);
        let dir = pages.dir().to_path_buf();
        assert!(dir.exists());
        drop(pages);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_render_missing_document_is_not_found() {
        let err = render_document(Path::new("/nonexistent/deck.pptx"), 200, &RenderConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DeckbenchError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_render_zero_dpi_is_configuration_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = render_document(file.path(), 0, &RenderConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DeckbenchError::Configuration { .. }));
    }
}
