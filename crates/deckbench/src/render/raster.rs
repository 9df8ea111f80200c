//! PDF rasterization through poppler's `pdftoppm`.

use crate::error::{DeckbenchError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;

const PDFTOPPM: &str = "pdftoppm";
const RAW_PREFIX: &str = "page";

fn poppler_install_message() -> &'static str {
    "Install poppler: macOS: 'brew install poppler', Linux: 'apt install poppler-utils'."
}

fn locate_pdftoppm() -> Result<PathBuf> {
    which::which(PDFTOPPM).or_else(|_| {
        ["/opt/homebrew/bin", "/usr/local/bin"]
            .iter()
            .map(|dir| Path::new(dir).join(PDFTOPPM))
            .find(|p| p.is_file())
            .ok_or_else(|| DeckbenchError::dependency_unavailable(PDFTOPPM, poppler_install_message()))
    })
}

/// Page number encoded by pdftoppm as the trailing `-N` of the file stem.
fn raw_page_number(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let (prefix, number) = stem.rsplit_once('-')?;
    if prefix != RAW_PREFIX {
        return None;
    }
    number.parse().ok()
}

/// File name for the `n`-th rendered page, e.g. `slide_007.png`.
pub fn page_file_name(n: u32) -> String {
    format!("slide_{:03}.png", n)
}

/// Rasterize every page of `pdf_path` into `output_dir` at `dpi`.
///
/// Pages are written as `slide_NNN.png` and returned in page order.
///
/// # Errors
///
/// - `DependencyUnavailable` if `pdftoppm` is missing
/// - `Render` if `pdftoppm` fails
/// - `EmptyRender` if no page images were produced
pub async fn rasterize_pdf(pdf_path: &Path, output_dir: &Path, dpi: u32) -> Result<Vec<PathBuf>> {
    let pdftoppm = locate_pdftoppm()?;
    fs::create_dir_all(output_dir).await?;

    tracing::info!("Rasterizing {} at {} dpi", pdf_path.display(), dpi);

    let output = Command::new(&pdftoppm)
        .arg("-png")
        .arg("-r")
        .arg(dpi.to_string())
        .arg(pdf_path)
        .arg(output_dir.join(RAW_PREFIX))
        .output()
        .await
        .map_err(|e| {
            DeckbenchError::dependency_unavailable(
                PDFTOPPM,
                format!("Failed to execute '{}': {}. {}", pdftoppm.display(), e, poppler_install_message()),
            )
        })?;

    if !output.status.success() {
        return Err(DeckbenchError::render(format!(
            "pdftoppm exited with code {}: {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let mut raw_pages = Vec::new();
    let mut entries = fs::read_dir(output_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if let Some(n) = raw_page_number(&path) {
            raw_pages.push((n, path));
        }
    }

    if raw_pages.is_empty() {
        return Err(DeckbenchError::EmptyRender {
            path: pdf_path.to_path_buf(),
        });
    }

    raw_pages.sort_by_key(|(n, _)| *n);

    let mut pages = Vec::with_capacity(raw_pages.len());
    for (n, raw) in raw_pages {
        let target = output_dir.join(page_file_name(n));
        fs::rename(&raw, &target).await?;
        pages.push(target);
    }

    tracing::debug!("Rendered {} page images", pages.len());
    Ok(pages)
}
