//! LibreOffice conversion of office documents to PDF.
//!
//! Slide decks and other office formats are converted with `soffice --headless
//! --convert-to pdf` before rasterization. The executable is located from, in
//! order: an explicit configured path, the `DECKBENCH_LIBREOFFICE_PATH`,
//! `SOFFICE_PATH` and `LIBREOFFICE_PATH` environment variables, the macOS
//! application bundle, `$HOMEBREW_PREFIX/bin` and finally `PATH`.
//!
//! # System Requirement
//!
//! - **macOS**: `brew install --cask libreoffice`
//! - **Linux**: `apt install libreoffice` or `dnf install libreoffice`

use crate::error::{DeckbenchError, Result};
use std::collections::HashSet;
use std::env;
use std::fs as std_fs;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;
use tokio::time::{Duration, timeout};

/// Default timeout for a LibreOffice conversion (300 seconds).
pub const DEFAULT_CONVERSION_TIMEOUT: u64 = 300;

fn libreoffice_install_message() -> String {
    "Install LibreOffice: macOS: 'brew install --cask libreoffice', \
Linux: 'apt install libreoffice'. \
If LibreOffice is installed in a custom location, set DECKBENCH_LIBREOFFICE_PATH to the soffice executable."
        .to_string()
}

fn soffice_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    let mut push_candidate = |path: PathBuf| {
        if seen.insert(path.clone()) {
            candidates.push(path);
        }
    };

    if let Some(path) = explicit {
        push_candidate(path.to_path_buf());
    }

    for var in ["DECKBENCH_LIBREOFFICE_PATH", "SOFFICE_PATH", "LIBREOFFICE_PATH"] {
        if let Some(value) = env::var_os(var).filter(|v| !v.is_empty()) {
            push_candidate(PathBuf::from(value));
        }
    }

    if cfg!(target_os = "macos") {
        push_candidate(PathBuf::from("/Applications/LibreOffice.app/Contents/MacOS/soffice"));
    }

    if let Some(prefix) = env::var_os("HOMEBREW_PREFIX") {
        let prefix_path = PathBuf::from(prefix);
        push_candidate(prefix_path.join("bin/soffice"));
        push_candidate(prefix_path.join("bin/libreoffice"));
    }

    if let Some(path_env) = env::var_os("PATH") {
        for dir in env::split_paths(&path_env) {
            push_candidate(dir.join("libreoffice"));
            push_candidate(dir.join("soffice"));
        }
    }

    candidates
}

/// Locate the soffice executable without running it.
///
/// # Errors
///
/// `DeckbenchError::DependencyUnavailable` when no candidate exists.
pub fn locate_soffice_binary(explicit: Option<&Path>) -> Result<PathBuf> {
    for candidate in soffice_candidates(explicit) {
        if candidate.exists()
            && let Ok(metadata) = std_fs::metadata(&candidate)
            && metadata.is_file()
        {
            return Ok(candidate);
        }
    }

    Err(DeckbenchError::dependency_unavailable(
        "LibreOffice",
        libreoffice_install_message(),
    ))
}

/// Convert `input_path` to PDF inside `output_dir` and return the PDF path.
///
/// # Errors
///
/// - `DependencyUnavailable` if soffice cannot be found or started
/// - `Render` if the conversion fails, times out or writes no PDF
pub async fn convert_to_pdf(
    input_path: &Path,
    output_dir: &Path,
    soffice_override: Option<&Path>,
    timeout_seconds: u64,
) -> Result<PathBuf> {
    let soffice_path = locate_soffice_binary(soffice_override)?;

    fs::create_dir_all(output_dir).await?;

    tracing::info!(
        "Converting {} to PDF with {}",
        input_path.display(),
        soffice_path.display()
    );

    let child = Command::new(&soffice_path)
        .arg("--headless")
        .arg("--convert-to")
        .arg("pdf")
        .arg("--outdir")
        .arg(output_dir)
        .arg(input_path)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            DeckbenchError::dependency_unavailable(
                "LibreOffice",
                format!(
                    "Failed to execute '{}': {}. {}",
                    soffice_path.display(),
                    e,
                    libreoffice_install_message()
                ),
            )
        })?;

    let child_id = child.id();

    let output = match timeout(Duration::from_secs(timeout_seconds), child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(DeckbenchError::render_with_source("Failed to wait for LibreOffice", e));
        }
        Err(_) => {
            return Err(DeckbenchError::render(format!(
                "LibreOffice conversion timed out after {} seconds (PID: {:?})",
                timeout_seconds, child_id
            )));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        return Err(DeckbenchError::render(format!(
            "LibreOffice exited with code {}: {}",
            output.status.code().unwrap_or(-1),
            if !stderr.is_empty() { stderr } else { stdout }
        )));
    }

    let input_stem = input_path
        .file_stem()
        .ok_or_else(|| DeckbenchError::render("Invalid input file name"))?;

    let expected_output = output_dir.join(format!("{}.pdf", input_stem.to_string_lossy()));
    if !expected_output.exists() {
        return Err(DeckbenchError::render(format!(
            "LibreOffice finished but produced no PDF at {}",
            expected_output.display()
        )));
    }

    Ok(expected_output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_explicit_path_is_first_candidate() {
        let explicit = PathBuf::from("/opt/custom/soffice");
        let candidates = soffice_candidates(Some(&explicit));
        assert_eq!(candidates.first(), Some(&explicit));
    }

    #[test]
    fn test_candidates_are_unique() {
        let candidates = soffice_candidates(None);
        let unique: HashSet<_> = candidates.iter().collect();
        assert_eq!(unique.len(), candidates.len());
    }

    #[test]
    fn test_locate_uses_existing_explicit_file() {
        let dir = tempdir().unwrap();
        let fake = dir.path().join("soffice");
        std::fs::write(&fake, b"#!/bin/sh\n").unwrap();

        let found = locate_soffice_binary(Some(&fake)).unwrap();
        assert_eq!(found, fake);
    }

    #[tokio::test]
    async fn test_convert_missing_input_fails() {
        let Ok(_) = locate_soffice_binary(None) else {
            return;
        };

        let dir = tempdir().unwrap();
        let result = convert_to_pdf(
            Path::new("/nonexistent/deck.pptx"),
            dir.path(),
            None,
            DEFAULT_CONVERSION_TIMEOUT,
        )
        .await;
        assert!(result.is_err());
    }
}
