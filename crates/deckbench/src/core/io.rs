//! File I/O utilities.
//!
//! Corpus discovery for the local benchmark and the writers for extraction
//! output (JSON unit dumps and plain-text renderings).

use crate::error::{DeckbenchError, Result};
use crate::types::ExtractedUnit;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Separator between units in text output.
pub const TEXT_UNIT_SEPARATOR: &str = "\n\n---\n\n";

/// Output format for extracted units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}

impl OutputFormat {
    /// Default file extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Text => "txt",
        }
    }
}

/// Traverse a directory and return all file paths matching a filter.
///
/// # Errors
///
/// Returns `DeckbenchError::NotFound` if `dir` is not a directory and
/// `DeckbenchError::Io` for I/O errors.
pub fn traverse_directory<F>(dir: impl AsRef<Path>, recursive: bool, filter: Option<F>) -> Result<Vec<PathBuf>>
where
    F: Fn(&Path) -> bool,
{
    let dir = dir.as_ref();
    let mut files = Vec::new();

    if !dir.is_dir() {
        return Err(DeckbenchError::not_found("folder", dir));
    }

    traverse_directory_impl(dir, recursive, &filter, &mut files)?;
    Ok(files)
}

fn traverse_directory_impl<F>(dir: &Path, recursive: bool, filter: &Option<F>, files: &mut Vec<PathBuf>) -> Result<()>
where
    F: Fn(&Path) -> bool,
{
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_file() {
            if filter.as_ref().is_none_or(|f| f(&path)) {
                files.push(path);
            }
        } else if path.is_dir() && recursive {
            traverse_directory_impl(&path, recursive, filter, files)?;
        }
    }

    Ok(())
}

/// Files directly inside `folder` whose extension is one of `suffixes`
/// (case-insensitive, without the dot), sorted by path.
///
/// # Errors
///
/// `NotFound` if the folder is missing or nothing matches.
pub fn collect_files(folder: impl AsRef<Path>, suffixes: &[&str]) -> Result<Vec<PathBuf>> {
    let folder = folder.as_ref();
    let mut files = traverse_directory(
        folder,
        false,
        Some(|path: &Path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| suffixes.iter().any(|s| s.eq_ignore_ascii_case(e)))
        }),
    )?;

    if files.is_empty() {
        return Err(DeckbenchError::not_found("matching files", folder));
    }

    files.sort();
    Ok(files)
}

/// Render units in the given format.
pub fn render_units(units: &[ExtractedUnit], format: OutputFormat, include_notes: bool) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(units)?),
        OutputFormat::Text => {
            let parts: Vec<String> = units.iter().map(|u| u.to_text(include_notes)).collect();
            Ok(format!("{}\n", parts.join(TEXT_UNIT_SEPARATOR)))
        }
    }
}

/// Write units to `path` in the given format.
pub async fn write_units(
    units: &[ExtractedUnit],
    path: impl AsRef<Path>,
    format: OutputFormat,
    include_notes: bool,
) -> Result<()> {
    let path = path.as_ref();
    let content = render_units(units, format, include_notes)?;
    tokio::fs::write(path, content).await?;
    tracing::info!("Wrote {} units to {}", units.len(), path.display());
    Ok(())
}

/// Read a JSON unit dump written by [`write_units`].
pub async fn read_units(path: impl AsRef<Path>) -> Result<Vec<ExtractedUnit>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DeckbenchError::not_found("unit dump", path));
    }
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Parse a slide selection such as `"1,3,5-10"` into a sorted, de-duplicated list.
///
/// # Errors
///
/// `Configuration` for empty parts, non-numbers, zero, or reversed ranges.
pub fn parse_slide_range(spec: &str) -> Result<Vec<u32>> {
    let invalid = |part: &str| DeckbenchError::configuration(format!("Invalid slide selection '{}' in '{}'", part, spec));
    let parse = |s: &str, part: &str| -> Result<u32> {
        match s.trim().parse::<u32>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(invalid(part)),
        }
    };

    let mut slides = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(invalid(part));
        }
        match part.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (parse(start, part)?, parse(end, part)?);
                if start > end {
                    return Err(invalid(part));
                }
                slides.extend(start..=end);
            }
            None => slides.push(parse(part, part)?),
        }
    }

    slides.sort_unstable();
    slides.dedup();
    Ok(slides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::tempdir;

    fn unit(n: u32, content: &str) -> ExtractedUnit {
        ExtractedUnit::new(n, content, "direct", Duration::ZERO)
    }

    #[test]
    fn test_parse_slide_range() {
        assert_eq!(parse_slide_range("1,3,5-7").unwrap(), vec![1, 3, 5, 6, 7]);
        assert_eq!(parse_slide_range(" 4 , 2-3, 3 ").unwrap(), vec![2, 3, 4]);
    }

    #[test]
    fn test_parse_slide_range_rejects_malformed_parts() {
        for spec in ["", "1,,2", "a", "0", "5-2", "1-x"] {
            let err = parse_slide_range(spec).unwrap_err();
            assert!(matches!(err, DeckbenchError::Configuration { .. }), "spec {spec:?}");
        }
    }

    #[test]
    fn test_collect_files_filters_and_sorts() {
        let dir = tempdir().unwrap();
        for name in ["b.PNG", "a.jpg", "notes.txt", "c.pdf"] {
            File::create(dir.path().join(name)).unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let files = collect_files(dir.path(), &["png", "jpg"]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.PNG"]);
    }

    #[test]
    fn test_collect_files_missing_folder() {
        let err = collect_files("/nonexistent/folder", &["pdf"]).unwrap_err();
        assert!(matches!(err, DeckbenchError::NotFound { kind: "folder", .. }));
    }

    #[test]
    fn test_collect_files_no_match() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("a.txt")).unwrap();
        let err = collect_files(dir.path(), &["pdf"]).unwrap_err();
        assert!(matches!(err, DeckbenchError::NotFound { kind: "matching files", .. }));
    }

    #[test]
    fn test_traverse_directory_recursive() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        File::create(dir.path().join("top.pdf")).unwrap();
        File::create(dir.path().join("sub").join("deep.pdf")).unwrap();

        let flat = traverse_directory(dir.path(), false, None::<fn(&Path) -> bool>).unwrap();
        let deep = traverse_directory(dir.path(), true, None::<fn(&Path) -> bool>).unwrap();
        assert_eq!(flat.len(), 1);
        assert_eq!(deep.len(), 2);
    }

    #[test]
    fn test_render_text_joins_units() {
        let text = render_units(&[unit(1, "A"), unit(2, "B")], OutputFormat::Text, false).unwrap();
        assert_eq!(text, "=== Slide 1 ===\n\nA\n\n---\n\n=== Slide 2 ===\n\nB\n");
    }

    #[tokio::test]
    async fn test_write_and_read_json_units() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");
        let units = vec![unit(1, "Erste Folie"), unit(2, "Zweite Folie")];

        write_units(&units, &path, OutputFormat::Json, false).await.unwrap();
        let back = read_units(&path).await.unwrap();

        assert_eq!(back.len(), 2);
        assert_eq!(back[0].content, "Erste Folie");
        assert_eq!(back[1].method, "direct");
    }
}
