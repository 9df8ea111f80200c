//! Benchmark reports.
//!
//! Every benchmark is persisted twice: a Markdown report for people and a JSON
//! dump carrying the full per-unit content for machines.

use super::local::LocalBenchmarkReport;
use crate::error::{DeckbenchError, Result};
use crate::types::BenchmarkResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Units shown per method in the report details.
pub const PREVIEW_UNITS: usize = 3;

/// Characters shown per previewed unit.
pub const PREVIEW_CHARS: usize = 200;

fn preview(content: &str) -> String {
    content.chars().take(PREVIEW_CHARS).collect::<String>().replace('\n', " ")
}

/// Markdown comparison of benchmark results.
///
/// A summary table with one row per method is followed by a detail section per
/// method with its notes, timings and a short preview of the first units.
pub fn format_benchmark_report(results: &[BenchmarkResult]) -> String {
    let mut lines = vec![
        "# Benchmark-Report: Dokumentenextraktion\n".to_string(),
        "## Zusammenfassung\n".to_string(),
        "| Methode | Slides | Zeit (s) | ø/Slide (s) | Zeichen | Tokens | Kosten (USD) | GPU |".to_string(),
        "|---------|--------|----------|-------------|---------|--------|--------------|-----|".to_string(),
    ];

    for r in results {
        let gpu = if r.gpu_required { "✓" } else { "✗" };
        let cost = if r.estimated_cost_usd > 0.0 {
            format!("${:.4}", r.estimated_cost_usd)
        } else {
            "lokal".to_string()
        };
        lines.push(format!(
            "| {} | {} | {:.2} | {:.3} | {} | {} | {} | {} |",
            r.method,
            r.total_slides,
            r.total_time_seconds,
            r.avg_time_per_slide,
            r.total_chars,
            r.total_tokens_estimate,
            cost,
            gpu
        ));
    }

    lines.push("\n## Details pro Methode\n".to_string());

    for r in results {
        lines.push(format!("### {}\n", r.method));
        lines.push(format!("- **Notizen**: {}", r.notes));
        lines.push(format!("- **Gesamtzeit**: {:.2}s", r.total_time_seconds));
        lines.push(format!("- **Durchsatz**: {:.3}s/Slide\n", r.avg_time_per_slide));

        for slide in r.slides.iter().take(PREVIEW_UNITS) {
            lines.push(format!(
                "**Slide {}** ({} Zeichen):",
                slide.slide_number,
                slide.char_count()
            ));
            lines.push(format!("> {}...\n", preview(&slide.content)));
        }

        if r.slides.len() > PREVIEW_UNITS {
            lines.push(format!("*... und {} weitere Slides*\n", r.slides.len() - PREVIEW_UNITS));
        }
    }

    lines.join("\n")
}

/// JSON dump written next to a benchmark report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkDump {
    /// The benchmarked document, or a description of the image set.
    pub file: String,
    /// RFC 3339 timestamp.
    pub generated_at: String,
    pub results: Vec<BenchmarkResult>,
}

impl BenchmarkDump {
    pub fn new(file: impl Into<String>, results: Vec<BenchmarkResult>) -> Self {
        Self {
            file: file.into(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            results,
        }
    }
}

/// Paths written by a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedReport {
    pub markdown: PathBuf,
    pub json: PathBuf,
}

async fn write_pair(report_path: &Path, markdown: &str, json: &str) -> Result<SavedReport> {
    if let Some(parent) = report_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let json_path = report_path.with_extension("json");
    tokio::fs::write(report_path, markdown).await?;
    tokio::fs::write(&json_path, json).await?;

    tracing::info!("Report written to {}", report_path.display());
    tracing::info!("Data written to {}", json_path.display());
    Ok(SavedReport {
        markdown: report_path.to_path_buf(),
        json: json_path,
    })
}

/// Write the Markdown report to `report_path` and the dump to its `.json` sibling.
pub async fn save_benchmark(dump: &BenchmarkDump, report_path: &Path) -> Result<SavedReport> {
    let markdown = format_benchmark_report(&dump.results);
    let json = serde_json::to_string_pretty(dump)?;
    write_pair(report_path, &markdown, &json).await
}

/// Read a dump written by [`save_benchmark`].
pub async fn load_dump(path: &Path) -> Result<BenchmarkDump> {
    if !tokio::fs::try_exists(path).await? {
        return Err(DeckbenchError::not_found("benchmark dump", path));
    }
    let raw = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&raw)
        .map_err(|e| DeckbenchError::serialization_with_source(format!("Invalid benchmark dump {}", path.display()), e))
}

/// Markdown report of a local benchmark run.
pub fn format_local_benchmark_report(data: &LocalBenchmarkReport) -> String {
    let mut lines = vec![
        "# Lokaler OCR-Benchmark: DeepSeek OCR 2 vs. EasyOCR".to_string(),
        String::new(),
        "## Inputs".to_string(),
        format!("- Handschrift-Ordner: `{}`", data.inputs.handwriting_dir),
        format!("- Rechnungs-Ordner: `{}`", data.inputs.invoices_dir),
        format!("- Handschrift-Dateien: {}", data.inputs.handwriting_files.len()),
        format!("- Rechnungs-PDFs: {}", data.inputs.invoice_files.len()),
        String::new(),
        "## Handschrift (OCR)".to_string(),
        "| Modell | Dateien | Zeit gesamt (s) | Ø pro Datei (s) |".to_string(),
        "|---|---:|---:|---:|".to_string(),
    ];

    for (model, run) in &data.handwriting {
        lines.push(format!(
            "| {} | {} | {:.3} | {:.3} |",
            model, run.total_items, run.total_time_seconds, run.avg_time_seconds
        ));
    }
    lines.push(String::new());

    lines.push("## Rechnungen (Property-Extraktion)".to_string());
    lines.push("| Modell | PDFs | Zeit gesamt (s) | Ø pro PDF (s) | Ø Füllgrad Properties |".to_string());
    lines.push("|---|---:|---:|---:|---:|".to_string());
    for (model, run) in &data.invoices {
        lines.push(format!(
            "| {} | {} | {:.3} | {:.3} | {:.2}% |",
            model,
            run.total_items,
            run.total_time_seconds,
            run.avg_time_seconds,
            run.avg_property_fill_ratio * 100.0
        ));
    }
    lines.push(String::new());

    lines.push("## Hinweise".to_string());
    lines.push("- Der Füllgrad misst nur, wie viele Felder befüllt wurden, nicht deren Korrektheit.".to_string());
    lines.push("- Für Qualitätsvergleich `ground_truth_json` mit Sollwerten pro PDF verwenden.".to_string());
    lines.push(String::new());

    lines.join("\n")
}

/// Write the local report to `report_path` and the full result to its `.json` sibling.
pub async fn save_local_benchmark(data: &LocalBenchmarkReport, report_path: &Path) -> Result<SavedReport> {
    let markdown = format_local_benchmark_report(data);
    let json = serde_json::to_string_pretty(data)?;
    write_pair(report_path, &markdown, &json).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::local::{HandwritingRun, InvoiceRun, LocalInputs};
    use crate::types::ExtractedUnit;
    use indexmap::IndexMap;
    use std::time::Duration;

    fn result(method: &str, contents: &[&str], cost: f64, gpu: bool) -> BenchmarkResult {
        let units = contents
            .iter()
            .enumerate()
            .map(|(i, c)| ExtractedUnit::new(i as u32 + 1, *c, method, Duration::from_millis(500)))
            .collect();
        BenchmarkResult::from_units(method, units, Duration::from_secs(2), cost, gpu, "Lokal gehostet, Modus: structured")
    }

    #[test]
    fn test_summary_row() {
        let report = format_benchmark_report(&[result("glm-ocr/glm-ocr/structured", &["abcd", "efgh"], 0.0, true)]);
        assert!(report.starts_with("# Benchmark-Report: Dokumentenextraktion\n\n## Zusammenfassung\n\n| Methode |"));
        assert!(report.contains("| glm-ocr/glm-ocr/structured | 2 | 2.00 | 1.000 | 8 | 2 | lokal | ✓ |"));
        assert!(report.contains("- **Durchsatz**: 1.000s/Slide\n"));
    }

    #[test]
    fn test_cost_column_for_cloud_methods() {
        let report = format_benchmark_report(&[result("vision-openai/gpt-5.2", &["x"], 0.015, false)]);
        assert!(report.contains("| $0.0150 | ✗ |"));
    }

    #[test]
    fn test_preview_is_bounded_with_truncation_notice() {
        let long = "z\n".repeat(300);
        let report = format_benchmark_report(&[result("m", &[long.as_str(), "b", "c", "d", "e"], 0.0, false)]);

        assert!(report.contains("**Slide 1** (600 Zeichen):"));
        assert!(report.contains(&format!("> {}...\n", "z ".repeat(100))));
        assert!(report.contains("**Slide 3**"));
        assert!(!report.contains("**Slide 4**"));
        assert!(report.contains("*... und 2 weitere Slides*"));
    }

    #[test]
    fn test_no_truncation_notice_for_short_runs() {
        let report = format_benchmark_report(&[result("m", &["a", "b", "c"], 0.0, false)]);
        assert!(!report.contains("weitere Slides"));
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let report_path = dir.path().join("out").join("deck_benchmark.md");
        let dump = BenchmarkDump::new("deck.pptx", vec![result("deepseek-ocr2/vllm/free", &["Ä\nb", ""], 0.0, true)]);

        let saved = save_benchmark(&dump, &report_path).await.unwrap();
        assert_eq!(saved.json, dir.path().join("out").join("deck_benchmark.json"));
        assert!(std::fs::read_to_string(&saved.markdown).unwrap().contains("deepseek-ocr2/vllm/free"));

        let loaded = load_dump(&saved.json).await.unwrap();
        assert_eq!(loaded.file, "deck.pptx");
        assert_eq!(loaded.results[0].method, "deepseek-ocr2/vllm/free");
        assert_eq!(loaded.results[0].total_slides, 2);
        assert_eq!(loaded.results[0].slides[0].content, "Ä\nb");
        assert_eq!(loaded.results[0].slides[1].content, "");
    }

    #[tokio::test]
    async fn test_load_missing_dump() {
        let err = load_dump(Path::new("/nonexistent/dump.json")).await.unwrap_err();
        assert!(matches!(err, DeckbenchError::NotFound { .. }));
    }

    #[test]
    fn test_local_report_tables() {
        let mut handwriting = IndexMap::new();
        handwriting.insert(
            "easyocr".to_string(),
            HandwritingRun {
                model: "easyocr".into(),
                total_items: 2,
                total_time_seconds: 1.5,
                avg_time_seconds: 0.75,
                items: vec![],
            },
        );
        let mut invoices = IndexMap::new();
        invoices.insert(
            "easyocr".to_string(),
            InvoiceRun {
                total_items: 1,
                total_time_seconds: 3.0,
                avg_time_seconds: 3.0,
                avg_property_fill_ratio: 0.2941,
                items: vec![],
            },
        );
        let data = LocalBenchmarkReport {
            inputs: LocalInputs {
                handwriting_dir: "hw".into(),
                invoices_dir: "inv".into(),
                handwriting_files: vec!["hw/a.png".into(), "hw/b.png".into()],
                invoice_files: vec!["inv/r.pdf".into()],
            },
            methods: vec!["easyocr".into()],
            handwriting,
            invoices,
        };

        let report = format_local_benchmark_report(&data);
        assert!(report.contains("- Handschrift-Ordner: `hw`"));
        assert!(report.contains("- Rechnungs-PDFs: 1"));
        assert!(report.contains("| easyocr | 2 | 1.500 | 0.750 |"));
        assert!(report.contains("| easyocr | 1 | 3.000 | 3.000 | 29.41% |"));
        assert!(report.ends_with("pro PDF verwenden.\n"));
    }
}
