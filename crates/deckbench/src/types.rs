//! Result model shared by every extraction backend.
//!
//! [`ExtractedUnit`] is one page, slide or image worth of output. [`BenchmarkResult`]
//! aggregates the units one backend produced during a benchmark run and owns them.

use serde::{Deserialize, Serialize, Serializer};
use std::time::Duration;

/// Approximate characters per token for the token estimate.
pub const CHARS_PER_TOKEN: usize = 4;

/// Rough token estimate used for embedding budgets: `max(1, chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() / CHARS_PER_TOKEN).max(1)
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn serialize_round2<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to(*value, 2))
}

fn serialize_round3<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to(*value, 3))
}

fn serialize_round4<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to(*value, 4))
}

/// A table found on a slide: optional header row plus ordered data rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

impl TableData {
    /// Build a table from raw rows. With two or more rows the first one becomes the header.
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Self {
        if rows.len() > 1 {
            let headers = rows.remove(0);
            Self { headers, rows }
        } else {
            Self {
                headers: Vec::new(),
                rows,
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.rows.is_empty()
    }

    /// Render as a pipe-delimited Markdown table.
    ///
    /// Rows are padded or truncated to the column count, which comes from the
    /// header or, without one, from the first row.
    pub fn to_markdown(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let col_count = if self.headers.is_empty() {
            self.rows.first().map(Vec::len).unwrap_or(0)
        } else {
            self.headers.len()
        };

        let mut lines = Vec::with_capacity(self.rows.len() + 2);
        if !self.headers.is_empty() {
            lines.push(format!("| {} |", self.headers.join(" | ")));
            lines.push(format!("| {} |", vec!["---"; col_count].join(" | ")));
        }

        for row in &self.rows {
            let padded: Vec<&str> = (0..col_count)
                .map(|i| row.get(i).map(String::as_str).unwrap_or(""))
                .collect();
            lines.push(format!("| {} |", padded.join(" | ")));
        }

        lines.join("\n")
    }
}

/// Extracted content of a single page, slide or image.
///
/// `slide_number` is 1-based and reflects the position in the source document,
/// so a filtered run keeps the original numbering. `content` is never absent;
/// an empty page yields an empty string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "UnitRecord", from = "UnitRecord")]
pub struct ExtractedUnit {
    pub slide_number: u32,
    pub title: Option<String>,
    pub content: String,
    pub tables: Vec<TableData>,
    pub notes: Option<String>,
    /// Backend identity plus sub-mode, e.g. `deepseek-ocr2/vllm/free`.
    pub method: String,
    pub elapsed_seconds: f64,
    pub token_count: usize,
    /// Rewritten text produced by the optional vector-ready post-processing step.
    pub vector_ready_text: Option<String>,
}

impl ExtractedUnit {
    pub fn new(slide_number: u32, content: impl Into<String>, method: impl Into<String>, elapsed: Duration) -> Self {
        let content = content.into();
        let token_count = estimate_tokens(&content);
        Self {
            slide_number,
            title: None,
            content,
            tables: Vec::new(),
            notes: None,
            method: method.into(),
            elapsed_seconds: elapsed.as_secs_f64(),
            token_count,
            vector_ready_text: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        self.title = (!title.is_empty()).then_some(title);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        let notes = notes.into();
        self.notes = (!notes.is_empty()).then_some(notes);
        self
    }

    pub fn with_tables(mut self, tables: Vec<TableData>) -> Self {
        self.tables = tables;
        self
    }

    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }

    /// Human-readable rendering used for text output.
    pub fn to_text(&self, include_notes: bool) -> String {
        let mut parts = Vec::new();

        let header = match self.title.as_deref() {
            Some(title) => format!("=== Slide {}: {} ===", self.slide_number, title),
            None => format!("=== Slide {} ===", self.slide_number),
        };
        parts.push(header);

        if !self.content.is_empty() {
            parts.push(self.content.clone());
        }

        for table in &self.tables {
            let md = table.to_markdown();
            if !md.is_empty() {
                parts.push(format!("\n[Tabelle]\n{}", md));
            }
        }

        if include_notes && let Some(notes) = self.notes.as_deref() {
            parts.push(format!("\n[Speaker Notes]\n{}", notes));
        }

        parts.join("\n\n")
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct UnitMeta {
    method: String,
    #[serde(serialize_with = "serialize_round3", default)]
    time_seconds: f64,
    #[serde(default)]
    token_count: usize,
}

/// Wire shape of [`ExtractedUnit`]: optional parts are omitted when empty and
/// provenance is grouped under `_meta`.
#[derive(Debug, Serialize, Deserialize)]
struct UnitRecord {
    slide_number: u32,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tables: Vec<TableData>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vector_ready_text: Option<String>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    meta: Option<UnitMeta>,
}

impl From<ExtractedUnit> for UnitRecord {
    fn from(unit: ExtractedUnit) -> Self {
        let meta = (!unit.method.is_empty()).then(|| UnitMeta {
            method: unit.method,
            time_seconds: unit.elapsed_seconds,
            token_count: unit.token_count,
        });
        Self {
            slide_number: unit.slide_number,
            title: unit.title.unwrap_or_default(),
            content: unit.content,
            tables: unit.tables,
            notes: unit.notes.unwrap_or_default(),
            vector_ready_text: unit.vector_ready_text,
            meta,
        }
    }
}

impl From<UnitRecord> for ExtractedUnit {
    fn from(record: UnitRecord) -> Self {
        let (method, elapsed_seconds, token_count) = match record.meta {
            Some(meta) => (meta.method, meta.time_seconds, meta.token_count),
            None => (String::new(), 0.0, estimate_tokens(&record.content)),
        };
        Self {
            slide_number: record.slide_number,
            title: (!record.title.is_empty()).then_some(record.title),
            content: record.content,
            tables: record.tables,
            notes: (!record.notes.is_empty()).then_some(record.notes),
            method,
            elapsed_seconds,
            token_count,
            vector_ready_text: record.vector_ready_text,
        }
    }
}

/// Aggregated outcome of running one backend over one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub method: String,
    pub total_slides: usize,
    #[serde(serialize_with = "serialize_round2")]
    pub total_time_seconds: f64,
    #[serde(serialize_with = "serialize_round3")]
    pub avg_time_per_slide: f64,
    pub total_chars: usize,
    pub total_tokens_estimate: usize,
    #[serde(serialize_with = "serialize_round4")]
    pub estimated_cost_usd: f64,
    pub gpu_required: bool,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub slides: Vec<ExtractedUnit>,
}

impl BenchmarkResult {
    /// Derive the aggregate statistics from a backend's units.
    ///
    /// The average is 0 when no units were produced.
    pub fn from_units(
        method: impl Into<String>,
        slides: Vec<ExtractedUnit>,
        total_time: Duration,
        per_unit_cost: f64,
        gpu_required: bool,
        notes: impl Into<String>,
    ) -> Self {
        let total_slides = slides.len();
        let total_time_seconds = total_time.as_secs_f64();
        let avg_time_per_slide = if total_slides > 0 {
            total_time_seconds / total_slides as f64
        } else {
            0.0
        };
        let total_chars = slides.iter().map(ExtractedUnit::char_count).sum();
        let total_tokens_estimate = slides
            .iter()
            .map(|s| {
                if s.token_count > 0 {
                    s.token_count
                } else {
                    estimate_tokens(&s.content)
                }
            })
            .sum();

        Self {
            method: method.into(),
            total_slides,
            total_time_seconds,
            avg_time_per_slide,
            total_chars,
            total_tokens_estimate,
            estimated_cost_usd: per_unit_cost * total_slides as f64,
            gpu_required,
            notes: notes.into(),
            slides,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(n: u32, content: &str) -> ExtractedUnit {
        ExtractedUnit::new(n, content, "direct", Duration::from_millis(10))
    }

    #[test]
    fn test_estimate_tokens_minimum_one() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }

    #[test]
    fn test_estimate_tokens_counts_chars_not_bytes() {
        assert_eq!(estimate_tokens("äöüßäöüß"), 2);
    }

    #[test]
    fn test_table_from_rows_uses_first_row_as_header() {
        let table = TableData::from_rows(vec![
            vec!["Name".into(), "Wert".into()],
            vec!["a".into(), "1".into()],
        ]);
        assert_eq!(table.headers, vec!["Name", "Wert"]);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn test_table_from_single_row_has_no_header() {
        let table = TableData::from_rows(vec![vec!["only".into()]]);
        assert!(table.headers.is_empty());
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn test_table_markdown_pads_and_truncates() {
        let table = TableData {
            headers: vec!["A".into(), "B".into()],
            rows: vec![vec!["1".into()], vec!["x".into(), "y".into(), "z".into()]],
        };
        assert_eq!(table.to_markdown(), "| A | B |\n| --- | --- |\n| 1 |  |\n| x | y |");
    }

    #[test]
    fn test_table_markdown_empty() {
        assert_eq!(TableData::default().to_markdown(), "");
    }

    #[test]
    fn test_to_text_with_title_tables_and_notes() {
        let unit = unit(2, "Body")
            .with_title("Agenda")
            .with_notes("Remember")
            .with_tables(vec![TableData::from_rows(vec![vec!["h".into()], vec!["v".into()]])]);

        let text = unit.to_text(true);
        assert!(text.starts_with("=== Slide 2: Agenda ==="));
        assert!(text.contains("Body"));
        assert!(text.contains("[Tabelle]\n| h |"));
        assert!(text.contains("[Speaker Notes]\nRemember"));

        assert!(!unit.to_text(false).contains("Speaker Notes"));
    }

    #[test]
    fn test_unit_serialization_omits_empty_parts() {
        let value = serde_json::to_value(unit(1, "Hello")).unwrap();
        assert_eq!(value["slide_number"], 1);
        assert_eq!(value["title"], "");
        assert!(value.get("tables").is_none());
        assert!(value.get("notes").is_none());
        assert_eq!(value["_meta"]["method"], "direct");
        assert_eq!(value["_meta"]["time_seconds"], 0.01);
    }

    #[test]
    fn test_unit_without_method_has_no_meta() {
        let mut u = unit(1, "x");
        u.method.clear();
        let value = serde_json::to_value(u).unwrap();
        assert!(value.get("_meta").is_none());
    }

    #[test]
    fn test_benchmark_result_average() {
        let result = BenchmarkResult::from_units(
            "direct",
            vec![unit(1, "abcd"), unit(2, "efgh")],
            Duration::from_secs(3),
            0.0,
            false,
            "",
        );
        assert_eq!(result.total_slides, 2);
        assert!((result.avg_time_per_slide - 1.5).abs() < f64::EPSILON);
        assert_eq!(result.total_chars, 8);
        assert_eq!(result.total_tokens_estimate, 2);
    }

    #[test]
    fn test_benchmark_result_empty_has_zero_average() {
        let result = BenchmarkResult::from_units("glm-ocr", Vec::new(), Duration::from_secs(5), 0.5, true, "");
        assert_eq!(result.total_slides, 0);
        assert_eq!(result.avg_time_per_slide, 0.0);
        assert_eq!(result.estimated_cost_usd, 0.0);
    }

    #[test]
    fn test_benchmark_result_cost_scales_with_units() {
        let result = BenchmarkResult::from_units(
            "vision-openai/gpt-5.2",
            vec![unit(1, "a"), unit(2, "b"), unit(3, "c")],
            Duration::from_secs(1),
            0.015,
            false,
            "",
        );
        assert!((result.estimated_cost_usd - 0.045).abs() < 1e-9);
    }

    #[test]
    fn test_benchmark_result_serialization_rounds() {
        let result = BenchmarkResult::from_units(
            "direct",
            vec![unit(1, "a"), unit(2, "b"), unit(3, "c")],
            Duration::from_millis(1234),
            0.0,
            false,
            "",
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["total_time_seconds"], 1.23);
        assert_eq!(value["avg_time_per_slide"], 0.411);
    }
}
