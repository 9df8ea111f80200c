//! Vector-ready post-processing.
//!
//! An optional final LLM pass rewrites each unit's content into standalone text
//! suited for embedding, stored in [`ExtractedUnit::vector_ready_text`].

use crate::error::{DeckbenchError, Result};
use crate::llm::TextLlm;
use crate::types::ExtractedUnit;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const SYSTEM_PROMPT: &str = "\
Du bist ein Spezialist fuer Wissensaufbereitung fuer Vektor-Datenbanken.
Ausgabe muss praezise, eigenstaendig verstaendlich und fuer semantische Suche optimiert sein.
Nutze klare Struktur und konsistente Begriffe.
";

pub const POWERPOINT_PROMPT: &str = "\
Du bekommst extrahierten Slide-/Dokumenttext.
Erzeuge einen finalen, vektorisierungsbereiten Endtext in Deutsch.

Anforderungen:
1) Alle relevanten Fakten erhalten, Redundanz reduzieren.
2) Prozessdiagramme als detaillierte Prozessbeschreibung aufloesen:
   - Schritte in logischer Reihenfolge
   - Entscheidungen/Bedingungen
   - Ein-/Ausgaben pro Schritt
   - beteiligte Rollen/Systeme
3) Klare Abschnittsstruktur mit Ueberschriften.
4) Keine Referenz auf Bilder notwendig; Text muss alleine verstaendlich sein.

Gib nur den finalen Endtext zurueck.
";

pub const HANDWRITING_PROMPT: &str = "\
Du bekommst OCR-Text aus Handschrift.
Erzeuge einen finalen, vektorisierungsbereiten Endtext in Deutsch.

Anforderungen:
1) OCR-Rauschen entfernen und offensichtliche Fehler normalisieren.
2) Inhalt in saubere, vollstaendige Saetze ueberfuehren.
3) Bei unklaren Stellen vorsichtig formulieren (\"unklar\"/\"vermutlich\"), nichts erfinden.
4) Klare Abschnittsstruktur.

Gib nur den finalen Endtext zurueck.
";

/// Marker line in unit notes naming the document a unit came from.
pub const SOURCE_FILE_MARKER: &str = "source_file=";

const UNKNOWN_DOCUMENT: &str = "unbekanntes_dokument";

/// Kind of source text, selecting the rewrite prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostProcessType {
    #[default]
    Powerpoint,
    Handwriting,
}

impl PostProcessType {
    pub fn as_str(self) -> &'static str {
        match self {
            PostProcessType::Powerpoint => "powerpoint",
            PostProcessType::Handwriting => "handwriting",
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            PostProcessType::Powerpoint => POWERPOINT_PROMPT,
            PostProcessType::Handwriting => HANDWRITING_PROMPT,
        }
    }
}

impl fmt::Display for PostProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostProcessType {
    type Err = DeckbenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "powerpoint" => Ok(PostProcessType::Powerpoint),
            "handwriting" => Ok(PostProcessType::Handwriting),
            other => Err(DeckbenchError::configuration(format!(
                "Unknown post-process type '{}' (expected powerpoint or handwriting)",
                other
            ))),
        }
    }
}

/// Rewrite `text` for a vector database. Blank text returns an empty string without a call.
pub async fn transform_text_for_vector_db(llm: &dyn TextLlm, text: &str, kind: PostProcessType) -> Result<String> {
    let input = text.trim();
    if input.is_empty() {
        return Ok(String::new());
    }

    let user_prompt = format!("{}\n\nQuelltext:\n{}", kind.prompt(), input);
    llm.complete(SYSTEM_PROMPT, &user_prompt).await
}

/// Fill `vector_ready_text` on every unit.
pub async fn post_process_units(llm: &dyn TextLlm, units: &mut [ExtractedUnit], kind: PostProcessType) -> Result<()> {
    for unit in units.iter_mut() {
        tracing::debug!("Post-processing unit {} ({})", unit.slide_number, kind);
        unit.vector_ready_text = Some(transform_text_for_vector_db(llm, &unit.content, kind).await?);
    }
    Ok(())
}

/// Value of the `source_file=` line in `notes`, if any.
pub fn source_file(notes: Option<&str>) -> Option<&str> {
    notes?
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(SOURCE_FILE_MARKER))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Sibling path `<stem>_vector_ready.md` of an output file.
pub fn vector_ready_path(output: &Path) -> PathBuf {
    let base = if output.extension().is_some() {
        output.file_stem()
    } else {
        output.file_name()
    };
    let name = format!("{}_vector_ready.md", base.map(|s| s.to_string_lossy()).unwrap_or_default());
    output.with_file_name(name)
}

/// Markdown of every unit's vector-ready text, grouped by source document.
///
/// Units fall back to their raw content when they were not post-processed.
pub fn vector_ready_markdown(units: &[ExtractedUnit]) -> String {
    let mut grouped: IndexMap<String, Vec<&ExtractedUnit>> = IndexMap::new();
    for unit in units {
        let source = source_file(unit.notes.as_deref())
            .map(|s| {
                Path::new(s)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| s.to_string())
            })
            .unwrap_or_else(|| UNKNOWN_DOCUMENT.to_string());
        grouped.entry(source).or_default().push(unit);
    }

    let mut lines = vec!["# Vector-Ready Gesamttext".to_string(), String::new()];
    for (source, source_units) in &grouped {
        lines.push(format!("## Dokument: {}", source));
        lines.push(String::new());
        for unit in source_units {
            match unit.title.as_deref() {
                Some(title) => lines.push(format!("### {}", title)),
                None => lines.push(format!("### Slide {}", unit.slide_number)),
            }
            lines.push(String::new());

            let text = unit.vector_ready_text.as_deref().unwrap_or(&unit.content).trim();
            lines.push(if text.is_empty() { "_(kein Text)_".to_string() } else { text.to_string() });
            lines.push(String::new());
        }
    }

    format!("{}\n", lines.join("\n").trim())
}

/// Write [`vector_ready_markdown`] next to `output` and return its path.
pub async fn write_vector_ready_markdown(units: &[ExtractedUnit], output: &Path) -> Result<PathBuf> {
    let path = vector_ready_path(output);
    tokio::fs::write(&path, vector_ready_markdown(units)).await?;
    tracing::info!("Wrote vector-ready Markdown to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct UpperLlm {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl TextLlm for UpperLlm {
        async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
            self.calls.lock().push((system_prompt.to_string(), user_prompt.to_string()));
            let source = user_prompt.rsplit("Quelltext:\n").next().unwrap_or_default();
            Ok(source.to_uppercase())
        }
    }

    fn unit(n: u32, content: &str) -> ExtractedUnit {
        ExtractedUnit::new(n, content, "vision-openai/gpt-5.2", Duration::ZERO)
    }

    #[tokio::test]
    async fn test_blank_text_skips_call() {
        let llm = UpperLlm::default();
        let text = transform_text_for_vector_db(&llm, "  \n ", PostProcessType::Handwriting)
            .await
            .unwrap();
        assert_eq!(text, "");
        assert!(llm.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_selection() {
        let llm = UpperLlm::default();
        let text = transform_text_for_vector_db(&llm, " notiz ", PostProcessType::Handwriting)
            .await
            .unwrap();
        assert_eq!(text, "NOTIZ");

        let calls = llm.calls.lock();
        assert_eq!(calls[0].0, SYSTEM_PROMPT);
        assert!(calls[0].1.starts_with("Du bekommst OCR-Text aus Handschrift."));
        assert!(calls[0].1.ends_with("\n\nQuelltext:\nnotiz"));
    }

    #[tokio::test]
    async fn test_post_process_units_fills_every_unit() {
        let llm = UpperLlm::default();
        let mut units = vec![unit(1, "eins"), unit(2, "")];
        post_process_units(&llm, &mut units, PostProcessType::Powerpoint)
            .await
            .unwrap();
        assert_eq!(units[0].vector_ready_text.as_deref(), Some("EINS"));
        assert_eq!(units[1].vector_ready_text.as_deref(), Some(""));
        assert_eq!(llm.calls.lock().len(), 1);
    }

    #[test]
    fn test_source_file_marker() {
        assert_eq!(source_file(Some("x\n  source_file= /a/deck.pptx \n")), Some("/a/deck.pptx"));
        assert_eq!(source_file(Some("nichts")), None);
        assert_eq!(source_file(None), None);
    }

    #[test]
    fn test_vector_ready_path() {
        assert_eq!(vector_ready_path(Path::new("out/ppts.json")), PathBuf::from("out/ppts_vector_ready.md"));
        assert_eq!(vector_ready_path(Path::new("out/ppts")), PathBuf::from("out/ppts_vector_ready.md"));
    }

    #[test]
    fn test_markdown_groups_by_source() {
        let mut a = unit(1, "roh").with_title("Agenda").with_notes("source_file=/in/a.pptx");
        a.vector_ready_text = Some("Fertig".into());
        let b = unit(1, "").with_notes("source_file=/in/b.pdf");
        let c = unit(2, "Zweite").with_notes("source_file=/in/a.pptx");
        let d = unit(3, "ohne Quelle");

        let md = vector_ready_markdown(&[a, b, c, d]);
        assert_eq!(
            md,
            "# Vector-Ready Gesamttext\n\n\
             ## Dokument: a.pptx\n\n### Agenda\n\nFertig\n\n### Slide 2\n\nZweite\n\n\
             ## Dokument: b.pdf\n\n### Slide 1\n\n_(kein Text)_\n\n\
             ## Dokument: unbekanntes_dokument\n\n### Slide 3\n\nohne Quelle\n"
        );
    }

    #[tokio::test]
    async fn test_write_vector_ready_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_vector_ready_markdown(&[unit(1, "x")], &dir.path().join("out.json"))
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("out_vector_ready.md"));
        assert!(std::fs::read_to_string(path).unwrap().contains("### Slide 1"));
    }
}
