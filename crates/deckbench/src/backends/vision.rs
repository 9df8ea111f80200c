//! Cloud vision-LLM extraction (Anthropic or OpenAI).
//!
//! Each page image is sent with a German analysis prompt; the answer is kept
//! as Markdown. Suited to flowcharts, diagrams and dense layouts.

use super::{ExtractOptions, ExtractionBackend, Source, collect_pages};
use crate::core::config::{LlmConfig, VisionConfig};
use crate::error::{DeckbenchError, Result};
use crate::llm::LlmClient;
use crate::types::ExtractedUnit;
use crate::utils::encode_image_file;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

pub const SYSTEM_PROMPT: &str = "\
Du bist ein Experte für Dokumentenanalyse. Deine Aufgabe ist es, den Inhalt \
eines Präsentations-Slides vollständig und strukturiert zu erfassen — so, dass \
der extrahierte Text später für semantische Suche (Retrieval-Augmented Generation) \
verwendet werden kann.

Regeln:
1. Erfasse ALLEN sichtbaren Text, auch in Diagrammen, Flowcharts, Tabellen und Bildern.
2. Beschreibe die STRUKTUR: Welche Elemente gehören zusammen? Was sind Phasen, \
Übergänge, Bedingungen, Hierarchien?
3. Beschreibe VISUELLE BEZIEHUNGEN: Pfeile, Farbkodierungen, Gruppierungen, \
räumliche Anordnung — in Textform.
4. Verwende Markdown für Struktur (Überschriften, Listen, Tabellen).
5. Der Output muss eigenständig verständlich sein, ohne das Originalbild zu sehen.
6. Sprache: Deutsch, es sei denn der Slide ist auf Englisch.
";

pub const SLIDE_PROMPT: &str = "\
Analysiere diesen Präsentations-Slide vollständig.

Gib zurück:
1. **Titel** des Slides
2. **Inhaltstyp** (Text, Flowchart, Tabelle, Diagramm, Mixed)
3. **Vollständige Inhaltsbeschreibung** — alle Texte, Beziehungen, Prozessschritte
4. **Zusammenfassung** in 1-2 Sätzen (für die Vektorisierung)

Format: Markdown
";

pub const INVOICE_PROMPT: &str = "\
Analysiere diese Rechnung/dieses Dokument vollständig.

Extrahiere:
1. **Dokumenttyp** (Rechnung, Angebot, Lieferschein, etc.)
2. **Absender** (Name, Adresse, Steuernummer/USt-ID)
3. **Empfänger** (Name, Adresse)
4. **Rechnungsdaten** (Nummer, Datum, Fälligkeitsdatum)
5. **Positionen** als Markdown-Tabelle (Beschreibung, Menge, Einzelpreis, Gesamtpreis)
6. **Summen** (Netto, USt, Brutto)
7. **Zahlungsinformationen** (IBAN, BIC, Verwendungszweck)
8. **Sonstige relevante Informationen**

Format: Strukturiertes Markdown
";

/// Which user prompt accompanies the image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisionPrompt {
    #[default]
    Slide,
    Invoice,
}

impl VisionPrompt {
    pub fn as_str(self) -> &'static str {
        match self {
            VisionPrompt::Slide => "slide",
            VisionPrompt::Invoice => "invoice",
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            VisionPrompt::Slide => SLIDE_PROMPT,
            VisionPrompt::Invoice => INVOICE_PROMPT,
        }
    }
}

impl fmt::Display for VisionPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisionPrompt {
    type Err = DeckbenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "slide" => Ok(VisionPrompt::Slide),
            "invoice" => Ok(VisionPrompt::Invoice),
            other => Err(DeckbenchError::configuration(format!(
                "Unknown vision prompt mode '{}' (expected slide or invoice)",
                other
            ))),
        }
    }
}

/// Title from a Markdown answer: the first `# ` heading, or the value of a
/// `**Titel**: ...` line, whichever comes first.
pub fn title_from_markdown(text: &str) -> Option<String> {
    for line in text.trim().lines() {
        let line = line.trim();
        if let Some(heading) = line.strip_prefix("# ") {
            return Some(heading.trim().to_string());
        }
        if line.starts_with("**Titel") {
            return line
                .split_once(':')
                .map(|(_, value)| value.trim().trim_matches('*').trim().to_string())
                .filter(|t| !t.is_empty());
        }
    }
    None
}

#[derive(Debug, Clone)]
pub struct VisionBackend {
    client: LlmClient,
    prompt: VisionPrompt,
}

impl VisionBackend {
    pub fn new(client: LlmClient, prompt: VisionPrompt) -> Self {
        Self { client, prompt }
    }

    /// Build from configuration, reading the provider's key from the environment.
    ///
    /// # Errors
    ///
    /// `Configuration` if the API key is missing.
    pub fn from_config(vision: &VisionConfig, llm: &LlmConfig) -> Result<Self> {
        let client = LlmClient::for_provider(vision.provider, vision.model.clone(), llm)?;
        Ok(Self::new(client, vision.prompt_mode))
    }

    pub fn with_prompt(mut self, prompt: VisionPrompt) -> Self {
        self.prompt = prompt;
        self
    }
}

#[async_trait]
impl ExtractionBackend for VisionBackend {
    fn name(&self) -> &'static str {
        "vision"
    }

    fn method_tag(&self) -> String {
        format!("vision-{}/{}", self.client.provider(), self.client.model())
    }

    fn requires_gpu(&self) -> bool {
        false
    }

    fn notes(&self) -> String {
        format!("Cloud-Vision-LLM, Modus: {}", self.prompt)
    }

    async fn extract(&self, source: &Source, options: &ExtractOptions) -> Result<Vec<ExtractedUnit>> {
        let pages = collect_pages(source, options).await?;
        let tag = self.method_tag();
        let mut units = Vec::with_capacity(pages.len());

        for page in pages.pages() {
            tracing::debug!("Vision-LLM page {} ({})", page.number, tag);

            let start = Instant::now();
            let image = encode_image_file(&page.path).await?;
            let text = self
                .client
                .describe_image(SYSTEM_PROMPT, &image, self.prompt.prompt())
                .await?;
            let elapsed = start.elapsed();

            let title = page.title.clone().or_else(|| title_from_markdown(&text));
            let unit = ExtractedUnit::new(page.number, text, tag.clone(), elapsed).with_title(title.unwrap_or_default());

            tracing::debug!("  {} chars, {:.2}s", unit.char_count(), unit.elapsed_seconds);
            units.push(unit);
        }

        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Provider;

    #[test]
    fn test_title_from_heading() {
        let text = "\n# Behandlungsablauf\n\nInhalt";
        assert_eq!(title_from_markdown(text).as_deref(), Some("Behandlungsablauf"));
    }

    #[test]
    fn test_title_from_bold_label() {
        assert_eq!(
            title_from_markdown("**Titel**: Quartalszahlen Q3").as_deref(),
            Some("Quartalszahlen Q3")
        );
        assert_eq!(
            title_from_markdown("**Titel des Slides:** Agenda**").as_deref(),
            Some("Agenda")
        );
    }

    #[test]
    fn test_title_absent() {
        assert_eq!(title_from_markdown("Nur Fließtext\nohne Titel"), None);
        assert_eq!(title_from_markdown("**Titel** ohne Doppelpunkt\n# Später"), None);
    }

    #[test]
    fn test_prompt_mode_parse() {
        assert_eq!("invoice".parse::<VisionPrompt>().unwrap(), VisionPrompt::Invoice);
        assert!("poster".parse::<VisionPrompt>().is_err());
        assert_eq!(VisionPrompt::default().prompt(), SLIDE_PROMPT);
    }

    #[test]
    fn test_method_tag_names_provider_and_model() {
        let client = LlmClient::new(Provider::Anthropic, None, 4096, "http://localhost", "k");
        let backend = VisionBackend::new(client, VisionPrompt::Slide);
        assert_eq!(backend.method_tag(), "vision-anthropic/claude-opus-4-5-20251101");
        assert!(!backend.requires_gpu());
    }
}
