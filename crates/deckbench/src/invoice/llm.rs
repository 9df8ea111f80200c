//! LLM-backed invoice property extraction.
//!
//! The model is asked for strict JSON against the fixed schema. Its answer goes
//! through a small parser pipeline (strip code fence, parse, fall back to the
//! outermost `{...}` span) before being coerced onto [`InvoiceProperties`].

use super::InvoiceProperties;
use crate::error::{DeckbenchError, Result};
use crate::llm::TextLlm;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

pub const SYSTEM_PROMPT: &str = "\
Du extrahierst strukturierte Rechnungsdaten aus OCR-Text.
Gib IMMER ein gueltiges JSON-Objekt mit exakt den vorgegebenen Keys zurueck.
Keine Erklaerungen, keine Markdown-Formatierung.
Wenn ein Feld unbekannt ist: leerer String.
Fuer \"Tags\" und \"Positionen\": leere Liste [] falls nichts vorhanden.
";

static FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^```(?:json)?\s*").expect("Code fence regex pattern is valid and should compile"));
static FENCE_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*```$").expect("Code fence regex pattern is valid and should compile"));

/// Outcome of reading JSON out of a model answer.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonBlock {
    /// Blank answer.
    Empty,
    Object(Map<String, Value>),
    /// Valid JSON that is not an object.
    NotAnObject(Value),
    /// No parseable JSON at all.
    Unparseable(String),
}

/// The empty schema, pretty-printed with two-space indentation.
pub fn schema_json() -> String {
    serde_json::to_string_pretty(&InvoiceProperties::new()).unwrap_or_default()
}

pub fn user_prompt(text: &str) -> String {
    format!(
        "Extrahiere die Rechnungsdaten aus folgendem OCR-Text.\n\
         Rueckgabeformat: Nur JSON mit exakt dieser Struktur:\n\
         {}\n\n\
         OCR-Text:\n\
         {}",
        schema_json(),
        text
    )
}

fn strip_fence(raw: &str) -> String {
    if !raw.starts_with("```") {
        return raw.to_string();
    }
    let opened = FENCE_OPEN.replace(raw, "");
    FENCE_CLOSE.replace(&opened, "").into_owned()
}

fn classify(value: Value) -> JsonBlock {
    match value {
        Value::Object(map) => JsonBlock::Object(map),
        other => JsonBlock::NotAnObject(other),
    }
}

/// Find JSON in a model answer.
pub fn extract_json_block(raw: &str) -> JsonBlock {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return JsonBlock::Empty;
    }

    let body = strip_fence(trimmed);
    let first_error = match serde_json::from_str::<Value>(&body) {
        Ok(value) => return classify(value),
        Err(e) => e.to_string(),
    };

    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if end > start => match serde_json::from_str::<Value>(&body[start..=end]) {
            Ok(value) => classify(value),
            Err(e) => JsonBlock::Unparseable(e.to_string()),
        },
        _ => JsonBlock::Unparseable(first_error),
    }
}

/// Turn a parsed answer into properties.
///
/// # Errors
///
/// `MalformedResponse` if the answer held no JSON or JSON that is not an object.
pub fn properties_from_answer(raw: &str) -> Result<InvoiceProperties> {
    match extract_json_block(raw) {
        JsonBlock::Empty => Ok(InvoiceProperties::new()),
        JsonBlock::Object(map) => Ok(InvoiceProperties::coerce(&map)),
        JsonBlock::NotAnObject(value) => Err(DeckbenchError::malformed_response(format!(
            "Invoice properties answer is JSON but not an object: {}",
            value
        ))),
        JsonBlock::Unparseable(reason) => Err(DeckbenchError::malformed_response(format!(
            "Invoice properties answer is not JSON: {}",
            reason
        ))),
    }
}

/// Extract invoice properties from OCR text with a text LLM.
///
/// Blank text yields the empty defaults without calling the model.
pub async fn extract_with_llm(llm: &dyn TextLlm, ocr_text: &str) -> Result<InvoiceProperties> {
    let text = ocr_text.trim();
    if text.is_empty() {
        return Ok(InvoiceProperties::new());
    }

    let raw = llm.complete(SYSTEM_PROMPT, &user_prompt(text)).await?;
    properties_from_answer(&raw)
}
