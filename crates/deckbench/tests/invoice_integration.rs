//! Invoice property extraction and ground-truth scoring through the public API.

use async_trait::async_trait;
use deckbench::invoice::scoring::lookup_truth;
use deckbench::invoice::{extract_heuristic, extract_with_llm, load_ground_truth, score};
use deckbench::llm::TextLlm;
use deckbench::{DeckbenchError, InvoiceProperties, PROPERTY_KEYS, Result};
use parking_lot::Mutex;
use std::path::Path;

const OCR_TEXT: &str = "ACME Bürobedarf GmbH
Rechnungsnummer: INV-2024-001
Rechnungsdatum: 15.03.2024
Gesamtbetrag: 129,69 €
";

struct CannedLlm {
    answer: String,
    prompts: Mutex<Vec<String>>,
}

impl CannedLlm {
    fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TextLlm for CannedLlm {
    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.prompts.lock().push(user_prompt.to_string());
        Ok(self.answer.clone())
    }
}

#[test]
fn test_single_invoice_number_line() {
    let props = extract_heuristic("Rechnungsnummer: INV-2024-001");

    assert_eq!(props.text("Belegnummer"), "INV-2024-001");
    assert_eq!(props.iter().count(), PROPERTY_KEYS.len());
    assert!(props.text("Belegdatum").is_empty());
    assert!(props.list("Positionen").is_empty());
}

#[test]
fn test_heuristic_output_keeps_schema_order() {
    let props = extract_heuristic(OCR_TEXT);
    let json = serde_json::to_value(&props).unwrap();
    let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();

    assert_eq!(keys, PROPERTY_KEYS);
    assert_eq!(json["Positionen"], serde_json::json!([]));
    assert_eq!(props.text("Gesamt Betrag"), "129,69");
    assert_eq!(props.text("Betrag (Brutto)"), "129,69");
    assert_eq!(props.text("Währung"), "EUR");
}

#[tokio::test]
async fn test_scoring_against_ground_truth_file() {
    let dir = tempfile::tempdir().unwrap();
    let truth_path = dir.path().join("truth.json");
    std::fs::write(
        &truth_path,
        r#"{
            "rechnung_01.pdf": {
                "Belegnummer": "inv-2024-001",
                "Belegdatum": "15.03.2024",
                "Lieferant": "Andere GmbH",
                "Bemerkung": "wird ignoriert"
            },
            "rechnung_02.pdf": {}
        }"#,
    )
    .unwrap();

    let truth = load_ground_truth(&truth_path).await.unwrap();
    let props = extract_heuristic(OCR_TEXT);

    let expected = lookup_truth(&truth, Path::new("/scans/rechnungen/rechnung_01.pdf")).unwrap();
    let result = score(&props, expected);

    assert_eq!(result.evaluated_fields, 3);
    assert_eq!(result.exact_matches, 2);
    let keys: Vec<&str> = result.per_key.keys().map(String::as_str).collect();
    assert_eq!(keys, ["Belegnummer", "Belegdatum", "Lieferant"]);
    assert!(!result.per_key["Lieferant"].exact_match);
    assert_eq!(result.per_key["Lieferant"].pred, "ACME Bürobedarf GmbH");

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["exact_match_rate"], serde_json::json!(0.6667));

    assert!(lookup_truth(&truth, Path::new("rechnung_02.pdf")).is_none());
    assert!(lookup_truth(&truth, Path::new("rechnung_03.pdf")).is_none());
}

#[tokio::test]
async fn test_missing_ground_truth_file() {
    let err = load_ground_truth(Path::new("/nonexistent/truth.json")).await.unwrap_err();
    assert!(matches!(err, DeckbenchError::NotFound { .. }));
}

#[tokio::test]
async fn test_llm_answer_is_coerced_onto_schema() {
    let llm = CannedLlm::new(
        "Hier die Daten:\n```json\n{\"Belegnummer\": \"INV-2024-001\", \"Positionen\": \"Toner\", \"Gesamt Betrag\": 129.69, \"Extra\": 1}\n```",
    );

    let props = extract_with_llm(&llm, OCR_TEXT).await.unwrap();

    assert_eq!(props.text("Belegnummer"), "INV-2024-001");
    assert_eq!(props.list("Positionen"), ["Toner"]);
    assert_eq!(props.text("Gesamt Betrag"), "129.69");
    assert_eq!(props.filled_count(), 3);
    assert!(props.get("Extra").is_none());
    assert!(llm.prompts.lock()[0].contains("INV-2024-001"));
}

#[tokio::test]
async fn test_llm_non_object_answer_is_malformed() {
    let llm = CannedLlm::new("[1, 2, 3]");
    let err = extract_with_llm(&llm, OCR_TEXT).await.unwrap_err();
    assert!(matches!(err, DeckbenchError::MalformedResponse { .. }));
}

#[test]
fn test_properties_deserialize_from_partial_json() {
    let props: InvoiceProperties = serde_json::from_str(r#"{"Belegnummer": "R-7", "Tags": ["a", " ", "b"]}"#).unwrap();
    assert_eq!(props.text("Belegnummer"), "R-7");
    assert_eq!(props.list("Tags"), ["a", "b"]);
    assert_eq!(props.filled_count(), 2);
}
