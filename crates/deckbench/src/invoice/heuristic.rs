//! Regex-based invoice field extraction.
//!
//! Best effort and not authoritative: each scalar field has an ordered list of
//! labelled patterns (label synonyms, optional separator, then a value pattern
//! for the field's type) and the first match wins. Fields that match nothing
//! stay empty. The patterns are a reference baseline without a measured
//! precision or recall target.

use super::{InvoiceProperties, collapse_whitespace};
use once_cell::sync::Lazy;
use regex::Regex;

const DATE: &str = r"(\d{1,2}[./-]\d{1,2}[./-]\d{2,4})";
const MONEY: &str = r"(\d{1,3}(?:[.,']\d{3})+[.,]\d{2}|\d+[.,]\d{2})";
const IDENT: &str = r"([A-Z0-9](?:[A-Z0-9/_.-]*[A-Z0-9])?)";
const CURRENCY_PREFIX: &str = r"\s*(?:\(?(?:eur|€)\)?)?\s*:?\s*(?:eur|€)?\s*";
const VAT_LABEL: &str = r"(?:mwst|ust|umsatzsteuer|mehrwertsteuer|vat)";

const MAX_SUPPLIER_CHARS: usize = 160;
const MAX_DESCRIPTION_LINES: usize = 4;
const MAX_LINE_ITEMS: usize = 10;

struct FieldRule {
    key: &'static str,
    patterns: Vec<Regex>,
    normalize: fn(&str) -> String,
}

impl FieldRule {
    fn new(key: &'static str, patterns: &[String], normalize: fn(&str) -> String) -> Self {
        Self {
            key,
            patterns: patterns
                .iter()
                .map(|p| Regex::new(p).expect("Invoice field regex pattern is valid and should compile"))
                .collect(),
            normalize,
        }
    }

    fn find(&self, text: &str) -> Option<String> {
        self.patterns
            .iter()
            .find_map(|re| re.captures(text).and_then(|c| c.get(1)))
            .map(|m| (self.normalize)(m.as_str()))
            .filter(|v| !v.is_empty())
    }
}

fn keep(value: &str) -> String {
    collapse_whitespace(value)
}

fn percent(value: &str) -> String {
    format!("{}%", value.trim())
}

fn currency_code(value: &str) -> String {
    match value.trim() {
        "€" => "EUR".to_string(),
        "$" => "USD".to_string(),
        "£" => "GBP".to_string(),
        other => other.to_uppercase(),
    }
}

static GROSS_RULE: Lazy<FieldRule> = Lazy::new(|| {
    FieldRule::new(
        "Gesamt Betrag",
        &[format!(
            r"(?i)\b(?:gesamtbetrag|rechnungsbetrag|bruttobetrag|endbetrag|gesamtsumme|zu\s*zahlen(?:der\s*betrag)?|brutto|total(?:\s*amount)?|amount\s*due){}{}",
            CURRENCY_PREFIX, MONEY
        )],
        keep,
    )
});

static VAT_AMOUNT_RULE: Lazy<FieldRule> = Lazy::new(|| {
    FieldRule::new(
        "Gesamt Umsatzsteuer",
        &[format!(
            r"(?i)\b{}\.?(?:[\s-]*betrag)?\s*(?:\d{{1,2}}(?:[.,]\d+)?\s*%)?{}{}",
            VAT_LABEL, CURRENCY_PREFIX, MONEY
        )],
        keep,
    )
});

static VAT_RATE_RULE: Lazy<FieldRule> = Lazy::new(|| {
    FieldRule::new(
        "Umsatzsteuer",
        &[
            format!(r"(?i)(\d{{1,2}}(?:[.,]\d{{1,2}})?)\s*%\s*{}\b", VAT_LABEL),
            format!(r"(?i)\b{}\.?\s*:?\s*(\d{{1,2}}(?:[.,]\d{{1,2}})?)\s*%", VAT_LABEL),
        ],
        percent,
    )
});

/// Scalar rules evaluated independently, in output order.
static FIELD_RULES: Lazy<Vec<FieldRule>> = Lazy::new(|| {
    vec![
        FieldRule::new(
            "Belegnummer",
            &[format!(
                r"(?i)\b(?:rechnungs?[\s-]?(?:nummer|nr\.?)|beleg[\s-]?(?:nummer|nr\.?)|invoice\s*(?:no\.?|number|nr\.?|#))\s*[:#]?\s*{}",
                IDENT
            )],
            keep,
        ),
        FieldRule::new(
            "Belegdatum",
            &[format!(
                r"(?i)\b(?:rechnungsdatum|belegdatum|invoice\s*date|datum|date)\s*:?\s*{}",
                DATE
            )],
            keep,
        ),
        FieldRule::new(
            "Lieferdatum",
            &[format!(
                r"(?i)\b(?:lieferdatum|liefertermin|leistungsdatum|delivery\s*date)\s*:?\s*{}",
                DATE
            )],
            keep,
        ),
        FieldRule::new(
            "Verknüpfung",
            &[format!(
                r"(?i)\b(?:bestell(?:nummer|[\s-]?nr\.?)|auftrags?(?:nummer|[\s-]?nr\.?)|order\s*(?:no\.?|number))\s*[:#]?\s*{}",
                IDENT
            )],
            keep,
        ),
        FieldRule::new(
            "Fälligkeit",
            &[format!(
                r"(?i)\b(?:fällig(?:keitsdatum|keit)?(?:\s*am)?|zahlbar\s*bis|due\s*date)\s*:?\s*{}",
                DATE
            )],
            keep,
        ),
        FieldRule::new(
            "Kostenstelle",
            &[r"(?i)\b(?:kostenstelle|cost\s*cent(?:er|re))\s*:?\s*([^\n]+)".to_string()],
            keep,
        ),
        FieldRule::new(
            "Kategorie",
            &[r"(?i)\b(?:kategorie|category)\s*:?\s*([^\n]+)".to_string()],
            keep,
        ),
        FieldRule::new(
            "Währung",
            &[r"(?i)(€|\$|£|\bEUR\b|\bUSD\b|\bCHF\b|\bGBP\b)".to_string()],
            currency_code,
        ),
        FieldRule::new(
            "Gesamt Netto",
            &[format!(
                r"(?i)\b(?:nettobetrag|gesamt\s*netto|summe\s*netto|netto(?:summe)?|zwischensumme|subtotal|net\s*(?:total|amount)){}{}",
                CURRENCY_PREFIX, MONEY
            )],
            keep,
        ),
    ]
});

static SUMMARY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(summe|gesamt|total|netto|brutto|mwst|\bust\b|umsatzsteuer|mehrwertsteuer|betrag|zu\s+zahlen)")
        .expect("Summary line regex pattern is valid and should compile")
});

static LINE_ITEM_PATTERNS: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r"(?i)^\d+(?:[.,]\d+)?\s*(?:x|stk\.?|stück|st\.|pcs\.?)?\s+\S.*?\d[.,]\d{2}\b")
            .expect("Quantity-first line item regex pattern is valid and should compile"),
        Regex::new(r"(?i)\d[.,]\d{2}\b.*\s\d+(?:[.,]\d+)?\s*(?:x|stk\.?|stück|pcs\.?)(?:\s|$)")
            .expect("Price-first line item regex pattern is valid and should compile"),
    ]
});

fn normalized_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect()
}

fn is_line_item(line: &str) -> bool {
    !SUMMARY_LINE.is_match(line) && LINE_ITEM_PATTERNS.iter().any(|re| re.is_match(line))
}

/// Extract invoice properties from OCR text with the regex rules.
///
/// Never fails: unmatched fields keep their empty default.
pub fn extract_heuristic(text: &str) -> InvoiceProperties {
    let mut props = InvoiceProperties::new();
    let lines = normalized_lines(text);

    for rule in FIELD_RULES.iter() {
        if let Some(value) = rule.find(text) {
            props.set_text(rule.key, value);
        }
    }

    if let Some(gross) = GROSS_RULE.find(text) {
        props.set_text("Betrag (Brutto)", gross.clone());
        props.set_text(GROSS_RULE.key, gross);
    }

    let vat_amount = VAT_AMOUNT_RULE.find(text);
    let vat = VAT_RATE_RULE.find(text).or_else(|| vat_amount.clone());
    if let Some(vat) = vat {
        props.set_text(VAT_RATE_RULE.key, vat);
    }
    if let Some(amount) = vat_amount {
        props.set_text(VAT_AMOUNT_RULE.key, amount);
    }

    if let Some(first) = lines.first() {
        props.set_text("Lieferant", first.chars().take(MAX_SUPPLIER_CHARS).collect::<String>());
    }

    let description: Vec<&str> = lines
        .iter()
        .filter(|line| !SUMMARY_LINE.is_match(line))
        .take(MAX_DESCRIPTION_LINES)
        .map(String::as_str)
        .collect();
    props.set_text("Beschreibung", description.join(" "));

    let items: Vec<String> = lines
        .iter()
        .filter(|line| is_line_item(line))
        .take(MAX_LINE_ITEMS)
        .cloned()
        .collect();
    props.set_list("Positionen", items);

    props
}
