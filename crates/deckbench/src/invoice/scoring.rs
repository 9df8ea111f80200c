//! Exact-match scoring of extracted properties against ground truth.

use super::{InvoiceProperties, PROPERTY_KEYS, normalize_json_value};
use crate::error::{DeckbenchError, Result};
use crate::types::round_to;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::path::Path;

/// Ground truth per invoice, keyed by file name or full path.
pub type GroundTruth = IndexMap<String, Map<String, Value>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldScore {
    pub pred: String,
    pub truth: String,
    pub exact_match: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthScore {
    pub evaluated_fields: usize,
    pub exact_matches: usize,
    /// `None` when no property key occurs in the truth mapping.
    #[serde(serialize_with = "serialize_rate")]
    pub exact_match_rate: Option<f64>,
    pub per_key: IndexMap<String, FieldScore>,
}

fn serialize_rate<S: Serializer>(rate: &Option<f64>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match rate {
        Some(value) => serializer.serialize_f64(round_to(*value, 4)),
        None => serializer.serialize_none(),
    }
}

/// Compare `pred` with `truth` key by key.
///
/// Only keys of the fixed schema that occur in `truth` are evaluated. A field
/// matches when the prediction is non-empty and equals the truth ignoring case,
/// both in normalized form.
pub fn score(pred: &InvoiceProperties, truth: &Map<String, Value>) -> GroundTruthScore {
    let mut per_key = IndexMap::new();
    let mut exact_matches = 0;

    for key in PROPERTY_KEYS {
        let Some(expected) = truth.get(key) else {
            continue;
        };
        let p = pred.normalized(key);
        let t = normalize_json_value(expected);
        let exact_match = !p.is_empty() && p.to_lowercase() == t.to_lowercase();
        if exact_match {
            exact_matches += 1;
        }
        per_key.insert(
            key.to_string(),
            FieldScore {
                pred: p,
                truth: t,
                exact_match,
            },
        );
    }

    let evaluated_fields = per_key.len();
    GroundTruthScore {
        evaluated_fields,
        exact_matches,
        exact_match_rate: (evaluated_fields > 0).then(|| exact_matches as f64 / evaluated_fields as f64),
        per_key,
    }
}

/// Look up the truth for an invoice: by file name first, then by full path.
///
/// Empty truth mappings count as absent.
pub fn lookup_truth<'a>(truth: &'a GroundTruth, invoice: &Path) -> Option<&'a Map<String, Value>> {
    let by_name = invoice
        .file_name()
        .and_then(|name| truth.get(name.to_string_lossy().as_ref()))
        .filter(|map| !map.is_empty());
    by_name.or_else(|| {
        truth
            .get(invoice.to_string_lossy().as_ref())
            .filter(|map| !map.is_empty())
    })
}

/// Read a ground-truth JSON file.
///
/// # Errors
///
/// `NotFound` when the file is missing, `Serialization` when it is not an
/// object of objects.
pub async fn load_ground_truth(path: &Path) -> Result<GroundTruth> {
    if !tokio::fs::try_exists(path).await? {
        return Err(DeckbenchError::not_found("ground truth", path));
    }
    let raw = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&raw).map_err(|e| {
        DeckbenchError::serialization_with_source(format!("Invalid ground truth file {}", path.display()), e)
    })
}
