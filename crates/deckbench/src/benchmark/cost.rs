//! Estimated per-unit cost of each method.

/// USD per unit, keyed by a model or backend identifier. Local backends are free.
pub const COST_TABLE: [(&str, f64); 8] = [
    ("deepseek-ocr2", 0.0),
    ("glm-ocr", 0.0),
    ("easyocr", 0.0),
    ("direct", 0.0),
    ("claude-opus-4-5-20251101", 0.012),
    ("claude-haiku-4-5-20251001", 0.003),
    ("gpt-5.2", 0.015),
    ("gpt-4o-mini", 0.003),
];

/// Method tags of local backends. They embed the model name they run, which
/// may collide with a priced cloud key.
const LOCAL_PREFIXES: [&str; 4] = ["deepseek-ocr2", "glm-ocr", "easyocr", "direct"];

/// Per-unit cost for a method tag.
///
/// Tags starting with a local backend prefix are free. An exact key match
/// wins next. Otherwise the longest key contained in `method`
/// is used, so `vision-anthropic/claude-opus-4-5-20251101` resolves to the
/// Opus rate. Unknown methods cost nothing.
pub fn per_unit_cost(method: &str) -> f64 {
    if LOCAL_PREFIXES.iter().any(|prefix| method.starts_with(prefix)) {
        return 0.0;
    }

    if let Some((_, cost)) = COST_TABLE.iter().find(|(key, _)| *key == method) {
        return *cost;
    }

    COST_TABLE
        .iter()
        .filter(|(key, _)| method.contains(key))
        .max_by_key(|(key, _)| key.len())
        .map(|(_, cost)| *cost)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert_eq!(per_unit_cost("gpt-5.2"), 0.015);
        assert_eq!(per_unit_cost("direct"), 0.0);
    }

    #[test]
    fn test_contained_key() {
        assert_eq!(per_unit_cost("vision-anthropic/claude-opus-4-5-20251101"), 0.012);
        assert_eq!(per_unit_cost("vision-openai/gpt-4o-mini"), 0.003);
        assert_eq!(per_unit_cost("deepseek-ocr2/vllm/structured"), 0.0);
        assert_eq!(per_unit_cost("easyocr-local"), 0.0);
    }

    #[test]
    fn test_unknown_method_is_free() {
        assert_eq!(per_unit_cost("vision-openai/some-future-model"), 0.0);
        assert_eq!(per_unit_cost(""), 0.0);
    }

    #[test]
    fn test_local_tag_naming_a_cloud_model_is_free() {
        assert_eq!(per_unit_cost("glm-ocr/gpt-4o-mini/structured"), 0.0);
        assert_eq!(per_unit_cost("deepseek-ocr2/claude-opus-4-5-20251101"), 0.0);
        assert_eq!(per_unit_cost("vision-openai/gpt-4o-mini"), 0.003);
    }
}
