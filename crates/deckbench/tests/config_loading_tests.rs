//! Configuration loading integration tests.
//!
//! Covers the benchmark section end to end: file loading, environment
//! overrides and the options the benchmarks derive from it.

use deckbench::benchmark::PropertyExtractor;
use deckbench::{BackendKind, DeckbenchConfig, DeckbenchError, LocalBenchmark, LocalBenchmarkOptions};
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

const FULL_TOML: &str = r#"
[render]
dpi = 150

[glm]
base_url = "http://gpu-box:8000/v1"

[benchmark]
methods = ["glm", "easyocr"]
local_methods = ["easyocr"]
local_dpi = 300
local_quantize = false
property_extractor = "heuristic"
"#;

#[test]
fn test_benchmark_section_feeds_local_options() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("deckbench.toml");
    fs::write(&config_path, FULL_TOML).unwrap();

    let config = DeckbenchConfig::from_file(&config_path).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.benchmark.methods, ["glm", "easyocr"]);

    let options = LocalBenchmarkOptions::new("hw", "inv", &config);
    assert_eq!(options.methods, ["easyocr"]);
    assert_eq!(options.dpi, 300);
    assert!(!options.quantize);
    assert_eq!(options.extractor, PropertyExtractor::Heuristic);
    assert!(options.ground_truth.is_none());
}

#[test]
fn test_configured_methods_parse_as_backend_kinds() {
    let config = DeckbenchConfig::default();
    let kinds: Vec<BackendKind> = config
        .benchmark
        .methods
        .iter()
        .map(|m| m.parse().unwrap())
        .collect();
    assert_eq!(kinds, [BackendKind::DeepSeek, BackendKind::Glm]);
}

#[test]
fn test_env_overrides_file_values() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("deckbench.toml");
    fs::write(&config_path, FULL_TOML).unwrap();

    let mut config = DeckbenchConfig::from_file(&config_path).unwrap();
    config.apply_env_from(|key| match key {
        "GLM_OCR_BASE_URL" => Some("http://127.0.0.1:9000/v1".to_string()),
        "GLM_OCR_MODEL" => Some("   ".to_string()),
        _ => None,
    });

    assert_eq!(config.glm.base_url, "http://127.0.0.1:9000/v1");
    assert_eq!(config.glm.model, "glm-ocr");
    assert_eq!(config.glm.api_key, "EMPTY");
}

#[test]
fn test_zero_local_dpi_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("deckbench.yaml");
    fs::write(&config_path, "benchmark:\n  local_dpi: 0\n").unwrap();

    let config = DeckbenchConfig::from_file(&config_path).unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, DeckbenchError::Configuration { .. }));
    assert!(err.to_string().contains("local_dpi"));
}

#[test]
fn test_unknown_benchmark_method_in_file_is_a_parse_error_not_a_load_error() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("deckbench.json");
    fs::write(&config_path, r#"{"benchmark": {"methods": ["foo"]}}"#).unwrap();

    let config = DeckbenchConfig::from_file(&config_path).unwrap();
    assert!(config.benchmark.methods[0].parse::<BackendKind>().is_err());
}

#[tokio::test]
async fn test_local_benchmark_rejects_bad_methods_before_touching_folders() {
    let mut options = LocalBenchmarkOptions::new("/nonexistent/hw", "/nonexistent/inv", &DeckbenchConfig::default());
    options.methods = vec!["glm".to_string()];

    let bench = LocalBenchmark::new(DeckbenchConfig::default());
    let err = bench.run(&options).await.unwrap_err();
    assert!(matches!(err, DeckbenchError::Configuration { .. }));
    assert!(err.to_string().contains("glm"));
    assert_eq!(bench.models().loaded(), 0);
}

#[tokio::test]
async fn test_local_benchmark_missing_folder() {
    let options = LocalBenchmarkOptions::new("/nonexistent/hw", "/nonexistent/inv", &DeckbenchConfig::default());
    let err = LocalBenchmark::new(DeckbenchConfig::default())
        .run(&options)
        .await
        .unwrap_err();
    assert!(matches!(err, DeckbenchError::NotFound { .. }));
}

#[test]
#[serial]
fn test_discover_without_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let original_dir = std::env::current_dir().unwrap();
    std::env::set_current_dir(temp_dir.path()).unwrap();

    let result = std::panic::catch_unwind(|| {
        let discovered = DeckbenchConfig::discover().unwrap();
        assert!(discovered.is_none_or(|c| c.validate().is_ok()));
    });

    std::env::set_current_dir(&original_dir).unwrap();

    if let Err(e) = result {
        std::panic::resume_unwind(e);
    }
}
