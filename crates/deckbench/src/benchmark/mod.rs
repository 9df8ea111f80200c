//! Benchmarking of extraction backends.
//!
//! - [`harness`] runs several backends over one document or image set
//! - [`local`] runs the local OCR models over handwriting and invoice corpora
//! - [`report`] renders and persists both kinds of results
//! - [`cost`] holds the per-unit cost estimates

pub mod cost;
pub mod harness;
pub mod local;
pub mod report;

pub use cost::per_unit_cost;
pub use harness::{BenchmarkHarness, BenchmarkOptions, parse_methods};
pub use local::{LocalBenchmark, LocalBenchmarkOptions, LocalBenchmarkReport, PropertyExtractor};
pub use report::{
    BenchmarkDump, SavedReport, format_benchmark_report, format_local_benchmark_report, load_dump, save_benchmark,
    save_local_benchmark,
};
