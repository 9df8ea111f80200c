//! deckbench - interchangeable extraction backends with a benchmark harness
//!
//! deckbench extracts text and structure from slide decks and scanned documents
//! through several backends behind one contract, times them on the same input
//! and compares the results.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use deckbench::backends::{DirectBackend, ExtractOptions, ExtractionBackend, Source};
//!
//! # async fn run() -> deckbench::Result<()> {
//! let units = DirectBackend
//!     .extract(&Source::Document("deck.pptx".into()), &ExtractOptions::default())
//!     .await?;
//! for unit in &units {
//!     println!("{}", unit.to_text(false));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Backends** (`backends`): direct PPTX parsing, cloud vision LLMs, DeepSeek OCR 2, GLM-OCR and EasyOCR
//! - **Benchmark** (`benchmark`): method validation, timing, cost estimates and reports
//! - **Invoice** (`invoice`): fixed invoice property schema, heuristic and LLM extraction, ground-truth scoring
//! - **Models** (`models`): process-lifetime cache of local model workers
//! - **Render** (`render`): document to page image conversion via LibreOffice and pdftoppm

#![deny(unsafe_code)]

pub mod backends;
pub mod benchmark;
pub mod core;
pub mod error;
pub mod invoice;
pub mod llm;
pub mod models;
pub mod postprocess;
pub mod render;
pub mod types;
pub mod utils;

pub use error::{DeckbenchError, Result};

pub use types::{BenchmarkResult, ExtractedUnit, TableData, estimate_tokens};

pub use backends::{Backend, BackendKind, ExtractOptions, ExtractionBackend, Source};

pub use benchmark::{BenchmarkHarness, BenchmarkOptions, LocalBenchmark, LocalBenchmarkOptions};

pub use core::config::DeckbenchConfig;

pub use invoice::{GroundTruthScore, InvoiceProperties, PROPERTY_KEYS};

pub use models::ModelContext;
