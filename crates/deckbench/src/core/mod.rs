//! Configuration and file I/O shared by the rest of the crate.

pub mod config;
pub mod io;

pub use config::DeckbenchConfig;
pub use io::{OutputFormat, collect_files, parse_slide_range, read_units, render_units, write_units};
