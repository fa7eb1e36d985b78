//! Domain model, settings provider, and path normalizer shared by the
//! archive reader and the server crates.
//!
//! This crate holds no I/O beyond what path normalization and the
//! in-process settings defaults require — the catalog store itself
//! (rusqlite-backed) lives in `manga-server`.

pub mod error;
pub mod model;
pub mod natural_sort;
pub mod path_normalize;
pub mod settings;
pub mod tagging;

pub use error::CoreError;
