//! Data access layer for LC-MS acquisitions.
//!
//! Holds the raw scan model, the [`DataProvider`] abstraction with its
//! in-memory implementation, file readers, tolerances and the trace level
//! utilities (extraction, smoothing, 1-D peak detection) that the analysis
//! crates build on.

// Re-export main structures
pub use crate::models::{
    ChromXType,
    ChromXs,
    Chromatogram,
    ChromatogramPoint,
    PrecursorInfo,
    RawSpectrum,
    SpectrumPeak,
};
pub use crate::traits::DataProvider;
pub use crate::traits::data_provider::InMemoryDataProvider;

// Declare modules
pub mod errors;
pub mod models;
pub mod serde;
pub mod traits;
pub mod utils;
pub use crate::utils::TupleRange;

// Re-export errors
pub use crate::errors::{
    ChromqueryError,
    DataReadingError,
    UnsupportedDataError,
};
