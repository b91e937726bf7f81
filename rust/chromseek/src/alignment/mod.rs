//! Cross file alignment and gap filling.

pub mod aligner;
pub mod gap_filling;

pub use aligner::align_features;
pub use gap_filling::{
    GapFill,
    GapFillError,
    apply_gap_fills,
    fill_file_gaps,
    fill_gaps,
};
