//! Library annotation of detected features.

pub mod annotator;
pub mod scorer;
pub mod search;
pub mod similarity;

pub use annotator::{
    Annotator,
    observed_isotope_ratios,
};
pub use scorer::{
    LipidomicsScorer,
    MatchScorer,
    MetabolomicsScorer,
    QueryProperties,
};
pub use search::candidate_range;
