//! MS2 spectral deconvolution.

pub mod centroid;
pub mod deconvolver;

pub use deconvolver::{
    deconvolute,
    deconvolute_all,
};
