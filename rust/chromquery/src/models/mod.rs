pub mod chromatogram;
pub mod spectrum;
pub mod tolerance;

pub use chromatogram::{
    Chromatogram,
    ChromatogramPoint,
    extract_eic,
    extract_mobilogram,
    merge_equal_times,
};
pub use spectrum::{
    ChromXType,
    ChromXs,
    PrecursorInfo,
    RawSpectrum,
    SpectrumPeak,
};
pub use tolerance::MzTolerance;
