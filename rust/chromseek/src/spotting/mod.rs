//! Feature detection on MS1 data.

pub mod isotopes;
pub mod peak_spotting;
pub mod summary;

pub use isotopes::assign_isotopes;
pub use peak_spotting::spot_peaks;
pub use summary::ChromatogramPeaksDataSummary;
