mod alignment;
mod feature;
mod match_result;
mod msdec;
mod reference;

pub use alignment::{
    AlignedPeakProperty,
    AlignmentResult,
    AlignmentSpotProperty,
    NOT_DETECTED_PEAK_ID,
    PeakSlotState,
};
pub use feature::{
    ChromatogramPeakFeature,
    IsotopeCharacter,
};
pub use match_result::{
    AnnotationSource,
    MatchResultContainer,
    MsScanMatchResult,
};
pub use msdec::{
    ModelChromatogramPoint,
    MsDecResult,
};
pub use reference::{
    IsotopeRatios,
    MoleculeMsReference,
    ReferenceLibrary,
};
