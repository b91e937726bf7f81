//! Untargeted LC-MS processing.
//!
//! Per file: peak spotting on MS1, MS2 deconvolution and library annotation.
//! Across files: alignment of the features and gap filling from raw data.

pub mod alignment;
pub mod annotation;
pub mod data_sources;
pub mod deconvolution;
pub mod errors;
pub mod models;
pub mod parameters;
pub mod pipeline;
pub mod serde;
pub mod spotting;
pub mod utils;

pub use alignment::{
    align_features,
    fill_gaps,
};
pub use annotation::Annotator;
pub use data_sources::{
    read_msp_library,
    read_text_library,
};
pub use deconvolution::{
    deconvolute,
    deconvolute_all,
};
pub use errors::{
    ChromSeekError,
    Result,
};
pub use models::{
    AlignmentResult,
    AlignmentSpotProperty,
    ChromatogramPeakFeature,
    MatchResultContainer,
    MsDecResult,
    MsScanMatchResult,
    ReferenceLibrary,
};
pub use parameters::ProcessingParameters;
pub use pipeline::{
    BatchOutcome,
    BatchResult,
    CancellationToken,
    FileResult,
    InMemoryFiles,
    Libraries,
    ProcessingOutcome,
    RawFilePaths,
    RawFileSource,
    RunContext,
    process_batch,
    process_file,
};
pub use serde::{
    MsDecStoreReader,
    MsDecStoreWriter,
    write_msdec_store,
};
pub use spotting::spot_peaks;
