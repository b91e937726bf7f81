//! End to end processing of single files and batches.

pub mod context;
pub mod timings;

use chromquery::{
    DataProvider,
    InMemoryDataProvider,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{
    error,
    info,
    warn,
};

pub use context::{
    CancellationToken,
    ProcessingStage,
    ProgressCallback,
    ProgressEvent,
    RunContext,
};
pub use timings::StageTimings;

use crate::alignment::{
    GapFillError,
    align_features,
    fill_gaps,
};
use crate::annotation::Annotator;
use crate::deconvolution::deconvolute_all;
use crate::errors::Result;
use crate::models::{
    AlignmentResult,
    ChromatogramPeakFeature,
    MatchResultContainer,
    MsDecResult,
    ReferenceLibrary,
};
use crate::parameters::ProcessingParameters;
use crate::spotting::{
    ChromatogramPeaksDataSummary,
    spot_peaks,
};

/// Reference libraries used for annotation, both can be empty.
#[derive(Debug, Clone, Default)]
pub struct Libraries {
    pub spectral: ReferenceLibrary,
    pub text: ReferenceLibrary,
}

/// Everything computed for one file.
///
/// `features`, `msdec_results` and `matches` are parallel lists.
#[derive(Debug, Clone)]
pub struct FileResult {
    pub file_id: usize,
    pub file_name: String,
    pub features: Vec<ChromatogramPeakFeature>,
    pub msdec_results: Vec<MsDecResult>,
    pub matches: Vec<MatchResultContainer>,
    pub summary: ChromatogramPeaksDataSummary,
    pub timings: StageTimings,
}

#[derive(Debug, Clone)]
pub enum ProcessingOutcome {
    Completed(FileResult),
    Cancelled,
}

/// Spotting, deconvolution and annotation of one file.
///
/// Runs on the current rayon pool.
#[tracing::instrument(skip_all, fields(file = %file_name))]
pub fn process_file<P: DataProvider + ?Sized>(
    provider: &P,
    file_id: usize,
    file_name: &str,
    params: &ProcessingParameters,
    libraries: &Libraries,
    ctx: &RunContext,
) -> ProcessingOutcome {
    let ctx = ctx.for_file(file_id);
    let mut timings = StageTimings::default();

    let start = Instant::now();
    let Some(mut features) = spot_peaks(provider, &params.peak_picking, &ctx) else {
        return ProcessingOutcome::Cancelled;
    };
    timings.peak_spotting = start.elapsed();
    let summary = ChromatogramPeaksDataSummary::from_features(&features);

    let start = Instant::now();
    let Some(msdec_results) = deconvolute_all(provider, &features, &summary, &params.deconvolution, &ctx)
    else {
        return ProcessingOutcome::Cancelled;
    };
    timings.deconvolution = start.elapsed();

    let start = Instant::now();
    let annotator = Annotator::new(&libraries.spectral, &libraries.text, &params.annotation);
    let Some(matches) = annotator.annotate_all(provider, &mut features, &msdec_results, &ctx) else {
        return ProcessingOutcome::Cancelled;
    };
    timings.annotation = start.elapsed();

    info!(
        "Processed {}: {} features in {:?}",
        file_name,
        features.len(),
        timings.total()
    );
    ProcessingOutcome::Completed(FileResult {
        file_id,
        file_name: file_name.to_string(),
        features,
        msdec_results,
        matches,
        summary,
        timings,
    })
}

/// Where the raw data of a batch comes from.
///
/// Files are opened twice, once for processing and once for gap filling,
/// so only one of them has to be in memory per worker.
pub trait RawFileSource: Sync {
    type Provider: DataProvider;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn name(&self, index: usize) -> String;

    fn open(&self, index: usize) -> Result<Self::Provider>;
}

/// Raw files on disk, see [`InMemoryDataProvider::from_file`].
#[derive(Debug, Clone)]
pub struct RawFilePaths(pub Vec<PathBuf>);

impl RawFileSource for RawFilePaths {
    type Provider = InMemoryDataProvider;

    fn len(&self) -> usize {
        self.0.len()
    }

    fn name(&self, index: usize) -> String {
        self.0
            .get(index)
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("file_{}", index))
    }

    fn open(&self, index: usize) -> Result<Self::Provider> {
        let path = self.0.get(index).ok_or_else(|| crate::errors::ChromSeekError::ParseError {
            msg: format!("No raw file with index {}", index),
        })?;
        Ok(InMemoryDataProvider::from_file(path)?)
    }
}

/// Files that are already loaded.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFiles {
    files: Vec<(String, Arc<InMemoryDataProvider>)>,
}

impl InMemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, provider: InMemoryDataProvider) {
        self.files.push((name.into(), Arc::new(provider)));
    }
}

impl RawFileSource for InMemoryFiles {
    type Provider = Arc<InMemoryDataProvider>;

    fn len(&self) -> usize {
        self.files.len()
    }

    fn name(&self, index: usize) -> String {
        self.files
            .get(index)
            .map(|(n, _)| n.clone())
            .unwrap_or_else(|| format!("file_{}", index))
    }

    fn open(&self, index: usize) -> Result<Self::Provider> {
        self.files
            .get(index)
            .map(|(_, p)| Arc::clone(p))
            .ok_or_else(|| crate::errors::ChromSeekError::ParseError {
                msg: format!("No in memory file with index {}", index),
            })
    }
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    /// Successfully processed files, in input order. Their position in this
    /// list is their slot in the alignment.
    pub files: Vec<FileResult>,
    pub alignment: AlignmentResult,
    /// Names of the files that failed and were left out.
    pub failed_files: Vec<String>,
    pub timings: StageTimings,
}

#[derive(Debug, Clone)]
pub enum BatchOutcome {
    Completed(BatchResult),
    Cancelled,
}

fn process_batch_inner<S: RawFileSource>(
    source: &S,
    params: &ProcessingParameters,
    libraries: &Libraries,
    ctx: &RunContext,
) -> BatchOutcome {
    let mut files: Vec<FileResult> = Vec::with_capacity(source.len());
    let mut source_ids: Vec<usize> = Vec::with_capacity(source.len());
    let mut failed_files = Vec::new();
    let mut timings = StageTimings::default();

    for index in 0..source.len() {
        let name = source.name(index);
        let slot = files.len();
        let attempt = || -> Result<ProcessingOutcome> {
            let provider = source.open(index)?;
            Ok(process_file(&provider, slot, &name, params, libraries, ctx))
        };
        match attempt() {
            Ok(ProcessingOutcome::Completed(result)) => {
                timings += result.timings;
                files.push(result);
                source_ids.push(index);
            }
            Ok(ProcessingOutcome::Cancelled) => return BatchOutcome::Cancelled,
            Err(e) => {
                error!("Skipping {}: {}", name, e);
                failed_files.push(name);
            }
        }
    }
    if ctx.is_cancelled() {
        return BatchOutcome::Cancelled;
    }

    // A file that cannot be read back for gap filling fails as a whole, the
    // remaining files are aligned again without it.
    let spots = loop {
        let start = Instant::now();
        let mut per_file: Vec<Vec<ChromatogramPeakFeature>> =
            files.iter_mut().map(|f| std::mem::take(&mut f.features)).collect();
        let mut spots = align_features(&mut per_file, &params.alignment);
        for (file, features) in files.iter_mut().zip(per_file) {
            file.features = features;
        }
        timings.alignment += start.elapsed();
        ctx.report(ProcessingStage::Alignment, 1, 1);

        if !params.alignment.enable_gap_filling || spots.is_empty() {
            break spots;
        }
        let start = Instant::now();
        let filled = fill_gaps(
            &mut spots,
            files.len(),
            |slot| source.open(source_ids[slot]),
            &params.alignment,
            ctx,
        );
        timings.gap_filling += start.elapsed();
        match filled {
            Ok(true) => break spots,
            Ok(false) => return BatchOutcome::Cancelled,
            Err(GapFillError { file_id, source: err }) => {
                let failed = files.remove(file_id);
                source_ids.remove(file_id);
                error!("Dropping {} from the batch: {}", failed.file_name, err);
                failed_files.push(failed.file_name);
                for (slot, file) in files.iter_mut().enumerate() {
                    file.file_id = slot;
                }
            }
        }
    };

    BatchOutcome::Completed(BatchResult {
        alignment: AlignmentResult {
            file_names: files.iter().map(|f| f.file_name.clone()).collect(),
            spots,
        },
        files,
        failed_files,
        timings,
    })
}

/// Processes every file of `source`, then aligns and gap fills them.
///
/// Work runs on a dedicated rayon pool of `params.num_threads` threads.
/// A file that cannot be read, either for processing or back for gap
/// filling, is logged, listed in `failed_files` and left out of the
/// alignment; the rest of the batch continues.
pub fn process_batch<S: RawFileSource>(
    source: &S,
    params: &ProcessingParameters,
    libraries: &Libraries,
    ctx: &RunContext,
) -> Result<BatchOutcome> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(params.num_threads)
        .build()?;
    info!(
        "Processing {} files on {} threads",
        source.len(),
        pool.current_num_threads()
    );
    let outcome = pool.install(|| process_batch_inner(source, params, libraries, ctx));
    match &outcome {
        BatchOutcome::Completed(batch) => {
            if !batch.failed_files.is_empty() {
                warn!("{} files failed: {:?}", batch.failed_files.len(), batch.failed_files);
            }
            info!(
                "Batch done: {} files, {} alignment spots, {:?}",
                batch.files.len(),
                batch.alignment.spots.len(),
                batch.timings.total()
            );
        }
        BatchOutcome::Cancelled => warn!("Batch cancelled"),
    }
    Ok(outcome)
}
