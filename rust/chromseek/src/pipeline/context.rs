use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{
    AtomicBool,
    AtomicUsize,
    Ordering,
};

/// Shared flag that asks running stages to stop.
///
/// Cancellation is cooperative, stages check the flag between items and
/// return early. Nothing is rolled back.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessingStage {
    PeakSpotting,
    Deconvolution,
    Annotation,
    Alignment,
    GapFilling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub stage: ProcessingStage,
    pub file: usize,
    pub done: usize,
    pub total: usize,
}

pub type ProgressCallback<'a> = &'a (dyn Fn(ProgressEvent) + Sync);

/// What a stage needs to know about the run it is part of.
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    pub cancel: &'a CancellationToken,
    pub progress: Option<ProgressCallback<'a>>,
    pub file: usize,
}

impl<'a> RunContext<'a> {
    pub fn new(cancel: &'a CancellationToken) -> Self {
        Self {
            cancel,
            progress: None,
            file: 0,
        }
    }

    pub fn with_progress(self, progress: ProgressCallback<'a>) -> Self {
        Self {
            progress: Some(progress),
            ..self
        }
    }

    pub fn for_file(self, file: usize) -> Self {
        Self { file, ..self }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn report(&self, stage: ProcessingStage, done: usize, total: usize) {
        if let Some(cb) = self.progress {
            cb(ProgressEvent {
                stage,
                file: self.file,
                done,
                total,
            });
        }
    }

    /// Counter to report progress from parallel workers.
    pub fn counter(&self, stage: ProcessingStage, total: usize) -> ProgressCounter<'a> {
        ProgressCounter {
            ctx: *self,
            stage,
            total,
            done: AtomicUsize::new(0),
            step: (total / 100).max(1),
        }
    }
}

pub struct ProgressCounter<'a> {
    ctx: RunContext<'a>,
    stage: ProcessingStage,
    total: usize,
    done: AtomicUsize,
    step: usize,
}

impl ProgressCounter<'_> {
    /// Marks one item as done, reports every ~1% and on the last item.
    pub fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if done % self.step == 0 || done == self.total {
            self.ctx.report(self.stage, done, self.total);
        }
    }
}
