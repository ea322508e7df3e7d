//! Run context passed into stages.
//!
//! Holds the run id, the current iteration number and the progress writer.

use crate::progress::{ProgressEvent, ProgressWriter};

/// Per-invocation context. Cheap to clone.
#[derive(Clone, Debug)]
pub struct RunContext {
    /// Unique id of the run (uuid v4); used for ephemeral file names and log correlation.
    pub run_id: String,
    /// 1-based count of stage executions so far, including this one.
    pub iteration: usize,
    pub progress: ProgressWriter,
}

impl RunContext {
    pub fn new(progress: ProgressWriter) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            iteration: 0,
            progress,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub(crate) fn at_iteration(&self, iteration: usize) -> Self {
        Self {
            iteration,
            ..self.clone()
        }
    }

    pub fn emit(&self, event: ProgressEvent) {
        self.progress.emit(event);
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(ProgressWriter::noop())
    }
}
