//! Pipeline event system.

use crate::pipeline::Stage;
use tokio::sync::broadcast;

/// Events emitted while verification runs progress.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Service is accepting uploads.
    Started,

    /// Service is shutting down.
    ShuttingDown,

    /// A stage began.
    StageStarted {
        /// Run identifier.
        run_id: String,
        /// Stage that began.
        stage: Stage,
    },

    /// A stage finished successfully.
    StageCompleted {
        /// Run identifier.
        run_id: String,
        /// Stage that finished.
        stage: Stage,
    },

    /// A stage failed and the run was aborted.
    StageFailed {
        /// Run identifier.
        run_id: String,
        /// Stage that failed.
        stage: Stage,
        /// Failure description.
        message: String,
    },

    /// A new result replaced the stored one.
    ResultStored {
        /// Run identifier.
        run_id: String,
        /// Value of the `verified` flag.
        verified: bool,
    },

    /// The staged artifact could not be removed.
    CleanupFailed {
        /// Run identifier.
        run_id: String,
        /// Error message.
        message: String,
    },
}

/// Channel for receiving pipeline events.
pub type PipelineEventsChannel = broadcast::Receiver<PipelineEvent>;

/// Sender for pipeline events.
pub type PipelineEventsSender = broadcast::Sender<PipelineEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (PipelineEventsSender, PipelineEventsChannel) {
    broadcast::channel(256)
}
