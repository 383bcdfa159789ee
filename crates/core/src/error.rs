//! Job-level error taxonomy.
//!
//! Every failure a job can surface maps to exactly one [`JobError`]
//! variant. The `Display` string is the user-visible classification plus
//! human-readable detail; the worker serializes it verbatim into the
//! handler's `{"error": "..."}` response.

use crate::manifest::Missing;

/// Classified failure for a single generation job.
///
/// No variant is retried automatically: the supervisor's poll budget and
/// the sync deadline are the only bounded waits in the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The engine never became reachable within the readiness budget,
    /// or a previous launch attempt already ended in failure.
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Required nodes or model files are absent from the engine.
    /// Enumerates every missing entry; submission must not be attempted.
    #[error("missing resources: {0}")]
    MissingResources(Missing),

    /// The workflow template could not be loaded or parsed.
    #[error("workflow template error: {0}")]
    Template(String),

    /// The engine rejected the submission synchronously
    /// (graph validation failure, malformed parameters, ...).
    #[error("submission rejected (status {status}): {detail}")]
    SubmissionRejected {
        /// HTTP status returned by the submission endpoint.
        status: u16,
        /// Raw response body from the engine.
        detail: String,
    },

    /// No terminal event arrived within the sync deadline. The job's
    /// true completion state on the engine is unknown.
    #[error("timed out waiting for completion after {0} seconds")]
    SyncTimeout(u64),

    /// The event stream errored or closed before the terminal event.
    /// The job's true completion state on the engine is unknown.
    #[error("event stream disconnected before completion: {0}")]
    SyncDisconnected(String),

    /// A listed output artifact could not be retrieved. Fails the whole
    /// job; no partial image list is returned.
    #[error("failed to fetch artifact {filename}: {detail}")]
    ArtifactFetchFailed {
        /// Filename reported by the output manifest.
        filename: String,
        /// Underlying fetch error.
        detail: String,
    },

    /// The run reached its terminal signal but the history manifest
    /// holds zero artifacts. Distinct from success with an empty list.
    #[error("run finished but produced no outputs for job {0}")]
    NoOutputs(String),

    /// The caller's request failed validation before any engine traffic.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
