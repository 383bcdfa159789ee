//! Handler boundary: JSON event in, JSON result out.
//!
//! The managed serverless runtime that normally drives this boundary is
//! out of scope; [`handle`] is the function it would invoke. Failures
//! become `{"error": "..."}` with the classification and detail from
//! [`JobError`]'s `Display`; successes become `{"images_base64": [...]}`.
//! Never both.

use serde::Serialize;

use prism_comfyui::workflow::{BindingProfile, Workflow};
use prism_core::error::JobError;
use prism_core::manifest::ResourceManifest;
use prism_core::request::GenerationRequest;

use crate::config::WorkerConfig;
use crate::engine::EngineOps;
use crate::runner::run_job;

/// Result shape returned to the invoking runtime.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum JobOutput {
    /// All artifacts, base64-encoded, in collection order.
    Success { images_base64: Vec<String> },
    /// Classified failure with human-readable detail.
    Error { error: String },
}

/// Handle one job event.
///
/// The workflow template is loaded fresh per job from the configured
/// path; binding then works on its own deep copy, so concurrent
/// invocations sharing one engine never share mutable template state.
pub async fn handle(
    engine: &dyn EngineOps,
    manifest: &ResourceManifest,
    config: &WorkerConfig,
    event: serde_json::Value,
) -> JobOutput {
    let request: GenerationRequest = match serde_json::from_value(event) {
        Ok(request) => request,
        Err(e) => {
            return JobOutput::Error {
                error: JobError::InvalidInput(e.to_string()).to_string(),
            }
        }
    };

    let template = match Workflow::from_path(&config.workflow_path) {
        Ok(template) => template,
        Err(e) => return JobOutput::Error { error: e.to_string() },
    };

    let profile = BindingProfile::default();
    match run_job(
        engine,
        manifest,
        &template,
        &profile,
        &request,
        config.sync_timeout,
    )
    .await
    {
        Ok(images_base64) => JobOutput::Success { images_base64 },
        Err(e) => {
            tracing::error!(error = %e, "job failed");
            JobOutput::Error { error: e.to_string() }
        }
    }
}
