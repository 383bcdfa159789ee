//! Job orchestration sequence.
//!
//! One job is one linear pass: input validation, engine readiness,
//! resource validation, template binding, submit-and-await, artifact
//! collection. Each stage gates the next; in particular no submission
//! traffic is ever sent once validation has reported anything missing.

use std::time::Duration;

use prism_comfyui::workflow::{BindingProfile, Workflow};
use prism_core::error::JobError;
use prism_core::manifest::ResourceManifest;
use prism_core::request::GenerationRequest;

use crate::engine::EngineOps;

/// Run one generation job to completion.
///
/// The template is bound on a deep copy; the caller's loaded template
/// is reusable across concurrent jobs.
pub async fn run_job(
    engine: &dyn EngineOps,
    manifest: &ResourceManifest,
    template: &Workflow,
    profile: &BindingProfile,
    request: &GenerationRequest,
    sync_timeout: Duration,
) -> Result<Vec<String>, JobError> {
    request.validate()?;

    engine.ensure_ready().await?;
    engine.validate(manifest).await?;

    let bound = template.bind(request, profile);
    let job_id = engine.submit_and_await(&bound, sync_timeout).await?;

    engine.collect(&job_id).await
}
