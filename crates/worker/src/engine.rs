//! The engine operations seam.
//!
//! [`EngineOps`] is the boundary the job runner sequences against. The
//! production implementation composes the comfyui crate's clients; the
//! runner tests substitute a recording fake to prove ordering
//! properties (readiness gates validation, validation gates
//! submission) without any engine.

use std::time::Duration;

use async_trait::async_trait;

use prism_comfyui::api::ComfyApi;
use prism_comfyui::supervisor::{EngineSupervisor, ProcessLauncher};
use prism_comfyui::workflow::Workflow;
use prism_comfyui::{collector, inventory, sync};
use prism_core::error::JobError;
use prism_core::manifest::ResourceManifest;

use crate::config::WorkerConfig;

/// Everything a job needs from the engine, in the order it needs it.
#[async_trait]
pub trait EngineOps: Send + Sync {
    /// Idempotently bring the engine to readiness.
    async fn ensure_ready(&self) -> Result<(), JobError>;

    /// Verify every manifest requirement against the live engine.
    async fn validate(&self, manifest: &ResourceManifest) -> Result<(), JobError>;

    /// Submit a bound workflow and wait for its terminal event.
    async fn submit_and_await(
        &self,
        workflow: &Workflow,
        deadline: Duration,
    ) -> Result<String, JobError>;

    /// Fetch the job's artifacts, base64-encoded.
    async fn collect(&self, job_id: &str) -> Result<Vec<String>, JobError>;
}

/// Production [`EngineOps`] against a local ComfyUI engine.
pub struct ComfyEngine {
    supervisor: EngineSupervisor,
    api: ComfyApi,
    ws_url: String,
}

impl ComfyEngine {
    pub fn new(config: &WorkerConfig) -> Self {
        let launcher = ProcessLauncher::new(config.engine_command());
        let supervisor = EngineSupervisor::with_budget(
            Box::new(launcher),
            prism_comfyui::supervisor::DEFAULT_POLL_INTERVAL,
            config.ready_poll_attempts,
        );
        Self {
            supervisor,
            api: ComfyApi::new(config.api_url.clone()),
            ws_url: config.ws_url.clone(),
        }
    }
}

#[async_trait]
impl EngineOps for ComfyEngine {
    async fn ensure_ready(&self) -> Result<(), JobError> {
        self.supervisor.ensure_ready().await
    }

    async fn validate(&self, manifest: &ResourceManifest) -> Result<(), JobError> {
        inventory::validate(&self.api, manifest).await
    }

    async fn submit_and_await(
        &self,
        workflow: &Workflow,
        deadline: Duration,
    ) -> Result<String, JobError> {
        sync::submit_and_await(&self.api, &self.ws_url, workflow, deadline).await
    }

    async fn collect(&self, job_id: &str) -> Result<Vec<String>, JobError> {
        collector::collect(&self.api, job_id).await
    }
}
