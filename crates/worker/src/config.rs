//! Worker configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use prism_comfyui::supervisor::EngineCommand;

/// Runtime configuration for the worker.
///
/// All fields have defaults matching the standard container layout
/// (engine checkout at `/comfyui`, serving on `127.0.0.1:8188`).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// HTTP base URL of the engine.
    pub api_url: String,
    /// WebSocket base URL of the engine.
    pub ws_url: String,
    /// Directory the engine process is launched from.
    pub comfy_dir: String,
    /// Port the engine is told to listen on.
    pub port: u16,
    /// Path of the workflow template JSON.
    pub workflow_path: PathBuf,
    /// Optional path of a resource-manifest JSON; the built-in realism
    /// manifest is used when absent.
    pub manifest_path: Option<PathBuf>,
    /// Bound on the wait for a run's terminal event.
    pub sync_timeout: Duration,
    /// Liveness probe budget during engine startup.
    pub ready_poll_attempts: u32,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default                                        |
    /// |-----------------------|------------------------------------------------|
    /// | `COMFY_PORT`          | `8188`                                         |
    /// | `COMFY_API_URL`       | `http://127.0.0.1:<port>`                      |
    /// | `COMFY_WS_URL`        | `ws://127.0.0.1:<port>`                        |
    /// | `COMFY_DIR`           | `/comfyui`                                     |
    /// | `WORKFLOW_PATH`       | `/comfyui/workflows/realism_workflow_api.json` |
    /// | `MANIFEST_PATH`       | (unset: built-in manifest)                     |
    /// | `SYNC_TIMEOUT_SECS`   | `300`                                          |
    /// | `READY_POLL_ATTEMPTS` | `120`                                          |
    pub fn from_env() -> Self {
        let port: u16 = std::env::var("COMFY_PORT")
            .unwrap_or_else(|_| "8188".into())
            .parse()
            .expect("COMFY_PORT must be a valid u16");

        let api_url = std::env::var("COMFY_API_URL")
            .unwrap_or_else(|_| format!("http://127.0.0.1:{port}"));
        let ws_url =
            std::env::var("COMFY_WS_URL").unwrap_or_else(|_| format!("ws://127.0.0.1:{port}"));
        let comfy_dir = std::env::var("COMFY_DIR").unwrap_or_else(|_| "/comfyui".into());

        let workflow_path = std::env::var("WORKFLOW_PATH")
            .unwrap_or_else(|_| "/comfyui/workflows/realism_workflow_api.json".into())
            .into();
        let manifest_path = std::env::var("MANIFEST_PATH").ok().map(PathBuf::from);

        let sync_timeout_secs: u64 = std::env::var("SYNC_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("SYNC_TIMEOUT_SECS must be a valid u64");

        let ready_poll_attempts: u32 = std::env::var("READY_POLL_ATTEMPTS")
            .unwrap_or_else(|_| "120".into())
            .parse()
            .expect("READY_POLL_ATTEMPTS must be a valid u32");

        Self {
            api_url,
            ws_url,
            comfy_dir,
            port,
            workflow_path,
            manifest_path,
            sync_timeout: Duration::from_secs(sync_timeout_secs),
            ready_poll_attempts,
        }
    }

    /// The launch command for the engine process.
    pub fn engine_command(&self) -> EngineCommand {
        EngineCommand {
            program: "python".into(),
            args: vec![
                "main.py".into(),
                "--listen".into(),
                "127.0.0.1".into(),
                "--port".into(),
                self.port.to_string(),
                "--disable-auto-launch".into(),
            ],
            work_dir: self.comfy_dir.clone(),
            api_url: self.api_url.clone(),
        }
    }
}
