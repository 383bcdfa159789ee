//! REST client for the ComfyUI HTTP endpoints.
//!
//! Wraps the engine's HTTP API with [`reqwest`]: liveness/capability
//! listing (`/object_info`), model inventory (`/models`), workflow
//! submission (`/prompt`), execution history (`/history`), and raw
//! artifact retrieval (`/view`). Every call carries its own short
//! timeout so an unresponsive HTTP layer cannot block a job forever.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;

/// Timeout for lightweight listing calls (`/object_info`, `/models`).
const LISTING_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for submission and history calls.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout for artifact downloads, which may be multi-megabyte.
const VIEW_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP client for a single local ComfyUI engine.
pub struct ComfyApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by `/prompt` after successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt. This is the
    /// job id used for all later history lookups.
    pub prompt_id: String,
}

/// The `/models?type=` endpoint answers with either a bare list of
/// filenames or a mapping containing a `models` list, depending on the
/// engine version. Decoded at the boundary into one canonical shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ModelListing {
    Plain(Vec<String>),
    Keyed { models: Vec<String> },
}

impl ModelListing {
    fn into_names(self) -> Vec<String> {
        match self {
            ModelListing::Plain(names) => names,
            ModelListing::Keyed { models } => models,
        }
    }
}

/// Errors from the ComfyUI REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (connect, timeout, DNS, ...).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The engine returned a non-2xx status code.
    #[error("engine returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body for diagnostics.
        body: String,
    },
}

impl ComfyApi {
    /// Create an API client for the engine at `api_url`
    /// (e.g. `http://127.0.0.1:8188`).
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Probe `/object_info` as a liveness check.
    ///
    /// Any 2xx response means the engine is up and serving; the body is
    /// discarded here (see [`object_info`](Self::object_info) for the
    /// capability listing).
    pub async fn is_alive(&self) -> bool {
        let response = self
            .client
            .get(format!("{}/object_info", self.api_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await;
        matches!(response, Ok(r) if r.status().is_success())
    }

    /// Fetch the capability listing: a mapping from node class name to
    /// node metadata. Only the key set matters to validation.
    pub async fn object_info(&self) -> Result<BTreeSet<String>, ApiError> {
        let response = self
            .client
            .get(format!("{}/object_info", self.api_url))
            .timeout(LISTING_TIMEOUT)
            .send()
            .await?;
        let body: serde_json::Map<String, serde_json::Value> =
            Self::parse_response(response).await?;
        Ok(body.into_iter().map(|(name, _)| name).collect())
    }

    /// Fetch the available model filenames for one category
    /// (`"checkpoints"`, `"loras"`, ...).
    pub async fn models(&self, category: &str) -> Result<BTreeSet<String>, ApiError> {
        let response = self
            .client
            .get(format!("{}/models", self.api_url))
            .query(&[("type", category)])
            .timeout(LISTING_TIMEOUT)
            .send()
            .await?;
        let listing: ModelListing = Self::parse_response(response).await?;
        Ok(listing.into_names().into_iter().collect())
    }

    /// Submit a bound workflow for execution.
    ///
    /// Sends `POST /prompt` with the workflow graph and the client
    /// correlation id. Returns the server-assigned `prompt_id`.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<SubmitResponse, ApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve the recorded history for a prompt, keyed by prompt id.
    pub async fn history(&self, prompt_id: &str) -> Result<serde_json::Value, ApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Download one output artifact's raw bytes via
    /// `GET /view?filename=&subfolder=&type=`.
    pub async fn view(
        &self,
        filename: &str,
        subfolder: &str,
        kind: &str,
    ) -> Result<Vec<u8>, ApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[
                ("filename", filename),
                ("subfolder", subfolder),
                ("type", kind),
            ])
            .timeout(VIEW_TIMEOUT)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    /// Return the response unchanged on a success status, or an
    /// [`ApiError::Status`] carrying the status and body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}
