//! Output artifact collection.
//!
//! After the terminal event, the job's recorded history is the source
//! of truth for what was produced. Every image descriptor listed there
//! is fetched and base64-encoded for transport; a single failed fetch
//! fails the whole job, and zero listed artifacts after a finished run
//! is its own failure class rather than an empty success.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde::Deserialize;

use prism_core::error::JobError;

use crate::api::ComfyApi;

/// Per-job history record, as stored under the job id key.
#[derive(Debug, Deserialize)]
pub struct HistoryEntry {
    /// Output descriptors per output-bearing node. `BTreeMap` gives a
    /// stable collection order; the engine itself guarantees ordering
    /// only within one node's image list.
    #[serde(default)]
    pub outputs: BTreeMap<String, NodeOutput>,
}

/// Outputs recorded for one node.
#[derive(Debug, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

/// One produced image, addressable via the `/view` endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ImageRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    "output".to_string()
}

/// Extract the ordered image descriptors for `job_id` from a raw
/// history response (which is keyed by job id).
///
/// A history with no record for the job, or a record listing zero
/// images, is [`JobError::NoOutputs`]: the run reached its terminal
/// signal without producing anything, which callers must not confuse
/// with success.
pub fn image_refs(history: &serde_json::Value, job_id: &str) -> Result<Vec<ImageRef>, JobError> {
    let Some(record) = history.get(job_id) else {
        return Err(JobError::NoOutputs(job_id.to_string()));
    };

    let entry: HistoryEntry = serde_json::from_value(record.clone()).map_err(|e| {
        JobError::ArtifactFetchFailed {
            filename: format!("history/{job_id}"),
            detail: format!("malformed history record: {e}"),
        }
    })?;

    let refs: Vec<ImageRef> = entry
        .outputs
        .into_values()
        .flat_map(|node| node.images)
        .collect();

    if refs.is_empty() {
        return Err(JobError::NoOutputs(job_id.to_string()));
    }
    Ok(refs)
}

/// Fetch every artifact the job recorded and return them base64-encoded,
/// in manifest order.
///
/// No artifact is optional: the first retrieval failure fails the whole
/// job instead of returning a partial list.
pub async fn collect(api: &ComfyApi, job_id: &str) -> Result<Vec<String>, JobError> {
    let history = api
        .history(job_id)
        .await
        .map_err(|e| JobError::ArtifactFetchFailed {
            filename: format!("history/{job_id}"),
            detail: e.to_string(),
        })?;

    let refs = image_refs(&history, job_id)?;
    tracing::info!(job_id, count = refs.len(), "collecting artifacts");

    let mut encoded = Vec::with_capacity(refs.len());
    for image in &refs {
        let bytes = api
            .view(&image.filename, &image.subfolder, &image.kind)
            .await
            .map_err(|e| JobError::ArtifactFetchFailed {
                filename: image.filename.clone(),
                detail: e.to_string(),
            })?;
        encoded.push(BASE64_STANDARD.encode(bytes));
    }

    Ok(encoded)
}
