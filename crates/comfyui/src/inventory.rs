//! Preflight resource validation against the live engine.
//!
//! Queries the engine's capability listing and per-category model
//! inventory, reconciles them against the required-resource manifest,
//! and fails fast with the complete missing set before any submission.
//! A listing that cannot be queried is treated as "nothing confirmed",
//! never as "everything present".

use prism_core::error::JobError;
use prism_core::manifest::{reconcile, Inventory, ResourceManifest};

use crate::api::ComfyApi;

/// Take a fresh snapshot of what the engine reports as available for
/// the categories `manifest` cares about.
///
/// Listing failures are demoted to `None` entries (fail closed) so a
/// flaky endpoint yields a complete, reportable missing set instead of
/// aborting the validation pass halfway.
pub async fn snapshot(api: &ComfyApi, manifest: &ResourceManifest) -> Inventory {
    let nodes = match api.object_info().await {
        Ok(names) => Some(names),
        Err(e) => {
            tracing::warn!(error = %e, "capability listing unavailable");
            None
        }
    };

    let mut models = std::collections::BTreeMap::new();
    for category in manifest.models.keys() {
        let listing = match api.models(category).await {
            Ok(names) => Some(names),
            Err(e) => {
                tracing::warn!(category = %category, error = %e, "model listing unavailable");
                None
            }
        };
        models.insert(category.clone(), listing);
    }

    Inventory { nodes, models }
}

/// Validate that every manifest requirement is present on the engine.
///
/// Runs both sources of truth to completion and returns the exact
/// missing set in one pass. Must succeed before any `/prompt` traffic.
pub async fn validate(api: &ComfyApi, manifest: &ResourceManifest) -> Result<(), JobError> {
    let inventory = snapshot(api, manifest).await;
    let missing = reconcile(manifest, &inventory);

    if missing.is_empty() {
        tracing::debug!("all required resources present");
        return Ok(());
    }

    // Best-effort diagnostics; never masks the failure itself.
    if let Some(available) = &inventory.nodes {
        tracing::info!(
            available_nodes = available.len(),
            "capability listing at validation time",
        );
    }
    tracing::error!(missing = %missing, "required resources absent, refusing to submit");

    Err(JobError::MissingResources(missing))
}
