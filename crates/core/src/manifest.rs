//! Required-resource manifest and inventory reconciliation.
//!
//! A [`ResourceManifest`] declares the node types and model files a
//! workflow needs. An [`Inventory`] is a snapshot of what the engine
//! currently reports. [`reconcile`] compares the two and returns the
//! complete set of missing entries so the worker can fail fast before an
//! expensive submission.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use serde::Deserialize;

/// Static declaration of everything a workflow requires from the engine.
///
/// Loaded once at startup and never mutated. Model requirements are
/// keyed by engine model category (`"checkpoints"`, `"loras"`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceManifest {
    /// Node (operator) class names the workflow instantiates.
    #[serde(default)]
    pub nodes: Vec<String>,
    /// Required model filenames per category.
    #[serde(default)]
    pub models: BTreeMap<String, Vec<String>>,
}

impl ResourceManifest {
    /// Load a manifest from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read manifest {}: {e}", path.display()))?;
        serde_json::from_str(&text)
            .map_err(|e| format!("failed to parse manifest {}: {e}", path.display()))
    }
}

impl Default for ResourceManifest {
    /// Requirements of the bundled realism workflow.
    fn default() -> Self {
        let mut models = BTreeMap::new();
        models.insert(
            "checkpoints".to_string(),
            vec!["gonzalomoXLFluxPony_v40UnityXLDMD.safetensors".to_string()],
        );
        models.insert(
            "loras".to_string(),
            vec![
                "RealSkin_xxXL_v1.safetensors".to_string(),
                "add-detail-xl.safetensors".to_string(),
                "igbaddie-XL.safetensors".to_string(),
                "iphone_mirror_selfie_v01b.safetensors".to_string(),
                "Dynamic_Lighting_by_Stable_Yogi_SDXL3_v1.safetensors".to_string(),
                "epiCRealismXL-KiSSEnhancer_Lora.safetensors".to_string(),
            ],
        );
        Self {
            nodes: vec![
                "StringPreview".to_string(),
                "ImpactConcatConditionings".to_string(),
            ],
            models,
        }
    }
}

/// Snapshot of what the engine reports as available.
///
/// Fetched fresh per validation call; never cached across jobs. A model
/// category mapped to `None` means the listing for that category could
/// not be queried — "unconfirmed", which reconciliation treats as
/// missing (fail closed), not as present.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    /// Node class names the engine advertises, or `None` when the
    /// capability listing itself was unavailable.
    pub nodes: Option<BTreeSet<String>>,
    /// Available model filenames per queried category.
    pub models: BTreeMap<String, Option<BTreeSet<String>>>,
}

/// Complete set of manifest entries absent from an inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Missing {
    /// Required node classes the engine does not advertise.
    pub nodes: BTreeSet<String>,
    /// Required model filenames not listed, per category.
    pub models: BTreeMap<String, BTreeSet<String>>,
}

impl Missing {
    /// True when every required node and model was found.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.models.is_empty()
    }
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if !self.nodes.is_empty() {
            parts.push(format!(
                "nodes: {}",
                self.nodes.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        for (category, names) in &self.models {
            parts.push(format!(
                "{category}: {}",
                names.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        write!(f, "{}", parts.join("; "))
    }
}

/// Compare a manifest against an inventory and collect every missing
/// entry.
///
/// Does not short-circuit: the caller always gets the complete picture
/// in one pass. An unavailable listing (`None`) marks every required
/// entry it would have confirmed as missing.
pub fn reconcile(manifest: &ResourceManifest, inventory: &Inventory) -> Missing {
    let mut missing = Missing::default();

    for node in &manifest.nodes {
        let present = inventory
            .nodes
            .as_ref()
            .is_some_and(|available| available.contains(node));
        if !present {
            missing.nodes.insert(node.clone());
        }
    }

    for (category, names) in &manifest.models {
        let available = inventory.models.get(category).and_then(|m| m.as_ref());
        for name in names {
            let present = available.is_some_and(|listed| listed.contains(name));
            if !present {
                missing
                    .models
                    .entry(category.clone())
                    .or_default()
                    .insert(name.clone());
            }
        }
    }

    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(nodes: &[&str], models: &[(&str, &[&str])]) -> ResourceManifest {
        ResourceManifest {
            nodes: nodes.iter().map(|s| s.to_string()).collect(),
            models: models
                .iter()
                .map(|(cat, names)| {
                    (
                        cat.to_string(),
                        names.iter().map(|s| s.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }

    fn inventory(nodes: &[&str], models: &[(&str, &[&str])]) -> Inventory {
        Inventory {
            nodes: Some(nodes.iter().map(|s| s.to_string()).collect()),
            models: models
                .iter()
                .map(|(cat, names)| {
                    (
                        cat.to_string(),
                        Some(names.iter().map(|s| s.to_string()).collect()),
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn reconcile_reports_exact_missing_sets() {
        let m = manifest(&["A", "B"], &[("ckpt", &["x"]), ("lora", &["y", "z"])]);
        let inv = inventory(&["A"], &[("ckpt", &["x"]), ("lora", &[])]);

        let missing = reconcile(&m, &inv);

        assert_eq!(
            missing.nodes,
            ["B".to_string()].into_iter().collect::<BTreeSet<_>>()
        );
        assert_eq!(missing.models.len(), 1);
        assert_eq!(
            missing.models["lora"],
            ["y".to_string(), "z".to_string()]
                .into_iter()
                .collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn reconcile_everything_present_is_empty() {
        let m = manifest(&["A"], &[("checkpoints", &["c.safetensors"])]);
        let inv = inventory(&["A", "B"], &[("checkpoints", &["c.safetensors", "d.safetensors"])]);

        assert!(reconcile(&m, &inv).is_empty());
    }

    #[test]
    fn unavailable_model_listing_fails_closed() {
        let m = manifest(&[], &[("loras", &["m.safetensors"])]);
        let inv = Inventory {
            nodes: Some(BTreeSet::new()),
            models: [("loras".to_string(), None)].into_iter().collect(),
        };

        let missing = reconcile(&m, &inv);
        assert_eq!(
            missing.models["loras"],
            ["m.safetensors".to_string()].into_iter().collect()
        );
    }

    #[test]
    fn unqueried_category_fails_closed() {
        // Category absent from the inventory entirely behaves the same
        // as an unavailable listing.
        let m = manifest(&[], &[("vae", &["v.safetensors"])]);
        let inv = inventory(&[], &[]);

        let missing = reconcile(&m, &inv);
        assert_eq!(
            missing.models["vae"],
            ["v.safetensors".to_string()].into_iter().collect()
        );
    }

    #[test]
    fn unavailable_capability_listing_fails_closed() {
        let m = manifest(&["KSampler"], &[]);
        let inv = Inventory {
            nodes: None,
            models: BTreeMap::new(),
        };

        let missing = reconcile(&m, &inv);
        assert!(missing.nodes.contains("KSampler"));
    }

    #[test]
    fn display_joins_categories() {
        let m = manifest(&["B"], &[("lora", &["y"])]);
        let inv = inventory(&[], &[]);
        let missing = reconcile(&m, &inv);
        assert_eq!(missing.to_string(), "nodes: B; lora: y");
    }

    #[test]
    fn default_manifest_lists_realism_requirements() {
        let m = ResourceManifest::default();
        assert!(m.nodes.contains(&"StringPreview".to_string()));
        assert_eq!(m.models["loras"].len(), 6);
        assert_eq!(m.models["checkpoints"].len(), 1);
    }
}
