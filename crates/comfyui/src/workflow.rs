//! Workflow template loading and parameter binding.
//!
//! A workflow is the engine's API-format graph: a mapping from node id
//! to `{class_type, _meta, inputs}`. Binding always operates on a deep
//! copy, so one loaded template can serve any number of concurrent jobs
//! without shared mutable state.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use prism_core::error::JobError;
use prism_core::request::{
    clamp_batch_size, generate_seed, low_creativity, GenerationRequest,
};

/// One node of the computation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Engine operator type instantiated by this node.
    #[serde(default)]
    pub class_type: String,
    /// Editor metadata; the declared title is used for semantic lookup.
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<NodeMeta>,
    /// Input-field name to value (literals or `[node_id, slot]` links).
    #[serde(default)]
    pub inputs: serde_json::Map<String, Value>,
}

/// The `_meta` block of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A parameterized computation graph, keyed by node id.
///
/// `BTreeMap` pins iteration to ascending node-id order, which makes
/// title lookup's first-match-wins deterministic when two nodes share a
/// title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Workflow(pub BTreeMap<String, Node>);

/// How a binding names its target node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeLocator {
    /// Stable node identifier in the graph.
    Id(String),
    /// Exact match against a node's declared `_meta.title`; first match
    /// in ascending node-id order wins.
    Title(String),
}

/// A node-and-field pair a request parameter is written into.
#[derive(Debug, Clone)]
pub struct FieldBinding {
    pub node: NodeLocator,
    pub field: String,
}

impl FieldBinding {
    fn id(node: &str, field: &str) -> Self {
        Self {
            node: NodeLocator::Id(node.to_string()),
            field: field.to_string(),
        }
    }
}

/// Where each request parameter lands in a given workflow layout.
///
/// The default matches the bundled realism workflow. Locators that do
/// not resolve are skipped silently, so one profile can serve template
/// variants that omit optional stages.
#[derive(Debug, Clone)]
pub struct BindingProfile {
    pub positive: FieldBinding,
    pub negative: FieldBinding,
    pub seed: FieldBinding,
    pub batch_size: FieldBinding,
    pub width: FieldBinding,
    pub height: FieldBinding,
    /// Enhancement nodes bypassed wholesale at low creativity by
    /// forcing their model and clip strengths to zero.
    pub enhancement: Vec<NodeLocator>,
}

impl Default for BindingProfile {
    fn default() -> Self {
        Self {
            positive: FieldBinding::id("3", "text"),
            negative: FieldBinding::id("4", "text"),
            seed: FieldBinding::id("2", "seed"),
            batch_size: FieldBinding::id("11", "batch_size"),
            width: FieldBinding::id("11", "width"),
            height: FieldBinding::id("11", "height"),
            enhancement: vec![
                NodeLocator::Id("16".to_string()),
                NodeLocator::Id("20".to_string()),
            ],
        }
    }
}

impl Workflow {
    /// Load a workflow template from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, JobError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            JobError::Template(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            JobError::Template(format!("failed to parse {}: {e}", path.display()))
        })
    }

    /// Resolve a locator to a node id, if the template has it.
    ///
    /// Pure over the immutable graph. Title matching is exact string
    /// equality, first match in ascending node-id order.
    pub fn resolve(&self, locator: &NodeLocator) -> Option<String> {
        match locator {
            NodeLocator::Id(id) => self.0.contains_key(id).then(|| id.clone()),
            NodeLocator::Title(title) => self
                .0
                .iter()
                .find(|(_, node)| {
                    node.meta
                        .as_ref()
                        .and_then(|m| m.title.as_deref())
                        .is_some_and(|t| t == title)
                })
                .map(|(id, _)| id.clone()),
        }
    }

    /// Write `value` into a field of the located node.
    ///
    /// Unresolved locators are a no-op, not an error — templates may
    /// omit optional stages. Returns whether the write happened.
    fn set_input(&mut self, locator: &NodeLocator, field: &str, value: Value) -> bool {
        let Some(id) = self.resolve(locator) else {
            tracing::debug!(?locator, field, "binding target absent, skipping");
            return false;
        };
        if let Some(node) = self.0.get_mut(&id) {
            node.inputs.insert(field.to_string(), value);
            true
        } else {
            false
        }
    }

    /// Bind a generation request into a fresh copy of this template.
    ///
    /// Never mutates `self`; concurrent jobs binding the same loaded
    /// template get fully independent graphs. Applies the prompt texts,
    /// the seed policy (caller's seed or a generated one), the batch
    /// clamp, optional dimension overrides, and the creativity gate.
    pub fn bind(&self, request: &GenerationRequest, profile: &BindingProfile) -> Workflow {
        let mut bound = self.clone();

        bound.set_input(
            &profile.positive.node,
            &profile.positive.field,
            Value::from(request.positive.clone()),
        );
        bound.set_input(
            &profile.negative.node,
            &profile.negative.field,
            Value::from(request.negative.clone()),
        );

        let seed = request.seed.unwrap_or_else(generate_seed);
        bound.set_input(&profile.seed.node, &profile.seed.field, Value::from(seed));

        let batch = clamp_batch_size(request.number);
        bound.set_input(
            &profile.batch_size.node,
            &profile.batch_size.field,
            Value::from(batch),
        );

        if let Some(width) = request.width {
            bound.set_input(&profile.width.node, &profile.width.field, Value::from(width));
        }
        if let Some(height) = request.height {
            bound.set_input(
                &profile.height.node,
                &profile.height.field,
                Value::from(height),
            );
        }

        if low_creativity(request.creativity) {
            for locator in &profile.enhancement {
                bound.set_input(locator, "strength_model", Value::from(0.0));
                bound.set_input(locator, "strength_clip", Value::from(0.0));
            }
        }

        tracing::debug!(seed, batch, creativity = request.creativity, "workflow bound");
        bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> GenerationRequest {
        serde_json::from_str(json).unwrap()
    }

    fn realism_template() -> Workflow {
        serde_json::from_value(serde_json::json!({
            "2": {"class_type": "KSampler", "inputs": {"seed": 7, "steps": 30}},
            "3": {"class_type": "CLIPTextEncode", "_meta": {"title": "Positive"}, "inputs": {"text": ""}},
            "4": {"class_type": "CLIPTextEncode", "_meta": {"title": "Negative"}, "inputs": {"text": ""}},
            "11": {"class_type": "EmptyLatentImage", "inputs": {"width": 1024, "height": 1024, "batch_size": 1}},
            "16": {"class_type": "LoraLoader", "inputs": {"strength_model": 0.8, "strength_clip": 0.8}},
            "20": {"class_type": "LoraLoader", "inputs": {"strength_model": 0.6, "strength_clip": 0.6}},
        }))
        .unwrap()
    }

    #[test]
    fn bind_writes_prompts_seed_and_batch() {
        let template = realism_template();
        let bound = template.bind(
            &request(r#"{"positive": "a cat", "number": 10, "seed": 42}"#),
            &BindingProfile::default(),
        );

        assert_eq!(bound.0["3"].inputs["text"], "a cat");
        assert_eq!(bound.0["4"].inputs["text"], "");
        assert_eq!(bound.0["2"].inputs["seed"], 42);
        assert_eq!(bound.0["11"].inputs["batch_size"], 4);
    }

    #[test]
    fn bind_generates_seed_when_absent() {
        let template = realism_template();
        let bound = template.bind(
            &request(r#"{"positive": "a cat"}"#),
            &BindingProfile::default(),
        );
        // u32-typed at the policy layer; any written value is in range.
        assert!(bound.0["2"].inputs["seed"].as_u64().unwrap() < (1 << 32));
    }

    #[test]
    fn bind_never_mutates_the_original() {
        let template = realism_template();
        let before = serde_json::to_value(&template).unwrap();

        let _ = template.bind(
            &request(r#"{"positive": "a cat", "creativity": 0.1}"#),
            &BindingProfile::default(),
        );

        assert_eq!(serde_json::to_value(&template).unwrap(), before);
    }

    #[test]
    fn two_bindings_are_independent() {
        let template = realism_template();
        let profile = BindingProfile::default();
        let a = template.bind(&request(r#"{"positive": "a cat", "seed": 1}"#), &profile);
        let b = template.bind(&request(r#"{"positive": "a dog", "seed": 2}"#), &profile);

        assert_eq!(a.0["3"].inputs["text"], "a cat");
        assert_eq!(b.0["3"].inputs["text"], "a dog");
        assert_eq!(a.0["2"].inputs["seed"], 1);
        assert_eq!(b.0["2"].inputs["seed"], 2);
        // Untouched fields stay identical across the two copies.
        assert_eq!(a.0["11"], b.0["11"]);
        assert_eq!(a.0["16"], b.0["16"]);
    }

    #[test]
    fn low_creativity_zeroes_enhancement_strengths() {
        let template = realism_template();
        let bound = template.bind(
            &request(r#"{"positive": "a cat", "creativity": 0.4}"#),
            &BindingProfile::default(),
        );
        for id in ["16", "20"] {
            assert_eq!(bound.0[id].inputs["strength_model"], 0.0);
            assert_eq!(bound.0[id].inputs["strength_clip"], 0.0);
        }
    }

    #[test]
    fn boundary_creativity_bypasses() {
        let template = realism_template();
        let bound = template.bind(
            &request(r#"{"positive": "a cat", "creativity": 0.5}"#),
            &BindingProfile::default(),
        );
        assert_eq!(bound.0["16"].inputs["strength_model"], 0.0);
    }

    #[test]
    fn high_creativity_leaves_template_defaults() {
        let template = realism_template();
        let bound = template.bind(
            &request(r#"{"positive": "a cat", "creativity": 0.6}"#),
            &BindingProfile::default(),
        );
        assert_eq!(bound.0["16"].inputs["strength_model"], 0.8);
        assert_eq!(bound.0["20"].inputs["strength_clip"], 0.6);
    }

    #[test]
    fn dimension_overrides_apply_only_when_present() {
        let template = realism_template();
        let profile = BindingProfile::default();

        let plain = template.bind(&request(r#"{"positive": "a cat"}"#), &profile);
        assert_eq!(plain.0["11"].inputs["width"], 1024);

        let sized = template.bind(
            &request(r#"{"positive": "a cat", "width": 768, "height": 512}"#),
            &profile,
        );
        assert_eq!(sized.0["11"].inputs["width"], 768);
        assert_eq!(sized.0["11"].inputs["height"], 512);
    }

    #[test]
    fn title_lookup_first_match_in_id_order() {
        let workflow: Workflow = serde_json::from_value(serde_json::json!({
            "10": {"class_type": "A", "_meta": {"title": "Shared"}, "inputs": {}},
            "7": {"class_type": "B", "_meta": {"title": "Shared"}, "inputs": {}},
        }))
        .unwrap();

        // "10" sorts before "7" lexicographically under BTreeMap order.
        assert_eq!(
            workflow.resolve(&NodeLocator::Title("Shared".into())),
            Some("10".to_string())
        );
    }

    #[test]
    fn unresolved_locator_is_a_silent_no_op() {
        let template = realism_template();
        let mut profile = BindingProfile::default();
        profile.positive = FieldBinding {
            node: NodeLocator::Title("Optional Stage".into()),
            field: "text".into(),
        };

        let bound = template.bind(&request(r#"{"positive": "a cat"}"#), &profile);
        // Nothing resolved the positive binding; the graph is otherwise bound.
        assert_eq!(bound.0["3"].inputs["text"], "");
        assert_eq!(bound.0["11"].inputs["batch_size"], 1);
    }

    #[test]
    fn title_lookup_requires_exact_equality() {
        let template = realism_template();
        assert!(template.resolve(&NodeLocator::Title("positive".into())).is_none());
        assert_eq!(
            template.resolve(&NodeLocator::Title("Positive".into())),
            Some("3".to_string())
        );
    }

    #[test]
    fn serializes_back_to_engine_shape() {
        let template = realism_template();
        let value = serde_json::to_value(&template).unwrap();
        assert_eq!(value["3"]["_meta"]["title"], "Positive");
        assert_eq!(value["2"]["class_type"], "KSampler");
        // Nodes without _meta serialize without the key.
        assert!(value["2"].get("_meta").is_none());
    }
}
