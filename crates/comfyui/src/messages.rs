//! Typed parsing for engine event-stream frames.
//!
//! ComfyUI sends JSON frames shaped `{"type": "<kind>", "data": {...}}`.
//! This module deserializes them into [`EngineMessage`] and provides the
//! correlation helpers the sync channel needs: which prompt a frame
//! belongs to, and whether it is the terminal signal for a given job.

use serde::Deserialize;

/// All engine event-stream frame types the worker understands.
///
/// Deserialized via the internally-tagged `"type"` field with associated
/// `"data"` content. Unknown types parse as `Err`; the sync loop logs
/// and skips them.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EngineMessage {
    /// Server status broadcast (queue depth, etc.). Not job-scoped.
    #[serde(rename = "status")]
    Status(serde_json::Value),

    /// A prompt has started executing.
    #[serde(rename = "execution_start")]
    ExecutionStart(PromptScoped),

    /// Some nodes were served from the engine's output cache.
    #[serde(rename = "execution_cached")]
    ExecutionCached(PromptScoped),

    /// A node is currently executing. `node == None` is the engine's
    /// convention for "no node is executing": the run has finished,
    /// successfully or via early termination — the protocol does not
    /// distinguish the two at this layer.
    #[serde(rename = "executing")]
    Executing(ExecutingData),

    /// Step-level progress within a long-running node.
    #[serde(rename = "progress")]
    Progress(ProgressData),

    /// A node finished and produced output.
    #[serde(rename = "executed")]
    Executed(ExecutedData),

    /// Execution failed inside a node.
    #[serde(rename = "execution_error")]
    ExecutionError(ErrorData),
}

/// Payload for frames that carry nothing the worker uses beyond the
/// prompt id they belong to.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptScoped {
    pub prompt_id: String,
}

/// Payload for `executing` frames.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    /// The node now executing, or `None` when the run has finished.
    pub node: Option<String>,
    pub prompt_id: String,
}

/// Payload for `progress` frames.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    /// Current step number.
    pub value: i64,
    /// Total number of steps.
    pub max: i64,
}

/// Payload for `executed` frames (per-node output).
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedData {
    /// The node that produced this output.
    pub node: String,
    pub prompt_id: String,
}

/// Payload for `execution_error` frames.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub exception_message: String,
    #[serde(default)]
    pub exception_type: String,
}

impl EngineMessage {
    /// The prompt id a frame is addressed to, when it is job-scoped.
    pub fn prompt_id(&self) -> Option<&str> {
        match self {
            EngineMessage::Status(_) | EngineMessage::Progress(_) => None,
            EngineMessage::ExecutionStart(data) | EngineMessage::ExecutionCached(data) => {
                Some(&data.prompt_id)
            }
            EngineMessage::Executing(data) => Some(&data.prompt_id),
            EngineMessage::Executed(data) => Some(&data.prompt_id),
            EngineMessage::ExecutionError(data) => Some(&data.prompt_id),
        }
    }

    /// True when this frame is the terminal signal for `job_id`: an
    /// `executing` frame for that prompt whose current node is absent.
    pub fn is_terminal_for(&self, job_id: &str) -> bool {
        matches!(
            self,
            EngineMessage::Executing(ExecutingData { node: None, prompt_id })
                if prompt_id == job_id
        )
    }
}

/// Parse one event-stream text frame.
///
/// Returns `Err` for malformed JSON or unknown `type` values. Callers
/// log unknown frames and continue consuming the stream.
pub fn parse_frame(text: &str) -> Result<EngineMessage, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn executing_with_node_is_not_terminal() {
        let msg = parse_frame(r#"{"type":"executing","data":{"node":"n1","prompt_id":"X"}}"#)
            .unwrap();
        assert_eq!(msg.prompt_id(), Some("X"));
        assert!(!msg.is_terminal_for("X"));
    }

    #[test]
    fn executing_without_node_is_terminal_for_its_prompt_only() {
        let msg = parse_frame(r#"{"type":"executing","data":{"node":null,"prompt_id":"X"}}"#)
            .unwrap();
        assert!(msg.is_terminal_for("X"));
        assert!(!msg.is_terminal_for("Y"));
    }

    #[test]
    fn absent_node_field_reads_as_finished() {
        // Some engine builds omit the field instead of sending null.
        let msg = parse_frame(r#"{"type":"executing","data":{"prompt_id":"X"}}"#).unwrap();
        assert!(msg.is_terminal_for("X"));
    }

    #[test]
    fn status_frame_is_unscoped() {
        let msg = parse_frame(
            r#"{"type":"status","data":{"status":{"exec_info":{"queue_remaining":3}}}}"#,
        )
        .unwrap();
        assert_matches!(msg, EngineMessage::Status(_));
        assert_eq!(msg.prompt_id(), None);
    }

    #[test]
    fn progress_frame_parses_steps() {
        let msg = parse_frame(r#"{"type":"progress","data":{"value":5,"max":20}}"#).unwrap();
        let EngineMessage::Progress(data) = msg else {
            panic!("expected Progress");
        };
        assert_eq!(data.value, 5);
        assert_eq!(data.max, 20);
    }

    #[test]
    fn executed_frame_parses_and_ignores_output_payload() {
        let msg = parse_frame(
            r#"{"type":"executed","data":{"node":"9","output":{"images":[{"filename":"o.png"}]},"prompt_id":"abc"}}"#,
        )
        .unwrap();
        let EngineMessage::Executed(data) = msg else {
            panic!("expected Executed");
        };
        assert_eq!(data.node, "9");
        assert_eq!(data.prompt_id, "abc");
    }

    #[test]
    fn execution_error_frame_parses() {
        let msg = parse_frame(
            r#"{"type":"execution_error","data":{"prompt_id":"abc","node_id":"5","exception_message":"out of memory","exception_type":"RuntimeError"}}"#,
        )
        .unwrap();
        let EngineMessage::ExecutionError(data) = msg else {
            panic!("expected ExecutionError");
        };
        assert_eq!(data.prompt_id, "abc");
        assert_eq!(data.node_id.as_deref(), Some("5"));
        assert_eq!(data.exception_message, "out of memory");
    }

    #[test]
    fn execution_cached_frame_is_prompt_scoped() {
        let msg = parse_frame(r#"{"type":"execution_cached","data":{"prompt_id":"abc","nodes":["1","2"]}}"#)
            .unwrap();
        assert_eq!(msg.prompt_id(), Some("abc"));
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert!(parse_frame(r#"{"type":"crystools.monitor","data":{}}"#).is_err());
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(parse_frame("not json at all").is_err());
    }
}
