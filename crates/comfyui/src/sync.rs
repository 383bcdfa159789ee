//! Submit-then-await synchronization.
//!
//! The ordering here is load-bearing: the event-stream subscription is
//! opened *before* the `/prompt` submission. Subscribing after the fact
//! loses any completion event emitted in the gap, and the wait would
//! hang until its deadline. The wait loop itself is generic over the
//! frame stream so its semantics are testable without a socket.

use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use prism_core::error::JobError;

use crate::api::{ApiError, ComfyApi};
use crate::client;
use crate::messages::{parse_frame, EngineMessage};
use crate::workflow::Workflow;

/// Default bound on the wait for a terminal event.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(300);

/// Submit a bound workflow and block until its run finishes.
///
/// Opens the event-stream subscription first, submits with the same
/// correlation id, then consumes the stream until the terminal event
/// for the returned job id. Returns the job id for history lookup.
///
/// A timeout or stream failure leaves the job's true completion state
/// on the engine unknown; the error is surfaced and nothing is
/// resubmitted.
pub async fn submit_and_await(
    api: &ComfyApi,
    ws_url: &str,
    workflow: &Workflow,
    deadline: Duration,
) -> Result<String, JobError> {
    let correlation_id = client::new_correlation_id();

    // Subscribe before submitting. The stream is scoped to this
    // correlation id; events for other in-flight jobs never reach it
    // addressed to us, but unrelated broadcast frames still do.
    let connection = client::connect(ws_url, &correlation_id)
        .await
        .map_err(|e| JobError::SyncDisconnected(e.to_string()))?;

    let graph = serde_json::to_value(workflow)
        .map_err(|e| JobError::Template(format!("failed to serialize workflow: {e}")))?;

    let submitted = api
        .submit_workflow(&graph, &correlation_id)
        .await
        .map_err(|e| match e {
            ApiError::Status { status, body } => JobError::SubmissionRejected {
                status,
                detail: body,
            },
            ApiError::Request(e) => {
                JobError::EngineUnavailable(format!("submission request failed: {e}"))
            }
        })?;

    let job_id = submitted.prompt_id;
    tracing::info!(job_id = %job_id, correlation_id = %correlation_id, "workflow submitted");

    let mut ws_stream = connection.ws_stream;
    await_completion(&mut ws_stream, &job_id, deadline).await?;

    // Best effort; the engine drops idle subscriptions on its own.
    let _ = ws_stream.close(None).await;

    tracing::info!(job_id = %job_id, "run finished");
    Ok(job_id)
}

/// Consume `stream` until the terminal event for `job_id` arrives.
///
/// Frames addressed to other prompts, unknown frame types, binary
/// preview frames, and pings are all discarded. The terminal signal is
/// an `executing` frame for `job_id` whose node field is absent — the
/// engine's convention for "nothing is executing any more". It does not
/// distinguish success from early termination; the collector decides
/// that from the output manifest afterwards.
pub async fn await_completion<S, E>(
    stream: &mut S,
    job_id: &str,
    deadline: Duration,
) -> Result<(), JobError>
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    match tokio::time::timeout(deadline, drive(stream, job_id)).await {
        Ok(result) => result,
        Err(_elapsed) => {
            tracing::warn!(job_id, deadline_secs = deadline.as_secs(), "sync wait timed out");
            Err(JobError::SyncTimeout(deadline.as_secs()))
        }
    }
}

async fn drive<S, E>(stream: &mut S, job_id: &str) -> Result<(), JobError>
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    while let Some(item) = stream.next().await {
        match item {
            Ok(Message::Text(text)) => {
                let msg = match parse_frame(&text) {
                    Ok(msg) => msg,
                    Err(_) => {
                        // Custom engine extensions broadcast their own
                        // frame types; not ours to interpret.
                        tracing::trace!(job_id, "skipping unrecognized frame");
                        continue;
                    }
                };

                if msg.prompt_id().is_some_and(|id| id != job_id) {
                    continue;
                }

                if msg.is_terminal_for(job_id) {
                    return Ok(());
                }

                match &msg {
                    EngineMessage::ExecutionError(data) => {
                        // Not terminal by itself; the executing/null
                        // frame still follows. Recorded for diagnosis.
                        tracing::error!(
                            job_id,
                            node = data.node_id.as_deref().unwrap_or("<unknown>"),
                            error_type = %data.exception_type,
                            error = %data.exception_message,
                            "node failed during execution",
                        );
                    }
                    EngineMessage::Executing(data) => {
                        tracing::debug!(job_id, node = ?data.node, "executing node");
                    }
                    EngineMessage::Progress(data) => {
                        tracing::trace!(job_id, value = data.value, max = data.max, "progress");
                    }
                    _ => {}
                }
            }
            Ok(Message::Binary(_)) => {
                // Preview image frames; not consumed by this worker.
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Ok(Message::Close(frame)) => {
                tracing::warn!(job_id, ?frame, "event stream closed before terminal event");
                return Err(JobError::SyncDisconnected(
                    "stream closed before the terminal event".into(),
                ));
            }
            Err(e) => {
                return Err(JobError::SyncDisconnected(e.to_string()));
            }
        }
    }

    Err(JobError::SyncDisconnected(
        "stream ended before the terminal event".into(),
    ))
}
