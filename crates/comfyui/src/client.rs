//! WebSocket client for the engine's event stream.
//!
//! The stream is scoped by client correlation id: ComfyUI only addresses
//! execution events to the `clientId` that submitted the prompt, so the
//! connection must be opened with the same id that will be sent to
//! `/prompt` — and it must be opened *before* submission, otherwise
//! completion events emitted in the gap are lost.

use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// A live event-stream connection scoped to one correlation id.
pub struct WsConnection {
    /// Correlation id the connection was opened with.
    pub client_id: String,
    /// The raw WebSocket stream for reading frames.
    pub ws_stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

/// Errors from the WebSocket layer.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    /// Failed to establish the initial connection.
    #[error("connection error: {0}")]
    Connection(String),
}

/// Connect to the engine's event stream at `ws_url`
/// (e.g. `ws://127.0.0.1:8188`), subscribing as `client_id`.
pub async fn connect(ws_url: &str, client_id: &str) -> Result<WsConnection, WsError> {
    let url = format!("{ws_url}/ws?clientId={client_id}");

    let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
        WsError::Connection(format!("failed to connect to engine at {ws_url}: {e}"))
    })?;

    tracing::debug!(client_id = %client_id, "event stream connected");

    Ok(WsConnection {
        client_id: client_id.to_string(),
        ws_stream,
    })
}

/// Generate a fresh correlation id for one submission.
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
