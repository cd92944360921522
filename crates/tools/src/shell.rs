//! Shell worker client: commands go to a remote shell service over
//! WebSocket, output frames stream back until the connection idles out.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use spool_domain::{Error, Result};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Default idle window after the last output frame.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct ShellClient {
    ws_url: String,
}

impl ShellClient {
    pub fn new(ws_url: &str) -> Self {
        Self {
            ws_url: ws_url.to_string(),
        }
    }

    /// Run a batch of commands in the worker room for a thread and return
    /// the concatenated transcript. The session is considered finished
    /// when no frame arrives within `idle_timeout`.
    pub async fn run_commands(
        &self,
        room: &str,
        commands: &[String],
        elevated: bool,
        idle_timeout: Duration,
    ) -> Result<String> {
        let (mut ws, _) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| Error::Http(format!("shell worker connect: {e}")))?;

        let join = serde_json::json!({
            "action": "join",
            "room": room,
            "elevated": elevated,
        });
        ws.send(WsMessage::Text(join.to_string()))
            .await
            .map_err(|e| Error::Http(format!("shell worker join: {e}")))?;

        for command in commands {
            let frame = serde_json::json!({
                "action": "shell_command",
                "room": room,
                "command": command,
            });
            ws.send(WsMessage::Text(frame.to_string()))
                .await
                .map_err(|e| Error::Http(format!("shell worker send: {e}")))?;
        }

        let mut transcript = String::new();
        loop {
            match tokio::time::timeout(idle_timeout, ws.next()).await {
                Ok(Some(Ok(WsMessage::Text(text)))) => {
                    transcript.push_str(&text);
                    if !text.ends_with('\n') {
                        transcript.push('\n');
                    }
                }
                Ok(Some(Ok(WsMessage::Close(_)))) | Ok(None) => break,
                Ok(Some(Ok(_))) => continue, // ping/pong/binary
                Ok(Some(Err(e))) => {
                    return Err(Error::Http(format!("shell worker stream: {e}")));
                }
                // Idle window elapsed — the worker has gone quiet.
                Err(_) => break,
            }
        }

        let _ = ws.close(None).await;
        Ok(transcript)
    }
}
