//! Realtime WebSocket connection and frame handling

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::protocol::Frame;
use crate::config::Project;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub struct RealtimeSocket {
    stream: WsStream,
}

/// `wss://<host>/realtime/v1/websocket?apikey=…&vsn=1.0.0`
pub fn websocket_url(project: &Project) -> String {
    let base = project
        .url
        .replacen("https://", "wss://", 1)
        .replacen("http://", "ws://", 1);
    let key = url::form_urlencoded::byte_serialize(project.anon_key.as_bytes()).collect::<String>();
    format!("{}/realtime/v1/websocket?apikey={}&vsn=1.0.0", base, key)
}

impl RealtimeSocket {
    /// Connect to the project's realtime endpoint. The project key rides in
    /// the URL; the user's token is sent with each channel join.
    pub async fn connect(project: &Project) -> Result<Self> {
        let ws_url = websocket_url(project);
        tracing::info!("Connecting realtime WebSocket to {}", project.url);

        let (stream, response) = connect_async(&ws_url)
            .await
            .context("WebSocket connection failed")?;

        tracing::info!("WebSocket connected (status={})", response.status());

        Ok(Self { stream })
    }

    pub async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        let text = frame.to_text();
        tracing::debug!("WS send: {}", text);
        self.stream
            .send(Message::Text(text))
            .await
            .context("Failed to send WebSocket message")
    }

    /// Receive the next text frame, answering pings.
    pub async fn recv_frame(&mut self) -> Result<Option<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!("WS recv: {}", text);
                    return Ok(Some(text));
                }
                Some(Ok(Message::Ping(data))) => {
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .context("Failed to send pong")?;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!("WebSocket closed: {:?}", frame);
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    tracing::debug!("WS frame (ignored): {:?}", other);
                }
                Some(Err(e)) => {
                    return Err(e).context("WebSocket receive error");
                }
                None => {
                    return Ok(None);
                }
            }
        }
    }

    pub async fn close(mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("WebSocket close failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url() {
        let project = Project {
            url: "https://abcd.supabase.co".into(),
            anon_key: "ey+key".into(),
        };
        assert_eq!(
            websocket_url(&project),
            "wss://abcd.supabase.co/realtime/v1/websocket?apikey=ey%2Bkey&vsn=1.0.0"
        );
    }
}
