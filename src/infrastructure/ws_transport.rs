// WebSocket push transport
use crate::application::transport::{PushConnection, PushTransport};
use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

#[derive(Debug, Clone, Default)]
pub struct WsTransport;

#[async_trait]
impl PushTransport for WsTransport {
    async fn open(&self, url: &str) -> anyhow::Result<Box<dyn PushConnection>> {
        let (stream, response) = connect_async(url)
            .await
            .with_context(|| format!("Failed to open push feed {}", url))?;

        tracing::debug!(status = %response.status(), "push feed handshake complete");
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushConnection for WsConnection {
    async fn next_frame(&mut self) -> anyhow::Result<Option<String>> {
        while let Some(message) = self.stream.next().await {
            match message.context("Push feed read failed")? {
                Message::Text(text) => return Ok(Some(text)),
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => tracing::debug!("Ignoring non UTF-8 binary frame"),
                },
                Message::Close(frame) => {
                    tracing::debug!(?frame, "push feed closed by server");
                    return Ok(None);
                }
                // Pings are answered by tungstenite itself.
                _ => {}
            }
        }
        Ok(None)
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.stream
            .close(None)
            .await
            .context("Failed to send close frame")?;

        // Drain until the server echoes the close.
        while let Some(message) = self.stream.next().await {
            if matches!(message, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
        Ok(())
    }
}
