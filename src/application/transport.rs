// Push transport abstraction
use async_trait::async_trait;

/// Opens push connections for a fully built feed URL.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn open(&self, url: &str) -> anyhow::Result<Box<dyn PushConnection>>;
}

#[async_trait]
pub trait PushConnection: Send {
    /// Next text frame; `Ok(None)` once the peer closed normally.
    async fn next_frame(&mut self) -> anyhow::Result<Option<String>>;

    /// Start a graceful close and wait for the peer to confirm it.
    async fn close(&mut self) -> anyhow::Result<()>;
}
