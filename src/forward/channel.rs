use async_trait::async_trait;
use std::sync::Arc;

use crate::backend::codec::ForwardRequest;
use crate::error::{ExecResult, ExecutionError};

/// A pooled channel to one backend. Replies do not come back through the
/// channel; its reader delivers them to the response registry.
#[async_trait]
pub trait BackendChannel: Send {
    async fn send(&mut self, request: ForwardRequest) -> ExecResult<()>;

    fn is_open(&self) -> bool;
}

#[async_trait]
pub trait ChannelProvider: Send + Sync {
    async fn acquire(&self, data_source: &str) -> ExecResult<Box<dyn BackendChannel>>;

    fn release(&self, data_source: &str, channel: Box<dyn BackendChannel>);
}

/// Holds an acquired channel and returns it to its provider on drop
pub struct ChannelGuard {
    provider: Arc<dyn ChannelProvider>,
    data_source: String,
    channel: Option<Box<dyn BackendChannel>>,
}

impl ChannelGuard {
    pub async fn acquire(provider: &Arc<dyn ChannelProvider>, data_source: &str) -> ExecResult<Self> {
        let channel = provider.acquire(data_source).await?;
        Ok(Self {
            provider: provider.clone(),
            data_source: data_source.to_string(),
            channel: Some(channel),
        })
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub async fn send(&mut self, request: ForwardRequest) -> ExecResult<()> {
        match self.channel.as_mut() {
            Some(channel) => channel.send(request).await,
            None => Err(ExecutionError::InvalidState(format!(
                "channel to {} was already released",
                self.data_source
            ))),
        }
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            self.provider.release(&self.data_source, channel);
        }
    }
}
