//! Channel manager: fans in every channel's stream and routes replies back.

use futures::stream;
use tracing::{info, warn};

use super::channel::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

/// Owns the configured channels.
#[derive(Default)]
pub struct ChannelManager {
    channels: Vec<Box<dyn Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, channel: Box<dyn Channel>) {
        self.channels.push(channel);
    }

    pub fn names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Start every channel and merge their streams.
    ///
    /// Fails if no channel is configured or if any channel fails to start.
    pub async fn start_all(&self) -> Result<MessageStream, ChannelError> {
        if self.channels.is_empty() {
            return Err(ChannelError::StartupFailed {
                name: "manager".into(),
                reason: "no channels configured".into(),
            });
        }

        let mut streams = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            if let Err(e) = channel.health_check().await {
                warn!(channel = channel.name(), error = %e, "Channel health check failed");
            }
            streams.push(channel.start().await?);
            info!(channel = channel.name(), "Channel started");
        }

        Ok(Box::pin(stream::select_all(streams)))
    }

    /// Send `response` on the channel `msg` came from.
    pub async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .iter()
            .find(|c| c.name() == msg.channel)
            .ok_or_else(|| ChannelError::SendFailed {
                name: msg.channel.clone(),
                reason: "unknown channel".into(),
            })?;
        channel.respond(msg, response).await
    }

    /// Shut every channel down, logging failures.
    pub async fn shutdown_all(&self) {
        for channel in &self.channels {
            if let Err(e) = channel.shutdown().await {
                warn!(channel = channel.name(), error = %e, "Channel shutdown failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use futures::StreamExt;
    use tokio::sync::Mutex;

    use super::*;

    /// Emits a fixed set of messages and records responses.
    struct StubChannel {
        name: &'static str,
        inbound: Vec<&'static str>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Channel for StubChannel {
        fn name(&self) -> &str {
            self.name
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            let msgs: Vec<IncomingMessage> = self
                .inbound
                .iter()
                .map(|t| IncomingMessage::new(self.name, "u", t))
                .collect();
            Ok(Box::pin(stream::iter(msgs)))
        }

        async fn respond(
            &self,
            _msg: &IncomingMessage,
            response: OutgoingResponse,
        ) -> Result<(), ChannelError> {
            self.sent.lock().await.push(response.content);
            Ok(())
        }
    }

    #[tokio::test]
    async fn start_all_without_channels_fails() {
        let mgr = ChannelManager::new();
        assert!(mgr.start_all().await.is_err());
    }

    #[tokio::test]
    async fn merges_streams_and_routes_replies() {
        let a_sent = Arc::new(Mutex::new(Vec::new()));
        let b_sent = Arc::new(Mutex::new(Vec::new()));
        let mut mgr = ChannelManager::new();
        mgr.add(Box::new(StubChannel {
            name: "a",
            inbound: vec!["one", "two"],
            sent: a_sent.clone(),
        }));
        mgr.add(Box::new(StubChannel {
            name: "b",
            inbound: vec!["three"],
            sent: b_sent.clone(),
        }));
        assert_eq!(mgr.names(), vec!["a", "b"]);

        let msgs: Vec<IncomingMessage> = mgr.start_all().await.unwrap().collect().await;
        assert_eq!(msgs.len(), 3);

        for msg in &msgs {
            mgr.respond(msg, OutgoingResponse::text(format!("re:{}", msg.content)))
                .await
                .unwrap();
        }
        assert_eq!(a_sent.lock().await.len(), 2);
        assert_eq!(b_sent.lock().await.as_slice(), ["re:three"]);
    }

    #[tokio::test]
    async fn respond_unknown_channel_fails() {
        let mgr = ChannelManager::new();
        let msg = IncomingMessage::new("nowhere", "u", "x");
        assert!(mgr.respond(&msg, OutgoingResponse::text("y")).await.is_err());
    }
}
