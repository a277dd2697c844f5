// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Queue broker egress: grouping key, batch sink, and direct publisher.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

use event_relay_core::errors::{SendError, SinkError};
use event_relay_core::sender::SendOnce;
use event_relay_core::sink::BatchSink;

/// Routing coordinates for one message, supplied by the producer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueTarget {
    /// Broker address, e.g. `amqp://broker:5672`. Also the grouping key
    /// for batch delivery.
    pub server: String,
    pub exchange: String,
    pub route_key: String,
}

#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub target: QueueTarget,
    pub payload: Bytes,
}

/// Connection factory for a message-queue broker.
#[async_trait]
pub trait QueueClient: Send + Sync + 'static {
    type Channel: QueueChannel;

    async fn connect(&self, server: &str) -> Result<Self::Channel, SinkError>;
}

/// One open channel to a broker. Dropped (and with it the connection)
/// after each flush; the agent holds no long-lived broker state.
#[async_trait]
pub trait QueueChannel: Send {
    /// Declares a durable exchange. Must be idempotent on the broker.
    async fn declare_exchange(&mut self, exchange: &str) -> Result<(), SinkError>;

    async fn publish(
        &mut self,
        exchange: &str,
        route_key: &str,
        payload: &[u8],
        persistent: bool,
    ) -> Result<(), SinkError>;
}

/// Batch sink that publishes one destination's accumulated messages over
/// a single broker connection per flush.
pub struct QueuePublishSink<C> {
    client: C,
}

impl<C> QueuePublishSink<C> {
    pub fn new(client: C) -> Self {
        QueuePublishSink { client }
    }
}

#[async_trait]
impl<C: QueueClient> BatchSink for QueuePublishSink<C> {
    type Item = QueueMessage;
    type Key = String;

    fn key(&self, item: &QueueMessage) -> String {
        item.target.server.clone()
    }

    async fn flush(&self, key: &String, items: &[QueueMessage]) -> Result<(), SinkError> {
        let mut channel = self.client.connect(key).await?;

        // A batch for one server may span exchanges; declare each once.
        let mut declared: HashSet<&str> = HashSet::new();
        for message in items {
            if declared.insert(message.target.exchange.as_str()) {
                channel.declare_exchange(&message.target.exchange).await?;
            }

            // A single rejected message must not sink the rest of the
            // batch. Log and move on.
            if let Err(e) = channel
                .publish(
                    &message.target.exchange,
                    &message.target.route_key,
                    &message.payload,
                    true,
                )
                .await
            {
                warn!(
                    server = %key,
                    exchange = %message.target.exchange,
                    "failed to publish message: {e}"
                );
            }
        }

        Ok(())
    }
}

/// Inline publisher for direct mode. One connect-declare-publish cycle
/// per message, wrapped by the retrying sender.
pub struct DirectQueuePublisher<C> {
    client: C,
}

impl<C> DirectQueuePublisher<C> {
    pub fn new(client: C) -> Self {
        DirectQueuePublisher { client }
    }
}

#[async_trait]
impl<C: QueueClient> SendOnce for DirectQueuePublisher<C> {
    type Message = QueueMessage;

    async fn send_once(&self, message: &QueueMessage) -> Result<(), SendError> {
        let mut channel = self
            .client
            .connect(&message.target.server)
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;
        channel
            .declare_exchange(&message.target.exchange)
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;
        channel
            .publish(
                &message.target.exchange,
                &message.target.route_key,
                &message.payload,
                false,
            )
            .await
            .map_err(|e| SendError::Transport(e.to_string()))
    }
}

/// Debug client that logs instead of talking to a broker. The default
/// wiring for agents run without broker credentials.
#[derive(Debug, Clone, Default)]
pub struct LoggingQueueClient;

pub struct LoggingQueueChannel {
    server: String,
}

#[async_trait]
impl QueueClient for LoggingQueueClient {
    type Channel = LoggingQueueChannel;

    async fn connect(&self, server: &str) -> Result<Self::Channel, SinkError> {
        debug!(server, "connect");
        Ok(LoggingQueueChannel {
            server: server.to_string(),
        })
    }
}

#[async_trait]
impl QueueChannel for LoggingQueueChannel {
    async fn declare_exchange(&mut self, exchange: &str) -> Result<(), SinkError> {
        debug!(server = %self.server, exchange, "declare exchange");
        Ok(())
    }

    async fn publish(
        &mut self,
        exchange: &str,
        route_key: &str,
        payload: &[u8],
        persistent: bool,
    ) -> Result<(), SinkError> {
        debug!(
            server = %self.server,
            exchange,
            route_key,
            persistent,
            payload_len = payload.len(),
            "publish"
        );
        Ok(())
    }
}
