// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use event_relay_agent::agent::RelayAgent;
use event_relay_agent::config::{Config, RelayMode};
use event_relay_agent::http_utils::{PublishRequest, PublishResponse};
use event_relay_agent::queue_sink::{QueueChannel, QueueClient, QueueTarget};
use event_relay_agent::relay_client::RelayClient;
use event_relay_core::errors::SinkError;
use event_relay_core::sender::RetryingSender;

#[derive(Clone, Default)]
struct CapturingQueueClient {
    published: Arc<Mutex<Vec<(String, String, Vec<u8>)>>>,
}

struct CapturingQueueChannel {
    published: Arc<Mutex<Vec<(String, String, Vec<u8>)>>>,
}

#[async_trait]
impl QueueClient for CapturingQueueClient {
    type Channel = CapturingQueueChannel;

    async fn connect(&self, _server: &str) -> Result<Self::Channel, SinkError> {
        Ok(CapturingQueueChannel {
            published: Arc::clone(&self.published),
        })
    }
}

#[async_trait]
impl QueueChannel for CapturingQueueChannel {
    async fn declare_exchange(&mut self, _exchange: &str) -> Result<(), SinkError> {
        Ok(())
    }

    async fn publish(
        &mut self,
        exchange: &str,
        route_key: &str,
        payload: &[u8],
        _persistent: bool,
    ) -> Result<(), SinkError> {
        self.published.lock().unwrap().push((
            exchange.to_string(),
            route_key.to_string(),
            payload.to_vec(),
        ));
        Ok(())
    }
}

fn config(mode: RelayMode) -> Arc<Config> {
    Arc::new(Config {
        listen_port: 0,
        mode,
        disable_deliver: false,
        batch_size: 100,
        batch_wait: Duration::from_millis(500),
        send_retry_enabled: true,
        send_deadline_base: Duration::from_secs(1),
        max_request_content_length: 10 * 1024 * 1024,
        log_level: "debug".to_string(),
    })
}

async fn spawn_agent(mode: RelayMode, client: CapturingQueueClient) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let agent = RelayAgent::new(config(mode), client);
    tokio::spawn(agent.serve(listener));
    format!("http://{addr}")
}

fn publish_request(route_key: &str, message: &str) -> PublishRequest {
    PublishRequest {
        target: QueueTarget {
            server: "amqp://broker:5672".to_string(),
            exchange: "events".to_string(),
            route_key: route_key.to_string(),
        },
        message: message.to_string(),
    }
}

#[tokio::test]
async fn test_batch_mode_accepts_then_flushes_on_window() {
    let client = CapturingQueueClient::default();
    let url = spawn_agent(RelayMode::Batch, client.clone()).await;

    let http = reqwest::Client::new();
    for n in 0..3 {
        let response = http
            .post(format!("{url}/api/v1/publish"))
            .json(&publish_request("ecflow.log", &format!("message-{n}")))
            .send()
            .await
            .unwrap();
        let reply: PublishResponse = response.json().await.unwrap();
        assert_eq!(reply.error_no, 0);
    }

    // Nothing is on the broker until the wait window elapses.
    assert!(client.published.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let published = client.published.lock().unwrap().clone();
    assert_eq!(published.len(), 3);
    assert_eq!(published[0].2, b"message-0");
    assert_eq!(published[2].2, b"message-2");
}

#[tokio::test]
async fn test_direct_mode_publishes_before_replying() {
    let client = CapturingQueueClient::default();
    let url = spawn_agent(RelayMode::Direct, client.clone()).await;

    let http = reqwest::Client::new();
    let response = http
        .post(format!("{url}/api/v1/publish"))
        .json(&publish_request("ecflow.command", "init"))
        .send()
        .await
        .unwrap();
    let reply: PublishResponse = response.json().await.unwrap();
    assert_eq!(reply.error_no, 0);

    let published = client.published.lock().unwrap().clone();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].1, "ecflow.command");
}

#[tokio::test]
async fn test_relay_client_round_trip_through_live_agent() {
    let client = CapturingQueueClient::default();
    let url = spawn_agent(RelayMode::Direct, client.clone()).await;

    let sender = RetryingSender::new(RelayClient::new(&url), true, Duration::from_secs(1));
    let message = event_relay_agent::queue_sink::QueueMessage {
        target: QueueTarget {
            server: "amqp://broker:5672".to_string(),
            exchange: "events".to_string(),
            route_key: "ecflow.log".to_string(),
        },
        payload: Bytes::from_static(b"through the client"),
    };
    sender.send(&message).await.unwrap();

    let published = client.published.lock().unwrap().clone();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].2, b"through the client");
}

#[tokio::test]
async fn test_info_endpoint_reports_mode() {
    let url = spawn_agent(RelayMode::Batch, CapturingQueueClient::default()).await;

    let info: serde_json::Value = reqwest::get(format!("{url}/info"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info["mode"], "batch");
}
