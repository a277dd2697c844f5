// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client for producers publishing through a remote relay agent.

use async_trait::async_trait;

use event_relay_core::errors::SendError;
use event_relay_core::sender::SendOnce;

use crate::http_utils::{PublishRequest, PublishResponse};
use crate::queue_sink::QueueMessage;

pub struct RelayClient {
    endpoint: String,
    client: reqwest::Client,
}

impl RelayClient {
    pub fn new(relay_url: &str) -> Self {
        RelayClient {
            endpoint: format!("{}/api/v1/publish", relay_url.trim_end_matches('/')),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SendOnce for RelayClient {
    type Message = QueueMessage;

    async fn send_once(&self, message: &QueueMessage) -> Result<(), SendError> {
        let request = PublishRequest {
            target: message.target.clone(),
            message: String::from_utf8_lossy(&message.payload).into_owned(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SendError::Transport(format!(
                "relay returned status {status}"
            )));
        }

        let reply: PublishResponse = response
            .json()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;
        if reply.error_no != 0 {
            return Err(SendError::Rejected {
                code: reply.error_no,
                message: reply.error_message,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue_sink::QueueTarget;
    use bytes::Bytes;

    fn queue_message() -> QueueMessage {
        QueueMessage {
            target: QueueTarget {
                server: "amqp://broker:5672".to_string(),
                exchange: "events".to_string(),
                route_key: "ecflow.log".to_string(),
            },
            payload: Bytes::from_static(b"{\"app\":\"workflow-client\"}"),
        }
    }

    #[tokio::test]
    async fn test_send_once_accepted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/publish")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_body("{\"error_no\":0,\"error_message\":\"\"}")
            .create_async()
            .await;

        let client = RelayClient::new(&server.url());
        client.send_once(&queue_message()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_once_rejected_by_relay() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/publish")
            .with_status(200)
            .with_body("{\"error_no\":2,\"error_message\":\"publish failed\"}")
            .create_async()
            .await;

        let client = RelayClient::new(&server.url());
        let result = client.send_once(&queue_message()).await;
        assert!(matches!(
            result,
            Err(SendError::Rejected { code: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_send_once_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/publish")
            .with_status(500)
            .create_async()
            .await;

        let client = RelayClient::new(&server.url());
        let result = client.send_once(&queue_message()).await;
        assert!(matches!(result, Err(SendError::Transport(_))));
    }

    #[tokio::test]
    async fn test_endpoint_normalizes_trailing_slash() {
        let client = RelayClient::new("http://relay:33383/");
        assert_eq!(client.endpoint, "http://relay:33383/api/v1/publish");
    }
}
