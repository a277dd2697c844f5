// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The relay agent: an HTTP front door that accepts publish requests and
//! moves them toward the queue broker in direct or batch mode.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::http;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use event_relay_core::aggregator::{AggregatorHandle, AggregatorService};
use event_relay_core::errors::AggregatorError;
use event_relay_core::sender::RetryingSender;

use crate::config::{Config, RelayMode};
use crate::http_utils::{
    log_and_create_response, verify_request_content_length, PublishRequest, PublishResponse,
};
use crate::queue_sink::{DirectQueuePublisher, QueueClient, QueueMessage, QueuePublishSink};

const PUBLISH_ENDPOINT: &str = "/api/v1/publish";
const INFO_ENDPOINT: &str = "/info";

/// The delivery path publish requests are dispatched to, fixed at
/// startup from the configured mode.
pub enum Delivery<C: QueueClient> {
    Direct(Arc<RetryingSender<DirectQueuePublisher<C>>>),
    Batch(AggregatorHandle<QueueMessage>),
    /// Accept and acknowledge, publish nothing.
    Disabled,
}

impl<C: QueueClient> Clone for Delivery<C> {
    fn clone(&self) -> Self {
        match self {
            Delivery::Direct(sender) => Delivery::Direct(Arc::clone(sender)),
            Delivery::Batch(handle) => Delivery::Batch(handle.clone()),
            Delivery::Disabled => Delivery::Disabled,
        }
    }
}

pub struct RelayAgent<C: QueueClient> {
    config: Arc<Config>,
    client: C,
}

impl<C: QueueClient + Clone> RelayAgent<C> {
    pub fn new(config: Arc<Config>, client: C) -> Self {
        RelayAgent { config, client }
    }

    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.listen_port));
        let listener = TcpListener::bind(&addr).await?;
        info!(mode = ?self.config.mode, "relay agent listening on {addr}");
        self.serve(listener).await
    }

    /// Serves connections from an already-bound listener. Split from
    /// `start` so tests can bind port 0.
    pub async fn serve(
        self,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (delivery, aggregator_task) = self.build_delivery();
        let config = Arc::clone(&self.config);
        let service = service_fn(move |req| {
            endpoint_handler(Arc::clone(&config), delivery.clone(), req)
        });
        serve_tcp(listener, service, aggregator_task).await
    }

    fn build_delivery(
        &self,
    ) -> (Delivery<C>, Option<JoinHandle<Result<(), AggregatorError>>>) {
        if self.config.disable_deliver {
            info!("delivery disabled, accepted messages will be discarded");
            return (Delivery::Disabled, None);
        }
        match self.config.mode {
            RelayMode::Batch => {
                let sink = QueuePublishSink::new(self.client.clone());
                let (service, handle) = AggregatorService::new(sink, self.config.batch_policy());
                let task = tokio::spawn(service.run());
                (Delivery::Batch(handle), Some(task))
            }
            RelayMode::Direct => {
                let publisher = DirectQueuePublisher::new(self.client.clone());
                let sender = RetryingSender::new(
                    publisher,
                    self.config.send_retry_enabled,
                    self.config.send_deadline_base,
                );
                (Delivery::Direct(Arc::new(sender)), None)
            }
        }
    }
}

async fn serve_tcp<S>(
    listener: TcpListener,
    service: S,
    mut aggregator_task: Option<JoinHandle<Result<(), AggregatorError>>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    S: hyper::service::Service<
            Request<hyper::body::Incoming>,
            Response = Response<Full<Bytes>>,
            Error = http::Error,
        > + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    let server = hyper::server::conn::http1::Builder::new();
    let mut joinset = JoinSet::new();
    loop {
        let conn = tokio::select! {
            con_res = listener.accept() => match con_res {
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    error!("server error: {e}");
                    return Err(e.into());
                }
                Ok((conn, _)) => conn,
            },
            finished = async {
                match joinset.join_next().await {
                    Some(finished) => finished,
                    None => std::future::pending().await,
                }
            } => match finished {
                Err(e) if e.is_panic() => {
                    error!("request handler panicked: {e:?}");
                    continue;
                }
                _ => continue,
            },
            // The aggregator task only returns on a fatal condition
            // (pending-queue overflow). The agent must not keep
            // accepting messages it can no longer deliver.
            result = async {
                match aggregator_task.as_mut() {
                    Some(task) => task.await,
                    None => std::future::pending().await,
                }
            } => {
                error!("batch aggregator terminated: {result:?}");
                return Err("batch aggregator terminated unexpectedly".into());
            },
        };
        let conn = TokioIo::new(conn);
        let server = server.clone();
        let service = service.clone();
        joinset.spawn(async move {
            if let Err(e) = server.serve_connection(conn, service).await {
                debug!("connection closed with error: {e}");
            }
        });
    }
}

/// Routes one request. Generic over the body type so tests can drive it
/// without a socket.
pub async fn endpoint_handler<C, B>(
    config: Arc<Config>,
    delivery: Delivery<C>,
    req: Request<B>,
) -> http::Result<Response<Full<Bytes>>>
where
    C: QueueClient,
    B: Body + Send,
    B::Data: Send,
    B::Error: std::fmt::Display,
{
    match (req.method(), req.uri().path()) {
        (&Method::POST, PUBLISH_ENDPOINT) => publish_handler(config, delivery, req).await,
        (_, INFO_ENDPOINT) => info_handler(&config),
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::new())),
    }
}

async fn publish_handler<C, B>(
    config: Arc<Config>,
    delivery: Delivery<C>,
    req: Request<B>,
) -> http::Result<Response<Full<Bytes>>>
where
    C: QueueClient,
    B: Body + Send,
    B::Data: Send,
    B::Error: std::fmt::Display,
{
    if let Some(response) =
        verify_request_content_length(req.headers(), config.max_request_content_length)
    {
        return response;
    }

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return log_and_create_response(
                StatusCode::BAD_REQUEST,
                PublishResponse::error(-1, format!("error reading request body: {e}")),
            );
        }
    };

    let request: PublishRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return log_and_create_response(
                StatusCode::BAD_REQUEST,
                PublishResponse::error(-1, format!("error deserializing publish request: {e}")),
            );
        }
    };

    let message = QueueMessage {
        target: request.target,
        payload: Bytes::from(request.message.into_bytes()),
    };

    let reply = match delivery {
        Delivery::Disabled => {
            debug!("delivery disabled, discarding message");
            PublishResponse::ok()
        }
        // Fire and forget: hand the message to the aggregator and
        // acknowledge. Delivery outcome is not reported back.
        Delivery::Batch(handle) => match handle.submit(message).await {
            Ok(()) => PublishResponse::ok(),
            Err(e) => PublishResponse::error(1, format!("message not accepted: {e}")),
        },
        Delivery::Direct(sender) => match sender.send(&message).await {
            Ok(()) => PublishResponse::ok(),
            Err(e) => PublishResponse::error(1, format!("send failed: {e}")),
        },
    };

    log_and_create_response(StatusCode::OK, reply)
}

fn info_handler(config: &Config) -> http::Result<Response<Full<Bytes>>> {
    let info = json!({
        "name": "event-relay-agent",
        "mode": format!("{:?}", config.mode).to_lowercase(),
        "port": config.listen_port,
        "endpoints": [PUBLISH_ENDPOINT, INFO_ENDPOINT],
    });
    let body = info.to_string();
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
}
