// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Worker pool draining an event source into the search index.
//!
//! Each worker is fully independent: it owns its own HTTP client, its own
//! aggregator with its own wait window, and competes with its siblings
//! for messages from the shared source. A batch therefore never mixes
//! events pulled by different workers.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, warn};

use event_relay_core::aggregator::{AggregatorHandle, AggregatorService};
use event_relay_core::envelope::EventMessage;
use event_relay_core::errors::AggregatorError;

use crate::bulk_sink::{IndexBulkSink, IndexedEvent};
use crate::config::IndexerConfig;
use crate::index::IndexStrategy;

/// Source of raw event payloads, shared by every worker. Implementations
/// acknowledge on hand-off; delivery to the index is at-most-once.
#[async_trait]
pub trait EventSource: Send + Sync + 'static {
    /// Next payload, or `None` once the source is closed and drained.
    async fn next(&self) -> Option<Bytes>;
}

/// Event source backed by an in-process channel. Workers compete for
/// messages through the shared receiver.
#[derive(Clone)]
pub struct ChannelSource {
    rx: Arc<Mutex<mpsc::Receiver<Bytes>>>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        ChannelSource {
            rx: Arc::new(Mutex::new(rx)),
        }
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn next(&self) -> Option<Bytes> {
        self.rx.lock().await.recv().await
    }
}

pub struct WorkerPool {
    workers: JoinSet<Result<(), AggregatorError>>,
}

impl WorkerPool {
    /// Spawns `worker_count` independent workers draining `source`.
    pub fn start<S>(config: &IndexerConfig, source: S) -> Self
    where
        S: EventSource + Clone,
    {
        let mut workers = JoinSet::new();
        for worker_id in 0..config.worker_count {
            let sink = IndexBulkSink::new(&config.elastic_url);
            let (service, handle) = AggregatorService::new(sink, config.batch_policy());
            let service_task = tokio::spawn(service.run());
            workers.spawn(run_worker(
                worker_id,
                source.clone(),
                config.index.clone(),
                handle,
                service_task,
            ));
        }
        WorkerPool { workers }
    }

    /// Waits for every worker to finish. Returns the first fatal error;
    /// a worker failing is fatal for the whole pool.
    pub async fn join(mut self) -> Result<(), anyhow::Error> {
        while let Some(finished) = self.workers.join_next().await {
            match finished {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("worker terminated: {e}");
                    return Err(e.into());
                }
                Err(e) => {
                    error!("worker panicked: {e}");
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }
}

async fn run_worker<S: EventSource>(
    worker_id: usize,
    source: S,
    index: IndexStrategy,
    handle: AggregatorHandle<IndexedEvent>,
    mut service_task: JoinHandle<Result<(), AggregatorError>>,
) -> Result<(), AggregatorError> {
    debug!(worker_id, "worker started");

    loop {
        tokio::select! {
            received = source.next() => match received {
                Some(payload) => {
                    let event: EventMessage = match serde_json::from_slice(&payload) {
                        Ok(event) => event,
                        // Malformed payloads are skipped, not fatal; the
                        // message was already acknowledged at hand-off.
                        Err(e) => {
                            warn!(worker_id, "skipping malformed event: {e}");
                            continue;
                        }
                    };
                    let indexed = IndexedEvent {
                        index: index.index_for(event.time),
                        event,
                    };
                    if handle.submit(indexed).await.is_err() {
                        return finish(worker_id, service_task).await;
                    }
                }
                None => {
                    debug!(worker_id, "source closed, draining");
                    let _ = handle.shutdown().await;
                    return finish(worker_id, service_task).await;
                }
            },
            result = &mut service_task => {
                error!(worker_id, "aggregator terminated: {result:?}");
                return match result {
                    Ok(outcome) => outcome,
                    Err(_) => Err(AggregatorError::ServiceStopped),
                };
            }
        }
    }
}

async fn finish(
    worker_id: usize,
    service_task: JoinHandle<Result<(), AggregatorError>>,
) -> Result<(), AggregatorError> {
    let outcome = match service_task.await {
        Ok(outcome) => outcome,
        Err(_) => Err(AggregatorError::ServiceStopped),
    };
    debug!(worker_id, "worker stopped");
    outcome
}
