// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded micro-batch aggregator.
//!
//! The aggregator implements the actor pattern: producers submit items
//! through a cloneable [`AggregatorHandle`] backed by a bounded channel,
//! and a single service task owns all accumulation state, so no locks are
//! taken on the hot path. The service multiplexes two events — "item
//! arrived" and "wait window elapsed" — and flushes each destination's
//! batch to the [`BatchSink`] when either the count threshold is crossed
//! or the window runs out, whichever happens first.
//!
//! Delivery is fire-and-forget: a failed flush never propagates back to
//! `submit` callers. What happens to the failed batch is decided by
//! [`FailurePolicy`]; either way the loss is logged with the item count so
//! operators can measure it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::errors::AggregatorError;
use crate::sink::BatchSink;

/// Hard multiple of `max_batch_size` a destination's pending batch may
/// reach before the service aborts instead of growing further.
pub const OVERFLOW_FACTOR: usize = 10;

/// Capacity of the producer hand-off channel. Producers only block when
/// this many items are already queued for the service task.
const SUBMIT_CHANNEL_CAPACITY: usize = 10;

/// What to do with a batch whose flush failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Discard the batch. At-most-once delivery with documented loss.
    Drop,
    /// Put the batch back in the pending buffer ahead of newer items; it
    /// rides along with the next flush trigger. Sustained failure then
    /// trips the overflow guard.
    Retain,
}

/// Flush-triggering policy, constant for the lifetime of one aggregator
/// instance.
#[derive(Debug, Clone, Copy)]
pub struct BatchPolicy {
    /// A destination flushes as soon as its pending count strictly
    /// exceeds this, so one flushed batch holds at most
    /// `max_batch_size + 1` items.
    pub max_batch_size: usize,
    /// Maximum time a non-empty batch may sit unflushed.
    pub max_wait: Duration,
    pub on_failure: FailurePolicy,
}

impl BatchPolicy {
    pub fn overflow_limit(&self) -> usize {
        self.max_batch_size * OVERFLOW_FACTOR
    }
}

#[derive(Debug)]
enum AggregatorCommand<T> {
    Submit(T),
    Shutdown,
}

/// Handle for submitting items to a running aggregator service.
///
/// Cloneable; safe to share across producer tasks.
pub struct AggregatorHandle<T> {
    tx: mpsc::Sender<AggregatorCommand<T>>,
}

impl<T> Clone for AggregatorHandle<T> {
    fn clone(&self) -> Self {
        AggregatorHandle {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send> AggregatorHandle<T> {
    /// Enqueues one item for aggregation. Blocks only while the hand-off
    /// channel is at capacity; never waits for a flush.
    pub async fn submit(&self, item: T) -> Result<(), AggregatorError> {
        self.tx
            .send(AggregatorCommand::Submit(item))
            .await
            .map_err(|_| AggregatorError::ServiceStopped)
    }

    /// Asks the service to drain pending batches with a final flush and
    /// stop.
    pub async fn shutdown(&self) -> Result<(), AggregatorError> {
        self.tx
            .send(AggregatorCommand::Shutdown)
            .await
            .map_err(|_| AggregatorError::ServiceStopped)
    }
}

/// Aggregator service that owns the pending batches and processes
/// submissions until shutdown or a fatal overflow.
pub struct AggregatorService<S: BatchSink> {
    sink: Arc<S>,
    policy: BatchPolicy,
    pending: HashMap<S::Key, Vec<S::Item>>,
    rx: mpsc::Receiver<AggregatorCommand<S::Item>>,
}

impl<S: BatchSink> AggregatorService<S> {
    /// Returns the service (to be spawned) and a handle (to submit
    /// items).
    pub fn new(sink: S, policy: BatchPolicy) -> (Self, AggregatorHandle<S::Item>) {
        Self::new_shared(Arc::new(sink), policy)
    }

    /// Like [`AggregatorService::new`] for callers that keep their own
    /// reference to the sink.
    pub fn new_shared(sink: Arc<S>, policy: BatchPolicy) -> (Self, AggregatorHandle<S::Item>) {
        let (tx, rx) = mpsc::channel(SUBMIT_CHANNEL_CAPACITY);

        let service = Self {
            sink,
            policy,
            pending: HashMap::new(),
            rx,
        };
        let handle = AggregatorHandle { tx };

        (service, handle)
    }

    /// Runs the service until shutdown. Should be called in a spawned
    /// task.
    ///
    /// Returns `Err` only on the overflow condition, which the owning
    /// process must treat as fatal rather than restart silently.
    pub async fn run(mut self) -> Result<(), AggregatorError> {
        debug!("batch aggregator started");

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(AggregatorCommand::Submit(item)) => {
                        let key = self.sink.key(&item);
                        let batch = self.pending.entry(key.clone()).or_default();
                        batch.push(item);

                        if batch.len() > self.policy.max_batch_size {
                            self.flush_destination(&key).await;
                        }
                        self.check_overflow()?;
                    }
                    // Closed channel means every handle is gone; drain
                    // like an explicit shutdown.
                    Some(AggregatorCommand::Shutdown) | None => {
                        self.flush_all().await;
                        debug!("batch aggregator stopped");
                        return Ok(());
                    }
                },
                // Re-armed every iteration: the window measures time
                // since the last submission or flush, and an aggregator
                // with nothing pending wakes up to a no-op.
                _ = tokio::time::sleep(self.policy.max_wait) => {
                    self.flush_all().await;
                    self.check_overflow()?;
                }
            }
        }
    }

    /// Flushes one destination inline (size-triggered path).
    async fn flush_destination(&mut self, key: &S::Key) {
        if let Some(items) = self.pending.remove(key) {
            let result = self.sink.flush(key, &items).await;
            self.settle(key.clone(), items, result.err());
        }
    }

    /// Flushes every non-empty destination, concurrently so one slow or
    /// failing destination does not delay the others in the same cycle.
    async fn flush_all(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let batches: Vec<(S::Key, Vec<S::Item>)> = self.pending.drain().collect();
        let mut tasks = Vec::with_capacity(batches.len());
        for (key, items) in batches {
            let sink = Arc::clone(&self.sink);
            tasks.push(tokio::spawn(async move {
                let result = sink.flush(&key, &items).await;
                (key, items, result)
            }));
        }

        for task in tasks {
            match task.await {
                Ok((key, items, result)) => self.settle(key, items, result.err()),
                Err(e) => error!("flush task failed to complete: {e}"),
            }
        }
    }

    fn settle(&mut self, key: S::Key, items: Vec<S::Item>, error: Option<crate::errors::SinkError>) {
        let count = items.len();
        match error {
            None => debug!(destination = ?key, count, "flushed batch"),
            Some(e) => match self.policy.on_failure {
                FailurePolicy::Drop => {
                    error!(destination = ?key, count, "dropped batch: flush failed: {e}");
                }
                FailurePolicy::Retain => {
                    warn!(destination = ?key, count, "flush failed, batch retained: {e}");
                    // Retained items go back ahead of anything submitted
                    // since the flush started, preserving submission
                    // order.
                    let buffer = self.pending.entry(key).or_default();
                    let mut newer = std::mem::replace(buffer, items);
                    buffer.append(&mut newer);
                }
            },
        }
    }

    fn check_overflow(&self) -> Result<(), AggregatorError> {
        let limit = self.policy.overflow_limit();
        for (key, batch) in &self.pending {
            if batch.len() >= limit {
                error!(
                    destination = ?key,
                    count = batch.len(),
                    limit,
                    "pending batch exceeded overflow limit, aborting aggregator"
                );
                return Err(AggregatorError::Overflow {
                    destination: format!("{key:?}"),
                    count: batch.len(),
                    limit,
                });
            }
        }
        Ok(())
    }
}
