// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Retrying point-to-point sender for callers that opt out of batching.
//!
//! Sends one message immediately, retrying a bounded number of times with
//! an escalating per-attempt deadline: attempt `n` (1-based) runs under
//! `deadline_base + n` seconds, so later attempts tolerate more latency.
//! This is an intentional escalating-timeout policy, not interval
//! backoff. Shares no state with the batch aggregator.

use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use crate::errors::SendError;

/// Default number of attempts when retries are enabled.
const DEFAULT_MAX_TRIES: u32 = 2;

/// Transport seam for one immediate delivery attempt.
///
/// An implementation must return `Err` both for transport failures and
/// for application-level rejections (a non-zero error code in the
/// response); the sender treats them identically.
#[async_trait]
pub trait SendOnce: Send + Sync {
    type Message: Send + Sync;

    async fn send_once(&self, message: &Self::Message) -> Result<(), SendError>;
}

pub struct RetryingSender<T> {
    transport: T,
    max_tries: u32,
    deadline_base: Duration,
}

impl<T: SendOnce> RetryingSender<T> {
    pub fn new(transport: T, retry_enabled: bool, deadline_base: Duration) -> Self {
        let max_tries = if retry_enabled { DEFAULT_MAX_TRIES } else { 1 };
        Self::with_max_tries(transport, max_tries, deadline_base)
    }

    pub fn with_max_tries(transport: T, max_tries: u32, deadline_base: Duration) -> Self {
        RetryingSender {
            transport,
            max_tries: max_tries.max(1),
            deadline_base,
        }
    }

    /// Sends one message, returning after the first successful attempt.
    /// Fails only once every attempt has errored or timed out.
    pub async fn send(&self, message: &T::Message) -> Result<(), SendError> {
        for attempt in 1..=self.max_tries {
            let deadline = self.deadline_base + Duration::from_secs(u64::from(attempt));
            match tokio::time::timeout(deadline, self.transport.send_once(message)).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => {
                    warn!(attempt, "send attempt failed: {e}");
                }
                Err(_) => {
                    warn!(attempt, "send attempt timed out after {deadline:?}");
                }
            }
        }

        Err(SendError::Exhausted {
            tries: self.max_tries,
        })
    }
}
