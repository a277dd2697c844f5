// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised by sink adapters during a flush.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to connect to {destination}: {reason}")]
    Connect { destination: String, reason: String },

    #[error("failed to publish message: {0}")]
    Publish(String),

    #[error("bulk index request failed: {0}")]
    Bulk(String),
}

/// Errors surfaced by the batch aggregator service.
#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    /// The pending batch for one destination grew past the hard safety
    /// limit, meaning the sink has been failing or stalling for many
    /// cycles. Fatal for the owning service task.
    #[error("pending batch for {destination} reached overflow limit: {count} items (limit {limit})")]
    Overflow {
        destination: String,
        count: usize,
        limit: usize,
    },

    #[error("aggregator service is not running")]
    ServiceStopped,
}

/// Errors returned by the retrying point-to-point sender and its
/// transports.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rejected by destination: code {code}: {message}")]
    Rejected { code: i32, message: String },

    #[error("send failed after {tries} tries")]
    Exhausted { tries: u32 },
}
