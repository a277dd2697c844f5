// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use std::fmt::Debug;
use std::hash::Hash;

use crate::errors::SinkError;

/// Delivery seam between the batch aggregator and an external system.
///
/// A sink owns the protocol details for one kind of destination: the
/// aggregator only derives a grouping key per item and hands over one
/// ordered batch per destination per flush. Implementations must not
/// retry on their own; a failed flush is reported back and handled by the
/// aggregator's failure policy.
#[async_trait]
pub trait BatchSink: Send + Sync + 'static {
    type Item: Send + 'static;
    type Key: Eq + Hash + Clone + Debug + Send + Sync + 'static;

    /// Derives the destination key an item is grouped under.
    fn key(&self, item: &Self::Item) -> Self::Key;

    /// Delivers one destination's accumulated batch. Items are passed in
    /// submission order.
    async fn flush(&self, key: &Self::Key, items: &[Self::Item]) -> Result<(), SinkError>;
}
