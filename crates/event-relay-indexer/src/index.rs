// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};

/// How an event's timestamp maps to the search index it lands in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexStrategy {
    /// One index per day, named `{prefix}-YYYY-MM-DD`.
    Daily { prefix: String },
    /// One index per month, named `YYYY-MM`.
    Monthly,
}

impl IndexStrategy {
    pub fn index_for(&self, time: DateTime<Utc>) -> String {
        match self {
            IndexStrategy::Daily { prefix } => format!("{prefix}-{}", time.format("%Y-%m-%d")),
            IndexStrategy::Monthly => time.format("%Y-%m").to_string(),
        }
    }
}
