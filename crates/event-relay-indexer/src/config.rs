// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::str::FromStr;
use std::time::Duration;

use event_relay_core::aggregator::{BatchPolicy, FailurePolicy};

use crate::index::IndexStrategy;

const DEFAULT_ELASTIC_URL: &str = "http://localhost:9200";
const DEFAULT_BULK_SIZE: usize = 20;
const DEFAULT_BULK_WAIT_SECS: u64 = 1;
const DEFAULT_WORKER_COUNT: usize = 2;
const DEFAULT_INDEX_PREFIX: &str = "ecflow-client";

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub elastic_url: String,
    pub bulk_size: usize,
    pub bulk_wait: Duration,
    pub worker_count: usize,
    pub index: IndexStrategy,
    pub log_level: String,
}

impl IndexerConfig {
    pub fn from_env() -> Result<IndexerConfig, anyhow::Error> {
        let elastic_url =
            env::var("INDEXER_ELASTIC_URL").unwrap_or_else(|_| DEFAULT_ELASTIC_URL.to_string());
        let bulk_size = parse_env("INDEXER_BULK_SIZE")?.unwrap_or(DEFAULT_BULK_SIZE);
        let bulk_wait_secs = parse_env("INDEXER_BULK_WAIT_SECS")?.unwrap_or(DEFAULT_BULK_WAIT_SECS);
        let worker_count = parse_env("INDEXER_WORKER_COUNT")?.unwrap_or(DEFAULT_WORKER_COUNT);
        let prefix = env::var("INDEXER_INDEX_PREFIX")
            .unwrap_or_else(|_| DEFAULT_INDEX_PREFIX.to_string());
        let index = match env::var("INDEXER_INDEX_GRANULARITY") {
            Ok(value) => match value.to_lowercase().as_str() {
                "daily" => IndexStrategy::Daily { prefix },
                "monthly" => IndexStrategy::Monthly,
                other => return Err(anyhow::anyhow!("invalid index granularity: {other}")),
            },
            Err(_) => IndexStrategy::Daily { prefix },
        };
        let log_level = env::var("INDEXER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        if bulk_size == 0 {
            return Err(anyhow::anyhow!("INDEXER_BULK_SIZE must be greater than zero"));
        }
        if worker_count == 0 {
            return Err(anyhow::anyhow!(
                "INDEXER_WORKER_COUNT must be greater than zero"
            ));
        }

        Ok(IndexerConfig {
            elastic_url,
            bulk_size,
            bulk_wait: Duration::from_secs(bulk_wait_secs),
            worker_count,
            index,
            log_level,
        })
    }

    /// Policy for each worker's aggregator. Failed bulks are retained and
    /// retried with the next flush; indexing prefers late over lost.
    pub fn batch_policy(&self) -> BatchPolicy {
        BatchPolicy {
            max_batch_size: self.bulk_size,
            max_wait: self.bulk_wait,
            on_failure: FailurePolicy::Retain,
        }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>, anyhow::Error>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid value for {name}: {e}")),
        Err(_) => Ok(None),
    }
}
