// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Search-index egress: one `_bulk` request per flushed batch.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use event_relay_core::envelope::EventMessage;
use event_relay_core::errors::SinkError;
use event_relay_core::sink::BatchSink;

/// One event paired with the index it belongs in, derived from its
/// timestamp before submission.
#[derive(Debug, Clone)]
pub struct IndexedEvent {
    pub index: String,
    pub event: EventMessage,
}

/// Batch sink that writes a whole batch with a single NDJSON `_bulk`
/// request. A batch may span indices; each action line names its own.
pub struct IndexBulkSink {
    bulk_endpoint: String,
    client: reqwest::Client,
}

impl IndexBulkSink {
    pub fn new(elastic_url: &str) -> Self {
        IndexBulkSink {
            bulk_endpoint: format!("{}/_bulk", elastic_url.trim_end_matches('/')),
            client: reqwest::Client::new(),
        }
    }

    fn encode(items: &[IndexedEvent]) -> Result<String, SinkError> {
        let mut body = String::new();
        for item in items {
            let action = json!({ "index": { "_index": item.index } });
            body.push_str(&action.to_string());
            body.push('\n');
            let source = serde_json::to_string(&item.event)
                .map_err(|e| SinkError::Bulk(format!("failed to encode event: {e}")))?;
            body.push_str(&source);
            body.push('\n');
        }
        Ok(body)
    }
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
}

#[async_trait]
impl BatchSink for IndexBulkSink {
    type Item = IndexedEvent;
    // All events go to the one configured cluster; the per-event index
    // rides in the action line, not the grouping key.
    type Key = ();

    fn key(&self, _item: &IndexedEvent) -> Self::Key {}

    async fn flush(&self, _key: &(), items: &[IndexedEvent]) -> Result<(), SinkError> {
        let body = Self::encode(items)?;

        let response = self
            .client
            .post(&self.bulk_endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| SinkError::Bulk(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Bulk(format!(
                "bulk request returned status {status}"
            )));
        }

        // Any per-item error fails the whole batch; the caller's failure
        // policy decides whether it is retried.
        let reply: BulkResponse = response
            .json()
            .await
            .map_err(|e| SinkError::Bulk(format!("failed to decode bulk response: {e}")))?;
        if reply.errors {
            return Err(SinkError::Bulk("bulk response reported item errors".to_string()));
        }
        Ok(())
    }
}
