// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

use event_relay_agent::agent::RelayAgent;
use event_relay_agent::config::Config;
use event_relay_agent::queue_sink::LoggingQueueClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Arc::new(Config::from_env()?);

    let env_filter = EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // The logging client stands in for a real broker connection; swap in
    // an AMQP-backed QueueClient to publish for real.
    let agent = RelayAgent::new(config, LoggingQueueClient);
    if let Err(e) = agent.start().await {
        error!("relay agent exited with error: {e}");
        return Err(e);
    }
    Ok(())
}
