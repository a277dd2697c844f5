// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod bulk_sink;
pub mod config;
pub mod index;
pub mod worker;
