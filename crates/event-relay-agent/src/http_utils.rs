// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::HeaderMap;
use hyper::http;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::queue_sink::QueueTarget;

/// Publish request body accepted on `/api/v1/publish`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub target: QueueTarget,
    pub message: String,
}

/// Response body for every publish request. `error_no` zero means the
/// message was accepted; anything else carries a reason in
/// `error_message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishResponse {
    pub error_no: i32,
    #[serde(default)]
    pub error_message: String,
}

impl PublishResponse {
    pub fn ok() -> Self {
        PublishResponse {
            error_no: 0,
            error_message: String::new(),
        }
    }

    pub fn error(error_no: i32, message: impl Into<String>) -> Self {
        PublishResponse {
            error_no,
            error_message: message.into(),
        }
    }
}

pub fn log_and_create_response(
    status: StatusCode,
    reply: PublishResponse,
) -> http::Result<Response<Full<Bytes>>> {
    if reply.error_no == 0 {
        debug!("publish accepted");
    } else {
        error!(error_no = reply.error_no, "{}", reply.error_message);
    }
    let body = serde_json::to_string(&reply).unwrap_or_else(|_| "{\"error_no\":-1}".to_string());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
}

/// Rejects bodies whose declared length exceeds the configured cap.
/// Returns `Some(response)` when the request must be refused.
pub fn verify_request_content_length(
    header_map: &HeaderMap,
    max_content_length: usize,
) -> Option<http::Result<Response<Full<Bytes>>>> {
    let content_length = match header_map.get(hyper::header::CONTENT_LENGTH) {
        Some(value) => value,
        None => return None,
    };
    let content_length = match content_length.to_str().ok().and_then(|v| v.parse::<usize>().ok()) {
        Some(value) => value,
        None => {
            return Some(log_and_create_response(
                StatusCode::BAD_REQUEST,
                PublishResponse::error(-1, "invalid content length header"),
            ))
        }
    };

    if content_length > max_content_length {
        return Some(log_and_create_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            PublishResponse::error(-1, "request body too large"),
        ));
    }
    None
}
