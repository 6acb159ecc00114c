// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Batched read and write dispatch.
//!
//! One application request addressing N nodes becomes one batched service
//! call. Per-node failures are isolated: a bad node produces a
//! position-tagged error message while its siblings are still delivered in
//! the aggregated response. Only a bad service result for the whole batch
//! (or a single-node failure) terminates the call.

use tokio::sync::Mutex;

use crate::error::{AdapterResult, OperationError};
use crate::message::{
    AdapterStatus, Command, NodeResponse, RequestMessage, ResponseKind, ResponseMessage,
    ValuePayload,
};
use crate::queue::QueueSender;
use crate::session::ClientSession;
use crate::transport::{ReadAttribute, ReadValueId, WriteValue};
use crate::value::ValueCodec;

/// Error text for a bad per-node result in a multi-node batch.
pub(crate) fn position_error_text(position: usize) -> String {
    format!("Bad service result for the node at position({})", position)
}

/// Error text for a bad result when the batch held a single node.
pub(crate) const SINGLE_NODE_ERROR: &str = "Bad service result for the given node";

/// Error text when a multi-node batch produced nothing deliverable.
pub(crate) const NO_VALID_RESPONSES: &str = "There are no valid responses.";

// =============================================================================
// Read
// =============================================================================

/// Executes a read request and enqueues the outcome.
///
/// The command selects the attribute: `Read` reads Value,
/// `ReadSamplingInterval` reads MinimumSamplingInterval. Both timestamps are
/// requested from the server.
pub(crate) async fn execute_read(
    session: &ClientSession,
    publish_lock: &Mutex<()>,
    sender: &QueueSender,
    msg: &RequestMessage,
) -> AdapterResult<()> {
    let attribute = match msg.command {
        Command::ReadSamplingInterval => ReadAttribute::MinimumSamplingInterval,
        _ => ReadAttribute::Value,
    };

    let batch: Vec<ReadValueId> = msg
        .requests
        .iter()
        .map(|req| ReadValueId {
            node_id: req.node.node_id.clone(),
            attribute,
        })
        .collect();

    tracing::debug!(
        endpoint = %msg.endpoint,
        nodes = batch.len(),
        attribute = ?attribute,
        "issuing read"
    );

    let results = {
        let _serialized = serialize_against_publish(session, publish_lock).await;
        session.services().read(&batch).await
    };

    let results = match results {
        Ok(results) => results,
        Err(status) => {
            tracing::error!(endpoint = %msg.endpoint, status = %status, "read service failed");
            sender.enqueue(
                ResponseMessage::error(
                    msg.message_id,
                    &msg.endpoint,
                    AdapterStatus::ServiceResultBad,
                    "Error in read.",
                )
                .with_command(msg.command),
            );
            return Ok(());
        }
    };

    if results.len() != msg.requests.len() {
        sender.enqueue(
            ResponseMessage::error(
                msg.message_id,
                &msg.endpoint,
                AdapterStatus::InternalError,
                "Read result count does not match the request",
            )
            .with_command(msg.command),
        );
        return Ok(());
    }

    let codec = ValueCodec::new();
    let mut response = ResponseMessage::new(msg.message_id, &msg.endpoint, ResponseKind::GeneralResponse)
        .with_command(msg.command);

    for (i, (req, result)) in msg.requests.iter().zip(results.iter()).enumerate() {
        if !result.status.is_good() {
            tracing::warn!(
                node = %req.node.node_id,
                status = %result.status,
                "bad per-node read result"
            );
            if msg.requests.len() == 1 {
                sender.enqueue(
                    ResponseMessage::error(
                        msg.message_id,
                        &msg.endpoint,
                        AdapterStatus::Error,
                        SINGLE_NODE_ERROR,
                    )
                    .with_error_node(req.node.clone())
                    .with_command(msg.command),
                );
                return Ok(());
            }
            sender.enqueue(
                ResponseMessage::error(
                    msg.message_id,
                    &msg.endpoint,
                    AdapterStatus::Error,
                    position_error_text(i),
                )
                .with_error_node(req.node.clone())
                .with_command(msg.command),
            );
            continue;
        }

        let Some(variant) = result.value.as_ref() else {
            sender.enqueue(
                ResponseMessage::error(
                    msg.message_id,
                    &msg.endpoint,
                    AdapterStatus::Error,
                    position_error_text(i),
                )
                .with_error_node(req.node.clone())
                .with_command(msg.command),
            );
            continue;
        };

        match codec.decode(variant) {
            Ok(value) => {
                response.responses.push(NodeResponse::with_value(
                    req.node.clone(),
                    i,
                    ValuePayload::new(value),
                ));
            }
            Err(e) => {
                tracing::warn!(node = %req.node.node_id, error = %e, "undecodable read value");
                sender.enqueue(
                    ResponseMessage::error(
                        msg.message_id,
                        &msg.endpoint,
                        AdapterStatus::Error,
                        e.to_string(),
                    )
                    .with_error_node(req.node.clone())
                    .with_command(msg.command),
                );
            }
        }
    }

    if response.responses.is_empty() {
        tracing::warn!(endpoint = %msg.endpoint, "read produced no valid responses");
        sender.enqueue(
            ResponseMessage::error(
                msg.message_id,
                &msg.endpoint,
                AdapterStatus::Error,
                NO_VALID_RESPONSES,
            )
            .with_command(msg.command),
        );
        return Ok(());
    }

    sender.enqueue(response);
    Ok(())
}

// =============================================================================
// Write
// =============================================================================

/// Executes a write request and enqueues the outcome.
///
/// Every request element must carry a typed value; a missing value is a
/// synchronous precondition failure before any service call is issued.
pub(crate) async fn execute_write(
    session: &ClientSession,
    publish_lock: &Mutex<()>,
    sender: &QueueSender,
    msg: &RequestMessage,
) -> AdapterResult<()> {
    let codec = ValueCodec::new();

    let mut batch = Vec::with_capacity(msg.requests.len());
    for req in &msg.requests {
        let value = req.value.as_ref().ok_or_else(|| {
            OperationError::MissingWriteValue {
                node: req.node.node_id.to_string(),
            }
        })?;
        batch.push(WriteValue {
            node_id: req.node.node_id.clone(),
            value: codec.encode(value)?,
        });
    }

    tracing::debug!(endpoint = %msg.endpoint, nodes = batch.len(), "issuing write");

    let results = {
        let _serialized = serialize_against_publish(session, publish_lock).await;
        session.services().write(&batch).await
    };

    let results = match results {
        Ok(results) => results,
        Err(status) => {
            tracing::error!(endpoint = %msg.endpoint, status = %status, "write service failed");
            sender.enqueue(
                ResponseMessage::error(
                    msg.message_id,
                    &msg.endpoint,
                    AdapterStatus::ServiceResultBad,
                    "Error in write.",
                )
                .with_command(msg.command),
            );
            return Ok(());
        }
    };

    if results.len() != msg.requests.len() {
        sender.enqueue(
            ResponseMessage::error(
                msg.message_id,
                &msg.endpoint,
                AdapterStatus::InternalError,
                "Write result count does not match the request",
            )
            .with_command(msg.command),
        );
        return Ok(());
    }

    let mut response = ResponseMessage::new(msg.message_id, &msg.endpoint, ResponseKind::GeneralResponse)
        .with_command(msg.command);

    for (i, (req, status)) in msg.requests.iter().zip(results.iter()).enumerate() {
        if !status.is_good() {
            tracing::warn!(
                node = %req.node.node_id,
                status = %status,
                "bad per-node write result"
            );
            if msg.requests.len() == 1 {
                sender.enqueue(
                    ResponseMessage::error(
                        msg.message_id,
                        &msg.endpoint,
                        AdapterStatus::Error,
                        SINGLE_NODE_ERROR,
                    )
                    .with_error_node(req.node.clone())
                    .with_command(msg.command),
                );
                return Ok(());
            }
            sender.enqueue(
                ResponseMessage::error(
                    msg.message_id,
                    &msg.endpoint,
                    AdapterStatus::Error,
                    position_error_text(i),
                )
                .with_error_node(req.node.clone())
                .with_command(msg.command),
            );
            continue;
        }

        // Echo the accepted value so the response vector stays aligned with
        // the accepted subset of the request.
        let payload = req
            .value
            .clone()
            .map(ValuePayload::new)
            .unwrap_or_else(|| ValuePayload::text("ok"));
        response
            .responses
            .push(NodeResponse::with_value(req.node.clone(), i, payload));
    }

    if response.responses.is_empty() {
        sender.enqueue(
            ResponseMessage::error(
                msg.message_id,
                &msg.endpoint,
                AdapterStatus::Error,
                NO_VALID_RESPONSES,
            )
            .with_command(msg.command),
        );
        return Ok(());
    }

    sender.enqueue(response);
    Ok(())
}

/// Takes the process-wide serialization lock when the session has live
/// subscriptions, so service traffic cannot race a publish round.
pub(crate) async fn serialize_against_publish<'a>(
    session: &ClientSession,
    publish_lock: &'a Mutex<()>,
) -> Option<tokio::sync::MutexGuard<'a, ()>> {
    if session.subscriptions().has_records() {
        Some(publish_lock.lock().await)
    } else {
        None
    }
}

// =============================================================================
// Tests
// =============================================================================
