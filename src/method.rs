// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Method invocation.
//!
//! One request targets one method on one object node. Input arguments travel
//! encoded in request order; output arguments come back decoded through the
//! same table as read results, one response element per output.

use tokio::sync::Mutex;

use crate::error::{AdapterResult, OperationError};
use crate::message::{
    AdapterStatus, NodeResponse, RequestMessage, ResponseKind, ResponseMessage, ValuePayload,
};
use crate::queue::QueueSender;
use crate::readwrite::serialize_against_publish;
use crate::session::ClientSession;
use crate::value::ValueCodec;

/// Executes a method-call request and enqueues the outcome.
pub(crate) async fn execute_method(
    session: &ClientSession,
    publish_lock: &Mutex<()>,
    sender: &QueueSender,
    msg: &RequestMessage,
) -> AdapterResult<()> {
    let request = msg
        .requests
        .first()
        .ok_or(OperationError::EmptyRequest)?;

    let method_id = request.node.method_id.clone().ok_or_else(|| {
        OperationError::MissingMethodId {
            object: request.node.node_id.to_string(),
        }
    })?;

    let codec = ValueCodec::new();
    let mut inputs = Vec::with_capacity(request.method_inputs.len());
    for input in &request.method_inputs {
        inputs.push(codec.encode(input)?);
    }

    tracing::debug!(
        endpoint = %msg.endpoint,
        object = %request.node.node_id,
        method = %method_id,
        inputs = inputs.len(),
        "invoking method"
    );

    let outputs = {
        let _serialized = serialize_against_publish(session, publish_lock).await;
        session
            .services()
            .call_method(&request.node.node_id, &method_id, &inputs)
            .await
    };

    let outputs = match outputs {
        Ok(outputs) => outputs,
        Err(status) => {
            tracing::error!(
                endpoint = %msg.endpoint,
                method = %method_id,
                status = %status,
                "method call failed"
            );
            sender.enqueue(
                ResponseMessage::error(
                    msg.message_id,
                    &msg.endpoint,
                    AdapterStatus::ServiceResultBad,
                    status.name(),
                )
                .with_error_node(request.node.clone())
                .with_command(msg.command),
            );
            return Ok(());
        }
    };

    let mut response =
        ResponseMessage::new(msg.message_id, &msg.endpoint, ResponseKind::GeneralResponse)
            .with_command(msg.command);

    for (i, output) in outputs.iter().enumerate() {
        match codec.decode(output) {
            Ok(value) => {
                response.responses.push(NodeResponse::with_value(
                    request.node.clone(),
                    i,
                    ValuePayload::new(value),
                ));
            }
            Err(e) => {
                tracing::warn!(method = %method_id, output = i, error = %e, "undecodable method output");
                sender.enqueue(
                    ResponseMessage::error(
                        msg.message_id,
                        &msg.endpoint,
                        AdapterStatus::Error,
                        e.to_string(),
                    )
                    .with_error_node(request.node.clone())
                    .with_command(msg.command),
                );
                return Ok(());
            }
        }
    }

    sender.enqueue(response);
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::error::{AdapterError, OperationError};
    use crate::message::{Command, NodeInfo, NodeRequest, RequestMessage};
    use crate::types::NodeId;

    #[test]
    fn test_method_request_shape() {
        let info = NodeInfo::new(NodeId::string(2, "Pump")).with_method(NodeId::string(2, "Start"));
        let msg = RequestMessage::new(
            1,
            "opc.tcp://localhost:4840",
            Command::Method,
            vec![NodeRequest::method(info, vec![])],
        );
        assert!(msg.requests[0].node.method_id.is_some());
    }

    #[test]
    fn test_missing_method_id_error_text() {
        let err = AdapterError::operation(OperationError::MissingMethodId {
            object: "ns=2;s=Pump".to_string(),
        });
        assert!(err.to_string().contains("ns=2;s=Pump"));
    }
}
