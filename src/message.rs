// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Request and response message model.
//!
//! An application request is a [`RequestMessage`]: one command, one target
//! endpoint, and one or more node-level requests. Results come back as
//! [`ResponseMessage`]s through the receive queue, classified by
//! [`ResponseKind`] so the dispatcher can route each one to the matching
//! application callback.
//!
//! # Invariants
//!
//! - a request message carries at least one node request;
//! - a response message's `responses` vector holds only the accepted subset
//!   of the request; its length equals the number of produced responses.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BrowseDirection, NodeId, SubscriptionRequest};
use crate::value::OpcUaValue;

/// Maximum number of start nodes in a single multi-node browse request.
pub const MAX_BROWSE_REQUEST_SIZE: usize = 10;

// =============================================================================
// Command
// =============================================================================

/// The operation a request message asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Read the Value attribute of the named nodes.
    Read,
    /// Read the MinimumSamplingInterval attribute of the named nodes.
    ReadSamplingInterval,
    /// Write values to the named nodes.
    Write,
    /// Recursively browse from the named start nodes.
    Browse,
    /// Continue a truncated browse via continuation points.
    BrowseNext,
    /// Browse collecting view nodes.
    BrowseViews,
    /// Invoke a method on an object node.
    Method,
    /// Manage a subscription (create/modify/delete/republish).
    Subscription,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "Read",
            Self::ReadSamplingInterval => "ReadSamplingInterval",
            Self::Write => "Write",
            Self::Browse => "Browse",
            Self::BrowseNext => "BrowseNext",
            Self::BrowseViews => "BrowseViews",
            Self::Method => "Method",
            Self::Subscription => "Subscription",
        };
        write!(f, "{}", name)
    }
}

// =============================================================================
// AdapterStatus
// =============================================================================

/// Status codes carried on error responses and facade results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterStatus {
    /// Operation accepted.
    Ok,
    /// Generic error.
    Error,
    /// A session for the endpoint already exists.
    AlreadyConnected,
    /// The stack failed to connect.
    ConnectFailed,
    /// Internal adapter failure.
    InternalError,
    /// The stack returned a bad service result for the whole call.
    ServiceResultBad,
    /// The browse service returned no results at all.
    BrowseResultEmpty,
    /// Every start node of a browse level came back BadNodeIdUnknown.
    NodeIdUnknownAllResults,
    /// A per-node browse result carried a bad status.
    ResultStatusBad,
    /// A reference's direction contradicts the requested browse direction.
    DirectionMismatch,
    /// A reference's node class is outside the browse mask.
    NodeClassOutsideMask,
    /// Reference data violated a structural contract.
    ReferenceDataInvalid,
    /// More browse start nodes than the request cap allows.
    BrowseRequestTooLarge,
}

impl fmt::Display for AdapterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "Ok",
            Self::Error => "Error",
            Self::AlreadyConnected => "AlreadyConnected",
            Self::ConnectFailed => "ConnectFailed",
            Self::InternalError => "InternalError",
            Self::ServiceResultBad => "ServiceResultBad",
            Self::BrowseResultEmpty => "BrowseResultEmpty",
            Self::NodeIdUnknownAllResults => "NodeIdUnknownAllResults",
            Self::ResultStatusBad => "ResultStatusBad",
            Self::DirectionMismatch => "DirectionMismatch",
            Self::NodeClassOutsideMask => "NodeClassOutsideMask",
            Self::ReferenceDataInvalid => "ReferenceDataInvalid",
            Self::BrowseRequestTooLarge => "BrowseRequestTooLarge",
        };
        write!(f, "{}", name)
    }
}

// =============================================================================
// NodeInfo / NodeRequest
// =============================================================================

/// Identity of one addressed node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// The node identifier.
    pub node_id: NodeId,

    /// Application-facing stringified identifier. Unique subscription key
    /// within a session.
    pub value_alias: String,

    /// Method node id, set on method-call requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method_id: Option<NodeId>,
}

impl NodeInfo {
    /// Creates node info with an alias derived from the node id.
    pub fn new(node_id: NodeId) -> Self {
        let value_alias = node_id.to_opc_string();
        Self {
            node_id,
            value_alias,
            method_id: None,
        }
    }

    /// Creates node info with an explicit value alias.
    pub fn with_alias(node_id: NodeId, value_alias: impl Into<String>) -> Self {
        Self {
            node_id,
            value_alias: value_alias.into(),
            method_id: None,
        }
    }

    /// Sets the method id for a method-call request.
    pub fn with_method(mut self, method_id: NodeId) -> Self {
        self.method_id = Some(method_id);
        self
    }
}

/// One node-level request inside a request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRequest {
    /// The addressed node.
    pub node: NodeInfo,

    /// Value to write (write commands).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<OpcUaValue>,

    /// Subscription parameters (subscription commands).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionRequest>,

    /// Ordered typed input arguments (method commands).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub method_inputs: Vec<OpcUaValue>,
}

impl NodeRequest {
    /// Creates a plain read/browse request for the node.
    pub fn new(node: NodeInfo) -> Self {
        Self {
            node,
            value: None,
            subscription: None,
            method_inputs: Vec::new(),
        }
    }

    /// Creates a write request carrying the value.
    pub fn write(node: NodeInfo, value: OpcUaValue) -> Self {
        Self {
            node,
            value: Some(value),
            subscription: None,
            method_inputs: Vec::new(),
        }
    }

    /// Creates a subscription request.
    pub fn subscribe(node: NodeInfo, subscription: SubscriptionRequest) -> Self {
        Self {
            node,
            value: None,
            subscription: Some(subscription),
            method_inputs: Vec::new(),
        }
    }

    /// Creates a method-call request with ordered inputs.
    pub fn method(node: NodeInfo, inputs: Vec<OpcUaValue>) -> Self {
        Self {
            node,
            value: None,
            subscription: None,
            method_inputs: inputs,
        }
    }
}

// =============================================================================
// BrowseParameters / ContinuationPoint
// =============================================================================

/// Parameters of a browse request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BrowseParameters {
    /// Browse direction.
    pub direction: BrowseDirection,

    /// Per-node maximum reference hint passed to the server (0 = no limit).
    pub max_references_per_node: u32,
}

impl Default for BrowseParameters {
    fn default() -> Self {
        Self {
            direction: BrowseDirection::Forward,
            max_references_per_node: 0,
        }
    }
}

/// An opaque server token allowing a browse to resume past a result cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationPoint {
    /// The opaque bytes returned by the server.
    pub continuation_point: Vec<u8>,

    /// Browse-prefix captured at the moment of truncation (no leading `/`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browse_prefix: Option<String>,
}

impl ContinuationPoint {
    /// Creates a continuation point.
    pub fn new(continuation_point: Vec<u8>, browse_prefix: Option<String>) -> Self {
        Self {
            continuation_point,
            browse_prefix,
        }
    }

    /// Returns the token length in bytes.
    pub fn len(&self) -> usize {
        self.continuation_point.len()
    }

    /// Returns `true` for an empty token.
    pub fn is_empty(&self) -> bool {
        self.continuation_point.is_empty()
    }
}

// =============================================================================
// RequestMessage
// =============================================================================

/// An inbound application request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMessage {
    /// Monotonically assigned message id; responses echo it.
    pub message_id: u32,

    /// Target endpoint URL.
    pub endpoint: String,

    /// The requested operation.
    pub command: Command,

    /// Node-level requests; never empty.
    pub requests: Vec<NodeRequest>,

    /// Browse parameters (browse commands).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browse: Option<BrowseParameters>,

    /// Continuation points (browse-next command).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub continuation_points: Vec<ContinuationPoint>,
}

impl RequestMessage {
    /// Creates a request message.
    pub fn new(
        message_id: u32,
        endpoint: impl Into<String>,
        command: Command,
        requests: Vec<NodeRequest>,
    ) -> Self {
        Self {
            message_id,
            endpoint: endpoint.into(),
            command,
            requests,
            browse: None,
            continuation_points: Vec::new(),
        }
    }

    /// Sets the browse parameters.
    pub fn with_browse(mut self, browse: BrowseParameters) -> Self {
        self.browse = Some(browse);
        self
    }

    /// Sets the continuation points for a browse-next request.
    pub fn with_continuation_points(mut self, points: Vec<ContinuationPoint>) -> Self {
        self.continuation_points = points;
        self
    }

    /// Returns the browse parameters, defaulting when absent.
    pub fn browse_parameters(&self) -> BrowseParameters {
        self.browse.unwrap_or_default()
    }
}

// =============================================================================
// ValuePayload / UnixTime
// =============================================================================

/// A decoded value plus its scalar/array shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuePayload {
    /// The decoded value.
    pub value: OpcUaValue,

    /// `true` when the wire variant was an array.
    pub is_array: bool,

    /// Array length (0 for scalars).
    pub array_length: usize,
}

impl ValuePayload {
    /// Creates a payload, deriving the shape from the value.
    pub fn new(value: OpcUaValue) -> Self {
        let is_array = value.is_array();
        let array_length = value.array_length();
        Self {
            value,
            is_array,
            array_length,
        }
    }

    /// Creates a string payload, used for browse paths and error text.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(OpcUaValue::String(text.into()))
    }
}

/// Unix wall-clock time with microsecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnixTime {
    /// Seconds since the Unix epoch.
    pub secs: i64,

    /// Microsecond fraction.
    pub micros: i64,
}

impl UnixTime {
    /// Captures the current wall-clock time.
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            secs: now.timestamp(),
            micros: i64::from(now.timestamp_subsec_micros()),
        }
    }

    /// Converts to a `chrono` UTC timestamp.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.secs, (self.micros * 1000) as u32).single()
    }
}

// =============================================================================
// ResponseMessage
// =============================================================================

/// Classification of an outbound response message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// Aggregated read/write/method result.
    GeneralResponse,
    /// One browse engine emission.
    BrowseResponse,
    /// A data-change notification.
    Report,
    /// An error.
    Error,
}

/// One node-level response element.
#[derive(Debug, Clone)]
pub struct NodeResponse {
    /// The node the response concerns, when known.
    pub node: Option<NodeInfo>,

    /// Position of the originating request within the request vector.
    pub request_id: Option<usize>,

    /// The value payload.
    pub value: Option<ValuePayload>,
}

impl NodeResponse {
    /// Creates a response carrying a value for a node.
    pub fn with_value(node: NodeInfo, request_id: usize, value: ValuePayload) -> Self {
        Self {
            node: Some(node),
            request_id: Some(request_id),
            value: Some(value),
        }
    }
}

/// Browse metadata attached to a browse response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseResult {
    /// The browse name of the discovered node (string identifier for
    /// string-id nodes).
    pub browse_name: String,
}

/// An outbound message delivered through the receive queue.
#[derive(Debug, Clone)]
pub struct ResponseMessage {
    /// Id of the originating request message.
    pub message_id: u32,

    /// Endpoint the message concerns.
    pub endpoint: String,

    /// Message classification.
    pub kind: ResponseKind,

    /// The originating command, when applicable.
    pub command: Option<Command>,

    /// Node-level responses; holds only the accepted subset.
    pub responses: Vec<NodeResponse>,

    /// Browse metadata (browse responses).
    pub browse_result: Option<BrowseResult>,

    /// Continuation points (browse responses past a result cap).
    pub continuation_points: Vec<ContinuationPoint>,

    /// Error status (error messages).
    pub status: Option<AdapterStatus>,

    /// Server time of a data-change report, normalized to Unix time.
    pub server_time: Option<UnixTime>,

    /// Diagnostic information returned by the stack, when requested.
    pub diagnostics: Option<String>,
}

impl ResponseMessage {
    /// Creates an empty response message of the given kind.
    pub fn new(message_id: u32, endpoint: impl Into<String>, kind: ResponseKind) -> Self {
        Self {
            message_id,
            endpoint: endpoint.into(),
            kind,
            command: None,
            responses: Vec::new(),
            browse_result: None,
            continuation_points: Vec::new(),
            status: None,
            server_time: None,
            diagnostics: None,
        }
    }

    /// Creates an error response with a status and human-readable text.
    pub fn error(
        message_id: u32,
        endpoint: impl Into<String>,
        status: AdapterStatus,
        text: impl Into<String>,
    ) -> Self {
        let mut msg = Self::new(message_id, endpoint, ResponseKind::Error);
        msg.status = Some(status);
        msg.responses.push(NodeResponse {
            node: None,
            request_id: None,
            value: Some(ValuePayload::text(text)),
        });
        msg
    }

    /// Attaches the offending node to an error response.
    pub fn with_error_node(mut self, node: NodeInfo) -> Self {
        if let Some(first) = self.responses.first_mut() {
            first.node = Some(node);
        }
        self
    }

    /// Sets the originating command.
    pub fn with_command(mut self, command: Command) -> Self {
        self.command = Some(command);
        self
    }

    /// Returns the number of node-level responses.
    pub fn response_length(&self) -> usize {
        self.responses.len()
    }

    /// Returns the error text of an error response.
    pub fn error_text(&self) -> Option<&str> {
        if self.kind != ResponseKind::Error {
            return None;
        }
        self.responses
            .first()
            .and_then(|r| r.value.as_ref())
            .and_then(|p| p.value.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_message_builder() {
        let msg = RequestMessage::new(
            7,
            "opc.tcp://localhost:4840",
            Command::Browse,
            vec![NodeRequest::new(NodeInfo::new(NodeId::ROOT_FOLDER))],
        )
        .with_browse(BrowseParameters {
            direction: BrowseDirection::Forward,
            max_references_per_node: 50,
        });

        assert_eq!(msg.message_id, 7);
        assert_eq!(msg.requests.len(), 1);
        assert_eq!(msg.browse_parameters().max_references_per_node, 50);
    }

    #[test]
    fn test_default_browse_parameters() {
        let msg = RequestMessage::new(
            1,
            "opc.tcp://localhost:4840",
            Command::Browse,
            vec![NodeRequest::new(NodeInfo::new(NodeId::ROOT_FOLDER))],
        );
        let params = msg.browse_parameters();
        assert_eq!(params.direction, BrowseDirection::Forward);
        assert_eq!(params.max_references_per_node, 0);
    }

    #[test]
    fn test_value_payload_shape() {
        let scalar = ValuePayload::new(OpcUaValue::Int32(5));
        assert!(!scalar.is_array);
        assert_eq!(scalar.array_length, 0);

        let array = ValuePayload::new(OpcUaValue::Array(vec![
            OpcUaValue::Int32(1),
            OpcUaValue::Int32(2),
        ]));
        assert!(array.is_array);
        assert_eq!(array.array_length, 2);
    }

    #[test]
    fn test_error_response_text() {
        let msg = ResponseMessage::error(
            3,
            "opc.tcp://localhost:4840",
            AdapterStatus::Error,
            "Bad service result for the node at position(1)",
        );
        assert_eq!(msg.kind, ResponseKind::Error);
        assert_eq!(msg.response_length(), 1);
        assert_eq!(
            msg.error_text(),
            Some("Bad service result for the node at position(1)")
        );
    }

    #[test]
    fn test_node_info_alias() {
        let info = NodeInfo::new(NodeId::string(2, "Temp"));
        assert_eq!(info.value_alias, "ns=2;s=Temp");

        let info = NodeInfo::with_alias(NodeId::numeric(2, 9), "Temp");
        assert_eq!(info.value_alias, "Temp");
    }

    #[test]
    fn test_continuation_point() {
        let cp = ContinuationPoint::new(vec![1, 2, 3], Some("a/b".to_string()));
        assert_eq!(cp.len(), 3);
        assert!(!cp.is_empty());
        assert_eq!(cp.browse_prefix.as_deref(), Some("a/b"));
    }

    #[test]
    fn test_unix_time_to_datetime() {
        let t = UnixTime {
            secs: 1_700_000_000,
            micros: 250_000,
        };
        let dt = t.to_datetime().unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
        assert_eq!(dt.timestamp_subsec_micros(), 250_000);
    }
}
