// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Contracts consumed from the underlying OPC UA wire stack.
//!
//! The adapter never talks to the network itself. Everything wire-level
//! (endpoint URL parsing, service encoding, transport, security negotiation)
//! is delegated to an implementation of [`UaStack`] (discovery and client
//! creation) and [`UaSession`] (the per-connection service surface). Server
//! hosting goes through [`UaServerBackend`].
//!
//! The types in this module mirror the stack's wire model: byte-string text,
//! GUID field groups, timestamps as 100 ns ticks since the OPC UA epoch.
//! Translation into the application-facing value model lives in
//! [`crate::value`].
//!
//! # Thread Safety
//!
//! All trait implementations must be `Send + Sync`; the adapter shares one
//! session between the caller's tasks and the background publish pump.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::error::AdapterResult;
use crate::types::{ApplicationType, BrowseDirection, MonitoringMode, NodeClass, NodeId};

/// Result of a single stack service call: payload on a GOOD service result,
/// the bad service status otherwise.
pub type ServiceResult<T> = Result<T, StatusCode>;

// =============================================================================
// StatusCode
// =============================================================================

/// OPC UA status code.
///
/// The high bit marks bad codes, bit 30 marks uncertain codes. The adapter
/// treats [`StatusCode::GOOD`] as success and surfaces everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Operation succeeded.
    pub const GOOD: StatusCode = StatusCode(0x0000_0000);
    /// An unexpected error occurred.
    pub const BAD_UNEXPECTED_ERROR: StatusCode = StatusCode(0x8001_0000);
    /// An internal error occurred.
    pub const BAD_INTERNAL_ERROR: StatusCode = StatusCode(0x8002_0000);
    /// Not enough memory to complete the operation.
    pub const BAD_OUT_OF_MEMORY: StatusCode = StatusCode(0x8003_0000);
    /// The operation timed out.
    pub const BAD_TIMEOUT: StatusCode = StatusCode(0x800A_0000);
    /// The request was cancelled by the client.
    pub const BAD_REQUEST_CANCELLED_BY_CLIENT: StatusCode = StatusCode(0x802C_0000);
    /// The subscription id is not valid.
    pub const BAD_SUBSCRIPTION_ID_INVALID: StatusCode = StatusCode(0x8028_0000);
    /// The node id refers to a node that does not exist.
    pub const BAD_NODE_ID_UNKNOWN: StatusCode = StatusCode(0x8034_0000);
    /// The monitored item id is not valid.
    pub const BAD_MONITORED_ITEM_ID_INVALID: StatusCode = StatusCode(0x8042_0000);
    /// There is no subscription available for this session.
    pub const BAD_NO_SUBSCRIPTION: StatusCode = StatusCode(0x8079_0000);
    /// The requested notification message is no longer available.
    pub const BAD_MESSAGE_NOT_AVAILABLE: StatusCode = StatusCode(0x80A9_0000);
    /// The connection was closed by the peer.
    pub const BAD_CONNECTION_CLOSED: StatusCode = StatusCode(0x80AE_0000);
    /// An argument of the service call is invalid.
    pub const BAD_INVALID_ARGUMENT: StatusCode = StatusCode(0x80AB_0000);

    /// Returns `true` if this code signals success.
    #[inline]
    pub const fn is_good(&self) -> bool {
        self.0 & 0x8000_0000 == 0 && self.0 & 0x4000_0000 == 0
    }

    /// Returns `true` if this code signals failure.
    #[inline]
    pub const fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns the symbolic name of well-known codes, or `"Unknown"`.
    pub const fn name(&self) -> &'static str {
        match self.0 {
            0x0000_0000 => "Good",
            0x8001_0000 => "BadUnexpectedError",
            0x8002_0000 => "BadInternalError",
            0x8003_0000 => "BadOutOfMemory",
            0x800A_0000 => "BadTimeout",
            0x802C_0000 => "BadRequestCancelledByClient",
            0x8028_0000 => "BadSubscriptionIdInvalid",
            0x8034_0000 => "BadNodeIdUnknown",
            0x8042_0000 => "BadMonitoredItemIdInvalid",
            0x8079_0000 => "BadNoSubscription",
            0x80A9_0000 => "BadMessageNotAvailable",
            0x80AE_0000 => "BadConnectionClosed",
            0x80AB_0000 => "BadInvalidArgument",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}

// =============================================================================
// UaDateTime
// =============================================================================

/// Timestamp in the stack's native representation: 100 ns ticks since
/// 1601-01-01 00:00:00 UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct UaDateTime(pub i64);

impl UaDateTime {
    /// Ticks between the OPC UA epoch (1601) and the Unix epoch (1970).
    pub const UNIX_EPOCH_TICKS: i64 = 116_444_736_000_000_000;

    /// Ticks per second.
    pub const TICKS_PER_SEC: i64 = 10_000_000;

    /// Ticks per microsecond.
    pub const TICKS_PER_USEC: i64 = 10;

    /// Builds a stack timestamp from Unix seconds and microseconds.
    pub const fn from_unix_parts(secs: i64, micros: i64) -> Self {
        Self(Self::UNIX_EPOCH_TICKS + secs * Self::TICKS_PER_SEC + micros * Self::TICKS_PER_USEC)
    }

    /// Normalizes to Unix time as `(seconds, microseconds)`.
    pub const fn to_unix_parts(&self) -> (i64, i64) {
        let since_unix = self.0 - Self::UNIX_EPOCH_TICKS;
        let secs = since_unix / Self::TICKS_PER_SEC;
        let micros = (since_unix - secs * Self::TICKS_PER_SEC) / Self::TICKS_PER_USEC;
        (secs, micros)
    }

    /// Converts to a `chrono` UTC timestamp (microsecond precision).
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let (secs, micros) = self.to_unix_parts();
        Utc.timestamp_opt(secs, (micros * 1000) as u32).single()
    }

    /// Captures the current wall-clock time.
    pub fn now() -> Self {
        let now = Utc::now();
        Self::from_unix_parts(now.timestamp(), i64::from(now.timestamp_subsec_micros()))
    }
}

// =============================================================================
// UaGuid
// =============================================================================

/// GUID in the stack's field layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UaGuid {
    /// First field group (32 bits).
    pub data1: u32,
    /// Second field group (16 bits).
    pub data2: u16,
    /// Third field group (16 bits).
    pub data3: u16,
    /// Remaining eight bytes.
    pub data4: [u8; 8],
}

impl UaGuid {
    /// Converts to a `uuid::Uuid` preserving the byte content.
    pub fn to_uuid(&self) -> Uuid {
        Uuid::from_fields(self.data1, self.data2, self.data3, &self.data4)
    }

    /// Creates from a `uuid::Uuid`.
    pub fn from_uuid(uuid: &Uuid) -> Self {
        let (data1, data2, data3, data4) = uuid.as_fields();
        Self {
            data1,
            data2,
            data3,
            data4: *data4,
        }
    }
}

// =============================================================================
// UaScalar / UaVariant
// =============================================================================

/// A single scalar value in the stack's wire representation.
///
/// Text carried as raw bytes, GUIDs as field groups, timestamps as ticks.
/// [`crate::value::ValueCodec`] translates these into the adapter's public
/// value model.
#[derive(Debug, Clone, PartialEq)]
pub enum UaScalar {
    /// Boolean value.
    Boolean(bool),
    /// Signed 8-bit integer.
    SByte(i8),
    /// Unsigned 8-bit integer.
    Byte(u8),
    /// Signed 16-bit integer.
    Int16(i16),
    /// Unsigned 16-bit integer.
    UInt16(u16),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Unsigned 32-bit integer.
    UInt32(u32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned 64-bit integer.
    UInt64(u64),
    /// 32-bit IEEE 754 float.
    Float(f32),
    /// 64-bit IEEE 754 double.
    Double(f64),
    /// Timestamp in stack ticks.
    DateTime(UaDateTime),
    /// UTF-8 text as raw bytes.
    String(Vec<u8>),
    /// Opaque byte string.
    ByteString(Vec<u8>),
    /// XML element as raw bytes.
    XmlElement(Vec<u8>),
    /// GUID field groups.
    Guid(UaGuid),
    /// Localized text: locale and text as raw bytes.
    LocalizedText {
        /// Locale id bytes (e.g. `en-US`).
        locale: Vec<u8>,
        /// Text bytes.
        text: Vec<u8>,
    },
    /// Qualified name: namespace index and name bytes.
    QualifiedName {
        /// Namespace index.
        namespace_index: u16,
        /// Name bytes.
        name: Vec<u8>,
    },
    /// Node identifier.
    NodeId(NodeId),
}

impl UaScalar {
    /// Returns the wire type name, used in conversion diagnostics.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "Boolean",
            Self::SByte(_) => "SByte",
            Self::Byte(_) => "Byte",
            Self::Int16(_) => "Int16",
            Self::UInt16(_) => "UInt16",
            Self::Int32(_) => "Int32",
            Self::UInt32(_) => "UInt32",
            Self::Int64(_) => "Int64",
            Self::UInt64(_) => "UInt64",
            Self::Float(_) => "Float",
            Self::Double(_) => "Double",
            Self::DateTime(_) => "DateTime",
            Self::String(_) => "String",
            Self::ByteString(_) => "ByteString",
            Self::XmlElement(_) => "XmlElement",
            Self::Guid(_) => "Guid",
            Self::LocalizedText { .. } => "LocalizedText",
            Self::QualifiedName { .. } => "QualifiedName",
            Self::NodeId(_) => "NodeId",
        }
    }
}

/// A stack variant: one scalar or a homogeneous array of scalars.
#[derive(Debug, Clone, PartialEq)]
pub enum UaVariant {
    /// A single scalar value.
    Scalar(UaScalar),
    /// An array of scalars.
    Array(Vec<UaScalar>),
}

impl UaVariant {
    /// Returns `true` for the scalar form.
    #[inline]
    pub const fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }

    /// Returns the array length (0 for scalars).
    pub fn array_length(&self) -> usize {
        match self {
            Self::Scalar(_) => 0,
            Self::Array(items) => items.len(),
        }
    }
}

// =============================================================================
// DataValue
// =============================================================================

/// Value plus status and timestamps, as returned by read and data-change
/// notifications.
#[derive(Debug, Clone, PartialEq)]
pub struct DataValue {
    /// The value, absent when the server delivered none.
    pub value: Option<UaVariant>,

    /// Per-node status code.
    pub status: StatusCode,

    /// Server timestamp in stack ticks.
    pub server_timestamp: Option<UaDateTime>,

    /// Source timestamp in stack ticks.
    pub source_timestamp: Option<UaDateTime>,
}

impl DataValue {
    /// Creates a GOOD data value with the current server timestamp.
    pub fn good(value: UaVariant) -> Self {
        Self {
            value: Some(value),
            status: StatusCode::GOOD,
            server_timestamp: Some(UaDateTime::now()),
            source_timestamp: None,
        }
    }

    /// Creates a bad data value carrying only a status.
    pub fn bad(status: StatusCode) -> Self {
        Self {
            value: None,
            status,
            server_timestamp: None,
            source_timestamp: None,
        }
    }
}

// =============================================================================
// Read / Write batch items
// =============================================================================

/// The attribute addressed by a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadAttribute {
    /// The Value attribute (id 13).
    Value,
    /// The MinimumSamplingInterval attribute (id 21).
    MinimumSamplingInterval,
}

impl ReadAttribute {
    /// Returns the OPC UA attribute id.
    pub const fn attribute_id(&self) -> u32 {
        match self {
            Self::Value => 13,
            Self::MinimumSamplingInterval => 21,
        }
    }
}

/// One element of a read batch. Both timestamps are always requested.
#[derive(Debug, Clone)]
pub struct ReadValueId {
    /// The node to read.
    pub node_id: NodeId,
    /// The attribute to read.
    pub attribute: ReadAttribute,
}

/// One element of a write batch.
#[derive(Debug, Clone)]
pub struct WriteValue {
    /// The node to write.
    pub node_id: NodeId,
    /// The encoded value.
    pub value: UaVariant,
}

// =============================================================================
// Browse wire types
// =============================================================================

/// One start node of a browse call.
#[derive(Debug, Clone)]
pub struct BrowseDescription {
    /// The node to browse from.
    pub node_id: NodeId,
    /// Browse direction.
    pub direction: BrowseDirection,
    /// Reference type to follow.
    pub reference_type_id: NodeId,
    /// Whether subtypes of the reference type are followed.
    pub include_subtypes: bool,
    /// Node class mask filter.
    pub node_class_mask: u32,
}

impl BrowseDescription {
    /// Creates a description following all References subtypes, the way the
    /// browse engine issues them.
    pub fn hierarchical(node_id: NodeId, direction: BrowseDirection, node_class_mask: u32) -> Self {
        Self {
            node_id,
            direction,
            reference_type_id: NodeId::REFERENCES,
            include_subtypes: true,
            node_class_mask,
        }
    }
}

/// One reference returned by a browse call.
#[derive(Debug, Clone)]
pub struct ReferenceDescription {
    /// Target node id.
    pub node_id: NodeId,
    /// Server index of the target (0 = local server).
    pub server_index: u32,
    /// Namespace index of the browse name.
    pub browse_name_namespace: u16,
    /// Browse name text.
    pub browse_name: String,
    /// Display name text.
    pub display_name: String,
    /// Node class of the target.
    pub node_class: NodeClass,
    /// `true` for a forward reference.
    pub is_forward: bool,
    /// Reference type id.
    pub reference_type_id: NodeId,
    /// Type definition node id (null when not applicable).
    pub type_definition: NodeId,
}

/// Per-start-node result of a browse or browse-next call.
#[derive(Debug, Clone)]
pub struct UaBrowseResult {
    /// Per-node status.
    pub status: StatusCode,
    /// Opaque continuation point; empty when the result is complete.
    pub continuation_point: Vec<u8>,
    /// References found.
    pub references: Vec<ReferenceDescription>,
}

// =============================================================================
// Subscription wire types
// =============================================================================

/// Parameters for creating or modifying a subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionParameters {
    /// Requested publishing interval.
    pub publishing_interval: Duration,
    /// Requested lifetime count.
    pub lifetime_count: u32,
    /// Requested max keep-alive count.
    pub max_keepalive_count: u32,
    /// Maximum notifications per publish.
    pub max_notifications_per_publish: u32,
    /// Priority.
    pub priority: u8,
    /// Whether publishing is enabled.
    pub publishing_enabled: bool,
}

/// Parameters for creating a monitored item.
#[derive(Debug, Clone)]
pub struct MonitoredItemRequest {
    /// The node to monitor.
    pub node_id: NodeId,
    /// Requested sampling interval.
    pub sampling_interval: Duration,
    /// Queue size.
    pub queue_size: u32,
    /// Discard-oldest policy.
    pub discard_oldest: bool,
    /// Client handle for correlation.
    pub client_handle: u32,
}

/// Parameters for modifying a monitored item.
#[derive(Debug, Clone)]
pub struct MonitoringParameters {
    /// Client handle for correlation.
    pub client_handle: u32,
    /// Discard-oldest policy.
    pub discard_oldest: bool,
    /// Requested sampling interval.
    pub sampling_interval: Duration,
    /// Queue size.
    pub queue_size: u32,
}

/// Dispatch context attached to a monitored item at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorContext {
    /// Session key (`host:port`) of the owning session.
    pub session_key: String,
    /// Value alias of the monitored node.
    pub value_alias: String,
}

/// A data-change notification delivered by the stack.
#[derive(Debug, Clone)]
pub struct DataChangeEvent {
    /// Subscription that produced the notification.
    pub subscription_id: u32,
    /// Monitored item that produced the notification.
    pub monitored_item_id: u32,
    /// The context given at item creation.
    pub context: MonitorContext,
    /// The changed value.
    pub value: DataValue,
}

/// Callback invoked by the stack for each data-change notification.
pub type DataChangeHandler = Arc<dyn Fn(DataChangeEvent) + Send + Sync>;

// =============================================================================
// Discovery wire types
// =============================================================================

/// Application description returned by FindServers.
#[derive(Debug, Clone)]
pub struct ApplicationDescription {
    /// Globally unique application URI.
    pub application_uri: String,
    /// Product URI.
    pub product_uri: String,
    /// Localized application name.
    pub application_name: String,
    /// Locale of the application name.
    pub application_name_locale: String,
    /// Application type.
    pub application_type: ApplicationType,
    /// Gateway server URI.
    pub gateway_server_uri: String,
    /// Discovery profile URI.
    pub discovery_profile_uri: String,
    /// Discovery URLs.
    pub discovery_urls: Vec<String>,
}

/// Endpoint description returned by GetEndpoints.
#[derive(Debug, Clone)]
pub struct EndpointDescription {
    /// Endpoint URL.
    pub endpoint_url: String,
    /// Security policy URI.
    pub security_policy_uri: String,
    /// Security mode (1 = None, 2 = Sign, 3 = SignAndEncrypt).
    pub security_mode: u32,
    /// Transport profile URI.
    pub transport_profile_uri: String,
    /// Security level relative to other endpoints of the server.
    pub security_level: u8,
    /// The server's application description.
    pub server: ApplicationDescription,
}

/// A discovered server device, handed to the discovery callback.
#[derive(Debug, Clone)]
pub struct ServerDevice {
    /// Server host address.
    pub address: String,
    /// Server port.
    pub port: u16,
    /// Server application name.
    pub server_name: String,
    /// Endpoints exposed by the server.
    pub endpoints: Vec<EndpointDescription>,
}

// =============================================================================
// ParsedEndpoint
// =============================================================================

/// Host, port and path parsed out of an endpoint URL by the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEndpoint {
    /// Host name or address.
    pub host: String,
    /// Port number.
    pub port: u16,
    /// Path component, possibly empty.
    pub path: String,
}

impl ParsedEndpoint {
    /// Returns the canonical `host:port` session key.
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// UaStack / UaSession
// =============================================================================

/// Stack-level operations: URL parsing, discovery, client creation.
#[async_trait]
pub trait UaStack: Send + Sync {
    /// Parses an endpoint URL into host, port and path.
    ///
    /// Default port resolution is this parser's responsibility; the adapter
    /// never appends a port itself.
    fn parse_endpoint_url(&self, url: &str) -> AdapterResult<ParsedEndpoint>;

    /// Creates a client and connects it to the endpoint.
    async fn connect(&self, endpoint_url: &str) -> AdapterResult<Arc<dyn UaSession>>;

    /// Issues a FindServers request against the discovery URL.
    async fn find_servers(&self, url: &str) -> ServiceResult<Vec<ApplicationDescription>>;

    /// Issues a GetEndpoints request against the discovery URL.
    async fn get_endpoints(&self, url: &str) -> ServiceResult<Vec<EndpointDescription>>;
}

/// Per-connection service surface of the stack.
///
/// Every method may block on network I/O. The adapter serializes publish
/// traffic against these calls with a process-wide lock whenever a session
/// has live subscriptions.
#[async_trait]
pub trait UaSession: Send + Sync {
    /// Reads a batch of node attributes. Both timestamps are requested.
    async fn read(&self, nodes: &[ReadValueId]) -> ServiceResult<Vec<DataValue>>;

    /// Writes a batch of node values; returns one status per node.
    async fn write(&self, writes: &[WriteValue]) -> ServiceResult<Vec<StatusCode>>;

    /// Browses a batch of start nodes.
    async fn browse(
        &self,
        max_references_per_node: u32,
        nodes: &[BrowseDescription],
    ) -> ServiceResult<Vec<UaBrowseResult>>;

    /// Continues truncated browse results.
    async fn browse_next(&self, continuation_points: &[Vec<u8>])
        -> ServiceResult<Vec<UaBrowseResult>>;

    /// Invokes a method on an object node with ordered input arguments.
    async fn call_method(
        &self,
        object_id: &NodeId,
        method_id: &NodeId,
        inputs: &[UaVariant],
    ) -> ServiceResult<Vec<UaVariant>>;

    /// Creates a subscription; returns the server-assigned id.
    async fn create_subscription(&self, params: &SubscriptionParameters) -> ServiceResult<u32>;

    /// Creates a data-change monitored item; returns the server-assigned id.
    ///
    /// The stack invokes `handler` with `context` attached for every
    /// notification produced by this item.
    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        item: &MonitoredItemRequest,
        context: MonitorContext,
        handler: DataChangeHandler,
    ) -> ServiceResult<u32>;

    /// Modifies a subscription's parameters.
    async fn modify_subscription(
        &self,
        subscription_id: u32,
        params: &SubscriptionParameters,
    ) -> ServiceResult<()>;

    /// Modifies a single monitored item.
    async fn modify_monitored_item(
        &self,
        subscription_id: u32,
        monitored_item_id: u32,
        params: &MonitoringParameters,
    ) -> ServiceResult<()>;

    /// Sets the monitoring mode of a single monitored item.
    async fn set_monitoring_mode(
        &self,
        subscription_id: u32,
        monitored_item_id: u32,
        mode: MonitoringMode,
    ) -> ServiceResult<()>;

    /// Enables or disables publishing for a subscription.
    async fn set_publishing_mode(&self, subscription_id: u32, enabled: bool) -> ServiceResult<()>;

    /// Deletes a single subscription.
    async fn delete_subscription(&self, subscription_id: u32) -> ServiceResult<()>;

    /// Deletes a single monitored item.
    async fn delete_monitored_item(
        &self,
        subscription_id: u32,
        monitored_item_id: u32,
    ) -> ServiceResult<()>;

    /// Asks the server to retransmit a notification message.
    async fn republish(
        &self,
        subscription_id: u32,
        retransmit_sequence_number: u32,
    ) -> ServiceResult<()>;

    /// Drives one publish round, processing pending notifications for up to
    /// the given budget.
    async fn run_iterate(&self, budget: Duration) -> StatusCode;

    /// Closes the connection and releases the client.
    async fn disconnect(&self) -> StatusCode;
}

// =============================================================================
// UaServerBackend
// =============================================================================

/// Server-side collaborator: namespace management and node storage.
///
/// The adapter exposes these operations unchanged; their internals are the
/// backend's business.
#[async_trait]
pub trait UaServerBackend: Send + Sync {
    /// Starts the server on the given endpoint.
    async fn start(&self, endpoint_url: &str) -> AdapterResult<()>;

    /// Stops the server.
    async fn stop(&self) -> AdapterResult<()>;

    /// Creates a namespace rooted at the given node.
    async fn create_namespace(
        &self,
        name: &str,
        root_node_id: &str,
        root_browse_name: &str,
        root_display_name: &str,
    ) -> AdapterResult<()>;

    /// Adds a node to a namespace.
    async fn add_node(&self, namespace_uri: &str, node_id: &NodeId, browse_name: &str)
        -> AdapterResult<()>;

    /// Adds a reference between two nodes.
    async fn add_reference(&self, source: &NodeId, target: &NodeId, forward: bool)
        -> AdapterResult<()>;
}

// =============================================================================
// Tests
// =============================================================================
