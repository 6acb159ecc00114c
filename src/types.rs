// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core OPC UA types used across the adapter.
//!
//! This module provides the identifier, enumeration and configuration types
//! shared by every subsystem:
//!
//! - **NodeId**: all four OPC UA node identifier types with parsing
//! - **NodeClass / BrowseDirection / MonitoringMode**: protocol enumerations
//! - **ApplicationType**: discovery filtering with a bitmask
//! - **AdapterConfig**: adapter-wide configuration with builder
//! - **SubscriptionRequest**: per-node subscription parameters
//!
//! # Examples
//!
//! ```
//! use opcua_adapter::types::{AdapterConfig, NodeId};
//!
//! let node = NodeId::string(2, "Temperature.Value");
//! assert_eq!(node.to_opc_string(), "ns=2;s=Temperature.Value");
//!
//! let config = AdapterConfig::builder().build().unwrap();
//! assert!(config.supported_application_types.accepts_server());
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AdapterError, ConfigurationError};

// =============================================================================
// NodeId
// =============================================================================

/// OPC UA node identifier.
///
/// A `NodeId` uniquely identifies a node within an OPC UA server. It consists
/// of a namespace index and an identifier which can be numeric, string, GUID,
/// or opaque (byte string).
///
/// # Examples
///
/// ```
/// use opcua_adapter::types::NodeId;
///
/// let numeric = NodeId::numeric(2, 1001);
/// let string = NodeId::string(2, "MyDevice.Temperature");
/// let parsed: NodeId = "ns=2;s=MyDevice.Temperature".parse().unwrap();
/// assert_eq!(string, parsed);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// Creates a numeric node ID.
    #[inline]
    pub fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node ID.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Creates a GUID node ID.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Guid(value),
        }
    }

    /// Creates an opaque (byte string) node ID.
    #[inline]
    pub fn opaque(namespace_index: u16, value: Vec<u8>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Opaque(value),
        }
    }

    /// Root folder node (ns=0, i=84). Default start node for browsing.
    pub const ROOT_FOLDER: NodeId = NodeId {
        namespace_index: 0,
        identifier: NodeIdentifier::Numeric(84),
    };

    /// Objects folder node (ns=0, i=85).
    pub const OBJECTS_FOLDER: NodeId = NodeId {
        namespace_index: 0,
        identifier: NodeIdentifier::Numeric(85),
    };

    /// References reference type (ns=0, i=31). Browse follows it with subtypes.
    pub const REFERENCES: NodeId = NodeId {
        namespace_index: 0,
        identifier: NodeIdentifier::Numeric(31),
    };

    /// Returns the null node ID (ns=0, i=0).
    #[inline]
    pub const fn null() -> Self {
        Self {
            namespace_index: 0,
            identifier: NodeIdentifier::Numeric(0),
        }
    }

    /// Returns `true` if this is a null node ID (ns=0, i=0).
    #[inline]
    pub fn is_null(&self) -> bool {
        self.namespace_index == 0 && matches!(self.identifier, NodeIdentifier::Numeric(0))
    }

    /// Returns `true` if this is a string identifier.
    #[inline]
    pub const fn is_string(&self) -> bool {
        matches!(self.identifier, NodeIdentifier::String(_))
    }

    /// Returns the string value if this is a string identifier.
    #[inline]
    pub fn as_string(&self) -> Option<&str> {
        match &self.identifier {
            NodeIdentifier::String(v) => Some(v),
            _ => None,
        }
    }

    /// Converts to the OPC UA string format.
    ///
    /// Format: `ns=<namespace>;{i|s|g|b}=<identifier>`. The namespace prefix
    /// is omitted for the standard namespace.
    pub fn to_opc_string(&self) -> String {
        if self.namespace_index == 0 {
            self.identifier.to_string()
        } else {
            format!("ns={};{}", self.namespace_index, self.identifier)
        }
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_opc_string())
    }
}

impl FromStr for NodeId {
    type Err = AdapterError;

    /// Parses a NodeId from OPC UA string format.
    ///
    /// Supported formats: `ns=2;i=1001`, `ns=2;s=MyNode`,
    /// `ns=2;g=550e8400-e29b-41d4-a716-446655440000`, `ns=2;b=SGVsbG8=`,
    /// and the namespace-0 short forms `i=1001`, `s=MyNode`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (namespace_index, identifier_part) = if let Some(rest) = s.strip_prefix("ns=") {
            let (ns_str, id_part) = rest.split_once(';').ok_or_else(|| {
                AdapterError::configuration(ConfigurationError::invalid_node_id(
                    s,
                    "Missing identifier after namespace",
                ))
            })?;
            let ns: u16 = ns_str.parse().map_err(|_| {
                AdapterError::configuration(ConfigurationError::invalid_node_id(
                    s,
                    "Invalid namespace index",
                ))
            })?;
            (ns, id_part)
        } else {
            (0, s)
        };

        let identifier = if let Some(id) = identifier_part.strip_prefix("i=") {
            let value: u32 = id.parse().map_err(|_| {
                AdapterError::configuration(ConfigurationError::invalid_node_id(
                    s,
                    "Invalid numeric identifier",
                ))
            })?;
            NodeIdentifier::Numeric(value)
        } else if let Some(id) = identifier_part.strip_prefix("s=") {
            NodeIdentifier::String(id.to_string())
        } else if let Some(id) = identifier_part.strip_prefix("g=") {
            let uuid = Uuid::parse_str(id).map_err(|e| {
                AdapterError::configuration(ConfigurationError::invalid_node_id(
                    s,
                    format!("Invalid GUID: {}", e),
                ))
            })?;
            NodeIdentifier::Guid(uuid)
        } else if let Some(id) = identifier_part.strip_prefix("b=") {
            let bytes = BASE64.decode(id).map_err(|e| {
                AdapterError::configuration(ConfigurationError::invalid_node_id(
                    s,
                    format!("Invalid base64: {}", e),
                ))
            })?;
            NodeIdentifier::Opaque(bytes)
        } else {
            return Err(AdapterError::configuration(
                ConfigurationError::invalid_node_id(
                    s,
                    "Unknown identifier type. Expected i=, s=, g=, or b=",
                ),
            ));
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

// =============================================================================
// NodeIdentifier
// =============================================================================

/// OPC UA node identifier types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeIdentifier {
    /// Numeric identifier (most efficient, used for standard nodes).
    Numeric(u32),

    /// String identifier (human-readable, used for custom nodes).
    String(String),

    /// GUID identifier (globally unique).
    Guid(Uuid),

    /// Opaque identifier (application-specific byte array).
    Opaque(Vec<u8>),
}

impl NodeIdentifier {
    /// Returns the single-character type tag used in value aliases.
    ///
    /// `I` for numeric, `S` for string, `B` for byte string, `G` for GUID.
    pub const fn alias_type_char(&self) -> char {
        match self {
            Self::Numeric(_) => 'I',
            Self::String(_) => 'S',
            Self::Opaque(_) => 'B',
            Self::Guid(_) => 'G',
        }
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "i={}", v),
            Self::String(v) => write!(f, "s={}", v),
            Self::Guid(v) => write!(f, "g={}", v),
            Self::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

// =============================================================================
// NodeClass
// =============================================================================

/// OPC UA node class bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeClass {
    /// Object node.
    Object,
    /// Variable node.
    Variable,
    /// Method node.
    Method,
    /// Object type node.
    ObjectType,
    /// Variable type node.
    VariableType,
    /// Reference type node.
    ReferenceType,
    /// Data type node.
    DataType,
    /// View node.
    View,
}

impl NodeClass {
    /// Returns the OPC UA bit value for this node class.
    pub const fn value(&self) -> u32 {
        match self {
            Self::Object => 1,
            Self::Variable => 2,
            Self::Method => 4,
            Self::ObjectType => 8,
            Self::VariableType => 16,
            Self::ReferenceType => 32,
            Self::DataType => 64,
            Self::View => 128,
        }
    }

    /// Creates a node class from its OPC UA bit value.
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Object),
            2 => Some(Self::Variable),
            4 => Some(Self::Method),
            8 => Some(Self::ObjectType),
            16 => Some(Self::VariableType),
            32 => Some(Self::ReferenceType),
            64 => Some(Self::DataType),
            128 => Some(Self::View),
            _ => None,
        }
    }

    /// Mask accepted by the general browse pipeline.
    pub const BROWSE_MASK: u32 = 1 | 2 | 4 | 128; // Object | Variable | Method | View

    /// Mask accepted by the views browse pipeline.
    pub const VIEW_MASK: u32 = 1 | 128; // Object | View

    /// Returns `true` if the class is within the given mask.
    #[inline]
    pub const fn in_mask(&self, mask: u32) -> bool {
        self.value() & mask != 0
    }
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Object => "Object",
            Self::Variable => "Variable",
            Self::Method => "Method",
            Self::ObjectType => "ObjectType",
            Self::VariableType => "VariableType",
            Self::ReferenceType => "ReferenceType",
            Self::DataType => "DataType",
            Self::View => "View",
        };
        write!(f, "{}", name)
    }
}

// =============================================================================
// BrowseDirection
// =============================================================================

/// Direction of a browse operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BrowseDirection {
    /// Follow forward references only.
    #[default]
    Forward,

    /// Follow inverse references only.
    Inverse,

    /// Follow references in both directions.
    Both,
}

impl BrowseDirection {
    /// Returns `true` if a reference with the given orientation matches.
    #[inline]
    pub const fn matches(&self, is_forward: bool) -> bool {
        match self {
            Self::Forward => is_forward,
            Self::Inverse => !is_forward,
            Self::Both => true,
        }
    }
}

impl fmt::Display for BrowseDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "Forward"),
            Self::Inverse => write!(f, "Inverse"),
            Self::Both => write!(f, "Both"),
        }
    }
}

// =============================================================================
// MonitoringMode
// =============================================================================

/// OPC UA monitoring mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringMode {
    /// Monitoring disabled.
    Disabled,

    /// Sampling enabled, reporting disabled.
    Sampling,

    /// Sampling and reporting enabled.
    #[default]
    Reporting,
}

impl MonitoringMode {
    /// Returns the OPC UA value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::Disabled => 0,
            Self::Sampling => 1,
            Self::Reporting => 2,
        }
    }
}

// =============================================================================
// ApplicationType
// =============================================================================

/// OPC UA application type from an application description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    /// The application is a server.
    Server,
    /// The application is a client.
    Client,
    /// The application is both a client and a server.
    ClientAndServer,
    /// The application is a discovery server.
    DiscoveryServer,
}

impl ApplicationType {
    /// Returns the bitmask bit for this application type.
    pub const fn mask_bit(&self) -> u8 {
        match self {
            Self::Server => 1,
            Self::Client => 2,
            Self::ClientAndServer => 4,
            Self::DiscoveryServer => 8,
        }
    }
}

impl fmt::Display for ApplicationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => write!(f, "Server"),
            Self::Client => write!(f, "Client"),
            Self::ClientAndServer => write!(f, "ClientAndServer"),
            Self::DiscoveryServer => write!(f, "DiscoveryServer"),
        }
    }
}

/// Bitmask of application types accepted by discovery.
///
/// Bits: `SERVER = 1`, `CLIENT = 2`, `CLIENTANDSERVER = 4`,
/// `DISCOVERYSERVER = 8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationTypeMask(pub u8);

impl ApplicationTypeMask {
    /// Mask bit for servers.
    pub const SERVER: u8 = 1;
    /// Mask bit for clients.
    pub const CLIENT: u8 = 2;
    /// Mask bit for combined client/server applications.
    pub const CLIENT_AND_SERVER: u8 = 4;
    /// Mask bit for discovery servers.
    pub const DISCOVERY_SERVER: u8 = 8;

    /// A mask accepting every application type.
    pub const ALL: ApplicationTypeMask = ApplicationTypeMask(0x0F);

    /// Returns `true` if the given application type is accepted.
    #[inline]
    pub const fn accepts(&self, app_type: ApplicationType) -> bool {
        self.0 & app_type.mask_bit() != 0
    }

    /// Returns `true` if servers are accepted.
    #[inline]
    pub const fn accepts_server(&self) -> bool {
        self.0 & Self::SERVER != 0
    }
}

impl Default for ApplicationTypeMask {
    fn default() -> Self {
        Self::ALL
    }
}

// =============================================================================
// StatusEvent
// =============================================================================

/// Lifecycle status events surfaced to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusEvent {
    /// A client session was started.
    ClientStarted,
    /// A client session was stopped.
    StopClient,
    /// The hosted server was started.
    ServerStarted,
    /// The hosted server was stopped.
    StopServer,
    /// The network connection was established.
    Connected,
    /// The network connection was lost.
    Disconnected,
}

impl StatusEvent {
    /// Returns `true` if this is a start event.
    #[inline]
    pub const fn is_start(&self) -> bool {
        matches!(self, Self::ClientStarted | Self::ServerStarted)
    }

    /// Returns `true` if this is a stop event.
    #[inline]
    pub const fn is_stop(&self) -> bool {
        matches!(self, Self::StopClient | Self::StopServer)
    }

    /// Returns `true` if this is a network-level event.
    #[inline]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Connected | Self::Disconnected)
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ClientStarted => "ClientStarted",
            Self::StopClient => "StopClient",
            Self::ServerStarted => "ServerStarted",
            Self::StopServer => "StopServer",
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
        };
        write!(f, "{}", name)
    }
}

// =============================================================================
// SubscriptionRequest
// =============================================================================

/// The lifecycle action carried by a subscription request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionAction {
    /// Create a subscription and its monitored items.
    Create,
    /// Modify an existing subscription and its monitored item.
    Modify,
    /// Delete a monitored item (and the subscription when it was the last).
    Delete,
    /// Ask the server to retransmit a missed notification.
    Republish,
}

impl fmt::Display for SubscriptionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "Create"),
            Self::Modify => write!(f, "Modify"),
            Self::Delete => write!(f, "Delete"),
            Self::Republish => write!(f, "Republish"),
        }
    }
}

/// Per-node subscription parameters carried inside a request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// Requested lifecycle action.
    pub action: SubscriptionAction,

    /// Publishing interval requested from the server.
    #[serde(default = "default_publishing_interval")]
    #[serde(with = "humantime_serde")]
    pub publishing_interval: Duration,

    /// Lifetime count (publishing intervals before the subscription expires).
    #[serde(default = "default_lifetime_count")]
    pub lifetime_count: u32,

    /// Max keep-alive count.
    #[serde(default = "default_keepalive_count")]
    pub max_keepalive_count: u32,

    /// Maximum notifications per publish response.
    #[serde(default = "default_max_notifications")]
    pub max_notifications_per_publish: u32,

    /// Subscription priority (0-255).
    #[serde(default)]
    pub priority: u8,

    /// Whether publishing is enabled.
    #[serde(default = "default_true")]
    pub publishing_enabled: bool,

    /// Sampling interval for the monitored item.
    #[serde(default = "default_sampling_interval")]
    #[serde(with = "humantime_serde")]
    pub sampling_interval: Duration,

    /// Queue size for the monitored item.
    #[serde(default = "default_queue_size")]
    pub queue_size: u32,
}

fn default_publishing_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_lifetime_count() -> u32 {
    60
}

fn default_keepalive_count() -> u32 {
    10
}

fn default_max_notifications() -> u32 {
    65535
}

fn default_sampling_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_queue_size() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

impl SubscriptionRequest {
    /// Creates a request for the given action with default parameters.
    pub fn new(action: SubscriptionAction) -> Self {
        Self {
            action,
            publishing_interval: default_publishing_interval(),
            lifetime_count: default_lifetime_count(),
            max_keepalive_count: default_keepalive_count(),
            max_notifications_per_publish: default_max_notifications(),
            priority: 0,
            publishing_enabled: true,
            sampling_interval: default_sampling_interval(),
            queue_size: default_queue_size(),
        }
    }

    /// Sets the publishing interval.
    pub fn with_publishing_interval(mut self, interval: Duration) -> Self {
        self.publishing_interval = interval;
        self
    }

    /// Sets the sampling interval.
    pub fn with_sampling_interval(mut self, interval: Duration) -> Self {
        self.sampling_interval = interval;
        self
    }

    /// Sets the queue size.
    pub fn with_queue_size(mut self, size: u32) -> Self {
        self.queue_size = size;
        self
    }
}

// =============================================================================
// AdapterConfig
// =============================================================================

/// Adapter-wide configuration.
///
/// # Examples
///
/// ```
/// use opcua_adapter::types::{AdapterConfig, ApplicationTypeMask};
///
/// let config = AdapterConfig::builder()
///     .application_name("Gateway South")
///     .supported_application_types(ApplicationTypeMask(
///         ApplicationTypeMask::SERVER | ApplicationTypeMask::DISCOVERY_SERVER,
///     ))
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Application name used in diagnostics.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Bitmask of application types accepted by discovery.
    #[serde(default)]
    pub supported_application_types: ApplicationTypeMask,

    /// Request timeout handed to the stack for service calls.
    #[serde(default = "default_request_timeout")]
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Default subscription parameters for requests that omit them.
    #[serde(default = "default_subscription_request")]
    pub default_subscription: SubscriptionRequest,
}

fn default_application_name() -> String {
    "OPC UA Adapter".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_subscription_request() -> SubscriptionRequest {
    SubscriptionRequest::new(SubscriptionAction::Create)
}

impl AdapterConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> AdapterConfigBuilder {
        AdapterConfigBuilder::default()
    }

    /// Validates this configuration.
    pub fn validate(&self) -> Result<(), AdapterError> {
        if self.application_name.is_empty() {
            return Err(AdapterError::configuration(
                ConfigurationError::missing_field("application_name"),
            ));
        }
        if self.supported_application_types.0 == 0 {
            return Err(AdapterError::configuration(ConfigurationError::invalid(
                "supported_application_types",
                "At least one application type must be accepted",
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(AdapterError::configuration(ConfigurationError::invalid(
                "request_timeout",
                "Request timeout must be greater than 0",
            )));
        }
        Ok(())
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            supported_application_types: ApplicationTypeMask::default(),
            request_timeout: default_request_timeout(),
            default_subscription: default_subscription_request(),
        }
    }
}

// =============================================================================
// AdapterConfigBuilder
// =============================================================================

/// Builder for [`AdapterConfig`].
#[derive(Debug, Default)]
pub struct AdapterConfigBuilder {
    application_name: Option<String>,
    supported_application_types: Option<ApplicationTypeMask>,
    request_timeout: Option<Duration>,
    default_subscription: Option<SubscriptionRequest>,
}

impl AdapterConfigBuilder {
    /// Sets the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Sets the accepted application types.
    pub fn supported_application_types(mut self, mask: ApplicationTypeMask) -> Self {
        self.supported_application_types = Some(mask);
        self
    }

    /// Sets the request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the default subscription parameters.
    pub fn default_subscription(mut self, request: SubscriptionRequest) -> Self {
        self.default_subscription = Some(request);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<AdapterConfig, AdapterError> {
        let config = AdapterConfig {
            application_name: self.application_name.unwrap_or_else(default_application_name),
            supported_application_types: self.supported_application_types.unwrap_or_default(),
            request_timeout: self.request_timeout.unwrap_or_else(default_request_timeout),
            default_subscription: self
                .default_subscription
                .unwrap_or_else(default_subscription_request),
        };
        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_to_opc_string() {
        assert_eq!(NodeId::numeric(2, 1001).to_opc_string(), "ns=2;i=1001");
        assert_eq!(NodeId::string(2, "MyNode").to_opc_string(), "ns=2;s=MyNode");
        assert_eq!(NodeId::numeric(0, 84).to_opc_string(), "i=84");
    }

    #[test]
    fn test_node_id_parse() {
        let parsed: NodeId = "ns=2;s=Temperature".parse().unwrap();
        assert_eq!(parsed, NodeId::string(2, "Temperature"));

        let parsed: NodeId = "i=84".parse().unwrap();
        assert_eq!(parsed, NodeId::ROOT_FOLDER);

        let parsed: NodeId = "ns=3;g=550e8400-e29b-41d4-a716-446655440000"
            .parse()
            .unwrap();
        assert_eq!(parsed.namespace_index, 3);
        assert!(matches!(parsed.identifier, NodeIdentifier::Guid(_)));

        assert!("ns=2".parse::<NodeId>().is_err());
        assert!("ns=2;x=1".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_node_id_null() {
        assert!(NodeId::null().is_null());
        assert!(!NodeId::ROOT_FOLDER.is_null());
        assert_eq!(NodeId::default(), NodeId::null());
    }

    #[test]
    fn test_alias_type_char() {
        assert_eq!(NodeIdentifier::Numeric(1).alias_type_char(), 'I');
        assert_eq!(NodeIdentifier::String("a".into()).alias_type_char(), 'S');
        assert_eq!(NodeIdentifier::Opaque(vec![1]).alias_type_char(), 'B');
        assert_eq!(NodeIdentifier::Guid(Uuid::nil()).alias_type_char(), 'G');
    }

    #[test]
    fn test_node_class_mask() {
        assert!(NodeClass::Object.in_mask(NodeClass::BROWSE_MASK));
        assert!(NodeClass::Variable.in_mask(NodeClass::BROWSE_MASK));
        assert!(NodeClass::Method.in_mask(NodeClass::BROWSE_MASK));
        assert!(NodeClass::View.in_mask(NodeClass::BROWSE_MASK));
        assert!(!NodeClass::ObjectType.in_mask(NodeClass::BROWSE_MASK));

        assert!(NodeClass::View.in_mask(NodeClass::VIEW_MASK));
        assert!(!NodeClass::Variable.in_mask(NodeClass::VIEW_MASK));
    }

    #[test]
    fn test_browse_direction_matches() {
        assert!(BrowseDirection::Forward.matches(true));
        assert!(!BrowseDirection::Forward.matches(false));
        assert!(BrowseDirection::Inverse.matches(false));
        assert!(!BrowseDirection::Inverse.matches(true));
        assert!(BrowseDirection::Both.matches(true));
        assert!(BrowseDirection::Both.matches(false));
    }

    #[test]
    fn test_application_type_mask() {
        let mask = ApplicationTypeMask(ApplicationTypeMask::SERVER);
        assert!(mask.accepts(ApplicationType::Server));
        assert!(!mask.accepts(ApplicationType::Client));

        assert!(ApplicationTypeMask::ALL.accepts(ApplicationType::DiscoveryServer));
    }

    #[test]
    fn test_status_event_kinds() {
        assert!(StatusEvent::ClientStarted.is_start());
        assert!(StatusEvent::StopClient.is_stop());
        assert!(StatusEvent::Connected.is_network());
        assert!(!StatusEvent::Connected.is_start());
    }

    #[test]
    fn test_config_builder() {
        let config = AdapterConfig::builder()
            .application_name("Test")
            .request_timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(config.application_name, "Test");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_config_validation() {
        let result = AdapterConfig::builder()
            .supported_application_types(ApplicationTypeMask(0))
            .build();
        assert!(result.is_err());

        let result = AdapterConfig::builder()
            .request_timeout(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }
}
