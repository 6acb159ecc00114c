// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Adapter error types.
//!
//! This module provides the error hierarchy for adapter operations:
//!
//! ```text
//! AdapterError
//! ├── Connection    - Session registry and endpoint issues
//! ├── Discovery     - FindServers / GetEndpoints failures
//! ├── Operation     - Read / write / method failures
//! ├── Browse        - Browse engine failures
//! ├── Subscription  - Subscription and monitored item errors
//! ├── Conversion    - Value translation errors
//! └── Configuration - Invalid settings
//! ```
//!
//! Local precondition failures (unknown session, duplicate alias, request
//! over the batch cap) surface synchronously through these types; everything
//! that happens after a service call has been issued flows through the
//! receive queue as an error response instead.

use thiserror::Error;

use crate::transport::StatusCode;

/// Convenient result alias for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

// =============================================================================
// AdapterError
// =============================================================================

/// The main error type for adapter operations.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Connection and session registry errors.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Discovery errors.
    #[error("{0}")]
    Discovery(#[from] DiscoveryError),

    /// Read/write/method operation errors.
    #[error("{0}")]
    Operation(#[from] OperationError),

    /// Browse engine errors.
    #[error("{0}")]
    Browse(#[from] BrowseError),

    /// Subscription and monitored item errors.
    #[error("{0}")]
    Subscription(#[from] SubscriptionError),

    /// Value conversion errors.
    #[error("{0}")]
    Conversion(#[from] ConversionError),

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),
}

impl AdapterError {
    /// Creates a connection error.
    #[inline]
    pub fn connection(error: ConnectionError) -> Self {
        Self::Connection(error)
    }

    /// Creates a discovery error.
    #[inline]
    pub fn discovery(error: DiscoveryError) -> Self {
        Self::Discovery(error)
    }

    /// Creates an operation error.
    #[inline]
    pub fn operation(error: OperationError) -> Self {
        Self::Operation(error)
    }

    /// Creates a browse error.
    #[inline]
    pub fn browse(error: BrowseError) -> Self {
        Self::Browse(error)
    }

    /// Creates a subscription error.
    #[inline]
    pub fn subscription(error: SubscriptionError) -> Self {
        Self::Subscription(error)
    }

    /// Creates a conversion error.
    #[inline]
    pub fn conversion(error: ConversionError) -> Self {
        Self::Conversion(error)
    }

    /// Creates a configuration error.
    #[inline]
    pub fn configuration(error: ConfigurationError) -> Self {
        Self::Configuration(error)
    }

    /// Creates an unknown-session error for the given endpoint.
    pub fn unknown_session(endpoint: impl Into<String>) -> Self {
        Self::Connection(ConnectionError::UnknownSession {
            endpoint: endpoint.into(),
        })
    }

    /// Returns the error category for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Discovery(_) => "discovery",
            Self::Operation(_) => "operation",
            Self::Browse(_) => "browse",
            Self::Subscription(_) => "subscription",
            Self::Conversion(_) => "conversion",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Returns the stack status code behind this error, if one exists.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Operation(OperationError::Service { status, .. }) => Some(*status),
            Self::Subscription(SubscriptionError::Service { status, .. }) => Some(*status),
            Self::Subscription(SubscriptionError::DuplicateAlias { .. })
            | Self::Subscription(SubscriptionError::AlreadySubscribed { .. }) => {
                Some(StatusCode::BAD_REQUEST_CANCELLED_BY_CLIENT)
            }
            Self::Subscription(SubscriptionError::SubscriptionIdCollision { .. }) => {
                Some(StatusCode::BAD_SUBSCRIPTION_ID_INVALID)
            }
            Self::Subscription(SubscriptionError::NotSubscribed { .. }) => {
                Some(StatusCode::BAD_NO_SUBSCRIPTION)
            }
            _ => None,
        }
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Connection and session registry errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// A session for the endpoint's host:port already exists.
    #[error("Client already connected to '{endpoint}'")]
    AlreadyConnected {
        /// The requested endpoint URL.
        endpoint: String,
    },

    /// The stack failed to connect.
    #[error("Failed to connect to '{endpoint}': {reason}")]
    ConnectFailed {
        /// The requested endpoint URL.
        endpoint: String,
        /// Failure description from the stack.
        reason: String,
    },

    /// No session is registered for the endpoint.
    #[error("No session for endpoint '{endpoint}'")]
    UnknownSession {
        /// The requested endpoint URL.
        endpoint: String,
    },

    /// The endpoint URL could not be parsed.
    #[error("Invalid endpoint URL '{url}': {reason}")]
    InvalidEndpoint {
        /// The invalid URL.
        url: String,
        /// Parse failure description.
        reason: String,
    },
}

impl ConnectionError {
    /// Creates an already-connected error.
    pub fn already_connected(endpoint: impl Into<String>) -> Self {
        Self::AlreadyConnected {
            endpoint: endpoint.into(),
        }
    }

    /// Creates a connect-failed error.
    pub fn connect_failed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid-endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// DiscoveryError
// =============================================================================

/// Discovery service errors.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// FindServers returned a bad service result.
    #[error("FindServers failed for '{url}': {status}")]
    FindServersFailed {
        /// Discovery URL.
        url: String,
        /// Service status from the stack.
        status: StatusCode,
    },

    /// GetEndpoints returned a bad service result.
    #[error("GetEndpoints failed for '{url}': {status}")]
    GetEndpointsFailed {
        /// Discovery URL.
        url: String,
        /// Service status from the stack.
        status: StatusCode,
    },
}

impl DiscoveryError {
    /// Creates a find-servers failure.
    pub fn find_servers_failed(url: impl Into<String>, status: StatusCode) -> Self {
        Self::FindServersFailed {
            url: url.into(),
            status,
        }
    }

    /// Creates a get-endpoints failure.
    pub fn get_endpoints_failed(url: impl Into<String>, status: StatusCode) -> Self {
        Self::GetEndpointsFailed {
            url: url.into(),
            status,
        }
    }
}

// =============================================================================
// OperationError
// =============================================================================

/// Read, write and method-call errors.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The request carried no node requests.
    #[error("Request message carries no requests")]
    EmptyRequest,

    /// The stack returned a bad service result for the whole batch.
    #[error("Service call failed: {status} ({context})")]
    Service {
        /// Service status from the stack.
        status: StatusCode,
        /// What was being attempted.
        context: String,
    },

    /// A method request did not name a method node.
    #[error("Method request for object '{object}' has no method id")]
    MissingMethodId {
        /// The target object node.
        object: String,
    },

    /// A write request element carried no value.
    #[error("Write request for node '{node}' carries no value")]
    MissingWriteValue {
        /// The target node.
        node: String,
    },
}

impl OperationError {
    /// Creates a service failure.
    pub fn service(status: StatusCode, context: impl Into<String>) -> Self {
        Self::Service {
            status,
            context: context.into(),
        }
    }
}

// =============================================================================
// BrowseError
// =============================================================================

/// Browse engine errors.
#[derive(Debug, Error)]
pub enum BrowseError {
    /// More start nodes than the multi-node browse cap allows.
    #[error("Browse request carries {count} start nodes, cap is {cap}")]
    RequestTooLarge {
        /// Requested start node count.
        count: usize,
        /// The configured cap.
        cap: usize,
    },

    /// A browse-next request carried no continuation points.
    #[error("BrowseNext request carries no continuation points")]
    NoContinuationPoints,

    /// The browse call failed before any result could be delivered.
    #[error("Browse failed: {reason}")]
    Failed {
        /// Failure description.
        reason: String,
    },
}

impl BrowseError {
    /// Creates a request-too-large error.
    pub fn request_too_large(count: usize, cap: usize) -> Self {
        Self::RequestTooLarge { count, cap }
    }

    /// Creates a generic browse failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// SubscriptionError
// =============================================================================

/// Subscription and monitored item errors.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Two entries of one request share a value alias.
    #[error("Subscription request contains duplicate value alias '{alias}'")]
    DuplicateAlias {
        /// The duplicated alias.
        alias: String,
    },

    /// The alias is already subscribed on this session.
    #[error("Node '{alias}' is already subscribed on this session")]
    AlreadySubscribed {
        /// The conflicting alias.
        alias: String,
    },

    /// No subscription record exists for the alias.
    #[error("No subscription for value alias '{alias}'")]
    NotSubscribed {
        /// The unknown alias.
        alias: String,
    },

    /// The server returned a subscription id that is already tracked.
    #[error("Server returned an already-tracked subscription id {subscription_id}")]
    SubscriptionIdCollision {
        /// The colliding id.
        subscription_id: u32,
    },

    /// A subscription service call failed.
    #[error("Subscription service failed: {status} ({context})")]
    Service {
        /// Service status from the stack.
        status: StatusCode,
        /// What was being attempted.
        context: String,
    },
}

impl SubscriptionError {
    /// Creates a duplicate-alias error.
    pub fn duplicate_alias(alias: impl Into<String>) -> Self {
        Self::DuplicateAlias {
            alias: alias.into(),
        }
    }

    /// Creates an already-subscribed error.
    pub fn already_subscribed(alias: impl Into<String>) -> Self {
        Self::AlreadySubscribed {
            alias: alias.into(),
        }
    }

    /// Creates a not-subscribed error.
    pub fn not_subscribed(alias: impl Into<String>) -> Self {
        Self::NotSubscribed {
            alias: alias.into(),
        }
    }

    /// Creates a service failure.
    pub fn service(status: StatusCode, context: impl Into<String>) -> Self {
        Self::Service {
            status,
            context: context.into(),
        }
    }
}

// =============================================================================
// ConversionError
// =============================================================================

/// Value translation errors.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// A variant type has no mapping in the decoding table.
    #[error("Unsupported wire type: {type_name}")]
    UnsupportedType {
        /// Name of the offending wire type.
        type_name: String,
    },

    /// The wire bytes do not form a value of the claimed type.
    #[error("Malformed {type_name} value: {reason}")]
    Malformed {
        /// Name of the offending wire type.
        type_name: String,
        /// Failure description.
        reason: String,
    },

    /// A value cannot be encoded for the wire.
    #[error("Cannot encode {type_name} value: {reason}")]
    Encode {
        /// Name of the offending value type.
        type_name: String,
        /// Failure description.
        reason: String,
    },
}

impl ConversionError {
    /// Creates an unsupported-type error.
    pub fn unsupported(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    /// Creates a malformed-value error.
    pub fn malformed(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an encode error.
    pub fn encode(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Encode {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A required field is missing.
    #[error("Missing required configuration field: {field}")]
    MissingField {
        /// The missing field.
        field: String,
    },

    /// A field holds an invalid value.
    #[error("Invalid configuration for '{field}': {reason}")]
    Invalid {
        /// The offending field.
        field: String,
        /// Why the value is rejected.
        reason: String,
    },

    /// A node id string could not be parsed.
    #[error("Invalid node id '{node_id}': {reason}")]
    InvalidNodeId {
        /// The input string.
        node_id: String,
        /// Parse failure description.
        reason: String,
    },
}

impl ConfigurationError {
    /// Creates a missing-field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates an invalid-value error.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid node id error.
    pub fn invalid_node_id(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let err = AdapterError::connection(ConnectionError::already_connected("opc.tcp://x:1"));
        assert_eq!(err.category(), "connection");

        let err = AdapterError::subscription(SubscriptionError::duplicate_alias("Temp"));
        assert_eq!(err.category(), "subscription");
    }

    #[test]
    fn test_status_code_mapping() {
        let err = AdapterError::subscription(SubscriptionError::duplicate_alias("Temp"));
        assert_eq!(
            err.status_code(),
            Some(StatusCode::BAD_REQUEST_CANCELLED_BY_CLIENT)
        );

        let err = AdapterError::subscription(SubscriptionError::not_subscribed("Temp"));
        assert_eq!(err.status_code(), Some(StatusCode::BAD_NO_SUBSCRIPTION));

        let err = AdapterError::connection(ConnectionError::already_connected("opc.tcp://x:1"));
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_error_display() {
        let err = AdapterError::connection(ConnectionError::connect_failed(
            "opc.tcp://host:4840",
            "refused",
        ));
        let text = err.to_string();
        assert!(text.contains("opc.tcp://host:4840"));
        assert!(text.contains("refused"));
    }
}
