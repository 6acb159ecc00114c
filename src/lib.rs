// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! High-level asynchronous OPC UA client/server adapter.
//!
//! This crate turns a low-level OPC UA wire stack into a message-oriented,
//! callback-driven API. An application configures the adapter once, connects
//! clients to one or more servers, and then issues read/write/browse/method/
//! subscription requests; all data results are delivered asynchronously
//! through a receive queue to the application's callbacks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        OpcUaAdapter                             │
//! │        (facade: validates requests, resolves sessions)          │
//! └─────────────────────────────────────────────────────────────────┘
//!        │             │              │               │
//!        ▼             ▼              ▼               ▼
//! ┌───────────┐ ┌────────────┐ ┌────────────┐ ┌──────────────────┐
//! │ Read/Write│ │   Browse   │ │   Method   │ │   Subscription   │
//! │  dispatch │ │   engine   │ │    call    │ │ engine + pump    │
//! └───────────┘ └────────────┘ └────────────┘ └──────────────────┘
//!        │             │              │               │
//!        └─────────────┴──────┬───────┴───────────────┘
//!                             ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              ReceiveQueue → dispatcher → callbacks              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The wire stack itself (encoding, transport, security) is consumed through
//! the [`transport::UaStack`] and [`transport::UaSession`] traits, so the
//! adapter can be exercised end-to-end against an in-process fake.
//!
//! # Example
//!
//! ```rust,ignore
//! use opcua_adapter::{AdapterConfig, ChannelEvents, OpcUaAdapter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (events, mut rx) = ChannelEvents::with_channel();
//!     let config = AdapterConfig::builder().build()?;
//!     let adapter = OpcUaAdapter::new(config, stack, std::sync::Arc::new(events));
//!
//!     adapter.connect_client("opc.tcp://localhost:4840").await?;
//!
//!     let msg = adapter.new_request("opc.tcp://localhost:4840", Command::Read, nodes);
//!     adapter.read_node(msg).await?;
//!
//!     while let Some(response) = rx.recv().await {
//!         println!("response: {:?}", response);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod adapter;
pub mod browse;
pub mod discovery;
pub mod error;
pub mod message;
pub mod method;
pub mod queue;
pub mod readwrite;
pub mod session;
pub mod subscription;
pub mod transport;
pub mod types;
pub mod value;

// Re-export the application-facing surface.
pub use adapter::OpcUaAdapter;

pub use error::{
    AdapterError, AdapterResult, BrowseError, ConfigurationError, ConnectionError,
    ConversionError, DiscoveryError, OperationError, SubscriptionError,
};

pub use types::{
    AdapterConfig, AdapterConfigBuilder, ApplicationType, ApplicationTypeMask, BrowseDirection,
    MonitoringMode, NodeClass, NodeId, NodeIdentifier, StatusEvent, SubscriptionAction,
    SubscriptionRequest,
};

pub use message::{
    AdapterStatus, BrowseParameters, BrowseResult, Command, ContinuationPoint, NodeInfo,
    NodeRequest, NodeResponse, RequestMessage, ResponseKind, ResponseMessage, UnixTime,
    ValuePayload, MAX_BROWSE_REQUEST_SIZE,
};

pub use queue::{AdapterEvents, ChannelEvents, QueuedEvent};

pub use value::{LocalizedText, OpcUaValue, QualifiedName, ValueCodec};

pub use transport::{
    ApplicationDescription, BrowseDescription, DataChangeEvent, DataChangeHandler, DataValue,
    EndpointDescription, MonitorContext, MonitoredItemRequest, MonitoringParameters,
    ParsedEndpoint, ReadAttribute, ReadValueId, ReferenceDescription, ServerDevice, ServiceResult,
    StatusCode, SubscriptionParameters, UaBrowseResult, UaDateTime, UaGuid, UaScalar,
    UaServerBackend, UaSession, UaStack, UaVariant, WriteValue,
};

pub use session::{ClientSession, SessionRegistry};

pub use subscription::{SubRecord, SubscriptionMap};

pub use discovery::validate_application_description;
