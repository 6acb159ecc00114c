// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client session registry.
//!
//! One live stack client per `host:port`. Two endpoint URLs with the same
//! host and port map to the same session; the key is produced by the stack's
//! URL parser, which also owns default-port resolution. The registry never
//! appends a port itself.
//!
//! The registry hands out `Arc<ClientSession>` handles that the verb
//! components share with the subscription engine. A session's publish pump
//! holds only a clone of the service handle and never outlives the session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{AdapterResult, ConnectionError};
use crate::subscription::SubscriptionMap;
use crate::transport::{UaSession, UaStack};

// =============================================================================
// ClientSession
// =============================================================================

/// A live connection to one server, keyed by canonical `host:port`.
pub struct ClientSession {
    key: String,
    endpoint: String,
    services: Arc<dyn UaSession>,
    subscriptions: Arc<SubscriptionMap>,
}

impl ClientSession {
    /// Creates a session around a freshly connected stack client.
    pub fn new(key: String, endpoint: String, services: Arc<dyn UaSession>) -> Self {
        Self {
            key,
            endpoint,
            services,
            subscriptions: Arc::new(SubscriptionMap::new()),
        }
    }

    /// Returns the canonical `host:port` session key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the endpoint URL the session was connected with.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the stack service surface of this session.
    pub fn services(&self) -> &Arc<dyn UaSession> {
        &self.services
    }

    /// Returns this session's subscription state.
    pub fn subscriptions(&self) -> &Arc<SubscriptionMap> {
        &self.subscriptions
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("key", &self.key)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

// =============================================================================
// SessionRegistry
// =============================================================================

/// Maps endpoint keys to live client sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<ClientSession>>>,
    count: AtomicUsize,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            count: AtomicUsize::new(0),
        }
    }

    /// Normalizes an endpoint URL to its session key.
    pub fn session_key(stack: &dyn UaStack, endpoint_url: &str) -> AdapterResult<String> {
        Ok(stack.parse_endpoint_url(endpoint_url)?.session_key())
    }

    /// Connects a new client session for the endpoint.
    ///
    /// Fails with `AlreadyConnected` when a session for the same `host:port`
    /// exists, and with `ConnectFailed` when the stack cannot connect (the
    /// half-built client is dropped).
    pub async fn connect(
        &self,
        stack: &dyn UaStack,
        endpoint_url: &str,
    ) -> AdapterResult<Arc<ClientSession>> {
        let key = Self::session_key(stack, endpoint_url)?;

        {
            let sessions = self.sessions.read().await;
            if sessions.contains_key(&key) {
                tracing::warn!(endpoint = endpoint_url, key = %key, "client already connected");
                return Err(ConnectionError::already_connected(endpoint_url).into());
            }
        }

        let services = stack.connect(endpoint_url).await.map_err(|e| {
            tracing::error!(endpoint = endpoint_url, error = %e, "client connect failed");
            ConnectionError::connect_failed(endpoint_url, e.to_string())
        })?;

        let session = Arc::new(ClientSession::new(
            key.clone(),
            endpoint_url.to_string(),
            services,
        ));

        let mut sessions = self.sessions.write().await;
        // A racing connect for the same key loses here, after the stack
        // round-trip; drop its client and report the conflict.
        if sessions.contains_key(&key) {
            session.services().disconnect().await;
            return Err(ConnectionError::already_connected(endpoint_url).into());
        }
        sessions.insert(key.clone(), Arc::clone(&session));
        self.count.fetch_add(1, Ordering::SeqCst);

        tracing::info!(endpoint = endpoint_url, key = %key, "client connected");
        Ok(session)
    }

    /// Looks up the session for an endpoint URL.
    pub async fn get(
        &self,
        stack: &dyn UaStack,
        endpoint_url: &str,
    ) -> AdapterResult<Option<Arc<ClientSession>>> {
        let key = Self::session_key(stack, endpoint_url)?;
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&key).cloned())
    }

    /// Removes and returns the session for an endpoint URL.
    ///
    /// The caller stops the publish pump and closes the stack client; the
    /// registry only owns the map and the count.
    pub async fn remove(
        &self,
        stack: &dyn UaStack,
        endpoint_url: &str,
    ) -> AdapterResult<Option<Arc<ClientSession>>> {
        let key = Self::session_key(stack, endpoint_url)?;
        let removed = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(&key)
        };
        if removed.is_some() {
            self.count.fetch_sub(1, Ordering::SeqCst);
            tracing::info!(endpoint = endpoint_url, key = %key, "client removed from registry");
        }
        Ok(removed)
    }

    /// Returns the number of live sessions.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use crate::transport::{
        ApplicationDescription, BrowseDescription, DataChangeHandler, DataValue,
        EndpointDescription, MonitorContext, MonitoredItemRequest, MonitoringParameters,
        ParsedEndpoint, ReadValueId, ServiceResult, StatusCode, SubscriptionParameters,
        UaBrowseResult, UaVariant, WriteValue,
    };
    use crate::types::{MonitoringMode, NodeId};
    use async_trait::async_trait;
    use std::time::Duration;

    struct NullSession;

    #[async_trait]
    impl UaSession for NullSession {
        async fn read(&self, _nodes: &[ReadValueId]) -> ServiceResult<Vec<DataValue>> {
            Ok(Vec::new())
        }
        async fn write(&self, _writes: &[WriteValue]) -> ServiceResult<Vec<StatusCode>> {
            Ok(Vec::new())
        }
        async fn browse(
            &self,
            _max: u32,
            _nodes: &[BrowseDescription],
        ) -> ServiceResult<Vec<UaBrowseResult>> {
            Ok(Vec::new())
        }
        async fn browse_next(&self, _cps: &[Vec<u8>]) -> ServiceResult<Vec<UaBrowseResult>> {
            Ok(Vec::new())
        }
        async fn call_method(
            &self,
            _object_id: &NodeId,
            _method_id: &NodeId,
            _inputs: &[UaVariant],
        ) -> ServiceResult<Vec<UaVariant>> {
            Ok(Vec::new())
        }
        async fn create_subscription(&self, _params: &SubscriptionParameters) -> ServiceResult<u32> {
            Ok(1)
        }
        async fn create_monitored_item(
            &self,
            _subscription_id: u32,
            _item: &MonitoredItemRequest,
            _context: MonitorContext,
            _handler: DataChangeHandler,
        ) -> ServiceResult<u32> {
            Ok(1)
        }
        async fn modify_subscription(
            &self,
            _subscription_id: u32,
            _params: &SubscriptionParameters,
        ) -> ServiceResult<()> {
            Ok(())
        }
        async fn modify_monitored_item(
            &self,
            _subscription_id: u32,
            _monitored_item_id: u32,
            _params: &MonitoringParameters,
        ) -> ServiceResult<()> {
            Ok(())
        }
        async fn set_monitoring_mode(
            &self,
            _subscription_id: u32,
            _monitored_item_id: u32,
            _mode: MonitoringMode,
        ) -> ServiceResult<()> {
            Ok(())
        }
        async fn set_publishing_mode(
            &self,
            _subscription_id: u32,
            _enabled: bool,
        ) -> ServiceResult<()> {
            Ok(())
        }
        async fn delete_subscription(&self, _subscription_id: u32) -> ServiceResult<()> {
            Ok(())
        }
        async fn delete_monitored_item(
            &self,
            _subscription_id: u32,
            _monitored_item_id: u32,
        ) -> ServiceResult<()> {
            Ok(())
        }
        async fn republish(
            &self,
            _subscription_id: u32,
            _retransmit_sequence_number: u32,
        ) -> ServiceResult<()> {
            Ok(())
        }
        async fn run_iterate(&self, _budget: Duration) -> StatusCode {
            StatusCode::GOOD
        }
        async fn disconnect(&self) -> StatusCode {
            StatusCode::GOOD
        }
    }

    struct NullStack;

    #[async_trait]
    impl UaStack for NullStack {
        fn parse_endpoint_url(&self, url: &str) -> AdapterResult<ParsedEndpoint> {
            let rest = url.strip_prefix("opc.tcp://").ok_or_else(|| {
                AdapterError::connection(ConnectionError::invalid_endpoint(url, "bad scheme"))
            })?;
            let (host, port) = rest.split_once(':').ok_or_else(|| {
                AdapterError::connection(ConnectionError::invalid_endpoint(url, "no port"))
            })?;
            Ok(ParsedEndpoint {
                host: host.to_string(),
                port: port.trim_end_matches('/').parse().map_err(|_| {
                    AdapterError::connection(ConnectionError::invalid_endpoint(url, "bad port"))
                })?,
                path: String::new(),
            })
        }

        async fn connect(&self, _endpoint_url: &str) -> AdapterResult<Arc<dyn UaSession>> {
            Ok(Arc::new(NullSession))
        }

        async fn find_servers(&self, _url: &str) -> ServiceResult<Vec<ApplicationDescription>> {
            Ok(Vec::new())
        }

        async fn get_endpoints(&self, _url: &str) -> ServiceResult<Vec<EndpointDescription>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_connect_and_get() {
        let registry = SessionRegistry::new();
        let stack = NullStack;

        let session = registry
            .connect(&stack, "opc.tcp://plc7:4840")
            .await
            .unwrap();
        assert_eq!(session.key(), "plc7:4840");
        assert_eq!(registry.count(), 1);

        let found = registry.get(&stack, "opc.tcp://plc7:4840").await.unwrap();
        assert!(found.is_some());

        // A different URL with the same host:port resolves to the same session.
        let found = registry.get(&stack, "opc.tcp://plc7:4840/").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_double_connect_rejected() {
        let registry = SessionRegistry::new();
        let stack = NullStack;

        registry
            .connect(&stack, "opc.tcp://plc7:4840")
            .await
            .unwrap();
        let err = registry
            .connect(&stack, "opc.tcp://plc7:4840")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AdapterError::Connection(ConnectionError::AlreadyConnected { .. })
        ));
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = SessionRegistry::new();
        let stack = NullStack;

        registry
            .connect(&stack, "opc.tcp://plc7:4840")
            .await
            .unwrap();
        let removed = registry.remove(&stack, "opc.tcp://plc7:4840").await.unwrap();
        assert!(removed.is_some());
        assert_eq!(registry.count(), 0);

        let removed = registry.remove(&stack, "opc.tcp://plc7:4840").await.unwrap();
        assert!(removed.is_none());
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let registry = SessionRegistry::new();
        let stack = NullStack;

        let err = registry.connect(&stack, "http://plc7:4840").await.unwrap_err();
        assert!(matches!(
            err,
            AdapterError::Connection(ConnectionError::InvalidEndpoint { .. })
        ));
    }
}
