// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The adapter facade.
//!
//! [`OpcUaAdapter`] is the context object the application talks to. It owns
//! the session registry, the receive queue, the process-wide serialization
//! lock and the message-id counter. Everything is instance state, so tests
//! can spin up independent adapters in parallel.
//!
//! Every verb validates its arguments synchronously and returns a plain
//! `AdapterResult<()>`; data results are delivered asynchronously through
//! the receive queue. Discovery is the exception: its results return
//! directly to the caller.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::browse;
use crate::discovery;
use crate::error::{AdapterResult, OperationError};
use crate::message::{Command, NodeRequest, RequestMessage};
use crate::method;
use crate::queue::{AdapterEvents, QueueSender, ReceiveQueue};
use crate::readwrite;
use crate::session::{ClientSession, SessionRegistry};
use crate::subscription;
use crate::transport::{ApplicationDescription, UaServerBackend, UaStack};
use crate::types::{AdapterConfig, StatusEvent};

// =============================================================================
// OpcUaAdapter
// =============================================================================

/// The application-facing adapter context.
pub struct OpcUaAdapter {
    config: AdapterConfig,
    stack: Arc<dyn UaStack>,
    registry: SessionRegistry,
    queue: ReceiveQueue,
    publish_lock: Arc<Mutex<()>>,
    next_message_id: AtomicU32,
    server: Option<Arc<dyn UaServerBackend>>,
    server_started: AtomicBool,
}

impl OpcUaAdapter {
    /// Creates an adapter over the given stack, delivering results to the
    /// given callbacks.
    pub fn new(
        config: AdapterConfig,
        stack: Arc<dyn UaStack>,
        events: Arc<dyn AdapterEvents>,
    ) -> Self {
        Self {
            config,
            stack,
            registry: SessionRegistry::new(),
            queue: ReceiveQueue::new(events),
            publish_lock: Arc::new(Mutex::new(())),
            next_message_id: AtomicU32::new(1),
            server: None,
            server_started: AtomicBool::new(false),
        }
    }

    /// Attaches a server backend for `create_server`/`close_server`.
    pub fn with_server_backend(mut self, backend: Arc<dyn UaServerBackend>) -> Self {
        self.server = Some(backend);
        self
    }

    /// Returns the adapter configuration.
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Hands out the next request message id.
    pub fn next_message_id(&self) -> u32 {
        self.next_message_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Builds a request message with a freshly assigned message id.
    pub fn new_request(
        &self,
        endpoint: impl Into<String>,
        command: Command,
        requests: Vec<NodeRequest>,
    ) -> RequestMessage {
        RequestMessage::new(self.next_message_id(), endpoint, command, requests)
    }

    // =========================================================================
    // Client lifecycle
    // =========================================================================

    /// Connects a client to the endpoint.
    ///
    /// Fails with `AlreadyConnected` when a session for the same `host:port`
    /// exists. Emits `ClientStarted` on success.
    pub async fn connect_client(&self, endpoint_url: &str) -> AdapterResult<()> {
        self.registry.connect(self.stack.as_ref(), endpoint_url).await?;
        self.queue.ensure_started().await;
        self.queue
            .events()
            .on_status(endpoint_url, StatusEvent::ClientStarted);
        Ok(())
    }

    /// Disconnects the client session for the endpoint.
    ///
    /// Stops the session's publish pump, drains its subscription map, closes
    /// the stack client and emits `StopClient`. The last disconnect tears
    /// down the receive queue.
    pub async fn disconnect_client(&self, endpoint_url: &str) -> AdapterResult<()> {
        let session = self
            .registry
            .remove(self.stack.as_ref(), endpoint_url)
            .await?
            .ok_or_else(|| crate::error::AdapterError::unknown_session(endpoint_url))?;

        subscription::shutdown_session(&session).await;
        let status = session.services().disconnect().await;
        if status.is_bad() {
            tracing::warn!(endpoint = endpoint_url, status = %status, "client close reported an error");
        }

        self.queue
            .events()
            .on_status(endpoint_url, StatusEvent::StopClient);

        if self.registry.count() == 0 {
            self.queue.shutdown().await;
        }
        Ok(())
    }

    /// Returns the number of live client sessions.
    pub fn session_count(&self) -> usize {
        self.registry.count()
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Fetches the endpoint descriptions of a server and hands the device to
    /// the discovery callback.
    pub async fn get_endpoint_info(&self, endpoint_url: &str) -> AdapterResult<()> {
        let device = discovery::get_endpoints(self.stack.as_ref(), endpoint_url).await?;
        self.queue.events().on_device_found(device);
        Ok(())
    }

    /// Finds servers via the discovery URL and returns the descriptions that
    /// pass the configured filters.
    pub async fn find_servers(
        &self,
        url: &str,
        server_uris: &[String],
        locale_ids: &[String],
    ) -> AdapterResult<Vec<ApplicationDescription>> {
        discovery::find_servers(
            self.stack.as_ref(),
            url,
            self.config.supported_application_types,
            server_uris,
            locale_ids,
        )
        .await
    }

    // =========================================================================
    // Verbs
    // =========================================================================

    /// Reads the named nodes; the aggregated result arrives on the queue.
    pub async fn read_node(&self, msg: RequestMessage) -> AdapterResult<()> {
        let (session, sender) = self.prepare(&msg).await?;
        readwrite::execute_read(&session, &self.publish_lock, &sender, &msg).await
    }

    /// Writes the named nodes; the aggregated result arrives on the queue.
    pub async fn write_node(&self, msg: RequestMessage) -> AdapterResult<()> {
        let (session, sender) = self.prepare(&msg).await?;
        readwrite::execute_write(&session, &self.publish_lock, &sender, &msg).await
    }

    /// Invokes a method; outputs arrive on the queue.
    pub async fn call_method(&self, msg: RequestMessage) -> AdapterResult<()> {
        let (session, sender) = self.prepare(&msg).await?;
        method::execute_method(&session, &self.publish_lock, &sender, &msg).await
    }

    /// Recursively browses from the request's start nodes.
    pub async fn browse_node(&self, msg: RequestMessage) -> AdapterResult<()> {
        let (session, sender) = self.prepare(&msg).await?;
        browse::execute_browse(&session, &self.publish_lock, &sender, &msg, false).await
    }

    /// Browses collecting view nodes, then walks the collected views.
    pub async fn browse_views(&self, msg: RequestMessage) -> AdapterResult<()> {
        let (session, sender) = self.prepare(&msg).await?;
        browse::execute_browse(&session, &self.publish_lock, &sender, &msg, true).await
    }

    /// Continues a truncated browse from its continuation points.
    pub async fn browse_next(&self, msg: RequestMessage) -> AdapterResult<()> {
        let (session, sender) = self.prepare(&msg).await?;
        browse::execute_browse_next(&session, &self.publish_lock, &sender, &msg).await
    }

    /// Creates, modifies, deletes or republishes a subscription.
    pub async fn handle_subscription(&self, msg: RequestMessage) -> AdapterResult<()> {
        let (session, sender) = self.prepare(&msg).await?;
        subscription::execute_subscription(&session, &self.publish_lock, &sender, &msg).await
    }

    // =========================================================================
    // Server hosting
    // =========================================================================

    /// Starts the hosted server. A second start is a no-op.
    pub async fn create_server(&self, endpoint_url: &str) -> AdapterResult<()> {
        let backend = self.server_backend()?;
        if self.server_started.load(Ordering::SeqCst) {
            tracing::warn!("server already initialised");
            return Ok(());
        }
        backend.start(endpoint_url).await?;
        self.server_started.store(true, Ordering::SeqCst);
        self.queue
            .events()
            .on_status(endpoint_url, StatusEvent::ServerStarted);
        Ok(())
    }

    /// Stops the hosted server. A close without a running server is a no-op.
    pub async fn close_server(&self, endpoint_url: &str) -> AdapterResult<()> {
        let backend = self.server_backend()?;
        if !self.server_started.load(Ordering::SeqCst) {
            return Ok(());
        }
        backend.stop().await?;
        self.server_started.store(false, Ordering::SeqCst);
        self.queue
            .events()
            .on_status(endpoint_url, StatusEvent::StopServer);
        Ok(())
    }

    /// Creates a namespace on the hosted server.
    pub async fn create_namespace(
        &self,
        name: &str,
        root_node_id: &str,
        root_browse_name: &str,
        root_display_name: &str,
    ) -> AdapterResult<()> {
        self.server_backend()?
            .create_namespace(name, root_node_id, root_browse_name, root_display_name)
            .await
    }

    /// Adds a node on the hosted server.
    pub async fn create_node(
        &self,
        namespace_uri: &str,
        node_id: &crate::types::NodeId,
        browse_name: &str,
    ) -> AdapterResult<()> {
        self.server_backend()?
            .add_node(namespace_uri, node_id, browse_name)
            .await
    }

    /// Adds a reference between two nodes on the hosted server.
    pub async fn add_reference(
        &self,
        source: &crate::types::NodeId,
        target: &crate::types::NodeId,
        forward: bool,
    ) -> AdapterResult<()> {
        self.server_backend()?
            .add_reference(source, target, forward)
            .await
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Returns the number of distinct subscriptions on a session.
    pub async fn subscription_count(&self, endpoint_url: &str) -> AdapterResult<usize> {
        let session = self.session_for(endpoint_url).await?;
        Ok(session.subscriptions().subscription_count())
    }

    /// Returns `true` while the session's publish pump task is running.
    pub async fn pump_running(&self, endpoint_url: &str) -> AdapterResult<bool> {
        let session = self.session_for(endpoint_url).await?;
        Ok(session.subscriptions().pump_running().await)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn prepare(&self, msg: &RequestMessage) -> AdapterResult<(Arc<ClientSession>, QueueSender)> {
        if msg.requests.is_empty() {
            return Err(OperationError::EmptyRequest.into());
        }
        let session = self.session_for(&msg.endpoint).await?;
        let sender = self.queue.ensure_started().await;
        Ok((session, sender))
    }

    async fn session_for(&self, endpoint_url: &str) -> AdapterResult<Arc<ClientSession>> {
        self.registry
            .get(self.stack.as_ref(), endpoint_url)
            .await?
            .ok_or_else(|| crate::error::AdapterError::unknown_session(endpoint_url))
    }

    fn server_backend(&self) -> AdapterResult<&Arc<dyn UaServerBackend>> {
        self.server.as_ref().ok_or_else(|| {
            crate::error::ConfigurationError::missing_field("server backend").into()
        })
    }
}

impl std::fmt::Debug for OpcUaAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpcUaAdapter")
            .field("application_name", &self.config.application_name)
            .field("sessions", &self.registry.count())
            .finish()
    }
}
