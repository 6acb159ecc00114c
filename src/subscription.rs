// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscription engine and publish pump.
//!
//! Per session the engine keeps a map from value alias to subscription
//! record. Creating the first subscription starts a background pump task
//! that repeatedly asks the stack to drive one publish round; deleting the
//! last subscription stops and joins it. Data-change notifications arrive on
//! the stack's callback path, are resolved against the record map via the
//! item context's value alias, and leave as `Report` messages through the
//! receive queue.
//!
//! # Locking
//!
//! The process-wide serialization lock guards every publish round; request
//! traffic against a session with live subscriptions takes the same lock
//! around its service call. The record map itself is a plain mutex with
//! short, never-awaiting critical sections, because the data-change handler
//! runs synchronously inside the stack's publish processing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::{AdapterResult, SubscriptionError};
use crate::message::{
    NodeInfo, NodeResponse, RequestMessage, ResponseKind, ResponseMessage, UnixTime, ValuePayload,
};
use crate::queue::QueueSender;
use crate::session::ClientSession;
use crate::transport::{
    DataChangeEvent, DataChangeHandler, MonitorContext, MonitoredItemRequest,
    MonitoringParameters, StatusCode, SubscriptionParameters,
};
use crate::types::{MonitoringMode, SubscriptionAction, SubscriptionRequest};
use crate::value::ValueCodec;

/// Publish pump tick: the budget handed to the stack per round and the sleep
/// between rounds.
pub(crate) const PUBLISH_TICK: Duration = Duration::from_millis(5);

/// Default retransmit sequence number for republish requests.
pub(crate) const DEFAULT_RETRANSMIT_SEQUENCE: u32 = 2;

// =============================================================================
// SubRecord / SubscriptionMap
// =============================================================================

/// One subscription record, keyed by value alias within its session.
#[derive(Debug, Clone)]
pub struct SubRecord {
    /// Clone of the originating request message.
    pub request: RequestMessage,

    /// The monitored node.
    pub node: NodeInfo,

    /// Server-assigned subscription id.
    pub subscription_id: u32,

    /// Server-assigned monitored item id.
    pub monitored_item_id: u32,

    /// Dispatch context attached to the monitored item.
    pub context: MonitorContext,
}

struct PumpHandle {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Per-session subscription state: the record map and the pump handle.
pub struct SubscriptionMap {
    records: StdMutex<HashMap<String, SubRecord>>,
    pump: Mutex<Option<PumpHandle>>,
}

impl SubscriptionMap {
    /// Creates empty subscription state.
    pub fn new() -> Self {
        Self {
            records: StdMutex::new(HashMap::new()),
            pump: Mutex::new(None),
        }
    }

    fn lock_records(&self) -> std::sync::MutexGuard<'_, HashMap<String, SubRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` when any subscription record exists.
    pub fn has_records(&self) -> bool {
        !self.lock_records().is_empty()
    }

    /// Returns the number of distinct subscriptions on this session.
    pub fn subscription_count(&self) -> usize {
        let records = self.lock_records();
        let mut ids: Vec<u32> = records.values().map(|r| r.subscription_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    /// Returns the record for a value alias.
    pub fn get(&self, value_alias: &str) -> Option<SubRecord> {
        self.lock_records().get(value_alias).cloned()
    }

    /// Returns `true` while the publish pump task is running.
    pub async fn pump_running(&self) -> bool {
        let pump = self.pump.lock().await;
        match pump.as_ref() {
            Some(p) => p.running.load(Ordering::SeqCst) && !p.handle.is_finished(),
            None => false,
        }
    }

    fn contains_subscription_id(&self, subscription_id: u32) -> bool {
        self.lock_records()
            .values()
            .any(|r| r.subscription_id == subscription_id)
    }

    fn contains_monitored_item(&self, subscription_id: u32, monitored_item_id: u32) -> bool {
        self.lock_records()
            .values()
            .any(|r| r.subscription_id == subscription_id && r.monitored_item_id == monitored_item_id)
    }
}

impl Default for SubscriptionMap {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Engine entry point
// =============================================================================

/// Executes a subscription request: create, modify, delete or republish.
pub(crate) async fn execute_subscription(
    session: &Arc<ClientSession>,
    publish_lock: &Arc<Mutex<()>>,
    sender: &QueueSender,
    msg: &RequestMessage,
) -> AdapterResult<()> {
    let action = msg
        .requests
        .first()
        .and_then(|req| req.subscription.as_ref())
        .map(|sub| sub.action)
        .ok_or_else(|| SubscriptionError::service(
            StatusCode::BAD_INVALID_ARGUMENT,
            "request carries no subscription parameters",
        ))?;

    match action {
        SubscriptionAction::Create => create_subscription(session, publish_lock, sender, msg).await,
        SubscriptionAction::Modify => modify_subscription(session, publish_lock, msg).await,
        SubscriptionAction::Delete => delete_subscription(session, publish_lock, msg).await,
        SubscriptionAction::Republish => republish(session, publish_lock, msg).await,
    }
}

fn subscription_parameters(req: &SubscriptionRequest) -> SubscriptionParameters {
    SubscriptionParameters {
        publishing_interval: req.publishing_interval,
        lifetime_count: req.lifetime_count,
        max_keepalive_count: req.max_keepalive_count,
        max_notifications_per_publish: req.max_notifications_per_publish,
        priority: req.priority,
        publishing_enabled: req.publishing_enabled,
    }
}

// =============================================================================
// Create
// =============================================================================

async fn create_subscription(
    session: &Arc<ClientSession>,
    publish_lock: &Arc<Mutex<()>>,
    sender: &QueueSender,
    msg: &RequestMessage,
) -> AdapterResult<()> {
    let subs = session.subscriptions();

    // Both duplicate checks happen before any network traffic.
    for (i, req) in msg.requests.iter().enumerate() {
        for other in &msg.requests[i + 1..] {
            if req.node.value_alias == other.node.value_alias {
                tracing::warn!(alias = %req.node.value_alias, "duplicate alias in subscribe request");
                return Err(SubscriptionError::duplicate_alias(&req.node.value_alias).into());
            }
        }
    }
    for req in &msg.requests {
        if subs.get(&req.node.value_alias).is_some() {
            tracing::warn!(alias = %req.node.value_alias, "node already subscribed");
            return Err(SubscriptionError::already_subscribed(&req.node.value_alias).into());
        }
    }

    let sub_params = msg
        .requests
        .first()
        .and_then(|req| req.subscription.as_ref())
        .map(subscription_parameters)
        .ok_or_else(|| SubscriptionError::service(
            StatusCode::BAD_INVALID_ARGUMENT,
            "request carries no subscription parameters",
        ))?;

    let subscription_id = {
        let _serialized = serialize_if_active(subs, publish_lock).await;
        session
            .services()
            .create_subscription(&sub_params)
            .await
            .map_err(|status| SubscriptionError::service(status, "create subscription"))?
    };

    if subs.contains_subscription_id(subscription_id) {
        tracing::error!(subscription_id, "server returned an already-tracked subscription id");
        return Err(SubscriptionError::SubscriptionIdCollision { subscription_id }.into());
    }

    tracing::info!(
        session = session.key(),
        subscription_id,
        items = msg.requests.len(),
        "subscription created"
    );

    let mut recorded = 0usize;
    for (i, req) in msg.requests.iter().enumerate() {
        let sub_req = req.subscription.as_ref();
        let item = MonitoredItemRequest {
            node_id: req.node.node_id.clone(),
            sampling_interval: sub_req
                .map(|s| s.sampling_interval)
                .unwrap_or_else(|| Duration::from_millis(250)),
            queue_size: sub_req.map(|s| s.queue_size).unwrap_or(10),
            discard_oldest: true,
            client_handle: (i + 1) as u32,
        };
        let context = MonitorContext {
            session_key: session.key().to_string(),
            value_alias: req.node.value_alias.clone(),
        };
        let handler = data_change_handler(Arc::downgrade(subs), sender.clone());

        let created = {
            let _serialized = serialize_if_active(subs, publish_lock).await;
            session
                .services()
                .create_monitored_item(subscription_id, &item, context.clone(), handler)
                .await
        };

        // A failed item is skipped, not recorded; the batch continues.
        let monitored_item_id = match created {
            Ok(id) => id,
            Err(status) => {
                tracing::warn!(
                    alias = %req.node.value_alias,
                    status = %status,
                    "monitored item creation failed"
                );
                continue;
            }
        };

        if subs.contains_monitored_item(subscription_id, monitored_item_id) {
            tracing::warn!(
                subscription_id,
                monitored_item_id,
                alias = %req.node.value_alias,
                "monitored item id already tracked, not recorded"
            );
            continue;
        }

        let mut records = subs.lock_records();
        records.insert(
            req.node.value_alias.clone(),
            SubRecord {
                request: msg.clone(),
                node: req.node.clone(),
                subscription_id,
                monitored_item_id,
                context,
            },
        );
        recorded += 1;
    }

    if recorded == 0 {
        tracing::error!(subscription_id, "no monitored item could be created");
        let _serialized = publish_lock.lock().await;
        if let Err(status) = session.services().delete_subscription(subscription_id).await {
            tracing::warn!(subscription_id, status = %status, "cleanup of empty subscription failed");
        }
        drop(_serialized);
        return Err(SubscriptionError::service(
            StatusCode::BAD_MONITORED_ITEM_ID_INVALID,
            "create monitored items",
        )
        .into());
    }

    start_pump(session, publish_lock).await;
    Ok(())
}

// =============================================================================
// Modify
// =============================================================================

async fn modify_subscription(
    session: &Arc<ClientSession>,
    publish_lock: &Arc<Mutex<()>>,
    msg: &RequestMessage,
) -> AdapterResult<()> {
    let subs = session.subscriptions();
    let request = msg
        .requests
        .first()
        .ok_or_else(|| SubscriptionError::service(StatusCode::BAD_INVALID_ARGUMENT, "empty request"))?;
    let sub_req = request.subscription.as_ref().ok_or_else(|| {
        SubscriptionError::service(
            StatusCode::BAD_INVALID_ARGUMENT,
            "request carries no subscription parameters",
        )
    })?;

    let record = subs
        .get(&request.node.value_alias)
        .ok_or_else(|| SubscriptionError::not_subscribed(&request.node.value_alias))?;

    let params = subscription_parameters(sub_req);
    let monitoring = MonitoringParameters {
        client_handle: 1,
        discard_oldest: true,
        sampling_interval: sub_req.sampling_interval,
        queue_size: sub_req.queue_size,
    };

    let _serialized = serialize_if_active(subs, publish_lock).await;
    let services = session.services();

    services
        .modify_subscription(record.subscription_id, &params)
        .await
        .map_err(|status| SubscriptionError::service(status, "modify subscription"))?;

    services
        .modify_monitored_item(record.subscription_id, record.monitored_item_id, &monitoring)
        .await
        .map_err(|status| SubscriptionError::service(status, "modify monitored items"))?;

    services
        .set_monitoring_mode(
            record.subscription_id,
            record.monitored_item_id,
            MonitoringMode::Reporting,
        )
        .await
        .map_err(|status| SubscriptionError::service(status, "set monitoring mode"))?;

    services
        .set_publishing_mode(record.subscription_id, sub_req.publishing_enabled)
        .await
        .map_err(|status| SubscriptionError::service(status, "set publishing mode"))?;

    tracing::info!(
        session = session.key(),
        alias = %request.node.value_alias,
        subscription_id = record.subscription_id,
        "subscription modified"
    );
    Ok(())
}

// =============================================================================
// Delete
// =============================================================================

async fn delete_subscription(
    session: &Arc<ClientSession>,
    publish_lock: &Arc<Mutex<()>>,
    msg: &RequestMessage,
) -> AdapterResult<()> {
    let subs = session.subscriptions();
    let request = msg
        .requests
        .first()
        .ok_or_else(|| SubscriptionError::service(StatusCode::BAD_INVALID_ARGUMENT, "empty request"))?;

    let record = subs
        .get(&request.node.value_alias)
        .ok_or_else(|| SubscriptionError::not_subscribed(&request.node.value_alias))?;

    tracing::info!(
        session = session.key(),
        alias = %request.node.value_alias,
        subscription_id = record.subscription_id,
        monitored_item_id = record.monitored_item_id,
        "deleting subscription record"
    );

    // The pump may still be mid-round; hold the serialization lock for both
    // service calls even though the record map empties along the way.
    {
        let _serialized = publish_lock.lock().await;
        session
            .services()
            .delete_monitored_item(record.subscription_id, record.monitored_item_id)
            .await
            .map_err(|status| SubscriptionError::service(status, "delete monitored item"))?;
    }

    let (last_of_subscription, map_empty) = {
        let mut records = subs.lock_records();
        records.remove(&request.node.value_alias);
        let last = !records
            .values()
            .any(|r| r.subscription_id == record.subscription_id);
        (last, records.is_empty())
    };

    if last_of_subscription {
        let _serialized = publish_lock.lock().await;
        session
            .services()
            .delete_subscription(record.subscription_id)
            .await
            .map_err(|status| SubscriptionError::service(status, "delete subscription"))?;
        tracing::debug!(subscription_id = record.subscription_id, "subscription deleted");
    }

    if map_empty {
        stop_pump(session).await;
    }
    Ok(())
}

// =============================================================================
// Republish
// =============================================================================

async fn republish(
    session: &Arc<ClientSession>,
    publish_lock: &Arc<Mutex<()>>,
    msg: &RequestMessage,
) -> AdapterResult<()> {
    let subs = session.subscriptions();
    let request = msg
        .requests
        .first()
        .ok_or_else(|| SubscriptionError::service(StatusCode::BAD_INVALID_ARGUMENT, "empty request"))?;

    let record = subs
        .get(&request.node.value_alias)
        .ok_or_else(|| SubscriptionError::not_subscribed(&request.node.value_alias))?;

    let result = {
        let _serialized = serialize_if_active(subs, publish_lock).await;
        session
            .services()
            .republish(record.subscription_id, DEFAULT_RETRANSMIT_SEQUENCE)
            .await
    };

    match result {
        Ok(()) => Ok(()),
        Err(status) if status == StatusCode::BAD_MESSAGE_NOT_AVAILABLE => {
            // The server has nothing to retransmit; not an error.
            tracing::debug!(
                subscription_id = record.subscription_id,
                "no message in republish response"
            );
            Ok(())
        }
        Err(status) => Err(SubscriptionError::service(status, "republish").into()),
    }
}

// =============================================================================
// Publish pump
// =============================================================================

async fn start_pump(session: &Arc<ClientSession>, publish_lock: &Arc<Mutex<()>>) {
    let subs = session.subscriptions();
    let mut pump = subs.pump.lock().await;
    if pump.is_some() {
        return;
    }

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    let services = Arc::clone(session.services());
    let lock = Arc::clone(publish_lock);
    let key = session.key().to_string();

    let handle = tokio::spawn(async move {
        tracing::debug!(session = %key, "publish pump started");
        while flag.load(Ordering::SeqCst) {
            {
                let _serialized = lock.lock().await;
                let status = services.run_iterate(PUBLISH_TICK).await;
                if status.is_bad() {
                    tracing::warn!(session = %key, status = %status, "publish round failed");
                }
            }
            tokio::time::sleep(PUBLISH_TICK).await;
        }
        tracing::debug!(session = %key, "publish pump stopped");
    });

    *pump = Some(PumpHandle { running, handle });
}

/// Stops the session's publish pump: clear the flag, then join the task.
///
/// The serialization lock is not held across the join; the pump observes the
/// flag between publish rounds and exits on its own.
pub(crate) async fn stop_pump(session: &ClientSession) {
    let taken = {
        let mut pump = session.subscriptions().pump.lock().await;
        pump.take()
    };
    if let Some(PumpHandle { running, handle }) = taken {
        running.store(false, Ordering::SeqCst);
        if let Err(e) = handle.await {
            tracing::warn!(session = session.key(), error = %e, "publish pump did not stop cleanly");
        }
    }
}

/// Stops the pump and drains the subscription map, used on disconnect.
pub(crate) async fn shutdown_session(session: &ClientSession) {
    stop_pump(session).await;
    let drained = {
        let mut records = session.subscriptions().lock_records();
        let count = records.len();
        records.clear();
        count
    };
    if drained > 0 {
        tracing::debug!(session = session.key(), drained, "subscription map drained");
    }
}

async fn serialize_if_active<'a>(
    subs: &SubscriptionMap,
    publish_lock: &'a Mutex<()>,
) -> Option<tokio::sync::MutexGuard<'a, ()>> {
    if subs.has_records() {
        Some(publish_lock.lock().await)
    } else {
        None
    }
}

// =============================================================================
// Data-change delivery
// =============================================================================

/// Builds the per-item data-change callback handed to the stack.
///
/// The handler holds a weak reference to the session's subscription map; it
/// never keeps the session alive and goes quiet once the session is gone.
fn data_change_handler(subs: Weak<SubscriptionMap>, sender: QueueSender) -> DataChangeHandler {
    Arc::new(move |event: DataChangeEvent| {
        if let Some(msg) = build_report(&subs, &event) {
            sender.enqueue(msg);
        }
    })
}

fn build_report(subs: &Weak<SubscriptionMap>, event: &DataChangeEvent) -> Option<ResponseMessage> {
    if !event.value.status.is_good() {
        tracing::warn!(
            alias = %event.context.value_alias,
            status = %event.value.status,
            "data change with bad status dropped"
        );
        return None;
    }
    let variant = event.value.value.as_ref()?;

    let subs = subs.upgrade()?;
    let record = {
        let records = subs.lock_records();
        records.get(&event.context.value_alias).cloned()
    };
    let Some(record) = record else {
        tracing::warn!(
            alias = %event.context.value_alias,
            "data change for an unknown value alias dropped"
        );
        return None;
    };

    let server_time = match event.value.server_timestamp {
        Some(ts) => {
            let (secs, micros) = ts.to_unix_parts();
            UnixTime { secs, micros }
        }
        None => {
            tracing::debug!(alias = %event.context.value_alias, "no server timestamp, using wall clock");
            UnixTime::now()
        }
    };

    let value = match ValueCodec::new().decode(variant) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(alias = %event.context.value_alias, error = %e, "undecodable notification value");
            return None;
        }
    };

    let mut msg = ResponseMessage::new(
        record.request.message_id,
        &record.request.endpoint,
        ResponseKind::Report,
    );
    msg.command = Some(record.request.command);
    msg.server_time = Some(server_time);
    msg.responses.push(NodeResponse {
        node: Some(NodeInfo::with_alias(
            record.node.node_id.clone(),
            record.context.value_alias.clone(),
        )),
        request_id: None,
        value: Some(ValuePayload::new(value)),
    });
    Some(msg)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Command;
    use crate::types::NodeId;

    fn record(alias: &str, sub_id: u32, mon_id: u32) -> SubRecord {
        let node = NodeInfo::with_alias(NodeId::string(2, alias), alias);
        SubRecord {
            request: RequestMessage::new(
                1,
                "opc.tcp://localhost:4840",
                Command::Subscription,
                vec![crate::message::NodeRequest::new(node.clone())],
            ),
            node,
            subscription_id: sub_id,
            monitored_item_id: mon_id,
            context: MonitorContext {
                session_key: "localhost:4840".to_string(),
                value_alias: alias.to_string(),
            },
        }
    }

    #[test]
    fn test_subscription_count_distinct_ids() {
        let map = SubscriptionMap::new();
        assert_eq!(map.subscription_count(), 0);
        assert!(!map.has_records());

        map.lock_records()
            .insert("a".to_string(), record("a", 10, 1));
        map.lock_records()
            .insert("b".to_string(), record("b", 10, 2));
        map.lock_records()
            .insert("c".to_string(), record("c", 11, 3));

        assert_eq!(map.subscription_count(), 2);
        assert!(map.has_records());
    }

    #[test]
    fn test_monitored_item_uniqueness_check() {
        let map = SubscriptionMap::new();
        map.lock_records()
            .insert("a".to_string(), record("a", 10, 1));

        assert!(map.contains_subscription_id(10));
        assert!(!map.contains_subscription_id(11));
        assert!(map.contains_monitored_item(10, 1));
        assert!(!map.contains_monitored_item(10, 2));
        assert!(!map.contains_monitored_item(11, 1));
    }

    #[test]
    fn test_build_report_timestamp_normalization() {
        let map = Arc::new(SubscriptionMap::new());
        map.lock_records()
            .insert("Temp".to_string(), record("Temp", 10, 1));

        let event = DataChangeEvent {
            subscription_id: 10,
            monitored_item_id: 1,
            context: MonitorContext {
                session_key: "localhost:4840".to_string(),
                value_alias: "Temp".to_string(),
            },
            value: crate::transport::DataValue {
                value: Some(crate::transport::UaVariant::Scalar(
                    crate::transport::UaScalar::Double(21.5),
                )),
                status: StatusCode::GOOD,
                server_timestamp: Some(crate::transport::UaDateTime::from_unix_parts(
                    1_700_000_000,
                    42,
                )),
                source_timestamp: None,
            },
        };

        let msg = build_report(&Arc::downgrade(&map), &event).unwrap();
        assert_eq!(msg.kind, ResponseKind::Report);
        assert_eq!(msg.response_length(), 1);
        let time = msg.server_time.unwrap();
        assert_eq!(time.secs, 1_700_000_000);
        assert_eq!(time.micros, 42);
    }

    #[test]
    fn test_build_report_drops_bad_status() {
        let map = Arc::new(SubscriptionMap::new());
        map.lock_records()
            .insert("Temp".to_string(), record("Temp", 10, 1));

        let event = DataChangeEvent {
            subscription_id: 10,
            monitored_item_id: 1,
            context: MonitorContext {
                session_key: "localhost:4840".to_string(),
                value_alias: "Temp".to_string(),
            },
            value: crate::transport::DataValue::bad(StatusCode::BAD_INTERNAL_ERROR),
        };

        assert!(build_report(&Arc::downgrade(&map), &event).is_none());
    }

    #[test]
    fn test_build_report_unknown_alias() {
        let map = Arc::new(SubscriptionMap::new());
        let event = DataChangeEvent {
            subscription_id: 10,
            monitored_item_id: 1,
            context: MonitorContext {
                session_key: "localhost:4840".to_string(),
                value_alias: "Nope".to_string(),
            },
            value: crate::transport::DataValue::good(crate::transport::UaVariant::Scalar(
                crate::transport::UaScalar::Int32(1),
            )),
        };
        assert!(build_report(&Arc::downgrade(&map), &event).is_none());
    }
}
