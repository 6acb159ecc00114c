// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Recursive browse engine.
//!
//! Browsing is depth-first: one batched browse call per level, validation of
//! every returned reference, one browse response per accepted reference, and
//! recursion into every accepted non-Variable target. A per-call browse-path
//! stack renders the `/name/name` path for each emission and cuts cycles:
//! a reference whose browse name is already on the stack is skipped, so the
//! recursion terminates on any server.
//!
//! Truncated results surface their continuation point to the application as
//! an extra browse response; `browse_next` feeds the point back to the stack
//! and runs the same result pipeline.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::Mutex;

use crate::error::{AdapterResult, BrowseError};
use crate::message::{
    AdapterStatus, BrowseResult, ContinuationPoint, NodeInfo, NodeResponse, RequestMessage,
    ResponseKind, ResponseMessage, ValuePayload, MAX_BROWSE_REQUEST_SIZE,
};
use crate::queue::QueueSender;
use crate::readwrite::serialize_against_publish;
use crate::session::ClientSession;
use crate::transport::{BrowseDescription, ReferenceDescription, StatusCode, UaBrowseResult};
use crate::types::{NodeClass, NodeId, NodeIdentifier};

/// Continuation points at or above this length are rejected.
pub(crate) const CONTINUATION_POINT_CAP: usize = 1000;

/// Browse names and display names at or above this length are rejected.
pub(crate) const NAME_LENGTH_CAP: usize = 1000;

const ERR_DIRECTION_MISMATCH: &str = "Reference direction does not match the browse direction";
const ERR_BROWSE_NAME_EMPTY: &str = "Browse name is empty";
const ERR_BROWSE_NAME_LONG: &str = "Browse name is too long";
const ERR_DISPLAY_NAME_EMPTY: &str = "Display name is empty";
const ERR_DISPLAY_NAME_LONG: &str = "Display name is too long";
const ERR_NODECLASS_OUTSIDE_MASK: &str = "Node class is outside the browse mask";
const ERR_NODE_ID_NULL: &str = "Target node id is null";
const ERR_NODE_ID_SERVER_INDEX: &str = "Target node id has a non-zero server index";
const ERR_REFERENCE_TYPE_ID_NULL: &str = "Reference type id is null";
const ERR_TYPE_DEFINITION_NULL: &str = "Type definition node id is null";
const ERR_CONTINUATION_POINT_LONG: &str = "Continuation point is too long";
const ERR_REFERENCE_DATA_INVALID: &str = "References are missing where required";
const ERR_BROWSE_RESULT_EMPTY: &str = "Browse response is empty";
const ERR_NODE_ID_UNKNOWN_ALL: &str = "Node id is unknown for all browse results";
const ERR_REQUEST_SIZE_OVER: &str = "Browse request exceeds the start node cap";

// =============================================================================
// Browse path stack
// =============================================================================

/// One frame of the browse-path stack.
#[derive(Debug, Clone)]
struct PathFrame {
    node_id: NodeId,
    browse_name: Option<String>,
}

/// Session-local stack of `(nodeId, browseName)` frames for one top-level
/// browse call.
#[derive(Debug, Default)]
pub(crate) struct BrowsePathStack {
    frames: Vec<PathFrame>,
}

impl BrowsePathStack {
    pub(crate) fn new() -> Self {
        Self { frames: Vec::new() }
    }

    fn push(&mut self, node_id: NodeId, browse_name: Option<String>) {
        self.frames.push(PathFrame {
            node_id,
            browse_name,
        });
    }

    fn pop(&mut self) {
        if self.frames.pop().is_none() {
            tracing::warn!("browse path stack popped while empty");
        }
    }

    /// Returns `true` if a frame with the given browse name is on the stack.
    pub(crate) fn contains_name(&self, browse_name: &str) -> bool {
        self.frames
            .iter()
            .any(|f| f.browse_name.as_deref() == Some(browse_name))
    }

    /// Renders the current path as `/name/name`, skipping nameless frames.
    /// Returns `None` when no frame carries a name.
    pub(crate) fn current_path(&self) -> Option<String> {
        let mut path = String::new();
        for frame in &self.frames {
            if let Some(name) = &frame.browse_name {
                path.push('/');
                path.push_str(name);
            }
        }
        if path.is_empty() {
            None
        } else {
            Some(path)
        }
    }

    /// Renders the complete path down to `value_alias`.
    pub(crate) fn complete_path(&self, value_alias: &str) -> String {
        let mut path = self.current_path().unwrap_or_default();
        path.push('/');
        path.push_str(value_alias);
        path
    }

    #[cfg(test)]
    fn depth(&self) -> usize {
        self.frames.len()
    }
}

// =============================================================================
// Value alias
// =============================================================================

/// Builds the application-facing value alias for a discovered node.
///
/// String identifiers carry a value marker taken from the display name when
/// it starts with `v=`: `{ns;S;v=<n>}<browseName>`, defaulting to `v=0`.
/// Other identifier types render as `{ns;<typeChar>}<browseName>`.
pub(crate) fn make_value_alias(browse_name: &str, node_id: &NodeId, display_text: &str) -> String {
    let ns = node_id.namespace_index;
    match &node_id.identifier {
        NodeIdentifier::String(_) => {
            if display_text.starts_with("v=") {
                format!("{{{};S;{}}}{}", ns, display_text, browse_name)
            } else {
                format!("{{{};S;v=0}}{}", ns, browse_name)
            }
        }
        other => format!("{{{};{}}}{}", ns, other.alias_type_char(), browse_name),
    }
}

// =============================================================================
// Level bookkeeping
// =============================================================================

/// One start node of a browse level.
#[derive(Debug, Clone)]
struct LevelNode {
    node_id: NodeId,
    browse_name: Option<String>,
    request_id: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrowseMode {
    /// Deliver every accepted reference.
    General,
    /// Collect view nodes instead of delivering them.
    Views,
}

impl BrowseMode {
    const fn node_class_mask(&self) -> u32 {
        match self {
            Self::General => NodeClass::BROWSE_MASK,
            Self::Views => NodeClass::VIEW_MASK,
        }
    }
}

/// The browse name the adapter reports for a reference target: the string
/// identifier for string-id nodes, the reference's browse name otherwise.
fn result_browse_name(reference: &ReferenceDescription) -> String {
    match reference.node_id.as_string() {
        Some(id) => id.to_string(),
        None => reference.browse_name.clone(),
    }
}

fn start_browse_name(node_id: &NodeId) -> Option<String> {
    node_id.as_string().map(|s| s.to_string())
}

type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// =============================================================================
// Entry points
// =============================================================================

/// Executes a browse request, recursively walking the address space.
pub(crate) async fn execute_browse(
    session: &ClientSession,
    publish_lock: &Mutex<()>,
    sender: &QueueSender,
    msg: &RequestMessage,
    collect_views: bool,
) -> AdapterResult<()> {
    if msg.requests.len() > MAX_BROWSE_REQUEST_SIZE {
        tracing::warn!(
            nodes = msg.requests.len(),
            cap = MAX_BROWSE_REQUEST_SIZE,
            "browse request over the start node cap"
        );
        sender.enqueue(
            ResponseMessage::error(
                msg.message_id,
                &msg.endpoint,
                AdapterStatus::BrowseRequestTooLarge,
                ERR_REQUEST_SIZE_OVER,
            )
            .with_command(msg.command),
        );
        return Err(BrowseError::request_too_large(msg.requests.len(), MAX_BROWSE_REQUEST_SIZE).into());
    }

    let nodes: Vec<LevelNode> = msg
        .requests
        .iter()
        .enumerate()
        .map(|(i, req)| {
            // A null start node means "browse from the root folder".
            let node_id = if req.node.node_id.is_null() {
                NodeId::ROOT_FOLDER
            } else {
                req.node.node_id.clone()
            };
            LevelNode {
                browse_name: start_browse_name(&node_id),
                node_id,
                request_id: i,
            }
        })
        .collect();

    let mode = if collect_views {
        BrowseMode::Views
    } else {
        BrowseMode::General
    };

    let mut path = BrowsePathStack::new();
    let mut views: Vec<LevelNode> = Vec::new();

    browse_level(
        session,
        publish_lock,
        sender,
        msg,
        mode,
        LevelCall::Browse(nodes),
        &mut path,
        &mut views,
    )
    .await?;

    // The views pass delivers the collected view nodes through the general
    // pipeline, starting a fresh descent from each view.
    if collect_views && !views.is_empty() {
        tracing::debug!(views = views.len(), "browsing collected view nodes");
        let mut view_path = BrowsePathStack::new();
        let mut unused = Vec::new();
        browse_level(
            session,
            publish_lock,
            sender,
            msg,
            BrowseMode::General,
            LevelCall::Browse(views),
            &mut view_path,
            &mut unused,
        )
        .await?;
    }

    Ok(())
}

/// Continues a truncated browse from the request's continuation points.
pub(crate) async fn execute_browse_next(
    session: &ClientSession,
    publish_lock: &Mutex<()>,
    sender: &QueueSender,
    msg: &RequestMessage,
) -> AdapterResult<()> {
    if msg.continuation_points.is_empty() {
        return Err(BrowseError::NoContinuationPoints.into());
    }

    let points: Vec<Vec<u8>> = msg
        .continuation_points
        .iter()
        .map(|cp| cp.continuation_point.clone())
        .collect();

    let nodes: Vec<LevelNode> = msg
        .requests
        .iter()
        .enumerate()
        .map(|(i, req)| LevelNode {
            node_id: req.node.node_id.clone(),
            browse_name: start_browse_name(&req.node.node_id),
            request_id: i,
        })
        .collect();

    let mut path = BrowsePathStack::new();
    let mut views = Vec::new();
    browse_level(
        session,
        publish_lock,
        sender,
        msg,
        BrowseMode::General,
        LevelCall::Next { nodes, points },
        &mut path,
        &mut views,
    )
    .await
}

// =============================================================================
// Recursive level processing
// =============================================================================

enum LevelCall {
    Browse(Vec<LevelNode>),
    Next {
        nodes: Vec<LevelNode>,
        points: Vec<Vec<u8>>,
    },
}

#[allow(clippy::too_many_arguments)]
fn browse_level<'a>(
    session: &'a ClientSession,
    publish_lock: &'a Mutex<()>,
    sender: &'a QueueSender,
    msg: &'a RequestMessage,
    mode: BrowseMode,
    call: LevelCall,
    path: &'a mut BrowsePathStack,
    views: &'a mut Vec<LevelNode>,
) -> BoxFut<'a, AdapterResult<()>> {
    Box::pin(async move {
        let params = msg.browse_parameters();
        let browse_next = matches!(call, LevelCall::Next { .. });

        let (nodes, service_result) = match call {
            LevelCall::Browse(nodes) => {
                let descriptions: Vec<BrowseDescription> = nodes
                    .iter()
                    .map(|n| {
                        BrowseDescription::hierarchical(
                            n.node_id.clone(),
                            params.direction,
                            mode.node_class_mask(),
                        )
                    })
                    .collect();
                let result = {
                    let _serialized = serialize_against_publish(session, publish_lock).await;
                    session
                        .services()
                        .browse(params.max_references_per_node, &descriptions)
                        .await
                };
                (nodes, result)
            }
            LevelCall::Next { nodes, points } => {
                let result = {
                    let _serialized = serialize_against_publish(session, publish_lock).await;
                    session.services().browse_next(&points).await
                };
                (nodes, result)
            }
        };

        let results = match service_result {
            Err(status) => {
                tracing::error!(endpoint = %msg.endpoint, status = %status, "browse service failed");
                emit_error(
                    sender,
                    msg,
                    first_node_info(msg),
                    AdapterStatus::ServiceResultBad,
                    status.name(),
                );
                return Ok(());
            }
            Ok(results) if results.is_empty() => {
                tracing::error!(endpoint = %msg.endpoint, "empty browse response");
                emit_error(
                    sender,
                    msg,
                    first_node_info(msg),
                    AdapterStatus::BrowseResultEmpty,
                    ERR_BROWSE_RESULT_EMPTY,
                );
                return Ok(());
            }
            Ok(results) => results,
        };

        let mut node_id_unknown_count = 0usize;

        for (i, result) in results.iter().enumerate() {
            let Some(level_node) = nodes.get(i) else {
                tracing::warn!(index = i, "browse result without a matching start node");
                continue;
            };
            let src = NodeInfo::new(level_node.node_id.clone());

            path.push(level_node.node_id.clone(), level_node.browse_name.clone());
            let outcome = process_result(
                session,
                publish_lock,
                sender,
                msg,
                mode,
                browse_next,
                result,
                level_node,
                &src,
                results.len(),
                &mut node_id_unknown_count,
                path,
                views,
            )
            .await;
            path.pop();
            outcome?;
        }

        Ok(())
    })
}

#[allow(clippy::too_many_arguments)]
async fn process_result<'a>(
    session: &'a ClientSession,
    publish_lock: &'a Mutex<()>,
    sender: &'a QueueSender,
    msg: &'a RequestMessage,
    mode: BrowseMode,
    browse_next: bool,
    result: &UaBrowseResult,
    level_node: &LevelNode,
    src: &NodeInfo,
    result_count: usize,
    node_id_unknown_count: &mut usize,
    path: &mut BrowsePathStack,
    views: &mut Vec<LevelNode>,
) -> AdapterResult<()> {
    let params = msg.browse_parameters();

    if !result.status.is_good() {
        if result.status == StatusCode::BAD_NODE_ID_UNKNOWN {
            *node_id_unknown_count += 1;
        }
        if *node_id_unknown_count == result_count {
            tracing::warn!(node = %src.node_id, "node id unknown for all browse results");
            emit_error(
                sender,
                msg,
                Some(src.clone()),
                AdapterStatus::NodeIdUnknownAllResults,
                ERR_NODE_ID_UNKNOWN_ALL,
            );
        } else {
            emit_error(
                sender,
                msg,
                Some(src.clone()),
                AdapterStatus::ResultStatusBad,
                result.status.name(),
            );
        }
        return Ok(());
    }

    if result.continuation_point.len() >= CONTINUATION_POINT_CAP {
        emit_error(
            sender,
            msg,
            Some(src.clone()),
            AdapterStatus::Error,
            ERR_CONTINUATION_POINT_LONG,
        );
        return Ok(());
    }
    if !result.continuation_point.is_empty() && result.references.is_empty() {
        emit_error(
            sender,
            msg,
            Some(src.clone()),
            AdapterStatus::ReferenceDataInvalid,
            ERR_REFERENCE_DATA_INVALID,
        );
        return Ok(());
    }

    // A continued result must carry references when its status is good.
    if browse_next && result.references.is_empty() {
        emit_error(
            sender,
            msg,
            Some(src.clone()),
            AdapterStatus::ReferenceDataInvalid,
            ERR_REFERENCE_DATA_INVALID,
        );
        return Ok(());
    }

    let mut next_nodes: Vec<LevelNode> = Vec::new();

    for reference in &result.references {
        if !validate_reference(sender, msg, src, &params.direction, mode, reference) {
            continue;
        }

        if path.contains_name(&reference.browse_name) {
            tracing::debug!(
                browse_name = %reference.browse_name,
                "already visited on the current browse path"
            );
            continue;
        }

        match mode {
            BrowseMode::General => {
                let browse_name = result_browse_name(reference);
                let value_alias =
                    make_value_alias(&browse_name, &reference.node_id, &reference.display_name);
                let browse_path = path.complete_path(&value_alias);

                let mut response =
                    ResponseMessage::new(msg.message_id, &msg.endpoint, ResponseKind::BrowseResponse)
                        .with_command(msg.command);
                response.browse_result = Some(BrowseResult { browse_name });
                response.responses.push(NodeResponse {
                    node: Some(NodeInfo::with_alias(src.node_id.clone(), value_alias)),
                    request_id: Some(level_node.request_id),
                    value: Some(ValuePayload::text(browse_path)),
                });
                sender.enqueue(response);
            }
            BrowseMode::Views => {
                if reference.node_class == NodeClass::View {
                    views.push(LevelNode {
                        node_id: reference.node_id.clone(),
                        browse_name: Some(reference.browse_name.clone()),
                        request_id: level_node.request_id,
                    });
                }
            }
        }

        if reference.node_class != NodeClass::Variable {
            next_nodes.push(LevelNode {
                node_id: reference.node_id.clone(),
                browse_name: Some(reference.browse_name.clone()),
                request_id: level_node.request_id,
            });
        }
    }

    if !result.continuation_point.is_empty() {
        tracing::debug!(node = %src.node_id, "passing continuation point to the application");
        let browse_prefix = path
            .current_path()
            .map(|p| p.trim_start_matches('/').to_string());

        let mut response =
            ResponseMessage::new(msg.message_id, &msg.endpoint, ResponseKind::BrowseResponse)
                .with_command(msg.command);
        response.continuation_points.push(ContinuationPoint::new(
            result.continuation_point.clone(),
            browse_prefix,
        ));
        response.responses.push(NodeResponse {
            node: Some(src.clone()),
            request_id: Some(level_node.request_id),
            value: None,
        });
        sender.enqueue(response);
    }

    if !next_nodes.is_empty() {
        browse_level(
            session,
            publish_lock,
            sender,
            msg,
            mode,
            LevelCall::Browse(next_nodes),
            path,
            views,
        )
        .await?;
    }

    Ok(())
}

/// Validates one reference against the structural contract. Every violation
/// emits an error message; siblings are unaffected.
fn validate_reference(
    sender: &QueueSender,
    msg: &RequestMessage,
    src: &NodeInfo,
    direction: &crate::types::BrowseDirection,
    mode: BrowseMode,
    reference: &ReferenceDescription,
) -> bool {
    let mut valid = true;
    let mut reject = |status: AdapterStatus, text: &str| {
        emit_error(sender, msg, Some(src.clone()), status, text);
        valid = false;
    };

    if !direction.matches(reference.is_forward) {
        reject(AdapterStatus::DirectionMismatch, ERR_DIRECTION_MISMATCH);
    }

    if reference.browse_name.is_empty() {
        reject(AdapterStatus::Error, ERR_BROWSE_NAME_EMPTY);
    } else if reference.browse_name.chars().count() >= NAME_LENGTH_CAP {
        reject(AdapterStatus::Error, ERR_BROWSE_NAME_LONG);
    }

    if !reference.node_class.in_mask(mode.node_class_mask()) {
        reject(AdapterStatus::NodeClassOutsideMask, ERR_NODECLASS_OUTSIDE_MASK);
    }

    if reference.display_name.is_empty() {
        reject(AdapterStatus::Error, ERR_DISPLAY_NAME_EMPTY);
    } else if reference.display_name.chars().count() >= NAME_LENGTH_CAP {
        reject(AdapterStatus::Error, ERR_DISPLAY_NAME_LONG);
    }

    if reference.node_id.is_null() {
        reject(AdapterStatus::Error, ERR_NODE_ID_NULL);
    } else if reference.server_index != 0 {
        reject(AdapterStatus::Error, ERR_NODE_ID_SERVER_INDEX);
    }

    if reference.reference_type_id.is_null() {
        reject(AdapterStatus::Error, ERR_REFERENCE_TYPE_ID_NULL);
    }

    if matches!(reference.node_class, NodeClass::Object | NodeClass::Variable)
        && reference.type_definition.is_null()
    {
        reject(AdapterStatus::Error, ERR_TYPE_DEFINITION_NULL);
    }

    valid
}

fn emit_error(
    sender: &QueueSender,
    msg: &RequestMessage,
    node: Option<NodeInfo>,
    status: AdapterStatus,
    text: &str,
) {
    tracing::debug!(status = %status, text = text, "browse validation error");
    let mut response = ResponseMessage::error(msg.message_id, &msg.endpoint, status, text)
        .with_command(msg.command);
    if let Some(node) = node {
        response = response.with_error_node(node);
    }
    sender.enqueue(response);
}

fn first_node_info(msg: &RequestMessage) -> Option<NodeInfo> {
    msg.requests.first().map(|req| req.node.clone())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_stack_render() {
        let mut path = BrowsePathStack::new();
        assert_eq!(path.current_path(), None);

        path.push(NodeId::numeric(0, 84), None);
        assert_eq!(path.current_path(), None);

        path.push(NodeId::string(2, "Objects"), Some("Objects".to_string()));
        path.push(NodeId::string(2, "Pump"), Some("Pump".to_string()));
        assert_eq!(path.current_path().as_deref(), Some("/Objects/Pump"));
        assert_eq!(path.complete_path("{2;S;v=0}Speed"), "/Objects/Pump/{2;S;v=0}Speed");

        path.pop();
        assert_eq!(path.current_path().as_deref(), Some("/Objects"));
    }

    #[test]
    fn test_path_stack_cycle_detection() {
        let mut path = BrowsePathStack::new();
        path.push(NodeId::string(2, "A"), Some("A".to_string()));
        path.push(NodeId::string(2, "B"), Some("B".to_string()));

        assert!(path.contains_name("A"));
        assert!(path.contains_name("B"));
        assert!(!path.contains_name("C"));

        path.pop();
        assert!(!path.contains_name("B"));
        assert_eq!(path.depth(), 1);
    }

    #[test]
    fn test_complete_path_without_prefix() {
        let path = BrowsePathStack::new();
        assert_eq!(path.complete_path("{2;I}Motor"), "/{2;I}Motor");
    }

    #[test]
    fn test_value_alias_string_identifier() {
        let node = NodeId::string(2, "Speed");
        assert_eq!(make_value_alias("Speed", &node, "v=3"), "{2;S;v=3}Speed");
        assert_eq!(make_value_alias("Speed", &node, "Speed"), "{2;S;v=0}Speed");
        assert_eq!(make_value_alias("Speed", &node, ""), "{2;S;v=0}Speed");
    }

    #[test]
    fn test_value_alias_other_identifiers() {
        assert_eq!(
            make_value_alias("Motor", &NodeId::numeric(2, 1001), "Motor"),
            "{2;I}Motor"
        );
        assert_eq!(
            make_value_alias("Blob", &NodeId::opaque(3, vec![1, 2]), "Blob"),
            "{3;B}Blob"
        );
        assert_eq!(
            make_value_alias(
                "Tag",
                &NodeId::guid(4, uuid::Uuid::nil()),
                "Tag"
            ),
            "{4;G}Tag"
        );
    }

    #[test]
    fn test_result_browse_name_prefers_string_identifier() {
        let reference = ReferenceDescription {
            node_id: NodeId::string(2, "Pump.Speed"),
            server_index: 0,
            browse_name_namespace: 2,
            browse_name: "Speed".to_string(),
            display_name: "Speed".to_string(),
            node_class: NodeClass::Variable,
            is_forward: true,
            reference_type_id: NodeId::numeric(0, 47),
            type_definition: NodeId::numeric(0, 63),
        };
        assert_eq!(result_browse_name(&reference), "Pump.Speed");

        let reference = ReferenceDescription {
            node_id: NodeId::numeric(2, 5),
            ..reference
        };
        assert_eq!(result_browse_name(&reference), "Speed");
    }
}
