//! Per-export mutable state

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use void_gltf::NodeIndex;

use super::mapping::NodeMap;
use super::resources::SharedResourceTable;
use super::side_channel::SideChannel;
use crate::error::{HandlerError, HandlerResult};
use crate::registry::{HandlerSet, RegisteredHandler};
use crate::scene::{ObjectId, SceneGraph};

/// Export lifecycle; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExportState {
    Created,
    ObjectsMapped,
    NodeHandlersRun,
    DocumentHandlersRun,
    Injected,
    Disposed,
}

/// State shared by all handlers during one export
pub struct ExportContext<'a> {
    scene: &'a dyn SceneGraph,
    handlers: Arc<HandlerSet>,
    nodes: NodeMap,
    side_channel: SideChannel,
    resources: BTreeMap<String, SharedResourceTable>,
    state: ExportState,
}

impl<'a> ExportContext<'a> {
    pub(crate) fn new(scene: &'a dyn SceneGraph, handlers: Arc<HandlerSet>) -> Self {
        Self {
            scene,
            handlers,
            nodes: NodeMap::new(),
            side_channel: SideChannel::new(),
            resources: BTreeMap::new(),
            state: ExportState::Created,
        }
    }

    /// Scene being exported
    pub fn scene(&self) -> &'a dyn SceneGraph {
        self.scene
    }

    /// Current lifecycle state
    pub fn state(&self) -> ExportState {
        self.state
    }

    /// Node index assigned to a scene object
    pub fn node_of(&self, object: ObjectId) -> Option<NodeIndex> {
        self.nodes.node(object)
    }

    /// Scene object exported as `node`
    pub fn object(&self, node: NodeIndex) -> HandlerResult<ObjectId> {
        self.nodes.object(node).ok_or(HandlerError::UnmappedNode(node))
    }

    /// Node/object mapping for this export
    pub fn nodes(&self) -> &NodeMap {
        &self.nodes
    }

    /// Shared key/value state for cooperating handlers
    pub fn side_channel(&self) -> &SideChannel {
        &self.side_channel
    }

    /// Mutable shared key/value state
    pub fn side_channel_mut(&mut self) -> &mut SideChannel {
        &mut self.side_channel
    }

    /// Shared resource table for `name`, created empty on first use
    ///
    /// Node-level export registers values here; the document-level pass
    /// emits the finished array.
    pub fn resources(&mut self, name: &str) -> &mut SharedResourceTable {
        self.resources.entry(name.to_string()).or_default()
    }

    /// Shared resource table for `name`, if any handler created one
    pub fn resource_table(&self, name: &str) -> Option<&SharedResourceTable> {
        self.resources.get(name)
    }

    /// Another registered handler, for cooperating extensions
    pub fn lookup(&self, name: &str) -> Option<&RegisteredHandler> {
        self.handlers.lookup(name)
    }

    /// Another registered handler as its concrete type
    pub fn handler<H: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<H>> {
        self.lookup(name)?.downcast::<H>()
    }

    pub(crate) fn handlers(&self) -> Arc<HandlerSet> {
        Arc::clone(&self.handlers)
    }

    pub(crate) fn advance(&mut self, next: ExportState) {
        debug_assert!(next > self.state, "export state moved backwards");
        log::debug!("Export context {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    pub(crate) fn map_object(&mut self, node: NodeIndex, object: ObjectId) {
        self.nodes.insert(node, object);
    }

    pub(crate) fn dispose(&mut self) {
        self.nodes.clear();
        self.side_channel.clear();
        self.resources.clear();
        self.state = ExportState::Disposed;
    }
}

impl fmt::Debug for ExportContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportContext")
            .field("state", &self.state)
            .field("nodes", &self.nodes.len())
            .field("side_channel", &self.side_channel)
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .finish()
    }
}
