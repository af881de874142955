//! Per-import mutable state

use std::fmt;
use std::sync::Arc;

use void_gltf::{Document, NodeIndex};

use super::cache::ObjectCache;
use super::deferred::{DeferredAction, DeferredQueue};
use super::mapping::NodeMap;
use super::side_channel::SideChannel;
use crate::error::{HandlerError, HandlerResult};
use crate::registry::{HandlerSet, RegisteredHandler};
use crate::scene::{ObjectId, SceneGraph};

/// Import lifecycle; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ImportState {
    Created,
    DocumentHandlersRun,
    NodesMapped,
    NodeHandlersRun,
    DeferredActionsDrained,
    Disposed,
}

/// State shared by all handlers during one import
pub struct ImportContext<'a> {
    scene: &'a mut dyn SceneGraph,
    document: &'a Document,
    handlers: Arc<HandlerSet>,
    nodes: NodeMap,
    side_channel: SideChannel,
    deferred: DeferredQueue,
    cache: ObjectCache,
    state: ImportState,
    current_extension: Option<Arc<str>>,
    current_node: Option<NodeIndex>,
}

impl<'a> ImportContext<'a> {
    pub(crate) fn new(
        scene: &'a mut dyn SceneGraph,
        document: &'a Document,
        handlers: Arc<HandlerSet>,
    ) -> Self {
        Self {
            scene,
            document,
            handlers,
            nodes: NodeMap::new(),
            side_channel: SideChannel::new(),
            deferred: DeferredQueue::default(),
            cache: ObjectCache::new(),
            state: ImportState::Created,
            current_extension: None,
            current_node: None,
        }
    }

    /// Scene being populated
    pub fn scene(&self) -> &(dyn SceneGraph + 'a) {
        &*self.scene
    }

    /// Mutable scene being populated
    pub fn scene_mut(&mut self) -> &mut (dyn SceneGraph + 'a) {
        &mut *self.scene
    }

    /// The document being imported
    pub fn document(&self) -> &'a Document {
        self.document
    }

    /// Current lifecycle state
    pub fn state(&self) -> ImportState {
        self.state
    }

    // ------------------------------------------------------------------
    // Mapping
    // ------------------------------------------------------------------

    /// Scene object created for `node`
    pub fn object(&self, node: NodeIndex) -> HandlerResult<ObjectId> {
        self.nodes.object(node).ok_or(HandlerError::UnmappedNode(node))
    }

    /// Scene object created for `node`, if any
    pub fn try_object(&self, node: NodeIndex) -> Option<ObjectId> {
        self.nodes.object(node)
    }

    /// Node index a scene object was created for
    pub fn node_of(&self, object: ObjectId) -> Option<NodeIndex> {
        self.nodes.node(object)
    }

    /// Node/object mapping for this import
    pub fn nodes(&self) -> &NodeMap {
        &self.nodes
    }

    // ------------------------------------------------------------------
    // Shared state
    // ------------------------------------------------------------------

    /// Shared key/value state for cooperating handlers
    pub fn side_channel(&self) -> &SideChannel {
        &self.side_channel
    }

    /// Mutable shared key/value state
    pub fn side_channel_mut(&mut self) -> &mut SideChannel {
        &mut self.side_channel
    }

    /// Objects already built from document resources
    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    /// Mutable resource object cache
    pub fn cache_mut(&mut self) -> &mut ObjectCache {
        &mut self.cache
    }

    /// Another registered handler, for cooperating extensions
    pub fn lookup(&self, name: &str) -> Option<&RegisteredHandler> {
        self.handlers.lookup(name)
    }

    /// Another registered handler as its concrete type
    pub fn handler<H: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<H>> {
        self.lookup(name)?.downcast::<H>()
    }

    // ------------------------------------------------------------------
    // Deferred actions
    // ------------------------------------------------------------------

    /// Queue work to run once every node's handlers have run
    ///
    /// Actions run in the order they were queued. An action may queue more
    /// actions; those run in the same drain, after everything already queued.
    pub fn defer<F>(&mut self, action: F)
    where
        F: FnOnce(&mut ImportContext<'_>) -> HandlerResult<()> + Send + 'static,
    {
        self.deferred.push(DeferredAction {
            extension: self.current_extension.clone(),
            node: self.current_node,
            run: Box::new(action),
        });
    }

    /// Get the number of queued deferred actions
    pub fn pending_deferred(&self) -> usize {
        self.deferred.len()
    }

    // ------------------------------------------------------------------
    // Orchestrator hooks
    // ------------------------------------------------------------------

    pub(crate) fn handlers(&self) -> Arc<HandlerSet> {
        Arc::clone(&self.handlers)
    }

    pub(crate) fn advance(&mut self, next: ImportState) {
        debug_assert!(next > self.state, "import state moved backwards");
        log::debug!("Import context {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    pub(crate) fn map_node(&mut self, node: NodeIndex, object: ObjectId) {
        self.nodes.insert(node, object);
    }

    pub(crate) fn set_current(&mut self, extension: Option<Arc<str>>, node: Option<NodeIndex>) {
        self.current_extension = extension;
        self.current_node = node;
    }

    pub(crate) fn next_deferred(&mut self) -> Option<DeferredAction> {
        self.deferred.pop()
    }

    /// Clear mappings, caches and any queued work
    pub(crate) fn dispose(&mut self) {
        let dropped = self.deferred.len();
        if dropped > 0 {
            log::debug!("Dropping {} undrained deferred actions", dropped);
        }

        self.nodes.clear();
        self.side_channel.clear();
        self.deferred.clear();
        self.cache.clear();
        self.set_current(None, None);
        self.state = ImportState::Disposed;
    }
}

impl fmt::Debug for ImportContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportContext")
            .field("state", &self.state)
            .field("nodes", &self.nodes.len())
            .field("side_channel", &self.side_channel)
            .field("deferred", &self.deferred)
            .field("cache", &self.cache)
            .finish()
    }
}
