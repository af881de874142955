//! Deferred actions run after the node walk

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use void_gltf::NodeIndex;

use super::import::ImportContext;
use crate::error::HandlerResult;

/// Unit of work queued during node processing
///
/// Receives the import context when it runs; everything else it needs is
/// captured by move.
pub type DeferredFn = Box<dyn FnOnce(&mut ImportContext<'_>) -> HandlerResult<()> + Send>;

/// A queued action tagged with where it was enqueued from
pub(crate) struct DeferredAction {
    pub extension: Option<Arc<str>>,
    pub node: Option<NodeIndex>,
    pub run: DeferredFn,
}

/// FIFO queue of deferred actions
#[derive(Default)]
pub struct DeferredQueue {
    actions: VecDeque<DeferredAction>,
}

impl DeferredQueue {
    pub(crate) fn push(&mut self, action: DeferredAction) {
        self.actions.push_back(action);
    }

    pub(crate) fn pop(&mut self) -> Option<DeferredAction> {
        self.actions.pop_front()
    }

    /// Get the number of queued actions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.actions.clear();
    }
}

impl fmt::Debug for DeferredQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.actions
                    .iter()
                    .map(|a| (a.extension.as_deref(), a.node)),
            )
            .finish()
    }
}
