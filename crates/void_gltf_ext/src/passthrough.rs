//! Lossless handling for extensions without a dedicated translator

use std::collections::BTreeMap;

use serde_json::Value;
use void_gltf::NodeIndex;

use crate::cancel::CancellationToken;
use crate::context::{ExportContext, ImportContext};
use crate::error::{HandlerError, HandlerResult};
use crate::handler::{DocumentExtensionHandler, ExtensionHandler, NodeExtensionHandler};
use crate::scene::{ObjectId, SceneGraphExt};

/// Raw node-level extension blocks kept on a scene object, by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawExtensions(pub BTreeMap<String, Value>);

/// Raw document-level extension blocks kept as a scene resource, by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDocumentExtensions(pub BTreeMap<String, Value>);

/// Stores blocks verbatim on import and re-emits them on export
#[derive(Debug, Clone)]
pub struct PassthroughHandler {
    name: String,
    priority: i32,
}

impl PassthroughHandler {
    /// Create a passthrough handler for `name` at the lowest priority
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: i32::MIN,
        }
    }

    /// Override the dispatch priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[async_trait::async_trait]
impl ExtensionHandler for PassthroughHandler {
    type Payload = Value;

    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[async_trait::async_trait]
impl NodeExtensionHandler for PassthroughHandler {
    async fn import_node(
        &self,
        payload: Value,
        _node: NodeIndex,
        object: ObjectId,
        ctx: &mut ImportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<()> {
        let scene = ctx.scene_mut();
        if let Some(raw) = scene.component_mut::<RawExtensions>(object) {
            raw.0.insert(self.name.clone(), payload);
            return Ok(());
        }

        let mut raw = RawExtensions::default();
        raw.0.insert(self.name.clone(), payload);
        if scene.insert_component(object, raw) {
            Ok(())
        } else {
            Err(HandlerError::MissingObject(object))
        }
    }

    async fn export_node(
        &self,
        _node: NodeIndex,
        object: ObjectId,
        ctx: &mut ExportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<Option<Value>> {
        Ok(ctx
            .scene()
            .component::<RawExtensions>(object)
            .and_then(|raw| raw.0.get(&self.name))
            .cloned())
    }
}

#[async_trait::async_trait]
impl DocumentExtensionHandler for PassthroughHandler {
    async fn import_document(
        &self,
        payload: Value,
        ctx: &mut ImportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<()> {
        let scene = ctx.scene_mut();
        match scene.resource_mut::<RawDocumentExtensions>() {
            Some(raw) => {
                raw.0.insert(self.name.clone(), payload);
            }
            None => {
                let mut raw = RawDocumentExtensions::default();
                raw.0.insert(self.name.clone(), payload);
                scene.insert_resource(raw);
            }
        }
        Ok(())
    }

    async fn export_document(
        &self,
        ctx: &mut ExportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<Option<Value>> {
        Ok(ctx
            .scene()
            .resource::<RawDocumentExtensions>()
            .and_then(|raw| raw.0.get(&self.name))
            .cloned())
    }
}
