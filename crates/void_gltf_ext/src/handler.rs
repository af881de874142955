//! Extension handler traits
//!
//! A handler translates one named extension between its JSON block and the
//! host scene. Every handler implements [`ExtensionHandler`]; handlers that
//! work on node-level or document-level blocks additionally implement
//! [`NodeExtensionHandler`] and/or [`DocumentExtensionHandler`]. Which of
//! these a handler provides is declared when it is wrapped in a
//! [`Registration`], so the registry never has to discover it at runtime.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use void_gltf::NodeIndex;

use crate::cancel::CancellationToken;
use crate::context::{ExportContext, ImportContext};
use crate::error::HandlerResult;
use crate::scene::ObjectId;

/// What a registered handler can process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    /// Plain import/export pair (every handler)
    Generic,
    /// Per-node blocks
    Node,
    /// Document-level blocks
    Document,
}

impl Capability {
    const fn bit(self) -> u8 {
        match self {
            Self::Generic => 1,
            Self::Node => 1 << 1,
            Self::Document => 1 << 2,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic => write!(f, "generic"),
            Self::Node => write!(f, "node"),
            Self::Document => write!(f, "document"),
        }
    }
}

/// Set of [`Capability`] values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub const GENERIC: Self = Self(1);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    pub const fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    /// Only the generic pair, no scoped capability
    pub const fn is_generic_only(&self) -> bool {
        self.0 == Self::GENERIC.0
    }

    /// Capabilities in the set
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        [Capability::Generic, Capability::Node, Capability::Document]
            .into_iter()
            .filter(move |c| self.contains(*c))
    }
}

/// A translator for one extension name
#[async_trait::async_trait]
pub trait ExtensionHandler: Send + Sync + 'static {
    /// Decoded form of the extension's JSON block
    type Payload: Serialize + DeserializeOwned + Send + 'static;

    /// Extension name this handler owns (e.g. `OMI_physics_body`)
    fn name(&self) -> &str;

    /// Higher runs first
    fn priority(&self) -> i32 {
        0
    }

    /// Import a block not tied to a node
    async fn import(
        &self,
        payload: Self::Payload,
        ctx: &mut ImportContext<'_>,
        cancel: &CancellationToken,
    ) -> HandlerResult<()> {
        let _ = (payload, ctx, cancel);
        Ok(())
    }

    /// Produce a block not tied to a node; `None` emits nothing
    async fn export(
        &self,
        ctx: &mut ExportContext<'_>,
        cancel: &CancellationToken,
    ) -> HandlerResult<Option<Self::Payload>> {
        let _ = (ctx, cancel);
        Ok(None)
    }
}

/// Node-scoped behaviour
#[async_trait::async_trait]
pub trait NodeExtensionHandler: ExtensionHandler {
    /// Apply the block found on `node` to its scene object
    ///
    /// Other nodes may not have been processed yet; references to them must
    /// go through [`ImportContext::defer`].
    async fn import_node(
        &self,
        payload: Self::Payload,
        node: NodeIndex,
        object: ObjectId,
        ctx: &mut ImportContext<'_>,
        cancel: &CancellationToken,
    ) -> HandlerResult<()>;

    /// Produce the block for `object`, exported as `node`
    async fn export_node(
        &self,
        node: NodeIndex,
        object: ObjectId,
        ctx: &mut ExportContext<'_>,
        cancel: &CancellationToken,
    ) -> HandlerResult<Option<Self::Payload>>;
}

/// Document-scoped behaviour
#[async_trait::async_trait]
pub trait DocumentExtensionHandler: ExtensionHandler {
    async fn import_document(
        &self,
        payload: Self::Payload,
        ctx: &mut ImportContext<'_>,
        cancel: &CancellationToken,
    ) -> HandlerResult<()>;

    /// Runs after every node-level export, so shared resource tables are
    /// complete
    async fn export_document(
        &self,
        ctx: &mut ExportContext<'_>,
        cancel: &CancellationToken,
    ) -> HandlerResult<Option<Self::Payload>>;
}

// ----------------------------------------------------------------------------
// Type-erased adapters over raw JSON blocks
// ----------------------------------------------------------------------------

#[async_trait::async_trait]
pub(crate) trait ErasedHandler: Send + Sync {
    async fn import(
        &self,
        block: Value,
        ctx: &mut ImportContext<'_>,
        cancel: &CancellationToken,
    ) -> HandlerResult<()>;

    async fn export(
        &self,
        ctx: &mut ExportContext<'_>,
        cancel: &CancellationToken,
    ) -> HandlerResult<Option<Value>>;
}

#[async_trait::async_trait]
pub(crate) trait ErasedNodeHandler: Send + Sync {
    async fn import_node(
        &self,
        block: Value,
        node: NodeIndex,
        object: ObjectId,
        ctx: &mut ImportContext<'_>,
        cancel: &CancellationToken,
    ) -> HandlerResult<()>;

    async fn export_node(
        &self,
        node: NodeIndex,
        object: ObjectId,
        ctx: &mut ExportContext<'_>,
        cancel: &CancellationToken,
    ) -> HandlerResult<Option<Value>>;
}

#[async_trait::async_trait]
pub(crate) trait ErasedDocumentHandler: Send + Sync {
    async fn import_document(
        &self,
        block: Value,
        ctx: &mut ImportContext<'_>,
        cancel: &CancellationToken,
    ) -> HandlerResult<()>;

    async fn export_document(
        &self,
        ctx: &mut ExportContext<'_>,
        cancel: &CancellationToken,
    ) -> HandlerResult<Option<Value>>;
}

struct Adapter<H>(Arc<H>);

fn encode<P: Serialize>(payload: Option<P>) -> HandlerResult<Option<Value>> {
    match payload {
        Some(payload) => Ok(Some(serde_json::to_value(payload)?)),
        None => Ok(None),
    }
}

#[async_trait::async_trait]
impl<H: ExtensionHandler> ErasedHandler for Adapter<H> {
    async fn import(
        &self,
        block: Value,
        ctx: &mut ImportContext<'_>,
        cancel: &CancellationToken,
    ) -> HandlerResult<()> {
        let payload: H::Payload = serde_json::from_value(block)?;
        self.0.import(payload, ctx, cancel).await
    }

    async fn export(
        &self,
        ctx: &mut ExportContext<'_>,
        cancel: &CancellationToken,
    ) -> HandlerResult<Option<Value>> {
        encode(self.0.export(ctx, cancel).await?)
    }
}

#[async_trait::async_trait]
impl<H: NodeExtensionHandler> ErasedNodeHandler for Adapter<H> {
    async fn import_node(
        &self,
        block: Value,
        node: NodeIndex,
        object: ObjectId,
        ctx: &mut ImportContext<'_>,
        cancel: &CancellationToken,
    ) -> HandlerResult<()> {
        let payload: H::Payload = serde_json::from_value(block)?;
        self.0.import_node(payload, node, object, ctx, cancel).await
    }

    async fn export_node(
        &self,
        node: NodeIndex,
        object: ObjectId,
        ctx: &mut ExportContext<'_>,
        cancel: &CancellationToken,
    ) -> HandlerResult<Option<Value>> {
        encode(self.0.export_node(node, object, ctx, cancel).await?)
    }
}

#[async_trait::async_trait]
impl<H: DocumentExtensionHandler> ErasedDocumentHandler for Adapter<H> {
    async fn import_document(
        &self,
        block: Value,
        ctx: &mut ImportContext<'_>,
        cancel: &CancellationToken,
    ) -> HandlerResult<()> {
        let payload: H::Payload = serde_json::from_value(block)?;
        self.0.import_document(payload, ctx, cancel).await
    }

    async fn export_document(
        &self,
        ctx: &mut ExportContext<'_>,
        cancel: &CancellationToken,
    ) -> HandlerResult<Option<Value>> {
        encode(self.0.export_document(ctx, cancel).await?)
    }
}

// ----------------------------------------------------------------------------
// Registration
// ----------------------------------------------------------------------------

/// A handler packaged with its statically declared capabilities
///
/// ```ignore
/// registry.register(Registration::node(PhysicsBodyHandler::default()))?;
/// registry.register(Registration::node_and_document(GravityHandler).with_priority(10))?;
/// ```
pub struct Registration {
    pub(crate) name: Arc<str>,
    pub(crate) priority: i32,
    pub(crate) capabilities: CapabilitySet,
    pub(crate) generic: Arc<dyn ErasedHandler>,
    pub(crate) node: Option<Arc<dyn ErasedNodeHandler>>,
    pub(crate) document: Option<Arc<dyn ErasedDocumentHandler>>,
    pub(crate) instance: Arc<dyn Any + Send + Sync>,
}

impl Registration {
    fn base<H: ExtensionHandler>(handler: Arc<H>) -> Self {
        Self {
            name: Arc::from(handler.name()),
            priority: handler.priority(),
            capabilities: CapabilitySet::GENERIC,
            generic: Arc::new(Adapter(Arc::clone(&handler))),
            node: None,
            document: None,
            instance: handler,
        }
    }

    /// Handler with only the plain import/export pair
    pub fn generic<H: ExtensionHandler>(handler: H) -> Self {
        Self::base(Arc::new(handler))
    }

    /// Register a handler for node-level blocks
    pub fn node<H: NodeExtensionHandler>(handler: H) -> Self {
        let handler = Arc::new(handler);
        let mut registration = Self::base(Arc::clone(&handler));
        registration.capabilities = registration.capabilities.with(Capability::Node);
        registration.node = Some(Arc::new(Adapter(handler)));
        registration
    }

    /// Register a handler for document-level blocks
    pub fn document<H: DocumentExtensionHandler>(handler: H) -> Self {
        let handler = Arc::new(handler);
        let mut registration = Self::base(Arc::clone(&handler));
        registration.capabilities = registration.capabilities.with(Capability::Document);
        registration.document = Some(Arc::new(Adapter(handler)));
        registration
    }

    /// Register a handler for both node- and document-level blocks
    pub fn node_and_document<H>(handler: H) -> Self
    where
        H: NodeExtensionHandler + DocumentExtensionHandler,
    {
        let handler = Arc::new(handler);
        let mut registration = Self::base(Arc::clone(&handler));
        registration.capabilities = registration
            .capabilities
            .with(Capability::Node)
            .with(Capability::Document);
        registration.node = Some(Arc::new(Adapter(Arc::clone(&handler))));
        registration.document = Some(Arc::new(Adapter(handler)));
        registration
    }

    /// Override the handler's own priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Extension name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dispatch priority
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Capabilities being registered
    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}
