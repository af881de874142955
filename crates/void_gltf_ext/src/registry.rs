//! Extension handler registry
//!
//! Holds at most one handler per extension name, kept sorted by descending
//! priority with ties resolved by registration order. Capability subsets are
//! computed on demand and cached until the next mutation. Operations take an
//! immutable [`HandlerSet`] snapshot so no lock is held while handlers run.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::RegistryError;
use crate::handler::{
    Capability, CapabilitySet, ErasedDocumentHandler, ErasedHandler, ErasedNodeHandler,
    Registration,
};

/// Active registration as seen by the orchestrator and by cooperating handlers
#[derive(Clone)]
pub struct RegisteredHandler {
    name: Arc<str>,
    priority: i32,
    order: u64,
    capabilities: CapabilitySet,
    generic: Arc<dyn ErasedHandler>,
    node: Option<Arc<dyn ErasedNodeHandler>>,
    document: Option<Arc<dyn ErasedDocumentHandler>>,
    instance: Arc<dyn Any + Send + Sync>,
}

impl RegisteredHandler {
    /// Extension name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dispatch priority; higher runs first
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Registration sequence number (later registrations are larger)
    pub fn order(&self) -> u64 {
        self.order
    }

    /// Capabilities the handler was registered with
    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    /// Check for one capability
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }

    /// The concrete handler, if it is an `H`
    pub fn downcast<H: Send + Sync + 'static>(&self) -> Option<Arc<H>> {
        Arc::clone(&self.instance).downcast::<H>().ok()
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub(crate) fn generic(&self) -> &Arc<dyn ErasedHandler> {
        &self.generic
    }

    pub(crate) fn node(&self) -> Option<&Arc<dyn ErasedNodeHandler>> {
        self.node.as_ref()
    }

    pub(crate) fn document(&self) -> Option<&Arc<dyn ErasedDocumentHandler>> {
        self.document.as_ref()
    }
}

impl fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("order", &self.order)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Immutable, priority-ordered view of the registry for one operation
#[derive(Debug, Clone)]
pub struct HandlerSet {
    all: Arc<[RegisteredHandler]>,
    node: Arc<[RegisteredHandler]>,
    document: Arc<[RegisteredHandler]>,
}

impl HandlerSet {
    /// Every handler in priority order
    pub fn all(&self) -> &[RegisteredHandler] {
        &self.all
    }

    /// Priority-ordered handlers providing `capability`
    pub fn with_capability(&self, capability: Capability) -> &[RegisteredHandler] {
        match capability {
            Capability::Generic => &self.all,
            Capability::Node => &self.node,
            Capability::Document => &self.document,
        }
    }

    /// Find a handler by extension name
    pub fn lookup(&self, name: &str) -> Option<&RegisteredHandler> {
        self.all.iter().find(|h| h.name() == name)
    }

    /// Check if a handler is registered for `name`
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Get the number of registered handlers
    pub fn len(&self) -> usize {
        self.all.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

/// Registry of extension handlers
pub struct ExtensionRegistry {
    /// Sorted by descending priority, then ascending order
    handlers: Vec<RegisteredHandler>,
    next_order: u64,
    capability_cache: Mutex<HashMap<Capability, Arc<[RegisteredHandler]>>>,
}

impl ExtensionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            next_order: 0,
            capability_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Register a handler, replacing any existing one with the same name
    pub fn register(&mut self, registration: Registration) -> Result<(), RegistryError> {
        if registration.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let Registration {
            name,
            priority,
            capabilities,
            generic,
            node,
            document,
            instance,
        } = registration;

        if self.remove(&name) {
            log::debug!("Replacing extension handler '{}'", name);
        }

        let order = self.next_order;
        self.next_order += 1;

        log::debug!(
            "Registered extension handler '{}' (priority {}, order {})",
            name,
            priority,
            order
        );

        self.handlers.push(RegisteredHandler {
            name,
            priority,
            order,
            capabilities,
            generic,
            node,
            document,
            instance,
        });
        self.handlers
            .sort_by(|a, b| b.priority.cmp(&a.priority).then(a.order.cmp(&b.order)));
        self.invalidate();

        Ok(())
    }

    /// Remove a handler; unknown names are ignored
    pub fn unregister(&mut self, name: &str) {
        if self.remove(name) {
            log::debug!("Unregistered extension handler '{}'", name);
            self.invalidate();
        }
    }

    /// Find a handler by extension name
    pub fn lookup(&self, name: &str) -> Option<&RegisteredHandler> {
        self.handlers.iter().find(|h| h.name() == name)
    }

    /// Check if a handler is registered for `name`
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Every handler in priority order
    pub fn handlers(&self) -> &[RegisteredHandler] {
        &self.handlers
    }

    /// Priority-ordered handlers providing `capability`
    pub fn handlers_with_capability(&self, capability: Capability) -> Arc<[RegisteredHandler]> {
        let mut cache = self.capability_cache.lock();
        let entry = cache.entry(capability).or_insert_with(|| {
            self.handlers
                .iter()
                .filter(|h| h.has(capability))
                .cloned()
                .collect()
        });
        Arc::clone(entry)
    }

    /// Snapshot for one import or export operation
    pub fn snapshot(&self) -> Arc<HandlerSet> {
        Arc::new(HandlerSet {
            all: self.handlers_with_capability(Capability::Generic),
            node: self.handlers_with_capability(Capability::Node),
            document: self.handlers_with_capability(Capability::Document),
        })
    }

    /// Get the number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn remove(&mut self, name: &str) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|h| h.name() != name);
        self.handlers.len() != before
    }

    fn invalidate(&self) {
        self.capability_cache.lock().clear();
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("handlers", &self.handlers)
            .finish()
    }
}

/// Thread-safe registry handle shared between pipelines
#[derive(Clone, Default)]
pub struct SharedExtensionRegistry {
    inner: Arc<RwLock<ExtensionRegistry>>,
}

impl SharedExtensionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing registry
    pub fn from_registry(registry: ExtensionRegistry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(registry)),
        }
    }

    /// Lock for reading
    pub fn read(&self) -> RwLockReadGuard<'_, ExtensionRegistry> {
        self.inner.read()
    }

    /// Lock for writing
    pub fn write(&self) -> RwLockWriteGuard<'_, ExtensionRegistry> {
        self.inner.write()
    }

    /// Register a handler, replacing any existing one with the same name
    pub fn register(&self, registration: Registration) -> Result<(), RegistryError> {
        self.inner.write().register(registration)
    }

    /// Remove a handler; unknown names are ignored
    pub fn unregister(&self, name: &str) {
        self.inner.write().unregister(name);
    }

    /// Snapshot for one import or export operation
    pub fn snapshot(&self) -> Arc<HandlerSet> {
        self.inner.read().snapshot()
    }
}

impl fmt::Debug for SharedExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner.read(), f)
    }
}
