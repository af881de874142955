//! Scene-graph collaborator
//!
//! The pipeline only needs a small slice of a host scene graph: spawning and
//! parenting objects, enumerating roots and children in a stable order, and
//! typed component and resource storage. Hosts implement [`SceneGraph`] over
//! their own world; [`MemoryScene`] is a self-contained implementation used
//! by tools and tests.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Stable handle to an object in a scene graph
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Create from a host-specific raw value
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value
    #[inline]
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Type-erased component or resource value
pub type Component = Box<dyn Any + Send + Sync>;

/// Host scene graph as seen by the pipeline
///
/// Object-safe on purpose: handlers receive `&mut dyn SceneGraph`. Typed
/// access goes through [`SceneGraphExt`].
pub trait SceneGraph: Send + Sync {
    /// Create a new root object
    fn spawn(&mut self, name: Option<&str>) -> ObjectId;

    /// Re-parent an object (`None` makes it a root). Returns false if either
    /// object is unknown or the change would create a cycle.
    fn set_parent(&mut self, object: ObjectId, parent: Option<ObjectId>) -> bool;

    fn contains(&self, object: ObjectId) -> bool;

    fn name(&self, object: ObjectId) -> Option<&str>;

    fn parent(&self, object: ObjectId) -> Option<ObjectId>;

    /// Children in insertion order
    fn children(&self, object: ObjectId) -> Vec<ObjectId>;

    /// Root objects in insertion order
    fn roots(&self) -> Vec<ObjectId>;

    fn component_raw(&self, object: ObjectId, kind: TypeId) -> Option<&(dyn Any + Send + Sync)>;

    fn component_raw_mut(
        &mut self,
        object: ObjectId,
        kind: TypeId,
    ) -> Option<&mut (dyn Any + Send + Sync)>;

    /// Store a component, replacing any previous one of the same kind.
    /// Returns false if the object does not exist.
    fn insert_component_raw(&mut self, object: ObjectId, kind: TypeId, value: Component) -> bool;

    fn remove_component_raw(&mut self, object: ObjectId, kind: TypeId) -> Option<Component>;

    /// Scene-wide value not attached to any object
    fn resource_raw(&self, kind: TypeId) -> Option<&(dyn Any + Send + Sync)>;

    fn resource_raw_mut(&mut self, kind: TypeId) -> Option<&mut (dyn Any + Send + Sync)>;

    fn insert_resource_raw(&mut self, kind: TypeId, value: Component);

    fn remove_resource_raw(&mut self, kind: TypeId) -> Option<Component>;
}

/// Typed helpers over any [`SceneGraph`], including trait objects
pub trait SceneGraphExt: SceneGraph {
    fn component<T: Any + Send + Sync>(&self, object: ObjectId) -> Option<&T> {
        self.component_raw(object, TypeId::of::<T>())?.downcast_ref()
    }

    fn component_mut<T: Any + Send + Sync>(&mut self, object: ObjectId) -> Option<&mut T> {
        self.component_raw_mut(object, TypeId::of::<T>())?.downcast_mut()
    }

    fn has_component<T: Any + Send + Sync>(&self, object: ObjectId) -> bool {
        self.component_raw(object, TypeId::of::<T>()).is_some()
    }

    fn insert_component<T: Any + Send + Sync>(&mut self, object: ObjectId, value: T) -> bool {
        self.insert_component_raw(object, TypeId::of::<T>(), Box::new(value))
    }

    fn remove_component<T: Any + Send + Sync>(&mut self, object: ObjectId) -> Option<T> {
        self.remove_component_raw(object, TypeId::of::<T>())?
            .downcast::<T>()
            .ok()
            .map(|b| *b)
    }

    fn resource<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.resource_raw(TypeId::of::<T>())?.downcast_ref()
    }

    fn resource_mut<T: Any + Send + Sync>(&mut self) -> Option<&mut T> {
        self.resource_raw_mut(TypeId::of::<T>())?.downcast_mut()
    }

    fn insert_resource<T: Any + Send + Sync>(&mut self, value: T) {
        self.insert_resource_raw(TypeId::of::<T>(), Box::new(value));
    }

    fn remove_resource<T: Any + Send + Sync>(&mut self) -> Option<T> {
        self.remove_resource_raw(TypeId::of::<T>())?
            .downcast::<T>()
            .ok()
            .map(|b| *b)
    }

    /// Depth-first pre-order walk from the roots
    fn walk(&self) -> Vec<ObjectId> {
        let mut order = Vec::new();
        let mut stack: Vec<ObjectId> = self.roots().into_iter().rev().collect();

        while let Some(object) = stack.pop() {
            order.push(object);
            stack.extend(self.children(object).into_iter().rev());
        }

        order
    }
}

impl<S: SceneGraph + ?Sized> SceneGraphExt for S {}

/// One object in a [`MemoryScene`]
struct SceneObject {
    name: Option<String>,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
    components: HashMap<TypeId, Component>,
}

/// In-memory scene graph
pub struct MemoryScene {
    objects: Vec<SceneObject>,
    roots: Vec<ObjectId>,
    resources: BTreeMap<TypeId, Component>,
}

impl MemoryScene {
    /// Create an empty scene
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            roots: Vec::new(),
            resources: BTreeMap::new(),
        }
    }

    /// Number of objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the scene has no objects
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// First object with the given name, in creation order
    pub fn find(&self, name: &str) -> Option<ObjectId> {
        self.objects
            .iter()
            .position(|o| o.name.as_deref() == Some(name))
            .map(|i| ObjectId(i as u64))
    }

    /// Spawn an object directly under a parent
    pub fn spawn_child(&mut self, name: Option<&str>, parent: ObjectId) -> ObjectId {
        let object = self.spawn(name);
        self.set_parent(object, Some(parent));
        object
    }

    fn get(&self, object: ObjectId) -> Option<&SceneObject> {
        self.objects.get(object.0 as usize)
    }

    fn get_mut(&mut self, object: ObjectId) -> Option<&mut SceneObject> {
        self.objects.get_mut(object.0 as usize)
    }

    fn is_ancestor(&self, ancestor: ObjectId, mut object: ObjectId) -> bool {
        loop {
            if object == ancestor {
                return true;
            }
            match self.get(object).and_then(|o| o.parent) {
                Some(parent) => object = parent,
                None => return false,
            }
        }
    }
}

impl Default for MemoryScene {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryScene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryScene")
            .field("objects", &self.objects.len())
            .field("roots", &self.roots)
            .field("resources", &self.resources.len())
            .finish()
    }
}

impl SceneGraph for MemoryScene {
    fn spawn(&mut self, name: Option<&str>) -> ObjectId {
        let id = ObjectId(self.objects.len() as u64);
        self.objects.push(SceneObject {
            name: name.map(str::to_string),
            parent: None,
            children: Vec::new(),
            components: HashMap::new(),
        });
        self.roots.push(id);
        id
    }

    fn set_parent(&mut self, object: ObjectId, parent: Option<ObjectId>) -> bool {
        if !self.contains(object) {
            return false;
        }
        if let Some(parent) = parent {
            if !self.contains(parent) || self.is_ancestor(object, parent) {
                return false;
            }
        }

        let old = self.objects[object.0 as usize].parent;
        match old {
            Some(old) => self.objects[old.0 as usize].children.retain(|&c| c != object),
            None => self.roots.retain(|&r| r != object),
        }

        match parent {
            Some(parent) => self.objects[parent.0 as usize].children.push(object),
            None => self.roots.push(object),
        }
        self.objects[object.0 as usize].parent = parent;
        true
    }

    fn contains(&self, object: ObjectId) -> bool {
        (object.0 as usize) < self.objects.len()
    }

    fn name(&self, object: ObjectId) -> Option<&str> {
        self.get(object)?.name.as_deref()
    }

    fn parent(&self, object: ObjectId) -> Option<ObjectId> {
        self.get(object)?.parent
    }

    fn children(&self, object: ObjectId) -> Vec<ObjectId> {
        self.get(object)
            .map(|o| o.children.clone())
            .unwrap_or_default()
    }

    fn roots(&self) -> Vec<ObjectId> {
        self.roots.clone()
    }

    fn component_raw(&self, object: ObjectId, kind: TypeId) -> Option<&(dyn Any + Send + Sync)> {
        self.get(object)?.components.get(&kind).map(|c| c.as_ref())
    }

    fn component_raw_mut(
        &mut self,
        object: ObjectId,
        kind: TypeId,
    ) -> Option<&mut (dyn Any + Send + Sync)> {
        match self.get_mut(object)?.components.get_mut(&kind) {
            Some(c) => Some(c.as_mut()),
            None => None,
        }
    }

    fn insert_component_raw(&mut self, object: ObjectId, kind: TypeId, value: Component) -> bool {
        match self.get_mut(object) {
            Some(o) => {
                o.components.insert(kind, value);
                true
            }
            None => false,
        }
    }

    fn remove_component_raw(&mut self, object: ObjectId, kind: TypeId) -> Option<Component> {
        self.get_mut(object)?.components.remove(&kind)
    }

    fn resource_raw(&self, kind: TypeId) -> Option<&(dyn Any + Send + Sync)> {
        self.resources.get(&kind).map(|r| r.as_ref())
    }

    fn resource_raw_mut(&mut self, kind: TypeId) -> Option<&mut (dyn Any + Send + Sync)> {
        match self.resources.get_mut(&kind) {
            Some(r) => Some(r.as_mut()),
            None => None,
        }
    }

    fn insert_resource_raw(&mut self, kind: TypeId, value: Component) {
        self.resources.insert(kind, value);
    }

    fn remove_resource_raw(&mut self, kind: TypeId) -> Option<Component> {
        self.resources.remove(&kind)
    }
}
