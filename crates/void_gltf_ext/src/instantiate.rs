//! Base importer and exporter collaborators
//!
//! Mesh, material and animation translation belongs to the host. The pipeline
//! only needs a scene object per node on import and the base document bytes
//! on export; both sides are pluggable.

use std::collections::HashMap;

use serde_json::Value;
use void_gltf::{Document, JsonObject, NodeIndex};

use crate::error::PipelineResult;
use crate::scene::{ObjectId, SceneGraph, SceneGraphExt};

/// Node a scene object was instantiated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceNode(pub NodeIndex);

/// Creates scene objects for a document's nodes
pub trait SceneInstantiator: Send + Sync {
    /// Create objects for `order`, returning them positionally aligned with it
    ///
    /// `objects[i]` belongs to node `order[i]`. Returning fewer objects than
    /// nodes leaves the trailing nodes unmapped.
    fn instantiate(
        &self,
        document: &Document,
        order: &[NodeIndex],
        scene: &mut dyn SceneGraph,
    ) -> PipelineResult<Vec<ObjectId>>;
}

/// Produces the base document for a set of scene objects
pub trait BaseExporter: Send + Sync {
    /// Serialize a document whose node `i` is `objects[i]`
    fn export(&self, scene: &dyn SceneGraph, objects: &[ObjectId]) -> PipelineResult<Vec<u8>>;
}

/// Spawns one object per node, named after it, and rebuilds the hierarchy
///
/// Each object carries a [`SourceNode`] component naming the node it came from.
#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchyInstantiator;

impl SceneInstantiator for HierarchyInstantiator {
    fn instantiate(
        &self,
        document: &Document,
        order: &[NodeIndex],
        scene: &mut dyn SceneGraph,
    ) -> PipelineResult<Vec<ObjectId>> {
        let mut objects = Vec::with_capacity(order.len());
        let mut by_node = HashMap::with_capacity(order.len());

        for &node in order {
            let object = scene.spawn(document.node_name(node)?);
            scene.insert_component(object, SourceNode(node));
            objects.push(object);
            by_node.insert(node, object);
        }

        for &node in order {
            let children = match document.node_children(node) {
                Ok(Some(children)) => children,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("Skipping children of node {}: {}", node, e);
                    continue;
                }
            };
            for child_node in children {
                let (Some(&parent), Some(&child)) = (by_node.get(&node), by_node.get(&child_node)) else {
                    continue;
                };
                if !scene.set_parent(child, Some(parent)) {
                    log::warn!(
                        "Node {} cannot be parented under node {}; left where it was",
                        child_node,
                        node
                    );
                }
            }
        }

        log::debug!("Instantiated {} scene objects", objects.len());
        Ok(objects)
    }
}

/// Writes node names, the child hierarchy and one scene of the roots
#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchyExporter;

impl BaseExporter for HierarchyExporter {
    fn export(&self, scene: &dyn SceneGraph, objects: &[ObjectId]) -> PipelineResult<Vec<u8>> {
        let mut document = Document::new();
        for &object in objects {
            document.add_node(scene.name(object))?;
        }
        write_hierarchy(&mut document, scene, objects)?;

        Ok(document.to_json_vec()?)
    }
}

/// Re-emits a parsed document around the scene's current hierarchy
///
/// Objects carrying a [`SourceNode`] keep everything their source node held
/// (mesh, camera, skin, transform) except children and extension blocks.
/// Names, children and the default scene come from the scene graph. Other
/// top-level members, the binary chunk and the container kind carry over,
/// with node references in skins and animations renumbered.
#[derive(Debug, Clone)]
pub struct DocumentExporter {
    base: Document,
}

impl DocumentExporter {
    /// Create an exporter over a parsed document
    pub fn new(base: Document) -> Self {
        Self { base }
    }

    /// Document node payloads and top-level members are taken from
    pub fn base(&self) -> &Document {
        &self.base
    }

    fn node_from_base(&self, scene: &dyn SceneGraph, object: ObjectId) -> Option<(NodeIndex, JsonObject)> {
        let &SourceNode(source) = scene.component::<SourceNode>(object)?;
        match self.base.node(source) {
            Ok(node) => Some((source, node.clone())),
            Err(e) => {
                log::debug!("Object {:?} exported without its source node: {}", object, e);
                None
            }
        }
    }
}

impl BaseExporter for DocumentExporter {
    fn export(&self, scene: &dyn SceneGraph, objects: &[ObjectId]) -> PipelineResult<Vec<u8>> {
        let mut document = Document::new();
        let root = document.root_mut();
        for (key, value) in self.base.root() {
            if !matches!(key.as_str(), "nodes" | "scenes" | "scene" | "extensions") {
                root.insert(key.clone(), value.clone());
            }
        }

        let mut renumber = HashMap::with_capacity(objects.len());
        let mut nodes = Vec::with_capacity(objects.len());
        for (index, &object) in objects.iter().enumerate() {
            let mut node = match self.node_from_base(scene, object) {
                Some((source, node)) => {
                    renumber.entry(source).or_insert(index);
                    node
                }
                None => JsonObject::new(),
            };
            node.remove("children");
            node.remove("extensions");
            node.remove("name");
            if let Some(name) = scene.name(object) {
                node.insert("name".into(), Value::from(name));
            }
            nodes.push(Value::Object(node));
        }
        if !nodes.is_empty() {
            root.insert("nodes".into(), Value::Array(nodes));
        }
        renumber_node_refs(root, &renumber);

        write_hierarchy(&mut document, scene, objects)?;
        document.set_binary(self.base.binary().map(<[u8]>::to_vec));
        document.set_container(self.base.container());

        Ok(document.to_bytes()?)
    }
}

/// Children lists and a default scene of the roots, for node `i == objects[i]`
fn write_hierarchy(
    document: &mut Document,
    scene: &dyn SceneGraph,
    objects: &[ObjectId],
) -> PipelineResult<()> {
    let index: HashMap<ObjectId, NodeIndex> =
        objects.iter().enumerate().map(|(i, &o)| (o, i)).collect();

    for (node, &object) in objects.iter().enumerate() {
        let children: Vec<NodeIndex> = scene
            .children(object)
            .into_iter()
            .filter_map(|c| index.get(&c).copied())
            .collect();
        document.set_node_children(node, &children)?;
    }

    let roots: Vec<NodeIndex> = scene
        .roots()
        .into_iter()
        .filter_map(|r| index.get(&r).copied())
        .collect();
    if !roots.is_empty() {
        let scene_index = document.add_scene(&roots)?;
        document.set_default_scene(scene_index);
    }
    Ok(())
}

/// Rewrite skin joints, skeletons and animation targets to new node indices
///
/// References to nodes that were not exported are dropped.
fn renumber_node_refs(root: &mut JsonObject, renumber: &HashMap<NodeIndex, NodeIndex>) {
    let lookup = |value: &Value| {
        let index = usize::try_from(value.as_u64()?).ok()?;
        renumber.get(&index).map(|&n| Value::from(n))
    };
    let remap_key = |object: &mut JsonObject, key: &str| {
        if let Some(value) = object.get(key) {
            match lookup(value) {
                Some(mapped) => {
                    object.insert(key.into(), mapped);
                }
                None => {
                    log::debug!("Dropping '{}' reference to an unexported node", key);
                    object.remove(key);
                }
            }
        }
    };

    if let Some(Value::Array(skins)) = root.get_mut("skins") {
        for skin in skins.iter_mut().filter_map(Value::as_object_mut) {
            if let Some(Value::Array(joints)) = skin.get_mut("joints") {
                let before = joints.len();
                *joints = joints.iter().filter_map(lookup).collect();
                if joints.len() != before {
                    log::warn!("Skin lost {} joints to unexported nodes", before - joints.len());
                }
            }
            remap_key(skin, "skeleton");
        }
    }

    if let Some(Value::Array(animations)) = root.get_mut("animations") {
        for animation in animations.iter_mut().filter_map(Value::as_object_mut) {
            let Some(Value::Array(channels)) = animation.get_mut("channels") else {
                continue;
            };
            for channel in channels.iter_mut().filter_map(Value::as_object_mut) {
                if let Some(target) = channel.get_mut("target").and_then(Value::as_object_mut) {
                    remap_key(target, "node");
                }
            }
        }
    }
}
