//! Parsed document tree
//!
//! The document is kept as a raw JSON object so that every field the codec
//! does not interpret (meshes, materials, accessors, unknown extensions)
//! survives a parse/serialize cycle untouched. Typed accessors sit on top and
//! validate indices instead of clamping them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CodecError, CodecResult};
use crate::glb;

/// Position of a node in the document's `nodes` array
pub type NodeIndex = usize;

/// A JSON object as stored in the document
pub type JsonObject = Map<String, Value>;

const NODES: &str = "nodes";
const SCENES: &str = "scenes";
const SCENE: &str = "scene";
const CHILDREN: &str = "children";
const EXTENSIONS: &str = "extensions";
const EXTENSIONS_USED: &str = "extensionsUsed";
const EXTENSIONS_REQUIRED: &str = "extensionsRequired";

/// Wire form a document was read from (and will be written back as)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// Plain UTF-8 JSON
    Json,
    /// Binary container wrapping a JSON chunk
    Binary,
}

/// Node walk used to assign scene objects to node indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraversalOrder {
    /// Node array order
    #[default]
    Declaration,
    /// Depth-first from the default scene's roots, then remaining parentless
    /// nodes, then anything left over (cycles), each in declaration order
    PreOrder,
}

/// Parsed wire document
#[derive(Debug, Clone)]
pub struct Document {
    root: JsonObject,
    container: ContainerKind,
    binary: Option<Vec<u8>>,
}

impl Document {
    /// Create an empty glTF 2.0 document
    pub fn new() -> Self {
        let mut asset = Map::new();
        asset.insert("version".into(), Value::from("2.0"));

        let mut root = Map::new();
        root.insert("asset".into(), Value::Object(asset));

        Self {
            root,
            container: ContainerKind::Json,
            binary: None,
        }
    }

    /// Parse wire bytes, detecting the container kind
    pub fn parse(bytes: &[u8]) -> CodecResult<Self> {
        let text = strip_bom(bytes);
        let first = text.iter().find(|b| !b.is_ascii_whitespace()).copied();

        if first == Some(b'{') {
            return Self::from_json_slice(text);
        }

        let container = glb::split(bytes)?;
        let json = trim_padding(container.json);
        let mut document = Self::from_json_slice(json)?;
        document.container = ContainerKind::Binary;
        document.binary = container.bin.map(|b| b.to_vec());
        Ok(document)
    }

    /// Parse a plain JSON document
    pub fn from_json_slice(bytes: &[u8]) -> CodecResult<Self> {
        let text = std::str::from_utf8(bytes)?;
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Wrap an already parsed JSON value
    pub fn from_value(value: Value) -> CodecResult<Self> {
        match value {
            Value::Object(root) => Ok(Self {
                root,
                container: ContainerKind::Json,
                binary: None,
            }),
            _ => Err(CodecError::NotAnObject),
        }
    }

    /// Serialize back to the container kind the document came from
    pub fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        let json = serde_json::to_vec(&self.root)?;
        match self.container {
            ContainerKind::Json => Ok(json),
            ContainerKind::Binary => glb::write(&json, self.binary.as_deref()),
        }
    }

    /// Serialize as compact JSON regardless of the source container
    pub fn to_json_vec(&self) -> CodecResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.root)?)
    }

    /// Serialize as indented JSON
    pub fn to_json_pretty(&self) -> CodecResult<String> {
        Ok(serde_json::to_string_pretty(&self.root)?)
    }

    /// Top-level JSON object
    pub fn root(&self) -> &JsonObject {
        &self.root
    }

    /// Mutable top-level JSON object
    pub fn root_mut(&mut self) -> &mut JsonObject {
        &mut self.root
    }

    /// Consume the document, returning its JSON root
    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }

    /// Container kind used by [`Document::to_bytes`]
    pub fn container(&self) -> ContainerKind {
        self.container
    }

    /// Change the container kind written by [`Document::to_bytes`]
    pub fn set_container(&mut self, container: ContainerKind) {
        self.container = container;
    }

    /// BIN chunk payload carried over from a binary container
    pub fn binary(&self) -> Option<&[u8]> {
        self.binary.as_deref()
    }

    /// Replace the binary chunk
    pub fn set_binary(&mut self, binary: Option<Vec<u8>>) {
        self.binary = binary;
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Number of entries in the `nodes` array (0 when absent)
    pub fn node_count(&self) -> usize {
        self.root
            .get(NODES)
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Get a node object by index
    pub fn node(&self, index: NodeIndex) -> CodecResult<&JsonObject> {
        let len = self.node_count();
        self.root
            .get(NODES)
            .and_then(Value::as_array)
            .and_then(|nodes| nodes.get(index))
            .ok_or_else(|| CodecError::out_of_range(NODES, index, len))?
            .as_object()
            .ok_or_else(|| CodecError::invalid_field(format!("nodes[{}]", index)))
    }

    fn node_mut(&mut self, index: NodeIndex) -> CodecResult<&mut JsonObject> {
        let len = self.node_count();
        self.root
            .get_mut(NODES)
            .and_then(Value::as_array_mut)
            .and_then(|nodes| nodes.get_mut(index))
            .ok_or_else(|| CodecError::out_of_range(NODES, index, len))?
            .as_object_mut()
            .ok_or_else(|| CodecError::invalid_field(format!("nodes[{}]", index)))
    }

    /// Node name, `None` when the field is absent
    pub fn node_name(&self, index: NodeIndex) -> CodecResult<Option<&str>> {
        match self.node(index)?.get("name") {
            None => Ok(None),
            Some(Value::String(name)) => Ok(Some(name.as_str())),
            Some(_) => Err(CodecError::invalid_field(format!("nodes[{}].name", index))),
        }
    }

    /// Node extension map, `None` when the node has no `extensions` field
    pub fn node_extensions(&self, index: NodeIndex) -> CodecResult<Option<&JsonObject>> {
        object_field(self.node(index)?, EXTENSIONS, || {
            format!("nodes[{}].extensions", index)
        })
    }

    /// A single extension block on a node
    pub fn node_extension(&self, index: NodeIndex, name: &str) -> CodecResult<Option<&Value>> {
        Ok(self.node_extensions(index)?.and_then(|ext| ext.get(name)))
    }

    /// Child indices of a node, each validated against the node array
    pub fn node_children(&self, index: NodeIndex) -> CodecResult<Option<Vec<NodeIndex>>> {
        let node = self.node(index)?;
        let path = || format!("nodes[{}].children", index);
        let Some(children) = node.get(CHILDREN) else {
            return Ok(None);
        };
        self.index_list(children, path).map(Some)
    }

    /// Append a node and return its index
    pub fn add_node(&mut self, name: Option<&str>) -> CodecResult<NodeIndex> {
        let mut node = Map::new();
        if let Some(name) = name {
            node.insert("name".into(), Value::from(name));
        }

        let nodes = array_entry(&mut self.root, NODES)?;
        nodes.push(Value::Object(node));
        Ok(nodes.len() - 1)
    }

    /// Replace a node's child list
    pub fn set_node_children(&mut self, index: NodeIndex, children: &[NodeIndex]) -> CodecResult<()> {
        let len = self.node_count();
        if let Some(&bad) = children.iter().find(|&&c| c >= len) {
            return Err(CodecError::out_of_range(NODES, bad, len));
        }

        let node = self.node_mut(index)?;
        if children.is_empty() {
            node.remove(CHILDREN);
        } else {
            node.insert(CHILDREN.into(), Value::from(children.to_vec()));
        }
        Ok(())
    }

    /// Insert or replace an extension block on a node, returning the old one
    pub fn set_node_extension(
        &mut self,
        index: NodeIndex,
        name: &str,
        block: Value,
    ) -> CodecResult<Option<Value>> {
        let node = self.node_mut(index)?;
        let extensions = object_entry(node, EXTENSIONS, || format!("nodes[{}].extensions", index))?;
        Ok(extensions.insert(name.to_string(), block))
    }

    // ------------------------------------------------------------------
    // Document-level extensions
    // ------------------------------------------------------------------

    /// Root extension map, `None` when the document has no `extensions` field
    pub fn document_extensions(&self) -> CodecResult<Option<&JsonObject>> {
        object_field(&self.root, EXTENSIONS, || EXTENSIONS.to_string())
    }

    /// Document-level block for one extension
    pub fn document_extension(&self, name: &str) -> CodecResult<Option<&Value>> {
        Ok(self.document_extensions()?.and_then(|ext| ext.get(name)))
    }

    /// Insert or replace a root extension block, returning the old one
    pub fn set_document_extension(&mut self, name: &str, block: Value) -> CodecResult<Option<Value>> {
        let extensions = object_entry(&mut self.root, EXTENSIONS, || EXTENSIONS.to_string())?;
        Ok(extensions.insert(name.to_string(), block))
    }

    /// Names listed in `extensionsUsed`
    pub fn extensions_used(&self) -> CodecResult<Vec<&str>> {
        string_list(&self.root, EXTENSIONS_USED)
    }

    /// Names listed in `extensionsRequired`
    pub fn extensions_required(&self) -> CodecResult<Vec<&str>> {
        string_list(&self.root, EXTENSIONS_REQUIRED)
    }

    /// Add a name to `extensionsUsed`; returns false if it was already listed
    pub fn mark_extension_used(&mut self, name: &str) -> CodecResult<bool> {
        push_unique(&mut self.root, EXTENSIONS_USED, name)
    }

    /// Add a name to both `extensionsRequired` and `extensionsUsed`
    pub fn mark_extension_required(&mut self, name: &str) -> CodecResult<bool> {
        self.mark_extension_used(name)?;
        push_unique(&mut self.root, EXTENSIONS_REQUIRED, name)
    }

    /// Every extension name attached anywhere in the document, sorted
    pub fn extension_names(&self) -> CodecResult<Vec<String>> {
        let mut names = std::collections::BTreeSet::new();

        if let Some(ext) = self.document_extensions()? {
            names.extend(ext.keys().cloned());
        }
        for index in 0..self.node_count() {
            if let Some(ext) = self.node_extensions(index)? {
                names.extend(ext.keys().cloned());
            }
        }
        for name in self.extensions_used()? {
            names.insert(name.to_string());
        }

        Ok(names.into_iter().collect())
    }

    // ------------------------------------------------------------------
    // Scenes
    // ------------------------------------------------------------------

    /// Root node lists of every scene, `None` when `scenes` is absent
    ///
    /// Accepts both scene objects (`{"nodes": [..]}`) and bare index arrays.
    pub fn scenes(&self) -> CodecResult<Option<Vec<Vec<NodeIndex>>>> {
        let Some(scenes) = self.root.get(SCENES) else {
            return Ok(None);
        };
        let scenes = scenes
            .as_array()
            .ok_or_else(|| CodecError::invalid_field(SCENES))?;

        let mut result = Vec::with_capacity(scenes.len());
        for (i, scene) in scenes.iter().enumerate() {
            let path = || format!("scenes[{}]", i);
            let roots = match scene {
                Value::Array(_) => self.index_list(scene, path)?,
                Value::Object(obj) => match obj.get(NODES) {
                    Some(nodes) => self.index_list(nodes, || format!("scenes[{}].nodes", i))?,
                    None => Vec::new(),
                },
                _ => return Err(CodecError::invalid_field(path())),
            };
            result.push(roots);
        }
        Ok(Some(result))
    }

    /// Default scene index: `scene` if present, otherwise 0 when any scene exists
    pub fn default_scene(&self) -> CodecResult<Option<usize>> {
        let scene_count = self.scenes()?.map(|s| s.len()).unwrap_or(0);

        match self.root.get(SCENE) {
            Some(value) => {
                let index = as_index(value, || SCENE.to_string())?;
                if index >= scene_count {
                    return Err(CodecError::out_of_range(SCENES, index, scene_count));
                }
                Ok(Some(index))
            }
            None if scene_count > 0 => Ok(Some(0)),
            None => Ok(None),
        }
    }

    /// Root nodes of one scene
    pub fn scene_roots(&self, scene: usize) -> CodecResult<Option<Vec<NodeIndex>>> {
        let Some(mut scenes) = self.scenes()? else {
            return Ok(None);
        };
        let len = scenes.len();
        if scene >= len {
            return Err(CodecError::out_of_range(SCENES, scene, len));
        }
        Ok(Some(scenes.swap_remove(scene)))
    }

    /// Append a scene object and return its index
    pub fn add_scene(&mut self, roots: &[NodeIndex]) -> CodecResult<usize> {
        let len = self.node_count();
        if let Some(&bad) = roots.iter().find(|&&r| r >= len) {
            return Err(CodecError::out_of_range(NODES, bad, len));
        }

        let mut scene = Map::new();
        scene.insert(NODES.into(), Value::from(roots.to_vec()));

        let scenes = array_entry(&mut self.root, SCENES)?;
        scenes.push(Value::Object(scene));
        Ok(scenes.len() - 1)
    }

    /// Set the `scene` member
    pub fn set_default_scene(&mut self, scene: usize) {
        self.root.insert(SCENE.into(), Value::from(scene));
    }

    // ------------------------------------------------------------------
    // Resource arrays
    // ------------------------------------------------------------------

    /// Length of a top-level resource array, `None` when absent
    pub fn resource_len(&self, array: &str) -> Option<usize> {
        self.root.get(array).and_then(Value::as_array).map(Vec::len)
    }

    /// Resolve an index into a top-level resource array
    pub fn resource(&self, array: &str, index: usize) -> CodecResult<&Value> {
        let len = self.resource_len(array).unwrap_or(0);
        self.root
            .get(array)
            .and_then(Value::as_array)
            .and_then(|items| items.get(index))
            .ok_or_else(|| CodecError::out_of_range(array, index, len))
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    /// Deterministic node walk; every node appears exactly once
    ///
    /// A node whose `children` list is malformed or out of range is walked as
    /// a leaf; [`Document::child_errors`] lists those nodes.
    pub fn traversal_order(&self, order: TraversalOrder) -> CodecResult<Vec<NodeIndex>> {
        match order {
            TraversalOrder::Declaration => Ok((0..self.node_count()).collect()),
            TraversalOrder::PreOrder => self.pre_order(),
        }
    }

    fn pre_order(&self) -> CodecResult<Vec<NodeIndex>> {
        let count = self.node_count();

        let mut children = Vec::with_capacity(count);
        let mut has_parent = vec![false; count];
        for index in 0..count {
            let list = match self.node_children(index) {
                Ok(list) => list.unwrap_or_default(),
                Err(e) => {
                    log::debug!("Walking node {} as a leaf: {}", index, e);
                    Vec::new()
                }
            };
            for &child in &list {
                has_parent[child] = true;
            }
            children.push(list);
        }

        let scene_roots = match self.default_scene()? {
            Some(scene) => self.scene_roots(scene)?.unwrap_or_default(),
            None => Vec::new(),
        };
        let parentless = (0..count).filter(|&i| !has_parent[i]);

        let mut visited = vec![false; count];
        let mut order = Vec::with_capacity(count);
        let mut stack = Vec::new();

        for start in scene_roots.into_iter().chain(parentless).chain(0..count) {
            if visited[start] {
                continue;
            }
            stack.push(start);
            while let Some(index) = stack.pop() {
                if visited[index] {
                    continue;
                }
                visited[index] = true;
                order.push(index);
                stack.extend(children[index].iter().rev().filter(|&&c| !visited[c]));
            }
        }

        Ok(order)
    }

    /// Nodes whose `children` list cannot be used, with the reason
    pub fn child_errors(&self) -> Vec<(NodeIndex, CodecError)> {
        (0..self.node_count())
            .filter_map(|index| self.node_children(index).err().map(|e| (index, e)))
            .collect()
    }

    fn index_list(&self, value: &Value, path: impl Fn() -> String) -> CodecResult<Vec<NodeIndex>> {
        let items = value
            .as_array()
            .ok_or_else(|| CodecError::invalid_field(path()))?;
        let len = self.node_count();

        items
            .iter()
            .map(|item| {
                let index = as_index(item, &path)?;
                if index >= len {
                    return Err(CodecError::out_of_range(NODES, index, len));
                }
                Ok(index)
            })
            .collect()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn as_index(value: &Value, path: impl Fn() -> String) -> CodecResult<usize> {
    value
        .as_u64()
        .map(|v| v as usize)
        .ok_or_else(|| CodecError::invalid_field(path()))
}

fn object_field<'a>(
    obj: &'a JsonObject,
    key: &str,
    path: impl Fn() -> String,
) -> CodecResult<Option<&'a JsonObject>> {
    match obj.get(key) {
        None => Ok(None),
        Some(Value::Object(inner)) => Ok(Some(inner)),
        Some(_) => Err(CodecError::invalid_field(path())),
    }
}

fn object_entry<'a>(
    obj: &'a mut JsonObject,
    key: &str,
    path: impl Fn() -> String,
) -> CodecResult<&'a mut JsonObject> {
    obj.entry(key)
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| CodecError::invalid_field(path()))
}

fn array_entry<'a>(obj: &'a mut JsonObject, key: &str) -> CodecResult<&'a mut Vec<Value>> {
    obj.entry(key)
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| CodecError::invalid_field(key))
}

fn string_list<'a>(obj: &'a JsonObject, key: &str) -> CodecResult<Vec<&'a str>> {
    let Some(value) = obj.get(key) else {
        return Ok(Vec::new());
    };
    let items = value
        .as_array()
        .ok_or_else(|| CodecError::invalid_field(key))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_str()
                .ok_or_else(|| CodecError::invalid_field(format!("{}[{}]", key, i)))
        })
        .collect()
}

fn push_unique(obj: &mut JsonObject, key: &str, name: &str) -> CodecResult<bool> {
    let list = array_entry(obj, key)?;
    if list.iter().any(|v| v.as_str() == Some(name)) {
        return Ok(false);
    }
    list.push(Value::from(name));
    Ok(true)
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes)
}

fn trim_padding(json: &[u8]) -> &[u8] {
    let end = json
        .iter()
        .rposition(|&b| b != b' ' && b != 0)
        .map(|p| p + 1)
        .unwrap_or(0);
    &json[..end]
}
