//! Node index to scene object mapping

use std::collections::{BTreeMap, HashMap};

use void_gltf::NodeIndex;

use crate::scene::ObjectId;

/// Bidirectional node index / scene object map owned by one context
#[derive(Debug, Clone, Default)]
pub struct NodeMap {
    by_node: BTreeMap<NodeIndex, ObjectId>,
    by_object: HashMap<ObjectId, NodeIndex>,
}

impl NodeMap {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a node to an object, dropping any previous pairing of either side
    pub fn insert(&mut self, node: NodeIndex, object: ObjectId) {
        if let Some(old) = self.by_node.insert(node, object) {
            self.by_object.remove(&old);
        }
        if let Some(old) = self.by_object.insert(object, node) {
            if old != node {
                self.by_node.remove(&old);
            }
        }
    }

    /// Object mapped to `node`
    pub fn object(&self, node: NodeIndex) -> Option<ObjectId> {
        self.by_node.get(&node).copied()
    }

    /// Node mapped to `object`
    pub fn node(&self, object: ObjectId) -> Option<NodeIndex> {
        self.by_object.get(&object).copied()
    }

    /// Pairs in ascending node order
    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, ObjectId)> + '_ {
        self.by_node.iter().map(|(&n, &o)| (n, o))
    }

    /// Get the number of mapped pairs
    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }

    /// Remove every pair
    pub fn clear(&mut self) {
        self.by_node.clear();
        self.by_object.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_directions() {
        let mut map = NodeMap::new();
        map.insert(0, ObjectId::from_raw(10));
        map.insert(1, ObjectId::from_raw(11));

        assert_eq!(map.object(1), Some(ObjectId::from_raw(11)));
        assert_eq!(map.node(ObjectId::from_raw(10)), Some(0));
        assert_eq!(map.object(2), None);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_remap_drops_stale_pairs() {
        let mut map = NodeMap::new();
        map.insert(0, ObjectId::from_raw(10));
        map.insert(0, ObjectId::from_raw(20));
        map.insert(1, ObjectId::from_raw(20));

        assert_eq!(map.object(0), None);
        assert_eq!(map.node(ObjectId::from_raw(10)), None);
        assert_eq!(map.node(ObjectId::from_raw(20)), Some(1));
        assert_eq!(map.len(), 1);
    }
}
