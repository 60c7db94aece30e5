//! # Cell Set Forest
//!
//! [`CellSetNode`] is the wire shape of an experiment's cell sets. [`CellSetTree`]
//! indexes a forest once: every key maps to its aggregated cell ids and its root
//! hierarchy, so resolution never walks the tree twice.

use crate::error::{Result, WorkerError};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Ordered set of cell identifiers
pub type CellIds = BTreeSet<u32>;

/// A keyed cell set, possibly with nested children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellSetNode {
    pub key: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cell_ids: CellIds,
    #[serde(default)]
    pub root_node: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub children: Vec<CellSetNode>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl CellSetNode {
    pub fn leaf(key: impl Into<String>, cell_ids: impl IntoIterator<Item = u32>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            cell_ids: cell_ids.into_iter().collect(),
            root_node: false,
            children: Vec::new(),
        }
    }

    pub fn root(key: impl Into<String>, children: Vec<CellSetNode>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            cell_ids: CellIds::new(),
            root_node: true,
            children,
        }
    }

    /// Mark this node as a root
    pub fn as_root(mut self) -> Self {
        self.root_node = true;
        self
    }
}

/// The root hierarchy a cell set belongs to.
///
/// Nodes nested under a root share that root's hierarchy; a root with children is its
/// own hierarchy. Childless roots are flat top-level sets and share one hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hierarchy {
    Root(usize),
    TopLevel,
}

#[derive(Debug)]
struct IndexedSet {
    hierarchy: Hierarchy,
    cells: CellIds,
}

/// Indexed, aggregated view of one experiment's cell set forest
#[derive(Debug)]
pub struct CellSetTree {
    sets: HashMap<String, IndexedSet>,
    hierarchies: HashMap<Hierarchy, CellIds>,
    all_cells: CellIds,
}

impl CellSetTree {
    /// Index a forest, aggregating every subtree's cell ids exactly once
    pub fn build(forest: &[CellSetNode]) -> Result<Self> {
        let mut tree = Self {
            sets: HashMap::new(),
            hierarchies: HashMap::new(),
            all_cells: CellIds::new(),
        };

        for (index, root) in forest.iter().enumerate() {
            let hierarchy = if root.children.is_empty() {
                Hierarchy::TopLevel
            } else {
                Hierarchy::Root(index)
            };
            let cells = tree.index_subtree(root, hierarchy)?;
            tree.all_cells.extend(cells.iter().copied());
            tree.hierarchies.entry(hierarchy).or_default().extend(cells);
        }

        Ok(tree)
    }

    fn index_subtree(&mut self, node: &CellSetNode, hierarchy: Hierarchy) -> Result<CellIds> {
        let mut cells = node.cell_ids.clone();
        for child in &node.children {
            cells.extend(self.index_subtree(child, hierarchy)?);
        }

        if self.sets.contains_key(&node.key) {
            return Err(WorkerError::parameter(format!(
                "duplicate cell set key '{}'",
                node.key
            )));
        }
        self.sets.insert(
            node.key.clone(),
            IndexedSet {
                hierarchy,
                cells: cells.clone(),
            },
        );

        Ok(cells)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sets.contains_key(key)
    }

    /// Aggregated cell ids of the subtree rooted at `key`
    pub fn cells(&self, key: &str) -> Option<&CellIds> {
        self.sets.get(key).map(|set| &set.cells)
    }

    pub fn hierarchy_of(&self, key: &str) -> Option<Hierarchy> {
        self.sets.get(key).map(|set| set.hierarchy)
    }

    /// Every cell in a root hierarchy
    pub fn hierarchy_cells(&self, hierarchy: Hierarchy) -> Option<&CellIds> {
        self.hierarchies.get(&hierarchy)
    }

    pub fn all_cells(&self) -> &CellIds {
        &self.all_cells
    }

    /// Number of keyed sets in the forest
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn louvain_and_samples() -> Vec<CellSetNode> {
        vec![
            CellSetNode::root(
                "louvain",
                vec![
                    CellSetNode::leaf("louvain-0", [0, 1]),
                    CellSetNode::leaf("louvain-1", [2, 3]),
                ],
            ),
            CellSetNode::root(
                "sample",
                vec![
                    CellSetNode::leaf("sample-a", [0, 2]),
                    CellSetNode::leaf("sample-b", [1, 3, 4]),
                ],
            ),
        ]
    }

    #[test]
    fn test_parent_cells_are_aggregated_from_children() {
        let tree = CellSetTree::build(&louvain_and_samples()).unwrap();

        let louvain: Vec<u32> = tree.cells("louvain").unwrap().iter().copied().collect();
        assert_eq!(louvain, vec![0, 1, 2, 3]);
        assert_eq!(tree.all_cells().len(), 5);
        assert_eq!(tree.len(), 6);
    }

    #[test]
    fn test_children_share_their_root_hierarchy() {
        let tree = CellSetTree::build(&louvain_and_samples()).unwrap();

        assert_eq!(tree.hierarchy_of("louvain-0"), tree.hierarchy_of("louvain-1"));
        assert_ne!(tree.hierarchy_of("louvain-0"), tree.hierarchy_of("sample-a"));
        assert_eq!(tree.hierarchy_of("missing"), None);
    }

    #[test]
    fn test_childless_roots_share_the_top_level_hierarchy() {
        let forest = vec![
            CellSetNode::leaf("cluster1", [4, 5]).as_root(),
            CellSetNode::leaf("cluster2", [0, 1, 2, 3]).as_root(),
        ];
        let tree = CellSetTree::build(&forest).unwrap();

        assert_eq!(tree.hierarchy_of("cluster1"), Some(Hierarchy::TopLevel));
        assert_eq!(tree.hierarchy_of("cluster2"), Some(Hierarchy::TopLevel));
        assert_eq!(tree.hierarchy_cells(Hierarchy::TopLevel).unwrap().len(), 6);
    }

    #[test]
    fn test_duplicate_keys_are_rejected() {
        let forest = vec![
            CellSetNode::leaf("cluster1", [1]).as_root(),
            CellSetNode::root("louvain", vec![CellSetNode::leaf("cluster1", [2])]),
        ];
        assert!(matches!(
            CellSetTree::build(&forest),
            Err(WorkerError::Parameter(_))
        ));
    }

    #[test]
    fn test_wire_format_tolerates_nulls_and_extra_fields() {
        let raw = serde_json::json!([{
            "key": "louvain",
            "name": "Louvain clusters",
            "rootNode": true,
            "type": "cellSets",
            "cellIds": null,
            "children": [{"key": "louvain-0", "name": "Cluster 0", "color": "#77aadd", "cellIds": [3, 1]}]
        }]);
        let forest: Vec<CellSetNode> = serde_json::from_value(raw).unwrap();

        assert!(forest[0].root_node);
        assert!(forest[0].cell_ids.is_empty());
        assert_eq!(forest[0].children[0].cell_ids.len(), 2);
    }
}
