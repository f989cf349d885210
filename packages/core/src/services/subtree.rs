//! Subtree Assembly
//!
//! Rebuilds a nested [`EntityTree`] from the flat, path-ordered row set of
//! one prefix-range scan. Attribute rows are merged into their entity as
//! they stream past; linking runs over the rows in reverse so every node's
//! children are attached before the node itself moves into its parent -
//! O(rows) time, O(distinct entities) auxiliary space, no recursion, no
//! per-node sibling searches.

use crate::models::{read_value, EntityTree, SubtreeRow};
use crate::paths::parent_path_of;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

/// Assemble a nested tree from a path-ordered subtree scan.
///
/// Returns `None` when no row matches `root_path` exactly: an absent root is
/// "not found", never an empty tree. Rows whose computed parent path is
/// missing from the row set are dropped rather than crashing assembly.
pub fn assemble(rows: &[SubtreeRow], root_path: &str) -> Option<EntityTree> {
    // Pass 1: one shell per distinct path, attributes merged as rows repeat.
    let mut nodes: Vec<Option<EntityTree>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let slot = match index.entry(row.path.clone()) {
            Entry::Occupied(e) => *e.get(),
            Entry::Vacant(e) => {
                nodes.push(Some(EntityTree {
                    id: row.entity_id,
                    name: row.name.clone(),
                    path: row.path.clone(),
                    properties: BTreeMap::new(),
                    descendants: Vec::new(),
                }));
                *e.insert(nodes.len() - 1)
            }
        };

        if let Some(key) = &row.attribute_key {
            match read_value(
                row.attribute_value.as_deref(),
                row.attribute_precision.as_deref(),
            ) {
                Some(value) => {
                    if let Some(node) = nodes[slot].as_mut() {
                        node.properties.insert(key.clone(), value);
                    }
                }
                None => {
                    tracing::warn!(
                        entity_id = row.entity_id,
                        key = %key,
                        "skipping attribute with unreadable value"
                    );
                }
            }
        }
    }

    // Pass 2: link bottom-up. Rows are path-ascending, so every parent shell
    // sits at a lower index than its children; walking the indexes in
    // reverse means a node is complete before it moves under its parent.
    let mut root: Option<EntityTree> = None;
    for i in (0..nodes.len()).rev() {
        let Some(node) = nodes[i].take() else { continue };

        if node.path == root_path {
            root = Some(node);
            continue;
        }

        let parent_slot = parent_path_of(&node.path).and_then(|p| index.get(p).copied());
        match parent_slot.and_then(|p| nodes[p].as_mut()) {
            Some(parent) => parent.descendants.push(node),
            None => {
                // Dangling reference (orphaned row inside the scan range);
                // drop it rather than fail the whole read.
                tracing::warn!(entity_id = node.id, path = %node.path, "dropping dangling subtree row");
            }
        }
    }

    // Children were pushed in reverse path order; restore ascending order.
    if let Some(tree) = root.as_mut() {
        reverse_descendants(tree);
    }
    root
}

fn reverse_descendants(root: &mut EntityTree) {
    let mut stack: Vec<&mut EntityTree> = vec![root];
    while let Some(node) = stack.pop() {
        node.descendants.reverse();
        stack.extend(node.descendants.iter_mut());
    }
}
