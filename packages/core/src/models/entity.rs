//! Entity Model
//!
//! An entity is one node in the tree: a name, an optional parent, and the
//! materialized path derived from the two. `tree_id` groups every node of one
//! root-rooted component and always equals the root ancestor's own id.

use crate::paths::SEPARATOR;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Validation errors raised before any persistence is attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Entity name is empty or whitespace-only
    #[error("Entity name must not be empty")]
    EmptyName,

    /// Entity name contains the path separator
    #[error("Entity name must not contain '{SEPARATOR}': {name}")]
    NameContainsSeparator { name: String },
}

/// Validate an entity name: non-empty and free of the path separator.
///
/// Names become path segments, so a separator inside a name would corrupt
/// every prefix-range scan over the subtree.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.contains(SEPARATOR) {
        return Err(ValidationError::NameContainsSeparator {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// A persisted entity row.
///
/// `parent_id` is a weak back-reference: deleting a parent nulls it and the
/// child becomes an orphaned root whose stored `path` and `tree_id` are left
/// stale until its next save recomputes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Database rowid
    pub id: i64,

    /// Display name; also the last segment of `path`
    pub name: String,

    /// Materialized root-to-node path, e.g. `/Rocket/Stage1`
    pub path: String,

    /// Owning parent, if any
    pub parent_id: Option<i64>,

    /// Id of the root ancestor of this entity's connected component
    pub tree_id: i64,

    /// Creation timestamp (database-generated)
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp (database-generated)
    pub modified_at: DateTime<Utc>,
}

impl Entity {
    /// Whether this entity is a root (has no parent).
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// One flat row of a subtree scan: an entity joined with at most one of its
/// attributes. Entities with several attributes appear once per attribute;
/// entities with none appear once with the attribute columns null.
#[derive(Debug, Clone)]
pub struct SubtreeRow {
    pub entity_id: i64,
    pub name: String,
    pub path: String,
    pub parent_id: Option<i64>,
    pub attribute_key: Option<String>,
    pub attribute_value: Option<String>,
    pub attribute_precision: Option<String>,
}

/// A fully assembled subtree: one entity with its quantized attribute values
/// and its descendants nested beneath it.
///
/// Produced by [`crate::services::subtree::assemble`]; plain data for the
/// presentation layer to serialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTree {
    pub id: i64,
    pub name: String,
    pub path: String,
    /// Attribute key/value pairs, quantized at each value's stored precision
    pub properties: BTreeMap<String, BigDecimal>,
    /// Child subtrees, ordered by path
    pub descendants: Vec<EntityTree>,
}

impl EntityTree {
    /// Total number of entities in this subtree, the root included.
    pub fn len(&self) -> usize {
        1 + self.descendants.iter().map(EntityTree::len).sum::<usize>()
    }

    /// Always `false`: a subtree contains at least its own root. Exists only
    /// to pair with [`len`](Self::len).
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Find a nested node by exact path.
    pub fn find(&self, path: &str) -> Option<&EntityTree> {
        if self.path == path {
            return Some(self);
        }
        self.descendants.iter().find_map(|d| d.find(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_name_rejects_empty_and_separator() {
        assert_eq!(validate_name(""), Err(ValidationError::EmptyName));
        assert_eq!(validate_name("   "), Err(ValidationError::EmptyName));
        assert!(matches!(
            validate_name("a/b"),
            Err(ValidationError::NameContainsSeparator { .. })
        ));
        assert_eq!(validate_name("Stage1"), Ok(()));
        assert_eq!(validate_name("100% thrust"), Ok(()));
    }

    #[test]
    fn tree_len_counts_all_nodes() {
        let leaf = EntityTree {
            id: 2,
            name: "Stage1".into(),
            path: "/Rocket/Stage1".into(),
            properties: BTreeMap::new(),
            descendants: vec![],
        };
        let root = EntityTree {
            id: 1,
            name: "Rocket".into(),
            path: "/Rocket".into(),
            properties: BTreeMap::new(),
            descendants: vec![leaf],
        };
        assert_eq!(root.len(), 2);
        assert!(!root.is_empty());
        assert!(root.find("/Rocket/Stage1").is_some());
        assert!(root.find("/Rocket/Stage2").is_none());
    }

    #[test]
    fn tree_round_trips_through_json() {
        use bigdecimal::BigDecimal;
        use std::str::FromStr;

        let engine = EntityTree {
            id: 3,
            name: "Engine1".into(),
            path: "/Rocket/Stage1/Engine1".into(),
            properties: BTreeMap::from([(
                "Thrust".to_string(),
                BigDecimal::from_str("9.493").unwrap(),
            )]),
            descendants: vec![],
        };
        let tree = EntityTree {
            id: 1,
            name: "Rocket".into(),
            path: "/Rocket".into(),
            properties: BTreeMap::new(),
            descendants: vec![EntityTree {
                id: 2,
                name: "Stage1".into(),
                path: "/Rocket/Stage1".into(),
                properties: BTreeMap::new(),
                descendants: vec![engine],
            }],
        };

        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["name"], "Rocket");
        assert_eq!(json["descendants"][0]["descendants"][0]["path"], "/Rocket/Stage1/Engine1");

        let back: EntityTree = serde_json::from_value(json).unwrap();
        assert_eq!(back, tree);
    }
}
