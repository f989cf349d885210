//! Data Models
//!
//! This module contains the core data structures used throughout EntityTree:
//!
//! - `Entity` - one node of the tree, with its materialized path
//! - `Attribute` - a numeric property owned by one entity, with its
//!   precision template for exact read-time quantization
//! - `EntityTree` - an assembled nested subtree for the presentation layer

mod attribute;
mod entity;

pub use attribute::{read_value, template_scale, write_value, Attribute};
pub use entity::{validate_name, Entity, EntityTree, SubtreeRow, ValidationError};
