//! Business Services
//!
//! This module contains the core business logic services:
//!
//! - `EntityService` - tree mutations, attribute writes, subtree reads
//! - `TreeConsistencyController` - per-entity mutation state machine
//! - `subtree` - nested-tree assembly from flat scan rows
//!
//! Services coordinate between the database layer and application logic,
//! implementing business rules and orchestrating complex operations.

pub mod entity_service;
pub mod error;
pub mod mutation_guard;
pub mod subtree;

pub use entity_service::EntityService;
pub use error::EntityServiceError;
pub use mutation_guard::{MutationPhase, MutationScope, TreeConsistencyController};

#[cfg(test)]
mod entity_service_tree_test;
