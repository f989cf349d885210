//! Database Layer
//!
//! This module handles all database interactions using libsql/Turso:
//!
//! - Connection management and schema initialization (`DatabaseService`)
//! - `EntityStore` - the transactional repository trait the service layer
//!   programs against
//! - `TursoStore` - the libsql implementation, including the atomic
//!   path/tree-id cascades
//!
//! # Architecture
//!
//! Every structural mutation runs inside a single `BEGIN IMMEDIATE`
//! transaction: validation reads, the uniqueness probe, the row write and
//! both cascades commit or roll back together, so a concurrent reader can
//! never observe a subtree with a mixed old/new path prefix.

mod database;
mod entity_store;
mod error;
mod turso_store;

pub use database::DatabaseService;
pub use entity_store::{EntityStore, ParentUpdate};
pub use error::{DatabaseError, StoreError};
pub use turso_store::TursoStore;
