//! EntityTree Core Business Logic Layer
//!
//! This crate provides the materialized-path tree engine behind EntityTree:
//! a hierarchy of named entities, each optionally carrying numeric key/value
//! attributes, with whole-subtree reconstruction in a single scan.
//!
//! # Architecture
//!
//! - **Materialized paths**: every entity stores its full root-to-node path
//!   (`/Rocket/Stage1/Engine1`), so subtree reads are indexed prefix-range
//!   scans instead of recursive joins
//! - **Atomic cascades**: renames and reparents rewrite every descendant path
//!   in a single multi-row UPDATE inside the same transaction as the mutation
//! - **libsql/Turso**: embedded SQLite-compatible database, WAL mode
//!
//! # Modules
//!
//! - [`models`] - Data structures (Entity, Attribute, EntityTree)
//! - [`paths`] - Pure path derivation and parsing
//! - [`services`] - Business services (EntityService, subtree assembly)
//! - [`db`] - Database layer with libsql integration

pub mod db;
pub mod models;
pub mod paths;
pub mod services;

// Re-export commonly used types
pub use db::*;
pub use models::*;
pub use services::*;
