//! Strata Graph: the single mutation point for the graph store.
//!
//! All schema and object reads and writes flow through the [`GraphStore`]
//! trait. [`GraphClient`] implements it against Neo4j, translating every
//! operation into parameterised Cypher run inside a managed, retried
//! transaction; [`MemoryStore`] implements the same contract in process.

pub mod client;
pub mod cypher;
pub mod memory;
pub mod mutations;
pub mod queries;
pub mod retry;
pub mod store;

pub use client::{AccessMode, GraphClient, GraphConfig, GraphError};
pub use memory::MemoryStore;
pub use retry::{ErrorClass, RetryPolicy};
pub use store::{conforms, GraphStore, PropertyChange, SharedStore};
