//! In-memory warehouse backend for the CDW FHIR bundle processor.
//!
//! This crate provides [`InMemoryStore`], a store shared by every resource
//! type, and [`InMemoryMapper`], the `ResourceMapper` that serves one type out
//! of it. Every call is journaled so callers can inspect the exact order in
//! which the processor touched the store.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cdwfhir_db_memory::InMemoryStore;
//! use cdwfhir_storage::{MapperRegistry, ReferencePath};
//!
//! let store = InMemoryStore::new_shared();
//! let registry = MapperRegistry::new()
//!     .with_mapper(Arc::new(store.mapper("Patient", vec![])))
//!     .with_mapper(Arc::new(store.mapper(
//!         "Observation",
//!         vec![ReferencePath::parse("subject")?],
//!     )));
//! ```

mod mapper;
pub mod storage;

pub use cdwfhir_storage::{MapperRegistry, ResourceMapper, StorageError};
pub use mapper::InMemoryMapper;
pub use storage::{InMemoryStore, JournalEntry, StorageKey, StoreOp};
