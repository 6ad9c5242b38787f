//! # cdwfhir-storage
//!
//! The boundary between the bundle processor and the clinical data warehouse.
//!
//! The warehouse is reached only through [`ResourceMapper`]s, one per
//! resource type, collected in a [`MapperRegistry`]. How a mapper turns
//! warehouse rows into resources (and translates identifiers) is its own
//! business; this crate only fixes the contract:
//!
//! - `supports(type)`
//! - `read(type, id) -> Resource | NotFound`
//! - `write(type, resource, existing_id?) -> id`
//! - `delete(type, id) -> id`
//!
//! plus, per type, the list of [`ReferencePath`]s whose references must be
//! resolved before a write.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cdwfhir_storage::MapperRegistry;
//!
//! let registry = MapperRegistry::new()
//!     .with_mapper(Arc::new(PatientMapper::new(pool.clone())))
//!     .with_mapper(Arc::new(ObservationMapper::new(pool)));
//!
//! let patient = registry.read("Patient", "42").await?;
//! ```

mod error;
mod reference_path;
mod registry;
mod traits;

pub use error::{ErrorCategory, StorageError};
pub use reference_path::ReferencePath;
pub use registry::{DynMapper, MapperRegistry};
pub use traits::ResourceMapper;

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;
