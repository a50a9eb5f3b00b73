//! Resource descriptor types
//!
//! Describes one artifact request as seen by the worker-side cache: which
//! artifact, which tenant owns it, and which immutable version (the update
//! timestamp) is wanted. The cache never inspects artifact contents; these
//! values only drive path construction and remote resolution.

pub mod descriptor;
pub mod version;

pub use descriptor::{parent_relative_path, ArtifactDescriptor, ReferredType, ResourceRecord, ResourceType};
pub use version::{VersionFormat, VersionFormatError, DEFAULT_VERSION_FORMAT};
