//! Hosting compiled artifacts.
//!
//! This module provides:
//! - In-memory artifact buffers filled by the toolchain
//! - The artifact namespace, with lazy, cached materialization
//! - The host namespace contract and a directory/archive backed host
//! - Package enumeration over the host namespace
//!
//! # Architecture
//!
//! ```text
//! Toolchain output ──► MemoryArtifact ──► ArtifactLoader (name → artifact)
//!                                               │
//!                                               ├── resolve(name) ──► Materializer ──► LoadedArtifact
//!                                               │
//!                                               └── unknown names ──► HostNamespace (parent)
//!                                                                          │
//! PackageFinder ◄── resources(package) ────────────────────────────────────┘
//! ```

mod artifact;
mod finder;
mod host;
mod materialize;
mod namespace;

/// Extension of artifact files found through the host namespace.
pub const ARTIFACT_EXTENSION: &str = ".class";

pub use artifact::MemoryArtifact;
pub use finder::{ArtifactLocation, PackageFinder, ResolvedArtifact};
pub use host::{ClasspathEntry, ClasspathHost, EmptyNamespace, HostNamespace, ResourceRoot};
#[cfg(target_os = "linux")]
pub use materialize::DylibMaterializer;
pub use materialize::{ImageMaterializer, LoadedArtifact, Materializer};
pub use namespace::ArtifactLoader;
