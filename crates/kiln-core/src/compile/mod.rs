//! Compilation pipeline for kiln.
//!
//! This module provides:
//! - Source units held in memory
//! - The toolchain contract and a rustc-backed toolchain
//! - The virtual file manager the toolchain performs all I/O through
//! - Diagnostic collection and classification
//! - The driver tying one build together
//!
//! # Architecture
//!
//! ```text
//! add_source ──► DynamicCompiler ──► Toolchain::compile
//!                      ▲                   │
//!                      │                   ├── output_for ──► VirtualFileManager ──► ArtifactLoader
//!                      │                   │                        │
//!                      │                   │                        └── generated sources ──┐
//!                      │                   ├── list ──► standard files ∪ PackageFinder     │
//!                      │                   │                                                │
//!                      │                   └── diagnostics ──► DiagnosticSink               │
//!                      │                                                                    │
//!                      └── name → LoadedArtifact  ◄── same build ◄──────────────────────────┘
//! ```

mod diagnostics;
mod driver;
mod file_manager;
mod source;
mod toolchain;
mod types;

pub use diagnostics::{
    Classified, Diagnostic, DiagnosticKind, DiagnosticSink, ErrorEntry, RustcDiagnostic,
    parse_rustc_output,
};
pub use driver::{CompilationFailure, DynamicCompiler};
pub use file_manager::{
    DirectoryFileManager, FileHandle, FileManager, OutputSink, StandardFile, StandardFileManager,
    VirtualFileManager,
};
pub use source::SourceUnit;
pub use toolchain::{RustcToolchain, Toolchain};
pub use types::{CompilerConfig, FileKind, Location, VERBOSE_FLAG};
