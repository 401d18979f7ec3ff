//! In-memory compile-and-load engine.
//!
//! This crate provides:
//! - A driver that feeds source units to a compiler toolchain
//! - A virtual file manager that keeps every toolchain output in memory
//! - A namespace that materializes compiled artifacts on demand
//! - Package enumeration over the host's existing artifacts
//!
//! ```no_run
//! use std::sync::Arc;
//! use kiln_core::{CompilerConfig, DynamicCompiler, EmptyNamespace};
//!
//! let mut compiler = DynamicCompiler::with_rustc(Arc::new(EmptyNamespace), CompilerConfig::default())?;
//! compiler.add_source("app.greeting", "pub fn greet() -> u32 { 42 }")?;
//! let artifacts = compiler.build()?;
//! assert!(artifacts.contains_key("app.greeting"));
//! # Ok::<(), kiln_core::Error>(())
//! ```

pub mod compile;
pub mod error;
pub mod load;

pub use compile::{
    CompilationFailure, CompilerConfig, Diagnostic, DiagnosticKind, DiagnosticSink,
    DynamicCompiler, FileHandle, FileKind, FileManager, Location, OutputSink, RustcToolchain,
    SourceUnit, Toolchain, VirtualFileManager,
};
pub use error::{Error, Result};
pub use load::{
    ArtifactLoader, ClasspathEntry, ClasspathHost, EmptyNamespace, HostNamespace, ImageMaterializer,
    LoadedArtifact, MemoryArtifact, Materializer, PackageFinder,
};
