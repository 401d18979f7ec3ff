//! The compilation driver.
//!
//! [`DynamicCompiler`] collects source units, runs one build through the
//! toolchain with a fresh [`VirtualFileManager`] and diagnostic sink, and
//! hands back the materialized artifacts or a [`CompilationFailure`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::load::{ArtifactLoader, HostNamespace, LoadedArtifact, Materializer, PackageFinder};

use super::diagnostics::{Classified, Diagnostic, DiagnosticSink, ErrorEntry};
use super::file_manager::{DirectoryFileManager, FileManager, StandardFileManager, VirtualFileManager};
use super::source::SourceUnit;
use super::toolchain::{RustcToolchain, Toolchain};
use super::types::CompilerConfig;

/// Compiles in-memory sources and loads the results into its own namespace.
///
/// Not meant to be shared between threads while building: each call to
/// [`DynamicCompiler::build`] runs to completion on its own request. The
/// namespace persists across builds, so later builds can use earlier output.
pub struct DynamicCompiler {
    /// Toolchain driven for every build
    toolchain: Arc<dyn Toolchain>,

    /// Toolchain options
    config: CompilerConfig,

    /// Standard resolution the virtual file manager falls back to
    standard: Arc<dyn StandardFileManager>,

    /// Namespace owning every artifact this compiler produced
    loader: Arc<ArtifactLoader>,

    /// Lists host artifacts by package
    finder: PackageFinder,

    /// Units queued for the next build
    units: Vec<Arc<SourceUnit>>,
}

impl DynamicCompiler {
    /// Create a compiler whose namespace delegates to `parent`.
    pub fn new(
        toolchain: Arc<dyn Toolchain>,
        parent: Arc<dyn HostNamespace>,
        config: CompilerConfig,
    ) -> Self {
        Self {
            toolchain,
            config,
            standard: Arc::new(DirectoryFileManager::new()),
            loader: Arc::new(ArtifactLoader::new(Arc::clone(&parent))),
            finder: PackageFinder::new(parent),
            units: Vec::new(),
        }
    }

    /// Create a compiler driving the rustc found in PATH.
    ///
    /// Fails immediately if no usable rustc exists.
    pub fn with_rustc(parent: Arc<dyn HostNamespace>, config: CompilerConfig) -> Result<Self> {
        let toolchain = RustcToolchain::new()?;
        Ok(Self::new(Arc::new(toolchain), parent, config))
    }

    /// Materialize artifacts with `materializer`.
    ///
    /// Replaces the namespace, so call this before the first build.
    pub fn with_materializer(mut self, materializer: Arc<dyn Materializer>) -> Self {
        let parent = Arc::clone(self.loader.parent());
        self.loader = Arc::new(ArtifactLoader::with_materializer(parent, materializer));
        self
    }

    /// Fall back to `standard` for locations kiln does not manage.
    pub fn with_standard_file_manager(mut self, standard: Arc<dyn StandardFileManager>) -> Self {
        self.standard = standard;
        self
    }

    /// Artifact extension used when listing host packages.
    pub fn with_artifact_extension(mut self, extension: impl Into<String>) -> Self {
        self.finder = self.finder.with_extension(extension);
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// The namespace holding this compiler's artifacts.
    pub fn loader(&self) -> &Arc<ArtifactLoader> {
        &self.loader
    }

    /// Units queued for the next build.
    pub fn pending_units(&self) -> &[Arc<SourceUnit>] {
        &self.units
    }

    /// Queue source text under a fully-qualified name.
    pub fn add_source(&mut self, name: impl Into<String>, source: impl Into<String>) -> Result<()> {
        self.add_unit(Arc::new(SourceUnit::new(name, source)))
    }

    /// Queue a unit for the next build.
    pub fn add_unit(&mut self, unit: Arc<SourceUnit>) -> Result<()> {
        if unit.name().trim().is_empty() {
            return Err(Error::InvalidSource("source name must not be empty".to_string()));
        }
        if unit.is_pending() {
            return Err(Error::InvalidSource(format!("{} has no content", unit.name())));
        }
        if self.units.iter().any(|queued| queued.name() == unit.name()) {
            return Err(Error::InvalidSource(format!(
                "{} is already queued for this build",
                unit.name()
            )));
        }

        self.units.push(unit);
        Ok(())
    }

    /// Run one build over the queued units.
    ///
    /// The queue is emptied whatever the outcome. On success returns every
    /// artifact the namespace owns, materialized, by name. Any
    /// error-severity diagnostic fails the build, as does any failure of
    /// the toolchain itself, panics included; both surface as
    /// [`Error::Compilation`].
    ///
    /// Artifacts registered by a failed build stay in the namespace and are
    /// returned by the next successful one.
    pub fn build(&mut self) -> Result<HashMap<String, Arc<LoadedArtifact>>> {
        let request = std::mem::take(&mut self.units);
        let files = VirtualFileManager::new(
            Arc::clone(&self.standard),
            Arc::clone(&self.loader),
            self.finder.clone(),
        );
        let diagnostics = DiagnosticSink::new();
        let options = self.config.effective_options();

        tracing::debug!(
            "Building {} units with {}",
            request.len(),
            self.toolchain.name()
        );

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.toolchain
                .compile(&request, &options, &files, &diagnostics)
        }))
        .unwrap_or_else(|payload| {
            Err(Error::Toolchain(format!(
                "{} panicked: {}",
                self.toolchain.name(),
                panic_message(payload.as_ref())
            )))
        });
        files.finish();

        let generated = files.generated_sources().len();
        if generated > 0 {
            tracing::debug!("Toolchain generated {} additional sources", generated);
        }
        // Anything still queued was never picked up by the toolchain.
        let abandoned = files.take_generated_sources();
        if !abandoned.is_empty() {
            tracing::warn!("{} generated sources were never compiled", abandoned.len());
        }

        let classified = diagnostics.classify();
        classified.log_warnings();

        match outcome {
            Err(cause) => {
                tracing::warn!("Toolchain {} failed: {}", self.toolchain.name(), cause);
                return Err(CompilationFailure::toolchain(cause, classified).into());
            }
            Ok(_) if classified.has_errors() => {
                tracing::warn!("Build failed with {} errors", classified.errors.len());
                return Err(CompilationFailure::diagnosed(classified).into());
            }
            Ok(false) => {
                tracing::warn!(
                    "Toolchain {} reported failure without errors",
                    self.toolchain.name()
                );
            }
            Ok(true) => {}
        }

        match self.loader.all_materialized() {
            Ok(loaded) => {
                tracing::debug!("Build produced {} artifacts", loaded.len());
                Ok(loaded)
            }
            Err(cause) => Err(CompilationFailure::toolchain(cause, classified).into()),
        }
    }
}

/// Text of a panic payload, when it carries one.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Why a build failed, with every diagnostic collected up to that point.
#[derive(Debug)]
pub struct CompilationFailure {
    message: String,
    warnings: Vec<Diagnostic>,
    errors: Vec<Diagnostic>,
    cause: Option<Box<Error>>,
}

impl CompilationFailure {
    /// The toolchain reported error-severity diagnostics.
    pub fn diagnosed(classified: Classified) -> Self {
        Self {
            message: "Compilation Error".to_string(),
            warnings: classified.warnings,
            errors: classified.errors,
            cause: None,
        }
    }

    /// The build broke down; `cause` says how.
    pub fn toolchain(cause: Error, classified: Classified) -> Self {
        Self {
            message: cause.to_string(),
            warnings: classified.warnings,
            errors: classified.errors,
            cause: Some(Box::new(cause)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    /// Every diagnostic, errors first.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.errors.iter().chain(self.warnings.iter())
    }

    /// The underlying failure when the toolchain itself broke down.
    pub fn cause(&self) -> Option<&Error> {
        self.cause.as_deref()
    }

    /// `{line, message}` rows for every diagnostic, errors first.
    pub fn error_list(&self) -> Vec<ErrorEntry> {
        self.diagnostics().map(Diagnostic::entry).collect()
    }

    /// Format the failure for JSON output.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "message": self.message,
            "errors": self.errors.iter().map(Diagnostic::entry).collect::<Vec<_>>(),
            "warnings": self.warnings.iter().map(Diagnostic::entry).collect::<Vec<_>>(),
        })
    }
}

impl fmt::Display for CompilationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.message)?;
        for entry in self.error_list() {
            if let Some(line) = entry.line {
                write!(f, "line: {line} , ")?;
            }
            writeln!(f, "message: {} , ", entry.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompilationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}
