//! Error types for kiln-core.

use thiserror::Error;

use crate::compile::CompilationFailure;

/// Result type for kiln-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in kiln-core.
#[derive(Debug, Error)]
pub enum Error {
    /// The compiler toolchain is not available in this environment.
    #[error("toolchain unavailable: {0}")]
    ToolchainUnavailable(String),

    /// A build failed, either through diagnosed errors or a toolchain crash.
    #[error(transparent)]
    Compilation(Box<CompilationFailure>),

    /// Package enumeration hit an archive or directory it could not read.
    #[error("failed to resolve package contents from {location}: {source}")]
    Resolution {
        location: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Neither the namespace nor its parent knows the artifact.
    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    /// A source unit was rejected before compilation.
    #[error("invalid source: {0}")]
    InvalidSource(String),

    /// A pending source unit was written a second time.
    #[error("source {0} already has content")]
    SourceAlreadyWritten(String),

    /// An artifact was written after its compilation completed.
    #[error("artifact {0} is finalized and can no longer be written")]
    ArtifactFinalized(String),

    /// Buffered bytes could not be turned into a live artifact.
    #[error("failed to materialize {name}: {message}")]
    Materialization { name: String, message: String },

    /// Failed to load dynamic library.
    #[error("failed to load library: {0}")]
    LibraryLoad(#[from] libloading::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Toolchain error.
    #[error("toolchain error: {0}")]
    Toolchain(String),
}

impl From<CompilationFailure> for Error {
    fn from(failure: CompilationFailure) -> Self {
        Self::Compilation(Box::new(failure))
    }
}

impl Error {
    /// The structured compilation failure, if this is one.
    pub fn as_compilation(&self) -> Option<&CompilationFailure> {
        match self {
            Self::Compilation(failure) => Some(failure),
            _ => None,
        }
    }

    pub(crate) fn resolution(
        location: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Resolution {
            location: location.into(),
            source: source.into(),
        }
    }
}
