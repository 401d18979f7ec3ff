//! Turning artifact bytes into live entities.

use std::fmt;
use std::sync::Arc;

use libloading::{Library, Symbol};

use crate::compile::FileKind;
use crate::error::{Error, Result};

/// A materialized artifact.
///
/// Always carries the immutable image it was built from; artifacts
/// materialized as shared objects also carry the open library, through
/// which entry points are looked up.
pub struct LoadedArtifact {
    name: String,
    kind: FileKind,
    image: Arc<[u8]>,
    library: Option<Library>,
}

impl LoadedArtifact {
    /// Wrap an image without loading it as code.
    pub fn from_image(name: impl Into<String>, kind: FileKind, image: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            kind,
            image: image.into(),
            library: None,
        }
    }

    /// Attach an opened library.
    pub fn with_library(mut self, library: Library) -> Self {
        self.library = Some(library);
        self
    }

    /// Fully-qualified name the artifact was materialized under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// Bytes the artifact was materialized from.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn is_library(&self) -> bool {
        self.library.is_some()
    }

    /// Look up an exported symbol.
    ///
    /// # Safety
    /// `T` must match the actual type of the exported symbol.
    pub unsafe fn symbol<T>(&self, symbol: &str) -> Result<Symbol<'_, T>> {
        let library = self.library.as_ref().ok_or_else(|| Error::Materialization {
            name: self.name.clone(),
            message: "artifact was not materialized as a library".to_string(),
        })?;
        Ok(unsafe { library.get(symbol.as_bytes())? })
    }
}

impl fmt::Debug for LoadedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedArtifact")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("image_len", &self.image.len())
            .field("library", &self.library.is_some())
            .finish()
    }
}

/// Defines live entities from artifact bytes.
pub trait Materializer: Send + Sync {
    fn materialize(&self, name: &str, kind: FileKind, bytes: &[u8]) -> Result<LoadedArtifact>;
}

/// Freezes the bytes into an immutable shared image.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageMaterializer;

impl Materializer for ImageMaterializer {
    fn materialize(&self, name: &str, kind: FileKind, bytes: &[u8]) -> Result<LoadedArtifact> {
        Ok(LoadedArtifact::from_image(name, kind, bytes))
    }
}

/// Loads artifact bytes as a shared object without writing them to disk.
///
/// The bytes are copied into an anonymous memory file and opened through
/// its `/proc/self/fd` path.
#[cfg(target_os = "linux")]
#[derive(Debug, Clone, Copy, Default)]
pub struct DylibMaterializer;

#[cfg(target_os = "linux")]
impl Materializer for DylibMaterializer {
    fn materialize(&self, name: &str, kind: FileKind, bytes: &[u8]) -> Result<LoadedArtifact> {
        use std::io::Write;
        use std::os::fd::{AsRawFd, FromRawFd};

        let fd = unsafe { libc::memfd_create(c"kiln-artifact".as_ptr(), libc::MFD_CLOEXEC) };
        if fd < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        // SAFETY: fd was just created and is owned by nothing else.
        let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
        file.write_all(bytes)?;

        let path = format!("/proc/self/fd/{}", file.as_raw_fd());
        // SAFETY: running library initializers is inherent to loading code.
        let library = unsafe { Library::new(&path)? };
        tracing::debug!("Loaded {} as shared object ({} bytes)", name, bytes.len());

        Ok(LoadedArtifact::from_image(name, kind, bytes).with_library(library))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_materializer() {
        let loaded = ImageMaterializer
            .materialize("app.A", FileKind::Compiled, b"bytes")
            .unwrap();
        assert_eq!(loaded.name(), "app.A");
        assert_eq!(loaded.kind(), FileKind::Compiled);
        assert_eq!(loaded.image(), b"bytes");
        assert!(!loaded.is_library());
    }

    #[test]
    fn test_symbol_requires_library() {
        let loaded = LoadedArtifact::from_image("app.A", FileKind::Compiled, b"x".as_slice());
        let result = unsafe { loaded.symbol::<unsafe extern "C" fn()>("entry") };
        assert!(matches!(result, Err(Error::Materialization { .. })));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_dylib_rejects_garbage() {
        let result = DylibMaterializer.materialize("app.A", FileKind::Compiled, b"not an elf");
        assert!(matches!(result, Err(Error::LibraryLoad(_))));
    }
}
