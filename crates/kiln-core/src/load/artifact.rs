//! Buffered compiler output.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::compile::FileKind;
use crate::error::{Error, Result};

use super::materialize::{LoadedArtifact, Materializer};

/// One compiled artifact held entirely in memory.
///
/// Created empty when the toolchain asks for an output sink, filled by the
/// toolchain, finalized once the build completes, and materialized lazily at
/// most once.
#[derive(Debug)]
pub struct MemoryArtifact {
    name: String,
    kind: FileKind,
    buffer: Mutex<Vec<u8>>,
    finalized: AtomicBool,
    /// Per-artifact materialization guard; holds the cached handle
    loaded: Mutex<Option<Arc<LoadedArtifact>>>,
}

impl MemoryArtifact {
    /// Create an empty artifact.
    pub fn new(name: impl Into<String>, kind: FileKind) -> Self {
        Self {
            name: name.into(),
            kind,
            buffer: Mutex::new(Vec::new()),
            finalized: AtomicBool::new(false),
            loaded: Mutex::new(None),
        }
    }

    /// Fully-qualified name of the artifact.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// Append bytes produced by the toolchain.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut buffer = self.buffer.lock();
        // Checked under the lock so a write cannot slip in after finalize().
        if self.finalized.load(Ordering::Acquire) {
            return Err(Error::ArtifactFinalized(self.name.clone()));
        }
        buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Make the artifact read-only.
    pub fn finalize(&self) {
        let _buffer = self.buffer.lock();
        self.finalized.store(true, Ordering::Release);
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    /// Copy of the bytes written so far.
    pub fn bytes(&self) -> Vec<u8> {
        self.buffer.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The cached live handle, if materialized already.
    pub fn loaded(&self) -> Option<Arc<LoadedArtifact>> {
        self.loaded.lock().clone()
    }

    pub fn is_materialized(&self) -> bool {
        self.loaded.lock().is_some()
    }

    /// Materialize the buffered bytes, or return the cached handle.
    ///
    /// Concurrent first accesses serialize on the guard, so the materializer
    /// runs at most once per artifact. A failed attempt caches nothing.
    pub fn materialize(&self, materializer: &dyn Materializer) -> Result<Arc<LoadedArtifact>> {
        let mut loaded = self.loaded.lock();
        if let Some(handle) = loaded.as_ref() {
            return Ok(Arc::clone(handle));
        }

        let bytes = self.bytes();
        tracing::debug!("Materializing {} ({} bytes)", self.name, bytes.len());
        let handle = Arc::new(materializer.materialize(&self.name, self.kind, &bytes)?);
        *loaded = Some(Arc::clone(&handle));
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::ImageMaterializer;

    #[test]
    fn test_incremental_writes() {
        let artifact = MemoryArtifact::new("app.A", FileKind::Compiled);
        assert!(artifact.is_empty());

        artifact.write(b"\xca\xfe").unwrap();
        artifact.write(b"\xba\xbe").unwrap();
        assert_eq!(artifact.bytes(), b"\xca\xfe\xba\xbe");
        assert_eq!(artifact.len(), 4);
    }

    #[test]
    fn test_finalized_rejects_writes() {
        let artifact = MemoryArtifact::new("app.A", FileKind::Compiled);
        artifact.write(b"abc").unwrap();
        artifact.finalize();

        assert!(artifact.is_finalized());
        assert!(matches!(
            artifact.write(b"def"),
            Err(Error::ArtifactFinalized(name)) if name == "app.A"
        ));
        assert_eq!(artifact.bytes(), b"abc");
    }

    #[test]
    fn test_materialize_cached() {
        let artifact = MemoryArtifact::new("app.A", FileKind::Compiled);
        artifact.write(b"image").unwrap();
        artifact.finalize();
        assert!(!artifact.is_materialized());

        let first = artifact.materialize(&ImageMaterializer).unwrap();
        let second = artifact.materialize(&ImageMaterializer).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "app.A");
        assert_eq!(first.image(), b"image");
        assert!(artifact.is_materialized());
    }
}
