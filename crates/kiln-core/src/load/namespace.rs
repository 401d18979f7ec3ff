//! The namespace that owns compiled artifacts and loads them on demand.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

use super::artifact::MemoryArtifact;
use super::host::{HostNamespace, ResourceRoot};
use super::materialize::{ImageMaterializer, LoadedArtifact, Materializer};

/// Maps fully-qualified names to in-memory artifacts.
///
/// Names this loader does not own are looked up in the parent namespace.
/// The map is safe to populate and query from several threads; each
/// artifact is materialized at most once and the handle cached.
pub struct ArtifactLoader {
    artifacts: RwLock<FxHashMap<String, Arc<MemoryArtifact>>>,
    parent: Arc<dyn HostNamespace>,
    materializer: Arc<dyn Materializer>,
}

impl ArtifactLoader {
    /// Create a loader delegating unknown names to `parent`.
    pub fn new(parent: Arc<dyn HostNamespace>) -> Self {
        Self::with_materializer(parent, Arc::new(ImageMaterializer))
    }

    /// Create a loader with a specific materializer.
    pub fn with_materializer(
        parent: Arc<dyn HostNamespace>,
        materializer: Arc<dyn Materializer>,
    ) -> Self {
        Self {
            artifacts: RwLock::new(FxHashMap::default()),
            parent,
            materializer,
        }
    }

    pub fn parent(&self) -> &Arc<dyn HostNamespace> {
        &self.parent
    }

    /// Take ownership of an artifact under its name.
    ///
    /// A later registration under the same name replaces the earlier one,
    /// which is returned.
    pub fn register(&self, artifact: Arc<MemoryArtifact>) -> Option<Arc<MemoryArtifact>> {
        let name = artifact.name().to_string();
        let replaced = self.artifacts.write().insert(name, artifact);
        if let Some(old) = &replaced {
            tracing::debug!("Replacing artifact {} in namespace", old.name());
        }
        replaced
    }

    /// The owned artifact registered under `name`, if any.
    pub fn artifact(&self, name: &str) -> Option<Arc<MemoryArtifact>> {
        self.artifacts.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.artifacts.read().contains_key(name)
    }

    /// Names of all owned artifacts, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.artifacts.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.read().is_empty()
    }

    /// Resolve `name` to a live artifact.
    ///
    /// Owned artifacts are materialized on first access and cached; other
    /// names go to the parent namespace.
    pub fn resolve(&self, name: &str) -> Result<Arc<LoadedArtifact>> {
        // Clone out of the map so materialization runs without the map lock.
        match self.artifact(name) {
            Some(artifact) => artifact.materialize(self.materializer.as_ref()),
            None => self
                .parent
                .find_existing(name)?
                .ok_or_else(|| Error::ArtifactNotFound(name.to_string())),
        }
    }

    /// Materialize every owned artifact.
    pub fn all_materialized(&self) -> Result<HashMap<String, Arc<LoadedArtifact>>> {
        let artifacts: Vec<Arc<MemoryArtifact>> = self.artifacts.read().values().cloned().collect();

        let mut loaded = HashMap::with_capacity(artifacts.len());
        for artifact in artifacts {
            let handle = artifact.materialize(self.materializer.as_ref())?;
            loaded.insert(artifact.name().to_string(), handle);
        }
        Ok(loaded)
    }
}

impl HostNamespace for ArtifactLoader {
    fn find_existing(&self, name: &str) -> Result<Option<Arc<LoadedArtifact>>> {
        match self.resolve(name) {
            Ok(loaded) => Ok(Some(loaded)),
            Err(Error::ArtifactNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn resources(&self, package_path: &str) -> Result<Vec<ResourceRoot>> {
        self.parent.resources(package_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use crate::compile::FileKind;
    use crate::load::EmptyNamespace;

    fn artifact(name: &str, bytes: &[u8]) -> Arc<MemoryArtifact> {
        let artifact = Arc::new(MemoryArtifact::new(name, FileKind::Compiled));
        artifact.write(bytes).unwrap();
        artifact.finalize();
        artifact
    }

    #[test]
    fn test_resolve_owned_is_stable() {
        let loader = ArtifactLoader::new(Arc::new(EmptyNamespace));
        loader.register(artifact("app.A", b"a"));

        let first = loader.resolve("app.A").unwrap();
        let second = loader.resolve("app.A").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "app.A");
    }

    #[test]
    fn test_unknown_name_not_found() {
        let loader = ArtifactLoader::new(Arc::new(EmptyNamespace));
        assert!(matches!(
            loader.resolve("app.Missing"),
            Err(Error::ArtifactNotFound(name)) if name == "app.Missing"
        ));
        assert!(loader.find_existing("app.Missing").unwrap().is_none());
    }

    #[test]
    fn test_delegates_to_parent() {
        let parent = Arc::new(ArtifactLoader::new(Arc::new(EmptyNamespace)));
        parent.register(artifact("lib.Base", b"base"));

        let child = ArtifactLoader::new(parent.clone());
        child.register(artifact("app.Derived", b"derived"));

        let base = child.resolve("lib.Base").unwrap();
        assert_eq!(base.image(), b"base");
        assert!(Arc::ptr_eq(&base, &parent.resolve("lib.Base").unwrap()));
        assert!(!child.contains("lib.Base"));
        assert!(parent.find_existing("app.Derived").unwrap().is_none());
    }

    #[test]
    fn test_reregistration_overwrites() {
        let loader = ArtifactLoader::new(Arc::new(EmptyNamespace));
        assert!(loader.register(artifact("app.A", b"old")).is_none());
        let replaced = loader.register(artifact("app.A", b"new"));

        assert_eq!(replaced.unwrap().bytes(), b"old");
        assert_eq!(loader.len(), 1);
        assert_eq!(loader.resolve("app.A").unwrap().image(), b"new");
    }

    #[test]
    fn test_all_materialized() {
        let loader = ArtifactLoader::new(Arc::new(EmptyNamespace));
        loader.register(artifact("app.A", b"a"));
        loader.register(artifact("app.B", b"b"));

        let loaded = loader.all_materialized().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(Arc::ptr_eq(&loaded["app.A"], &loader.resolve("app.A").unwrap()));
        assert_eq!(loader.names(), vec!["app.A", "app.B"]);
    }

    #[test]
    fn test_concurrent_register_and_resolve() {
        let loader = Arc::new(ArtifactLoader::new(Arc::new(EmptyNamespace)));

        let writers: Vec<_> = (0..8)
            .map(|worker| {
                let loader = Arc::clone(&loader);
                thread::spawn(move || {
                    for i in 0..50 {
                        let name = format!("app.W{worker}_{i}");
                        loader.register(artifact(&name, name.as_bytes()));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(loader.len(), 400);

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let loader = Arc::clone(&loader);
                thread::spawn(move || loader.resolve("app.W3_7").unwrap())
            })
            .collect();
        let handles: Vec<_> = readers.into_iter().map(|r| r.join().unwrap()).collect();
        for handle in &handles[1..] {
            assert!(Arc::ptr_eq(&handles[0], handle));
        }
    }
}
