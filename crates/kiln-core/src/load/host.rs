//! The host's pre-existing artifact namespace.
//!
//! A kiln namespace delegates every name it does not own to a parent
//! implementing [`HostNamespace`]. The parent also tells the package finder
//! where the artifacts of a package live, so the toolchain can see them
//! during symbol lookup.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::compile::FileKind;
use crate::error::{Error, Result};

use super::ARTIFACT_EXTENSION;
use super::materialize::{ImageMaterializer, LoadedArtifact, Materializer};

/// Where the artifacts of one package can be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRoot {
    /// A directory holding the package's artifact files directly.
    Directory(PathBuf),

    /// An archive whose entries under `entry_prefix` belong to the package.
    Archive {
        archive: PathBuf,
        entry_prefix: String,
    },
}

/// Lookup contract of the parent namespace.
pub trait HostNamespace: Send + Sync {
    /// An already-available artifact by fully-qualified name.
    fn find_existing(&self, name: &str) -> Result<Option<Arc<LoadedArtifact>>>;

    /// Roots holding artifacts of the package at `package_path`
    /// (`/`-separated, e.g. `app/model`).
    fn resources(&self, package_path: &str) -> Result<Vec<ResourceRoot>>;
}

/// A parent that owns nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyNamespace;

impl HostNamespace for EmptyNamespace {
    fn find_existing(&self, _name: &str) -> Result<Option<Arc<LoadedArtifact>>> {
        Ok(None)
    }

    fn resources(&self, _package_path: &str) -> Result<Vec<ResourceRoot>> {
        Ok(Vec::new())
    }
}

/// One element of a [`ClasspathHost`] search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClasspathEntry {
    Directory(PathBuf),
    Archive(PathBuf),
}

/// A host namespace backed by an ordered list of directories and zip archives.
///
/// Artifacts are found by their qualified name with dots turned into path
/// separators plus the artifact extension; the first entry holding a name
/// wins. Each artifact is materialized once and cached.
pub struct ClasspathHost {
    entries: Vec<ClasspathEntry>,
    extension: String,
    materializer: Arc<dyn Materializer>,
    loaded: RwLock<FxHashMap<String, Arc<LoadedArtifact>>>,
}

impl ClasspathHost {
    /// Create a host over the given entries.
    pub fn new(entries: Vec<ClasspathEntry>) -> Self {
        Self {
            entries,
            extension: ARTIFACT_EXTENSION.to_string(),
            materializer: Arc::new(ImageMaterializer),
            loaded: RwLock::new(FxHashMap::default()),
        }
    }

    /// Use a different artifact extension (including the dot).
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Use a different materializer for artifacts read from the entries.
    pub fn with_materializer(mut self, materializer: Arc<dyn Materializer>) -> Self {
        self.materializer = materializer;
        self
    }

    pub fn entries(&self) -> &[ClasspathEntry] {
        &self.entries
    }

    /// Read the raw bytes of `name` from the first entry holding it.
    pub fn read_existing(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let relative = format!("{}{}", name.replace('.', "/"), self.extension);

        for entry in &self.entries {
            match entry {
                ClasspathEntry::Directory(dir) => {
                    let path = dir.join(&relative);
                    if path.is_file() {
                        return Ok(Some(std::fs::read(path)?));
                    }
                }
                ClasspathEntry::Archive(archive) => {
                    if let Some(bytes) = read_archive_entry(archive, &relative)? {
                        return Ok(Some(bytes));
                    }
                }
            }
        }

        Ok(None)
    }
}

impl HostNamespace for ClasspathHost {
    fn find_existing(&self, name: &str) -> Result<Option<Arc<LoadedArtifact>>> {
        if let Some(loaded) = self.loaded.read().get(name) {
            return Ok(Some(Arc::clone(loaded)));
        }

        let Some(bytes) = self.read_existing(name)? else {
            return Ok(None);
        };

        let mut loaded = self.loaded.write();
        // Another thread may have won the race while we were reading.
        if let Some(existing) = loaded.get(name) {
            return Ok(Some(Arc::clone(existing)));
        }
        let handle = Arc::new(
            self.materializer
                .materialize(name, FileKind::Compiled, &bytes)?,
        );
        loaded.insert(name.to_string(), Arc::clone(&handle));
        tracing::debug!("Loaded host artifact {}", name);
        Ok(Some(handle))
    }

    fn resources(&self, package_path: &str) -> Result<Vec<ResourceRoot>> {
        let mut roots = Vec::new();
        let entry_prefix = format!("{package_path}/");

        for entry in &self.entries {
            match entry {
                ClasspathEntry::Directory(dir) => {
                    let package_dir = dir.join(package_path);
                    if package_dir.is_dir() {
                        roots.push(ResourceRoot::Directory(package_dir));
                    }
                }
                ClasspathEntry::Archive(archive) => {
                    let reader = open_archive(archive)?;
                    if reader.file_names().any(|name| name.starts_with(&entry_prefix)) {
                        roots.push(ResourceRoot::Archive {
                            archive: archive.clone(),
                            entry_prefix: package_path.to_string(),
                        });
                    }
                }
            }
        }

        Ok(roots)
    }
}

/// Open a zip archive, reporting failures as resolution errors.
pub(crate) fn open_archive(archive: &Path) -> Result<zip::ZipArchive<File>> {
    let file = File::open(archive).map_err(|e| Error::resolution(archive.display().to_string(), e))?;
    zip::ZipArchive::new(file).map_err(|e| Error::resolution(archive.display().to_string(), e))
}

/// Read one entry of an archive, or `None` if it has no such entry.
pub(crate) fn read_archive_entry(archive: &Path, entry: &str) -> Result<Option<Vec<u8>>> {
    let mut reader = open_archive(archive)?;
    let mut file = match reader.by_name(entry) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(Error::resolution(format!("{}!/{}", archive.display(), entry), e)),
    };

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}
