//! The file manager a toolchain talks to during a build.
//!
//! [`VirtualFileManager`] answers every output request from memory, merges
//! the host namespace into class path listings, and queues sources the
//! toolchain discovers mid-build so they join the same build. Everything
//! else is forwarded to a [`StandardFileManager`].

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::load::{
    ArtifactLoader, HostNamespace, MemoryArtifact, PackageFinder, ResolvedArtifact,
};

use super::source::SourceUnit;
use super::types::{FileKind, Location};

/// A file as seen by the toolchain.
#[derive(Debug, Clone)]
pub enum FileHandle {
    /// Source text held in memory
    Source(Arc<SourceUnit>),

    /// Artifact produced in memory by a build
    Artifact(Arc<MemoryArtifact>),

    /// Artifact found through the host namespace
    Resolved(ResolvedArtifact),

    /// File owned by the standard file manager
    Standard(StandardFile),
}

impl FileHandle {
    /// Path-like name of the file.
    pub fn name(&self) -> String {
        match self {
            Self::Source(unit) => unit.path_name(),
            Self::Artifact(artifact) => format!(
                "/{}{}",
                artifact.name().replace('.', "/"),
                artifact.kind().extension()
            ),
            Self::Resolved(resolved) => resolved.path_name(),
            Self::Standard(file) => file.path.display().to_string(),
        }
    }

    pub fn kind(&self) -> FileKind {
        match self {
            Self::Source(_) => FileKind::Source,
            Self::Artifact(artifact) => artifact.kind(),
            Self::Resolved(_) => FileKind::Compiled,
            Self::Standard(file) => file.kind,
        }
    }

    /// Read the file's contents.
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Self::Source(unit) => unit
                .content()
                .map(|text| text.as_bytes().to_vec())
                .ok_or_else(|| Error::InvalidSource(format!("{} has no content yet", unit.name()))),
            Self::Artifact(artifact) => Ok(artifact.bytes()),
            Self::Resolved(resolved) => resolved.read_bytes(),
            Self::Standard(file) => Ok(std::fs::read(&file.path)?),
        }
    }
}

/// A file found by a [`StandardFileManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardFile {
    pub path: PathBuf,
    pub kind: FileKind,
    /// Qualified name derived from the file's position under its root
    pub binary_name: String,
}

/// Where the toolchain writes one output.
#[derive(Debug, Clone)]
pub enum OutputSink {
    Artifact(Arc<MemoryArtifact>),
    Source(Arc<SourceUnit>),
}

impl OutputSink {
    pub fn name(&self) -> &str {
        match self {
            Self::Artifact(artifact) => artifact.name(),
            Self::Source(unit) => unit.name(),
        }
    }

    /// Write to the sink.
    ///
    /// Artifacts accumulate bytes; a generated source takes its whole text
    /// in a single write.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        match self {
            Self::Artifact(artifact) => artifact.write(bytes),
            Self::Source(unit) => {
                let text = std::str::from_utf8(bytes).map_err(|e| {
                    Error::InvalidSource(format!("{} is not valid UTF-8: {}", unit.name(), e))
                })?;
                unit.write_content(text)
            }
        }
    }

    pub fn as_artifact(&self) -> Option<&Arc<MemoryArtifact>> {
        match self {
            Self::Artifact(artifact) => Some(artifact),
            Self::Source(_) => None,
        }
    }

    pub fn as_source(&self) -> Option<&Arc<SourceUnit>> {
        match self {
            Self::Source(unit) => Some(unit),
            Self::Artifact(_) => None,
        }
    }

    /// Whether both sinks are the same in-flight object.
    pub fn ptr_eq(&self, other: &OutputSink) -> bool {
        match (self, other) {
            (Self::Artifact(a), Self::Artifact(b)) => Arc::ptr_eq(a, b),
            (Self::Source(a), Self::Source(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// File and namespace operations a toolchain calls back into during a build.
pub trait FileManager: Send + Sync {
    /// A sink for output `name` of `kind`.
    fn output_for(
        &self,
        location: &Location,
        name: &str,
        kind: FileKind,
        sibling: Option<&FileHandle>,
    ) -> Result<OutputSink>;

    /// Files of `kinds` in `package` at `location`.
    fn list(
        &self,
        location: &Location,
        package: &str,
        kinds: &[FileKind],
        recurse: bool,
    ) -> Result<Vec<FileHandle>>;

    /// Qualified name of `file`.
    fn infer_binary_name(&self, location: &Location, file: &FileHandle) -> Option<String>;

    fn is_same_file(&self, a: &FileHandle, b: &FileHandle) -> bool;

    /// Sources requested through [`FileManager::output_for`] since the last call.
    fn take_generated_sources(&self) -> Vec<Arc<SourceUnit>>;

    /// Namespace that generated code is loaded into.
    fn namespace(&self, location: &Location) -> Arc<dyn HostNamespace>;
}

/// The platform's own file resolution, which the virtual file manager wraps.
pub trait StandardFileManager: Send + Sync {
    fn list(
        &self,
        location: &Location,
        package: &str,
        kinds: &[FileKind],
        recurse: bool,
    ) -> Result<Vec<FileHandle>>;

    fn infer_binary_name(&self, location: &Location, file: &FileHandle) -> Option<String>;

    fn is_same_file(&self, a: &FileHandle, b: &FileHandle) -> bool;
}

/// Standard resolution over plain directories, one set of roots per location.
///
/// With no roots configured it finds nothing.
#[derive(Debug, Clone, Default)]
pub struct DirectoryFileManager {
    roots: FxHashMap<Location, Vec<PathBuf>>,
}

impl DirectoryFileManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search `root` when listing `location`.
    pub fn with_root(mut self, location: Location, root: impl Into<PathBuf>) -> Self {
        self.roots.entry(location).or_default().push(root.into());
        self
    }

    fn list_dir(
        dir: &Path,
        package: &str,
        kinds: &[FileKind],
        recurse: bool,
        out: &mut Vec<FileHandle>,
    ) -> Result<()> {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        entries.sort();

        for path in entries {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let qualified = if package.is_empty() {
                file_name.to_string()
            } else {
                format!("{package}.{file_name}")
            };

            if path.is_dir() {
                if recurse {
                    Self::list_dir(&path, &qualified, kinds, recurse, out)?;
                }
                continue;
            }

            let matched = kinds.iter().find_map(|kind| {
                let extension = kind.extension();
                if extension.is_empty() {
                    return None;
                }
                file_name.strip_suffix(extension).map(|stem| (*kind, stem))
            });
            if let Some((kind, stem)) = matched {
                let binary_name = if package.is_empty() {
                    stem.to_string()
                } else {
                    format!("{package}.{stem}")
                };
                out.push(FileHandle::Standard(StandardFile {
                    path: path.clone(),
                    kind,
                    binary_name,
                }));
            }
        }
        Ok(())
    }
}

impl StandardFileManager for DirectoryFileManager {
    fn list(
        &self,
        location: &Location,
        package: &str,
        kinds: &[FileKind],
        recurse: bool,
    ) -> Result<Vec<FileHandle>> {
        let mut files = Vec::new();
        let package_path = package.replace('.', "/");

        for root in self.roots.get(location).into_iter().flatten() {
            let dir = root.join(&package_path);
            if dir.is_dir() {
                Self::list_dir(&dir, package, kinds, recurse, &mut files)?;
            }
        }
        Ok(files)
    }

    fn infer_binary_name(&self, _location: &Location, file: &FileHandle) -> Option<String> {
        match file {
            FileHandle::Standard(file) => Some(file.binary_name.clone()),
            _ => None,
        }
    }

    fn is_same_file(&self, a: &FileHandle, b: &FileHandle) -> bool {
        match (a, b) {
            (FileHandle::Standard(a), FileHandle::Standard(b)) => a.path == b.path,
            (FileHandle::Artifact(a), FileHandle::Artifact(b)) => Arc::ptr_eq(a, b),
            (FileHandle::Resolved(a), FileHandle::Resolved(b)) => a == b,
            (FileHandle::Source(a), FileHandle::Source(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// The file manager handed to the toolchain for one build.
pub struct VirtualFileManager {
    standard: Arc<dyn StandardFileManager>,
    loader: Arc<ArtifactLoader>,
    finder: PackageFinder,
    /// Artifacts created during this build, by name
    artifacts: Mutex<FxHashMap<String, Arc<MemoryArtifact>>>,
    /// Sources requested during this build, by name
    sources: Mutex<FxHashMap<String, Arc<SourceUnit>>>,
    /// Generated sources not yet handed to the toolchain
    generated: Mutex<VecDeque<Arc<SourceUnit>>>,
}

impl VirtualFileManager {
    pub fn new(
        standard: Arc<dyn StandardFileManager>,
        loader: Arc<ArtifactLoader>,
        finder: PackageFinder,
    ) -> Self {
        Self {
            standard,
            loader,
            finder,
            artifacts: Mutex::new(FxHashMap::default()),
            sources: Mutex::new(FxHashMap::default()),
            generated: Mutex::new(VecDeque::new()),
        }
    }

    /// Artifacts created during this build.
    pub fn artifacts(&self) -> Vec<Arc<MemoryArtifact>> {
        self.artifacts.lock().values().cloned().collect()
    }

    /// Sources the toolchain asked for during this build.
    pub fn generated_sources(&self) -> Vec<Arc<SourceUnit>> {
        self.sources.lock().values().cloned().collect()
    }

    /// Finalize every artifact of this build and return them.
    pub fn finish(&self) -> Vec<Arc<MemoryArtifact>> {
        let artifacts = self.artifacts();
        for artifact in &artifacts {
            artifact.finalize();
        }
        artifacts
    }

    /// Finalized artifacts already owned by the namespace, directly in `package`.
    fn owned_in_package(&self, package: &str) -> Vec<FileHandle> {
        self.loader
            .names()
            .into_iter()
            .filter(|name| {
                let parent = name.rsplit_once('.').map(|(parent, _)| parent).unwrap_or("");
                parent == package
            })
            .filter_map(|name| self.loader.artifact(&name))
            .filter(|artifact| artifact.is_finalized() && artifact.kind() == FileKind::Compiled)
            .map(FileHandle::Artifact)
            .collect()
    }
}

impl FileManager for VirtualFileManager {
    fn output_for(
        &self,
        location: &Location,
        name: &str,
        kind: FileKind,
        _sibling: Option<&FileHandle>,
    ) -> Result<OutputSink> {
        if kind == FileKind::Source {
            let mut sources = self.sources.lock();
            if let Some(existing) = sources.get(name) {
                return Ok(OutputSink::Source(Arc::clone(existing)));
            }

            let unit = Arc::new(SourceUnit::pending(name));
            self.generated.lock().push_back(Arc::clone(&unit));
            sources.insert(name.to_string(), Arc::clone(&unit));
            tracing::debug!("Toolchain requested generated source {} at {}", name, location);
            return Ok(OutputSink::Source(unit));
        }

        let mut artifacts = self.artifacts.lock();
        if let Some(existing) = artifacts.get(name) {
            return Ok(OutputSink::Artifact(Arc::clone(existing)));
        }

        let artifact = Arc::new(MemoryArtifact::new(name, kind));
        self.loader.register(Arc::clone(&artifact));
        artifacts.insert(name.to_string(), Arc::clone(&artifact));
        tracing::debug!("Created output sink for {} at {}", name, location);
        Ok(OutputSink::Artifact(artifact))
    }

    fn list(
        &self,
        location: &Location,
        package: &str,
        kinds: &[FileKind],
        recurse: bool,
    ) -> Result<Vec<FileHandle>> {
        if location.is_protected() {
            return self.standard.list(location, package, kinds, recurse);
        }

        let mut files = self.standard.list(location, package, kinds, recurse)?;
        if *location == Location::ClassPath && kinds.contains(&FileKind::Compiled) {
            files.extend(self.owned_in_package(package));
            files.extend(self.finder.find(package)?.into_iter().map(FileHandle::Resolved));
        }
        Ok(files)
    }

    fn infer_binary_name(&self, location: &Location, file: &FileHandle) -> Option<String> {
        match file {
            FileHandle::Source(unit) => Some(unit.name().to_string()),
            FileHandle::Artifact(artifact) => Some(artifact.name().to_string()),
            FileHandle::Resolved(resolved) => Some(resolved.binary_name().to_string()),
            FileHandle::Standard(_) => self.standard.infer_binary_name(location, file),
        }
    }

    fn is_same_file(&self, a: &FileHandle, b: &FileHandle) -> bool {
        match (a, b) {
            (FileHandle::Source(a), FileHandle::Source(b)) => a.name() == b.name(),
            _ => self.standard.is_same_file(a, b),
        }
    }

    fn take_generated_sources(&self) -> Vec<Arc<SourceUnit>> {
        self.generated.lock().drain(..).collect()
    }

    fn namespace(&self, _location: &Location) -> Arc<dyn HostNamespace> {
        self.loader.clone()
    }
}
