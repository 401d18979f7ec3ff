//! Package enumeration over the host namespace.
//!
//! Given a package name, lists the artifacts the host exposes for it one
//! level deep. Sub-packages are never descended into.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result};

use super::ARTIFACT_EXTENSION;
use super::host::{HostNamespace, ResourceRoot, open_archive, read_archive_entry};

/// Where a resolved artifact's bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    File(PathBuf),
    ArchiveEntry { archive: PathBuf, entry: String },
}

/// An artifact found through the host namespace rather than produced by
/// the current build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    binary_name: String,
    location: ArtifactLocation,
}

impl ResolvedArtifact {
    pub fn new(binary_name: impl Into<String>, location: ArtifactLocation) -> Self {
        Self {
            binary_name: binary_name.into(),
            location,
        }
    }

    /// Fully-qualified name, e.g. `app.model.User`.
    pub fn binary_name(&self) -> &str {
        &self.binary_name
    }

    pub fn location(&self) -> &ArtifactLocation {
        &self.location
    }

    /// Path-like name: the file path, or the entry path inside the archive.
    pub fn path_name(&self) -> String {
        match &self.location {
            ArtifactLocation::File(path) => path.display().to_string(),
            ArtifactLocation::ArchiveEntry { entry, .. } => entry.clone(),
        }
    }

    /// Read the artifact's bytes.
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        match &self.location {
            ArtifactLocation::File(path) => Ok(std::fs::read(path)?),
            ArtifactLocation::ArchiveEntry { archive, entry } => {
                read_archive_entry(archive, entry)?.ok_or_else(|| {
                    Error::ArtifactNotFound(format!("{}!/{}", archive.display(), entry))
                })
            }
        }
    }
}

/// Lists artifacts of a package reachable through a host namespace.
#[derive(Clone)]
pub struct PackageFinder {
    host: Arc<dyn HostNamespace>,
    extension: String,
}

impl PackageFinder {
    /// Create a finder over `host` using the default artifact extension.
    pub fn new(host: Arc<dyn HostNamespace>) -> Self {
        Self {
            host,
            extension: ARTIFACT_EXTENSION.to_string(),
        }
    }

    /// Use a different artifact extension (including the dot).
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Artifacts directly inside `package` (dot-separated).
    ///
    /// An unreadable archive or directory fails the whole call.
    pub fn find(&self, package: &str) -> Result<Vec<ResolvedArtifact>> {
        let package_path = package.replace('.', "/");
        let mut result = Vec::new();

        for root in self.host.resources(&package_path)? {
            match root {
                ResourceRoot::Directory(dir) => result.extend(self.list_directory(package, dir)?),
                ResourceRoot::Archive {
                    archive,
                    entry_prefix,
                } => result.extend(self.list_archive(archive, &entry_prefix)?),
            }
        }

        tracing::debug!("Found {} host artifacts in package {}", result.len(), package);
        Ok(result)
    }

    fn list_directory(&self, package: &str, dir: PathBuf) -> Result<Vec<ResolvedArtifact>> {
        let read_dir =
            std::fs::read_dir(&dir).map_err(|e| Error::resolution(dir.display().to_string(), e))?;

        let mut result = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| Error::resolution(dir.display().to_string(), e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(stem) = file_name.strip_suffix(self.extension.as_str()) else {
                continue;
            };

            let binary_name = if package.is_empty() {
                stem.to_string()
            } else {
                format!("{package}.{stem}")
            };
            result.push(ResolvedArtifact::new(binary_name, ArtifactLocation::File(path)));
        }

        // read_dir order is platform-dependent
        result.sort_by(|a, b| a.binary_name.cmp(&b.binary_name));
        Ok(result)
    }

    fn list_archive(&self, archive: PathBuf, entry_prefix: &str) -> Result<Vec<ResolvedArtifact>> {
        let reader = open_archive(&archive)?;
        let root = format!("{}/", entry_prefix.trim_end_matches('/'));

        let mut result = Vec::new();
        for name in reader.file_names() {
            let Some(rest) = name.strip_prefix(&root) else {
                continue;
            };
            if rest.contains('/') || !rest.ends_with(self.extension.as_str()) {
                continue;
            }

            let binary_name = name
                .strip_suffix(self.extension.as_str())
                .unwrap_or(name)
                .replace('/', ".");
            result.push(ResolvedArtifact::new(
                binary_name,
                ArtifactLocation::ArchiveEntry {
                    archive: archive.clone(),
                    entry: name.to_string(),
                },
            ));
        }

        result.sort_by(|a, b| a.binary_name.cmp(&b.binary_name));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;

    use zip::write::SimpleFileOptions;

    use crate::load::LoadedArtifact;

    /// Host that hands out fixed roots regardless of the package asked for.
    struct FixedRoots(Vec<ResourceRoot>);

    impl HostNamespace for FixedRoots {
        fn find_existing(&self, _name: &str) -> Result<Option<Arc<LoadedArtifact>>> {
            Ok(None)
        }

        fn resources(&self, _package_path: &str) -> Result<Vec<ResourceRoot>> {
            Ok(self.0.clone())
        }
    }

    fn write_archive(path: &Path, entries: &[&str]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for name in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(name.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    fn names(found: &[ResolvedArtifact]) -> Vec<&str> {
        found.iter().map(|a| a.binary_name()).collect()
    }

    #[test]
    fn test_directory_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        for file in ["A.class", "B.class", "C.txt"] {
            std::fs::write(dir.path().join(file), file).unwrap();
        }
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/D.class"), "d").unwrap();

        let finder = PackageFinder::new(Arc::new(FixedRoots(vec![ResourceRoot::Directory(
            dir.path().to_path_buf(),
        )])));
        let found = finder.find("p").unwrap();

        assert_eq!(names(&found), vec!["p.A", "p.B"]);
        assert_eq!(found[0].read_bytes().unwrap(), b"A.class");
    }

    #[test]
    fn test_archive_is_one_level_deep() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("lib.zip");
        write_archive(
            &archive,
            &["p/A.class", "p/sub/B.class", "p/README.txt", "pq/C.class", "q/D.class"],
        );

        let finder = PackageFinder::new(Arc::new(FixedRoots(vec![ResourceRoot::Archive {
            archive: archive.clone(),
            entry_prefix: "p".into(),
        }])));
        let found = finder.find("p").unwrap();

        assert_eq!(names(&found), vec!["p.A"]);
        assert_eq!(
            found[0].location(),
            &ArtifactLocation::ArchiveEntry {
                archive,
                entry: "p/A.class".into()
            }
        );
        assert_eq!(found[0].read_bytes().unwrap(), b"p/A.class");
    }

    #[test]
    fn test_nested_package_names() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("lib.zip");
        write_archive(&archive, &["org/acme/Util.class", "org/acme/inner/X.class"]);

        let finder = PackageFinder::new(Arc::new(FixedRoots(vec![ResourceRoot::Archive {
            archive,
            entry_prefix: "org/acme".into(),
        }])));

        assert_eq!(names(&finder.find("org.acme").unwrap()), vec!["org.acme.Util"]);
    }

    #[test]
    fn test_custom_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A.ll"), "ir").unwrap();
        std::fs::write(dir.path().join("B.class"), "b").unwrap();

        let finder = PackageFinder::new(Arc::new(FixedRoots(vec![ResourceRoot::Directory(
            dir.path().to_path_buf(),
        )])))
        .with_extension(".ll");

        assert_eq!(names(&finder.find("p").unwrap()), vec!["p.A"]);
    }

    #[test]
    fn test_malformed_archive_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        std::fs::write(&archive, b"PK but not really").unwrap();

        let finder = PackageFinder::new(Arc::new(FixedRoots(vec![ResourceRoot::Archive {
            archive,
            entry_prefix: "p".into(),
        }])));

        let err = finder.find("p").unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
        assert!(err.to_string().contains("broken.zip"));
    }

    #[test]
    fn test_missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let finder = PackageFinder::new(Arc::new(FixedRoots(vec![ResourceRoot::Directory(
            dir.path().join("gone"),
        )])));

        assert!(matches!(finder.find("p"), Err(Error::Resolution { .. })));
    }
}
