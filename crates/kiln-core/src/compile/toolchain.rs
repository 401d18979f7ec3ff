//! The compiler toolchain contract, and a rustc-backed implementation.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use rayon::prelude::*;

use crate::error::{Error, Result};

use super::diagnostics::{Diagnostic, DiagnosticSink, parse_rustc_output};
use super::file_manager::{FileHandle, FileManager};
use super::source::SourceUnit;
use super::types::{FileKind, Location};

/// A source-to-artifact compiler driven by kiln.
///
/// The toolchain performs all I/O through `files` and reports every
/// diagnostic to `diagnostics`. Sources it requests through
/// [`FileManager::output_for`] become available from
/// [`FileManager::take_generated_sources`] and belong to the same build.
///
/// Returns the toolchain's own verdict; kiln decides success from the
/// reported diagnostics. An `Err` means the toolchain itself failed.
pub trait Toolchain: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    fn compile(
        &self,
        units: &[Arc<SourceUnit>],
        options: &[String],
        files: &dyn FileManager,
        diagnostics: &DiagnosticSink,
    ) -> Result<bool>;
}

/// Compiles each unit with rustc, entirely through pipes.
///
/// The source goes to rustc on stdin, the LLVM IR comes back on stdout and
/// becomes the unit's artifact, and JSON diagnostics arrive on stderr.
/// Units of one round compile in parallel.
#[derive(Debug, Clone)]
pub struct RustcToolchain {
    /// Path to rustc
    rustc_path: PathBuf,

    /// Toolchain version string
    version: String,

    /// Edition used unless the options name one
    edition: String,
}

impl RustcToolchain {
    /// Locate rustc in PATH.
    pub fn new() -> Result<Self> {
        let rustc_path = which::which("rustc")
            .map_err(|_| Error::ToolchainUnavailable("rustc not found in PATH".to_string()))?;
        Self::at(rustc_path)
    }

    /// Use the rustc at `rustc_path`.
    pub fn at(rustc_path: impl Into<PathBuf>) -> Result<Self> {
        let rustc_path = rustc_path.into();
        let version = Self::get_rustc_version(&rustc_path)?;
        tracing::debug!("Using {} at {}", version, rustc_path.display());

        Ok(Self {
            rustc_path,
            version,
            edition: "2021".to_string(),
        })
    }

    /// Default edition for units.
    pub fn with_edition(mut self, edition: impl Into<String>) -> Self {
        self.edition = edition.into();
        self
    }

    /// Get the rustc path.
    pub fn rustc_path(&self) -> &Path {
        &self.rustc_path
    }

    /// Get the toolchain version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get rustc version string.
    fn get_rustc_version(rustc: &Path) -> Result<String> {
        let output = Command::new(rustc)
            .arg("--version")
            .output()
            .map_err(|e| {
                Error::ToolchainUnavailable(format!("failed to run {}: {}", rustc.display(), e))
            })?;

        if !output.status.success() {
            return Err(Error::ToolchainUnavailable(format!(
                "{} --version exited with {}",
                rustc.display(),
                output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Crate name rustc will accept for a qualified unit name.
    fn crate_name(unit: &str) -> String {
        let name: String = unit
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        if name.starts_with(|c: char| c.is_ascii_digit()) || name.is_empty() {
            format!("unit_{name}")
        } else {
            name
        }
    }

    /// Compile one unit; `Ok(false)` when rustc rejected it.
    fn compile_unit(
        &self,
        unit: &Arc<SourceUnit>,
        options: &[String],
        files: &dyn FileManager,
        diagnostics: &DiagnosticSink,
    ) -> Result<bool> {
        let Some(source) = unit.content() else {
            diagnostics.report(
                Diagnostic::error("source was requested but never written").with_source(unit.name()),
            );
            return Ok(false);
        };

        let crate_name = Self::crate_name(unit.name());
        let mut command = Command::new(&self.rustc_path);
        command
            .arg("-")
            .args(["--crate-type", "lib", "--crate-name", crate_name.as_str()])
            .args(["--error-format=json", "--emit=llvm-ir", "-C", "codegen-units=1", "-o", "-"]);
        if !options.iter().any(|o| o.starts_with("--edition")) {
            command.arg(format!("--edition={}", self.edition));
        }
        command
            .args(options)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| Error::Toolchain(format!("failed to spawn rustc: {e}")))?;

        // rustc reads all of stdin before producing output
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(source.as_bytes())?;
        }
        let output = child.wait_with_output()?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let reported = parse_rustc_output(unit.name(), &stderr);
        let has_errors = reported.iter().any(|d| !d.kind.is_warning());
        diagnostics.extend(reported);

        if !output.status.success() {
            if !has_errors {
                diagnostics.report(
                    Diagnostic::error(format!("rustc exited with {}: {}", output.status, stderr.trim()))
                        .with_source(unit.name()),
                );
            }
            return Ok(false);
        }

        let sibling = FileHandle::Source(Arc::clone(unit));
        let sink = files.output_for(
            &Location::ClassOutput,
            unit.name(),
            FileKind::Compiled,
            Some(&sibling),
        )?;
        sink.write(&output.stdout)?;
        Ok(true)
    }
}

impl Toolchain for RustcToolchain {
    fn name(&self) -> &str {
        "rustc"
    }

    fn compile(
        &self,
        units: &[Arc<SourceUnit>],
        options: &[String],
        files: &dyn FileManager,
        diagnostics: &DiagnosticSink,
    ) -> Result<bool> {
        let mut success = true;
        let mut round = units.to_vec();

        while !round.is_empty() {
            let results: Vec<Result<bool>> = round
                .par_iter()
                .map(|unit| self.compile_unit(unit, options, files, diagnostics))
                .collect();
            for result in results {
                success &= result?;
            }
            round = files.take_generated_sources();
        }

        Ok(success)
    }
}
