//! In-memory source units.

use std::sync::OnceLock;

use crate::error::{Error, Result};

use super::types::FileKind;

/// One unit of source text, identified by its fully-qualified name.
///
/// Units submitted by callers carry their text from the start. Units the
/// toolchain asks for mid-build start out pending and receive their text
/// exactly once, through the output sink the file manager hands back.
#[derive(Debug)]
pub struct SourceUnit {
    name: String,
    content: OnceLock<String>,
}

impl SourceUnit {
    /// Create a unit with known content.
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: OnceLock::from(content.into()),
        }
    }

    /// Create a placeholder unit awaiting its content.
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: OnceLock::new(),
        }
    }

    /// Fully-qualified name, e.g. `app.model.User`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Always [`FileKind::Source`].
    pub fn kind(&self) -> FileKind {
        FileKind::Source
    }

    /// Path-like name derived from the qualified name (`app/model/User.rs`).
    pub fn path_name(&self) -> String {
        format!("/{}{}", self.name.replace('.', "/"), FileKind::Source.extension())
    }

    /// Source text, or `None` while the unit is still pending.
    pub fn content(&self) -> Option<&str> {
        self.content.get().map(String::as_str)
    }

    /// Whether the unit still awaits content.
    pub fn is_pending(&self) -> bool {
        self.content.get().is_none()
    }

    /// Set the content of a pending unit. The first write wins.
    pub fn write_content(&self, text: impl Into<String>) -> Result<()> {
        self.content
            .set(text.into())
            .map_err(|_| Error::SourceAlreadyWritten(self.name.clone()))
    }
}
