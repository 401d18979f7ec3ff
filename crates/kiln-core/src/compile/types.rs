//! Common types for the compilation pipeline.

use std::fmt;

/// Flag always handed to the toolchain ahead of caller options.
pub const VERBOSE_FLAG: &str = "--verbose";

/// Configuration for the compiler.
#[derive(Debug, Clone, Default)]
pub struct CompilerConfig {
    /// Toolchain options, passed through unchanged
    pub options: Vec<String>,
}

impl CompilerConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one toolchain option.
    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    /// Append several toolchain options.
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.extend(options.into_iter().map(Into::into));
        self
    }

    /// Options as handed to the toolchain: the verbose flag, then the caller's.
    pub fn effective_options(&self) -> Vec<String> {
        let mut options = Vec::with_capacity(self.options.len() + 1);
        options.push(VERBOSE_FLAG.to_string());
        options.extend(self.options.iter().cloned());
        options
    }
}

/// What a file handed between the toolchain and the file manager holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Source text
    Source,
    /// Compiled artifact bytes
    Compiled,
    /// Documentation output
    Html,
    /// Anything else
    Other,
}

impl FileKind {
    /// Conventional file extension for this kind, including the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Source => ".rs",
            Self::Compiled => crate::load::ARTIFACT_EXTENSION,
            Self::Html => ".html",
            Self::Other => "",
        }
    }
}

/// Where the toolchain is reading from or writing to.
///
/// Mirrors the search paths a compiler distinguishes between: platform and
/// system locations are resolved by the standard file manager alone, while
/// the class path is merged with the host namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    PlatformClassPath,
    SystemModules,
    ClassPath,
    SourcePath,
    ClassOutput,
    SourceOutput,
    Other(String),
}

impl Location {
    /// Locations owned by the platform; never merged with the host namespace.
    pub fn is_protected(&self) -> bool {
        matches!(self, Self::PlatformClassPath | Self::SystemModules)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlatformClassPath => f.write_str("PLATFORM_CLASS_PATH"),
            Self::SystemModules => f.write_str("SYSTEM_MODULES"),
            Self::ClassPath => f.write_str("CLASS_PATH"),
            Self::SourcePath => f.write_str("SOURCE_PATH"),
            Self::ClassOutput => f.write_str("CLASS_OUTPUT"),
            Self::SourceOutput => f.write_str("SOURCE_OUTPUT"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_flag_prepended() {
        let config = CompilerConfig::new().with_options(["-O", "--edition=2021"]);
        assert_eq!(
            config.effective_options(),
            vec!["--verbose", "-O", "--edition=2021"]
        );
    }

    #[test]
    fn test_default_config() {
        let config = CompilerConfig::default();
        assert!(config.options.is_empty());
        assert_eq!(config.effective_options(), vec![VERBOSE_FLAG]);
    }

    #[test]
    fn test_protected_locations() {
        assert!(Location::PlatformClassPath.is_protected());
        assert!(Location::SystemModules.is_protected());
        assert!(!Location::ClassPath.is_protected());
        assert!(!Location::Other("MODULE_PATH".into()).is_protected());
    }
}
