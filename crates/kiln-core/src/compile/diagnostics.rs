//! Toolchain diagnostics and their classification.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Severity of a diagnostic as reported by the toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Note,
    Warning,
    MandatoryWarning,
    Error,
    /// A kind the toolchain reported that kiln does not recognize
    Other(String),
}

impl DiagnosticKind {
    /// Whether this kind lands in the warning partition.
    ///
    /// Everything not explicitly a note or warning counts as an error,
    /// including unrecognized kinds.
    pub fn is_warning(&self) -> bool {
        match self {
            Self::Note | Self::Warning | Self::MandatoryWarning => true,
            Self::Error | Self::Other(_) => false,
        }
    }

    /// Map a rustc JSON `level` string.
    pub fn from_rustc_level(level: &str) -> Self {
        match level {
            "error" | "error: internal compiler error" => Self::Error,
            "warning" => Self::Warning,
            "note" | "help" | "failure-note" => Self::Note,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Note => f.write_str("note"),
            Self::Warning => f.write_str("warning"),
            Self::MandatoryWarning => f.write_str("mandatory warning"),
            Self::Error => f.write_str("error"),
            Self::Other(kind) => f.write_str(kind),
        }
    }
}

/// A message the toolchain emitted about a unit.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    /// Severity level
    pub kind: DiagnosticKind,

    /// Name of the unit the diagnostic refers to
    pub source: Option<String>,

    /// Line number (1-indexed)
    pub line: Option<u64>,

    /// Column number (1-indexed)
    pub column: Option<u64>,

    /// Error code (e.g., "E0308")
    pub code: Option<String>,

    /// Diagnostic message
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic without position information.
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            source: None,
            line: None,
            column: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Warning, message)
    }

    pub fn note(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Note, message)
    }

    /// Attach the originating unit.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach a position.
    pub fn at(mut self, line: u64, column: u64) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// The `{line, message}` view used in failure reports.
    pub fn entry(&self) -> ErrorEntry {
        ErrorEntry {
            line: self.line,
            message: self.message.clone(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "{source}:")?;
            if let Some(line) = self.line {
                write!(f, "{line}:")?;
            }
            f.write_str(" ")?;
        }
        match &self.code {
            Some(code) => write!(f, "{}[{code}]: {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// One row of a failure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    pub line: Option<u64>,
    pub message: String,
}

/// Collects diagnostics reported during one build.
///
/// Toolchains may report from several worker threads at once.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one diagnostic.
    pub fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.lock().push(diagnostic);
    }

    /// Record several diagnostics in order.
    pub fn extend(&self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.lock().extend(diagnostics);
    }

    pub fn len(&self) -> usize {
        self.diagnostics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Everything reported so far, in arrival order.
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().clone()
    }

    /// Partition everything reported so far.
    pub fn classify(&self) -> Classified {
        Classified::from_diagnostics(self.snapshot())
    }
}

/// Diagnostics split into warnings and errors, each in arrival order.
#[derive(Debug, Clone, Default)]
pub struct Classified {
    pub warnings: Vec<Diagnostic>,
    pub errors: Vec<Diagnostic>,
}

impl Classified {
    /// Partition a diagnostic stream.
    pub fn from_diagnostics(diagnostics: impl IntoIterator<Item = Diagnostic>) -> Self {
        let (warnings, errors) = diagnostics
            .into_iter()
            .partition(|diagnostic| diagnostic.kind.is_warning());
        Self { warnings, errors }
    }

    /// A build succeeded exactly when no error was reported.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Emit each warning as a debug event.
    pub fn log_warnings(&self) {
        for warning in &self.warnings {
            tracing::debug!("{}", warning);
        }
    }
}

/// Rustc JSON diagnostic format.
#[derive(Debug, Deserialize)]
pub struct RustcDiagnostic {
    pub message: String,
    pub code: Option<RustcCode>,
    pub level: String,
    pub spans: Vec<RustcSpan>,
    pub rendered: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RustcCode {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct RustcSpan {
    pub line_start: u64,
    pub column_start: u64,
    pub is_primary: bool,
}

/// Parse rustc `--error-format=json` output into diagnostics for `unit`.
///
/// Lines that are not diagnostics are skipped.
pub fn parse_rustc_output(unit: &str, json_output: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for line in json_output.lines() {
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<RustcDiagnostic>(line) {
            Ok(raw) if is_summary(&raw) => {}
            Ok(raw) => diagnostics.push(map_rustc_diagnostic(unit, raw)),
            Err(e) => {
                tracing::debug!(
                    "Failed to parse rustc JSON: {} (line: {})",
                    e,
                    line.chars().take(100).collect::<String>()
                );
            }
        }
    }

    diagnostics
}

/// rustc's closing tallies, e.g. `aborting due to 2 previous errors`.
fn is_summary(raw: &RustcDiagnostic) -> bool {
    raw.spans.is_empty()
        && (raw.message.starts_with("aborting due to")
            || (raw.level == "warning" && raw.message.ends_with(" emitted")))
}

fn map_rustc_diagnostic(unit: &str, raw: RustcDiagnostic) -> Diagnostic {
    let mut diagnostic = Diagnostic::new(DiagnosticKind::from_rustc_level(&raw.level), raw.message)
        .with_source(unit);

    if let Some(span) = raw.spans.iter().find(|s| s.is_primary) {
        diagnostic = diagnostic.at(span.line_start, span.column_start);
    }
    if let Some(code) = raw.code {
        diagnostic = diagnostic.with_code(code.code);
    }
    diagnostic
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_by_kind() {
        let classified = Classified::from_diagnostics(vec![
            Diagnostic::note("n"),
            Diagnostic::error("e1"),
            Diagnostic::warning("w"),
            Diagnostic::new(DiagnosticKind::MandatoryWarning, "mw"),
            Diagnostic::new(DiagnosticKind::Other("weird".into()), "o"),
            Diagnostic::error("e2"),
        ]);

        let warnings: Vec<_> = classified.warnings.iter().map(|d| d.message.as_str()).collect();
        let errors: Vec<_> = classified.errors.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(warnings, vec!["n", "w", "mw"]);
        assert_eq!(errors, vec!["e1", "o", "e2"]);
        assert!(!classified.is_success());
    }

    #[test]
    fn test_warnings_only_is_success() {
        let sink = DiagnosticSink::new();
        sink.report(Diagnostic::warning("unused variable"));
        sink.report(Diagnostic::note("defined here"));

        let classified = sink.classify();
        assert!(classified.is_success());
        assert_eq!(classified.warnings.len(), 2);
    }

    #[test]
    fn test_parse_rustc_json() {
        let json = concat!(
            r#"{"message":"expected type, found `42`","code":{"code":"E0573"},"level":"error","spans":[{"file_name":"<anon>","line_start":5,"line_end":5,"column_start":10,"column_end":12,"is_primary":true,"label":"expected type"}],"rendered":"error[E0573]: expected type, found `42`"}"#,
            "\n",
            "not json\n",
            r#"{"message":"unused variable: `x`","code":null,"level":"warning","spans":[],"rendered":null}"#,
            "\n",
            r#"{"message":"something new","code":null,"level":"mystery","spans":[],"rendered":null}"#,
        );

        let diagnostics = parse_rustc_output("app.A", json);
        assert_eq!(diagnostics.len(), 3);

        assert_eq!(diagnostics[0].kind, DiagnosticKind::Error);
        assert_eq!(diagnostics[0].code.as_deref(), Some("E0573"));
        assert_eq!(diagnostics[0].line, Some(5));
        assert_eq!(diagnostics[0].column, Some(10));
        assert_eq!(diagnostics[0].source.as_deref(), Some("app.A"));

        assert_eq!(diagnostics[1].kind, DiagnosticKind::Warning);
        assert_eq!(diagnostics[1].line, None);

        assert_eq!(diagnostics[2].kind, DiagnosticKind::Other("mystery".into()));
        assert!(!diagnostics[2].kind.is_warning());
    }

    #[test]
    fn test_parse_skips_summaries() {
        let json = concat!(
            r#"{"message":"expected pattern, found `}`","code":null,"level":"error","spans":[{"file_name":"<anon>","line_start":1,"line_end":1,"column_start":30,"column_end":31,"is_primary":true,"label":null}],"rendered":null}"#,
            "\n",
            r#"{"message":"aborting due to 1 previous error","code":null,"level":"error","spans":[],"rendered":"error: aborting due to 1 previous error"}"#,
            "\n",
            r#"{"message":"1 warning emitted","code":null,"level":"warning","spans":[],"rendered":null}"#,
        );

        let diagnostics = parse_rustc_output("app.A", json);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].line, Some(1));

        let classified = Classified::from_diagnostics(diagnostics);
        assert_eq!(classified.errors.len(), 1);
        assert!(classified.warnings.is_empty());
    }

    #[test]
    fn test_diagnostic_display() {
        let diagnostic = Diagnostic::error("mismatched types")
            .with_source("app.A")
            .at(3, 7)
            .with_code("E0308");
        assert_eq!(
            diagnostic.to_string(),
            "app.A:3: error[E0308]: mismatched types"
        );
        assert_eq!(
            diagnostic.entry(),
            ErrorEntry {
                line: Some(3),
                message: "mismatched types".into()
            }
        );
    }
}
