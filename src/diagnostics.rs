//! Diagnostics sink.
//!
//! Everything short of a configuration failure is reported here and the
//! loader carries on, so a taxonomy with local defects still yields a
//! best-effort model plus a complete issue report.

use compact_str::CompactString;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Error taxonomy of DTS resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed document or missing mandatory attribute.
    Structural,
    /// Locator, arc or import pointing at a missing document or id.
    Reference,
    /// XBRL / XDT rule violation.
    Conformance,
    /// Unusable entry point.
    Configuration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: ErrorKind,
    pub code: CompactString,
    pub message: String,
    pub fields: Vec<(CompactString, String)>,
}

impl Diagnostic {
    pub fn new(severity: Severity, kind: ErrorKind, code: &str, message: impl Into<String>) -> Self {
        Self {
            severity,
            kind,
            code: CompactString::from(code),
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn error(kind: ErrorKind, code: &str, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, kind, code, message)
    }

    pub fn warning(kind: ErrorKind, code: &str, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, kind, code, message)
    }

    pub fn with_field(mut self, name: &str, value: impl ToString) -> Self {
        self.fields.push((CompactString::from(name), value.to_string()));
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        for (name, value) in &self.fields {
            write!(f, " {}={}", name, value)?;
        }
        Ok(())
    }
}

/// Fire-and-forget diagnostics sink.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        emit(&diagnostic);
    }
}

fn emit(diagnostic: &Diagnostic) {
    match diagnostic.severity {
        Severity::Info => tracing::info!(code = %diagnostic.code, "{}", diagnostic),
        Severity::Warning => tracing::warn!(code = %diagnostic.code, "{}", diagnostic),
        Severity::Error => tracing::error!(code = %diagnostic.code, "{}", diagnostic),
    }
}

/// Accumulates diagnostics for later inspection (and still traces them).
#[derive(Debug, Default)]
pub struct CollectingSink {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().clone()
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.diagnostics.lock().iter().any(|d| d.code == code)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .lock()
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    pub fn clear(&self) {
        self.diagnostics.lock().clear();
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diagnostic: Diagnostic) {
        emit(&diagnostic);
        self.diagnostics.lock().push(diagnostic);
    }
}
