//! Accumulated errors and warnings for one analysis run.
//!
//! Per-item failures (one route, one class) are recorded here instead of aborting the run.
//! The collector is mutable while the pipeline runs; [`DiagnosticCollector::finish`] turns it
//! into an immutable [`DiagnosticReport`].

use crate::error::Error;
use indexmap::IndexMap;
use log::{error, warn};
use serde::{Deserialize, Serialize};

/// Severity of a diagnostic entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single recorded problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub severity: Severity,
    /// Where the problem happened (e.g. `route:GET api/users`, `request:App\Http\Requests\X`)
    pub context: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, serde_json::Value>,
    /// Optional chain of underlying causes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

/// Finalized diagnostic report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub errors: Vec<ErrorEntry>,
    pub warnings: Vec<ErrorEntry>,
}

impl DiagnosticReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    pub fn total(&self) -> usize {
        self.errors.len() + self.warnings.len()
    }
}

/// Mutable accumulator used during a run
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    entries: Vec<ErrorEntry>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error with free-form metadata
    pub fn error(
        &mut self,
        context: impl Into<String>,
        message: impl Into<String>,
        metadata: IndexMap<String, serde_json::Value>,
    ) {
        let entry = ErrorEntry {
            severity: Severity::Error,
            context: context.into(),
            message: message.into(),
            metadata,
            trace: None,
        };
        error!("[{}] {}", entry.context, entry.message);
        self.entries.push(entry);
    }

    /// Record a warning
    pub fn warning(&mut self, context: impl Into<String>, message: impl Into<String>) {
        let entry = ErrorEntry {
            severity: Severity::Warning,
            context: context.into(),
            message: message.into(),
            metadata: IndexMap::new(),
            trace: None,
        };
        warn!("[{}] {}", entry.context, entry.message);
        self.entries.push(entry);
    }

    /// Record a crate error, picking the severity from its kind.
    ///
    /// Parse failures and missing classes are expected in real projects and are kept as
    /// warnings; everything else is an error.
    pub fn record(&mut self, context: impl Into<String>, err: &Error) {
        let mut metadata = IndexMap::new();
        metadata.insert("kind".to_string(), serde_json::Value::from(err.kind()));
        match err {
            Error::ParseFailure { .. } | Error::MissingClass(_) | Error::CacheCorruption { .. } => {
                let context = context.into();
                warn!("[{}] {}", context, err);
                self.entries.push(ErrorEntry {
                    severity: Severity::Warning,
                    context,
                    message: err.to_string(),
                    metadata,
                    trace: None,
                });
            }
            _ => self.error(context, err.to_string(), metadata),
        }
    }

    /// Record an `anyhow` error, keeping its cause chain as the trace
    pub fn record_anyhow(&mut self, context: impl Into<String>, err: &anyhow::Error) {
        let trace: Vec<String> = err.chain().skip(1).map(|c| c.to_string()).collect();
        let context = context.into();
        error!("[{}] {}", context, err);
        self.entries.push(ErrorEntry {
            severity: Severity::Error,
            context,
            message: err.to_string(),
            metadata: IndexMap::new(),
            trace: if trace.is_empty() {
                None
            } else {
                Some(trace.join("\n"))
            },
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freeze the collected entries into a report
    pub fn finish(self) -> DiagnosticReport {
        let (errors, warnings) = self
            .entries
            .into_iter()
            .partition(|e| e.severity == Severity::Error);
        DiagnosticReport { errors, warnings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use std::path::PathBuf;

    #[test]
    fn test_record_splits_by_severity() {
        let mut collector = DiagnosticCollector::new();
        collector.record(
            "request:App\\Http\\Requests\\Broken",
            &Error::ParseFailure {
                file: PathBuf::from("Broken.php"),
                message: "unexpected token".to_string(),
            },
        );
        collector.record(
            "routes",
            &Error::RouteFileLoad {
                file: PathBuf::from("extra.json"),
                message: "missing".to_string(),
            },
        );
        collector.warning("route:GET api/ping", "no controller");

        let report = collector.finish();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.warnings.len(), 2);
        assert_eq!(report.errors[0].metadata["kind"], "route_file_load");
        assert!(!report.is_clean());
        assert_eq!(report.total(), 3);
    }

    #[test]
    fn test_anyhow_cause_chain_becomes_trace() {
        let inner: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file is gone",
        ));
        let err = inner.context("Failed to analyze controller").unwrap_err();

        let mut collector = DiagnosticCollector::new();
        collector.record_anyhow("route:POST api/users", &err);
        let report = collector.finish();

        assert_eq!(report.errors[0].message, "Failed to analyze controller");
        assert_eq!(report.errors[0].trace.as_deref(), Some("file is gone"));
    }

    #[test]
    fn test_report_roundtrip() {
        let mut collector = DiagnosticCollector::new();
        collector.warning("cache", "entry unreadable");
        let report = collector.finish();

        let json = serde_json::to_string(&report).unwrap();
        let back: DiagnosticReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report, back);
    }
}
