//! Validation findings.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

/// Severity of a finding. Only `Error` blocks downstream stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// One validation result: rule, severity, document path, message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub rule: String,
    pub severity: Severity,
    /// Dotted path into the document tree, e.g. `Resources.Vpc.Type`.
    pub path: String,
    pub message: String,
}

impl Finding {
    pub fn new(
        rule: impl Into<String>,
        severity: Severity,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Finding {
            rule: rule.into(),
            severity,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn error(rule: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        Finding::new(rule, Severity::Error, path, message)
    }

    pub fn warning(
        rule: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Finding::new(rule, Severity::Warning, path, message)
    }

    pub fn info(rule: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        Finding::new(rule, Severity::Info, path, message)
    }
}

/// Deterministic output ordering: document path first, then severity.
impl PartialOrd for Finding {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Finding {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path
            .cmp(&other.path)
            .then(self.severity.cmp(&other.severity))
            .then(self.rule.cmp(&other.rule))
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: [{}] {}: {}",
            self.severity, self.rule, self.path, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_is_path_then_severity() {
        let mut findings = vec![
            Finding::warning("PL101", "Resources.B", "w"),
            Finding::error("SF101", "Resources.B", "e"),
            Finding::info("PL102", "Resources.A", "i"),
        ];
        findings.sort();

        assert_eq!(findings[0].path, "Resources.A");
        assert_eq!(findings[1].severity, Severity::Error);
        assert_eq!(findings[2].severity, Severity::Warning);
    }

    #[test]
    fn test_display() {
        let finding = Finding::error("SF102", "Resources.Vpc.Type", "malformed type");
        assert_eq!(
            finding.to_string(),
            "error: [SF102] Resources.Vpc.Type: malformed type"
        );
    }
}
