//! Template validation - structural schema checks plus policy rules.

pub mod findings;
pub mod rules;
pub mod schema;

use miette::Diagnostic;
use thiserror::Error;

use crate::core::Node;

pub use findings::{Finding, Severity};
pub use rules::{default_rules, PolicyRule};

/// A template with at least one error-severity finding.
#[derive(Debug, Error, Diagnostic)]
#[error("template failed validation with {error_count} error(s)")]
#[diagnostic(code(stackform::validate::failed))]
pub struct ValidationError {
    pub error_count: usize,
    /// Every finding, not just the errors, so callers can still print the
    /// full report.
    pub findings: Vec<Finding>,
}

/// Run every structural check and every default policy rule over a tree.
///
/// Pure and deterministic: the same tree always yields the same findings in
/// the same order (sorted by document path, then severity, then rule id).
pub fn validate(tree: &Node) -> Vec<Finding> {
    let mut findings = schema::check(tree);
    for rule in default_rules() {
        findings.extend(rule.check(tree));
    }
    findings.sort();
    findings
}

/// Validate and fail if any finding is error severity.
pub fn ensure_valid(tree: &Node) -> Result<Vec<Finding>, ValidationError> {
    let findings = validate(tree);
    let error_count = findings
        .iter()
        .filter(|f| f.severity == Severity::Error)
        .count();
    if error_count > 0 {
        return Err(ValidationError {
            error_count,
            findings,
        });
    }
    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DocFormat;
    use crate::normalize;

    fn tree(yaml: &str) -> Node {
        normalize::parse(yaml, Some(DocFormat::Yaml)).unwrap()
    }

    #[test]
    fn test_clean_template_has_no_errors() {
        let doc = tree(concat!(
            "Description: network baseline\n",
            "Resources:\n",
            "  Vpc:\n",
            "    Type: AWS::EC2::VPC\n",
            "    Properties:\n",
            "      CidrBlock: 10.0.0.0/16\n",
        ));
        let findings = ensure_valid(&doc).unwrap();
        assert!(findings.iter().all(|f| f.severity != Severity::Error));
    }

    #[test]
    fn test_error_findings_fail_validation() {
        let doc = tree("Description: broken\nResources:\n  'bad id!':\n    Type: AWS::S3::Bucket\n");
        let err = ensure_valid(&doc).unwrap_err();
        assert!(err.error_count >= 1);
        assert!(!err.findings.is_empty());
    }

    #[test]
    fn test_findings_are_sorted_and_stable() {
        let doc = tree(concat!(
            "Resources:\n",
            "  Zed:\n",
            "    Type: AWS::S3::Bucket\n",
            "  Alpha:\n",
            "    Type: Not-A-Type\n",
        ));
        let first = validate(&doc);
        let second = validate(&doc);
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(first, sorted);
    }

    #[test]
    fn test_validator_does_not_mutate_tree() {
        let doc = tree("Resources:\n  B:\n    Type: AWS::S3::Bucket\n");
        let before = doc.clone();
        let _ = validate(&doc);
        assert_eq!(doc, before);
    }

    #[test]
    fn test_schema_and_policy_findings_both_present() {
        let doc = tree(concat!(
            "Resources:\n",
            "  B:\n",
            "    Type: AWS::S3::Bucket\n",
            "    Properties:\n",
            "      BucketName: x\n",
        ));
        let findings = validate(&doc);
        // PL101 missing description, PL103 unversioned bucket
        assert!(findings.iter().any(|f| f.rule == "PL101"));
        assert!(findings.iter().any(|f| f.rule == "PL103"));
    }
}
