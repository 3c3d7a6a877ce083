//! Policy and best-practice rules.
//!
//! Rule ids `PL1xx`. Each rule is a pure function from the document tree to
//! zero or more findings; the set is a closed enum held in an explicit
//! ordered registry, so adding a rule is adding a variant, never runtime
//! discovery.

use crate::core::{Mapping, Node};

use super::findings::Finding;

/// Soft ceiling before a template starts looking like it should be split.
const RESOURCE_SOFT_LIMIT: usize = 200;

/// Property names whose literal string values look like embedded secrets.
const SECRET_PROPERTY_HINTS: &[&str] = &["Password", "Secret", "Token", "AccessKey"];

/// One registrable policy rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyRule {
    /// Template should carry a `Description`.
    RequireDescription,
    /// Warn when a template declares an outsized number of resources.
    ResourceCountLimit { max: usize },
    /// S3 buckets should enable versioning.
    BucketVersioning,
    /// IAM policies should not use `*` actions or resources.
    IamWildcard,
    /// Security groups should not open ingress to the world.
    OpenIngress,
    /// Credential-looking literals do not belong in templates.
    HardcodedSecret,
}

impl PolicyRule {
    pub fn id(&self) -> &'static str {
        match self {
            PolicyRule::RequireDescription => "PL101",
            PolicyRule::ResourceCountLimit { .. } => "PL102",
            PolicyRule::BucketVersioning => "PL103",
            PolicyRule::IamWildcard => "PL104",
            PolicyRule::OpenIngress => "PL105",
            PolicyRule::HardcodedSecret => "PL106",
        }
    }

    /// Evaluate the rule. Pure: reads the tree, performs no I/O.
    pub fn check(&self, tree: &Node) -> Vec<Finding> {
        let root = match tree.as_mapping() {
            Some(root) => root,
            None => return Vec::new(),
        };

        match self {
            PolicyRule::RequireDescription => check_description(self.id(), root),
            PolicyRule::ResourceCountLimit { max } => check_resource_count(self.id(), root, *max),
            PolicyRule::BucketVersioning => check_bucket_versioning(self.id(), root),
            PolicyRule::IamWildcard => check_iam_wildcard(self.id(), root),
            PolicyRule::OpenIngress => check_open_ingress(self.id(), root),
            PolicyRule::HardcodedSecret => check_hardcoded_secret(self.id(), root),
        }
    }
}

/// The default rule registry, in evaluation order.
pub fn default_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule::RequireDescription,
        PolicyRule::ResourceCountLimit {
            max: RESOURCE_SOFT_LIMIT,
        },
        PolicyRule::BucketVersioning,
        PolicyRule::IamWildcard,
        PolicyRule::OpenIngress,
        PolicyRule::HardcodedSecret,
    ]
}

fn resources(root: &Mapping) -> impl Iterator<Item = (&str, &Mapping)> {
    root.get("Resources")
        .and_then(Node::as_mapping)
        .into_iter()
        .flat_map(|m| m.iter())
        .filter_map(|(id, body)| body.as_mapping().map(|b| (id, b)))
}

fn resource_type<'a>(body: &'a Mapping) -> Option<&'a str> {
    body.get("Type").and_then(Node::as_str)
}

fn properties<'a>(body: &'a Mapping) -> Option<&'a Mapping> {
    body.get("Properties").and_then(Node::as_mapping)
}

fn check_description(rule: &str, root: &Mapping) -> Vec<Finding> {
    match root.get("Description").and_then(Node::as_str) {
        Some(desc) if !desc.trim().is_empty() => Vec::new(),
        _ => vec![Finding::info(
            rule,
            "",
            "template has no `Description`",
        )],
    }
}

fn check_resource_count(rule: &str, root: &Mapping, max: usize) -> Vec<Finding> {
    let count = resources(root).count();
    if count > max {
        vec![Finding::warning(
            rule,
            "Resources",
            format!("template declares {} resources (soft limit {})", count, max),
        )]
    } else {
        Vec::new()
    }
}

fn check_bucket_versioning(rule: &str, root: &Mapping) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (id, body) in resources(root) {
        if resource_type(body) != Some("AWS::S3::Bucket") {
            continue;
        }
        let versioned = properties(body)
            .and_then(|p| p.get("VersioningConfiguration"))
            .is_some();
        if !versioned {
            findings.push(Finding::warning(
                rule,
                format!("Resources.{}", id),
                "S3 bucket has no `VersioningConfiguration`",
            ));
        }
    }
    findings
}

fn check_iam_wildcard(rule: &str, root: &Mapping) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (id, body) in resources(root) {
        let type_name = match resource_type(body) {
            Some(t) if t.starts_with("AWS::IAM::") => t,
            _ => continue,
        };
        let path = format!("Resources.{}", id);
        if let Some(props) = properties(body) {
            if tree_has_wildcard_statement(props) {
                findings.push(Finding::warning(
                    rule,
                    path,
                    format!("`{}` grants `*` in an action or resource", type_name),
                ));
            }
        }
    }
    findings
}

/// Walk any nested policy document looking for `Action: "*"` or
/// `Resource: "*"` (directly or inside a list).
fn tree_has_wildcard_statement(node: &Mapping) -> bool {
    fn is_star(value: &Node) -> bool {
        match value {
            Node::String(s) => s == "*",
            Node::Sequence(items) => items.iter().any(is_star),
            _ => false,
        }
    }

    for (key, value) in node.iter() {
        if (key == "Action" || key == "Resource") && is_star(value) {
            return true;
        }
        match value {
            Node::Mapping(inner) => {
                if tree_has_wildcard_statement(inner) {
                    return true;
                }
            }
            Node::Sequence(items) => {
                for item in items {
                    if let Some(inner) = item.as_mapping() {
                        if tree_has_wildcard_statement(inner) {
                            return true;
                        }
                    }
                }
            }
            _ => {}
        }
    }
    false
}

fn check_open_ingress(rule: &str, root: &Mapping) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (id, body) in resources(root) {
        if resource_type(body) != Some("AWS::EC2::SecurityGroup") {
            continue;
        }
        let ingress = properties(body)
            .and_then(|p| p.get("SecurityGroupIngress"))
            .and_then(Node::as_sequence);
        let Some(ingress) = ingress else { continue };

        for (index, entry) in ingress.iter().enumerate() {
            let open = entry
                .as_mapping()
                .and_then(|m| m.get("CidrIp"))
                .and_then(Node::as_str)
                == Some("0.0.0.0/0");
            if open {
                findings.push(Finding::warning(
                    rule,
                    format!("Resources.{}.Properties.SecurityGroupIngress[{}]", id, index),
                    "ingress rule is open to 0.0.0.0/0",
                ));
            }
        }
    }
    findings
}

fn check_hardcoded_secret(rule: &str, root: &Mapping) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (id, body) in resources(root) {
        let Some(props) = properties(body) else {
            continue;
        };
        walk_for_secrets(
            props,
            &format!("Resources.{}.Properties", id),
            rule,
            &mut findings,
        );
    }
    findings
}

fn walk_for_secrets(map: &Mapping, path: &str, rule: &str, findings: &mut Vec<Finding>) {
    for (key, value) in map.iter() {
        let child_path = format!("{}.{}", path, key);
        match value {
            Node::String(s) => {
                let suspicious = SECRET_PROPERTY_HINTS.iter().any(|hint| key.contains(hint));
                if suspicious && !s.is_empty() && !s.starts_with("{{resolve:") {
                    findings.push(Finding::warning(
                        rule,
                        child_path,
                        format!("`{}` looks like a hardcoded credential", key),
                    ));
                }
            }
            Node::Mapping(inner) => walk_for_secrets(inner, &child_path, rule, findings),
            Node::Sequence(items) => {
                for (index, item) in items.iter().enumerate() {
                    if let Some(inner) = item.as_mapping() {
                        walk_for_secrets(inner, &format!("{}[{}]", child_path, index), rule, findings);
                    }
                }
            }
            _ => {}
        }
    }
}
