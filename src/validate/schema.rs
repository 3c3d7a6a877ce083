//! Structural schema conformance checks.
//!
//! Rule ids `SF1xx`. These are the class of findings whose `error` severity
//! blocks downstream application to the backend: missing/empty `Resources`,
//! malformed resource type names, property shapes that contradict the
//! declared resource type.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::{Mapping, Node};

use super::findings::{Finding, Severity};

/// Top-level sections a template may carry.
const KNOWN_SECTIONS: &[&str] = &[
    "AWSTemplateFormatVersion",
    "Description",
    "Metadata",
    "Parameters",
    "Mappings",
    "Conditions",
    "Outputs",
    "Resources",
];

static RESOURCE_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9]+::[A-Za-z0-9]+::[A-Za-z0-9]+|Custom::[A-Za-z0-9]+)$").unwrap()
});

static LOGICAL_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap());

/// Expected shape of a resource property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Str,
    Bool,
    Number,
    List,
    Map,
}

impl Shape {
    fn name(self) -> &'static str {
        match self {
            Shape::Str => "string",
            Shape::Bool => "boolean",
            Shape::Number => "number",
            Shape::List => "list",
            Shape::Map => "mapping",
        }
    }

    fn matches(self, node: &Node) -> bool {
        // Intrinsic calls resolve at apply time and satisfy any shape.
        if is_intrinsic(node) {
            return true;
        }
        match self {
            Shape::Str => matches!(node, Node::String(_)),
            Shape::Bool => matches!(node, Node::Bool(_)),
            Shape::Number => matches!(node, Node::Int(_) | Node::Float(_)),
            Shape::List => matches!(node, Node::Sequence(_)),
            Shape::Map => matches!(node, Node::Mapping(_)),
        }
    }
}

/// A mapping whose single key is an intrinsic function call.
fn is_intrinsic(node: &Node) -> bool {
    node.as_mapping()
        .filter(|m| m.len() == 1)
        .and_then(|m| m.keys().next())
        .is_some_and(|k| k == "Ref" || k.starts_with("Fn::"))
}

/// Built-in property table for common resource types. Types outside the
/// table only get the generic structural checks.
struct TypeSchema {
    type_name: &'static str,
    required: &'static [(&'static str, Shape)],
    optional: &'static [(&'static str, Shape)],
}

const TYPE_SCHEMAS: &[TypeSchema] = &[
    TypeSchema {
        type_name: "AWS::S3::Bucket",
        required: &[],
        optional: &[
            ("BucketName", Shape::Str),
            ("VersioningConfiguration", Shape::Map),
            ("PublicAccessBlockConfiguration", Shape::Map),
            ("BucketEncryption", Shape::Map),
            ("Tags", Shape::List),
        ],
    },
    TypeSchema {
        type_name: "AWS::EC2::VPC",
        required: &[("CidrBlock", Shape::Str)],
        optional: &[
            ("EnableDnsSupport", Shape::Bool),
            ("EnableDnsHostnames", Shape::Bool),
            ("InstanceTenancy", Shape::Str),
            ("Tags", Shape::List),
        ],
    },
    TypeSchema {
        type_name: "AWS::EC2::Subnet",
        required: &[("VpcId", Shape::Str), ("CidrBlock", Shape::Str)],
        optional: &[
            ("AvailabilityZone", Shape::Str),
            ("MapPublicIpOnLaunch", Shape::Bool),
            ("Tags", Shape::List),
        ],
    },
    TypeSchema {
        type_name: "AWS::EC2::SecurityGroup",
        required: &[("GroupDescription", Shape::Str)],
        optional: &[
            ("VpcId", Shape::Str),
            ("SecurityGroupIngress", Shape::List),
            ("SecurityGroupEgress", Shape::List),
            ("Tags", Shape::List),
        ],
    },
    TypeSchema {
        type_name: "AWS::IAM::Role",
        required: &[("AssumeRolePolicyDocument", Shape::Map)],
        optional: &[
            ("RoleName", Shape::Str),
            ("Policies", Shape::List),
            ("ManagedPolicyArns", Shape::List),
            ("Tags", Shape::List),
        ],
    },
    TypeSchema {
        type_name: "AWS::Lambda::Function",
        required: &[("Code", Shape::Map), ("Role", Shape::Str)],
        optional: &[
            ("FunctionName", Shape::Str),
            ("Handler", Shape::Str),
            ("Runtime", Shape::Str),
            ("MemorySize", Shape::Number),
            ("Timeout", Shape::Number),
            ("Environment", Shape::Map),
            ("Tags", Shape::List),
        ],
    },
    TypeSchema {
        type_name: "AWS::SQS::Queue",
        required: &[],
        optional: &[
            ("QueueName", Shape::Str),
            ("VisibilityTimeout", Shape::Number),
            ("FifoQueue", Shape::Bool),
            ("Tags", Shape::List),
        ],
    },
    TypeSchema {
        type_name: "AWS::SNS::Topic",
        required: &[],
        optional: &[
            ("TopicName", Shape::Str),
            ("Subscription", Shape::List),
            ("Tags", Shape::List),
        ],
    },
];

fn schema_for(type_name: &str) -> Option<&'static TypeSchema> {
    TYPE_SCHEMAS.iter().find(|s| s.type_name == type_name)
}

/// Resource types with a property schema. This is also the catalog the
/// simulated backend accepts.
pub fn known_types() -> impl Iterator<Item = &'static str> {
    TYPE_SCHEMAS.iter().map(|s| s.type_name)
}

/// Run all structural checks over a document tree.
pub fn check(tree: &Node) -> Vec<Finding> {
    let mut findings = Vec::new();

    let root = match tree.as_mapping() {
        Some(root) => root,
        None => {
            findings.push(Finding::error(
                "SF100",
                "",
                format!("template root must be a mapping, got {}", tree.type_name()),
            ));
            return findings;
        }
    };

    for key in root.keys() {
        if !KNOWN_SECTIONS.contains(&key) {
            findings.push(Finding::warning(
                "SF104",
                key,
                format!("unknown top-level section `{}`", key),
            ));
        }
    }

    let resources = match root.get("Resources") {
        Some(Node::Mapping(resources)) if !resources.is_empty() => resources,
        Some(Node::Mapping(_)) => {
            findings.push(Finding::error(
                "SF101",
                "Resources",
                "`Resources` must declare at least one resource",
            ));
            return findings;
        }
        Some(other) => {
            findings.push(Finding::error(
                "SF101",
                "Resources",
                format!("`Resources` must be a mapping, got {}", other.type_name()),
            ));
            return findings;
        }
        None => {
            findings.push(Finding::error(
                "SF101",
                "",
                "missing required top-level section `Resources`",
            ));
            return findings;
        }
    };

    for (logical_id, resource) in resources.iter() {
        check_resource(logical_id, resource, &mut findings);
    }

    findings
}

fn check_resource(logical_id: &str, resource: &Node, findings: &mut Vec<Finding>) {
    let path = format!("Resources.{}", logical_id);

    if !LOGICAL_ID_RE.is_match(logical_id) {
        findings.push(Finding::error(
            "SF102",
            &path,
            format!("logical id `{}` must be alphanumeric", logical_id),
        ));
    }

    let body = match resource.as_mapping() {
        Some(body) => body,
        None => {
            findings.push(Finding::error(
                "SF103",
                &path,
                format!("resource must be a mapping, got {}", resource.type_name()),
            ));
            return;
        }
    };

    let type_name = match body.get("Type") {
        Some(Node::String(t)) => t.as_str(),
        Some(other) => {
            findings.push(Finding::error(
                "SF103",
                format!("{}.Type", path),
                format!("`Type` must be a string, got {}", other.type_name()),
            ));
            return;
        }
        None => {
            findings.push(Finding::error(
                "SF103",
                &path,
                "resource is missing required `Type`",
            ));
            return;
        }
    };

    if !RESOURCE_TYPE_RE.is_match(type_name) {
        findings.push(Finding::error(
            "SF103",
            format!("{}.Type", path),
            format!(
                "malformed resource type `{}` (expected `Vendor::Service::Resource`)",
                type_name
            ),
        ));
        return;
    }

    let properties = match body.get("Properties") {
        Some(Node::Mapping(props)) => Some(props),
        Some(other) => {
            findings.push(Finding::error(
                "SF105",
                format!("{}.Properties", path),
                format!("`Properties` must be a mapping, got {}", other.type_name()),
            ));
            None
        }
        None => None,
    };

    if let Some(schema) = schema_for(type_name) {
        check_properties(&path, schema, properties, findings);
    }
}

fn check_properties(
    path: &str,
    schema: &TypeSchema,
    properties: Option<&Mapping>,
    findings: &mut Vec<Finding>,
) {
    let empty = Mapping::new();
    let properties = properties.unwrap_or(&empty);

    for (name, shape) in schema.required {
        match properties.get(name) {
            Some(value) if !shape.matches(value) => {
                findings.push(Finding::error(
                    "SF107",
                    format!("{}.Properties.{}", path, name),
                    format!(
                        "`{}` expects a {}, got {}",
                        name,
                        shape.name(),
                        value.type_name()
                    ),
                ));
            }
            Some(_) => {}
            None => {
                findings.push(Finding::error(
                    "SF106",
                    format!("{}.Properties", path),
                    format!(
                        "`{}` requires property `{}`",
                        schema.type_name, name
                    ),
                ));
            }
        }
    }

    for (name, value) in properties.iter() {
        let declared = schema
            .required
            .iter()
            .chain(schema.optional)
            .find(|(n, _)| *n == name);

        match declared {
            Some((_, shape)) if !shape.matches(value) => {
                findings.push(Finding::error(
                    "SF107",
                    format!("{}.Properties.{}", path, name),
                    format!(
                        "`{}` expects a {}, got {}",
                        name,
                        shape.name(),
                        value.type_name()
                    ),
                ));
            }
            Some(_) => {}
            None => {
                findings.push(Finding::new(
                    "SF108",
                    Severity::Warning,
                    format!("{}.Properties.{}", path, name),
                    format!(
                        "property `{}` is not known for `{}`",
                        name, schema.type_name
                    ),
                ));
            }
        }
    }
}
