//! The simulated cloud backend.

use std::collections::HashSet;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::core::{Mapping, Node};
use crate::util::hash::sha256_str;
use crate::validate::schema;

use super::graph::{SimulatedResource, SimulatedResourceGraph};
use super::ApplyError;

/// Pseudo-parameters every stack can reference without declaring them.
const PSEUDO_PARAMETERS: &[&str] = &[
    "AWS::AccountId",
    "AWS::NoValue",
    "AWS::Partition",
    "AWS::Region",
    "AWS::StackName",
    "AWS::URLSuffix",
];

/// An in-process stand-in for the provider's resource-management API.
///
/// Each instance is fully isolated: nothing is shared between two backends,
/// so concurrent test runs cannot observe each other's state. Applying the
/// same template to identically-configured backends yields identical graphs.
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    account_id: String,
    region: String,
    stack_name: String,
}

impl SimulatedBackend {
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        SimulatedBackend {
            account_id: account_id.into(),
            region: region.into(),
            stack_name: "test-stack".to_string(),
        }
    }

    pub fn with_stack_name(mut self, stack_name: impl Into<String>) -> Self {
        self.stack_name = stack_name.into();
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Apply a normalized template, creating every resource in dependency
    /// order, or reject it with the first failure. All-or-nothing: a
    /// rejection means no resources were created.
    pub fn apply(&self, tree: &Node) -> Result<SimulatedResourceGraph, ApplyError> {
        let root = tree.as_mapping().ok_or(ApplyError::NotATemplate)?;

        let resources = root
            .get("Resources")
            .and_then(Node::as_mapping)
            .filter(|m| !m.is_empty())
            .ok_or(ApplyError::NoResources)?;

        let parameters = declared_parameters(root);

        // First pass, declaration order: shape and type support. Duplicate
        // logical ids cannot occur here; the document tree rejects duplicate
        // mapping keys at parse.
        for (logical_id, body) in resources.iter() {
            let body = body.as_mapping().ok_or_else(|| ApplyError::MalformedResource {
                logical_id: logical_id.to_string(),
                message: "resource body must be a mapping".to_string(),
            })?;
            let type_name =
                body.get("Type")
                    .and_then(Node::as_str)
                    .ok_or_else(|| ApplyError::MalformedResource {
                        logical_id: logical_id.to_string(),
                        message: "missing `Type`".to_string(),
                    })?;
            if !self.supports(type_name) {
                return Err(ApplyError::UnsupportedType {
                    logical_id: logical_id.to_string(),
                    type_name: type_name.to_string(),
                });
            }
        }

        // Second pass: resolve every reference and build the dependency
        // graph. Edges point dependency -> dependent so a topological sort
        // yields creation order directly.
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut indices: Vec<(&str, NodeIndex)> = Vec::new();
        for (logical_id, _) in resources.iter() {
            let node = graph.add_node(logical_id);
            indices.push((logical_id, node));
        }
        let index_of = |id: &str| indices.iter().find(|(n, _)| *n == id).map(|(_, i)| *i);

        for (logical_id, body) in resources.iter() {
            let body = body.as_mapping().ok_or(ApplyError::NotATemplate)?;
            let from = index_of(logical_id).ok_or(ApplyError::NotATemplate)?;
            for target in reference_targets(body)? {
                if self.resolves_without_resource(&target, &parameters) {
                    continue;
                }
                let to = index_of(&target).ok_or_else(|| ApplyError::DanglingReference {
                    from: logical_id.to_string(),
                    target: target.clone(),
                })?;
                if !graph.contains_edge(to, from) {
                    graph.add_edge(to, from, ());
                }
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| ApplyError::Cycle {
            logical_id: graph[cycle.node_id()].to_string(),
        })?;

        let mut created = SimulatedResourceGraph::new();
        for node in order {
            let logical_id = graph[node];
            let body = resources
                .get(logical_id)
                .and_then(Node::as_mapping)
                .ok_or(ApplyError::NotATemplate)?;
            let type_name = body
                .get("Type")
                .and_then(Node::as_str)
                .ok_or(ApplyError::NotATemplate)?;

            let physical_id = self.physical_id(logical_id, type_name);
            debug!(logical_id, %physical_id, "created simulated resource");
            created.add_resource(SimulatedResource {
                logical_id: logical_id.to_string(),
                resource_type: type_name.to_string(),
                physical_id,
            });
        }

        // Edges once both endpoints exist.
        for (logical_id, node) in &indices {
            for dep in graph.neighbors_directed(*node, petgraph::Direction::Incoming) {
                created.add_dependency(logical_id, graph[dep]);
            }
        }

        Ok(created)
    }

    fn supports(&self, type_name: &str) -> bool {
        type_name.starts_with("Custom::") || schema::known_types().any(|t| t == type_name)
    }

    /// References that resolve without a resource edge: pseudo-parameters
    /// and parameters declared by the template.
    fn resolves_without_resource(&self, target: &str, parameters: &HashSet<String>) -> bool {
        PSEUDO_PARAMETERS.contains(&target) || parameters.contains(target)
    }

    /// Deterministic physical id: a function of the backend identity and the
    /// resource, never of wall-clock time or randomness.
    fn physical_id(&self, logical_id: &str, type_name: &str) -> String {
        let digest = sha256_str(&format!(
            "{}/{}/{}/{}/{}",
            self.account_id, self.region, self.stack_name, logical_id, type_name
        ));
        format!("{}-{}-{}", self.stack_name, logical_id.to_lowercase(), &digest[..8])
    }
}

fn declared_parameters(root: &Mapping) -> HashSet<String> {
    root.get("Parameters")
        .and_then(Node::as_mapping)
        .map(|m| m.keys().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Every reference a resource declares, in document order: `DependsOn`
/// (string or list), then `Ref` and `Fn::GetAtt` anywhere under `Properties`.
fn reference_targets(body: &Mapping) -> Result<Vec<String>, ApplyError> {
    let mut targets = Vec::new();

    if let Some(depends_on) = body.get("DependsOn") {
        match depends_on {
            Node::String(id) => targets.push(id.clone()),
            Node::Sequence(items) => {
                for item in items {
                    if let Some(id) = item.as_str() {
                        targets.push(id.to_string());
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(props) = body.get("Properties").and_then(Node::as_mapping) {
        collect_intrinsic_targets(props, &mut targets);
    }

    Ok(targets)
}

fn collect_intrinsic_targets(map: &Mapping, targets: &mut Vec<String>) {
    for (key, value) in map.iter() {
        match (key, value) {
            ("Ref", Node::String(target)) => targets.push(target.clone()),
            // "Resource.Attribute" shorthand
            ("Fn::GetAtt", Node::String(spec)) => {
                let resource = spec.split('.').next().unwrap_or(spec);
                targets.push(resource.to_string());
            }
            ("Fn::GetAtt", Node::Sequence(parts)) => {
                if let Some(resource) = parts.first().and_then(Node::as_str) {
                    targets.push(resource.to_string());
                }
            }
            ("Fn::Sub", Node::String(template)) => {
                collect_sub_targets(template, &[], targets);
            }
            // [template, { Var: value }] form; names bound by the local map
            // are substitutions, not resource references.
            ("Fn::Sub", Node::Sequence(parts)) => {
                if let Some(template) = parts.first().and_then(Node::as_str) {
                    let locals: Vec<&str> = parts
                        .get(1)
                        .and_then(Node::as_mapping)
                        .map(|m| m.keys().collect())
                        .unwrap_or_default();
                    collect_sub_targets(template, &locals, targets);
                }
                if let Some(vars) = parts.get(1).and_then(Node::as_mapping) {
                    collect_intrinsic_targets(vars, targets);
                }
            }
            (_, Node::Mapping(inner)) => collect_intrinsic_targets(inner, targets),
            (_, Node::Sequence(items)) => {
                for item in items {
                    if let Some(inner) = item.as_mapping() {
                        collect_intrinsic_targets(inner, targets);
                    }
                }
            }
            _ => {}
        }
    }
}

/// `${Name}` and `${Name.Attr}` tokens in a substitution string. `${!Name}`
/// is the literal escape and binds nothing.
fn collect_sub_targets(template: &str, locals: &[&str], targets: &mut Vec<String>) {
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else { break };
        let token = &after[..end];
        rest = &after[end + 1..];
        if token.starts_with('!') {
            continue;
        }
        let name = token.split('.').next().unwrap_or(token).trim();
        if !name.is_empty() && !locals.contains(&name) {
            targets.push(name.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DocFormat;
    use crate::normalize;

    fn tree(yaml: &str) -> Node {
        normalize::parse(yaml, Some(DocFormat::Yaml)).unwrap()
    }

    fn backend() -> SimulatedBackend {
        SimulatedBackend::new("123456789012", "us-east-1")
    }

    const NETWORK: &str = concat!(
        "Resources:\n",
        "  Vpc:\n",
        "    Type: AWS::EC2::VPC\n",
        "    Properties:\n",
        "      CidrBlock: 10.0.0.0/16\n",
        "  Subnet:\n",
        "    Type: AWS::EC2::Subnet\n",
        "    Properties:\n",
        "      VpcId:\n",
        "        Ref: Vpc\n",
        "      CidrBlock: 10.0.1.0/24\n",
    );

    #[test]
    fn test_apply_creates_resources_in_dependency_order() {
        let graph = backend().apply(&tree(NETWORK)).unwrap();
        assert_eq!(graph.len(), 2);

        let ids: Vec<&str> = graph.resources().map(|r| r.logical_id.as_str()).collect();
        let vpc = ids.iter().position(|&id| id == "Vpc").unwrap();
        let subnet = ids.iter().position(|&id| id == "Subnet").unwrap();
        assert!(vpc < subnet);
        assert_eq!(graph.dependencies_of("Subnet"), vec!["Vpc"]);
    }

    #[test]
    fn test_dangling_ref_names_the_missing_target() {
        let doc = tree(concat!(
            "Resources:\n",
            "  Subnet:\n",
            "    Type: AWS::EC2::Subnet\n",
            "    Properties:\n",
            "      VpcId:\n",
            "        Ref: NoSuchVpc\n",
            "      CidrBlock: 10.0.1.0/24\n",
        ));
        let err = backend().apply(&doc).unwrap_err();
        assert_eq!(
            err,
            ApplyError::DanglingReference {
                from: "Subnet".to_string(),
                target: "NoSuchVpc".to_string(),
            }
        );
    }

    #[test]
    fn test_dangling_depends_on_rejected() {
        let doc = tree(concat!(
            "Resources:\n",
            "  B:\n",
            "    Type: AWS::S3::Bucket\n",
            "    DependsOn: Missing\n",
        ));
        let err = backend().apply(&doc).unwrap_err();
        assert!(matches!(err, ApplyError::DanglingReference { target, .. } if target == "Missing"));
    }

    #[test]
    fn test_get_att_shorthand_creates_edge() {
        let doc = tree(concat!(
            "Resources:\n",
            "  Role:\n",
            "    Type: AWS::IAM::Role\n",
            "    Properties:\n",
            "      AssumeRolePolicyDocument: {}\n",
            "  Fn:\n",
            "    Type: AWS::Lambda::Function\n",
            "    Properties:\n",
            "      Code: {}\n",
            "      Role:\n",
            "        Fn::GetAtt: [Role, Arn]\n",
        ));
        let graph = backend().apply(&doc).unwrap();
        assert_eq!(graph.dependencies_of("Fn"), vec!["Role"]);
    }

    #[test]
    fn test_sub_reference_creates_edge() {
        let doc = tree(concat!(
            "Resources:\n",
            "  Vpc:\n",
            "    Type: AWS::EC2::VPC\n",
            "    Properties:\n",
            "      CidrBlock: 10.0.0.0/16\n",
            "  B:\n",
            "    Type: AWS::S3::Bucket\n",
            "    Properties:\n",
            "      BucketName:\n",
            "        Fn::Sub: logs-${Vpc}-${AWS::Region}\n",
        ));
        let graph = backend().apply(&doc).unwrap();
        assert_eq!(graph.dependencies_of("B"), vec!["Vpc"]);
    }

    #[test]
    fn test_dangling_sub_reference_rejected() {
        let doc = tree(concat!(
            "Resources:\n",
            "  B:\n",
            "    Type: AWS::S3::Bucket\n",
            "    Properties:\n",
            "      BucketName:\n",
            "        Fn::Sub: logs-${NoSuchVpc.CidrBlock}\n",
        ));
        let err = backend().apply(&doc).unwrap_err();
        assert_eq!(
            err,
            ApplyError::DanglingReference {
                from: "B".to_string(),
                target: "NoSuchVpc".to_string(),
            }
        );
    }

    #[test]
    fn test_sub_locals_and_literals_bind_nothing() {
        let mut targets = Vec::new();
        collect_sub_targets("a-${Local}-${!Escaped}-${Vpc.CidrBlock}", &["Local"], &mut targets);
        assert_eq!(targets, vec!["Vpc"]);
    }

    #[test]
    fn test_cycle_rejected() {
        let doc = tree(concat!(
            "Resources:\n",
            "  A:\n",
            "    Type: AWS::S3::Bucket\n",
            "    DependsOn: B\n",
            "  B:\n",
            "    Type: AWS::S3::Bucket\n",
            "    DependsOn: A\n",
        ));
        let err = backend().apply(&doc).unwrap_err();
        assert!(matches!(err, ApplyError::Cycle { .. }));
    }

    #[test]
    fn test_pseudo_parameters_and_declared_parameters_resolve() {
        let doc = tree(concat!(
            "Parameters:\n",
            "  Environment:\n",
            "    Type: String\n",
            "    Default: dev\n",
            "Resources:\n",
            "  B:\n",
            "    Type: AWS::S3::Bucket\n",
            "    Properties:\n",
            "      BucketName:\n",
            "        Ref: Environment\n",
            "      Tags:\n",
            "        - Key: region\n",
            "          Value:\n",
            "            Ref: AWS::Region\n",
        ));
        let graph = backend().apply(&doc).unwrap();
        assert_eq!(graph.len(), 1);
        assert!(graph.dependencies_of("B").is_empty());
    }

    #[test]
    fn test_unsupported_type_rejected() {
        let doc = tree("Resources:\n  X:\n    Type: AWS::Quantum::Computer\n");
        let err = backend().apply(&doc).unwrap_err();
        assert!(matches!(err, ApplyError::UnsupportedType { type_name, .. }
            if type_name == "AWS::Quantum::Computer"));
    }

    #[test]
    fn test_custom_type_supported() {
        let doc = tree("Resources:\n  X:\n    Type: Custom::Migration\n");
        assert!(backend().apply(&doc).is_ok());
    }

    #[test]
    fn test_empty_template_rejected() {
        assert_eq!(
            backend().apply(&tree("Resources: {}\n")).unwrap_err(),
            ApplyError::NoResources
        );
        assert_eq!(
            backend().apply(&tree("Description: empty\n")).unwrap_err(),
            ApplyError::NoResources
        );
    }

    #[test]
    fn test_runs_are_isolated_and_deterministic() {
        let doc = tree(NETWORK);
        let first = backend().apply(&doc).unwrap();
        let second = backend().apply(&doc).unwrap();

        let ids = |g: &SimulatedResourceGraph| {
            g.resources().map(|r| r.physical_id.clone()).collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));

        // A differently-configured backend assigns different physical ids.
        let other = SimulatedBackend::new("999999999999", "eu-west-1")
            .apply(&doc)
            .unwrap();
        assert_ne!(ids(&first), ids(&other));
    }

    #[test]
    fn test_physical_ids_carry_stack_prefix() {
        let graph = backend().apply(&tree(NETWORK)).unwrap();
        for resource in graph.resources() {
            assert!(resource.physical_id.starts_with("test-stack-"));
        }
    }
}
