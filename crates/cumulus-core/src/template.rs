use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::error::ExtractionError;
use crate::graph::{Element, Group, TopologyGraph};
use crate::resource::{self, ExtractContext, GroupRole};

pub const DEPLOYMENT_SCHEMA: &str =
    "https://schema.management.azure.com/schemas/2019-04-01/deploymentTemplate.json#";
pub const CONTENT_VERSION: &str = "1.0.0.0";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    SecureString,
    Int,
    Bool,
    Object,
    Array,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterMetadata {
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDef {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ParameterMetadata>,
}

impl ParameterDef {
    pub fn new(param_type: ParamType) -> Self {
        Self {
            param_type,
            default_value: None,
            allowed_values: Vec::new(),
            metadata: None,
        }
    }

    pub fn string(default: impl Into<String>) -> Self {
        Self::new(ParamType::String).with_default(Value::String(default.into()))
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn allowing<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = values.into_iter().map(|v| Value::String(v.into())).collect();
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.metadata = Some(ParameterMetadata {
            description: description.into(),
        });
        self
    }
}

/// One entry of the template's `resources` array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub api_version: String,
    pub name: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,
    /// Id of the topology element this fragment was compiled from.
    #[serde(skip)]
    pub element_id: String,
}

impl Resource {
    pub fn new(
        resource_type: impl Into<String>,
        api_version: impl Into<String>,
        name: impl Into<String>,
        element_id: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            api_version: api_version.into(),
            name: resource::literal(&name.into()),
            location: resource::LOCATION.to_string(),
            sku: None,
            kind: None,
            depends_on: Vec::new(),
            properties: Value::Null,
            element_id: element_id.into(),
        }
    }
}

/// The exported ARM deployment template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArmTemplate {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub content_version: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterDef>,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl Default for ArmTemplate {
    fn default() -> Self {
        Self {
            schema: DEPLOYMENT_SCHEMA.to_string(),
            content_version: CONTENT_VERSION.to_string(),
            parameters: BTreeMap::new(),
            resources: Vec::new(),
        }
    }
}

impl ArmTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge parameters. A colliding name is replaced by the later definition;
    /// returns the names that were replaced.
    pub fn add_parameters(&mut self, parameters: Vec<(String, ParameterDef)>) -> Vec<String> {
        let mut replaced = Vec::new();
        for (name, def) in parameters {
            if let Some(previous) = self.parameters.insert(name.clone(), def) {
                if Some(&previous) != self.parameters.get(&name) {
                    tracing::warn!(parameter = %name, "parameter redefined with a different definition; keeping the later one");
                }
                replaced.push(name);
            }
        }
        replaced
    }

    pub fn add_resources(&mut self, resources: Vec<Resource>) {
        self.resources.extend(resources);
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// What the builder did with each element, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    /// Elements whose capability contributed to the template, in visit order.
    pub exported: Vec<String>,
    /// Nested-only groups exported by their parent instead.
    pub delegated: Vec<String>,
    /// Elements without an export capability.
    pub ignored: Vec<String>,
    /// Parameter names that a later element replaced.
    pub replaced_parameters: Vec<String>,
}

/// Compile the graph into an ARM template.
///
/// Returns `Ok(None)` when there is nothing to export (no nodes, no groups).
pub fn build_template(graph: &TopologyGraph) -> Result<Option<ArmTemplate>, ExtractionError> {
    Ok(build_with_report(graph)?.map(|(template, _)| template))
}

pub fn build_with_report(
    graph: &TopologyGraph,
) -> Result<Option<(ArmTemplate, BuildReport)>, ExtractionError> {
    if graph.is_empty() {
        return Ok(None);
    }

    let ctx = ExtractContext::new(graph);
    let mut template = ArmTemplate::new();
    let mut report = BuildReport::default();
    // parameter scope -> element that claimed it
    let mut scopes: HashMap<String, String> = HashMap::new();

    let mut order = Vec::with_capacity(graph.groups().len() + graph.nodes().len());
    for root in graph.top_level_groups() {
        preorder(graph, root, &mut order);
    }
    order.extend(graph.nodes().iter().map(Element::Node));

    for element in order {
        if let Element::Group(group) = element {
            if exported_by_parent(graph, group) {
                tracing::debug!(group = %group.id, "nested-only group left to its parent");
                report.delegated.push(group.id.clone());
                continue;
            }
        }
        let Some(capability) = resource::capability_of(element) else {
            report.ignored.push(element.id().to_string());
            continue;
        };
        let parameters = capability.parameters(&ctx)?;
        if !parameters.is_empty() {
            let scope = resource::param_scope(element.id());
            if let Some(owner) = scopes.insert(scope, element.id().to_string()) {
                return Err(ExtractionError::new(
                    element.id(),
                    format!(
                        "its parameter names collide with those of '{}'; rename one of them",
                        owner
                    ),
                ));
            }
        }
        let resources = capability.resources(&ctx)?;
        tracing::debug!(
            element = %element.id(),
            parameters = parameters.len(),
            resources = resources.len(),
            "extracted"
        );
        report
            .replaced_parameters
            .extend(template.add_parameters(parameters));
        template.add_resources(resources);
        report.exported.push(element.id().to_string());
    }

    tracing::debug!(
        exported = report.exported.len(),
        delegated = report.delegated.len(),
        ignored = report.ignored.len(),
        replaced = report.replaced_parameters.len(),
        "template built"
    );
    Ok(Some((template, report)))
}

fn preorder<'a>(graph: &'a TopologyGraph, group: &'a Group, out: &mut Vec<Element<'a>>) {
    out.push(Element::Group(group));
    for child in group.child_groups() {
        if let Some(g) = graph.group(child) {
            preorder(graph, g, out);
        }
    }
}

fn exported_by_parent(graph: &TopologyGraph, group: &Group) -> bool {
    match resource::group_role(&group.kind) {
        GroupRole::Standalone => false,
        GroupRole::NestedOnly { within } => group
            .parent
            .as_deref()
            .and_then(|pid| graph.group(pid))
            .is_some_and(|parent| parent.kind == within),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Link, Node};
    use serde_json::json;

    #[test]
    fn empty_graph_has_nothing_to_export() {
        assert_eq!(build_template(&TopologyGraph::new()).unwrap(), None);
    }

    #[test]
    fn only_annotations_still_builds_a_document() {
        let mut g = TopologyGraph::new();
        g.add_node(Node::new("note", "text-note")).unwrap();
        let (t, report) = build_with_report(&g).unwrap().unwrap();
        assert!(t.parameters.is_empty());
        assert!(t.resources.is_empty());
        assert_eq!(report.ignored, vec!["note"]);
    }

    #[test]
    fn last_parameter_definition_wins() {
        let mut t = ArmTemplate::new();
        t.add_parameters(vec![("p".into(), ParameterDef::string("a"))]);
        let replaced = t.add_parameters(vec![("p".into(), ParameterDef::string("b"))]);
        assert_eq!(replaced, vec!["p"]);
        assert_eq!(t.parameters.len(), 1);
        assert_eq!(t.parameters["p"].default_value, Some(json!("b")));
    }

    #[test]
    fn extraction_failure_aborts_the_build() {
        let mut g = TopologyGraph::new();
        g.add_node(Node::new("plan", "app-service-plan")).unwrap();
        g.add_node(Node::new("site", "web-app")).unwrap();
        let err = build_template(&g).unwrap_err();
        assert_eq!(err.element, "site");
    }

    #[test]
    fn subnet_is_exported_once_through_its_network() {
        let mut g = TopologyGraph::new();
        g.add_group(Group::new("vnet", "virtual-network")).unwrap();
        g.add_group(Group::new("web", "subnet").in_group("vnet")).unwrap();
        g.add_group(Group::new("data", "subnet").in_group("vnet")).unwrap();
        let (t, report) = build_with_report(&g).unwrap().unwrap();
        assert_eq!(t.resources.len(), 1);
        assert_eq!(report.exported, vec!["vnet"]);
        assert_eq!(report.delegated, vec!["web", "data"]);
        assert_eq!(t.resources[0].properties["subnets"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn ids_that_share_a_parameter_scope_are_rejected() {
        let mut g = TopologyGraph::new();
        g.add_node(Node::new("plan-a", "app-service-plan").with_property("sku", "P1v3")).unwrap();
        g.add_node(Node::new("plan_a", "app-service-plan").with_property("sku", "F1")).unwrap();
        let err = build_template(&g).unwrap_err();
        assert_eq!(err.element, "plan_a");
        assert!(err.reason.contains("'plan-a'"), "{}", err.reason);
    }

    #[test]
    fn shared_scope_without_parameters_is_fine() {
        let mut g = TopologyGraph::new();
        g.add_node(Node::new("plan-a", "app-service-plan")).unwrap();
        g.add_node(Node::new("plan_a", "text-note")).unwrap();
        let (t, report) = build_with_report(&g).unwrap().unwrap();
        assert_eq!(t.parameters.len(), 1);
        assert_eq!(report.ignored, vec!["plan_a"]);
    }

    #[test]
    fn expression_shaped_names_stay_literal() {
        let mut g = TopologyGraph::new();
        g.add_node(Node::new("plan", "app-service-plan").with_property("name", "o'brien-plan")).unwrap();
        g.add_node(Node::new("site", "web-app").with_property("name", "[concat('x')]")).unwrap();
        g.add_link(Link::new("l", "site", "plan")).unwrap();
        let t = build_template(&g).unwrap().unwrap();
        let site = t.resources.iter().find(|r| r.element_id == "site").unwrap();
        assert_eq!(site.name, "[[concat('x')]");
        assert_eq!(
            site.depends_on,
            vec!["[resourceId('Microsoft.Web/serverfarms', 'o''brien-plan')]".to_string()]
        );
    }

    #[test]
    fn subnet_outside_a_network_is_an_extraction_error() {
        let mut g = TopologyGraph::new();
        g.add_group(Group::new("frame", "group")).unwrap();
        g.add_group(Group::new("web", "subnet").in_group("frame")).unwrap();
        let err = build_template(&g).unwrap_err();
        assert_eq!(err.element, "web");
    }

    #[test]
    fn resources_follow_visit_order() {
        let mut g = TopologyGraph::new();
        g.add_node(Node::new("st", "storageacct").with_property("x", 1)).unwrap();
        g.add_node(Node::new("plan", "app-service-plan")).unwrap();
        g.add_group(Group::new("vnet", "virtual-network")).unwrap();
        g.add_node(Node::new("site", "web-app")).unwrap();
        g.add_link(Link::new("l", "site", "plan")).unwrap();
        let (t, report) = build_with_report(&g).unwrap().unwrap();
        let types: Vec<&str> = t.resources.iter().map(|r| r.resource_type.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "Microsoft.Network/virtualNetworks",
                "Microsoft.Web/serverfarms",
                "Microsoft.Web/sites"
            ]
        );
        assert_eq!(report.ignored, vec!["st"]);
        let origins: Vec<&str> = t.resources.iter().map(|r| r.element_id.as_str()).collect();
        assert_eq!(origins, report.exported);
    }

    #[test]
    fn document_json_shape() {
        let mut g = TopologyGraph::new();
        g.add_node(Node::new("n1", "app-service-plan").with_property("sku", "small")).unwrap();
        let t = build_template(&g).unwrap().unwrap();
        let v: Value = serde_json::from_str(&t.to_json().unwrap()).unwrap();
        assert_eq!(v["$schema"], json!(DEPLOYMENT_SCHEMA));
        assert_eq!(v["contentVersion"], json!("1.0.0.0"));
        assert_eq!(v["parameters"]["n1_sku"]["defaultValue"], json!("small"));
        assert_eq!(v["resources"][0]["name"], json!("n1"));
        assert!(v["resources"][0].get("elementId").is_none());
    }
}
