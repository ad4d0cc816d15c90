use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use std::sync::Arc;

use cumulus_bicep::{BicepCli, Converter, ExportFormat};
use cumulus_core::resource::ResourceKind;
use cumulus_core::{
    DesignSession, DesignStore, Group, IntegrityError, Link, LoadOutcome, Node, Position, Properties,
    SaveOutcome, TopologyGraph,
};

const DEFAULT_LOG_FILTER: &str = "cumulus_core=info,cumulus_bicep=info,cumulus_mcp=info";

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddGroupItem {
    /// Unique id, shared namespace with nodes and links (e.g. "hub-vnet")
    id: String,
    /// Container kind: "virtual-network", "subnet", or any free-form tag
    kind: String,
    /// Id of the enclosing group. A subnet's parent must be a virtual-network.
    parent_id: Option<String>,
    /// Resource properties, e.g. {"name": "hub", "addressPrefix": "10.1.0.0/16"}
    properties: Option<Properties>,
    /// X position on canvas
    x: Option<f64>,
    /// Y position on canvas
    y: Option<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddGroupsRequest {
    /// Groups to add, parents before children. Either all are added or none.
    groups: Vec<AddGroupItem>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddNodeItem {
    /// Unique id, shared namespace with groups and links (e.g. "vm-1")
    id: String,
    /// Resource kind, e.g. "virtual-machine", "network-interface", "web-app". Unknown kinds are kept but not exported.
    kind: String,
    /// Id of the enclosing group. Network interfaces belong in a subnet.
    group_id: Option<String>,
    /// Resource properties, e.g. {"vmSize": "Standard_B2s"}
    properties: Option<Properties>,
    /// X position on canvas
    x: Option<f64>,
    /// Y position on canvas
    y: Option<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddNodesRequest {
    /// Nodes to add. Either all are added or none.
    nodes: Vec<AddNodeItem>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddLinkItem {
    /// Link id. Generated ("link-N") when omitted.
    id: Option<String>,
    /// Source node or group id
    source: String,
    /// Target node or group id
    target: String,
    /// Free-form link properties, e.g. {"label": "ingress"}
    properties: Option<Properties>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddLinksRequest {
    /// Links to add. Either all are added or none.
    links: Vec<AddLinkItem>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SetPropertiesRequest {
    /// Id of the node, group or link to update
    element_id: String,
    /// Properties to set. A null value deletes the property.
    properties: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DeleteElementsRequest {
    /// Ids of nodes, groups or links to delete. Groups take their contents with them; links touching deleted elements are removed.
    ids: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DesignNameRequest {
    /// Name of the saved design
    name: String,
}

impl AddGroupItem {
    fn into_group(self) -> Group {
        let mut group = Group::new(self.id, self.kind);
        group.parent = self.parent_id;
        group.properties = self.properties.unwrap_or_default();
        group.position = position(self.x, self.y);
        group
    }
}

impl AddNodeItem {
    fn into_node(self) -> Node {
        Node {
            id: self.id,
            kind: self.kind,
            properties: self.properties.unwrap_or_default(),
            group: self.group_id,
            position: position(self.x, self.y),
        }
    }
}

// --- Server ---

#[derive(Clone)]
pub struct CumulusServer {
    tool_router: ToolRouter<Self>,
    session: Arc<DesignSession>,
    store: Arc<dyn DesignStore>,
    converter: Arc<dyn Converter>,
}

#[tool_router]
impl CumulusServer {
    pub fn new(store: Arc<dyn DesignStore>, converter: Arc<dyn Converter>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            session: Arc::new(DesignSession::new()),
            store,
            converter,
        }
    }

    #[tool(description = "Get the topology modeling rules: which kinds are groups or nodes, required links, and recognized properties")]
    async fn get_rules(&self) -> Result<CallToolResult, McpError> {
        Ok(success(cumulus_core::rules::RULES))
    }

    #[tool(
        description = "Get the current design as JSON: {nodes: [{id, kind, properties?, groupId?, position?}], groups: [{id, kind, properties?, parentId?, position?}], links: [{id, source, target, properties?}]}. Groups are listed parents first."
    )]
    async fn get_design(&self) -> Result<CallToolResult, McpError> {
        let Some(persisted) = self.session.to_persisted().await else {
            return Ok(success("The design is empty. Use add_groups and add_nodes to start one."));
        };
        Ok(match persisted.to_json_pretty() {
            Ok(json) => success(json),
            Err(e) => failure(format!("Serialization error: {e}")),
        })
    }

    #[tool(description = "Add container groups (virtual networks, subnets, free-form areas) to the design")]
    async fn add_groups(
        &self,
        Parameters(req): Parameters<AddGroupsRequest>,
    ) -> Result<CallToolResult, McpError> {
        if req.groups.is_empty() {
            return Ok(failure("No groups given."));
        }
        let unknown = unknown_kinds(req.groups.iter().map(|g| g.kind.as_str()));
        let count = req.groups.len();
        let result = self
            .session
            .edit(|graph| {
                apply_all(graph, |next| {
                    for item in req.groups {
                        next.add_group(item.into_group())?;
                    }
                    Ok(())
                })
            })
            .await;
        Ok(match result {
            Ok(()) => success(added_message(count, "group", &unknown)),
            Err(e) => failure(format!("No groups added: {e}")),
        })
    }

    #[tool(description = "Add resource nodes to the design, optionally inside a group")]
    async fn add_nodes(
        &self,
        Parameters(req): Parameters<AddNodesRequest>,
    ) -> Result<CallToolResult, McpError> {
        if req.nodes.is_empty() {
            return Ok(failure("No nodes given."));
        }
        let unknown = unknown_kinds(req.nodes.iter().map(|n| n.kind.as_str()));
        let count = req.nodes.len();
        let result = self
            .session
            .edit(|graph| {
                apply_all(graph, |next| {
                    for item in req.nodes {
                        next.add_node(item.into_node())?;
                    }
                    Ok(())
                })
            })
            .await;
        Ok(match result {
            Ok(()) => success(added_message(count, "node", &unknown)),
            Err(e) => failure(format!("No nodes added: {e}")),
        })
    }

    #[tool(description = "Link two elements. Links carry dependencies such as VM to network interface or web app to plan; direction does not matter.")]
    async fn add_links(
        &self,
        Parameters(req): Parameters<AddLinksRequest>,
    ) -> Result<CallToolResult, McpError> {
        if req.links.is_empty() {
            return Ok(failure("No links given."));
        }
        let result = self
            .session
            .edit(|graph| {
                let mut ids = Vec::with_capacity(req.links.len());
                apply_all(graph, |next| {
                    for item in req.links {
                        let id = item.id.unwrap_or_else(|| next_link_id(next));
                        let mut link = Link::new(&id, item.source, item.target);
                        link.properties = item.properties.unwrap_or_default();
                        next.add_link(link)?;
                        ids.push(id);
                    }
                    Ok(())
                })
                .map(|()| ids)
            })
            .await;
        Ok(match result {
            Ok(ids) => success(format!("Added {} link(s): {}", ids.len(), ids.join(", "))),
            Err(e) => failure(format!("No links added: {e}")),
        })
    }

    #[tool(description = "Set or delete properties on a node, group or link. A null value deletes the property.")]
    async fn set_properties(
        &self,
        Parameters(req): Parameters<SetPropertiesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let id = req.element_id;
        let count = req.properties.len();
        let result = self
            .session
            .edit(|graph| {
                apply_all(graph, |next| {
                    for (name, value) in req.properties {
                        next.set_property(&id, &name, value)?;
                    }
                    Ok(())
                })
            })
            .await;
        Ok(match result {
            Ok(()) => success(format!("Updated {count} property(ies) on '{id}'.")),
            Err(e) => failure(e.to_string()),
        })
    }

    #[tool(description = "Delete nodes, groups or links by id. Deleting a group deletes everything inside it.")]
    async fn delete_elements(
        &self,
        Parameters(req): Parameters<DeleteElementsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let (removed, missing) = self
            .session
            .edit(|graph| {
                let mut removed = Vec::new();
                let mut missing = Vec::new();
                for id in req.ids {
                    if graph.remove(&id) {
                        removed.push(id);
                    } else {
                        missing.push(id);
                    }
                }
                (removed, missing)
            })
            .await;
        let mut text = format!("Deleted {} element(s).", removed.len());
        if !missing.is_empty() {
            text.push_str(&format!(" Not found: {}.", missing.join(", ")));
        }
        Ok(success(text))
    }

    #[tool(description = "Remove everything from the current design")]
    async fn clear_design(&self) -> Result<CallToolResult, McpError> {
        self.session.clear().await;
        Ok(success("Design cleared."))
    }

    #[tool(description = "Compile the design into an ARM deployment template (JSON). Fails with the offending element id when a resource is incomplete.")]
    async fn export_template(&self) -> Result<CallToolResult, McpError> {
        Ok(self.export(ExportFormat::Json).await)
    }

    #[tool(description = "Compile the design into an ARM template and decompile it to Bicep. Requires the bicep CLI.")]
    async fn export_bicep(&self) -> Result<CallToolResult, McpError> {
        Ok(self.export(ExportFormat::Bicep).await)
    }

    #[tool(description = "Save the current design under a name. An empty design is not saved.")]
    async fn save_design(
        &self,
        Parameters(req): Parameters<DesignNameRequest>,
    ) -> Result<CallToolResult, McpError> {
        Ok(match self.session.save(self.store.as_ref(), &req.name).await {
            Ok(SaveOutcome::Saved { status }) => {
                success(format!("Saved design '{}' (status {}).", req.name, status))
            }
            Ok(SaveOutcome::NothingToSave) => success("There is nothing to save."),
            Err(e) => failure(e.to_string()),
        })
    }

    #[tool(description = "Replace the current design with a saved one. The current design is cleared first, even if loading fails.")]
    async fn load_design(
        &self,
        Parameters(req): Parameters<DesignNameRequest>,
    ) -> Result<CallToolResult, McpError> {
        Ok(match self.session.load(self.store.as_ref(), &req.name).await {
            Ok(LoadOutcome::Loaded(summary)) => success(format!(
                "Loaded design '{}': {} node(s), {} group(s), {} link(s).",
                req.name, summary.nodes, summary.groups, summary.links
            )),
            Ok(LoadOutcome::Superseded) => success(format!(
                "Loading '{}' was superseded by a newer load.",
                req.name
            )),
            Err(e) => failure(format!("Failed to load '{}': {}", req.name, e)),
        })
    }

    #[tool(description = "List saved designs")]
    async fn list_designs(&self) -> Result<CallToolResult, McpError> {
        Ok(match self.store.list().await {
            Ok(names) if names.is_empty() => success("No saved designs. Use save_design to create one."),
            Ok(names) => success(names.join("\n")),
            Err(e) => failure(e.to_string()),
        })
    }
}

impl CumulusServer {
    async fn export(&self, format: ExportFormat) -> CallToolResult {
        let template = match self.session.build_template().await {
            Ok(Some(template)) => template,
            Ok(None) => return success("There is nothing to export."),
            Err(e) => return failure(e.to_string()),
        };
        match cumulus_bicep::export_template(template, format, self.converter.as_ref()).await {
            Ok(artifact) => success(artifact.content),
            Err(e) => failure(e.to_string()),
        }
    }
}

const INSTRUCTIONS: &str = r#"cumulus designs Azure network and compute topologies and compiles them into ARM deployment templates (or Bicep).

The design is a graph held in this server's memory:
- **Groups** are containers (virtual networks, subnets, free-form areas). Groups nest via `parent_id`.
- **Nodes** are resources (VMs, NICs, public IPs, storage, app service). A node may sit in one group via `group_id`.
- **Links** connect two elements and express dependencies.
Node, group and link ids share one namespace.

Edits are validated as they are applied: unknown parents, duplicate ids and links to missing elements are rejected, and a batch is applied all-or-nothing. Export problems (a VM without a NIC, a subnet outside a virtual network) are only reported by `export_template` / `export_bicep`, naming the element at fault."#;

#[tool_handler]
impl ServerHandler for CumulusServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = format!(
            "{}\n\n## Topology Modeling Rules\n{}",
            INSTRUCTIONS,
            cumulus_core::rules::RULES
        );
        ServerInfo {
            instructions: Some(instructions.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// --- Helpers ---

fn success(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}

fn failure(text: impl Into<String>) -> CallToolResult {
    CallToolResult::error(vec![Content::text(text.into())])
}

fn position(x: Option<f64>, y: Option<f64>) -> Option<Position> {
    match (x, y) {
        (None, None) => None,
        (x, y) => Some(Position {
            x: x.unwrap_or(0.0),
            y: y.unwrap_or(0.0),
        }),
    }
}

/// Run a batch of edits against a copy and keep it only if every edit succeeds.
fn apply_all(
    graph: &mut TopologyGraph,
    edits: impl FnOnce(&mut TopologyGraph) -> Result<(), IntegrityError>,
) -> Result<(), IntegrityError> {
    let mut next = graph.clone();
    edits(&mut next)?;
    *graph = next;
    Ok(())
}

fn next_link_id(graph: &TopologyGraph) -> String {
    let mut n = graph.links().len() + 1;
    loop {
        let id = format!("link-{n}");
        if !graph.contains(&id) {
            return id;
        }
        n += 1;
    }
}

fn unknown_kinds<'a>(kinds: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut unknown: Vec<String> = kinds
        .filter(|k| ResourceKind::from_tag(k).is_none())
        .map(String::from)
        .collect();
    unknown.sort();
    unknown.dedup();
    unknown
}

fn added_message(count: usize, what: &str, unknown: &[String]) -> String {
    let mut text = format!("Added {count} {what}(s).");
    if !unknown.is_empty() {
        text.push_str(&format!(
            " Not exported (unknown kind): {}.",
            unknown.join(", ")
        ));
    }
    text
}

fn init_tracing() {
    // stdout carries the MCP protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let settings = cumulus_core::read_settings();
    tracing::info!(store = ?settings.store, "starting cumulus-mcp");
    let store: Arc<dyn DesignStore> = Arc::from(cumulus_core::open_store(&settings));
    let converter: Arc<dyn Converter> = Arc::new(BicepCli::from_settings(&settings));

    let service = CumulusServer::new(store, converter)
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| tracing::error!("MCP server error: {}", e))?;
    service.waiting().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cumulus_bicep::DecompileError;
    use cumulus_core::MemoryDesignStore;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    struct FakeBicep;

    #[async_trait]
    impl Converter for FakeBicep {
        async fn decompile(&self, template_json: &str) -> Result<String, DecompileError> {
            let doc: Value = serde_json::from_str(template_json)?;
            let count = doc["resources"].as_array().map_or(0, Vec::len);
            Ok(format!("// {count} resource(s)\r\n"))
        }
    }

    fn server() -> CumulusServer {
        CumulusServer::new(Arc::new(MemoryDesignStore::new()), Arc::new(FakeBicep))
    }

    fn params<T: serde::de::DeserializeOwned>(value: Value) -> Parameters<T> {
        Parameters(serde_json::from_value(value).unwrap())
    }

    fn text(result: &CallToolResult) -> String {
        let v = serde_json::to_value(result).unwrap();
        v["content"][0]["text"].as_str().unwrap_or_default().to_string()
    }

    fn is_error(result: &CallToolResult) -> bool {
        serde_json::to_value(result).unwrap()["isError"] == json!(true)
    }

    async fn web_design(server: &CumulusServer) {
        let r = server
            .add_nodes(params(json!({ "nodes": [
                { "id": "plan", "kind": "app-service-plan", "properties": { "sku": "B1" } },
                { "id": "site", "kind": "web-app", "x": 200.0, "y": 80.0 },
                { "id": "memo", "kind": "text-note" }
            ]})))
            .await
            .unwrap();
        assert!(!is_error(&r), "{}", text(&r));
        assert_eq!(text(&r), "Added 3 node(s). Not exported (unknown kind): text-note.");
        let r = server
            .add_links(params(json!({ "links": [{ "source": "site", "target": "plan" }] })))
            .await
            .unwrap();
        assert_eq!(text(&r), "Added 1 link(s): link-1");
    }

    #[tokio::test]
    async fn empty_design_has_nothing_to_export_or_save() {
        let s = server();
        assert_eq!(text(&s.export_template().await.unwrap()), "There is nothing to export.");
        let r = s.save_design(params(json!({ "name": "x" }))).await.unwrap();
        assert!(!is_error(&r));
        assert_eq!(text(&r), "There is nothing to save.");
    }

    #[tokio::test]
    async fn exports_json_and_bicep() {
        let s = server();
        web_design(&s).await;

        let r = s.export_template().await.unwrap();
        assert!(!is_error(&r), "{}", text(&r));
        let doc: Value = serde_json::from_str(&text(&r)).unwrap();
        assert_eq!(doc["parameters"]["plan_sku"]["defaultValue"], "B1");
        assert_eq!(doc["resources"].as_array().unwrap().len(), 2);

        assert_eq!(text(&s.export_bicep().await.unwrap()), "// 2 resource(s)\n");
    }

    #[tokio::test]
    async fn batches_are_all_or_nothing() {
        let s = server();
        let r = s
            .add_groups(params(json!({ "groups": [
                { "id": "vnet", "kind": "virtual-network" },
                { "id": "sn", "kind": "subnet", "parent_id": "missing" }
            ]})))
            .await
            .unwrap();
        assert!(is_error(&r));
        assert!(text(&r).contains("missing"), "{}", text(&r));
        assert!(s.session.read(|g| g.is_empty()).await);
    }

    #[tokio::test]
    async fn export_errors_name_the_element() {
        let s = server();
        s.add_nodes(params(json!({ "nodes": [{ "id": "lonely", "kind": "web-app" }] })))
            .await
            .unwrap();
        let r = s.export_template().await.unwrap();
        assert!(is_error(&r));
        assert!(text(&r).contains("lonely"), "{}", text(&r));
    }

    #[tokio::test]
    async fn save_clear_load_round_trip() {
        let s = server();
        web_design(&s).await;
        let before = s.session.snapshot().await;

        let r = s.save_design(params(json!({ "name": "shop" }))).await.unwrap();
        assert_eq!(text(&r), "Saved design 'shop' (status 201).");
        s.clear_design().await.unwrap();
        assert_eq!(text(&s.list_designs().await.unwrap()), "shop");

        let r = s.load_design(params(json!({ "name": "shop" }))).await.unwrap();
        assert_eq!(text(&r), "Loaded design 'shop': 3 node(s), 0 group(s), 1 link(s).");
        assert_eq!(s.session.snapshot().await, before);

        let r = s.load_design(params(json!({ "name": "gone" }))).await.unwrap();
        assert!(is_error(&r));
        assert!(text(&r).contains("Error code: 404"), "{}", text(&r));
        assert!(s.session.read(|g| g.is_empty()).await);
    }

    #[tokio::test]
    async fn properties_and_deletes() {
        let s = server();
        web_design(&s).await;

        let r = s
            .set_properties(params(json!({
                "element_id": "site",
                "properties": { "name": "contoso", "httpsOnly": null }
            })))
            .await
            .unwrap();
        assert!(!is_error(&r));
        let name = s
            .session
            .read(|g| g.node("site").and_then(|n| n.properties.get("name").cloned()))
            .await;
        assert_eq!(name, Some(json!("contoso")));

        let r = s
            .delete_elements(params(json!({ "ids": ["plan", "nope"] })))
            .await
            .unwrap();
        assert_eq!(text(&r), "Deleted 1 element(s). Not found: nope.");
        assert!(s.session.read(|g| g.links().is_empty()).await);
    }
}
