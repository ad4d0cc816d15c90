//! Per-element export capability.
//!
//! Elements are plain data (a type tag plus properties). Whether an element is
//! an exportable Azure resource is decided here, once, by looking its tag up
//! in [`ResourceKind`]. Annotation kinds (`text-note`, a bare `group`, any tag
//! we don't know) have no capability and contribute nothing.

mod compute;
mod network;
mod storage;
mod web;

use crate::error::ExtractionError;
use crate::graph::{Element, TopologyGraph};
use crate::template::{ParameterDef, Resource};

pub use compute::VirtualMachine;
pub use network::{NetworkInterface, PublicIp, Subnet, VirtualNetwork};
pub use storage::StorageAccount;
pub use web::{AppServicePlan, WebApp};

pub const LOCATION: &str = "[resourceGroup().location]";

/// An element that can be compiled into ARM parameters and resources.
///
/// Both methods must be pure: they read the graph through `ctx` and never
/// mutate it.
pub trait ArmResource {
    fn parameters(&self, ctx: &ExtractContext<'_>) -> Result<Vec<(String, ParameterDef)>, ExtractionError>;
    fn resources(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Resource>, ExtractionError>;
}

/// How a group kind may be placed in the containment tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupRole {
    /// Exported on its own wherever it sits.
    Standalone,
    /// Only meaningful inside a group of kind `within`; that parent exports it.
    NestedOnly { within: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    VirtualNetwork,
    Subnet,
    NetworkInterface,
    PublicIp,
    VirtualMachine,
    StorageAccount,
    AppServicePlan,
    WebApp,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::VirtualNetwork,
        ResourceKind::Subnet,
        ResourceKind::NetworkInterface,
        ResourceKind::PublicIp,
        ResourceKind::VirtualMachine,
        ResourceKind::StorageAccount,
        ResourceKind::AppServicePlan,
        ResourceKind::WebApp,
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }

    pub fn tag(self) -> &'static str {
        match self {
            ResourceKind::VirtualNetwork => "virtual-network",
            ResourceKind::Subnet => "subnet",
            ResourceKind::NetworkInterface => "network-interface",
            ResourceKind::PublicIp => "public-ip",
            ResourceKind::VirtualMachine => "virtual-machine",
            ResourceKind::StorageAccount => "storage-account",
            ResourceKind::AppServicePlan => "app-service-plan",
            ResourceKind::WebApp => "web-app",
        }
    }

    pub fn arm_type(self) -> &'static str {
        match self {
            ResourceKind::VirtualNetwork => "Microsoft.Network/virtualNetworks",
            ResourceKind::Subnet => "Microsoft.Network/virtualNetworks/subnets",
            ResourceKind::NetworkInterface => "Microsoft.Network/networkInterfaces",
            ResourceKind::PublicIp => "Microsoft.Network/publicIPAddresses",
            ResourceKind::VirtualMachine => "Microsoft.Compute/virtualMachines",
            ResourceKind::StorageAccount => "Microsoft.Storage/storageAccounts",
            ResourceKind::AppServicePlan => "Microsoft.Web/serverfarms",
            ResourceKind::WebApp => "Microsoft.Web/sites",
        }
    }

    /// Group kinds live on the canvas as containers; everything else is a node.
    pub fn is_container(self) -> bool {
        matches!(self, ResourceKind::VirtualNetwork | ResourceKind::Subnet)
    }
}

/// Containment role for a group tag. Unknown tags are standalone.
pub fn group_role(tag: &str) -> GroupRole {
    match ResourceKind::from_tag(tag) {
        Some(ResourceKind::Subnet) => GroupRole::NestedOnly {
            within: ResourceKind::VirtualNetwork.tag(),
        },
        _ => GroupRole::Standalone,
    }
}

/// Look up the export capability of an element.
pub fn capability_of<'a>(element: Element<'a>) -> Option<Box<dyn ArmResource + 'a>> {
    let kind = ResourceKind::from_tag(element.kind())?;
    let capability: Box<dyn ArmResource + 'a> = match (kind, element) {
        (ResourceKind::VirtualNetwork, Element::Group(g)) => Box::new(VirtualNetwork(g)),
        (ResourceKind::Subnet, Element::Group(g)) => Box::new(Subnet(g)),
        (ResourceKind::NetworkInterface, Element::Node(n)) => Box::new(NetworkInterface(n)),
        (ResourceKind::PublicIp, Element::Node(n)) => Box::new(PublicIp(n)),
        (ResourceKind::VirtualMachine, Element::Node(n)) => Box::new(VirtualMachine(n)),
        (ResourceKind::StorageAccount, Element::Node(n)) => Box::new(StorageAccount(n)),
        (ResourceKind::AppServicePlan, Element::Node(n)) => Box::new(AppServicePlan(n)),
        (ResourceKind::WebApp, Element::Node(n)) => Box::new(WebApp(n)),
        (kind, element) => Box::new(Misplaced { kind, element }),
    };
    Some(capability)
}

/// A resource tag used on the wrong element type (e.g. a `subnet` node).
struct Misplaced<'a> {
    kind: ResourceKind,
    element: Element<'a>,
}

impl ArmResource for Misplaced<'_> {
    fn parameters(&self, _ctx: &ExtractContext<'_>) -> Result<Vec<(String, ParameterDef)>, ExtractionError> {
        Err(self.error())
    }

    fn resources(&self, _ctx: &ExtractContext<'_>) -> Result<Vec<Resource>, ExtractionError> {
        Err(self.error())
    }
}

impl Misplaced<'_> {
    fn error(&self) -> ExtractionError {
        let expected = if self.kind.is_container() { "group" } else { "node" };
        ExtractionError::new(
            self.element.id(),
            format!("'{}' must be placed on the canvas as a {}", self.kind.tag(), expected),
        )
    }
}

/// Read-only view of the graph handed to extractors.
#[derive(Clone, Copy)]
pub struct ExtractContext<'a> {
    pub graph: &'a TopologyGraph,
}

impl<'a> ExtractContext<'a> {
    pub fn new(graph: &'a TopologyGraph) -> Self {
        Self { graph }
    }

    /// Elements connected to `id` by a link in either direction, deduplicated,
    /// in link order.
    pub fn linked(&self, id: &str) -> Vec<Element<'a>> {
        let mut seen: Vec<&str> = Vec::new();
        let mut out = Vec::new();
        for link in self.graph.links() {
            let other = if link.source == id {
                &link.target
            } else if link.target == id {
                &link.source
            } else {
                continue;
            };
            if seen.contains(&other.as_str()) {
                continue;
            }
            if let Some(el) = self.graph.element(other) {
                seen.push(el.id());
                out.push(el);
            }
        }
        out
    }

    pub fn linked_of_kind(&self, id: &str, kind: ResourceKind) -> Vec<Element<'a>> {
        self.linked(id)
            .into_iter()
            .filter(|e| e.kind() == kind.tag())
            .collect()
    }

    pub fn parent_of(&self, element: Element<'_>) -> Option<Element<'a>> {
        element
            .parent()
            .and_then(|pid| self.graph.group(pid))
            .map(Element::Group)
    }
}

// --- Naming helpers shared by the extractors ---

/// ARM-facing name of an element: its `name` property, else its id.
pub fn display_name<'a>(element: Element<'a>) -> &'a str {
    element
        .property_str("name")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| element.id())
}

/// String property with a fallback, escaped as an ARM literal. A property
/// that is present but not a string is an error rather than a silent default.
pub fn string_prop(element: Element<'_>, name: &str, default: &str) -> Result<String, ExtractionError> {
    match element.properties().get(name) {
        None => Ok(literal(default)),
        Some(serde_json::Value::String(s)) => Ok(literal(s)),
        Some(other) => Err(ExtractionError::new(
            element.id(),
            format!("property '{}' must be a string, got {}", name, other),
        )),
    }
}

/// Escape a user string so ARM never evaluates it: a value shaped like an
/// expression (`[...]`) gets its opening bracket doubled.
pub fn literal(value: &str) -> String {
    if value.starts_with('[') && value.ends_with(']') {
        format!("[{}", value)
    } else {
        value.to_string()
    }
}

/// Single-quoted argument inside an ARM expression.
pub fn quoted(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Identifier fragment an element contributes to its parameter names.
/// Not injective (`plan-a` and `plan_a` share `plan_a`); the builder rejects
/// designs where two elements map to the same scope.
pub fn param_scope(element_id: &str) -> String {
    element_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Parameter name scoped to one element: `vm-1` + `vmSize` -> `vm_1_vmSize`.
pub fn param_name(element_id: &str, suffix: &str) -> String {
    format!("{}_{}", param_scope(element_id), suffix)
}

pub fn param_ref(name: &str) -> String {
    format!("[parameters({})]", quoted(name))
}

pub fn resource_id(arm_type: &str, names: &[&str]) -> String {
    let args: Vec<String> = names.iter().map(|n| quoted(n)).collect();
    format!("[resourceId({}, {})]", quoted(arm_type), args.join(", "))
}
