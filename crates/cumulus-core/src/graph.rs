use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::IntegrityError;

/// Property name -> value. Ordered by key so every rendering is deterministic.
pub type Properties = BTreeMap<String, serde_json::Value>;

/// Canvas coordinates. Diagram-only metadata, never read by the exporters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, schemars::JsonSchema)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub kind: String,
    pub properties: Properties,
    pub group: Option<String>,
    pub position: Option<Position>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            properties: Properties::new(),
            group: None,
            position: None,
        }
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position { x, y });
        self
    }
}

/// A container. Membership lists are owned by the graph and kept in insertion
/// order; whatever a caller puts in them before `add_group` is discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub id: String,
    pub kind: String,
    pub properties: Properties,
    pub parent: Option<String>,
    pub position: Option<Position>,
    child_groups: Vec<String>,
    child_nodes: Vec<String>,
}

impl Group {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            properties: Properties::new(),
            parent: None,
            position: None,
            child_groups: Vec::new(),
            child_nodes: Vec::new(),
        }
    }

    pub fn in_group(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position { x, y });
        self
    }

    pub fn child_groups(&self) -> &[String] {
        &self.child_groups
    }

    pub fn child_nodes(&self) -> &[String] {
        &self.child_nodes
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub id: String,
    pub source: String,
    pub target: String,
    pub properties: Properties,
}

impl Link {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn touches(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }
}

/// Borrowed view over anything a link can point at.
#[derive(Debug, Clone, Copy)]
pub enum Element<'a> {
    Node(&'a Node),
    Group(&'a Group),
}

impl<'a> Element<'a> {
    pub fn id(&self) -> &'a str {
        match *self {
            Element::Node(n) => &n.id,
            Element::Group(g) => &g.id,
        }
    }

    pub fn kind(&self) -> &'a str {
        match *self {
            Element::Node(n) => &n.kind,
            Element::Group(g) => &g.kind,
        }
    }

    pub fn properties(&self) -> &'a Properties {
        match *self {
            Element::Node(n) => &n.properties,
            Element::Group(g) => &g.properties,
        }
    }

    /// Id of the directly enclosing group, if any.
    pub fn parent(&self) -> Option<&'a str> {
        match *self {
            Element::Node(n) => n.group.as_deref(),
            Element::Group(g) => g.parent.as_deref(),
        }
    }

    pub fn property_str(&self, name: &str) -> Option<&'a str> {
        self.properties().get(name).and_then(|v| v.as_str())
    }
}

/// The live design: nodes, groups and links, with nesting.
///
/// Not internally synchronized. Concurrent access goes through
/// [`crate::session::DesignSession`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopologyGraph {
    nodes: Vec<Node>,
    groups: Vec<Group>,
    links: Vec<Link>,
}

impl TopologyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn top_level_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.group.is_none())
    }

    pub fn top_level_groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter().filter(|g| g.parent.is_none())
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn link(&self, id: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.id == id)
    }

    /// Resolve a node or group id.
    pub fn element(&self, id: &str) -> Option<Element<'_>> {
        self.node(id)
            .map(Element::Node)
            .or_else(|| self.group(id).map(Element::Group))
    }

    /// True if any node, group or link already uses `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.element(id).is_some() || self.link(id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len() + self.groups.len() + self.links.len()
    }

    pub fn links_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.iter().filter(move |l| l.touches(id))
    }

    /// Direct children of a group: nested groups first, then member nodes,
    /// each in insertion order. Empty for unknown ids.
    pub fn children_of(&self, group_id: &str) -> Vec<Element<'_>> {
        let Some(group) = self.group(group_id) else {
            return Vec::new();
        };
        let groups = group
            .child_groups
            .iter()
            .filter_map(|id| self.group(id).map(Element::Group));
        let nodes = group
            .child_nodes
            .iter()
            .filter_map(|id| self.node(id).map(Element::Node));
        groups.chain(nodes).collect()
    }

    /// Enclosing groups of `id`, innermost first.
    pub fn ancestors_of(&self, id: &str) -> Vec<&Group> {
        let mut out = Vec::new();
        let mut next = self.element(id).and_then(|e| e.parent());
        while let Some(pid) = next {
            let Some(group) = self.group(pid) else { break };
            out.push(group);
            next = group.parent.as_deref();
        }
        out
    }

    pub fn add_node(&mut self, mut node: Node) -> Result<(), IntegrityError> {
        if self.contains(&node.id) {
            return Err(IntegrityError::DuplicateId(node.id));
        }
        if let Some(gid) = &node.group {
            let Some(group) = self.groups.iter_mut().find(|g| g.id == *gid) else {
                return Err(IntegrityError::UnknownParent {
                    child: node.id,
                    parent: gid.clone(),
                });
            };
            group.child_nodes.push(node.id.clone());
        }
        node.properties.retain(|_, v| !v.is_null());
        self.nodes.push(node);
        Ok(())
    }

    pub fn add_group(&mut self, mut group: Group) -> Result<(), IntegrityError> {
        if self.contains(&group.id) {
            return Err(IntegrityError::DuplicateId(group.id));
        }
        if let Some(pid) = &group.parent {
            let Some(parent) = self.groups.iter_mut().find(|g| g.id == *pid) else {
                return Err(IntegrityError::UnknownParent {
                    child: group.id,
                    parent: pid.clone(),
                });
            };
            parent.child_groups.push(group.id.clone());
        }
        group.child_groups.clear();
        group.child_nodes.clear();
        group.properties.retain(|_, v| !v.is_null());
        self.groups.push(group);
        Ok(())
    }

    pub fn add_link(&mut self, mut link: Link) -> Result<(), IntegrityError> {
        if self.contains(&link.id) {
            return Err(IntegrityError::DuplicateId(link.id));
        }
        for endpoint in [&link.source, &link.target] {
            if self.element(endpoint).is_none() {
                return Err(IntegrityError::DanglingEndpoint {
                    link: link.id.clone(),
                    endpoint: endpoint.clone(),
                });
            }
        }
        link.properties.retain(|_, v| !v.is_null());
        self.links.push(link);
        Ok(())
    }

    /// Remove a node and every link touching it. Unknown ids are ignored.
    pub fn remove_node(&mut self, id: &str) -> bool {
        let Some(pos) = self.nodes.iter().position(|n| n.id == id) else {
            return false;
        };
        let node = self.nodes.remove(pos);
        if let Some(gid) = &node.group {
            if let Some(group) = self.groups.iter_mut().find(|g| g.id == *gid) {
                group.child_nodes.retain(|c| c != id);
            }
        }
        self.links.retain(|l| !l.touches(id));
        true
    }

    /// Remove a group together with everything nested inside it and every link
    /// touching a removed element. Unknown ids are ignored.
    pub fn remove_group(&mut self, id: &str) -> bool {
        let Some(group) = self.group(id) else {
            return false;
        };
        let parent = group.parent.clone();

        let mut doomed: HashSet<String> = HashSet::new();
        let mut stack = vec![id.to_string()];
        while let Some(gid) = stack.pop() {
            if let Some(g) = self.group(&gid) {
                doomed.extend(g.child_nodes.iter().cloned());
                stack.extend(g.child_groups.iter().cloned());
            }
            doomed.insert(gid);
        }

        if let Some(pid) = parent {
            if let Some(p) = self.groups.iter_mut().find(|g| g.id == pid) {
                p.child_groups.retain(|c| c != id);
            }
        }
        self.groups.retain(|g| !doomed.contains(&g.id));
        self.nodes.retain(|n| !doomed.contains(&n.id));
        self.links
            .retain(|l| !doomed.contains(&l.source) && !doomed.contains(&l.target));
        true
    }

    pub fn remove_link(&mut self, id: &str) -> bool {
        let before = self.links.len();
        self.links.retain(|l| l.id != id);
        self.links.len() != before
    }

    /// Remove whatever element `id` names (node, group or link).
    pub fn remove(&mut self, id: &str) -> bool {
        self.remove_node(id) || self.remove_group(id) || self.remove_link(id)
    }

    /// Set (or, with `Value::Null`, delete) a property on any element.
    pub fn set_property(
        &mut self,
        id: &str,
        name: &str,
        value: serde_json::Value,
    ) -> Result<(), IntegrityError> {
        let properties = self
            .properties_mut(id)
            .ok_or_else(|| IntegrityError::UnknownElement(id.to_string()))?;
        if value.is_null() {
            properties.remove(name);
        } else {
            properties.insert(name.to_string(), value);
        }
        Ok(())
    }

    /// Returns whether the property was present.
    pub fn remove_property(&mut self, id: &str, name: &str) -> Result<bool, IntegrityError> {
        let properties = self
            .properties_mut(id)
            .ok_or_else(|| IntegrityError::UnknownElement(id.to_string()))?;
        Ok(properties.remove(name).is_some())
    }

    pub fn clear(&mut self) {
        self.links.clear();
        self.nodes.clear();
        self.groups.clear();
    }

    fn properties_mut(&mut self, id: &str) -> Option<&mut Properties> {
        if let Some(n) = self.nodes.iter_mut().find(|n| n.id == id) {
            return Some(&mut n.properties);
        }
        if let Some(g) = self.groups.iter_mut().find(|g| g.id == id) {
            return Some(&mut g.properties);
        }
        self.links
            .iter_mut()
            .find(|l| l.id == id)
            .map(|l| &mut l.properties)
    }
}
