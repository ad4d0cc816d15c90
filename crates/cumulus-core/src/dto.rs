//! Flat, serializable form of a [`TopologyGraph`] used for save/load.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Error, IntegrityError};
use crate::graph::{Group, Link, Node, Position, Properties, TopologyGraph};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: String,
    /// Resource type tag, e.g. "virtual-machine" or "text-note"
    pub kind: String,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
    /// Id of the enclosing group, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    pub id: String,
    /// Container type tag, e.g. "virtual-network" or "subnet"
    pub kind: String,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
    /// Id of the enclosing group, if any. Must appear earlier in the same document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkRecord {
    pub id: String,
    /// Source node or group id
    pub source: String,
    /// Target node or group id
    pub target: String,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedGraph {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub groups: Vec<GroupRecord>,
    #[serde(default)]
    pub links: Vec<LinkRecord>,
}

impl PersistedGraph {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Counts reported after a successful load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub nodes: usize,
    pub groups: usize,
    pub links: usize,
}

/// Flatten the graph. `None` when there is nothing to persist.
///
/// Groups keep their insertion order, which is always parent-before-child
/// because the graph refuses a group whose parent doesn't exist yet.
pub fn to_persisted(graph: &TopologyGraph) -> Option<PersistedGraph> {
    if graph.is_empty() {
        return None;
    }
    Some(PersistedGraph {
        nodes: graph.nodes().iter().map(node_record).collect(),
        groups: graph.groups().iter().map(group_record).collect(),
        links: graph.links().iter().map(link_record).collect(),
    })
}

/// Replace the contents of `graph` with `persisted`.
///
/// Groups first, then nodes, then links. On any integrity failure the graph
/// is left cleared, never half-populated.
pub fn from_persisted(graph: &mut TopologyGraph, persisted: &PersistedGraph) -> Result<LoadSummary, Error> {
    let mut fresh = TopologyGraph::new();
    match populate(&mut fresh, persisted) {
        Ok(summary) => {
            *graph = fresh;
            Ok(summary)
        }
        Err(e) => {
            graph.clear();
            Err(e.into())
        }
    }
}

fn populate(graph: &mut TopologyGraph, persisted: &PersistedGraph) -> Result<LoadSummary, IntegrityError> {
    let stored_groups: HashSet<&str> = persisted.groups.iter().map(|g| g.id.as_str()).collect();

    for record in &persisted.groups {
        if let Some(pid) = &record.parent_id {
            if graph.group(pid).is_none() {
                let child = record.id.clone();
                let parent = pid.clone();
                return Err(if stored_groups.contains(pid.as_str()) {
                    IntegrityError::ParentNotYetLoaded { child, parent }
                } else {
                    IntegrityError::UnknownParent { child, parent }
                });
            }
        }
        let mut group = Group::new(&record.id, &record.kind);
        group.properties = record.properties.clone();
        group.parent = record.parent_id.clone();
        group.position = record.position;
        graph.add_group(group)?;
    }

    for record in &persisted.nodes {
        graph.add_node(Node {
            id: record.id.clone(),
            kind: record.kind.clone(),
            properties: record.properties.clone(),
            group: record.group_id.clone(),
            position: record.position,
        })?;
    }

    for record in &persisted.links {
        let mut link = Link::new(&record.id, &record.source, &record.target);
        link.properties = record.properties.clone();
        graph.add_link(link)?;
    }

    Ok(LoadSummary {
        nodes: persisted.nodes.len(),
        groups: persisted.groups.len(),
        links: persisted.links.len(),
    })
}

fn node_record(node: &Node) -> NodeRecord {
    NodeRecord {
        id: node.id.clone(),
        kind: node.kind.clone(),
        properties: node.properties.clone(),
        group_id: node.group.clone(),
        position: node.position,
    }
}

fn group_record(group: &Group) -> GroupRecord {
    GroupRecord {
        id: group.id.clone(),
        kind: group.kind.clone(),
        properties: group.properties.clone(),
        parent_id: group.parent.clone(),
        position: group.position,
    }
}

fn link_record(link: &Link) -> LinkRecord {
    LinkRecord {
        id: link.id.clone(),
        source: link.source.clone(),
        target: link.target.clone(),
        properties: link.properties.clone(),
    }
}
