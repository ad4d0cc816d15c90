use cumulus_core::{
    build_template, from_persisted, to_persisted, DesignSession, Error, Group, IntegrityError, Link,
    LoadOutcome, MemoryDesignStore, Node, PersistedGraph, SaveOutcome, TopologyGraph,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn hub_and_spoke() -> TopologyGraph {
    let mut g = TopologyGraph::new();
    g.add_group(
        Group::new("hub", "virtual-network")
            .with_property("addressPrefix", "10.1.0.0/16")
            .at(0.0, 0.0),
    )
    .unwrap();
    g.add_group(Group::new("frontend", "subnet").in_group("hub")).unwrap();
    g.add_group(Group::new("backend", "subnet").in_group("hub")).unwrap();
    g.add_group(Group::new("notes", "sticky-area")).unwrap();
    g.add_node(Node::new("nic-1", "network-interface").in_group("frontend")).unwrap();
    g.add_node(Node::new("nic-2", "network-interface").in_group("backend")).unwrap();
    g.add_node(
        Node::new("vm-1", "virtual-machine")
            .with_property("vmSize", "Standard_D2s_v5")
            .at(120.5, 40.0),
    )
    .unwrap();
    g.add_node(Node::new("pip", "public-ip")).unwrap();
    g.add_node(Node::new("todo", "text-note").in_group("notes").with_property("text", "ask ops")).unwrap();
    g.add_link(Link::new("vm-nic-1", "vm-1", "nic-1")).unwrap();
    g.add_link(Link::new("vm-nic-2", "nic-2", "vm-1")).unwrap();
    g.add_link(Link::new("nic-pip", "nic-1", "pip").with_property("label", "ingress")).unwrap();
    g
}

#[test]
fn persisted_graph_reloads_identically() {
    let original = hub_and_spoke();
    let raw = to_persisted(&original).unwrap().to_json().unwrap();

    let mut reloaded = TopologyGraph::new();
    let summary = from_persisted(&mut reloaded, &PersistedGraph::from_json(&raw).unwrap()).unwrap();

    assert_eq!(reloaded, original);
    assert_eq!((summary.nodes, summary.groups, summary.links), (5, 4, 3));
    assert_eq!(reloaded.group("hub").unwrap().child_groups(), ["frontend", "backend"]);
    assert_eq!(
        build_template(&reloaded).unwrap(),
        build_template(&original).unwrap()
    );
}

#[tokio::test]
async fn self_link_scenario_exports_one_parameter_and_one_resource() {
    let session = DesignSession::new();
    let store = MemoryDesignStore::new();
    session
        .edit(|g| {
            g.add_node(Node::new("n1", "app-service-plan").with_property("sku", "small"))?;
            g.add_link(Link::new("loop", "n1", "n1"))?;
            assert!(g.remove_link("loop"));
            Ok::<_, IntegrityError>(())
        })
        .await
        .unwrap();

    assert!(matches!(
        session.save(&store, "scenario").await.unwrap(),
        SaveOutcome::Saved { .. }
    ));
    session.clear().await;
    assert!(session.read(|g| g.is_empty()).await);

    assert!(matches!(
        session.load(&store, "scenario").await.unwrap(),
        LoadOutcome::Loaded(_)
    ));
    let template = session.build_template().await.unwrap().unwrap();

    assert_eq!(template.parameters.keys().collect::<Vec<_>>(), vec!["n1_sku"]);
    assert_eq!(template.parameters["n1_sku"].default_value, Some(json!("small")));
    assert_eq!(template.resources.len(), 1);
    assert_eq!(template.resources[0].name, "n1");
    assert_eq!(template.resources[0].element_id, "n1");
}

#[tokio::test]
async fn dangling_link_fails_reload_and_leaves_the_session_empty() {
    let store = MemoryDesignStore::new();
    let document = json!({
        "nodes": [{ "id": "a", "kind": "public-ip" }],
        "links": [{ "id": "l", "source": "a", "target": "ghost" }]
    });
    cumulus_core::DesignStore::save(&store, "broken", &document.to_string())
        .await
        .unwrap();

    let session = DesignSession::new();
    session
        .edit(|g| g.add_node(Node::new("stale", "text-note")))
        .await
        .unwrap();

    let err = session.load(&store, "broken").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Integrity(IntegrityError::DanglingEndpoint { ref link, ref endpoint })
            if link == "l" && endpoint == "ghost"
    ));
    assert!(session.read(|g| g.is_empty() && g.links().is_empty()).await);
    assert_eq!(session.current_name().await, None);
}

#[test]
fn empty_graph_has_nothing_to_build_or_persist() {
    let g = TopologyGraph::new();
    assert_eq!(build_template(&g).unwrap(), None);
    assert_eq!(to_persisted(&g), None);
}
