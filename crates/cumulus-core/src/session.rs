//! Single-writer access to the live design.
//!
//! Every mutation, including a whole load (clear, fetch, repopulate), holds the
//! write lock, so a user edit can never land in the middle of a load. Builds
//! and saves only need a read lock on the current snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::dto::{self, LoadSummary, PersistedGraph};
use crate::error::{BoundaryError, Error, ExtractionError};
use crate::graph::TopologyGraph;
use crate::store::{is_success, DesignStore};
use crate::template::{self, ArmTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { status: u16 },
    /// The graph is empty; nothing was sent to the store.
    NothingToSave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(LoadSummary),
    /// A newer load was requested while this one was fetching. The payload was
    /// discarded and the graph left for the newer load to fill.
    Superseded,
}

#[derive(Default)]
pub struct DesignSession {
    graph: RwLock<TopologyGraph>,
    latest_load: AtomicU64,
    current_name: RwLock<Option<String>>,
}

impl DesignSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read<R>(&self, f: impl FnOnce(&TopologyGraph) -> R) -> R {
        let graph = self.graph.read().await;
        f(&graph)
    }

    pub async fn edit<R>(&self, f: impl FnOnce(&mut TopologyGraph) -> R) -> R {
        let mut graph = self.graph.write().await;
        f(&mut graph)
    }

    pub async fn snapshot(&self) -> TopologyGraph {
        self.graph.read().await.clone()
    }

    pub async fn clear(&self) {
        self.graph.write().await.clear();
        *self.current_name.write().await = None;
    }

    /// Name of the design last saved or loaded in this session.
    pub async fn current_name(&self) -> Option<String> {
        self.current_name.read().await.clone()
    }

    pub async fn build_template(&self) -> Result<Option<ArmTemplate>, ExtractionError> {
        let graph = self.graph.read().await;
        template::build_template(&graph)
    }

    pub async fn to_persisted(&self) -> Option<PersistedGraph> {
        let graph = self.graph.read().await;
        dto::to_persisted(&graph)
    }

    pub async fn save(&self, store: &dyn DesignStore, name: &str) -> Result<SaveOutcome, Error> {
        if name.trim().is_empty() {
            return Err(BoundaryError::EmptyName.into());
        }
        let Some(persisted) = self.to_persisted().await else {
            tracing::info!(design = %name, "nothing to save");
            return Ok(SaveOutcome::NothingToSave);
        };
        let payload = persisted.to_json()?;

        let status = store.save(name, &payload).await?;
        if !is_success(status) {
            tracing::warn!(design = %name, status, "design store rejected save");
            return Err(BoundaryError::Status {
                operation: "save",
                code: status,
            }
            .into());
        }
        tracing::info!(design = %name, status, bytes = payload.len(), "design saved");
        *self.current_name.write().await = Some(name.to_string());
        Ok(SaveOutcome::Saved { status })
    }

    /// Clear the graph and repopulate it from the store.
    ///
    /// Any failure leaves the graph cleared; callers should report it and let
    /// the user retry rather than patch up a partial design.
    pub async fn load(&self, store: &dyn DesignStore, name: &str) -> Result<LoadOutcome, Error> {
        if name.trim().is_empty() {
            return Err(BoundaryError::EmptyName.into());
        }
        let ticket = self.latest_load.fetch_add(1, Ordering::SeqCst) + 1;

        let mut graph = self.graph.write().await;
        graph.clear();
        *self.current_name.write().await = None;

        let (status, payload) = store.load(name).await?;
        if !is_success(status) {
            tracing::warn!(design = %name, status, "design store rejected load");
            return Err(BoundaryError::Status {
                operation: "load",
                code: status,
            }
            .into());
        }
        if self.latest_load.load(Ordering::SeqCst) != ticket {
            tracing::info!(design = %name, "load superseded by a newer request");
            return Ok(LoadOutcome::Superseded);
        }
        if payload.trim().is_empty() {
            return Err(BoundaryError::Payload("design is empty".to_string()).into());
        }
        let persisted =
            PersistedGraph::from_json(&payload).map_err(|e| BoundaryError::Payload(e.to_string()))?;

        let summary = dto::from_persisted(&mut graph, &persisted)?;
        tracing::info!(
            design = %name,
            nodes = summary.nodes,
            groups = summary.groups,
            links = summary.links,
            "design loaded"
        );
        *self.current_name.write().await = Some(name.to_string());
        Ok(LoadOutcome::Loaded(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use crate::store::{MemoryDesignStore, STATUS_CREATED};
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn empty_session_has_nothing_to_save() {
        let session = DesignSession::new();
        let store = MemoryDesignStore::new();
        assert_eq!(session.save(&store, "x").await.unwrap(), SaveOutcome::NothingToSave);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_names_are_rejected() {
        let session = DesignSession::new();
        let store = MemoryDesignStore::new();
        assert!(matches!(
            session.save(&store, "  ").await,
            Err(Error::Boundary(BoundaryError::EmptyName))
        ));
        assert!(matches!(
            session.load(&store, "").await,
            Err(Error::Boundary(BoundaryError::EmptyName))
        ));
    }

    #[tokio::test]
    async fn save_then_load_restores_the_graph() {
        let session = DesignSession::new();
        let store = MemoryDesignStore::new();
        session
            .edit(|g| g.add_node(Node::new("n1", "public-ip")))
            .await
            .unwrap();
        let before = session.snapshot().await;

        assert_eq!(
            session.save(&store, "edge").await.unwrap(),
            SaveOutcome::Saved { status: STATUS_CREATED }
        );
        session.clear().await;
        let outcome = session.load(&store, "edge").await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Loaded(LoadSummary { nodes: 1, .. })));
        assert_eq!(session.snapshot().await, before);
        assert_eq!(session.current_name().await.as_deref(), Some("edge"));
    }

    #[tokio::test]
    async fn missing_design_reports_status_and_leaves_graph_cleared() {
        let session = DesignSession::new();
        let store = MemoryDesignStore::new();
        session
            .edit(|g| g.add_node(Node::new("n1", "public-ip")))
            .await
            .unwrap();
        let err = session.load(&store, "nope").await.unwrap_err();
        assert_eq!(err.to_string(), "failed to load the design. Error code: 404");
        assert!(session.read(|g| g.is_empty()).await);
    }

    /// Holds loads of `gated` until released.
    struct GatedStore {
        inner: MemoryDesignStore,
        gated: &'static str,
        entered: Notify,
        release: Notify,
    }

    #[async_trait::async_trait]
    impl DesignStore for GatedStore {
        async fn save(&self, name: &str, data: &str) -> Result<u16, BoundaryError> {
            self.inner.save(name, data).await
        }

        async fn load(&self, name: &str) -> Result<(u16, String), BoundaryError> {
            if name == self.gated {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.load(name).await
        }

        async fn list(&self) -> Result<Vec<String>, BoundaryError> {
            self.inner.list().await
        }
    }

    #[tokio::test]
    async fn newer_load_supersedes_an_inflight_one() {
        let store = Arc::new(GatedStore {
            inner: MemoryDesignStore::new(),
            gated: "slow",
            entered: Notify::new(),
            release: Notify::new(),
        });
        store
            .save("slow", r#"{"nodes":[{"id":"old","kind":"public-ip"}]}"#)
            .await
            .unwrap();
        store
            .save("fast", r#"{"nodes":[{"id":"new","kind":"public-ip"}]}"#)
            .await
            .unwrap();
        let session = Arc::new(DesignSession::new());

        let first = {
            let (session, store) = (session.clone(), store.clone());
            tokio::spawn(async move { session.load(store.as_ref(), "slow").await })
        };
        store.entered.notified().await;

        let second = {
            let (session, store) = (session.clone(), store.clone());
            tokio::spawn(async move { session.load(store.as_ref(), "fast").await })
        };
        // let the second load take its ticket and queue on the lock
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        store.release.notify_one();

        assert_eq!(first.await.unwrap().unwrap(), LoadOutcome::Superseded);
        assert!(matches!(second.await.unwrap().unwrap(), LoadOutcome::Loaded(_)));
        let ids: Vec<String> = session
            .read(|g| g.nodes().iter().map(|n| n.id.clone()).collect())
            .await;
        assert_eq!(ids, vec!["new"]);
        assert_eq!(session.current_name().await.as_deref(), Some("fast"));
    }

    #[tokio::test]
    async fn unreadable_payload_is_a_boundary_error() {
        let session = DesignSession::new();
        let store = MemoryDesignStore::new();
        store.save("junk", "not json").await.unwrap();
        assert!(matches!(
            session.load(&store, "junk").await,
            Err(Error::Boundary(BoundaryError::Payload(_)))
        ));
    }
}
