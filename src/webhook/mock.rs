//! In-memory cluster state
//!
//! Implements [`ClusterStateReader`] over plain maps so the admission checks
//! can be exercised without an API server. Reads can be slowed down or made
//! to fail per resource kind. Every read is counted when it starts and again
//! when it is served, so abandoned reads show up as the difference.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetStatus};
use kube::api::ObjectMeta;
use kube::core::ErrorResponse;
use kube::ResourceExt;
use tokio::sync::RwLock;
use tracing::debug;

use super::reader::ClusterStateReader;
use crate::crd::NodeMaintenance;

/// Resource kinds served by the in-memory reader
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MockResource {
    Node,
    NodeMaintenance,
    PodDisruptionBudget,
}

#[derive(Default)]
struct ReadCounters {
    nodes: AtomicUsize,
    maintenances: AtomicUsize,
    budgets: AtomicUsize,
}

impl ReadCounters {
    fn get(&self, resource: MockResource) -> &AtomicUsize {
        match resource {
            MockResource::Node => &self.nodes,
            MockResource::NodeMaintenance => &self.maintenances,
            MockResource::PodDisruptionBudget => &self.budgets,
        }
    }
}

/// In-memory [`ClusterStateReader`]
#[derive(Default)]
pub struct InMemoryClusterState {
    nodes: RwLock<BTreeMap<String, Node>>,
    maintenances: RwLock<BTreeMap<String, NodeMaintenance>>,
    budgets: RwLock<BTreeMap<(String, String), PodDisruptionBudget>>,
    failing: RwLock<HashSet<MockResource>>,
    delay: RwLock<Option<Duration>>,
    reads: ReadCounters,
    completed: ReadCounters,
}

impl InMemoryClusterState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn add_node(&self, node: Node) {
        let name = node.name_any();
        debug!("Mock: node added: {}", name);
        self.nodes.write().await.insert(name, node);
    }

    pub async fn remove_node(&self, name: &str) {
        self.nodes.write().await.remove(name);
    }

    pub async fn add_maintenance(&self, nm: NodeMaintenance) {
        let name = nm.name_any();
        debug!("Mock: NodeMaintenance added: {}", name);
        self.maintenances.write().await.insert(name, nm);
    }

    pub async fn remove_maintenance(&self, name: &str) {
        self.maintenances.write().await.remove(name);
    }

    pub async fn add_disruption_budget(&self, pdb: PodDisruptionBudget) {
        let key = (pdb.namespace().unwrap_or_default(), pdb.name_any());
        self.budgets.write().await.insert(key, pdb);
    }

    pub async fn remove_disruption_budget(&self, namespace: &str, name: &str) {
        self.budgets
            .write()
            .await
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Make every read of `resource` fail until [`Self::heal`] is called
    pub async fn fail_reads(&self, resource: MockResource) {
        self.failing.write().await.insert(resource);
    }

    pub async fn heal(&self) {
        self.failing.write().await.clear();
    }

    /// Delay every read by `delay`
    pub async fn set_read_delay(&self, delay: Option<Duration>) {
        *self.delay.write().await = delay;
    }

    /// Number of reads of `resource` started so far
    pub fn reads(&self, resource: MockResource) -> usize {
        self.reads.get(resource).load(Ordering::SeqCst)
    }

    /// Number of reads of `resource` that ran to completion, failed or not
    pub fn completed_reads(&self, resource: MockResource) -> usize {
        self.completed.get(resource).load(Ordering::SeqCst)
    }

    async fn begin_read(&self, resource: MockResource) -> Result<(), kube::Error> {
        self.reads.get(resource).fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        // not reached when the caller drops the read while it sleeps
        self.completed.get(resource).fetch_add(1, Ordering::SeqCst);

        if self.failing.read().await.contains(&resource) {
            return Err(kube::Error::Api(ErrorResponse {
                status: "Failure".to_string(),
                message: format!("simulated {:?} read failure", resource),
                reason: "ServiceUnavailable".to_string(),
                code: 503,
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterStateReader for InMemoryClusterState {
    async fn get_node(&self, name: &str) -> Result<Option<Node>, kube::Error> {
        self.begin_read(MockResource::Node).await?;
        Ok(self.nodes.read().await.get(name).cloned())
    }

    async fn list_node_maintenances(&self) -> Result<Vec<NodeMaintenance>, kube::Error> {
        self.begin_read(MockResource::NodeMaintenance).await?;
        Ok(self.maintenances.read().await.values().cloned().collect())
    }

    async fn get_disruption_budget(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PodDisruptionBudget>, kube::Error> {
        self.begin_read(MockResource::PodDisruptionBudget).await?;
        Ok(self
            .budgets
            .read()
            .await
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}

/// Build a Node carrying `labels`
pub fn test_node(name: &str, labels: &[(&str, &str)]) -> Node {
    let labels: BTreeMap<String, String> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: if labels.is_empty() { None } else { Some(labels) },
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Build a PodDisruptionBudget; `disruptions_allowed` of `None` leaves the
/// status unset, as it is right after creation
pub fn test_disruption_budget(
    namespace: &str,
    name: &str,
    disruptions_allowed: Option<i32>,
) -> PodDisruptionBudget {
    PodDisruptionBudget {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: None,
        status: disruptions_allowed.map(|allowed| PodDisruptionBudgetStatus {
            disruptions_allowed: allowed,
            ..Default::default()
        }),
    }
}
