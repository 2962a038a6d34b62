//! Point-in-time reads of cluster state
//!
//! The admission checks only ever read three kinds of objects. This trait is
//! the seam between the checks and the API server, so tests and dry runs can
//! substitute an in-memory view (`mock::InMemoryClusterState`, behind the
//! `test-util` feature).

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::debug;

use crate::crd::NodeMaintenance;

/// Read-only view of the cluster used by the admission checks
///
/// `Ok(None)` means the object does not exist. Every other failure is an
/// `Err` and must never be read as absence.
#[async_trait]
pub trait ClusterStateReader: Send + Sync {
    /// Get a Node by name
    async fn get_node(&self, name: &str) -> Result<Option<Node>, kube::Error>;

    /// List all NodeMaintenance objects in the cluster
    async fn list_node_maintenances(&self) -> Result<Vec<NodeMaintenance>, kube::Error>;

    /// Get a PodDisruptionBudget by namespace and name
    async fn get_disruption_budget(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PodDisruptionBudget>, kube::Error>;
}

/// Reader backed by the Kubernetes API server
///
/// Every call goes to the API server; nothing is cached between requests.
#[derive(Clone)]
pub struct KubeClusterReader {
    client: Client,
}

impl KubeClusterReader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterStateReader for KubeClusterReader {
    async fn get_node(&self, name: &str) -> Result<Option<Node>, kube::Error> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node = nodes.get_opt(name).await?;
        debug!("Node {} found: {}", name, node.is_some());
        Ok(node)
    }

    async fn list_node_maintenances(&self) -> Result<Vec<NodeMaintenance>, kube::Error> {
        let api: Api<NodeMaintenance> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        debug!("Listed {} NodeMaintenance objects", list.items.len());
        Ok(list.items)
    }

    async fn get_disruption_budget(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PodDisruptionBudget>, kube::Error> {
        let pdbs: Api<PodDisruptionBudget> = Api::namespaced(self.client.clone(), namespace);
        pdbs.get_opt(name).await
    }
}
