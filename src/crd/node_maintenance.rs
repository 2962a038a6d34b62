//! NodeMaintenance Custom Resource Definition
//!
//! A NodeMaintenance expresses an operator's intent to take a single cluster
//! node out of service (cordon and drain). It is cluster-scoped and names its
//! target node in `spec.nodeName`, which cannot change once created.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "nodemaintenance.medik8s.io",
    version = "v1beta1",
    kind = "NodeMaintenance",
    plural = "nodemaintenances",
    status = "NodeMaintenanceStatus",
    shortname = "nm",
    printcolumn = r#"{"name":"Node","type":"string","jsonPath":".spec.nodeName"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NodeMaintenanceSpec {
    /// Name of the node to put into maintenance. Immutable after creation.
    pub node_name: String,

    /// Reason for the maintenance, shown to other operators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Lifecycle phase of a maintenance, owned by the reconciler
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum MaintenancePhase {
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for MaintenancePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaintenancePhase::Running => write!(f, "Running"),
            MaintenancePhase::Succeeded => write!(f, "Succeeded"),
            MaintenancePhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Observed state of a NodeMaintenance
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeMaintenanceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<MaintenancePhase>,

    /// Percentage of the drain that has completed
    #[serde(default)]
    pub drain_progress: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub last_update: Option<Time>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Pods still waiting for eviction
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_pods: Vec<String>,

    #[serde(default, rename = "totalpods")]
    pub total_pods: i32,

    #[serde(default)]
    pub eviction_pods: i32,

    /// Consecutive failures to obtain the node lease
    #[serde(default)]
    pub error_on_lease_count: i32,
}

impl NodeMaintenance {
    /// Build a NodeMaintenance with the given object name targeting `node_name`
    pub fn for_node(name: impl Into<String>, node_name: impl Into<String>) -> Self {
        NodeMaintenance::new(
            &name.into(),
            NodeMaintenanceSpec {
                node_name: node_name.into(),
                reason: None,
            },
        )
    }

    /// Name of the node this maintenance targets
    pub fn node_name(&self) -> &str {
        &self.spec.node_name
    }

    /// Whether the object has been marked for deletion
    ///
    /// Objects being deleted no longer hold the node and do not conflict
    /// with new maintenance requests.
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether `other` refers to the same object as `self`
    pub fn is_same_object(&self, other: &NodeMaintenance) -> bool {
        self.name_any() == other.name_any()
    }
}
