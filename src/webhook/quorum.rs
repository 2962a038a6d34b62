//! etcd quorum guard
//!
//! A quorum-protection controller maintains a single PodDisruptionBudget over
//! the etcd members. Its `status.disruptionsAllowed` is the number of
//! control-plane nodes that may still go down without losing the etcd
//! majority, whichever node that turns out to be.
//!
//! When no such budget exists the topology has no quorum protection (for
//! example a single control-plane node) and the guard allows the request.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use super::checks::{bounded_read, ReadDeadline};
use super::classify::{NodeClassifier, NodeRole};
use super::config::QuorumPdbRef;
use super::error::ValidationError;
use super::reader::ClusterStateReader;

/// Outcome of a quorum check that did not reject the request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuorumDecision {
    /// Node is not an etcd member
    NotApplicable,
    /// No quorum guard budget found, quorum is not protected
    NoBudget,
    /// Budget allows at least one more disruption
    Allowed { disruptions_allowed: i32 },
}

pub struct QuorumGuard {
    classifier: Arc<dyn NodeClassifier>,
    pdb: QuorumPdbRef,
}

impl QuorumGuard {
    pub fn new(classifier: Arc<dyn NodeClassifier>, pdb: QuorumPdbRef) -> Self {
        Self { classifier, pdb }
    }

    /// Decide whether taking `node` out of service may break etcd quorum
    #[instrument(skip(self, reader, node, deadline), fields(node = %node.name_any()))]
    pub async fn check(
        &self,
        reader: &dyn ClusterStateReader,
        node: &Node,
        deadline: ReadDeadline,
    ) -> Result<QuorumDecision, ValidationError> {
        let node_name = node.name_any();

        if self.classifier.classify(node) == NodeRole::Ordinary {
            debug!("Node {} is not a control-plane node", node_name);
            return Ok(QuorumDecision::NotApplicable);
        }

        let pdb = match self.find_budget(reader, &node_name, deadline).await? {
            Some(pdb) => pdb,
            None => {
                info!(
                    "No etcd quorum guard PDB {}/{} found, allowing maintenance of control-plane node {}",
                    self.pdb.namespace, self.pdb.name, node_name
                );
                return Ok(QuorumDecision::NoBudget);
            }
        };

        let disruptions_allowed = pdb
            .status
            .as_ref()
            .map(|s| s.disruptions_allowed)
            .unwrap_or(0);

        if disruptions_allowed > 0 {
            debug!(
                "Quorum guard PDB {} allows {} disruption(s)",
                pdb.name_any(),
                disruptions_allowed
            );
            Ok(QuorumDecision::Allowed {
                disruptions_allowed,
            })
        } else {
            warn!(
                "Rejecting maintenance of control-plane node {}: quorum guard PDB {} allows no disruptions",
                node_name,
                pdb.name_any()
            );
            Err(ValidationError::ControlPlaneQuorumViolation { node: node_name })
        }
    }

    /// Fetch the quorum guard budget, falling back to its legacy name
    async fn find_budget(
        &self,
        reader: &dyn ClusterStateReader,
        node_name: &str,
        deadline: ReadDeadline,
    ) -> Result<Option<PodDisruptionBudget>, ValidationError> {
        let names = std::iter::once(self.pdb.name.as_str()).chain(
            self.pdb
                .legacy_name
                .as_deref()
                .filter(|legacy| !legacy.is_empty() && *legacy != self.pdb.name),
        );

        for name in names {
            debug!(
                "Looking up quorum guard PDB {}/{} ({:?} left)",
                self.pdb.namespace,
                name,
                deadline.remaining()
            );
            let found = bounded_read(
                node_name,
                "PodDisruptionBudget",
                deadline,
                reader.get_disruption_budget(&self.pdb.namespace, name),
            )
            .await?;
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }
}
