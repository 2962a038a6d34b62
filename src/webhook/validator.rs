//! Admission decisions for NodeMaintenance objects
//!
//! Create requests run Existence → Uniqueness → Quorum and stop at the first
//! failure. Update requests only enforce that `spec.nodeName` is unchanged.
//! The validator holds no state between calls and reads the cluster afresh
//! every time. All reads of one create request share a single deadline;
//! dropping the returned future abandons whichever read is in flight.

use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use tracing::{debug, info, instrument};

use super::checks::{ensure_no_other_maintenance, ensure_node_exists, ReadDeadline};
use super::classify::{LabelClassifier, NodeClassifier};
use super::config::GuardConfig;
use super::error::ValidationError;
use super::quorum::{QuorumDecision, QuorumGuard};
use super::reader::ClusterStateReader;
use crate::crd::NodeMaintenance;

pub struct MaintenanceValidator {
    reader: Arc<dyn ClusterStateReader>,
    quorum: QuorumGuard,
    read_timeout: Duration,
}

impl MaintenanceValidator {
    /// Create a validator classifying nodes by the configured role labels
    pub fn new(reader: Arc<dyn ClusterStateReader>, config: &GuardConfig) -> Self {
        let classifier = Arc::new(LabelClassifier::new(config.control_plane_labels.clone()));
        Self::with_classifier(reader, classifier, config)
    }

    /// Create a validator with a custom node classification source
    pub fn with_classifier(
        reader: Arc<dyn ClusterStateReader>,
        classifier: Arc<dyn NodeClassifier>,
        config: &GuardConfig,
    ) -> Self {
        Self {
            reader,
            quorum: QuorumGuard::new(classifier, config.quorum_pdb.clone()),
            read_timeout: config.read_timeout(),
        }
    }

    /// Decide whether `candidate` may be created, within the configured
    /// read timeout
    pub async fn validate_create(&self, candidate: &NodeMaintenance) -> Result<(), ValidationError> {
        self.validate_create_within(candidate, None).await
    }

    /// Decide whether `candidate` may be created before `request_timeout`
    /// runs out
    ///
    /// The effective budget is the shorter of `request_timeout` and the
    /// configured read timeout. It covers every read of the request, not
    /// each read separately.
    #[instrument(skip(self, candidate, request_timeout), fields(name = %candidate.name_any(), node = %candidate.node_name()))]
    pub async fn validate_create_within(
        &self,
        candidate: &NodeMaintenance,
        request_timeout: Option<Duration>,
    ) -> Result<(), ValidationError> {
        let budget = request_timeout.map_or(self.read_timeout, |t| t.min(self.read_timeout));
        let deadline = ReadDeadline::after(budget);
        let reader = &*self.reader;

        let node = ensure_node_exists(reader, candidate.node_name(), deadline).await?;
        ensure_no_other_maintenance(reader, candidate, deadline).await?;
        let decision = self.quorum.check(reader, &node, deadline).await?;

        match decision {
            QuorumDecision::NoBudget => info!(
                "Admitting NodeMaintenance {} for node {} without quorum protection",
                candidate.name_any(),
                candidate.node_name()
            ),
            _ => debug!(
                "Admitting NodeMaintenance {} for node {}",
                candidate.name_any(),
                candidate.node_name()
            ),
        }
        Ok(())
    }

    /// Decide whether `old` may be replaced by `candidate`
    #[instrument(skip(self, old, candidate), fields(name = %candidate.name_any()))]
    pub fn validate_update(
        &self,
        old: &NodeMaintenance,
        candidate: &NodeMaintenance,
    ) -> Result<(), ValidationError> {
        validate_node_name_unchanged(old, candidate)
    }
}

/// `spec.nodeName` must be byte-identical between the stored and new object
pub fn validate_node_name_unchanged(
    old: &NodeMaintenance,
    candidate: &NodeMaintenance,
) -> Result<(), ValidationError> {
    if old.node_name() != candidate.node_name() {
        return Err(ValidationError::NodeNameUpdateForbidden {
            old: old.node_name().to_string(),
            new: candidate.node_name().to_string(),
        });
    }
    Ok(())
}
