//! Existence and uniqueness checks
//!
//! Both checks read live cluster state at call time. The uniqueness check
//! narrows, but cannot close, the window in which two concurrent creates for
//! the same node both see no conflict; exclusivity across that window has to
//! come from the API server itself.

use std::future::Future;
use std::time::Duration;

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::error::ValidationError;
use super::reader::ClusterStateReader;
use crate::crd::NodeMaintenance;

/// Point in time by which every read of one validation must have finished
///
/// Shared by all reads of a request, so later reads only get what earlier
/// ones left over.
#[derive(Clone, Copy, Debug)]
pub struct ReadDeadline {
    at: Instant,
    budget: Duration,
}

impl ReadDeadline {
    /// Deadline `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    /// Time left before the deadline, zero once it has passed
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Total time granted to the request
    pub fn budget(&self) -> Duration {
        self.budget
    }
}

/// Run a single cluster read, abandoning it when `deadline` passes
///
/// Read errors become `ReadFailure` and an expired deadline becomes
/// `Inconclusive`, so neither can be mistaken for a missing object. The read
/// future is dropped on expiry.
pub(crate) async fn bounded_read<T, F>(
    node: &str,
    resource: &'static str,
    deadline: ReadDeadline,
    read: F,
) -> Result<T, ValidationError>
where
    F: Future<Output = Result<T, kube::Error>>,
{
    match tokio::time::timeout_at(deadline.at, read).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => {
            warn!("Reading {} for node {} failed: {}", resource, node, source);
            Err(ValidationError::ReadFailure {
                node: node.to_string(),
                resource,
                source,
            })
        }
        Err(_) => {
            warn!(
                "Reading {} for node {} did not finish within the {:?} request deadline",
                resource,
                node,
                deadline.budget()
            );
            Err(ValidationError::Inconclusive {
                node: node.to_string(),
                resource,
                timeout: deadline.budget(),
            })
        }
    }
}

/// Look up the target node, failing with `NodeNotExists` if it is absent
#[instrument(skip(reader, deadline))]
pub async fn ensure_node_exists(
    reader: &dyn ClusterStateReader,
    node_name: &str,
    deadline: ReadDeadline,
) -> Result<Node, ValidationError> {
    if node_name.is_empty() {
        return Err(ValidationError::NodeNotExists {
            node: String::new(),
        });
    }

    bounded_read(node_name, "Node", deadline, reader.get_node(node_name))
        .await?
        .ok_or_else(|| ValidationError::NodeNotExists {
            node: node_name.to_string(),
        })
}

/// Fail with `MaintenanceAlreadyExists` if another live NodeMaintenance
/// targets the candidate's node
///
/// The candidate itself (same object name) and objects already being deleted
/// are not conflicts.
#[instrument(skip(reader, candidate, deadline), fields(node = %candidate.node_name()))]
pub async fn ensure_no_other_maintenance(
    reader: &dyn ClusterStateReader,
    candidate: &NodeMaintenance,
    deadline: ReadDeadline,
) -> Result<(), ValidationError> {
    let node_name = candidate.node_name();
    let existing = bounded_read(
        node_name,
        "NodeMaintenance",
        deadline,
        reader.list_node_maintenances(),
    )
    .await?;

    let conflict = existing.iter().find(|nm| {
        nm.node_name() == node_name && !nm.is_being_deleted() && !nm.is_same_object(candidate)
    });

    match conflict {
        Some(nm) => Err(ValidationError::MaintenanceAlreadyExists {
            node: node_name.to_string(),
            existing: nm.name_any(),
        }),
        None => {
            debug!(
                "No other NodeMaintenance targets node {} ({} checked)",
                node_name,
                existing.len()
            );
            Ok(())
        }
    }
}
