//! Admission rejection reasons
//!
//! The Display text of every rule violation is matched by operator tooling,
//! so it must stay stable and always name the node or field involved.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    /// No Node with the requested name exists
    #[error("invalid nodeName, no node with name {node} found")]
    NodeNotExists { node: String },

    /// Another live NodeMaintenance already targets the node
    #[error("invalid nodeName, a NodeMaintenance for node {node} already exists ({existing})")]
    MaintenanceAlreadyExists { node: String, existing: String },

    /// Taking the control-plane node down would break etcd quorum
    #[error("can not put master/control-plane node into maintenance at this moment, it would violate the master/control-plane node quorum (node {node})")]
    ControlPlaneQuorumViolation { node: String },

    /// `spec.nodeName` was changed on update
    #[error("updating spec.NodeName isn't allowed (from {old} to {new})")]
    NodeNameUpdateForbidden { old: String, new: String },

    /// A cluster read failed; the decision could not be made
    #[error("failed to read {resource} while validating node {node}: {source}")]
    ReadFailure {
        node: String,
        resource: &'static str,
        #[source]
        source: kube::Error,
    },

    /// A cluster read did not finish in time; the decision could not be made
    #[error("validation of node {node} is inconclusive: reading {resource} timed out after {}ms", timeout.as_millis())]
    Inconclusive {
        node: String,
        resource: &'static str,
        timeout: Duration,
    },
}

impl ValidationError {
    /// Stable, machine-readable name of the violated rule
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::NodeNotExists { .. } => "NodeNotExists",
            ValidationError::MaintenanceAlreadyExists { .. } => "MaintenanceAlreadyExists",
            ValidationError::ControlPlaneQuorumViolation { .. } => "ControlPlaneQuorumViolation",
            ValidationError::NodeNameUpdateForbidden { .. } => "NodeNameUpdateForbidden",
            ValidationError::ReadFailure { .. } => "ReadFailure",
            ValidationError::Inconclusive { .. } => "Inconclusive",
        }
    }

    /// Whether the same request may succeed if simply retried
    ///
    /// Rule violations are final for the current cluster state; read failures
    /// and timeouts say nothing about the request itself.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ValidationError::ReadFailure { .. } | ValidationError::Inconclusive { .. }
        )
    }

    /// Node name the error refers to (the new name for update violations)
    pub fn node(&self) -> &str {
        match self {
            ValidationError::NodeNotExists { node }
            | ValidationError::MaintenanceAlreadyExists { node, .. }
            | ValidationError::ControlPlaneQuorumViolation { node }
            | ValidationError::ReadFailure { node, .. }
            | ValidationError::Inconclusive { node, .. } => node,
            ValidationError::NodeNameUpdateForbidden { new, .. } => new,
        }
    }
}
