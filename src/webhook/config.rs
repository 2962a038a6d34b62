//! Guard configuration
//!
//! Process-wide settings for the admission checks: which labels mark a
//! control-plane node, where the etcd quorum guard PodDisruptionBudget lives,
//! and how long one validation may spend reading the cluster. Built once at startup and
//! never mutated afterwards.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Role label set on control-plane nodes by current Kubernetes versions
pub const LABEL_ROLE_CONTROL_PLANE: &str = "node-role.kubernetes.io/control-plane";

/// Role label set on control-plane nodes by older clusters
pub const LABEL_ROLE_MASTER: &str = "node-role.kubernetes.io/master";

/// Namespace of the etcd quorum guard PodDisruptionBudget
pub const ETCD_QUORUM_PDB_NAMESPACE: &str = "openshift-etcd";

/// Name of the etcd quorum guard PodDisruptionBudget
pub const ETCD_QUORUM_PDB_NAME: &str = "etcd-guard-pdb";

/// Name the quorum guard PodDisruptionBudget had before it was renamed
pub const ETCD_QUORUM_PDB_LEGACY_NAME: &str = "etcd-quorum-guard";

/// Location of the quorum guard PodDisruptionBudget
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuorumPdbRef {
    #[serde(default = "default_pdb_namespace")]
    pub namespace: String,

    #[serde(default = "default_pdb_name")]
    pub name: String,

    /// Looked up when `name` does not exist
    #[serde(default = "default_pdb_legacy_name")]
    pub legacy_name: Option<String>,
}

fn default_pdb_namespace() -> String {
    ETCD_QUORUM_PDB_NAMESPACE.to_string()
}

fn default_pdb_name() -> String {
    ETCD_QUORUM_PDB_NAME.to_string()
}

fn default_pdb_legacy_name() -> Option<String> {
    Some(ETCD_QUORUM_PDB_LEGACY_NAME.to_string())
}

impl Default for QuorumPdbRef {
    fn default() -> Self {
        Self {
            namespace: default_pdb_namespace(),
            name: default_pdb_name(),
            legacy_name: default_pdb_legacy_name(),
        }
    }
}

/// Configuration of the admission checks
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GuardConfig {
    /// Label keys whose presence marks a node as a control-plane member
    #[serde(default = "default_control_plane_labels")]
    pub control_plane_labels: Vec<String>,

    #[serde(default)]
    pub quorum_pdb: QuorumPdbRef,

    /// Upper bound for all cluster reads of one validation (default: 3000ms)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_control_plane_labels() -> Vec<String> {
    vec![
        LABEL_ROLE_CONTROL_PLANE.to_string(),
        LABEL_ROLE_MASTER.to_string(),
    ]
}

fn default_read_timeout_ms() -> u64 {
    3000
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            control_plane_labels: default_control_plane_labels(),
            quorum_pdb: QuorumPdbRef::default(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl GuardConfig {
    /// Parse a TOML document, filling unset fields with defaults
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: GuardConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Reject configurations that would make every check meaningless
    pub fn validate(&self) -> Result<()> {
        if self.control_plane_labels.iter().all(|l| l.is_empty()) {
            return Err(Error::ConfigError(
                "at least one control-plane label key is required".to_string(),
            ));
        }
        if self.quorum_pdb.namespace.is_empty() || self.quorum_pdb.name.is_empty() {
            return Err(Error::ConfigError(
                "quorum PDB namespace and name must not be empty".to_string(),
            ));
        }
        if self.read_timeout_ms == 0 {
            return Err(Error::ConfigError(
                "readTimeoutMs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
