//! Webhook Module
//!
//! This module provides the validating admission webhook that guards
//! NodeMaintenance objects.
//!
//! # Checks
//!
//! - **Existence**: the target node must exist
//! - **Uniqueness**: no other live NodeMaintenance may target the same node
//! - **Quorum**: a control-plane node may only be taken down while the etcd
//!   quorum guard PodDisruptionBudget allows another disruption
//! - **Immutability**: `spec.nodeName` cannot change on update
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use node_maintenance_guard::webhook::{
//!     GuardConfig, KubeClusterReader, MaintenanceValidator, WebhookServer,
//! };
//!
//! let client = kube::Client::try_default().await?;
//! let reader = Arc::new(KubeClusterReader::new(client));
//! let validator = MaintenanceValidator::new(reader, &GuardConfig::default());
//!
//! WebhookServer::new(validator)
//!     .with_tls("/certs/tls.crt".into(), "/certs/tls.key".into())
//!     .start("0.0.0.0:9443".parse()?)
//!     .await?;
//! ```

pub mod checks;
pub mod classify;
pub mod config;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod quorum;
pub mod reader;
pub mod server;
pub mod validator;

pub use checks::ReadDeadline;
pub use classify::{LabelClassifier, NodeClassifier, NodeRole};
pub use config::{GuardConfig, QuorumPdbRef};
pub use error::ValidationError;
pub use quorum::{QuorumDecision, QuorumGuard};
pub use reader::{ClusterStateReader, KubeClusterReader};
pub use server::{TlsConfig, ValidateParams, WebhookServer, VALIDATE_PATH};
pub use validator::MaintenanceValidator;
