//! node-maintenance-guard: admission control for Kubernetes node maintenance
//!
//! This crate provides the validating admission webhook that decides whether
//! a NodeMaintenance request may be persisted, including the etcd quorum
//! guard for control-plane nodes.

pub mod crd;
pub mod error;
pub mod telemetry;
pub mod webhook;

pub use crate::error::{Error, Result};
