//! Custom Resource Definitions for the node maintenance guard
//!
//! This module defines the NodeMaintenance CRD validated by the admission webhook.

mod node_maintenance;


pub use node_maintenance::{
    MaintenancePhase, NodeMaintenance, NodeMaintenanceSpec, NodeMaintenanceStatus,
};
