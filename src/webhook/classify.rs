//! Node role classification
//!
//! Decides whether a node hosts a member of the consensus store. The quorum
//! guard only ever asks this question through [`NodeClassifier`], so the
//! label convention can be swapped for another source.

use k8s_openapi::api::core::v1::Node;

/// Role of a node with respect to the etcd consensus group
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeRole {
    /// Worker or infra node; its removal cannot affect etcd quorum
    Ordinary,
    /// Control-plane node hosting an etcd member
    ConsensusMember,
}

pub trait NodeClassifier: Send + Sync {
    fn classify(&self, node: &Node) -> NodeRole;
}

/// Classifies a node as a consensus member when any of the configured label
/// keys is present, whatever its value
#[derive(Clone, Debug)]
pub struct LabelClassifier {
    label_keys: Vec<String>,
}

impl LabelClassifier {
    pub fn new(label_keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            label_keys: label_keys
                .into_iter()
                .map(Into::into)
                .filter(|k: &String| !k.is_empty())
                .collect(),
        }
    }
}

impl NodeClassifier for LabelClassifier {
    fn classify(&self, node: &Node) -> NodeRole {
        let labels = match node.metadata.labels.as_ref() {
            Some(labels) => labels,
            None => return NodeRole::Ordinary,
        };
        if self.label_keys.iter().any(|k| labels.contains_key(k)) {
            NodeRole::ConsensusMember
        } else {
            NodeRole::Ordinary
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::config::{LABEL_ROLE_CONTROL_PLANE, LABEL_ROLE_MASTER};
    use crate::webhook::mock::test_node;

    fn classifier() -> LabelClassifier {
        LabelClassifier::new([LABEL_ROLE_CONTROL_PLANE, LABEL_ROLE_MASTER])
    }

    #[test]
    fn test_empty_label_value_is_control_plane() {
        let node = test_node("cp-0", &[(LABEL_ROLE_CONTROL_PLANE, "")]);
        assert_eq!(classifier().classify(&node), NodeRole::ConsensusMember);
    }

    #[test]
    fn test_legacy_master_label() {
        let node = test_node("cp-0", &[(LABEL_ROLE_MASTER, "true")]);
        assert_eq!(classifier().classify(&node), NodeRole::ConsensusMember);
    }

    #[test]
    fn test_worker_is_ordinary() {
        let unlabeled = test_node("worker-0", &[]);
        let worker = test_node("worker-1", &[("node-role.kubernetes.io/worker", "")]);
        assert_eq!(classifier().classify(&unlabeled), NodeRole::Ordinary);
        assert_eq!(classifier().classify(&worker), NodeRole::Ordinary);
    }

    #[test]
    fn test_empty_keys_are_ignored() {
        let classifier = LabelClassifier::new([""]);
        let node = test_node("n", &[("", "")]);
        assert_eq!(classifier.classify(&node), NodeRole::Ordinary);
    }
}
