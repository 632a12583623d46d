//! Mutation records and observer registrations.

use crate::NodeId;

/// Opaque identifier returned by `Document::observe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverHandle(pub(crate) u64);

impl ObserverHandle {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Which mutations an observer wants to hear about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObserverOptions {
    pub child_list: bool,
    pub subtree: bool,
    pub attributes: bool,
    /// When set, only attribute records for these names are queued.
    pub attribute_filter: Option<Vec<String>>,
}

impl ObserverOptions {
    /// Child-list and attribute changes anywhere below the root, limited to `names`.
    pub fn subtree_attributes(names: &[&str]) -> Self {
        Self {
            child_list: true,
            subtree: true,
            attributes: true,
            attribute_filter: Some(names.iter().map(|name| (*name).to_owned()).collect()),
        }
    }

    pub(crate) fn wants_attribute(&self, name: &str) -> bool {
        if !self.attributes {
            return false;
        }

        match &self.attribute_filter {
            Some(filter) => filter.iter().any(|candidate| candidate.eq_ignore_ascii_case(name)),
            None => true,
        }
    }
}

/// A single observed change, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    ChildList {
        target: NodeId,
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
    },
    Attributes {
        target: NodeId,
        name: String,
        old_value: Option<String>,
    },
}

impl MutationRecord {
    pub fn target(&self) -> NodeId {
        match self {
            Self::ChildList { target, .. } | Self::Attributes { target, .. } => *target,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Observer {
    pub(crate) handle: ObserverHandle,
    pub(crate) root: NodeId,
    pub(crate) options: ObserverOptions,
    pub(crate) queue: Vec<MutationRecord>,
}
