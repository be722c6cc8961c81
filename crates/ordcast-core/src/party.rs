//! Static group membership.

use std::collections::BTreeSet;

use crate::message::ProcessId;

/// The fixed set of processes taking part in a broadcast group.
///
/// Membership never changes after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    members: BTreeSet<ProcessId>,
}

impl Party {
    pub fn new(members: impl IntoIterator<Item = ProcessId>) -> Self {
        Self {
            members: members.into_iter().collect(),
        }
    }

    pub fn is_member(&self, id: ProcessId) -> bool {
        self.members.contains(&id)
    }

    /// Members in ascending id order.
    pub fn members(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.members.iter().copied()
    }

    /// Every member except `id`.
    pub fn others(&self, id: ProcessId) -> impl Iterator<Item = ProcessId> + '_ {
        self.members().filter(move |member| *member != id)
    }

    /// True when `acks` covers every member.
    pub fn is_covered_by(&self, acks: &BTreeSet<ProcessId>) -> bool {
        self.members.is_subset(acks)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl FromIterator<ProcessId> for Party {
    fn from_iter<I: IntoIterator<Item = ProcessId>>(iter: I) -> Self {
        Self::new(iter)
    }
}
