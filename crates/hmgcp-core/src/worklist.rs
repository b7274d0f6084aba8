//! Pending-work set driving the solver loop

use crate::syntax::NodeId;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Which pending node comes off next.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PopOrder {
    /// Most recently added first.
    #[default]
    Lifo,
    /// Oldest first.
    Fifo,
}

/// Idempotent set of nodes awaiting another HM/GCP step.
#[derive(Debug, Default, Clone)]
pub struct Worklist {
    pending: IndexSet<NodeId>,
    order: PopOrder,
    pops: usize,
}

impl Worklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_order(order: PopOrder) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    /// Adds a node unless it is already pending.
    pub fn push(&mut self, id: NodeId) {
        self.pending.insert(id);
    }

    pub fn push_opt(&mut self, id: Option<NodeId>) {
        if let Some(id) = id {
            self.push(id);
        }
    }

    pub fn extend(&mut self, ids: impl IntoIterator<Item = NodeId>) {
        self.pending.extend(ids);
    }

    /// Removes the next pending node in this list's order.
    pub fn pop(&mut self) -> Option<NodeId> {
        let id = match self.order {
            PopOrder::Lifo => self.pending.pop(),
            PopOrder::Fifo => self.pending.shift_remove_index(0),
        }?;
        self.pops += 1;
        Some(id)
    }

    pub fn has(&self, id: NodeId) -> bool {
        self.pending.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Total number of pops over the worklist's life.
    pub fn pops(&self) -> usize {
        self.pops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use std::collections::HashSet;

    #[test]
    fn test_pop_is_lifo() {
        let mut work = Worklist::new();
        work.push(NodeId(1));
        work.push(NodeId(2));
        work.push(NodeId(3));
        assert_eq!(work.pop(), Some(NodeId(3)));
        assert_eq!(work.pop(), Some(NodeId(2)));
        assert_eq!(work.pops(), 2);
    }

    #[test]
    fn test_fifo_pops_oldest() {
        let mut work = Worklist::with_order(PopOrder::Fifo);
        work.extend([NodeId(4), NodeId(1), NodeId(9)]);
        work.push(NodeId(4));
        assert_eq!(work.pop(), Some(NodeId(4)));
        work.push(NodeId(4));
        assert_eq!(work.pop(), Some(NodeId(1)));
        assert_eq!(work.pop(), Some(NodeId(9)));
        assert_eq!(work.pop(), Some(NodeId(4)));
        assert_eq!(work.pop(), None);
        assert_eq!(work.pops(), 4);
    }

    #[test]
    fn test_push_is_idempotent() {
        let mut work = Worklist::new();
        work.push(NodeId(7));
        work.push(NodeId(7));
        assert_eq!(work.len(), 1);
        assert!(work.has(NodeId(7)));
        work.pop();
        assert!(!work.has(NodeId(7)));
        assert!(work.is_empty());
    }

    #[quickcheck]
    fn prop_pops_each_distinct_node_once(ids: Vec<u32>) -> bool {
        let mut work = Worklist::new();
        work.extend(ids.iter().map(|&i| NodeId(i)));
        let mut seen = HashSet::new();
        while let Some(id) = work.pop() {
            if !seen.insert(id) {
                return false;
            }
        }
        seen.len() == ids.iter().collect::<HashSet<_>>().len()
    }
}
