//! Projections from terms into the flow lattice

use super::{Forest, Slot, TermId, TermKind};
use crate::flow::{AliasSet, FunId, Flow, MAX_REC_DEPTH};
use fnv::FnvHashSet;
use std::collections::BTreeMap;
use std::rc::Rc;

impl Forest {
    /// Marks `t` and everything reachable through non-return slots as a
    /// function input, widening reachable base constants to their class.
    pub fn widen_bases(&mut self, t: TermId) {
        let mut visit = FnvHashSet::default();
        self.widen_rec(t, &mut visit);
    }

    fn widen_rec(&mut self, t: TermId, visit: &mut FnvHashSet<TermId>) {
        let t = self.debug_find(t);
        if !visit.insert(t) {
            return;
        }
        let term = &mut self.terms[t.index()];
        term.func_input = true;
        if let TermKind::Base(flow) = &mut term.kind {
            *flow = flow.widen();
        }
        for slot in self.slots(t) {
            if slot == Slot::Ret {
                continue;
            }
            if let Some(child) = self.get(t, &slot) {
                self.widen_rec(child, visit);
            }
        }
    }

    /// Most conservative flow value a term of this type can hold.
    ///
    /// Depends only on the unfolded type, so equal types give equal flows
    /// however their cycles are laid out. A struct whose aliases already
    /// appear twice on the path down, or that sits `MAX_REC_DEPTH` deep,
    /// comes back with an unknown layout.
    pub fn as_flow(&self, t: TermId) -> Flow {
        let mut path = Vec::new();
        self.as_flow_rec(t, &mut path)
    }

    fn as_flow_rec<'a>(&'a self, t: TermId, path: &mut Vec<&'a AliasSet>) -> Flow {
        let t = self.debug_find(t);
        match self.kind(t) {
            TermKind::Leaf | TermKind::Err(_) | TermKind::Redirect(_) => Flow::SCALAR,
            TermKind::Base(flow) => flow.clone(),
            TermKind::Nil(inner) => self.as_flow_rec(*inner, path).meet_nil(),
            TermKind::Fun { fids, nil, .. } => {
                let mut fids = fids.clone();
                if fids.is_empty() || self.is_func_input(t) {
                    fids.insert(FunId::UNKNOWN);
                }
                Flow::Fun { fids, nil: *nil }
            }
            TermKind::Struct {
                fields, aliases, nil, ..
            } => {
                let seen = path.iter().filter(|&&a| a == aliases).count();
                if seen >= 2 || path.len() >= MAX_REC_DEPTH {
                    return Flow::Rec {
                        aliases: aliases.clone(),
                        fields: None,
                        nil: *nil,
                    };
                }
                path.push(aliases);
                let flows: BTreeMap<String, Flow> = fields
                    .iter()
                    .map(|(label, &child)| (label.clone(), self.as_flow_rec(child, path)))
                    .collect();
                path.pop();
                Flow::Rec {
                    aliases: aliases.clone(),
                    fields: Some(Rc::new(flows)),
                    nil: *nil,
                }
            }
        }
    }
}
