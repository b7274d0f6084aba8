//! Lifting call results through their HM types
//!
//! A call's flow is the meet over every callee it may reach, which loses
//! whatever a polymorphic callee does not touch. The structural type says
//! which parts of the result are the caller's own inputs, so the flows of
//! the inputs are mapped onto their type variables and the result is
//! rebuilt from that mapping wherever the types line up.

use super::{NodeId, NodeKind, Program};
use crate::flow::{Flow, FunId};
use crate::term::{Shape, Slot, TermId};
use fnv::{FnvHashMap, FnvHashSet};
use std::collections::BTreeMap;
use std::rc::Rc;

#[derive(Debug, Default)]
struct Mapping {
    /// Input flow seen at each type variable, met over every occurrence.
    flows: FnvHashMap<TermId, Flow>,
    dups: FnvHashSet<(TermId, Flow)>,
}

impl Mapping {
    fn put(&mut self, t: TermId, flow: Flow) {
        let merged = match self.flows.get(&t) {
            Some(old) => old.meet(&flow),
            None => flow,
        };
        self.flows.insert(t, merged);
    }
}

impl Program {
    /// Raises `rez`, the flow of call site `id`, using the flows its
    /// arguments carry into shared type variables.
    pub(crate) fn lift(&mut self, id: NodeId, args: &[NodeId], rez: Flow) -> Flow {
        let mut map = Mapping::default();
        for &arg in args {
            map.dups.clear();
            let t = self.find(arg);
            self.terms.push_update(t, id);
            let flow = self.flow(arg).clone();
            self.walk_in(&mut map, t, &flow, id);
        }
        let me = self.find(id);
        self.terms.push_update(me, id);
        let rez2 = self.walk_out(&map, me, &rez, id);
        // Never above what the call already has.
        raise(&rez2, &rez).meet(self.flow(id))
    }

    fn walk_in(&mut self, map: &mut Mapping, t: TermId, flow: &Flow, apply: NodeId) {
        let t = self.terms.find(t);
        if !map.dups.insert((t, flow.clone())) {
            return;
        }
        match self.terms.shape(t) {
            Shape::Err => map.put(t, Flow::SCALAR),
            Shape::Base => {
                let own = self.terms.base_flow(t).cloned().unwrap_or(Flow::SCALAR);
                map.put(t, own);
            }
            Shape::Leaf => map.put(t, flow.clone()),
            Shape::Nil => {
                let inner_flow = flow.join(&Flow::NSCALAR);
                map.put(t, inner_flow.clone());
                if let Some(inner) = self.terms.arg(t, &Slot::Inner) {
                    self.walk_in(map, inner, &inner_flow, apply);
                }
            }
            Shape::Fun(_) => {
                let Flow::Fun { fids, .. } = flow else {
                    return;
                };
                map.put(t, flow.clone());
                if fids.is_empty() || fids.contains(&FunId::UNKNOWN) {
                    return;
                }
                let Some(ret) = self.terms.arg(t, &Slot::Ret) else {
                    return;
                };
                for &fid in fids {
                    if let Some(node) = self.fun_node(fid) {
                        let callee = self.find(node);
                        self.terms.push_update(callee, apply);
                    }
                    let ret_flow = self.returned(fid);
                    self.walk_in(map, ret, &ret_flow, apply);
                }
            }
            Shape::Struct => {
                map.put(t, flow.clone());
                if !matches!(flow, Flow::Rec { .. }) {
                    return;
                }
                for label in self.terms.field_labels(t) {
                    let Some(fld) = self.terms.field(t, &label) else {
                        continue;
                    };
                    let fld_flow = field_flow(flow, &label);
                    self.walk_in(map, fld, &fld_flow, apply);
                }
            }
        }
    }

    /// What function `fid` hands back to its callers so far.
    fn returned(&mut self, fid: FunId) -> Flow {
        let Some(node) = self.fun_node(fid) else {
            return Flow::SCALAR;
        };
        let t = self.find(node);
        if self.terms.is_err(t) {
            return Flow::SCALAR;
        }
        match self.kind(node) {
            NodeKind::Lambda { body, .. } => self.flow(*body).clone(),
            NodeKind::Prim { .. } => match self.terms.arg(t, &Slot::Ret) {
                Some(ret) => self.terms.as_flow(ret),
                None => Flow::SCALAR,
            },
            _ => Flow::SCALAR,
        }
    }

    fn walk_out(&mut self, map: &Mapping, t: TermId, flow: &Flow, apply: NodeId) -> Flow {
        if flow.above_center() {
            return flow.clone();
        }
        let t = self.terms.find(t);
        match self.terms.shape(t) {
            Shape::Leaf | Shape::Err => match map.flows.get(&t) {
                Some(mapped) if !mapped.above_center() && mapped.isa(flow) => {
                    self.terms.push_update(t, apply);
                    mapped.clone()
                }
                _ => flow.clone(),
            },
            Shape::Base => match map.flows.get(&t) {
                Some(mapped) => raise(mapped, flow),
                None => match self.terms.base_flow(t) {
                    Some(own) => raise(own, flow),
                    None => flow.clone(),
                },
            },
            Shape::Nil | Shape::Fun(_) => flow.clone(),
            Shape::Struct => {
                let Flow::Rec {
                    aliases,
                    fields: Some(fields),
                    nil,
                } = flow
                else {
                    return match map.flows.get(&t) {
                        Some(mapped) => raise(mapped, flow),
                        None => raise(&self.terms.as_flow(t), flow),
                    };
                };
                let mut lifted = BTreeMap::new();
                for (label, fld_flow) in fields.iter() {
                    let out = match self.terms.field(t, label) {
                        Some(fld) => self.walk_out(map, fld, fld_flow, apply),
                        None => fld_flow.clone(),
                    };
                    lifted.insert(label.clone(), out);
                }
                Flow::Rec {
                    aliases: aliases.clone(),
                    fields: Some(Rc::new(lifted)),
                    nil: *nil,
                }
            }
        }
    }
}

/// `flow` narrowed by what `known` says, unless the two disagree.
fn raise(known: &Flow, flow: &Flow) -> Flow {
    let lifted = known.join(flow);
    if lifted.above_center() {
        flow.clone()
    } else {
        lifted
    }
}

/// Flow of one field of a record flow. An unknown layout says nothing.
fn field_flow(flow: &Flow, label: &str) -> Flow {
    match flow {
        Flow::Rec {
            fields: Some(fields), ..
        } => fields.get(label).cloned().unwrap_or(Flow::Any),
        Flow::Rec { fields: None, .. } => Flow::SCALAR,
        _ => Flow::Any,
    }
}
