//! GCP transfer functions

use super::prim::Prim;
use super::{NodeId, NodeKind, Program};
use crate::flow::{Flow, FunId};
use crate::worklist::Worklist;
use std::collections::BTreeMap;

impl Program {
    /// Recomputes the flow of `id` from its children's current flows.
    pub(crate) fn val(&mut self, id: NodeId) -> Flow {
        match self.kind(id) {
            NodeKind::Con(flow) => flow.clone(),
            NodeKind::Ident { def, idx, .. } => match (self.kind(*def), idx) {
                (NodeKind::Let { def, .. }, _) => self.flow(*def).clone(),
                (kind, Some(i)) => kind
                    .func()
                    .and_then(|f| f.types.get(*i).cloned())
                    .unwrap_or(Flow::SCALAR),
                _ => Flow::SCALAR,
            },
            NodeKind::Lambda { func, .. } | NodeKind::Prim { func, .. } => Flow::fun(func.fid),
            NodeKind::Let { body, .. } | NodeKind::Root { body } => self.flow(*body).clone(),
            NodeKind::Struct { alias, labels, fields } => {
                let flows: BTreeMap<String, Flow> = labels
                    .iter()
                    .zip(fields)
                    .map(|(label, &field)| (label.clone(), self.flow(field).clone()))
                    .collect();
                Flow::rec(*alias, flows).approx(self.config.struct_depth_cutoff, *alias)
            }
            NodeKind::Field { label, rec } => match self.flow(*rec) {
                Flow::Any => Flow::Any,
                Flow::Rec {
                    fields: Some(fields), ..
                } => fields.get(label).cloned().unwrap_or(Flow::SCALAR),
                _ => Flow::SCALAR,
            },
            NodeKind::Apply { .. } => self.val_apply(id),
        }
    }

    fn val_apply(&mut self, id: NodeId) -> Flow {
        let NodeKind::Apply { fun, args } = self.kind(id) else {
            return Flow::SCALAR;
        };
        let (fun, args) = (*fun, args.clone());
        let Flow::Fun { fids, .. } = self.flow(fun).clone() else {
            return self.flow(fun).oob();
        };
        let actuals: Vec<Flow> = args.iter().map(|&a| self.flow(a).clone()).collect();
        let rez = if fids.is_empty() || fids.contains(&FunId::UNKNOWN) {
            Flow::SCALAR
        } else {
            fids.iter().fold(Flow::Any, |rez, &fid| rez.meet(&self.fun_result(fid, &actuals)))
        };
        if rez.above_center() {
            return Flow::Any;
        }
        if self.config.do_hm {
            self.lift(id, &args, rez)
        } else {
            rez
        }
    }

    /// Flow a call to `fid` returns. Lambdas return their body's flow;
    /// primitives fold their actuals.
    fn fun_result(&self, fid: FunId, actuals: &[Flow]) -> Flow {
        let Some(node) = self.fun_node(fid) else {
            return Flow::SCALAR;
        };
        match self.kind(node) {
            NodeKind::Lambda { body, .. } => self.flow(*body).clone(),
            NodeKind::Prim { prim, .. } => prim.apply(actuals, self.pair_alias, self.triple_alias),
            _ => Flow::SCALAR,
        }
    }

    /// Queues whatever depends on `child`'s new flow through `id`.
    pub(crate) fn add_val_work(&mut self, id: NodeId, child: NodeId, work: &mut Worklist) {
        match self.kind(id) {
            NodeKind::Lambda { .. } => {
                let me = self.find(id);
                self.terms.add_deps_work(me, work);
            }
            NodeKind::Let { def, .. } => {
                let def = *def;
                if child == def {
                    let d = self.find(def);
                    self.terms.add_deps_work(d, work);
                }
            }
            NodeKind::Root { body } => {
                if child == *body {
                    work.push(id);
                }
            }
            NodeKind::Apply { fun, args } => {
                let (fun, args) = (*fun, args.clone());
                if child == fun {
                    work.push(id);
                }
                self.meet_formals(id, fun, &args, work);
            }
            _ => {}
        }
    }

    /// Meets a call site's actuals into the formals of every function it
    /// may call, registering the call site with each callee.
    fn meet_formals(&mut self, id: NodeId, fun: NodeId, args: &[NodeId], work: &mut Worklist) {
        let Flow::Fun { fids, .. } = self.flow(fun).clone() else {
            return;
        };
        for fid in fids {
            let Some(node) = self.fun_node(fid) else {
                continue;
            };
            let callee = self.find(node);
            self.terms.push_update(callee, id);
            for (i, &arg) in args.iter().enumerate() {
                let actual = self.flow(arg).clone();
                if !self.meet_formal(node, i, &actual) {
                    continue;
                }
                if let Some(&targ) = self.targs(node).get(i) {
                    self.terms.add_deps_work(targ, work);
                }
                match self.kind(node) {
                    NodeKind::Lambda { body, .. } => work.push(*body),
                    NodeKind::Prim { prim: Prim::If, .. } if i == 0 => work.push(node),
                    _ => {}
                }
            }
        }
    }

    /// Lowers formal `i` of `node` by `actual`. Returns whether it moved.
    pub(crate) fn meet_formal(&mut self, node: NodeId, i: usize, actual: &Flow) -> bool {
        let Some(func) = self.nodes[node.index()].kind.func_mut() else {
            return false;
        };
        let Some(formal) = func.types.get_mut(i) else {
            return false;
        };
        let rez = formal.meet(actual);
        if rez == *formal {
            return false;
        }
        *formal = rez;
        true
    }
}
