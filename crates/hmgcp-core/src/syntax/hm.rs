//! HM refinement steps and their worklist neighbours

use super::prim::Prim;
use super::{NodeId, NodeKind, Program};
use crate::flow::{AliasSet, FidSet, Flow};
use crate::term::{Slot, TermId, Work};
use crate::worklist::Worklist;
use std::collections::BTreeMap;

impl Program {
    /// One HM step for `id`. With `work == None` nothing is committed and
    /// the result only says whether a committed step would progress.
    pub(crate) fn hm(&mut self, id: NodeId, work: Work<'_>) -> bool {
        match self.kind(id) {
            NodeKind::Con(_) | NodeKind::Let { .. } => false,
            NodeKind::Ident { .. } => self.hm_ident(id, work),
            NodeKind::Lambda { .. } => self.hm_lambda(id, work),
            NodeKind::Apply { .. } => self.hm_apply(id, work),
            NodeKind::Root { body } => {
                let body = *body;
                let me = self.find(id);
                let b = self.find(body);
                self.terms.unify(me, b, work)
            }
            NodeKind::Struct { .. } => self.hm_struct(id, work),
            NodeKind::Field { .. } => self.hm_field(id, work),
            NodeKind::Prim { prim: Prim::If, .. } => self.hm_if(id, work),
            NodeKind::Prim { prim: Prim::NotNil, .. } => self.hm_not_nil(id, work),
            NodeKind::Prim { .. } => self.hm_prim(id, work),
        }
    }

    fn hm_ident(&mut self, id: NodeId, work: Work<'_>) -> bool {
        let idt = self.idt(id);
        let me = self.find(id);
        let nongen = self.nongen(id);
        self.terms.fresh_unify(idt, me, &nongen, work)
    }

    fn idt(&mut self, id: NodeId) -> TermId {
        match &mut self.nodes[id.index()].kind {
            NodeKind::Ident { idt, .. } => {
                *idt = self.terms.find(*idt);
                *idt
            }
            _ => self.nodes[id.index()].hmt,
        }
    }

    fn hm_lambda(&mut self, id: NodeId, mut work: Work<'_>) -> bool {
        let NodeKind::Lambda { body, .. } = self.kind(id) else {
            return false;
        };
        let body = *body;
        let old = self.find(id);
        if !self.terms.is_fun(old) {
            return false;
        }
        let mut progress = false;
        for (i, targ) in self.targs(id).into_iter().enumerate() {
            if let Some(arg) = self.terms.arg(old, &Slot::Arg(i)) {
                progress |= self.terms.unify(arg, targ, work.as_deref_mut());
            }
        }
        let ret = self.find(body);
        match self.terms.arg(old, &Slot::Ret) {
            Some(slot) => self.terms.unify(slot, ret, work) | progress,
            None => progress,
        }
    }

    fn hm_apply(&mut self, id: NodeId, mut work: Work<'_>) -> bool {
        let NodeKind::Apply { fun, args } = self.kind(id) else {
            return false;
        };
        let (fun, args) = (*fun, args.clone());
        let mut tfun = self.find(fun);
        if self.terms.is_err(tfun) {
            let me = self.find(id);
            return self.terms.unify(me, tfun, work);
        }
        if !self.terms.is_fun(tfun) {
            let Some(work) = work else {
                return true;
            };
            let mut targs = Vec::with_capacity(args.len());
            for &arg in &args {
                targs.push(self.find(arg));
            }
            let me = self.find(id);
            let shape = self.terms.fun(true, FidSet::new(), targs, me);
            let progress = self.terms.unify(tfun, shape, Some(&mut *work));
            let tfun = self.terms.find(tfun);
            if self.terms.is_err(tfun) {
                let me = self.find(id);
                return self.terms.unify(me, tfun, Some(work)) | progress;
            }
            return progress;
        }

        let mut progress = false;
        let me = self.find(id);
        if self.terms.fun_arity(tfun) != Some(args.len()) && !self.terms.is_err(me) {
            let Some(w) = work.as_deref_mut() else {
                return true;
            };
            let err = self.terms.err("Mismatched argument lengths");
            progress = self.terms.unify(err, me, Some(w));
        }
        for (i, &arg) in args.iter().enumerate() {
            if let Some(formal) = self.terms.arg(tfun, &Slot::Arg(i)) {
                let actual = self.find(arg);
                progress |= self.terms.unify(formal, actual, work.as_deref_mut());
            }
            if progress && work.is_none() {
                return true;
            }
            tfun = self.terms.find(tfun);
            if self.terms.is_err(tfun) {
                let me = self.find(id);
                return self.terms.unify(me, tfun, work) | progress;
            }
        }
        let me = self.find(id);
        if let Some(ret) = self.terms.arg(tfun, &Slot::Ret) {
            progress |= self.terms.unify(me, ret, work.as_deref_mut());
        }
        tfun = self.terms.find(tfun);
        if self.terms.is_err(tfun) {
            let me = self.find(id);
            return self.terms.unify(me, tfun, work) | progress;
        }
        progress
    }

    fn hm_struct(&mut self, id: NodeId, mut work: Work<'_>) -> bool {
        let NodeKind::Struct { alias, labels, fields } = self.kind(id) else {
            return false;
        };
        let (alias, labels, fields) = (*alias, labels.clone(), fields.clone());
        let mut rec = self.find(id);
        if self.terms.is_err(rec) {
            return false;
        }
        let mut progress = false;
        if self.terms.is_leaf(rec) {
            let Some(w) = work.as_deref_mut() else {
                return true;
            };
            let mut map = BTreeMap::new();
            for (label, &field) in labels.iter().zip(&fields) {
                map.insert(label.clone(), self.find(field));
            }
            let shape = self.terms.strukt(false, AliasSet::from([alias]), map);
            self.terms.unify(shape, rec, Some(w));
            rec = self.find(id);
            progress = true;
        }
        if !self.terms.is_struct(rec) {
            return progress;
        }

        // Fields this literal does not build cannot be loaded from it.
        for label in self.terms.field_labels(rec) {
            if labels.contains(&label) {
                continue;
            }
            let Some(extra) = self.terms.field(rec, &label) else {
                continue;
            };
            if self.terms.is_err(extra) {
                continue;
            }
            let Some(w) = work.as_deref_mut() else {
                return true;
            };
            let me = self.find(id);
            let miss = self.terms.miss_field(me, &label);
            progress |= self.terms.unify(extra, miss, Some(w));
        }

        for (label, &field) in labels.iter().zip(&fields) {
            rec = self.terms.find(rec);
            if let Some(slot) = self.terms.field(rec, label) {
                let t = self.find(field);
                progress |= self.terms.unify(slot, t, work.as_deref_mut());
            }
            if progress && work.is_none() {
                return true;
            }
        }
        if work.is_some() {
            let rec = self.terms.find(rec);
            self.terms.push_update(rec, id);
        }
        progress
    }

    fn hm_field(&mut self, id: NodeId, mut work: Work<'_>) -> bool {
        let NodeKind::Field { label, rec } = self.kind(id) else {
            return false;
        };
        let (label, rec_node) = (label.clone(), *rec);
        let me = self.find(id);
        if self.terms.is_err(me) {
            return false;
        }
        let rec = self.find(rec_node);
        let may_nil = self.terms.is_nil(rec) || self.terms.base_flow(rec).is_some_and(Flow::may_nil);
        if may_nil {
            let Some(w) = work else {
                return true;
            };
            let err = self.terms.err(format!("May be nil when loading field {label}"));
            return self.terms.unify(me, err, Some(w));
        }
        if work.is_some() {
            self.terms.push_update(rec, id);
        }
        if let Some(fld) = self.terms.field(rec, &label) {
            return self.terms.unify(fld, me, work);
        }
        let Some(w) = work.as_deref_mut() else {
            return true;
        };
        if self.terms.is_err(rec) {
            return self.terms.unify(me, rec, Some(w));
        }
        if self.terms.is_open(rec) {
            return self.terms.add_fld(rec, &label, me, Some(w));
        }
        if self.terms.is_leaf(rec) || self.terms.is_fun(rec) {
            let deps: Vec<NodeId> = self.terms.deps(rec).iter().copied().collect();
            self.terms.push_deps(me, &deps);
            let shape = self.terms.strukt(true, AliasSet::new(), BTreeMap::from([(label, me)]));
            return self.terms.unify(shape, rec, Some(w));
        }
        let miss = self.terms.miss_field(rec, &label);
        self.terms.unify(me, miss, Some(w))
    }

    /// Ordinary primitives only pass argument errors through.
    fn hm_prim(&mut self, id: NodeId, work: Work<'_>) -> bool {
        let me = self.find(id);
        if self.terms.is_err(me) {
            return false;
        }
        match self.targs(id).into_iter().find(|&t| self.terms.is_err(t)) {
            Some(err) => self.terms.unify(me, err, work),
            None => false,
        }
    }

    /// Branches the predicate's flow proves dead are not unified.
    fn hm_if(&mut self, id: NodeId, mut work: Work<'_>) -> bool {
        let me = self.find(id);
        let Some(rez) = self.terms.arg(me, &Slot::Ret) else {
            return false;
        };
        let targs = self.targs(id);
        if self.config.do_gcp {
            let pred = self
                .kind(id)
                .func()
                .and_then(|f| f.types.first().cloned())
                .unwrap_or(Flow::Any);
            if pred.is_false() {
                return self.terms.unify(rez, targs[2], work);
            }
            if pred.above_center() {
                return false;
            }
            if !pred.may_nil() {
                return self.terms.unify(rez, targs[1], work);
            }
        }
        let progress = self.terms.unify(rez, targs[1], work.as_deref_mut());
        let rez = self.terms.find(rez);
        let t2 = self.terms.find(targs[2]);
        self.terms.unify(rez, t2, work) | progress
    }

    /// Unifies the argument with a nilable wrapper around the result, so
    /// the result is the argument with nil removed.
    fn hm_not_nil(&mut self, id: NodeId, work: Work<'_>) -> bool {
        let arg = self.targs(id)[0];
        if self.terms.is_err(arg) {
            return false;
        }
        let me = self.find(id);
        let Some(ret) = self.terms.arg(me, &Slot::Ret) else {
            return false;
        };
        if arg == ret {
            return false;
        }
        if self.terms.is_nil(arg) && self.terms.arg(arg, &Slot::Inner) == Some(ret) {
            return false;
        }
        if let (Some(af), Some(rf)) = (self.terms.base_flow(arg).cloned(), self.terms.base_flow(ret).cloned()) {
            if af == rf.meet_nil() {
                return false;
            }
            let Some(w) = work else {
                return true;
            };
            let mt = af.meet(&rf);
            let (rflow, aflow) = (mt.join(&Flow::NSCALAR), mt.meet_nil());
            let parent = self.parent(id);
            if self.terms.set_base(ret, rflow) {
                w.push_opt(parent);
            }
            if self.terms.set_base(arg, aflow) {
                w.push_opt(parent);
            }
            return true;
        }
        let same_shape = (self.terms.is_struct(arg) && self.terms.is_struct(ret))
            || (self.terms.is_fun(arg) && self.terms.is_fun(ret));
        if same_shape && self.terms.may_nil(arg) && self.aligned(arg, ret) {
            return false;
        }
        let Some(w) = work else {
            return true;
        };
        if self.terms.is_nil(arg) && self.terms.is_nil(ret) {
            return self.terms.unify(arg, ret, Some(w));
        }
        let wrapped = self.terms.nil(ret);
        let wrapped = self.terms.find(wrapped);
        self.terms.unify(wrapped, arg, Some(w))
    }

    /// Whether a nilable `arg` already shares every child with `ret`.
    fn aligned(&mut self, arg: TermId, ret: TermId) -> bool {
        for slot in self.terms.slots(arg) {
            if self.terms.arg(arg, &slot) != self.terms.arg(ret, &slot) {
                return false;
            }
        }
        if self.terms.is_open(arg) {
            for slot in self.terms.slots(ret) {
                if !self.terms.has_slot(arg, &slot) {
                    return false;
                }
            }
        }
        true
    }

    /// Queues the neighbours affected by a successful HM step.
    pub(crate) fn add_hm_work(&mut self, id: NodeId, work: &mut Worklist) {
        let parent = self.parent(id);
        match self.kind(id) {
            NodeKind::Con(_) | NodeKind::Root { .. } => {}
            NodeKind::Ident { .. } => {
                work.push_opt(parent);
                let Some(parent) = parent else {
                    return;
                };
                let idt = self.idt(id);
                let pinned = self.nongen(parent);
                if self.terms.nongen_in(idt, &pinned) {
                    self.terms.add_deps_work(idt, work);
                }
                if let NodeKind::Apply { fun, .. } = self.kind(parent) {
                    if matches!(self.kind(*fun), NodeKind::Prim { prim: Prim::NotNil, .. }) {
                        work.push(*fun);
                    }
                }
            }
            NodeKind::Lambda { body, .. } => {
                let body = *body;
                work.push_opt(parent);
                work.push(body);
                let me = self.find(id);
                for targ in self.targs(id) {
                    if self.terms.occurs_in(targ, me) {
                        work.extend(self.terms.deps(targ).iter().copied());
                    }
                }
            }
            NodeKind::Let { def, body, .. } => {
                let (def, body) = (*def, *body);
                work.push_opt(parent);
                work.push(body);
                work.push(def);
                let d = self.find(def);
                work.extend(self.terms.deps(d).iter().copied());
            }
            NodeKind::Apply { args, .. } => {
                work.push_opt(parent);
                work.extend(args.iter().copied());
            }
            NodeKind::Struct { fields, .. } => {
                work.push_opt(parent);
                work.extend(fields.iter().copied());
            }
            NodeKind::Field { rec, .. } => {
                let rec = *rec;
                work.push_opt(parent);
                work.push(rec);
                self.add_hm_work(rec, work);
            }
            NodeKind::Prim { .. } => {
                let me = self.find(id);
                if self.terms.is_err(me) {
                    work.push_opt(parent);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverConfig;
    use crate::parser::parse;
    use crate::solver::infer_with;

    fn build(src: &str) -> (Program, Worklist) {
        let mut work = Worklist::new();
        let prog = Program::build(&parse(src).unwrap(), SolverConfig::default(), &mut work).unwrap();
        (prog, work)
    }

    fn body(prog: &Program) -> NodeId {
        match prog.kind(prog.root()) {
            NodeKind::Root { body } => *body,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_probe_commits_nothing() {
        let (mut prog, mut work) = build("(pair 3 4)");
        let apply = body(&prog);
        let before = prog.node_type(apply);
        let terms = prog.terms.len();
        assert!(prog.hm(apply, None));
        assert_eq!(prog.node_type(apply), before);
        assert_eq!(prog.terms.len(), terms);

        assert!(prog.hm(apply, Some(&mut work)));
        assert_eq!(prog.node_type(apply), "(3, 4)");
        assert!(!prog.hm(apply, None));
    }

    #[test]
    fn test_if_unifies_both_branches_without_flow() {
        let config = SolverConfig::default().with_gcp(false);
        let inf = infer_with("(if 0 \"abc\" 7)", config).unwrap();
        assert!(inf.program.root_type().contains("Cannot unify"));
    }

    #[test]
    fn test_apply_of_unknown_callee_builds_function() {
        let inf = infer_with("{ f -> (f 3) }", SolverConfig::default()).unwrap();
        assert_eq!(inf.program.root_type(), "{ { int64 -> A } -> A }");
    }
}
