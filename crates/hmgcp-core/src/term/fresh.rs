//! Instantiate-and-unify for identifier uses

use super::unify::Dups;
use super::{Forest, Shape, Slot, TermId, TermKind, Work};
use crate::flow::{AliasSet, FidSet};
use fnv::FnvHashMap;

type Vars = FnvHashMap<TermId, TermId>;

impl Forest {
    /// Unifies a fresh instance of `def` into `target`.
    ///
    /// Terms occurring in `nongen` are pinned by an enclosing binder and
    /// unify as-is; everything else is instantiated lazily, copying only
    /// the parts of `def` that `target` does not already have.
    pub fn fresh_unify(&mut self, def: TermId, target: TermId, nongen: &[TermId], work: Work<'_>) -> bool {
        let mut vars = Vars::default();
        let mut dups = Dups::default();
        self.fresh_unify_rec(def, target, nongen, work, &mut vars, &mut dups)
    }

    fn fresh_unify_rec(
        &mut self,
        this: TermId,
        that: TermId,
        nongen: &[TermId],
        mut work: Work<'_>,
        vars: &mut Vars,
        dups: &mut Dups,
    ) -> bool {
        let this = self.find(this);
        let that = self.find(that);

        if let Some(&prior) = vars.get(&this) {
            let prior = self.find(prior);
            return self.unify_rec(prior, that, work, dups);
        }
        if self.cycle_equals(this, that) {
            vars.insert(this, that);
            return false;
        }
        if self.is_err(that) {
            vars.insert(this, that);
            return false;
        }
        if self.is_err(this) || self.nongen_in(this, nongen) {
            let progress = self.unify_rec(this, that, work, dups);
            vars.insert(this, that);
            return progress;
        }
        if self.is_leaf(this) {
            vars.insert(this, that);
            return false;
        }
        if self.is_leaf(that) {
            let Some(w) = work.as_deref_mut() else {
                return true;
            };
            let copy = self.fresh_copy(this, nongen, vars);
            let progress = self.union(that, copy, Some(w));
            vars.insert(this, that);
            return progress;
        }

        if let (Some(fa), Some(fb)) = (self.base_flow(this).cloned(), self.base_flow(that).cloned()) {
            if !fa.same_class(&fb) {
                if work.is_none() {
                    return true;
                }
                let msg = self.mismatch(this, that);
                let err = self.err(msg);
                let progress = self.unify_rec(that, err, work, dups);
                vars.insert(this, that);
                return progress;
            }
            let met = fa.meet(&fb);
            if met == fb {
                vars.insert(this, that);
                return false;
            }
            let Some(w) = work else {
                return true;
            };
            if let TermKind::Base(flow) = self.kind_mut(that) {
                *flow = met;
            }
            self.add_deps_work(that, w);
            vars.insert(this, that);
            return true;
        }

        if self.is_nil(this) && !self.is_nil(that) {
            if self.may_nil(that) {
                return false;
            }
            let Some(w) = work else {
                return true;
            };
            self.mark_nil(that);
            self.add_deps_work(that, w);
            return true;
        }
        if self.is_nil(that) && !self.is_nil(this) {
            if work.is_none() {
                return true;
            }
            let src = if self.may_nil(this) {
                let copy = self.copy(this);
                self.strip_nil(copy);
                copy
            } else {
                this
            };
            let Some(inner) = self.arg(that, &Slot::Inner) else {
                return false;
            };
            let progress = self.fresh_unify_rec(src, inner, nongen, work, vars, dups);
            if src != this {
                vars.insert(this, that);
            }
            return progress;
        }

        if self.shape(this) != self.shape(that) {
            if work.is_none() {
                return true;
            }
            let msg = self.mismatch(this, that);
            let err = self.err(msg);
            let progress = self.unify_rec(that, err, work, dups);
            vars.insert(this, that);
            return progress;
        }

        let this_slots = self.slots(this);
        if this_slots.is_empty() && self.slots(that).is_empty() {
            vars.insert(this, that);
            return false;
        }

        vars.insert(this, that);
        let mut that = that;
        let mut progress = false;
        let mut missing = this_slots.len() != self.slots(that).len();
        for slot in &this_slots {
            let Some(lhs) = self.arg(this, slot) else {
                continue;
            };
            match self.arg(that, slot) {
                Some(rhs) => {
                    progress |= self.fresh_unify_rec(lhs, rhs, nongen, work.as_deref_mut(), vars, dups);
                }
                None => {
                    missing = true;
                    let Slot::Field(label) = slot else {
                        continue;
                    };
                    if self.is_open(that) {
                        if work.is_none() {
                            return true;
                        }
                        let copy = self.fresh_copy(lhs, nongen, vars);
                        progress |= self.add_fld(that, label, copy, work.as_deref_mut());
                    } else if self.is_open(this) {
                        if work.is_none() {
                            return true;
                        }
                        let err = self.miss_field(that, label);
                        progress |= self.fresh_unify_rec(lhs, err, nongen, work.as_deref_mut(), vars, dups);
                        progress |= self.add_fld(that, label, err, work.as_deref_mut());
                    }
                }
            }
            that = self.find(that);
            if self.is_err(that) {
                return true;
            }
            if progress && work.is_none() {
                return true;
            }
        }

        if missing && !self.is_open(this) && self.is_struct(that) {
            for label in self.field_labels(that) {
                if self.has_slot(this, &Slot::Field(label.clone())) {
                    continue;
                }
                let keep = self.field(that, &label).is_some_and(|f| self.is_err(f));
                if keep {
                    continue;
                }
                if work.is_none() {
                    return true;
                }
                progress |= self.del_fld(that, &label, work.as_deref_mut());
            }
        }

        progress | self.merge_fresh_payload(this, that, work)
    }

    /// Folds function ids, aliases and the open/nil marks of the
    /// definition into the use.
    fn merge_fresh_payload(&mut self, this: TermId, that: TermId, work: Work<'_>) -> bool {
        let merged = match (self.kind(this), self.kind(that)) {
            (
                TermKind::Fun { fids: f1, nil: n1, .. },
                TermKind::Fun {
                    args,
                    ret,
                    fids: f2,
                    nil: n2,
                },
            ) => {
                let fids: FidSet = f1.union(f2).copied().collect();
                let nil = *n1 || *n2;
                (fids != *f2 || nil != *n2).then(|| TermKind::Fun {
                    args: args.clone(),
                    ret: *ret,
                    fids,
                    nil,
                })
            }
            (
                TermKind::Struct {
                    aliases: a1,
                    open: o1,
                    nil: n1,
                    ..
                },
                TermKind::Struct {
                    fields,
                    aliases: a2,
                    open: o2,
                    nil: n2,
                },
            ) => {
                let aliases: AliasSet = a1.union(a2).copied().collect();
                let open = *o1 && *o2;
                let nil = *n1 || *n2;
                (aliases != *a2 || open != *o2 || nil != *n2).then(|| TermKind::Struct {
                    fields: fields.clone(),
                    aliases,
                    open,
                    nil,
                })
            }
            _ => None,
        };
        let Some(kind) = merged else {
            return false;
        };
        let Some(w) = work else {
            return true;
        };
        *self.kind_mut(that) = kind;
        self.add_deps_work(that, w);
        true
    }

    /// Deep copy of `t`, sharing terms pinned by `nongen`.
    fn fresh_copy(&mut self, t: TermId, nongen: &[TermId], vars: &mut Vars) -> TermId {
        let t = self.find(t);
        if let Some(&copy) = vars.get(&t) {
            return copy;
        }
        if self.nongen_in(t, nongen) {
            vars.insert(t, t);
            return t;
        }
        let copy = self.copy(t);
        if self.is_leaf(t) {
            self.terms[copy.index()].deps.clear();
        }
        vars.insert(t, copy);
        for slot in self.slots(t) {
            if let Some(child) = self.arg(t, &slot) {
                let child = self.fresh_copy(child, nongen, vars);
                self.set_slot(copy, &slot, child);
            }
        }
        copy
    }

    /// Cycle-safe structural equality.
    pub fn cycle_equals(&mut self, a: TermId, b: TermId) -> bool {
        let mut seen = Vars::default();
        self.cycle_equals_rec(a, b, &mut seen)
    }

    fn cycle_equals_rec(&mut self, a: TermId, b: TermId, seen: &mut Vars) -> bool {
        let a = self.find(a);
        let b = self.find(b);
        if a == b {
            return true;
        }
        let same_payload = match (self.kind(a), self.kind(b)) {
            (TermKind::Base(x), TermKind::Base(y)) => x == y,
            (TermKind::Err(x), TermKind::Err(y)) => x == y,
            (TermKind::Fun { fids: f1, nil: n1, .. }, TermKind::Fun { fids: f2, nil: n2, .. }) => {
                f1 == f2 && n1 == n2
            }
            (
                TermKind::Struct {
                    aliases: a1, nil: n1, ..
                },
                TermKind::Struct {
                    aliases: a2, nil: n2, ..
                },
            ) => a1 == a2 && n1 == n2,
            (TermKind::Nil(_), TermKind::Nil(_)) => true,
            _ => false,
        };
        if !same_payload || self.shape(a) != self.shape(b) || self.shape(a) == Shape::Leaf {
            return false;
        }
        let slots = self.slots(a);
        if slots.len() != self.slots(b).len() {
            return false;
        }
        if slots.is_empty() {
            return true;
        }
        if let Some(&prior) = seen.get(&a) {
            return prior == b;
        }
        seen.insert(a, b);
        for slot in &slots {
            let (Some(ca), Some(cb)) = (self.arg(a, slot), self.arg(b, slot)) else {
                return false;
            };
            if !self.cycle_equals_rec(ca, cb, seen) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::flow::{AliasSet, FidSet, Flow};
    use crate::term::Forest;
    use crate::worklist::Worklist;
    use std::collections::BTreeMap;

    #[test]
    fn test_fresh_unify_instantiates_free_leaf() {
        let mut forest = Forest::new();
        let mut work = Worklist::new();
        let x = forest.leaf();
        let id = forest.fun(false, FidSet::new(), vec![x], x);
        // Two uses at different types leave the definition alone.
        let (i, r) = (forest.base(Flow::INT64), forest.leaf());
        let use1 = forest.fun(false, FidSet::new(), vec![i], r);
        let (s, q) = (forest.base(Flow::STR), forest.leaf());
        let use2 = forest.fun(false, FidSet::new(), vec![s], q);
        assert!(forest.fresh_unify(id, use1, &[], Some(&mut work)));
        assert!(forest.fresh_unify(id, use2, &[], Some(&mut work)));
        assert_eq!(forest.pretty(id), "{ A -> A }");
        assert_eq!(forest.pretty(use1), "{ int64 -> int64 }");
        assert_eq!(forest.pretty(use2), "{ str -> str }");
        assert!(!forest.fresh_unify(id, use1, &[], None));
    }

    #[test]
    fn test_fresh_unify_nongen_leaf_unifies() {
        let mut forest = Forest::new();
        let mut work = Worklist::new();
        let x = forest.leaf();
        let target = forest.base(Flow::INT64);
        assert!(forest.fresh_unify(x, target, &[x], Some(&mut work)));
        assert_eq!(forest.find(x), forest.find(target));
    }

    #[test]
    fn test_fresh_unify_into_leaf_copies() {
        let mut forest = Forest::new();
        let mut work = Worklist::new();
        let x = forest.leaf();
        let id = forest.fun(false, FidSet::new(), vec![x], x);
        let target = forest.leaf();
        assert!(forest.fresh_unify(id, target, &[], Some(&mut work)));
        let t = forest.find(target);
        assert!(forest.is_fun(t));
        assert_ne!(t, forest.find(id));
        assert!(!forest.fresh_unify(id, target, &[], Some(&mut work)));
    }

    #[test]
    fn test_cycle_equals() {
        let mut forest = Forest::new();
        let (a, b) = (forest.base(Flow::INT64), forest.base(Flow::INT64));
        let s1 = forest.strukt(false, AliasSet::new(), BTreeMap::from([("x".to_string(), a)]));
        let s2 = forest.strukt(false, AliasSet::new(), BTreeMap::from([("x".to_string(), b)]));
        assert!(forest.cycle_equals(s1, s2));
        let c = forest.base(Flow::STR);
        let s3 = forest.strukt(false, AliasSet::new(), BTreeMap::from([("x".to_string(), c)]));
        assert!(!forest.cycle_equals(s1, s3));
        let (l1, l2) = (forest.leaf(), forest.leaf());
        assert!(!forest.cycle_equals(l1, l2));
    }
}
