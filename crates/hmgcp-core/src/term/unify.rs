//! Structural unification

use super::{Forest, Slot, TermId, TermKind, Work};
use fnv::FnvHashSet;

pub(super) type Dups = FnvHashSet<(TermId, TermId)>;

impl Forest {
    /// Unifies two terms, returning whether anything changed.
    ///
    /// Never fails: shape conflicts become error terms. With `work` set to
    /// `None` this only reports whether progress is possible.
    pub fn unify(&mut self, a: TermId, b: TermId, work: Work<'_>) -> bool {
        let a = self.find(a);
        let b = self.find(b);
        if a == b {
            return false;
        }
        let mut dups = Dups::default();
        self.unify_rec(a, b, work, &mut dups)
    }

    pub(super) fn unify_rec(&mut self, a: TermId, b: TermId, mut work: Work<'_>, dups: &mut Dups) -> bool {
        let a = self.find(a);
        let b = self.find(b);
        if a == b {
            return false;
        }

        if self.slots(a).is_empty() && self.slots(b).is_empty() {
            // Errors beat bases beat leaves; between equals the older wins.
            let (mut loser, mut winner) = if self.is_err(a) || (!self.is_err(b) && self.is_base(a)) {
                (b, a)
            } else {
                (a, b)
            };
            if self.shape(loser) == self.shape(winner) && a < b {
                (loser, winner) = (b, a);
            }
            return self.union(loser, winner, work);
        }

        if self.is_leaf(a) || self.is_err(b) {
            return self.union(a, b, work);
        }
        if self.is_leaf(b) || self.is_err(a) {
            return self.union(b, a, work);
        }
        if self.is_nil(a) && !self.is_nil(b) {
            return self.unify_nil(a, b, work, dups);
        }
        if self.is_nil(b) && !self.is_nil(a) {
            return self.unify_nil(b, a, work, dups);
        }

        if !dups.insert((a, b)) {
            return false;
        }
        if work.is_none() {
            return true;
        }
        if self.shape(a) != self.shape(b) {
            let msg = self.mismatch(a, b);
            return self.union_err(a, b, work, msg);
        }

        let mut this = a;
        let mut that = b;
        let mut progress = false;
        for slot in self.slots(this) {
            let Some(lhs) = self.arg(this, &slot) else {
                continue;
            };
            match self.arg(that, &slot) {
                Some(rhs) => {
                    progress |= self.unify_rec(lhs, rhs, work.as_deref_mut(), dups);
                }
                None => {
                    if let Slot::Field(label) = &slot {
                        if self.is_open(that) {
                            progress |= self.add_fld(that, label, lhs, work.as_deref_mut());
                        }
                    }
                }
            }
            this = self.find(this);
            that = self.find(that);
            if self.is_err(this) || self.is_err(that) {
                break;
            }
        }

        if !self.is_err(this) && !self.is_err(that) {
            for slot in self.slots(that) {
                let Slot::Field(label) = &slot else {
                    continue;
                };
                if self.has_slot(this, &slot) {
                    continue;
                }
                if self.is_open(this) {
                    if let Some(rhs) = self.arg(that, &slot) {
                        progress |= self.add_fld(this, label, rhs, work.as_deref_mut());
                    }
                } else {
                    progress |= self.del_fld(that, label, work.as_deref_mut());
                }
            }
        }

        if self.is_err(this) && !self.is_err(that) {
            if let Some(w) = work.as_deref_mut() {
                self.add_deps_work(that, w);
            }
            return self.hard_union(that, this) | progress;
        }
        // Children may already have merged the two through a cycle.
        self.union(this, that, work) | progress
    }

    /// Nilable `nil_t` against non-nilable, non-leaf `that`: the wrapper's
    /// leaf takes a non-nil copy of `that`, then `that` joins the now
    /// nilable wrapper.
    fn unify_nil(&mut self, nil_t: TermId, that: TermId, mut work: Work<'_>, dups: &mut Dups) -> bool {
        let Some(w) = work.as_deref_mut() else {
            return true;
        };
        let Some(leaf) = self.arg(nil_t, &Slot::Inner) else {
            return false;
        };
        if !self.is_leaf(leaf) {
            return self.unify_rec(leaf, that, work, dups);
        }
        let copy = self.copy(that);
        self.strip_nil(copy);
        self.add_deps_work(leaf, w);
        let mut progress = self.union(leaf, copy, Some(w));
        let nilable = self.find(nil_t);
        if let Some(w) = work.as_deref_mut() {
            self.add_deps_work(that, w);
        }
        progress |= self.hard_union(that, nilable);
        progress
    }

    /// Merges `loser`'s class into `winner`'s.
    pub(super) fn union(&mut self, loser: TermId, winner: TermId, mut work: Work<'_>) -> bool {
        if loser == winner {
            return false;
        }
        let Some(w) = work.as_deref_mut() else {
            return true;
        };
        if !self.is_err(winner) {
            if let Err(msg) = self.merge_payload(loser, winner) {
                return self.union_err(loser, winner, Some(w), msg);
            }
        }
        if self.is_func_input(loser) {
            self.widen_bases(winner);
        }
        self.add_deps_work(winner, w);
        self.add_deps_work(loser, w);
        self.hard_union(loser, winner)
    }

    /// Folds `loser`'s flow information into `winner`.
    fn merge_payload(&mut self, loser: TermId, winner: TermId) -> Result<(), String> {
        use TermKind::*;
        let merged = match (self.kind(loser), self.kind(winner)) {
            (Leaf, _) | (Nil(_), Nil(_)) => None,
            (Err(msg), _) => Some(Err(msg.clone())),
            (other, Leaf) => Some(other.clone()),
            (Base(a), Base(b)) => {
                if !a.same_class(b) {
                    return Result::Err(self.mismatch(loser, winner));
                }
                Some(Base(a.meet(b)))
            }
            (Fun { fids: f1, nil: n1, .. }, Fun { args, ret, fids: f2, nil: n2 }) => Some(Fun {
                args: args.clone(),
                ret: *ret,
                fids: f1.union(f2).copied().collect(),
                nil: *n1 || *n2,
            }),
            (
                Struct {
                    aliases: a1,
                    open: o1,
                    nil: n1,
                    ..
                },
                Struct {
                    fields,
                    aliases: a2,
                    open: o2,
                    nil: n2,
                },
            ) => Some(Struct {
                fields: fields.clone(),
                aliases: a1.union(a2).copied().collect(),
                open: *o1 && *o2,
                nil: *n1 || *n2,
            }),
            _ => return Result::Err(self.mismatch(loser, winner)),
        };
        if let Some(kind) = merged {
            *self.kind_mut(winner) = kind;
        }
        Ok(())
    }

    /// Redirects `loser` to `winner` without queuing work.
    pub(super) fn hard_union(&mut self, loser: TermId, winner: TermId) -> bool {
        if loser == winner {
            return false;
        }
        let deps: Vec<_> = std::mem::take(&mut self.terms[loser.index()].deps)
            .into_iter()
            .collect();
        self.push_deps(winner, &deps);
        let term = &mut self.terms[loser.index()];
        term.kind = TermKind::Redirect(winner);
        term.func_input = false;
        self.unions += 1;
        true
    }

    /// Both sides become one error term carrying `msg`.
    pub(super) fn union_err(&mut self, a: TermId, b: TermId, mut work: Work<'_>, msg: String) -> bool {
        let err = self.err(msg);
        self.union(a, err, work.as_deref_mut());
        let err = self.find(a);
        let b = self.find(b);
        self.union(b, err, work);
        true
    }

    pub(super) fn mismatch(&self, a: TermId, b: TermId) -> String {
        format!("Cannot unify {} and {}", self.pretty(a), self.pretty(b))
    }

    /// Adds a field to an open struct.
    pub(crate) fn add_fld(&mut self, t: TermId, label: &str, fld: TermId, work: Work<'_>) -> bool {
        if !self.is_struct(t) {
            return false;
        }
        self.set_slot(t, &Slot::Field(label.to_string()), fld);
        let deps: Vec<_> = self.deps(t).iter().copied().collect();
        self.push_deps(fld, &deps);
        if let Some(w) = work {
            self.add_deps_work(t, w);
        }
        true
    }

    /// Drops a field from a struct that a closed partner lacks.
    pub(crate) fn del_fld(&mut self, t: TermId, label: &str, work: Work<'_>) -> bool {
        if let Some(w) = work {
            self.add_deps_work(t, w);
        }
        match self.kind_mut(t) {
            TermKind::Struct { fields, .. } => fields.remove(label).is_some(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{AliasSet, FidSet, Flow};
    use crate::worklist::Worklist;
    use std::collections::BTreeMap;

    fn forest_and_work() -> (Forest, Worklist) {
        (Forest::new(), Worklist::new())
    }

    #[test]
    fn test_unify_self_is_no_progress() {
        let (mut forest, mut work) = forest_and_work();
        let a = forest.leaf();
        assert!(!forest.unify(a, a, Some(&mut work)));
    }

    #[test]
    fn test_unify_idempotent() {
        let (mut forest, mut work) = forest_and_work();
        let x = forest.leaf();
        let r = forest.base(Flow::INT64);
        let f = forest.fun(false, FidSet::new(), vec![x], r);
        let y = forest.base(Flow::STR);
        let s = forest.leaf();
        let g = forest.fun(false, FidSet::new(), vec![y], s);
        assert!(forest.unify(f, g, Some(&mut work)));
        assert!(!forest.unify(f, g, Some(&mut work)));
        assert!(!forest.unify(f, g, None));
        assert_eq!(forest.pretty(f), "{ str -> int64 }");
    }

    #[test]
    fn test_probe_commits_nothing() {
        let (mut forest, _) = forest_and_work();
        let a = forest.leaf();
        let b = forest.base(Flow::INT64);
        let unions = forest.unions();
        assert!(forest.unify(a, b, None));
        assert_eq!(forest.unions(), unions);
        let ra = forest.find(a);
        assert!(forest.is_leaf(ra));
    }

    #[test]
    fn test_base_meet_on_union() {
        let (mut forest, mut work) = forest_and_work();
        let a = forest.base(Flow::int(3));
        let b = forest.base(Flow::int(4));
        forest.unify(a, b, Some(&mut work));
        let r = forest.find(a);
        assert_eq!(forest.base_flow(r), Some(&Flow::INT64));
    }

    #[test]
    fn test_base_class_mismatch_is_error() {
        let (mut forest, mut work) = forest_and_work();
        let a = forest.base(Flow::INT64);
        let b = forest.base(Flow::STR);
        forest.unify(a, b, Some(&mut work));
        let r = forest.find(a);
        assert!(forest.is_err(r));
        assert_eq!(forest.find(b), r);
        let msg = forest.pretty(r);
        assert!(msg.starts_with("Cannot unify"));
        assert!(msg.contains("int64") && msg.contains("str"));
    }

    #[test]
    fn test_error_dominates() {
        let (mut forest, mut work) = forest_and_work();
        let e = forest.err("boom");
        let x = forest.leaf();
        let r = forest.leaf();
        let f = forest.fun(false, FidSet::new(), vec![x], r);
        forest.unify(f, e, Some(&mut work));
        let rf = forest.find(f);
        assert!(forest.is_err(rf));
        assert!(!forest.unify(f, e, Some(&mut work)));
    }

    #[test]
    fn test_fun_arity_mismatch_is_error() {
        let (mut forest, mut work) = forest_and_work();
        let (x, r) = (forest.leaf(), forest.leaf());
        let f = forest.fun(false, FidSet::new(), vec![x], r);
        let (y, z, s) = (forest.leaf(), forest.leaf(), forest.leaf());
        let g = forest.fun(false, FidSet::new(), vec![y, z], s);
        forest.unify(f, g, Some(&mut work));
        let rg = forest.find(g);
        assert!(forest.is_err(rg));
    }

    #[test]
    fn test_open_struct_gains_field() {
        let (mut forest, mut work) = forest_and_work();
        let x = forest.base(Flow::INT64);
        let open = forest.strukt(true, AliasSet::new(), BTreeMap::from([("x".to_string(), x)]));
        let y = forest.base(Flow::STR);
        let x2 = forest.leaf();
        let closed = forest.strukt(
            false,
            AliasSet::new(),
            BTreeMap::from([("x".to_string(), x2), ("y".to_string(), y)]),
        );
        forest.unify(open, closed, Some(&mut work));
        let r = forest.find(open);
        assert!(!forest.is_open(r));
        assert_eq!(forest.field_labels(r), vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_closed_structs_drop_unshared_fields() {
        let (mut forest, mut work) = forest_and_work();
        let (x, x2, y) = (forest.leaf(), forest.leaf(), forest.leaf());
        let a = forest.strukt(false, AliasSet::new(), BTreeMap::from([("x".to_string(), x)]));
        let b = forest.strukt(
            false,
            AliasSet::new(),
            BTreeMap::from([("x".to_string(), x2), ("y".to_string(), y)]),
        );
        forest.unify(a, b, Some(&mut work));
        let r = forest.find(a);
        assert_eq!(forest.field_labels(r), vec!["x".to_string()]);
    }

    #[test]
    fn test_nilable_collapse_with_struct() {
        let (mut forest, mut work) = forest_and_work();
        let leaf = forest.leaf();
        let n = forest.nil(leaf);
        let x = forest.base(Flow::INT64);
        let s = forest.strukt(false, AliasSet::new(), BTreeMap::from([("x".to_string(), x)]));
        assert!(forest.unify(n, s, Some(&mut work)));
        let r = forest.find(s);
        assert!(forest.is_struct(r));
        assert!(forest.may_nil(r));
        assert_eq!(forest.find(n), r);
        assert!(!forest.unify(n, s, Some(&mut work)));
        assert_eq!(forest.pretty(r), "@{ x = int64 }?");
    }

    #[test]
    fn test_recursive_terms_terminate() {
        let (mut forest, mut work) = forest_and_work();
        // a = @{ n = a }, b = @{ n = @{ n = b } }
        let a_leaf = forest.leaf();
        let a = forest.strukt(false, AliasSet::new(), BTreeMap::from([("n".to_string(), a_leaf)]));
        forest.unify(a_leaf, a, Some(&mut work));
        let b_leaf = forest.leaf();
        let b = forest.strukt(false, AliasSet::new(), BTreeMap::from([("n".to_string(), b_leaf)]));
        let b2 = forest.strukt(false, AliasSet::new(), BTreeMap::from([("n".to_string(), b)]));
        forest.unify(b_leaf, b2, Some(&mut work));
        forest.unify(a, b, Some(&mut work));
        assert_eq!(forest.find(a), forest.find(b));
        assert!(!forest.unify(a, b2, Some(&mut work)));
    }
}
