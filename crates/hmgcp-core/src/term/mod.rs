//! Union-find forest of structural HM types
//!
//! Every term lives in one arena and is addressed by a [`TermId`]:
//! - A union rewrites the loser into a `Redirect`, so ids held elsewhere
//!   stay valid and `find` walks (and compresses) redirect chains
//! - Each term keeps the set of tree nodes to re-run when its class
//!   changes; that set is the only non-local propagation channel
//! - Terms may form cycles, so every traversal carries a visited set

mod fresh;
mod print;
mod unify;
mod widen;

use crate::flow::{AliasSet, FidSet, Flow};
use crate::syntax::NodeId;
use crate::worklist::Worklist;
use fnv::FnvHashSet;
use indexmap::IndexSet;
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// Worklist handle threaded through unification. `None` probes: the call
/// reports whether it would make progress and commits nothing.
pub type Work<'a> = Option<&'a mut Worklist>;

/// Index of a term in the [`Forest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TermId(u32);

impl TermId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Position of a child inside a term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    Arg(usize),
    Ret,
    Field(String),
    /// The wrapped term of a nilable.
    Inner,
}

#[derive(Debug, Clone)]
pub enum TermKind {
    /// Unconstrained type variable.
    Leaf,
    Base(Flow),
    /// Possibly-nil wrapper; the inner term is kept a leaf by `find`.
    Nil(TermId),
    Fun {
        args: Vec<TermId>,
        ret: TermId,
        fids: FidSet,
        nil: bool,
    },
    Struct {
        fields: BTreeMap<String, TermId>,
        aliases: AliasSet,
        open: bool,
        nil: bool,
    },
    Err(String),
    Redirect(TermId),
}

#[derive(Debug, Clone)]
pub struct Term {
    pub(crate) kind: TermKind,
    pub(crate) deps: IndexSet<NodeId>,
    /// Reachable from a function input; bases here are kept widened.
    pub(crate) func_input: bool,
}

impl Term {
    fn new(kind: TermKind) -> Self {
        Self {
            kind,
            deps: IndexSet::new(),
            func_input: false,
        }
    }
}

/// Coarse discriminant used to decide whether two terms can unify
/// structurally. Functions of different arity never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shape {
    Leaf,
    Base,
    Nil,
    Fun(usize),
    Struct,
    Err,
}

#[derive(Debug, Default)]
pub struct Forest {
    terms: Vec<Term>,
    unions: usize,
}

impl Forest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Terms allocated so far, redirects included.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Number of class merges performed. Never decreases.
    pub fn unions(&self) -> usize {
        self.unions
    }

    /// Live equivalence classes among the first `upto` terms.
    pub fn classes(&self, upto: usize) -> usize {
        self.terms
            .iter()
            .take(upto)
            .filter(|t| !matches!(t.kind, TermKind::Redirect(_)))
            .count()
    }

    fn alloc(&mut self, kind: TermKind) -> TermId {
        let id = TermId(self.terms.len() as u32);
        self.terms.push(Term::new(kind));
        id
    }

    pub fn leaf(&mut self) -> TermId {
        self.alloc(TermKind::Leaf)
    }

    pub fn base(&mut self, flow: Flow) -> TermId {
        self.alloc(TermKind::Base(flow))
    }

    pub fn nil(&mut self, inner: TermId) -> TermId {
        self.alloc(TermKind::Nil(inner))
    }

    pub fn err(&mut self, msg: impl Into<String>) -> TermId {
        self.alloc(TermKind::Err(msg.into()))
    }

    /// A function shape. Shapes for lambda definitions and call sites are
    /// `func_input`: bases reachable through their arguments get widened.
    pub fn fun(&mut self, func_input: bool, fids: FidSet, args: Vec<TermId>, ret: TermId) -> TermId {
        if func_input {
            for &arg in &args {
                self.widen_bases(arg);
            }
        }
        self.alloc(TermKind::Fun {
            args,
            ret,
            fids,
            nil: false,
        })
    }

    pub fn strukt(&mut self, open: bool, aliases: AliasSet, fields: BTreeMap<String, TermId>) -> TermId {
        self.alloc(TermKind::Struct {
            fields,
            aliases,
            open,
            nil: false,
        })
    }

    /// `Missing field <label> in <term>` error term.
    pub fn miss_field(&mut self, t: TermId, label: &str) -> TermId {
        let msg = format!("Missing field {label} in {}", self.pretty(t));
        self.err(msg)
    }

    pub fn kind(&self, t: TermId) -> &TermKind {
        &self.terms[t.index()].kind
    }

    fn kind_mut(&mut self, t: TermId) -> &mut TermKind {
        &mut self.terms[t.index()].kind
    }

    pub fn deps(&self, t: TermId) -> &IndexSet<NodeId> {
        &self.terms[t.index()].deps
    }

    pub fn is_func_input(&self, t: TermId) -> bool {
        self.terms[t.index()].func_input
    }

    // ========================================================================
    // Find
    // ========================================================================

    /// Representative of `t`'s class without touching the forest.
    pub fn debug_find(&self, mut t: TermId) -> TermId {
        while let TermKind::Redirect(next) = self.terms[t.index()].kind {
            t = next;
        }
        t
    }

    /// Representative of `t`'s class, compressing the path and collapsing
    /// nilable wrappers whose inner term is no longer a leaf.
    pub fn find(&mut self, t: TermId) -> TermId {
        let root = self.debug_find(t);
        let mut cur = t;
        while cur != root {
            let TermKind::Redirect(next) = self.terms[cur.index()].kind else {
                break;
            };
            self.terms[cur.index()].kind = TermKind::Redirect(root);
            cur = next;
        }
        if matches!(self.kind(root), TermKind::Nil(_)) {
            self.fix_nil(root)
        } else {
            root
        }
    }

    fn fix_nil(&mut self, t: TermId) -> TermId {
        let TermKind::Nil(inner) = *self.kind(t) else {
            return t;
        };
        let n = self.find(inner);
        let absorbed = match self.kind(n) {
            TermKind::Leaf => {
                *self.kind_mut(t) = TermKind::Nil(n);
                return t;
            }
            TermKind::Base(flow) => TermKind::Base(flow.meet_nil()),
            TermKind::Fun { args, ret, fids, .. } => TermKind::Fun {
                args: args.clone(),
                ret: *ret,
                fids: fids.clone(),
                nil: true,
            },
            TermKind::Struct {
                fields,
                aliases,
                open,
                ..
            } => TermKind::Struct {
                fields: fields.clone(),
                aliases: aliases.clone(),
                open: *open,
                nil: true,
            },
            TermKind::Nil(m) => TermKind::Nil(*m),
            TermKind::Err(msg) => TermKind::Err(msg.clone()),
            TermKind::Redirect(_) => return t,
        };
        *self.kind_mut(t) = absorbed;
        let deps: Vec<NodeId> = self.deps(n).iter().copied().collect();
        self.push_deps(t, &deps);
        t
    }

    // ========================================================================
    // Predicates (on representatives)
    // ========================================================================

    pub fn is_leaf(&self, t: TermId) -> bool {
        matches!(self.kind(t), TermKind::Leaf)
    }

    pub fn is_base(&self, t: TermId) -> bool {
        matches!(self.kind(t), TermKind::Base(_))
    }

    pub fn is_nil(&self, t: TermId) -> bool {
        matches!(self.kind(t), TermKind::Nil(_))
    }

    pub fn is_fun(&self, t: TermId) -> bool {
        matches!(self.kind(t), TermKind::Fun { .. })
    }

    pub fn is_struct(&self, t: TermId) -> bool {
        matches!(self.kind(t), TermKind::Struct { .. })
    }

    pub fn is_err(&self, t: TermId) -> bool {
        matches!(self.kind(t), TermKind::Err(_))
    }

    pub fn is_open(&self, t: TermId) -> bool {
        matches!(self.kind(t), TermKind::Struct { open: true, .. })
    }

    pub fn base_flow(&self, t: TermId) -> Option<&Flow> {
        match self.kind(t) {
            TermKind::Base(flow) => Some(flow),
            _ => None,
        }
    }

    /// Whether values of this type may be nil.
    pub fn may_nil(&self, t: TermId) -> bool {
        match self.kind(t) {
            TermKind::Base(flow) => flow.may_nil(),
            TermKind::Nil(_) => true,
            TermKind::Fun { nil, .. } | TermKind::Struct { nil, .. } => *nil,
            _ => false,
        }
    }

    pub fn fun_arity(&self, t: TermId) -> Option<usize> {
        match self.kind(t) {
            TermKind::Fun { args, .. } => Some(args.len()),
            _ => None,
        }
    }

    pub(crate) fn shape(&self, t: TermId) -> Shape {
        match self.kind(t) {
            TermKind::Leaf | TermKind::Redirect(_) => Shape::Leaf,
            TermKind::Base(_) => Shape::Base,
            TermKind::Nil(_) => Shape::Nil,
            TermKind::Fun { args, .. } => Shape::Fun(args.len()),
            TermKind::Struct { .. } => Shape::Struct,
            TermKind::Err(_) => Shape::Err,
        }
    }

    // ========================================================================
    // Children
    // ========================================================================

    /// Child slots in a fixed order: arguments then return, or labels.
    pub fn slots(&self, t: TermId) -> Vec<Slot> {
        match self.kind(t) {
            TermKind::Nil(_) => vec![Slot::Inner],
            TermKind::Fun { args, .. } => (0..args.len())
                .map(Slot::Arg)
                .chain(std::iter::once(Slot::Ret))
                .collect(),
            TermKind::Struct { fields, .. } => fields.keys().cloned().map(Slot::Field).collect(),
            _ => Vec::new(),
        }
    }

    /// Raw child ids, possibly stale.
    pub(crate) fn children(&self, t: TermId) -> SmallVec<[TermId; 4]> {
        match self.kind(t) {
            TermKind::Nil(inner) | TermKind::Redirect(inner) => SmallVec::from_slice(&[*inner]),
            TermKind::Fun { args, ret, .. } => args.iter().copied().chain(std::iter::once(*ret)).collect(),
            TermKind::Struct { fields, .. } => fields.values().copied().collect(),
            _ => SmallVec::new(),
        }
    }

    fn get(&self, t: TermId, slot: &Slot) -> Option<TermId> {
        match (self.kind(t), slot) {
            (TermKind::Nil(inner), Slot::Inner) => Some(*inner),
            (TermKind::Fun { args, .. }, Slot::Arg(i)) => args.get(*i).copied(),
            (TermKind::Fun { ret, .. }, Slot::Ret) => Some(*ret),
            (TermKind::Struct { fields, .. }, Slot::Field(label)) => fields.get(label).copied(),
            _ => None,
        }
    }

    pub(crate) fn has_slot(&self, t: TermId, slot: &Slot) -> bool {
        self.get(t, slot).is_some()
    }

    pub(crate) fn set_slot(&mut self, t: TermId, slot: &Slot, child: TermId) {
        match (self.kind_mut(t), slot) {
            (TermKind::Nil(inner), Slot::Inner) => *inner = child,
            (TermKind::Fun { args, .. }, Slot::Arg(i)) => {
                if let Some(a) = args.get_mut(*i) {
                    *a = child;
                }
            }
            (TermKind::Fun { ret, .. }, Slot::Ret) => *ret = child,
            (TermKind::Struct { fields, .. }, Slot::Field(label)) => {
                fields.insert(label.clone(), child);
            }
            _ => {}
        }
    }

    /// The representative of a child, cached back into the parent.
    pub fn arg(&mut self, t: TermId, slot: &Slot) -> Option<TermId> {
        let raw = self.get(t, slot)?;
        let found = self.find(raw);
        if found != raw {
            self.set_slot(t, slot, found);
        }
        Some(found)
    }

    pub fn field(&mut self, t: TermId, label: &str) -> Option<TermId> {
        self.arg(t, &Slot::Field(label.to_string()))
    }

    pub fn field_labels(&self, t: TermId) -> Vec<String> {
        match self.kind(t) {
            TermKind::Struct { fields, .. } => fields.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Adds a field during tree preparation, before any work is queued.
    pub(crate) fn insert_field(&mut self, t: TermId, label: &str, child: TermId) {
        self.set_slot(t, &Slot::Field(label.to_string()), child);
    }

    /// Shallow copy sharing children; deps and the input mark carry over.
    pub(crate) fn copy(&mut self, t: TermId) -> TermId {
        let term = self.terms[t.index()].clone();
        let id = TermId(self.terms.len() as u32);
        self.terms.push(term);
        id
    }

    /// Clears the nil mark on a copy made for un-nil-ing.
    pub(crate) fn strip_nil(&mut self, t: TermId) {
        match self.kind_mut(t) {
            TermKind::Base(flow) => *flow = flow.not_nil(),
            TermKind::Fun { nil, .. } | TermKind::Struct { nil, .. } => *nil = false,
            _ => {}
        }
    }

    /// Replaces the flow of a base term. Returns whether it changed.
    pub(crate) fn set_base(&mut self, t: TermId, to: Flow) -> bool {
        match self.kind_mut(t) {
            TermKind::Base(flow) if *flow != to => {
                *flow = to;
                true
            }
            _ => false,
        }
    }

    /// Marks a representative possibly-nil. Returns whether it changed.
    pub(crate) fn mark_nil(&mut self, t: TermId) -> bool {
        match self.kind_mut(t) {
            TermKind::Base(flow) => {
                let m = flow.meet_nil();
                let changed = m != *flow;
                *flow = m;
                changed
            }
            TermKind::Fun { nil, .. } | TermKind::Struct { nil, .. } => !std::mem::replace(nil, true),
            _ => false,
        }
    }

    // ========================================================================
    // Dependencies
    // ========================================================================

    /// Registers `node` to be re-run whenever `t` or anything reachable
    /// from it changes.
    pub fn push_update(&mut self, t: TermId, node: NodeId) {
        self.push_deps(t, &[node]);
    }

    pub(crate) fn push_deps(&mut self, t: TermId, deps: &[NodeId]) {
        if deps.is_empty() {
            return;
        }
        let mut visit = FnvHashSet::default();
        self.push_deps_rec(t, deps, &mut visit);
    }

    fn push_deps_rec(&mut self, t: TermId, deps: &[NodeId], visit: &mut FnvHashSet<TermId>) {
        let t = self.debug_find(t);
        if !visit.insert(t) {
            return;
        }
        self.terms[t.index()].deps.extend(deps.iter().copied());
        for child in self.children(t) {
            self.push_deps_rec(child, deps, visit);
        }
    }

    /// Queues every dependent of `t` and of everything reachable from it.
    pub fn add_deps_work(&self, t: TermId, work: &mut Worklist) {
        let mut visit = FnvHashSet::default();
        self.add_deps_work_rec(t, work, &mut visit);
    }

    fn add_deps_work_rec(&self, t: TermId, work: &mut Worklist, visit: &mut FnvHashSet<TermId>) {
        let t = self.debug_find(t);
        if !visit.insert(t) {
            return;
        }
        work.extend(self.terms[t.index()].deps.iter().copied());
        for child in self.children(t) {
            self.add_deps_work_rec(child, work, visit);
        }
    }

    // ========================================================================
    // Occurs check
    // ========================================================================

    /// `true` when `t` occurs inside any of the (non-generative) `vars`.
    pub fn nongen_in(&mut self, t: TermId, vars: &[TermId]) -> bool {
        let t = self.find(t);
        let mut visit = FnvHashSet::default();
        vars.iter().any(|&v| self.occurs_rec(t, v, &mut visit))
    }

    /// `true` when `t` occurs inside `within`.
    pub fn occurs_in(&mut self, t: TermId, within: TermId) -> bool {
        let t = self.find(t);
        let mut visit = FnvHashSet::default();
        self.occurs_rec(t, within, &mut visit)
    }

    fn occurs_rec(&mut self, t: TermId, x: TermId, visit: &mut FnvHashSet<TermId>) -> bool {
        let x = self.find(x);
        if x == t {
            return true;
        }
        if !visit.insert(x) {
            return false;
        }
        self.children(x)
            .into_iter()
            .any(|child| self.occurs_rec(t, child, visit))
    }
}
