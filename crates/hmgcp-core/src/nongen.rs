//! Non-generative scope stack
//!
//! Lambda parameters and let binders still being defined are pinned: a
//! use inside their scope must unify with them rather than instantiate a
//! fresh copy. The stack is a persistent cons-list so sibling subtrees
//! share their common prefix.

use crate::term::{Forest, TermId};
use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug, Clone, Default)]
pub struct NonGen(Option<Rc<Frame>>);

#[derive(Debug)]
struct Frame {
    var: Cell<TermId>,
    next: NonGen,
}

impl NonGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new stack with `var` on top; `self` is unchanged.
    pub fn push(&self, var: TermId) -> NonGen {
        NonGen(Some(Rc::new(Frame {
            var: Cell::new(var),
            next: self.clone(),
        })))
    }

    pub fn len(&self) -> usize {
        self.frames().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    fn frames(&self) -> impl Iterator<Item = &Frame> {
        std::iter::successors(self.0.as_deref(), |frame| frame.next.0.as_deref())
    }

    /// Current representatives of every pinned variable, innermost first.
    /// Each frame caches its representative for the next lookup.
    pub fn resolve(&self, forest: &mut Forest) -> Vec<TermId> {
        self.frames()
            .map(|frame| {
                let var = forest.find(frame.var.get());
                frame.var.set(var);
                var
            })
            .collect()
    }
}
