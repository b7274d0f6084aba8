//! Built-in primitives: HM skeletons and constant-folding flow rules

use crate::flow::{AliasId, AliasSet, FidSet, Flow, FunId, IntFlow};
use crate::term::{Forest, TermId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Prim {
    If,
    Pair,
    Triple,
    Eq,
    Eq0,
    IsEmpty,
    /// Synthesized by the `if` guard rewrite; never parsed.
    NotNil,
    Mul,
    Add,
    Dec,
    Str,
    Factor,
}

impl Prim {
    pub const ALL: [Prim; 12] = [
        Prim::If,
        Prim::Pair,
        Prim::Triple,
        Prim::Eq,
        Prim::Eq0,
        Prim::IsEmpty,
        Prim::NotNil,
        Prim::Mul,
        Prim::Add,
        Prim::Dec,
        Prim::Str,
        Prim::Factor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Prim::If => "if",
            Prim::Pair => "pair",
            Prim::Triple => "triple",
            Prim::Eq => "eq",
            Prim::Eq0 => "eq0",
            Prim::IsEmpty => "isempty",
            Prim::NotNil => " notnil",
            Prim::Mul => "*",
            Prim::Add => "+",
            Prim::Dec => "dec",
            Prim::Str => "str",
            Prim::Factor => "factor",
        }
    }

    pub fn from_name(name: &str) -> Option<Prim> {
        Prim::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn arity(self) -> usize {
        match self {
            Prim::If | Prim::Triple => 3,
            Prim::Pair | Prim::Eq | Prim::Mul | Prim::Add => 2,
            _ => 1,
        }
    }

    /// Allocates this occurrence's function term; every leaf and base in
    /// it is fresh. Returns the function and its argument terms.
    pub(crate) fn skeleton(self, forest: &mut Forest, fid: FunId, pair: AliasId, triple: AliasId) -> (TermId, Vec<TermId>) {
        let (args, ret) = match self {
            Prim::If => {
                let args = vec![forest.leaf(), forest.leaf(), forest.leaf()];
                (args, forest.leaf())
            }
            Prim::Pair | Prim::Triple => {
                let args: Vec<TermId> = (0..self.arity()).map(|_| forest.leaf()).collect();
                let alias = if self == Prim::Pair { pair } else { triple };
                let fields: BTreeMap<String, TermId> = args
                    .iter()
                    .enumerate()
                    .map(|(i, &t)| (i.to_string(), t))
                    .collect();
                let ret = forest.strukt(false, AliasSet::from([alias]), fields);
                (args, ret)
            }
            Prim::Eq => {
                let a = forest.leaf();
                (vec![a, a], forest.base(Flow::BOOL))
            }
            Prim::Eq0 => (vec![forest.base(Flow::INT64)], forest.base(Flow::BOOL)),
            Prim::IsEmpty => (vec![forest.base(Flow::STR)], forest.base(Flow::BOOL)),
            Prim::NotNil => (vec![forest.leaf()], forest.leaf()),
            Prim::Mul | Prim::Add => {
                let args = vec![forest.base(Flow::INT64), forest.base(Flow::INT64)];
                (args, forest.base(Flow::INT64))
            }
            Prim::Dec => (vec![forest.base(Flow::INT64)], forest.base(Flow::INT64)),
            Prim::Str => (vec![forest.base(Flow::INT64)], forest.base(Flow::STR)),
            Prim::Factor => (vec![forest.base(Flow::FLT64)], forest.base(Flow::FLT64)),
        };
        let fun = forest.fun(false, FidSet::from([fid]), args.clone(), ret);
        (fun, args)
    }

    /// Result flow for a call with these actual flows. A missing actual
    /// counts as any value.
    pub fn apply(self, args: &[Flow], pair: AliasId, triple: AliasId) -> Flow {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Flow::SCALAR);
        match self {
            Prim::Pair | Prim::Triple => {
                let alias = if self == Prim::Pair { pair } else { triple };
                let fields = (0..self.arity()).map(|i| (i.to_string(), arg(i))).collect();
                return Flow::rec(alias, fields);
            }
            Prim::If => return if_flow(&arg(0), &arg(1), &arg(2)),
            Prim::NotNil => {
                let val = arg(0);
                return if val == Flow::Nil { Flow::Any } else { val.not_nil() };
            }
            _ => {}
        }
        let ins: Vec<Flow> = (0..self.arity()).map(arg).collect();
        if ins.iter().any(Flow::above_center) {
            return Flow::Any;
        }
        match self {
            Prim::Eq => {
                if ins[0].is_con() && ins[0] == ins[1] {
                    Flow::TRUE
                } else {
                    Flow::BOOL
                }
            }
            Prim::Eq0 => {
                if ins[0].is_false() {
                    Flow::TRUE
                } else if !ins[0].may_nil() {
                    Flow::FALSE
                } else {
                    Flow::BOOL
                }
            }
            Prim::IsEmpty => match &ins[0] {
                Flow::Str { con: Some(s), nil: false } => Flow::int(i64::from(s.is_empty())),
                _ => Flow::BOOL,
            },
            Prim::Mul => match (int_con(&ins[0]), int_con(&ins[1])) {
                (Some(0), _) | (_, Some(0)) if is_int(&ins[0]) && is_int(&ins[1]) => Flow::int(0),
                (Some(a), Some(b)) => Flow::int(a.wrapping_mul(b)),
                _ => Flow::INT64,
            },
            Prim::Add => match (int_con(&ins[0]), int_con(&ins[1])) {
                (Some(a), Some(b)) => Flow::int(a.wrapping_add(b)),
                _ => Flow::INT64,
            },
            Prim::Dec => match int_con(&ins[0]) {
                Some(a) => Flow::int(a.wrapping_sub(1)),
                None => Flow::INT64,
            },
            Prim::Str => match int_con(&ins[0]) {
                Some(a) => Flow::str(&a.to_string()),
                None => Flow::STR,
            },
            Prim::Factor => Flow::FLT64,
            Prim::If | Prim::Pair | Prim::Triple | Prim::NotNil => Flow::SCALAR,
        }
    }
}

impl fmt::Display for Prim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Only flows from branches that can execute.
fn if_flow(pred: &Flow, t: &Flow, f: &Flow) -> Flow {
    if pred.is_false() {
        f.clone()
    } else if pred.above_center() {
        Flow::Any
    } else if !pred.may_nil() {
        t.clone()
    } else {
        t.meet(f)
    }
}

fn is_int(flow: &Flow) -> bool {
    matches!(flow, Flow::Int(_))
}

fn int_con(flow: &Flow) -> Option<i64> {
    match flow {
        Flow::Int(IntFlow::Con(c)) => Some(*c),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAIR: AliasId = AliasId(1);
    const TRIPLE: AliasId = AliasId(2);

    fn fold(prim: Prim, args: &[Flow]) -> Flow {
        prim.apply(args, PAIR, TRIPLE)
    }

    #[test]
    fn test_names_round_trip() {
        for prim in Prim::ALL {
            assert_eq!(Prim::from_name(prim.name()), Some(prim));
        }
        assert_eq!(Prim::from_name("notnil"), None);
    }

    #[test]
    fn test_arith_folding() {
        assert_eq!(fold(Prim::Add, &[Flow::int(2), Flow::int(3)]), Flow::int(5));
        assert_eq!(fold(Prim::Mul, &[Flow::int(0), Flow::INT64]), Flow::int(0));
        assert_eq!(fold(Prim::Mul, &[Flow::int(3), Flow::INT64]), Flow::INT64);
        assert_eq!(fold(Prim::Dec, &[Flow::int(1)]), Flow::int(0));
        assert_eq!(fold(Prim::Add, &[Flow::Any, Flow::int(3)]), Flow::Any);
        assert_eq!(fold(Prim::Dec, &[Flow::int(i64::MIN)]), Flow::int(i64::MAX));
    }

    #[test]
    fn test_predicates() {
        assert_eq!(fold(Prim::Eq, &[Flow::int(4), Flow::int(4)]), Flow::TRUE);
        assert_eq!(fold(Prim::Eq, &[Flow::int(4), Flow::int(5)]), Flow::BOOL);
        assert_eq!(fold(Prim::Eq0, &[Flow::Nil]), Flow::TRUE);
        assert_eq!(fold(Prim::Eq0, &[Flow::int(7)]), Flow::FALSE);
        assert_eq!(fold(Prim::Eq0, &[Flow::INT64]), Flow::BOOL);
        assert_eq!(fold(Prim::IsEmpty, &[Flow::str("")]), Flow::TRUE);
        assert_eq!(fold(Prim::IsEmpty, &[Flow::str("a")]), Flow::FALSE);
    }

    #[test]
    fn test_str_and_factor() {
        assert_eq!(fold(Prim::Str, &[Flow::int(12)]), Flow::str("12"));
        assert_eq!(fold(Prim::Str, &[Flow::INT64]), Flow::STR);
        assert_eq!(fold(Prim::Factor, &[Flow::flt(1.5)]), Flow::FLT64);
    }

    #[test]
    fn test_if_selects_live_branch() {
        let (t, f) = (Flow::str("a"), Flow::int(7));
        assert_eq!(fold(Prim::If, &[Flow::Nil, t.clone(), f.clone()]), f);
        assert_eq!(fold(Prim::If, &[Flow::int(1), t.clone(), f.clone()]), t);
        assert_eq!(fold(Prim::If, &[Flow::Any, t.clone(), f.clone()]), Flow::Any);
        assert_eq!(fold(Prim::If, &[Flow::INT64, t.clone(), f.clone()]), t.meet(&f));
    }

    #[test]
    fn test_not_nil() {
        assert_eq!(fold(Prim::NotNil, &[Flow::Nil]), Flow::Any);
        assert_eq!(fold(Prim::NotNil, &[Flow::SCALAR]), Flow::NSCALAR);
        let nstr = Flow::Str { con: None, nil: true };
        assert_eq!(fold(Prim::NotNil, &[nstr]), Flow::STR);
    }

    #[test]
    fn test_pair_builds_tuple() {
        let flow = fold(Prim::Pair, &[Flow::int(3), Flow::str("x")]);
        assert_eq!(flow.to_string(), "*[1](3, \"x\")");
    }

    #[test]
    fn test_skeletons_are_fresh() {
        let mut forest = Forest::new();
        let (f1, _) = Prim::Add.skeleton(&mut forest, FunId(1), PAIR, TRIPLE);
        let (f2, _) = Prim::Add.skeleton(&mut forest, FunId(2), PAIR, TRIPLE);
        assert_ne!(f1, f2);
        assert_eq!(forest.pretty(f1), "{ int64 int64 -> int64 }");
        let (eq, args) = Prim::Eq.skeleton(&mut forest, FunId(3), PAIR, TRIPLE);
        assert_eq!(args[0], args[1]);
        assert_eq!(forest.pretty(eq), "{ A A -> int1 }");
        let (pair, _) = Prim::Pair.skeleton(&mut forest, FunId(4), PAIR, TRIPLE);
        assert_eq!(forest.pretty(pair), "{ A B -> (A, B) }");
    }
}
