//! Flow lattice for global constant propagation
//!
//! Implements the value lattice the GCP half of the solver runs over:
//! - `Any` (⊤) = no value observed yet; every node starts here
//! - Constants sit just below `Any`, their classes (int64, flt64, str,
//!   function sets, records) below those
//! - `Scalar` (⊥) = any runtime value at all
//!
//! Values only ever fall during a run: `meet` is the step function and
//! `isa` the ordering (`a.isa(b)` when `b` is at or below `a`).

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

/// Records from one allocation site never nest deeper than this, whatever
/// the configured cutoff.
pub const MAX_REC_DEPTH: usize = 8;

/// Identity of a lambda or primitive occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FunId(pub u32);

impl FunId {
    /// A call target outside the program.
    pub const UNKNOWN: FunId = FunId(0);
}

/// Identity of a record allocation site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AliasId(pub u32);

pub type FidSet = BTreeSet<FunId>;
pub type AliasSet = BTreeSet<AliasId>;
pub type FieldFlows = Rc<BTreeMap<String, Flow>>;

/// Integer sub-lattice: a constant, the booleans `{0, 1}`, or any int64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntFlow {
    Con(i64),
    Bool,
    I64,
}

impl IntFlow {
    fn contains_zero(self) -> bool {
        !matches!(self, IntFlow::Con(c) if c != 0)
    }

    fn meet(self, other: IntFlow) -> IntFlow {
        use IntFlow::*;
        match (self, other) {
            (Con(a), Con(b)) if a == b => Con(a),
            (Con(a), Con(b)) if is_bit(a) && is_bit(b) => Bool,
            (Con(a), Bool) | (Bool, Con(a)) if is_bit(a) => Bool,
            (Bool, Bool) => Bool,
            _ => I64,
        }
    }

    /// Approximate intersection; `None` when nothing is left.
    fn join(self, other: IntFlow) -> Option<IntFlow> {
        use IntFlow::*;
        match (self, other) {
            (I64, x) | (x, I64) => Some(x),
            (Bool, Bool) => Some(Bool),
            (Con(a), Bool) | (Bool, Con(a)) => is_bit(a).then_some(Con(a)),
            (Con(a), Con(b)) => (a == b).then_some(Con(a)),
        }
    }
}

fn is_bit(c: i64) -> bool {
    c == 0 || c == 1
}

/// Float sub-lattice; constants are stored by bit pattern so flows stay
/// `Eq + Hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FltFlow {
    Con(u64),
    F64,
}

impl FltFlow {
    pub fn value(self) -> Option<f64> {
        match self {
            FltFlow::Con(bits) => Some(f64::from_bits(bits)),
            FltFlow::F64 => None,
        }
    }

    fn zero() -> FltFlow {
        FltFlow::Con(0f64.to_bits())
    }

    fn meet(self, other: FltFlow) -> FltFlow {
        match (self, other) {
            (FltFlow::Con(a), FltFlow::Con(b)) if a == b => FltFlow::Con(a),
            _ => FltFlow::F64,
        }
    }

    fn join(self, other: FltFlow) -> Option<FltFlow> {
        match (self, other) {
            (FltFlow::F64, x) | (x, FltFlow::F64) => Some(x),
            (FltFlow::Con(a), FltFlow::Con(b)) => (a == b).then_some(FltFlow::Con(a)),
        }
    }
}

/// A flow value. Immutable; equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flow {
    /// Top: not yet reached.
    Any,
    Nil,
    Int(IntFlow),
    Flt(FltFlow),
    Str {
        con: Option<Rc<str>>,
        nil: bool,
    },
    Fun {
        fids: FidSet,
        nil: bool,
    },
    Rec {
        aliases: AliasSet,
        /// `None` when the layout is unknown.
        fields: Option<FieldFlows>,
        nil: bool,
    },
    /// Bottom: any value, possibly nil.
    Scalar {
        nil: bool,
    },
}

impl Flow {
    pub const SCALAR: Flow = Flow::Scalar { nil: true };
    pub const NSCALAR: Flow = Flow::Scalar { nil: false };
    pub const INT64: Flow = Flow::Int(IntFlow::I64);
    pub const BOOL: Flow = Flow::Int(IntFlow::Bool);
    pub const TRUE: Flow = Flow::Int(IntFlow::Con(1));
    pub const FALSE: Flow = Flow::Int(IntFlow::Con(0));
    pub const FLT64: Flow = Flow::Flt(FltFlow::F64);
    pub const STR: Flow = Flow::Str {
        con: None,
        nil: false,
    };

    pub fn int(c: i64) -> Flow {
        Flow::Int(IntFlow::Con(c))
    }

    pub fn flt(f: f64) -> Flow {
        Flow::Flt(FltFlow::Con(f.to_bits()))
    }

    pub fn str(s: &str) -> Flow {
        Flow::Str {
            con: Some(Rc::from(s)),
            nil: false,
        }
    }

    pub fn fun(fid: FunId) -> Flow {
        Flow::Fun {
            fids: FidSet::from([fid]),
            nil: false,
        }
    }

    pub fn rec(alias: AliasId, fields: BTreeMap<String, Flow>) -> Flow {
        Flow::Rec {
            aliases: AliasSet::from([alias]),
            fields: Some(Rc::new(fields)),
            nil: false,
        }
    }

    /// Greatest lower bound.
    pub fn meet(&self, other: &Flow) -> Flow {
        use Flow::*;
        match (self, other) {
            (Any, x) | (x, Any) => x.clone(),
            (Scalar { nil }, x) | (x, Scalar { nil }) => Scalar {
                nil: *nil || x.scalar_nil(),
            },
            (Nil, Nil) => Nil,
            (Nil, Int(i)) | (Int(i), Nil) => Int(i.meet(IntFlow::Con(0))),
            (Nil, Flt(f)) | (Flt(f), Nil) => Flt(f.meet(FltFlow::zero())),
            (Nil, x) | (x, Nil) => x.with_nil(true),
            (Int(a), Int(b)) => Int(a.meet(*b)),
            (Flt(a), Flt(b)) => Flt(a.meet(*b)),
            (Str { con: c1, nil: n1 }, Str { con: c2, nil: n2 }) => Str {
                con: if c1 == c2 { c1.clone() } else { None },
                nil: *n1 || *n2,
            },
            (Fun { fids: f1, nil: n1 }, Fun { fids: f2, nil: n2 }) => Fun {
                fids: f1.union(f2).copied().collect(),
                nil: *n1 || *n2,
            },
            (
                Rec {
                    aliases: a1,
                    fields: f1,
                    nil: n1,
                },
                Rec {
                    aliases: a2,
                    fields: f2,
                    nil: n2,
                },
            ) => Rec {
                aliases: a1.union(a2).copied().collect(),
                fields: meet_fields(f1, f2),
                nil: *n1 || *n2,
            },
            (a, b) => Scalar {
                nil: a.scalar_nil() || b.scalar_nil(),
            },
        }
    }

    /// Approximate intersection of the values both sides describe.
    ///
    /// This is the least upper bound wherever the lattice has one; where
    /// the exact intersection is not representable (non-zero ints) it
    /// rounds down to the nearest element that still covers it.
    pub fn join(&self, other: &Flow) -> Flow {
        use Flow::*;
        match (self, other) {
            (Any, _) | (_, Any) => return Any,
            (Scalar { nil: true }, x) | (x, Scalar { nil: true }) => return x.clone(),
            (Scalar { nil: false }, x) | (x, Scalar { nil: false }) => return x.not_nil(),
            _ => {}
        }
        if self.isa(other) {
            return self.clone();
        }
        if other.isa(self) {
            return other.clone();
        }
        match (self, other) {
            (Int(a), Int(b)) => a.join(*b).map_or(Any, Int),
            (Flt(a), Flt(b)) => a.join(*b).map_or(Any, Flt),
            (Str { con: c1, nil: n1 }, Str { con: c2, nil: n2 }) => match (c1, c2) {
                (Some(a), Some(b)) if a != b => Any,
                _ => Str {
                    con: c1.clone().or_else(|| c2.clone()),
                    nil: *n1 && *n2,
                },
            },
            (Fun { fids: f1, nil: n1 }, Fun { fids: f2, nil: n2 }) => {
                let fids: FidSet = f1.intersection(f2).copied().collect();
                if fids.is_empty() {
                    Any
                } else {
                    Fun {
                        fids,
                        nil: *n1 && *n2,
                    }
                }
            }
            (
                Rec {
                    aliases: a1,
                    fields: f1,
                    nil: n1,
                },
                Rec {
                    aliases: a2,
                    fields: f2,
                    nil: n2,
                },
            ) => {
                let aliases: AliasSet = a1.intersection(a2).copied().collect();
                if aliases.is_empty() {
                    return Any;
                }
                Rec {
                    aliases,
                    fields: join_fields(f1, f2),
                    nil: *n1 && *n2,
                }
            }
            _ => Any,
        }
    }

    /// `true` when `other` is at or below `self`.
    pub fn isa(&self, other: &Flow) -> bool {
        self.meet(other) == *other
    }

    pub fn above_center(&self) -> bool {
        matches!(self, Flow::Any)
    }

    /// Whether this value can be nil (or zero, which tests the same way).
    pub fn may_nil(&self) -> bool {
        match self {
            Flow::Any => false,
            Flow::Nil => true,
            Flow::Int(i) => i.contains_zero(),
            Flow::Flt(FltFlow::Con(bits)) => f64::from_bits(*bits) == 0.0,
            Flow::Flt(FltFlow::F64) => true,
            Flow::Str { nil, .. }
            | Flow::Fun { nil, .. }
            | Flow::Rec { nil, .. }
            | Flow::Scalar { nil } => *nil,
        }
    }

    /// Statically false as a predicate.
    pub fn is_false(&self) -> bool {
        matches!(self, Flow::Nil | Flow::Int(IntFlow::Con(0)))
    }

    /// Nil flag carried into a `Scalar` produced by a cross-class meet.
    /// Numbers count as nilable since their zero tests like nil.
    fn scalar_nil(&self) -> bool {
        match self {
            Flow::Any => false,
            Flow::Nil | Flow::Int(_) | Flow::Flt(_) => true,
            Flow::Str { nil, .. }
            | Flow::Fun { nil, .. }
            | Flow::Rec { nil, .. }
            | Flow::Scalar { nil } => *nil,
        }
    }

    pub fn meet_nil(&self) -> Flow {
        self.meet(&Flow::Nil)
    }

    /// The non-nil part of this value.
    pub fn not_nil(&self) -> Flow {
        match self {
            Flow::Nil => Flow::Any,
            Flow::Scalar { .. } => Flow::NSCALAR,
            other => other.with_nil(false),
        }
    }

    fn with_nil(&self, flag: bool) -> Flow {
        let mut out = self.clone();
        match &mut out {
            Flow::Str { nil, .. } | Flow::Fun { nil, .. } | Flow::Rec { nil, .. } => *nil = flag,
            _ => {}
        }
        out
    }

    /// Drops constants to their class.
    pub fn widen(&self) -> Flow {
        match self {
            Flow::Int(_) => Flow::INT64,
            Flow::Flt(_) => Flow::FLT64,
            Flow::Str { nil, .. } => Flow::Str {
                con: None,
                nil: *nil,
            },
            other => other.clone(),
        }
    }

    pub fn is_con(&self) -> bool {
        match self {
            Flow::Nil | Flow::Int(IntFlow::Con(_)) | Flow::Flt(FltFlow::Con(_)) => true,
            Flow::Str { con, nil } => con.is_some() && !nil,
            _ => false,
        }
    }

    /// `Any` stays `Any`; everything else falls to `Scalar`.
    pub fn oob(&self) -> Flow {
        if self.above_center() {
            Flow::Any
        } else {
            Flow::SCALAR
        }
    }

    /// Two base flows may share one type class only when they are of the
    /// same kind.
    pub fn same_class(&self, other: &Flow) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn fids(&self) -> Option<&FidSet> {
        match self {
            Flow::Fun { fids, .. } => Some(fids),
            _ => None,
        }
    }

    /// Cuts record nesting so repeated allocation sites bottom out.
    ///
    /// Records from `alias` nest at most `cutoff` deep below the outermost
    /// one; deeper copies keep their aliases but lose their field layout.
    pub fn approx(&self, cutoff: usize, alias: AliasId) -> Flow {
        self.approx_at(cutoff, alias, 0, 0)
    }

    fn approx_at(&self, cutoff: usize, alias: AliasId, seen: usize, depth: usize) -> Flow {
        let Flow::Rec {
            aliases,
            fields: Some(fields),
            nil,
        } = self
        else {
            return self.clone();
        };
        let seen = seen + usize::from(aliases.contains(&alias));
        if seen > cutoff + 1 || depth >= MAX_REC_DEPTH {
            return Flow::Rec {
                aliases: aliases.clone(),
                fields: None,
                nil: *nil,
            };
        }
        let fields = fields
            .iter()
            .map(|(label, f)| (label.clone(), f.approx_at(cutoff, alias, seen, depth + 1)))
            .collect();
        Flow::Rec {
            aliases: aliases.clone(),
            fields: Some(Rc::new(fields)),
            nil: *nil,
        }
    }
}

fn meet_fields(a: &Option<FieldFlows>, b: &Option<FieldFlows>) -> Option<FieldFlows> {
    let (a, b) = (a.as_ref()?, b.as_ref()?);
    if Rc::ptr_eq(a, b) {
        return Some(a.clone());
    }
    let fields = a
        .iter()
        .filter_map(|(label, fa)| b.get(label).map(|fb| (label.clone(), fa.meet(fb))))
        .collect();
    Some(Rc::new(fields))
}

fn join_fields(a: &Option<FieldFlows>, b: &Option<FieldFlows>) -> Option<FieldFlows> {
    match (a, b) {
        (None, x) | (x, None) => x.clone(),
        (Some(a), Some(b)) => {
            let mut fields: BTreeMap<String, Flow> = (**a).clone();
            for (label, fb) in b.iter() {
                let joined = match fields.get(label) {
                    Some(fa) => fa.join(fb),
                    None => fb.clone(),
                };
                fields.insert(label.clone(), joined);
            }
            Some(Rc::new(fields))
        }
    }
}

fn write_set<T: Copy>(f: &mut fmt::Formatter<'_>, set: &BTreeSet<T>, id: impl Fn(T) -> u32) -> fmt::Result {
    write!(f, "[")?;
    for (i, x) in set.iter().enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        match id(*x) {
            0 => write!(f, "ext")?,
            n => write!(f, "{n}")?,
        }
    }
    write!(f, "]")
}

fn nil_mark(f: &mut fmt::Formatter<'_>, nil: bool) -> fmt::Result {
    if nil {
        write!(f, "?")
    } else {
        Ok(())
    }
}

/// Labels `"0"`, `"1"`, ... print as a tuple.
pub(crate) fn is_tuple<'a>(mut labels: impl Iterator<Item = &'a String>) -> bool {
    labels.next().is_some_and(|l| l == "0")
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Any => write!(f, "~Scalar"),
            Flow::Scalar { nil: true } => write!(f, "Scalar"),
            Flow::Scalar { nil: false } => write!(f, "nScalar"),
            Flow::Nil => write!(f, "nil"),
            Flow::Int(IntFlow::Con(c)) => write!(f, "{c}"),
            Flow::Int(IntFlow::Bool) => write!(f, "int1"),
            Flow::Int(IntFlow::I64) => write!(f, "int64"),
            Flow::Flt(FltFlow::Con(bits)) => write!(f, "{:?}", f64::from_bits(*bits)),
            Flow::Flt(FltFlow::F64) => write!(f, "flt64"),
            Flow::Str { con, nil } => {
                match con {
                    Some(s) => write!(f, "{s:?}")?,
                    None => write!(f, "str")?,
                }
                nil_mark(f, *nil)
            }
            Flow::Fun { fids, nil } => {
                write!(f, "fn")?;
                write_set(f, fids, |x| x.0)?;
                nil_mark(f, *nil)
            }
            Flow::Rec {
                aliases,
                fields,
                nil,
            } => {
                write!(f, "*")?;
                write_set(f, aliases, |x| x.0)?;
                match fields {
                    None => write!(f, "@{{...}}")?,
                    Some(fields) if is_tuple(fields.keys()) => {
                        write!(f, "(")?;
                        for (i, v) in fields.values().enumerate() {
                            if i > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{v}")?;
                        }
                        write!(f, ")")?;
                    }
                    Some(fields) => {
                        write!(f, "@{{")?;
                        for (i, (label, v)) in fields.iter().enumerate() {
                            if i > 0 {
                                write!(f, "; ")?;
                            }
                            write!(f, "{label} = {v}")?;
                        }
                        write!(f, "}}")?;
                    }
                }
                nil_mark(f, *nil)
            }
        }
    }
}

impl Serialize for Flow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_meet_any_is_identity() {
        assert_eq!(Flow::Any.meet(&Flow::int(3)), Flow::int(3));
        assert_eq!(Flow::STR.meet(&Flow::Any), Flow::STR);
    }

    #[test]
    fn test_meet_int_constants() {
        assert_eq!(Flow::int(3).meet(&Flow::int(3)), Flow::int(3));
        assert_eq!(Flow::int(0).meet(&Flow::int(1)), Flow::BOOL);
        assert_eq!(Flow::int(2).meet(&Flow::int(3)), Flow::INT64);
        assert_eq!(Flow::BOOL.meet(&Flow::int(5)), Flow::INT64);
    }

    #[test]
    fn test_meet_nil_with_int_is_zero() {
        assert_eq!(Flow::Nil.meet(&Flow::int(0)), Flow::int(0));
        assert_eq!(Flow::Nil.meet(&Flow::int(1)), Flow::BOOL);
        assert_eq!(Flow::Nil.meet(&Flow::STR), Flow::Str { con: None, nil: true });
    }

    #[test]
    fn test_meet_cross_class_drops_to_scalar() {
        assert_eq!(Flow::int(3).meet(&Flow::STR), Flow::SCALAR);
        assert_eq!(Flow::STR.meet(&Flow::fun(FunId(2))), Flow::NSCALAR);
    }

    #[test]
    fn test_meet_fun_unions_fids() {
        let m = Flow::fun(FunId(1)).meet(&Flow::fun(FunId(2)));
        assert_eq!(m.fids().map(|f| f.len()), Some(2));
    }

    #[test]
    fn test_meet_rec_intersects_fields() {
        let a = Flow::rec(
            AliasId(1),
            BTreeMap::from([("x".to_string(), Flow::int(1)), ("y".to_string(), Flow::int(2))]),
        );
        let b = Flow::rec(AliasId(2), BTreeMap::from([("x".to_string(), Flow::int(1))]));
        let Flow::Rec { aliases, fields, .. } = a.meet(&b) else {
            panic!("expected a record");
        };
        assert_eq!(aliases.len(), 2);
        let fields = fields.expect("known layout");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("x"), Some(&Flow::int(1)));
    }

    #[test]
    fn test_join_recovers_constant() {
        assert_eq!(Flow::INT64.join(&Flow::int(3)), Flow::int(3));
        assert_eq!(Flow::int(3).join(&Flow::int(4)), Flow::Any);
        assert_eq!(Flow::SCALAR.join(&Flow::str("a")), Flow::str("a"));
        assert_eq!(Flow::int(3).join(&Flow::STR), Flow::Any);
    }

    #[test]
    fn test_not_nil() {
        assert_eq!(Flow::Nil.not_nil(), Flow::Any);
        assert_eq!(Flow::SCALAR.not_nil(), Flow::NSCALAR);
        assert_eq!(Flow::Str { con: None, nil: true }.not_nil(), Flow::STR);
        assert_eq!(Flow::INT64.not_nil(), Flow::INT64);
    }

    #[test]
    fn test_may_nil_and_is_false() {
        assert!(Flow::Nil.may_nil());
        assert!(Flow::INT64.may_nil());
        assert!(!Flow::int(7).may_nil());
        assert!(!Flow::STR.may_nil());
        assert!(Flow::Nil.is_false());
        assert!(Flow::int(0).is_false());
        assert!(!Flow::BOOL.is_false());
    }

    #[test]
    fn test_widen() {
        assert_eq!(Flow::int(3).widen(), Flow::INT64);
        assert_eq!(Flow::flt(1.5).widen(), Flow::FLT64);
        assert_eq!(Flow::str("abc").widen(), Flow::STR);
    }

    #[test]
    fn test_approx_cuts_nested_alias() {
        let alias = AliasId(4);
        let inner = Flow::rec(alias, BTreeMap::from([("n".to_string(), Flow::Nil)]));
        let mid = Flow::rec(alias, BTreeMap::from([("n".to_string(), inner)]));
        let outer = Flow::rec(alias, BTreeMap::from([("n".to_string(), mid)]));
        let cut = outer.approx(1, alias);
        let Flow::Rec { fields: Some(f1), .. } = &cut else {
            panic!("outer keeps its layout");
        };
        let Flow::Rec { fields: Some(f2), .. } = &f1["n"] else {
            panic!("first nesting keeps its layout");
        };
        assert!(matches!(&f2["n"], Flow::Rec { fields: None, .. }));
        assert!(outer.isa(&cut));
    }

    #[test]
    fn test_display() {
        assert_eq!(Flow::int(3).to_string(), "3");
        assert_eq!(Flow::str("abc").to_string(), "\"abc\"");
        assert_eq!(Flow::flt(1.5).to_string(), "1.5");
        assert_eq!(Flow::Any.to_string(), "~Scalar");
        let pair = Flow::rec(
            AliasId(1),
            BTreeMap::from([("0".to_string(), Flow::int(3)), ("1".to_string(), Flow::STR)]),
        );
        assert_eq!(pair.to_string(), "*[1](3, str)");
    }

    // ========================================================================
    // Lattice laws
    // ========================================================================

    fn arb_flow() -> impl Strategy<Value = Flow> {
        let fids = prop::collection::btree_set((1u32..4).prop_map(FunId), 1..3);
        let aliases = prop::collection::btree_set((1u32..3).prop_map(AliasId), 1..2);
        let fields = prop::option::of(prop::collection::btree_map(
            prop::sample::select(vec!["x".to_string(), "y".to_string()]),
            (-1i64..3).prop_map(Flow::int),
            0..3,
        ));
        prop_oneof![
            Just(Flow::Any),
            Just(Flow::Nil),
            (-1i64..3).prop_map(Flow::int),
            Just(Flow::BOOL),
            Just(Flow::INT64),
            prop::sample::select(vec![0.0, 1.5]).prop_map(Flow::flt),
            Just(Flow::FLT64),
            (prop::option::of(prop::sample::select(vec!["a", "b"])), any::<bool>()).prop_map(
                |(con, nil)| Flow::Str {
                    con: con.map(Rc::from),
                    nil
                }
            ),
            (fids, any::<bool>()).prop_map(|(fids, nil)| Flow::Fun { fids, nil }),
            (aliases, fields, any::<bool>()).prop_map(|(aliases, fields, nil)| Flow::Rec {
                aliases,
                fields: fields.map(Rc::new),
                nil
            }),
            any::<bool>().prop_map(|nil| Flow::Scalar { nil }),
        ]
    }

    proptest! {
        #[test]
        fn prop_meet_commutative(a in arb_flow(), b in arb_flow()) {
            prop_assert_eq!(a.meet(&b), b.meet(&a));
        }

        #[test]
        fn prop_meet_associative(a in arb_flow(), b in arb_flow(), c in arb_flow()) {
            prop_assert_eq!(a.meet(&b).meet(&c), a.meet(&b.meet(&c)));
        }

        #[test]
        fn prop_meet_idempotent(a in arb_flow()) {
            prop_assert_eq!(a.meet(&a), a);
        }

        #[test]
        fn prop_meet_falls(a in arb_flow(), b in arb_flow()) {
            let m = a.meet(&b);
            prop_assert!(a.isa(&m));
            prop_assert!(b.isa(&m));
        }

        #[test]
        fn prop_scalar_is_bottom(a in arb_flow()) {
            prop_assert!(a.isa(&Flow::SCALAR));
            prop_assert!(Flow::Any.isa(&a));
        }

        #[test]
        fn prop_join_commutative(a in arb_flow(), b in arb_flow()) {
            prop_assert_eq!(a.join(&b), b.join(&a));
        }
    }
}
