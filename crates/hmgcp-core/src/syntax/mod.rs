//! AST node model
//!
//! A prepared program is an arena of [`Node`]s. Each node owns exactly
//! two mutable slots, an HM type handle and a flow value, and every
//! variant provides:
//! - `hm`: one refinement step against its children's terms
//! - `val`: a flow recompute from its children's current flows
//! - `add_hm_work` / `add_val_work`: the neighbours to revisit

mod hm;
mod lift;
mod prep;
pub mod prim;
mod value;

use crate::config::SolverConfig;
use crate::flow::{AliasId, Flow, FunId};
use crate::nongen::NonGen;
use crate::term::{Forest, TermId};
use prim::Prim;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Index of a node in its [`Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-function state shared by lambdas and primitive occurrences.
#[derive(Debug, Clone)]
pub struct FuncInfo {
    pub fid: FunId,
    /// One term per formal.
    pub targs: Vec<TermId>,
    /// Formal flows, met from the actuals of every discovered call site.
    pub types: Vec<Flow>,
}

impl FuncInfo {
    fn new(fid: FunId, targs: Vec<TermId>) -> Self {
        let types = vec![Flow::Any; targs.len()];
        Self { fid, targs, types }
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Con(Flow),
    Ident {
        name: String,
        /// The lambda or let binding this name.
        def: NodeId,
        /// Parameter position when bound by a lambda.
        idx: Option<usize>,
        idt: TermId,
    },
    Lambda {
        params: Vec<String>,
        body: NodeId,
        func: FuncInfo,
        widen: bool,
    },
    Let {
        name: String,
        def: NodeId,
        body: NodeId,
        targ: TermId,
    },
    Apply {
        fun: NodeId,
        args: Vec<NodeId>,
    },
    /// Wraps the whole program.
    Root {
        body: NodeId,
    },
    Struct {
        alias: AliasId,
        labels: Vec<String>,
        fields: Vec<NodeId>,
    },
    Field {
        label: String,
        rec: NodeId,
    },
    Prim {
        prim: Prim,
        func: FuncInfo,
    },
}

impl NodeKind {
    pub fn func(&self) -> Option<&FuncInfo> {
        match self {
            NodeKind::Lambda { func, .. } | NodeKind::Prim { func, .. } => Some(func),
            _ => None,
        }
    }

    fn func_mut(&mut self) -> Option<&mut FuncInfo> {
        match self {
            NodeKind::Lambda { func, .. } | NodeKind::Prim { func, .. } => Some(func),
            _ => None,
        }
    }

    /// Child nodes in evaluation order.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Lambda { body, .. } | NodeKind::Root { body } => vec![*body],
            NodeKind::Let { def, body, .. } => vec![*def, *body],
            NodeKind::Apply { fun, args } => std::iter::once(*fun).chain(args.iter().copied()).collect(),
            NodeKind::Struct { fields, .. } => fields.clone(),
            NodeKind::Field { rec, .. } => vec![*rec],
            NodeKind::Con(_) | NodeKind::Ident { .. } | NodeKind::Prim { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    /// Pinned type variables in scope at this node.
    pub(crate) nongen: NonGen,
    pub(crate) hmt: TermId,
    pub(crate) flow: Flow,
}

impl Node {
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }
}

/// A prepared program: the node arena plus the term forest its nodes
/// point into.
#[derive(Debug)]
pub struct Program {
    pub(crate) nodes: Vec<Node>,
    pub(crate) terms: Forest,
    pub(crate) root: NodeId,
    pub(crate) funs: BTreeMap<FunId, NodeId>,
    pub(crate) config: SolverConfig,
    pub(crate) pair_alias: AliasId,
    pub(crate) triple_alias: AliasId,
    next_alias: u32,
    next_fid: u32,
}

impl Program {
    fn new(config: SolverConfig) -> Self {
        Self {
            nodes: Vec::new(),
            terms: Forest::new(),
            root: NodeId(0),
            funs: BTreeMap::new(),
            config,
            pair_alias: AliasId(1),
            triple_alias: AliasId(2),
            next_alias: 3,
            next_fid: 1,
        }
    }

    fn new_fid(&mut self) -> FunId {
        let fid = FunId(self.next_fid);
        self.next_fid += 1;
        fid
    }

    fn new_alias(&mut self) -> AliasId {
        let alias = AliasId(self.next_alias);
        self.next_alias += 1;
        alias
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeId(i as u32), node))
    }

    pub fn forest(&self) -> &Forest {
        &self.terms
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// The lambda or primitive behind a function id.
    pub fn fun_node(&self, fid: FunId) -> Option<NodeId> {
        self.funs.get(&fid).copied()
    }

    pub(crate) fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub(crate) fn flow(&self, id: NodeId) -> &Flow {
        &self.nodes[id.index()].flow
    }

    pub(crate) fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    /// Representative of the node's term, cached back into the node.
    pub(crate) fn find(&mut self, id: NodeId) -> TermId {
        let node = &mut self.nodes[id.index()];
        let t = self.terms.find(node.hmt);
        node.hmt = t;
        t
    }

    /// Current representatives of a function node's formals.
    pub(crate) fn targs(&mut self, id: NodeId) -> Vec<TermId> {
        let Some(func) = self.nodes[id.index()].kind.func_mut() else {
            return Vec::new();
        };
        for targ in func.targs.iter_mut() {
            *targ = self.terms.find(*targ);
        }
        func.targs.clone()
    }

    /// Pinned variables at a node, resolved to representatives.
    pub(crate) fn nongen(&mut self, id: NodeId) -> Vec<TermId> {
        self.nodes[id.index()].nongen.resolve(&mut self.terms)
    }

    pub fn node_type(&self, id: NodeId) -> String {
        self.terms.pretty(self.nodes[id.index()].hmt)
    }

    pub fn node_flow(&self, id: NodeId) -> &Flow {
        self.flow(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::worklist::Worklist;

    fn build(src: &str) -> Program {
        let expr = parse(src).unwrap();
        let mut work = Worklist::new();
        Program::build(&expr, SolverConfig::default(), &mut work).unwrap()
    }

    #[test]
    fn test_children_order() {
        let prog = build("(pair 1 2)");
        let NodeKind::Root { body } = prog.kind(prog.root()) else {
            panic!("root is not a Root");
        };
        let children = prog.kind(*body).children();
        assert_eq!(children.len(), 3);
        assert!(matches!(prog.kind(children[0]), NodeKind::Prim { prim: Prim::Pair, .. }));
    }

    #[test]
    fn test_fun_nodes_registered() {
        let prog = build("f = { x -> x }; (f (dec 3))");
        let fids: Vec<FunId> = prog.funs.keys().copied().collect();
        assert_eq!(fids.len(), 2);
        for fid in fids {
            let node = prog.fun_node(fid).unwrap();
            assert_eq!(prog.kind(node).func().map(|f| f.fid), Some(fid));
        }
    }
}
