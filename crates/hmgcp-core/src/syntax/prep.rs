//! Tree preparation: lowers an [`Expr`] into the node arena
//!
//! One pre-order walk assigns every node its initial term, resolves
//! identifiers to their binders, snapshots the non-generative scope and
//! seeds the worklist with every node.

use super::prim::Prim;
use super::{FuncInfo, Node, NodeId, NodeKind, Program};
use crate::ast::Expr;
use crate::config::SolverConfig;
use crate::error::{InferError, Result};
use crate::flow::{AliasSet, FidSet, Flow};
use crate::nongen::NonGen;
use crate::term::{Slot, TermId};
use crate::worklist::Worklist;
use std::collections::BTreeMap;
use tracing::debug;

/// A binder visible to identifiers below it.
struct Scope {
    def: NodeId,
    names: Vec<String>,
    targs: Vec<TermId>,
    lambda: bool,
}

impl Program {
    /// Prepares `expr` for solving. Every node lands on `work`.
    pub fn build(expr: &Expr, config: SolverConfig, work: &mut Worklist) -> Result<Program> {
        let mut prog = Program::new(config);
        let leaf = prog.terms.leaf();
        let root = prog.alloc(None, &NonGen::new(), leaf, work);
        let mut scopes = Vec::new();
        let body = prog.prep(expr, root, &NonGen::new(), &mut scopes, work)?;
        prog.set_kind(root, NodeKind::Root { body });
        prog.terms.push_update(leaf, root);
        prog.root = root;
        debug!(nodes = prog.nodes.len(), terms = prog.terms.len(), "prepared tree");
        Ok(prog)
    }

    /// Allocates a node whose kind is filled in once its children are
    /// lowered.
    fn alloc(&mut self, parent: Option<NodeId>, nongen: &NonGen, hmt: TermId, work: &mut Worklist) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind: NodeKind::Con(Flow::Any),
            parent,
            nongen: nongen.clone(),
            hmt,
            flow: Flow::Any,
        });
        work.push(id);
        id
    }

    fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes[id.index()].kind = kind;
    }

    fn prep(
        &mut self,
        expr: &Expr,
        parent: NodeId,
        nongen: &NonGen,
        scopes: &mut Vec<Scope>,
        work: &mut Worklist,
    ) -> Result<NodeId> {
        let parent_id = Some(parent);
        match expr {
            Expr::Nil => {
                let leaf = self.terms.leaf();
                let hmt = self.terms.nil(leaf);
                Ok(self.con(parent, nongen, hmt, Flow::Nil, work))
            }
            Expr::Int(i) => Ok(self.base_con(parent, nongen, Flow::int(*i), work)),
            Expr::Flt(f) => Ok(self.base_con(parent, nongen, Flow::flt(*f), work)),
            Expr::Str(s) => Ok(self.base_con(parent, nongen, Flow::str(s), work)),
            Expr::Prim(prim) => {
                let fid = self.new_fid();
                let (fun, targs) = prim.skeleton(&mut self.terms, fid, self.pair_alias, self.triple_alias);
                let id = self.alloc(parent_id, nongen, fun, work);
                for &targ in &targs {
                    self.terms.push_update(targ, id);
                }
                if *prim == Prim::NotNil {
                    if let Some(ret) = self.terms.arg(fun, &Slot::Ret) {
                        self.terms.push_update(ret, id);
                    }
                }
                self.funs.insert(fid, id);
                self.set_kind(
                    id,
                    NodeKind::Prim {
                        prim: *prim,
                        func: FuncInfo::new(fid, targs),
                    },
                );
                Ok(id)
            }
            Expr::Ident(name) => {
                let leaf = self.terms.leaf();
                let id = self.alloc(parent_id, nongen, leaf, work);
                for scope in scopes.iter() {
                    for (n, &targ) in scope.names.iter().zip(&scope.targs) {
                        if n == name {
                            self.terms.push_update(targ, id);
                        }
                    }
                }
                let (def, idx, idt) = scopes
                    .iter()
                    .rev()
                    .find_map(|scope| {
                        let i = scope.names.iter().position(|n| n == name)?;
                        Some((scope.def, scope.lambda.then_some(i), scope.targs[i]))
                    })
                    .ok_or_else(|| InferError::Undefined { name: name.clone() })?;
                self.set_kind(
                    id,
                    NodeKind::Ident {
                        name: name.clone(),
                        def,
                        idx,
                        idt,
                    },
                );
                Ok(id)
            }
            Expr::Lambda { params, body, widen } => {
                let fid = self.new_fid();
                let targs: Vec<TermId> = params.iter().map(|_| self.terms.leaf()).collect();
                let leaf = self.terms.leaf();
                let id = self.alloc(parent_id, nongen, leaf, work);
                self.funs.insert(fid, id);
                let inner = targs.iter().fold(nongen.clone(), |vs, &targ| vs.push(targ));
                scopes.push(Scope {
                    def: id,
                    names: params.clone(),
                    targs: targs.clone(),
                    lambda: true,
                });
                let body = self.prep(body, id, &inner, scopes, work)?;
                scopes.pop();
                self.set_kind(
                    id,
                    NodeKind::Lambda {
                        params: params.clone(),
                        body,
                        func: FuncInfo::new(fid, targs.clone()),
                        widen: *widen,
                    },
                );
                let ret = self.find(body);
                let fun = self.terms.fun(*widen, FidSet::from([fid]), targs, ret);
                let me = self.find(id);
                self.terms.unify(me, fun, Some(work));
                Ok(id)
            }
            Expr::Let { name, def, body } => {
                let targ = self.terms.leaf();
                let id = self.alloc(parent_id, nongen, targ, work);
                scopes.push(Scope {
                    def: id,
                    names: vec![name.clone()],
                    targs: vec![targ],
                    lambda: false,
                });
                let body = self.prep(body, id, nongen, scopes, work)?;
                let def = self.prep(def, id, &nongen.push(targ), scopes, work)?;
                scopes.pop();
                self.set_kind(
                    id,
                    NodeKind::Let {
                        name: name.clone(),
                        def,
                        body,
                        targ,
                    },
                );
                self.nodes[id.index()].hmt = self.nodes[body.index()].hmt;
                let d = self.find(def);
                self.terms.unify(targ, d, Some(work));
                Ok(id)
            }
            Expr::Apply(fun, args) => {
                let leaf = self.terms.leaf();
                let id = self.alloc(parent_id, nongen, leaf, work);
                let fun = self.prep(fun, id, nongen, scopes, work)?;
                let args = args
                    .iter()
                    .map(|arg| self.prep(arg, id, nongen, scopes, work))
                    .collect::<Result<Vec<_>>>()?;
                self.set_kind(id, NodeKind::Apply { fun, args });
                Ok(id)
            }
            Expr::Struct(fields) => {
                let alias = self.new_alias();
                let hmt = self.terms.strukt(false, AliasSet::from([alias]), BTreeMap::new());
                let id = self.alloc(parent_id, nongen, hmt, work);
                let mut labels = Vec::with_capacity(fields.len());
                let mut nodes = Vec::with_capacity(fields.len());
                for (label, field) in fields {
                    let node = self.prep(field, id, nongen, scopes, work)?;
                    let t = self.find(node);
                    self.terms.insert_field(hmt, label, t);
                    labels.push(label.clone());
                    nodes.push(node);
                }
                self.set_kind(
                    id,
                    NodeKind::Struct {
                        alias,
                        labels,
                        fields: nodes,
                    },
                );
                Ok(id)
            }
            Expr::Field(rec, label) => {
                let leaf = self.terms.leaf();
                let id = self.alloc(parent_id, nongen, leaf, work);
                let rec = self.prep(rec, id, nongen, scopes, work)?;
                self.set_kind(
                    id,
                    NodeKind::Field {
                        label: label.clone(),
                        rec,
                    },
                );
                Ok(id)
            }
        }
    }

    fn base_con(&mut self, parent: NodeId, nongen: &NonGen, flow: Flow, work: &mut Worklist) -> NodeId {
        let hmt = self.terms.base(flow.clone());
        self.con(parent, nongen, hmt, flow, work)
    }

    fn con(&mut self, parent: NodeId, nongen: &NonGen, hmt: TermId, flow: Flow, work: &mut Worklist) -> NodeId {
        let id = self.alloc(Some(parent), nongen, hmt, work);
        self.set_kind(id, NodeKind::Con(flow));
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn build(src: &str) -> (Program, Worklist) {
        let mut work = Worklist::new();
        let prog = Program::build(&parse(src).unwrap(), SolverConfig::default(), &mut work).unwrap();
        (prog, work)
    }

    #[test]
    fn test_every_node_seeded() {
        let (prog, work) = build("x = 3; @{ a = x, b = (pair x x) }");
        assert_eq!(work.len(), prog.len());
        assert!(prog.nodes().all(|(id, _)| work.has(id)));
    }

    #[test]
    fn test_ident_resolves_nearest_binder() {
        let (prog, _) = build("{ x -> { x -> x } }");
        let (id, node) = prog
            .nodes()
            .find(|(_, n)| matches!(n.kind(), NodeKind::Ident { .. }))
            .unwrap();
        let NodeKind::Ident { def, idx, .. } = node.kind() else {
            unreachable!()
        };
        assert_eq!(Some(*def), prog.parent(id));
        assert_eq!(*idx, Some(0));
    }

    #[test]
    fn test_let_binder_visible_in_definition() {
        let (prog, _) = build("f = { n -> (f n) }; f");
        let idents: Vec<_> = prog
            .nodes()
            .filter_map(|(_, n)| match n.kind() {
                NodeKind::Ident { idx, name, .. } => Some((name.clone(), *idx)),
                _ => None,
            })
            .collect();
        assert!(idents.contains(&("f".to_string(), None)));
        assert!(idents.contains(&("n".to_string(), Some(0))));
    }

    #[test]
    fn test_undefined_ident() {
        let mut work = Worklist::new();
        let err = Program::build(&parse("(dec y)").unwrap(), SolverConfig::default(), &mut work).unwrap_err();
        assert_eq!(err, InferError::Undefined { name: "y".into() });
    }

    #[test]
    fn test_scope_snapshots() {
        let (prog, _) = build("x = 3; { y -> x }");
        for (_, node) in prog.nodes() {
            if let NodeKind::Ident { name, .. } = node.kind() {
                assert_eq!(name, "x");
                // Inside the lambda only `y` is pinned; a let body does not
                // pin its own binder.
                assert_eq!(node.nongen.len(), 1);
            }
        }
    }

    #[test]
    fn test_lambda_preunified_with_function_shape() {
        let (mut prog, _) = build("{ x y -> x }");
        let NodeKind::Root { body } = *prog.kind(prog.root()) else {
            unreachable!()
        };
        let t = prog.find(body);
        assert!(prog.terms.is_fun(t));
        assert_eq!(prog.node_type(body), "{ A B -> C }");
    }
}
