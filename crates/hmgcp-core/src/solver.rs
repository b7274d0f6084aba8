//! Combined HM/GCP worklist fixpoint
//!
//! One loop drives both analyses. Each pop tries one HM refinement and one
//! flow recompute on the node, and re-enqueues whatever either step
//! affected. When the worklist drains, escape widening assumes unknown
//! callers for every function the program's result exposes and the loop
//! resumes until nothing moves.

use crate::ast::Expr;
use crate::config::SolverConfig;
use crate::error::Result;
use crate::flow::{Flow, FunId};
use crate::parser::parse;
use crate::syntax::{NodeId, NodeKind, Program};
use crate::worklist::Worklist;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, trace, warn};

/// Counters and diagnostics from one solve.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SolverStats {
    pub nodes: usize,
    /// Terms allocated by tree preparation.
    pub initial_terms: usize,
    /// Terms allocated by the end of the run, redirects included.
    pub terms: usize,
    pub pops: usize,
    pub widen_rounds: usize,
    /// `false` when the iteration ceiling stopped the run.
    pub converged: bool,
    /// Probe and monotonicity failures; empty on a healthy run.
    pub violations: Vec<String>,
}

/// A solved program.
#[derive(Debug)]
pub struct Inference {
    pub program: Program,
    pub stats: SolverStats,
}

/// Parses and solves `src` with the default configuration.
pub fn infer(src: &str) -> Result<Inference> {
    infer_with(src, SolverConfig::default())
}

pub fn infer_with(src: &str, config: SolverConfig) -> Result<Inference> {
    let expr = parse(src)?;
    solve(&expr, config)
}

/// Prepares and solves an already parsed program.
pub fn solve(expr: &Expr, config: SolverConfig) -> Result<Inference> {
    let mut work = Worklist::with_order(config.pop_order);
    let mut program = Program::build(expr, config, &mut work)?;
    let stats = program.run(&mut work);
    Ok(Inference { program, stats })
}

impl Program {
    /// Runs the worklist to a fixpoint, widening escapes between rounds.
    pub fn run(&mut self, work: &mut Worklist) -> SolverStats {
        let mut stats = SolverStats {
            nodes: self.len(),
            initial_terms: self.terms.len(),
            converged: true,
            ..SolverStats::default()
        };

        self.drive(work, &mut stats);
        self.check(work, &mut stats, "fixpoint");
        while stats.converged && self.config.do_gcp && stats.widen_rounds < self.config.max_widen_rounds {
            if !self.widen_escapes(work) {
                break;
            }
            stats.widen_rounds += 1;
            debug!(round = stats.widen_rounds, pending = work.len(), "widened escaping functions");
            self.drive(work, &mut stats);
            self.check(work, &mut stats, "escape widening");
        }

        stats.pops = work.pops();
        stats.terms = self.terms.len();
        info!(
            initial_terms = stats.initial_terms,
            nodes = stats.nodes,
            iterations = stats.pops,
            terms = stats.terms,
            "solved"
        );
        stats
    }

    fn drive(&mut self, work: &mut Worklist, stats: &mut SolverStats) {
        while let Some(id) = work.pop() {
            if work.pops() > self.config.max_iterations {
                warn!(max = self.config.max_iterations, "iteration ceiling reached, stopping");
                work.push(id);
                stats.converged = false;
                return;
            }
            trace!(node = %id, "pop");
            if self.config.do_hm {
                self.step_hm(id, work, stats);
            }
            if self.config.do_gcp {
                self.step_flow(id, work, stats);
            }
        }
        debug!(pops = work.pops(), "worklist drained");
    }

    fn step_hm(&mut self, id: NodeId, work: &mut Worklist, stats: &mut SolverStats) {
        if !self.config.check_invariants {
            if self.hm(id, Some(work)) {
                self.add_hm_work(id, work);
            }
            return;
        }
        let before = self.terms.len();
        let classes = self.terms.classes(before);
        let unions = self.terms.unions();
        if self.hm(id, Some(work)) {
            self.add_hm_work(id, work);
            if self.terms.classes(before) > classes {
                let msg = format!("{id}: HM step split merged classes");
                warn!("{msg}");
                stats.violations.push(msg);
            }
        } else if self.terms.unions() != unions {
            let msg = format!("{id}: HM step merged classes without reporting progress");
            warn!("{msg}");
            stats.violations.push(msg);
        }
    }

    fn step_flow(&mut self, id: NodeId, work: &mut Worklist, stats: &mut SolverStats) {
        let old = self.flow(id).clone();
        let mut new = self.val(id);
        if new == old {
            return;
        }
        if !old.isa(&new) {
            let msg = format!("{id}: flow rose from {old} to {new}");
            warn!("{msg}");
            stats.violations.push(msg);
            new = old.meet(&new);
            if new == old {
                return;
            }
        }
        self.nodes[id.index()].flow = new;
        if let Some(parent) = self.parent(id) {
            work.push(parent);
            self.add_val_work(parent, id, work);
        }
    }

    /// Probes every settled node: none may still make progress.
    fn check(&mut self, work: &Worklist, stats: &mut SolverStats, phase: &str) {
        if !self.config.check_invariants || !stats.converged {
            return;
        }
        for i in 0..self.len() {
            let id = NodeId(i as u32);
            if work.has(id) {
                continue;
            }
            if self.config.do_hm {
                let unions = self.terms.unions();
                if self.hm(id, None) {
                    stats.violations.push(format!("{id}: HM progress after {phase}"));
                }
                if self.terms.unions() != unions {
                    stats.violations.push(format!("{id}: HM check merged classes after {phase}"));
                }
            }
            if self.config.do_gcp {
                let val = self.val(id);
                if val != *self.flow(id) {
                    stats
                        .violations
                        .push(format!("{id}: flow {} recomputes to {val} after {phase}", self.flow(id)));
                }
            }
        }
        if !stats.violations.is_empty() {
            warn!(count = stats.violations.len(), phase, "invariant violations");
        }
    }

    /// Lowers the formals of every function reachable from the root flow to
    /// what an unknown caller could pass. Returns whether anything moved.
    fn widen_escapes(&mut self, work: &mut Worklist) -> bool {
        let root = self.flow(self.root).clone();
        let mut visit = HashSet::new();
        self.escape(&root, &mut visit, work)
    }

    fn escape(&mut self, flow: &Flow, visit: &mut HashSet<Flow>, work: &mut Worklist) -> bool {
        if !visit.insert(flow.clone()) {
            return false;
        }
        match flow {
            Flow::Fun { fids, .. } => {
                let mut progress = false;
                for &fid in fids {
                    if fid == FunId::UNKNOWN {
                        continue;
                    }
                    let Some(node) = self.fun_node(fid) else {
                        continue;
                    };
                    for (i, targ) in self.targs(node).into_iter().enumerate() {
                        let widest = self.terms.as_flow(targ);
                        if !self.meet_formal(node, i, &widest) {
                            continue;
                        }
                        self.terms.add_deps_work(targ, work);
                        match self.kind(node) {
                            NodeKind::Lambda { body, .. } => work.push(*body),
                            _ => work.push(node),
                        }
                        progress = true;
                    }
                    if let NodeKind::Lambda { body, .. } = self.kind(node) {
                        let ret = self.flow(*body).clone();
                        progress |= self.escape(&ret, visit, work);
                    }
                }
                progress
            }
            Flow::Rec {
                fields: Some(fields), ..
            } => {
                let mut progress = false;
                for field in fields.values() {
                    progress |= self.escape(field, visit, work);
                }
                progress
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worklist::PopOrder;

    #[test]
    fn test_constant_program() {
        let inf = infer("3").unwrap();
        assert_eq!(*inf.program.root_flow(), Flow::int(3));
        assert!(inf.stats.converged);
        assert!(inf.stats.violations.is_empty());
        assert_eq!(inf.stats.widen_rounds, 0);
    }

    #[test]
    fn test_stats_counts() {
        let inf = infer("(dec 3)").unwrap();
        assert_eq!(inf.stats.nodes, inf.program.len());
        assert!(inf.stats.pops >= inf.stats.nodes);
        assert!(inf.stats.terms >= inf.stats.initial_terms);
    }

    #[test]
    fn test_iteration_ceiling() {
        let config = SolverConfig::default().with_max_iterations(2);
        let inf = infer_with("(pair (dec 3) (dec 4))", config).unwrap();
        assert!(!inf.stats.converged);
    }

    #[test]
    fn test_gcp_only() {
        let config = SolverConfig::default().with_hm(false);
        let inf = infer_with("(+ 2 3)", config).unwrap();
        assert_eq!(*inf.program.root_flow(), Flow::int(5));
    }

    #[test]
    fn test_hm_only_leaves_flows_at_top() {
        let config = SolverConfig::default().with_gcp(false);
        let inf = infer_with("(dec 3)", config).unwrap();
        assert_eq!(*inf.program.root_flow(), Flow::Any);
        assert_eq!(inf.program.root_type(), "int64");
    }

    #[test]
    fn test_hm_steps_report_every_merge() {
        let src = "map = { fcn lst -> (if lst @{ n1 = (map fcn lst.n1), v1 = (fcn lst.v1) } 0) }; map";
        for order in [PopOrder::Lifo, PopOrder::Fifo] {
            let config = SolverConfig::default().with_invariants(true).with_pop_order(order);
            let inf = infer_with(src, config).unwrap();
            assert!(inf.stats.converged);
            assert_eq!(inf.stats.violations, Vec::<String>::new());
            assert!(inf.program.terms.unions() > 0);
        }
    }

    #[test]
    fn test_escaping_function_formals_widen() {
        let inf = infer("{ x -> (dec x) }").unwrap();
        let fid = match inf.program.root_flow() {
            Flow::Fun { fids, .. } => *fids.iter().next().unwrap(),
            other => panic!("expected a function, got {other}"),
        };
        let node = inf.program.fun_node(fid).unwrap();
        assert_eq!(inf.program.node(node).kind().func().unwrap().types[0], Flow::INT64);
        assert!(inf.stats.widen_rounds >= 1);
    }
}
