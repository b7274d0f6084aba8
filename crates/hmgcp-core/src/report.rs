//! Result projections: types, flows, signatures and dumps

use crate::flow::{is_tuple, FidSet, Flow, FunId};
use crate::solver::{Inference, SolverStats};
use crate::syntax::{NodeId, NodeKind, Program};
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::fmt::{self, Write as _};

/// A flow value with every function expanded to what it returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signature {
    Value(Flow),
    Fun {
        fids: FidSet,
        ret: Box<Signature>,
    },
    Rec {
        fields: Vec<(String, Signature)>,
        nil: bool,
    },
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signature::Value(flow) => write!(f, "{flow}"),
            Signature::Fun { ret, .. } => write!(f, "{{ -> {ret} }}"),
            Signature::Rec { fields, nil } => {
                let tuple = is_tuple(fields.iter().map(|(label, _)| label));
                write!(f, "{}", if tuple { "(" } else { "@{ " })?;
                for (i, (label, sig)) in fields.iter().enumerate() {
                    match (i, tuple) {
                        (0, _) => {}
                        (_, true) => write!(f, ", ")?,
                        (_, false) => write!(f, "; ")?,
                    }
                    if tuple {
                        write!(f, "{sig}")?;
                    } else {
                        write!(f, "{label} = {sig}")?;
                    }
                }
                write!(f, "{}", if tuple { ")" } else { " }" })?;
                if *nil {
                    write!(f, "?")?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Serializable summary of one solve.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    #[serde(rename = "type")]
    pub ty: String,
    pub flow: Flow,
    pub signature: Signature,
    pub stats: SolverStats,
}

impl Inference {
    pub fn report(&self) -> Report {
        Report {
            ty: self.program.root_type(),
            flow: self.program.root_flow().clone(),
            signature: self.program.signature(),
            stats: self.stats.clone(),
        }
    }
}

impl Program {
    /// Principal type of the whole program.
    pub fn root_type(&self) -> String {
        self.node_type(self.root)
    }

    pub fn root_flow(&self) -> &Flow {
        self.node_flow(self.root)
    }

    /// The root flow with functions replaced by their return signatures.
    pub fn signature(&self) -> Signature {
        let mut active = HashSet::new();
        self.sig_of(self.root_flow(), &mut active)
    }

    fn sig_of(&self, flow: &Flow, active: &mut HashSet<FidSet>) -> Signature {
        match flow {
            Flow::Fun { fids, .. } => {
                if !active.insert(fids.clone()) {
                    return Signature::Value(flow.clone());
                }
                let ret = fids.iter().fold(Flow::Any, |ret, &fid| ret.meet(&self.returns(fid)));
                let ret = self.sig_of(&ret, active);
                active.remove(fids);
                Signature::Fun {
                    fids: fids.clone(),
                    ret: Box::new(ret),
                }
            }
            Flow::Rec {
                fields: Some(fields),
                nil,
                ..
            } => Signature::Rec {
                fields: fields
                    .iter()
                    .map(|(label, f)| (label.clone(), self.sig_of(f, active)))
                    .collect(),
                nil: *nil,
            },
            other => Signature::Value(other.clone()),
        }
    }

    /// What a call to `fid` returns to an unknown caller.
    fn returns(&self, fid: FunId) -> Flow {
        let Some(node) = self.fun_node(fid) else {
            return Flow::SCALAR;
        };
        match self.kind(node) {
            NodeKind::Lambda { body, .. } => self.flow(*body).clone(),
            NodeKind::Prim { prim, .. } => prim.apply(&[], self.pair_alias, self.triple_alias),
            _ => Flow::SCALAR,
        }
    }

    /// Indented node tree with each node's HM type and flow.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_node(self.root, 0, &mut out);
        out
    }

    fn dump_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let label = match self.kind(id) {
            NodeKind::Con(flow) => format!("{flow}"),
            NodeKind::Ident { name, .. } => name.clone(),
            NodeKind::Lambda { params, .. } => format!("{{ {} -> }}", params.join(" ")),
            NodeKind::Let { name, .. } => format!("{name} ="),
            NodeKind::Apply { .. } => "(apply)".to_string(),
            NodeKind::Root { .. } => "root".to_string(),
            NodeKind::Struct { labels, .. } => format!("@{{ {} }}", labels.join(", ")),
            NodeKind::Field { label, .. } => format!(".{label}"),
            NodeKind::Prim { prim, .. } => prim.name().trim().to_string(),
        };
        let _ = writeln!(
            out,
            "{:indent$}{id} {label}  HMT={}  GCP={}",
            "",
            self.node_type(id),
            self.flow(id),
            indent = depth * 2
        );
        for child in self.kind(id).children() {
            self.dump_node(child, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::solver::infer;

    #[test]
    fn test_signature_of_value() {
        let inf = infer("(pair 3 \"x\")").unwrap();
        assert_eq!(inf.program.signature().to_string(), "(3, \"x\")");
    }

    #[test]
    fn test_signature_expands_functions() {
        let inf = infer("{ x -> 5 }").unwrap();
        assert_eq!(inf.program.signature().to_string(), "{ -> 5 }");
    }

    #[test]
    fn test_signature_of_recursive_function_terminates() {
        let inf = infer("f = { -> f }; f").unwrap();
        let sig = inf.program.signature().to_string();
        assert!(sig.starts_with("{ -> "), "{sig}");
    }

    #[test]
    fn test_dump_lists_every_node() {
        let inf = infer("(dec 3)").unwrap();
        let dump = inf.program.dump();
        assert_eq!(dump.lines().count(), inf.program.len());
        assert!(dump.starts_with("#0 root"));
        assert!(dump.contains("GCP=2"));
    }

    #[test]
    fn test_report_serializes() {
        let inf = infer("(+ 2 3)").unwrap();
        let json = serde_json::to_value(inf.report()).unwrap();
        assert_eq!(json["type"], "int64");
        assert_eq!(json["flow"], "5");
        assert_eq!(json["stats"]["converged"], true);
    }
}
