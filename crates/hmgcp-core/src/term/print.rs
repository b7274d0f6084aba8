//! Cycle-safe pretty-printing of terms
//!
//! Leaves print as `A`, `B`, ...; a function or struct reached twice is
//! printed once as `A:body` and then by name, which also cuts cycles.

use super::{Forest, TermId, TermKind};
use crate::flow::is_tuple;
use fnv::{FnvHashMap, FnvHashSet};
use std::fmt::Write;

impl Forest {
    pub fn pretty(&self, t: TermId) -> String {
        let mut seen = FnvHashSet::default();
        let mut dups = FnvHashSet::default();
        self.find_dups(t, &mut seen, &mut dups);
        let mut printer = Printer {
            forest: self,
            dups,
            names: FnvHashMap::default(),
            visit: FnvHashSet::default(),
            out: String::new(),
        };
        printer.term(t);
        printer.out
    }

    fn find_dups(&self, t: TermId, seen: &mut FnvHashSet<TermId>, dups: &mut FnvHashSet<TermId>) {
        let t = self.debug_find(t);
        if !seen.insert(t) {
            dups.insert(t);
            return;
        }
        for child in self.children(t) {
            self.find_dups(child, seen, dups);
        }
    }
}

struct Printer<'a> {
    forest: &'a Forest,
    dups: FnvHashSet<TermId>,
    names: FnvHashMap<TermId, String>,
    visit: FnvHashSet<TermId>,
    out: String,
}

impl Printer<'_> {
    fn name(&mut self, t: TermId) -> String {
        let next = self.names.len();
        self.names
            .entry(t)
            .or_insert_with(|| {
                let letter = char::from(b'A' + (next % 26) as u8);
                match next / 26 {
                    0 => letter.to_string(),
                    n => format!("{letter}{n}"),
                }
            })
            .clone()
    }

    fn term(&mut self, t: TermId) {
        let forest = self.forest;
        let t = forest.debug_find(t);
        match forest.kind(t) {
            TermKind::Leaf | TermKind::Redirect(_) => {
                let name = self.name(t);
                self.out.push_str(&name);
                return;
            }
            TermKind::Base(flow) => {
                let _ = write!(self.out, "{flow}");
                return;
            }
            TermKind::Err(msg) => {
                self.out.push_str(msg);
                return;
            }
            _ => {}
        }
        if self.dups.contains(&t) {
            let name = self.name(t);
            self.out.push_str(&name);
            if !self.visit.insert(t) {
                return;
            }
            self.out.push(':');
        }
        match forest.kind(t) {
            TermKind::Nil(inner) => {
                self.term(*inner);
                self.out.push('?');
            }
            TermKind::Fun { args, ret, nil, .. } => {
                self.out.push_str("{ ");
                for &arg in args {
                    self.term(arg);
                    self.out.push(' ');
                }
                self.out.push_str("-> ");
                self.term(*ret);
                self.out.push_str(" }");
                if *nil {
                    self.out.push('?');
                }
            }
            TermKind::Struct {
                fields, open, nil, ..
            } => {
                if is_tuple(fields.keys()) {
                    self.out.push('(');
                    for (i, &child) in fields.values().enumerate() {
                        if i > 0 {
                            self.out.push_str(", ");
                        }
                        self.term(child);
                    }
                    if *open {
                        self.out.push_str(", ...");
                    }
                    self.out.push(')');
                } else {
                    self.out.push_str("@{");
                    for (i, (label, &child)) in fields.iter().enumerate() {
                        self.out.push_str(if i > 0 { "; " } else { " " });
                        let _ = write!(self.out, "{label} = ");
                        self.term(child);
                    }
                    if *open {
                        self.out.push_str(if fields.is_empty() { " ..." } else { "; ..." });
                    }
                    self.out.push_str(" }");
                }
                if *nil {
                    self.out.push('?');
                }
            }
            _ => {}
        }
    }
}
