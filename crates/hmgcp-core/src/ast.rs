//! Surface expression tree
//!
//! Produced by the parser and consumed once by tree preparation.

use crate::syntax::prim::Prim;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// The literal `0`, read as nil.
    Nil,
    Int(i64),
    Flt(f64),
    Str(String),
    Prim(Prim),
    Ident(String),
    Apply(Box<Expr>, Vec<Expr>),
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
        /// Whether argument bases are widened on entry. Only the
        /// not-nil guard lambdas turn this off.
        widen: bool,
    },
    Let {
        name: String,
        def: Box<Expr>,
        body: Box<Expr>,
    },
    Struct(Vec<(String, Expr)>),
    Field(Box<Expr>, String),
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Expr {
        Expr::Ident(name.into())
    }

    pub fn apply(fun: Expr, args: Vec<Expr>) -> Expr {
        Expr::Apply(Box::new(fun), args)
    }

    pub fn lambda(params: Vec<String>, body: Expr) -> Expr {
        Expr::Lambda {
            params,
            body: Box::new(body),
            widen: true,
        }
    }

    pub fn let_in(name: impl Into<String>, def: Expr, body: Expr) -> Expr {
        Expr::Let {
            name: name.into(),
            def: Box::new(def),
            body: Box::new(body),
        }
    }

    /// Builds a call; `(if x a b)` on a bare identifier runs its true
    /// branch under a guard lambda binding `x` to ` notnil x`.
    pub fn call(fun: Expr, mut args: Vec<Expr>) -> Expr {
        if fun == Expr::Prim(Prim::If) && args.len() >= 2 {
            if let Expr::Ident(name) = &args[0] {
                let name = name.clone();
                let branch = std::mem::replace(&mut args[1], Expr::Nil);
                let guard = Expr::Lambda {
                    params: vec![name.clone()],
                    body: Box::new(branch),
                    widen: false,
                };
                let narrowed = Expr::apply(Expr::Prim(Prim::NotNil), vec![Expr::Ident(name)]);
                args[1] = Expr::apply(guard, vec![narrowed]);
            }
        }
        Expr::apply(fun, args)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Nil => write!(f, "0"),
            Expr::Int(i) => write!(f, "{i}"),
            Expr::Flt(x) => write!(f, "{x:?}"),
            Expr::Str(s) => write!(f, "\"{s}\""),
            Expr::Prim(p) => write!(f, "{}", p.name().trim()),
            Expr::Ident(name) => write!(f, "{name}"),
            Expr::Apply(fun, args) => {
                write!(f, "({fun}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
            Expr::Lambda { params, body, .. } => {
                write!(f, "{{")?;
                for p in params {
                    write!(f, " {p}")?;
                }
                write!(f, " -> {body} }}")
            }
            Expr::Let { name, def, body } => write!(f, "{name} = {def}; {body}"),
            Expr::Struct(fields) => {
                write!(f, "@{{")?;
                for (i, (label, e)) in fields.iter().enumerate() {
                    write!(f, "{}{label} = {e}", if i > 0 { ", " } else { " " })?;
                }
                write!(f, " }}")
            }
            Expr::Field(rec, label) => write!(f, "{rec}.{label}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_if_on_ident_gets_guard() {
        let e = Expr::call(
            Expr::Prim(Prim::If),
            vec![Expr::ident("x"), Expr::Int(1), Expr::Int(2)],
        );
        assert_eq!(e.to_string(), "(if x ({ x -> 1 } (notnil x)) 2)");
        let Expr::Apply(_, args) = &e else {
            panic!("expected an apply");
        };
        assert!(matches!(&args[1], Expr::Apply(l, _) if matches!(**l, Expr::Lambda { widen: false, .. })));
    }

    #[test]
    fn test_if_on_constant_is_untouched() {
        let e = Expr::call(Expr::Prim(Prim::If), vec![Expr::Nil, Expr::Int(1), Expr::Int(2)]);
        assert_eq!(e.to_string(), "(if 0 1 2)");
    }
}
