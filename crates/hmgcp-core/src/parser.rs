//! Recursive-descent parser for the surface language
//!
//! ```text
//! expr := int | float | "str" | prim | ident
//!       | ( expr expr* )            apply
//!       | { id* -> expr }           lambda
//!       | id = expr ; expr          let
//!       | @{ (label = expr ,?)* }   record
//!       | expr . label              field load
//! ```

use crate::ast::Expr;
use crate::error::ParseError;
use crate::syntax::prim::Prim;

type Result<T> = std::result::Result<T, ParseError>;

/// Parses a whole program; trailing text is an error.
pub fn parse(src: &str) -> Result<Expr> {
    let mut parser = Parser::new(src);
    let expr = parser.fterm()?;
    match parser.skip_ws() {
        None => Ok(expr),
        Some(_) => Err(ParseError::Junk { offset: parser.pos }),
    }
}

pub struct Parser<'a> {
    buf: &'a [u8],
    pos: usize,
}

fn is_alpha0(c: u8) -> bool {
    c.is_ascii_alphabetic() || matches!(c, b'_' | b'*' | b'?' | b'+')
}

fn is_alpha1(c: u8) -> bool {
    is_alpha0(c) || c.is_ascii_digit() || c == b'/'
}

impl<'a> Parser<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            buf: src.as_bytes(),
            pos: 0,
        }
    }

    /// Skips whitespace and peeks the next byte.
    fn skip_ws(&mut self) -> Option<u8> {
        while self.pos < self.buf.len() && self.buf[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        self.buf.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.buf.get(self.pos + ahead).copied()
    }

    fn require(&mut self, c: char) -> Result<()> {
        match self.skip_ws() {
            Some(b) if char::from(b) == c => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(ParseError::Expected {
                expected: c,
                offset: self.pos,
            }),
        }
    }

    /// A term followed by any number of `.label` loads.
    pub fn fterm(&mut self) -> Result<Expr> {
        let mut term = self.term()?;
        while self.skip_ws() == Some(b'.') {
            self.pos += 1;
            let label = self.id()?;
            term = Expr::Field(Box::new(term), label);
        }
        Ok(term)
    }

    fn term(&mut self) -> Result<Expr> {
        let c = self.skip_ws().ok_or(ParseError::UnexpectedEnd)?;
        match c {
            b'0'..=b'9' => self.number(),
            b'"' => self.string(),
            b'(' => self.apply(),
            b'{' => self.lambda(),
            b'@' => self.record(),
            c if is_alpha0(c) => self.let_or_ident(),
            _ => Err(ParseError::UnknownSyntax { offset: self.pos }),
        }
    }

    fn apply(&mut self) -> Result<Expr> {
        self.pos += 1;
        let fun = self.fterm()?;
        let mut args = Vec::new();
        while self.skip_ws().ok_or(ParseError::UnexpectedEnd)? != b')' {
            args.push(self.fterm()?);
        }
        self.pos += 1;
        Ok(Expr::call(fun, args))
    }

    fn lambda(&mut self) -> Result<Expr> {
        self.pos += 1;
        let mut params = Vec::new();
        while self.skip_ws().ok_or(ParseError::UnexpectedEnd)? != b'-' {
            params.push(self.id()?);
        }
        self.pos += 1;
        if self.peek_at(0) != Some(b'>') {
            return Err(ParseError::Expected {
                expected: '>',
                offset: self.pos,
            });
        }
        self.pos += 1;
        let body = self.fterm()?;
        self.require('}')?;
        Ok(Expr::lambda(params, body))
    }

    fn record(&mut self) -> Result<Expr> {
        self.pos += 1;
        self.require('{')?;
        let mut fields = Vec::new();
        while self.skip_ws().ok_or(ParseError::UnexpectedEnd)? != b'}' {
            let label = self.id()?;
            self.require('=')?;
            let field = self.fterm()?;
            fields.push((label, field));
            if self.skip_ws() == Some(b',') {
                self.pos += 1;
            }
        }
        self.pos += 1;
        Ok(Expr::Struct(fields))
    }

    fn let_or_ident(&mut self) -> Result<Expr> {
        let name = self.id()?;
        if self.skip_ws() != Some(b'=') {
            return Ok(match Prim::from_name(&name) {
                Some(prim) => Expr::Prim(prim),
                None => Expr::Ident(name),
            });
        }
        self.pos += 1;
        let def = self.fterm()?;
        self.require(';')?;
        let body = self.fterm()?;
        Ok(Expr::let_in(name, def, body))
    }

    fn id(&mut self) -> Result<String> {
        self.skip_ws();
        let start = self.pos;
        if !self.peek_at(0).is_some_and(is_alpha0) {
            return Err(ParseError::MissingId { offset: start });
        }
        while self.peek_at(0).is_some_and(is_alpha1) {
            self.pos += 1;
        }
        Ok(String::from_utf8_lossy(&self.buf[start..self.pos]).into_owned())
    }

    fn number(&mut self) -> Result<Expr> {
        let start = self.pos;
        let is_float = |p: &Self| p.peek_at(0) == Some(b'.') && p.peek_at(1).is_some_and(|c| c.is_ascii_digit());
        if self.peek_at(0) == Some(b'0') {
            self.pos += 1;
            if !is_float(self) {
                return Ok(Expr::Nil);
            }
        }
        while self.peek_at(0).is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        // `2.5` is a float, `2.x` loads field `x` from the int 2.
        let is_float = is_float(self);
        if is_float {
            self.pos += 1;
            while self.peek_at(0).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.buf[start..self.pos]).map_err(|_| ParseError::BadNumber { offset: start })?;
        if is_float {
            return text
                .parse::<f64>()
                .map(Expr::Flt)
                .map_err(|_| ParseError::BadNumber { offset: start });
        }
        text.parse::<i64>()
            .map(Expr::Int)
            .map_err(|_| ParseError::BadNumber { offset: start })
    }

    fn string(&mut self) -> Result<Expr> {
        self.pos += 1;
        let start = self.pos;
        while self.peek_at(0).is_some_and(|c| c != b'"') {
            self.pos += 1;
        }
        if self.peek_at(0).is_none() {
            return Err(ParseError::Expected {
                expected: '"',
                offset: self.pos,
            });
        }
        let s = String::from_utf8_lossy(&self.buf[start..self.pos]).into_owned();
        self.pos += 1;
        Ok(Expr::Str(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Literals
    // ========================================================================

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse("0").unwrap(), Expr::Nil);
        assert_eq!(parse("42").unwrap(), Expr::Int(42));
        assert_eq!(parse("2.5").unwrap(), Expr::Flt(2.5));
        assert_eq!(parse("0.5").unwrap(), Expr::Flt(0.5));
        assert_eq!(parse("\"abc\"").unwrap(), Expr::Str("abc".into()));
    }

    #[test]
    fn test_int_followed_by_field() {
        assert_eq!(
            parse("3.x").unwrap(),
            Expr::Field(Box::new(Expr::Int(3)), "x".into())
        );
    }

    // ========================================================================
    // Compound forms
    // ========================================================================

    #[test]
    fn test_parse_let_and_lambda() {
        let e = parse("id = {x -> x}; (id 3)").unwrap();
        assert_eq!(e.to_string(), "id = { x -> x }; (id 3)");
    }

    #[test]
    fn test_parse_prims() {
        let e = parse("(+ 2 (* 3 4))").unwrap();
        assert_eq!(
            e,
            Expr::apply(
                Expr::Prim(Prim::Add),
                vec![
                    Expr::Int(2),
                    Expr::apply(Expr::Prim(Prim::Mul), vec![Expr::Int(3), Expr::Int(4)])
                ]
            )
        );
    }

    #[test]
    fn test_prim_name_binds_only_before_equals() {
        let e = parse("pair = 3; pair").unwrap();
        assert_eq!(e, Expr::let_in("pair", Expr::Int(3), Expr::Prim(Prim::Pair)));
    }

    #[test]
    fn test_parse_record_and_fields() {
        let e = parse("@{ x = 3, y = \"s\" }.x").unwrap();
        assert_eq!(e.to_string(), "@{ x = 3, y = \"s\" }.x");
        assert_eq!(parse("@{}").unwrap(), Expr::Struct(vec![]));
    }

    #[test]
    fn test_if_guard_desugars() {
        let e = parse("{ p -> (if p p.x 0) }").unwrap();
        assert_eq!(e.to_string(), "{ p -> (if p ({ p -> p.x } (notnil p)) 0) }");
    }

    // ========================================================================
    // Errors
    // ========================================================================

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse(""), Err(ParseError::UnexpectedEnd));
        assert_eq!(parse("(f 1"), Err(ParseError::UnexpectedEnd));
        assert!(matches!(parse("3 4"), Err(ParseError::Junk { offset: 2 })));
        assert!(matches!(parse("05"), Err(ParseError::Junk { offset: 1 })));
        assert!(matches!(parse("{ x x }"), Err(ParseError::UnexpectedEnd) | Err(ParseError::MissingId { .. })));
        assert!(matches!(parse("#"), Err(ParseError::UnknownSyntax { offset: 0 })));
        assert!(matches!(parse("\"abc"), Err(ParseError::Expected { expected: '"', .. })));
        assert!(matches!(parse("x = 3 x"), Err(ParseError::Expected { expected: ';', .. })));
        assert!(matches!(parse("@{ x 3 }"), Err(ParseError::Expected { expected: '=', .. })));
    }
}
