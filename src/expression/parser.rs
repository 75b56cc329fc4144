use crate::expression::ast::{BinaryOp, Expr, Lit, PathSegment, UnaryOp};
use crate::expression::error::ExprError;
use crate::expression::lexer::{Span, Token, TokenKind, lex};

pub(crate) fn parse_expr(src: &str) -> Result<Expr, ExprError> {
    let tokens = lex(src)?;
    parse_tokens(tokens)
}

pub(crate) fn parse_tokens(tokens: Vec<Token>) -> Result<Expr, ExprError> {
    let mut p = Parser { tokens, pos: 0 };
    if p.peek().kind == TokenKind::Eof {
        return Err(ExprError::new(p.span().start, "empty expression"));
    }
    let expr = p.parse_or()?;
    if p.peek().kind == TokenKind::RParen {
        return Err(ExprError::new(p.span().start, "unbalanced ')'"));
    }
    p.expect(TokenKind::Eof)?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn bump(&mut self) -> &Token {
        let t = &self.tokens[self.pos];
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn span(&self) -> Span {
        self.peek().span
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ExprError> {
        if self.peek().kind == kind {
            self.bump();
            Ok(())
        } else {
            Err(ExprError::new(
                self.span().start,
                format!("expected {kind:?}, found {:?}", self.peek().kind),
            ))
        }
    }

    fn consume(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut e = self.parse_and()?;
        while self.consume(TokenKind::OrOr) {
            let r = self.parse_and()?;
            e = Self::binary(BinaryOp::Or, e, r);
        }
        Ok(e)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut e = self.parse_equality()?;
        while self.consume(TokenKind::AndAnd) {
            let r = self.parse_equality()?;
            e = Self::binary(BinaryOp::And, e, r);
        }
        Ok(e)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExprError> {
        let mut e = self.parse_comparison()?;
        loop {
            let op = if self.consume(TokenKind::EqEq) {
                BinaryOp::Eq
            } else if self.consume(TokenKind::Ne) {
                BinaryOp::Ne
            } else {
                break;
            };
            let r = self.parse_comparison()?;
            e = Self::binary(op, e, r);
        }
        Ok(e)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let mut e = self.parse_unary()?;
        loop {
            let op = if self.consume(TokenKind::Lt) {
                BinaryOp::Lt
            } else if self.consume(TokenKind::Le) {
                BinaryOp::Le
            } else if self.consume(TokenKind::Gt) {
                BinaryOp::Gt
            } else if self.consume(TokenKind::Ge) {
                BinaryOp::Ge
            } else {
                break;
            };
            let r = self.parse_unary()?;
            e = Self::binary(op, e, r);
        }
        Ok(e)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.consume(TokenKind::Bang) {
            let e = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(e),
            });
        }
        if self.peek().kind == TokenKind::Minus {
            let start = self.span().start;
            self.bump();
            let t = self.bump().clone();
            return match t.kind {
                TokenKind::Int(v) => Ok(Expr::Lit(Lit::Int(int_literal(-v, start)?))),
                TokenKind::Float(v) => Ok(Expr::Lit(Lit::Float(-v))),
                other => Err(ExprError::new(
                    t.span.start,
                    format!("expected number after '-', found {other:?}"),
                )),
            };
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut e = self.parse_primary()?;

        loop {
            if self.consume(TokenKind::Dot) {
                let t = self.bump().clone();
                let name = match t.kind {
                    TokenKind::Ident(s) => s,
                    other => {
                        return Err(ExprError::new(
                            t.span.start,
                            format!("expected ident after '.', found {other:?}"),
                        ));
                    }
                };
                e = append_path(e, PathSegment::plain(name), t.span.start)?;
                continue;
            }

            if self.peek().kind == TokenKind::LBracket {
                let start = self.span().start;
                self.bump();
                let t = self.bump().clone();
                let index = match t.kind {
                    TokenKind::Int(v) if v >= 0 => usize::try_from(v)
                        .map_err(|_| ExprError::new(t.span.start, "index out of range"))?,
                    other => {
                        return Err(ExprError::new(
                            t.span.start,
                            format!("expected index, found {other:?}"),
                        ));
                    }
                };
                self.expect(TokenKind::RBracket)?;
                e = push_index(e, index, start)?;
                continue;
            }

            break;
        }

        Ok(e)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let t = self.bump().clone();
        match t.kind {
            TokenKind::Int(v) => Ok(Expr::Lit(Lit::Int(int_literal(v, t.span.start)?))),
            TokenKind::Float(v) => Ok(Expr::Lit(Lit::Float(v))),
            TokenKind::True => Ok(Expr::Lit(Lit::Bool(true))),
            TokenKind::False => Ok(Expr::Lit(Lit::Bool(false))),
            TokenKind::Ident(s) => Ok(Expr::Path(vec![PathSegment::plain(s)])),
            TokenKind::LParen => {
                let e = self.parse_or()?;
                if self.peek().kind != TokenKind::RParen {
                    return Err(ExprError::new(
                        self.span().start,
                        format!("unbalanced '(': found {:?}", self.peek().kind),
                    ));
                }
                self.bump();
                Ok(e)
            }
            other => Err(ExprError::new(
                t.span.start,
                format!("unexpected token {other:?}"),
            )),
        }
    }
}

fn int_literal(v: i64, offset: usize) -> Result<i32, ExprError> {
    i32::try_from(v).map_err(|_| ExprError::new(offset, "integer out of range"))
}

fn append_path(base: Expr, segment: PathSegment, offset: usize) -> Result<Expr, ExprError> {
    match base {
        Expr::Path(mut v) => {
            v.push(segment);
            Ok(Expr::Path(v))
        }
        _ => Err(ExprError::new(
            offset,
            "member access base must be an identifier path",
        )),
    }
}

fn push_index(base: Expr, index: usize, offset: usize) -> Result<Expr, ExprError> {
    match base {
        Expr::Path(mut v) => {
            if let Some(last) = v.last_mut() {
                last.indices.push(index);
            }
            Ok(Expr::Path(v))
        }
        _ => Err(ExprError::new(offset, "only identifiers can be indexed")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::SmallVec;

    fn indices(v: &[usize]) -> SmallVec<[usize; 2]> {
        v.iter().copied().collect()
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let e = parse_expr("vars.a || vars.b && vars.c").unwrap();
        match e {
            Expr::Binary {
                op: BinaryOp::Or,
                right,
                ..
            } => assert!(matches!(
                *right,
                Expr::Binary {
                    op: BinaryOp::And,
                    ..
                }
            )),
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn parses_indexed_paths() {
        let e = parse_expr("vars.lights[1][2].x").unwrap();
        assert_eq!(
            e,
            Expr::Path(vec![
                PathSegment::plain("vars"),
                PathSegment {
                    name: "lights".to_owned(),
                    indices: indices(&[1, 2]),
                },
                PathSegment::plain("x"),
            ])
        );
    }

    #[test]
    fn comparison_binds_tighter_than_equality() {
        let e = parse_expr("vars.a.int < 3 == true").unwrap();
        assert!(matches!(
            e,
            Expr::Binary {
                op: BinaryOp::Eq,
                ..
            }
        ));
    }

    #[test]
    fn negative_literals() {
        assert_eq!(parse_expr("-4").unwrap(), Expr::Lit(Lit::Int(-4)));
        assert_eq!(parse_expr("-0.5").unwrap(), Expr::Lit(Lit::Float(-0.5)));
    }

    #[test]
    fn unbalanced_parens_are_errors() {
        assert!(parse_expr("(vars.a && vars.b").unwrap_err().message.contains("unbalanced"));
        assert!(parse_expr("vars.a)").unwrap_err().message.contains("unbalanced"));
        assert!(parse_expr("").is_err());
    }

    #[test]
    fn display_round_trips_structure() {
        let e = parse_expr("!vars.a && vars.b.int >= 2").unwrap();
        assert_eq!(e.to_string(), "(!vars.a && (vars.b.int >= 2))");
    }
}
