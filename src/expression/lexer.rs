use crate::expression::error::ExprError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub(crate) start: usize,
    pub(crate) end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    True,
    False,

    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,

    Minus,
    Bang,

    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    AndAnd,
    OrOr,

    Eof,
}

pub(crate) fn lex(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut out = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let start = i;

        // Number: [0-9]+(.[0-9]+)?([eE][+-]?[0-9]+)? or .[0-9]+([eE][+-]?[0-9]+)?
        // Only a dot right after an identifier or bracket is a path separator.
        let after_path = matches!(
            out.last(),
            Some(Token {
                kind: TokenKind::Ident(_) | TokenKind::RBracket,
                ..
            })
        );
        if c.is_ascii_digit()
            || (c == '.'
                && !after_path
                && i + 1 < bytes.len()
                && (bytes[i + 1] as char).is_ascii_digit())
        {
            let mut is_float = false;
            if c == '.' {
                is_float = true;
                i += 1;
            } else {
                while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                    i += 1;
                }
                if i < bytes.len()
                    && (bytes[i] as char) == '.'
                    && i + 1 < bytes.len()
                    && (bytes[i + 1] as char).is_ascii_digit()
                {
                    is_float = true;
                    i += 1;
                }
            }

            while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                i += 1;
            }

            if i < bytes.len() && matches!(bytes[i] as char, 'e' | 'E') {
                is_float = true;
                let e_pos = i;
                i += 1;
                if i < bytes.len() && matches!(bytes[i] as char, '+' | '-') {
                    i += 1;
                }
                let exp_start = i;
                while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                    i += 1;
                }
                if exp_start == i {
                    return Err(ExprError::new(
                        e_pos,
                        "invalid number exponent (expected digits)",
                    ));
                }
            }

            let s = &input[start..i];
            let kind = if is_float {
                TokenKind::Float(
                    s.parse()
                        .map_err(|_| ExprError::new(start, "invalid number"))?,
                )
            } else {
                TokenKind::Int(
                    s.parse()
                        .map_err(|_| ExprError::new(start, "integer out of range"))?,
                )
            };
            out.push(Token {
                kind,
                span: Span { start, end: i },
            });
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            i += 1;
            while i < bytes.len() {
                let ch = bytes[i] as char;
                if ch.is_ascii_alphanumeric() || ch == '_' {
                    i += 1;
                } else {
                    break;
                }
            }
            let s = &input[start..i];
            let kind = match s {
                "true" => TokenKind::True,
                "false" => TokenKind::False,
                _ => TokenKind::Ident(s.to_owned()),
            };
            out.push(Token {
                kind,
                span: Span { start, end: i },
            });
            continue;
        }

        // Quoted identifier, for variable names containing spaces.
        if c == '"' {
            let Some(len) = input[i + 1..].find('"') else {
                return Err(ExprError::new(start, "unterminated quoted name"));
            };
            let name = &input[i + 1..i + 1 + len];
            i += len + 2;
            out.push(Token {
                kind: TokenKind::Ident(name.to_owned()),
                span: Span { start, end: i },
            });
            continue;
        }

        if i + 1 < bytes.len() {
            let kind = match &bytes[i..i + 2] {
                b"&&" => Some(TokenKind::AndAnd),
                b"||" => Some(TokenKind::OrOr),
                b"==" => Some(TokenKind::EqEq),
                b"!=" => Some(TokenKind::Ne),
                b"<=" => Some(TokenKind::Le),
                b">=" => Some(TokenKind::Ge),
                _ => None,
            };
            if let Some(kind) = kind {
                i += 2;
                out.push(Token {
                    kind,
                    span: Span { start, end: i },
                });
                continue;
            }
        }

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '.' => TokenKind::Dot,
            '-' => TokenKind::Minus,
            '!' => TokenKind::Bang,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            _ => {
                let ch = input[start..].chars().next().unwrap_or(c);
                return Err(ExprError::new(start, format!("unexpected character '{ch}'")));
            }
        };
        i += 1;
        out.push(Token {
            kind,
            span: Span { start, end: i },
        });
    }

    out.push(Token {
        kind: TokenKind::Eof,
        span: Span {
            start: input.len(),
            end: input.len(),
        },
    });

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(s: &str) -> Vec<TokenKind> {
        lex(s).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn ints_and_floats_are_distinguished() {
        assert_eq!(
            kinds("3 3.5 1e2 .25"),
            vec![
                TokenKind::Int(3),
                TokenKind::Float(3.5),
                TokenKind::Float(100.0),
                TokenKind::Float(0.25),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn quoted_names_become_identifiers() {
        assert_eq!(
            kinds("vars.\"light count\".int"),
            vec![
                TokenKind::Ident("vars".into()),
                TokenKind::Dot,
                TokenKind::Ident("light count".into()),
                TokenKind::Dot,
                TokenKind::Ident("int".into()),
                TokenKind::Eof
            ]
        );
        assert!(lex("vars.\"open").is_err());
    }

    #[test]
    fn dotted_paths_with_indices() {
        assert_eq!(
            kinds("vars.lights[2].x"),
            vec![
                TokenKind::Ident("vars".into()),
                TokenKind::Dot,
                TokenKind::Ident("lights".into()),
                TokenKind::LBracket,
                TokenKind::Int(2),
                TokenKind::RBracket,
                TokenKind::Dot,
                TokenKind::Ident("x".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds("a&&b||!c<=d>=e!=f"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::AndAnd,
                TokenKind::Ident("b".into()),
                TokenKind::OrOr,
                TokenKind::Bang,
                TokenKind::Ident("c".into()),
                TokenKind::Le,
                TokenKind::Ident("d".into()),
                TokenKind::Ge,
                TokenKind::Ident("e".into()),
                TokenKind::Ne,
                TokenKind::Ident("f".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn unknown_character_reports_offset() {
        let err = lex("vars.a $ 2").unwrap_err();
        assert_eq!(err.offset, 7);
        assert!(err.message.contains("'$'"));
    }
}
