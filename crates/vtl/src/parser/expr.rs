//! Expression grammar used inside directive parentheses, method arguments
//! and index brackets.
//!
//! Precedence from loosest to tightest: `||`, `&&`, equality, relational,
//! additive, multiplicative, unary. Word forms (`or`, `and`, `eq`, `ne`,
//! `lt`, `le`, `gt`, `ge`, `not`) are accepted alongside the symbols.

use serde_json::{Number, Value};

use super::{BlockEnd, Parser, is_ident_char};
use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::ParseError;

impl Parser<'_> {
    pub(super) fn expression(&mut self) -> Result<Expr, ParseError> {
        self.nested(self.pos, Self::or_expr)
    }

    /// Comma separated arguments up to `close`, which is consumed.
    pub(super) fn call_args(&mut self, close: char) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(close) {
                return Ok(args);
            }
            if !args.is_empty() {
                self.expect(',')?;
                self.skip_ws();
            }
            args.push(self.expression()?);
        }
    }

    /// Consumes `word` when it is not the prefix of a longer identifier.
    pub(super) fn eat_word(&mut self, word: &str) -> bool {
        let rest = self.rest();
        let boundary = rest
            .strip_prefix(word)
            .is_some_and(|tail| !tail.chars().next().is_some_and(is_ident_char));
        if boundary {
            self.pos += word.len();
        }
        boundary
    }

    fn binary_level(
        &mut self,
        operators: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut lhs = next(self)?;
        'outer: loop {
            let checkpoint = self.pos;
            self.skip_ws();
            let start = self.pos;
            for &(token, op) in operators {
                let matched = if token.starts_with(|ch: char| ch.is_ascii_alphabetic()) {
                    self.eat_word(token)
                } else {
                    self.eat_str(token)
                };
                if matched {
                    let pos = self.position_at(start);
                    self.skip_ws();
                    let rhs = next(self)?;
                    lhs = Expr::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                        pos,
                    };
                    continue 'outer;
                }
            }
            self.pos = checkpoint;
            return Ok(lhs);
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[("||", BinaryOp::Or), ("or", BinaryOp::Or)], Self::and_expr)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(
            &[("&&", BinaryOp::And), ("and", BinaryOp::And)],
            Self::equality,
        )
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(
            &[
                ("==", BinaryOp::Eq),
                ("!=", BinaryOp::Ne),
                ("eq", BinaryOp::Eq),
                ("ne", BinaryOp::Ne),
            ],
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(
            &[
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
                ("le", BinaryOp::Le),
                ("ge", BinaryOp::Ge),
                ("lt", BinaryOp::Lt),
                ("gt", BinaryOp::Gt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        self.skip_ws();
        let start = self.pos;
        let prefix = if self.peek() == Some('!') && self.peek_nth(1) != Some('=') {
            self.pos += 1;
            Some(UnaryOp::Not)
        } else if self.eat_word("not") {
            Some(UnaryOp::Not)
        } else if self.peek() == Some('-') {
            if self.peek_nth(1).is_some_and(|ch| ch.is_ascii_digit()) {
                return self.number();
            }
            self.pos += 1;
            Some(UnaryOp::Negate)
        } else {
            None
        };
        let Some(op) = prefix else {
            return self.primary();
        };
        let pos = self.position_at(start);
        let operand = self.nested(start, Self::unary)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
            pos,
        })
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        self.skip_ws();
        let start = self.pos;
        match self.peek() {
            Some('$') => match self.try_reference()? {
                Some(reference) => Ok(Expr::Reference(reference)),
                None => Err(self.error_at(start, "expected a reference after '$'")),
            },
            Some('"') => self.double_quoted(),
            Some('\'') => self.single_quoted(),
            Some(ch) if ch.is_ascii_digit() => self.number(),
            Some('[') => self.list_or_range(),
            Some('{') => self.map_literal(),
            Some('(') => {
                self.pos += 1;
                self.skip_ws();
                let inner = self.expression()?;
                self.skip_ws();
                self.expect(')')?;
                Ok(inner)
            }
            Some(ch) if ch.is_ascii_alphabetic() => {
                if self.eat_word("true") {
                    Ok(Expr::Literal(Value::Bool(true)))
                } else if self.eat_word("false") {
                    Ok(Expr::Literal(Value::Bool(false)))
                } else if self.eat_word("null") {
                    Ok(Expr::Literal(Value::Null))
                } else {
                    let word = self.identifier().unwrap_or_default();
                    Err(self.error_at(start, format!("unexpected word '{word}' in expression")))
                }
            }
            Some(ch) => Err(self.error_at(
                start,
                format!("unexpected character '{ch}' in expression"),
            )),
            None => Err(self.error_at(start, "unexpected end of input in expression")),
        }
    }

    fn number(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        self.eat('-');
        while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            self.pos += 1;
        }
        let fractional = self.peek() == Some('.')
            && self.peek_nth(1).is_some_and(|ch| ch.is_ascii_digit());
        if fractional {
            self.pos += 1;
            while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let literal = self.slice(start, self.pos);
        let parsed = if fractional {
            literal
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
        } else {
            literal.parse::<i64>().ok().map(Number::from)
        };
        parsed
            .map(|number| Expr::Literal(Value::Number(number)))
            .ok_or_else(|| self.error_at(start, format!("invalid number literal '{literal}'")))
    }

    fn single_quoted(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error_at(start, "unterminated string literal")),
                Some('\'') if self.peek() == Some('\'') => {
                    value.push('\'');
                    self.pos += 1;
                }
                Some('\'') => return Ok(Expr::Literal(Value::String(value))),
                Some(ch) => value.push(ch),
            }
        }
    }

    fn double_quoted(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let body_start = self.pos;
        loop {
            match self.peek() {
                None => return Err(self.error_at(start, "unterminated string literal")),
                Some('\\') if self.peek_nth(1) == Some('"') => self.pos += 2,
                Some('"') if self.peek_nth(1) == Some('"') => self.pos += 2,
                Some('"') => break,
                Some(ch) => self.pos += ch.len_utf8(),
            }
        }
        let body_end = self.pos;
        self.pos += 1;

        let raw = self.slice(body_start, body_end);
        if !raw.contains(['$', '#']) {
            let value = raw.replace("\\\"", "\"").replace("\"\"", "\"");
            return Ok(Expr::Literal(Value::String(value)));
        }

        let mut body = self.string_body(body_start, body_end);
        let (nodes, end, at) = body.parse_nodes()?;
        if let Some(keyword) = end.keyword() {
            return Err(self.error_at(at, format!("unexpected {keyword} inside string literal")));
        }
        debug_assert!(matches!(end, BlockEnd::Eof));
        self.macros.append(&mut body.macros);
        Ok(Expr::Interpolated(nodes))
    }

    fn list_or_range(&mut self) -> Result<Expr, ParseError> {
        self.pos += 1;
        self.skip_ws();
        if self.eat(']') {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.expression()?;
        self.skip_ws();
        if self.eat_str("..") {
            self.skip_ws();
            let last = self.expression()?;
            self.skip_ws();
            self.expect(']')?;
            return Ok(Expr::Range(Box::new(first), Box::new(last)));
        }
        let mut items = vec![first];
        loop {
            self.skip_ws();
            if self.eat(']') {
                return Ok(Expr::List(items));
            }
            self.expect(',')?;
            self.skip_ws();
            items.push(self.expression()?);
        }
    }

    fn map_literal(&mut self) -> Result<Expr, ParseError> {
        self.pos += 1;
        let mut entries = Vec::new();
        loop {
            self.skip_ws();
            if self.eat('}') {
                return Ok(Expr::Map(entries));
            }
            if !entries.is_empty() {
                self.expect(',')?;
                self.skip_ws();
            }
            let key = self.expression()?;
            self.skip_ws();
            self.expect(':')?;
            self.skip_ws();
            let value = self.expression()?;
            entries.push((key, value));
        }
    }
}
