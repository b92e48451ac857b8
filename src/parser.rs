use crate::ast::*;
use crate::error::ParseError;
use crate::token::{Span, Spanned, Token};

/// Maximum recursion depth of the parser and maximum height of the tree it
/// builds. Compiling and evaluating recurse once per tree level, so this
/// keeps all three stack-bounded.
pub const MAX_DEPTH: usize = 128;

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    // ── Helpers ──────────────────────────────────────────────

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map_or(&Token::EOF, |s| &s.token)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(Span::new(0, 0), |s| s.span)
    }

    /// End of the most recently consumed token.
    fn prev_end(&self) -> usize {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map_or(0, |s| s.span.end)
    }

    fn advance(&mut self) -> Spanned {
        let s = Spanned {
            token: self.peek().clone(),
            span: self.span(),
        };
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        s
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek(), Token::EOF)
    }

    fn check(&self, expected: &Token) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(expected)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        if self.is_at_end() {
            ParseError::UnexpectedEOF {
                expected: expected.into(),
                pos: self.span().start,
            }
        } else {
            ParseError::UnexpectedToken {
                expected: expected.into(),
                found: self.peek().clone(),
                span: self.span(),
            }
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<Spanned, ParseError> {
        if self.check(expected) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(what))
        }
    }

    /// Finish a node, rejecting trees too tall to compile and evaluate.
    fn build(&self, kind: ExprKind, span: Span) -> Result<Expr, ParseError> {
        let expr = Expr::new(kind, span);
        if expr.height() > MAX_DEPTH {
            return Err(ParseError::TooDeep { span: expr.span });
        }
        Ok(expr)
    }

    /// Run `f` one nesting level deeper, failing once [`MAX_DEPTH`] is hit.
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::TooDeep { span: self.span() });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    // ── Formula ──────────────────────────────────────────────

    pub fn parse_formula(&mut self) -> Result<Formula, ParseError> {
        while self.eat(&Token::Semicolon) {}
        if self.is_at_end() {
            return Ok(Formula { body: None });
        }

        let body = self.parse_sequence()?;
        while self.eat(&Token::Semicolon) {}
        if !self.is_at_end() {
            return Err(self.unexpected("operator or end of formula"));
        }
        Ok(Formula { body: Some(body) })
    }

    // ── Expressions (lowest precedence first) ───────────────

    fn parse_sequence(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_assignment()?;
        if !self.check(&Token::Comma) {
            return Ok(first);
        }

        let start = first.span;
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            items.push(self.parse_assignment()?);
        }
        let span = start.to(Span::new(start.start, self.prev_end()));
        self.build(ExprKind::Sequence(items), span)
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        self.nested(|p| {
            let lhs = p.parse_conditional()?;
            let op = match p.peek() {
                Token::Eq => None,
                Token::CompoundAssign(op) => Some(*op),
                _ => return Ok(lhs),
            };
            p.advance();
            let value = p.parse_assignment()?;
            let span = lhs.span.to(value.span);
            p.build(
                ExprKind::Assign {
                    op,
                    target: Box::new(lhs),
                    value: Box::new(value),
                },
                span,
            )
        })
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_binary(0)?;
        if !self.eat(&Token::Question) {
            return Ok(cond);
        }
        let then = self.parse_assignment()?;
        self.expect(&Token::Colon, "':' in conditional")?;
        let otherwise = self.parse_assignment()?;
        let span = cond.span.to(otherwise.span);
        self.build(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            span,
        )
    }

    /// Precedence climbing over every binary and short-circuit operator.
    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;

        while let Some((prec, op)) = binary_op(self.peek()) {
            if prec < min_prec {
                break;
            }
            self.advance();
            // `**` is the only right-associative binary operator
            let next_min = if matches!(op, Operator::Binary(BinaryOp::Pow)) {
                prec
            } else {
                prec + 1
            };
            let rhs = self.nested(|p| p.parse_binary(next_min))?;
            let span = lhs.span.to(rhs.span);
            let kind = match op {
                Operator::Binary(op) => ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                Operator::Logical(op) => ExprKind::Logical {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            };
            lhs = self.build(kind, span)?;
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        self.nested(|p| {
            let start = p.span();
            let op = match p.peek() {
                Token::Minus => UnaryOp::Neg,
                Token::Plus => UnaryOp::Plus,
                Token::Bang => UnaryOp::Not,
                Token::Tilde => UnaryOp::BitNot,
                Token::PlusPlus | Token::MinusMinus => {
                    let increment = matches!(p.advance().token, Token::PlusPlus);
                    let target = p.parse_unary()?;
                    let span = start.to(target.span);
                    return p.build(
                        ExprKind::Update {
                            increment,
                            prefix: true,
                            target: Box::new(target),
                        },
                        span,
                    );
                }
                _ => return p.parse_postfix(),
            };
            p.advance();
            let operand = p.parse_unary()?;
            let span = start.to(operand.span);
            p.build(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            )
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::LParen => {
                    self.advance();
                    let args = self.parse_list(&Token::RParen, "')' after arguments")?;
                    let span = Span::new(expr.span.start, self.prev_end());
                    expr = self.build(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    )?;
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_sequence()?;
                    self.expect(&Token::RBracket, "']' after index")?;
                    let span = Span::new(expr.span.start, self.prev_end());
                    expr = self.build(
                        ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    )?;
                }
                Token::Dot => {
                    self.advance();
                    let property = match self.peek() {
                        Token::Ident(name) => name.clone(),
                        _ => return Err(self.unexpected("property name after '.'")),
                    };
                    self.advance();
                    let span = Span::new(expr.span.start, self.prev_end());
                    expr = self.build(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property,
                        },
                        span,
                    )?;
                }
                Token::PlusPlus | Token::MinusMinus => {
                    let increment = matches!(self.advance().token, Token::PlusPlus);
                    let span = Span::new(expr.span.start, self.prev_end());
                    expr = self.build(
                        ExprKind::Update {
                            increment,
                            prefix: false,
                            target: Box::new(expr),
                        },
                        span,
                    )?;
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let span = self.span();
        match self.peek().clone() {
            Token::Number(n) => {
                self.advance();
                self.build(ExprKind::Number(n), span)
            }
            Token::StringLit(s) => {
                self.advance();
                self.build(ExprKind::StringLit(s), span)
            }
            Token::Ident(name) => {
                self.advance();
                self.build(ExprKind::Identifier(name), span)
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_sequence()?;
                self.expect(&Token::RParen, "')'")?;
                self.build(inner.kind, Span::new(span.start, self.prev_end()))
            }
            Token::LBracket => {
                self.advance();
                let items = self.parse_list(&Token::RBracket, "']' after array elements")?;
                self.build(
                    ExprKind::Array(items),
                    Span::new(span.start, self.prev_end()),
                )
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    /// Comma-separated expressions up to and including `close`.
    /// A trailing comma is allowed.
    fn parse_list(&mut self, close: &Token, what: &str) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        while !self.check(close) {
            items.push(self.parse_assignment()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(close, what)?;
        Ok(items)
    }
}

enum Operator {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

/// Binding power and operator for a binary token, higher binds tighter.
fn binary_op(token: &Token) -> Option<(u8, Operator)> {
    use Operator::{Binary, Logical};
    let entry = match token {
        Token::QuestionQuestion => (1, Logical(LogicalOp::Nullish)),
        Token::PipePipe => (2, Logical(LogicalOp::Or)),
        Token::AmpAmp => (3, Logical(LogicalOp::And)),
        Token::Pipe => (4, Binary(BinaryOp::BitOr)),
        Token::Caret => (5, Binary(BinaryOp::BitXor)),
        Token::Amp => (6, Binary(BinaryOp::BitAnd)),
        Token::EqEq => (7, Binary(BinaryOp::Eq)),
        Token::NotEq => (7, Binary(BinaryOp::NotEq)),
        Token::EqEqEq => (7, Binary(BinaryOp::StrictEq)),
        Token::NotEqEq => (7, Binary(BinaryOp::StrictNotEq)),
        Token::Lt => (8, Binary(BinaryOp::Lt)),
        Token::LtEq => (8, Binary(BinaryOp::LtEq)),
        Token::Gt => (8, Binary(BinaryOp::Gt)),
        Token::GtEq => (8, Binary(BinaryOp::GtEq)),
        Token::Shl => (9, Binary(BinaryOp::Shl)),
        Token::Shr => (9, Binary(BinaryOp::Shr)),
        Token::UShr => (9, Binary(BinaryOp::UShr)),
        Token::Plus => (10, Binary(BinaryOp::Add)),
        Token::Minus => (10, Binary(BinaryOp::Sub)),
        Token::Star => (11, Binary(BinaryOp::Mul)),
        Token::Slash => (11, Binary(BinaryOp::Div)),
        Token::Percent => (11, Binary(BinaryOp::Rem)),
        Token::StarStar => (12, Binary(BinaryOp::Pow)),
        _ => return None,
    };
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> Result<Formula, ParseError> {
        let tokens = Lexer::new(src).tokenize().unwrap();
        Parser::new(tokens).parse_formula()
    }

    fn body(src: &str) -> Expr {
        parse(src).unwrap().body.expect("formula should not be empty")
    }

    #[test]
    fn test_empty_and_comment_only() {
        assert!(parse("").unwrap().body.is_none());
        assert!(parse("   ").unwrap().body.is_none());
        assert!(parse("// just a note").unwrap().body.is_none());
        assert!(parse(";").unwrap().body.is_none());
    }

    #[test]
    fn test_shift_binds_looser_than_additive() {
        // t>>4+1 == t>>(4+1)
        match body("t>>4+1").kind {
            ExprKind::Binary { op: BinaryOp::Shr, rhs, .. } => {
                assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Add, .. }));
            }
            other => panic!("expected shift at root, got {other:?}"),
        }
    }

    #[test]
    fn test_bitwise_precedence_chain() {
        // a|b^c&d parses as a|(b^(c&d))
        match body("a|b^c&d").kind {
            ExprKind::Binary { op: BinaryOp::BitOr, rhs, .. } => match rhs.kind {
                ExprKind::Binary { op: BinaryOp::BitXor, rhs, .. } => {
                    assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::BitAnd, .. }));
                }
                other => panic!("expected xor, got {other:?}"),
            },
            other => panic!("expected or, got {other:?}"),
        }
    }

    #[test]
    fn test_pow_is_right_associative() {
        match body("2**3**2").kind {
            ExprKind::Binary { op: BinaryOp::Pow, lhs, rhs } => {
                assert!(matches!(lhs.kind, ExprKind::Number(n) if n == 2.0));
                assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Pow, .. }));
            }
            other => panic!("expected pow, got {other:?}"),
        }
    }

    #[test]
    fn test_sequence_and_assignment() {
        match body("a=t>>4, b+=1, [a, b]").kind {
            ExprKind::Sequence(items) => {
                assert_eq!(items.len(), 3);
                assert!(matches!(items[0].kind, ExprKind::Assign { op: None, .. }));
                assert!(matches!(items[1].kind, ExprKind::Assign { op: Some(_), .. }));
                assert!(matches!(&items[2].kind, ExprKind::Array(v) if v.len() == 2));
            }
            other => panic!("expected sequence, got {other:?}"),
        }
    }

    #[test]
    fn test_conditional_nests_right() {
        match body("t&1?2:t&2?3:4").kind {
            ExprKind::Conditional { otherwise, .. } => {
                assert!(matches!(otherwise.kind, ExprKind::Conditional { .. }));
            }
            other => panic!("expected conditional, got {other:?}"),
        }
    }

    #[test]
    fn test_postfix_chain() {
        match body("'abc'.charCodeAt(t>>10&3)").kind {
            ExprKind::Call { callee, args } => {
                assert_eq!(args.len(), 1);
                assert!(
                    matches!(&callee.kind, ExprKind::Member { property, .. } if property == "charCodeAt")
                );
            }
            other => panic!("expected call, got {other:?}"),
        }
        assert!(matches!(body("[1,2,3][t%3]").kind, ExprKind::Index { .. }));
        assert!(matches!(body("x++").kind, ExprKind::Update { prefix: false, .. }));
        assert!(matches!(body("--x").kind, ExprKind::Update { prefix: true, increment: false, .. }));
    }

    #[test]
    fn test_trailing_semicolon_and_array_comma() {
        assert!(parse("t*2;").is_ok());
        assert!(matches!(body("[t, t,]").kind, ExprKind::Array(ref v) if v.len() == 2));
    }

    #[test]
    fn test_spans_cover_source() {
        let e = body("  t >> 3 ");
        assert_eq!(e.span, Span::new(2, 8));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse("t>>"), Err(ParseError::UnexpectedEOF { pos: 3, .. })));
        assert!(matches!(parse("(t"), Err(ParseError::UnexpectedEOF { .. })));
        assert!(matches!(parse("t t"), Err(ParseError::UnexpectedToken { .. })));
        assert!(matches!(parse("t; t"), Err(ParseError::UnexpectedToken { .. })));
        assert!(matches!(parse("a ? b"), Err(ParseError::UnexpectedEOF { .. })));
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}t{}", "(".repeat(MAX_DEPTH + 5), ")".repeat(MAX_DEPTH + 5));
        assert!(matches!(parse(&deep), Err(ParseError::TooDeep { .. })));

        let shallow = format!("{}t{}", "(".repeat(20), ")".repeat(20));
        assert!(parse(&shallow).is_ok());
    }

    #[test]
    fn test_long_left_chains_are_too_deep() {
        let sum = format!("t{}", "+t".repeat(10_000));
        assert!(matches!(parse(&sum), Err(ParseError::TooDeep { .. })));

        let mixed = format!("t{}", "*3|t".repeat(5_000));
        assert!(matches!(parse(&mixed), Err(ParseError::TooDeep { .. })));

        let indexed = format!("a{}", "[0]".repeat(10_000));
        assert!(matches!(parse(&indexed), Err(ParseError::TooDeep { .. })));

        let called = format!("f{}", "()".repeat(10_000));
        assert!(matches!(parse(&called), Err(ParseError::TooDeep { .. })));
    }

    #[test]
    fn test_long_right_chains_are_too_deep() {
        let power = format!("t{}", "**t".repeat(10_000));
        assert!(matches!(parse(&power), Err(ParseError::TooDeep { .. })));

        let assigns = format!("{}t", "a=".repeat(10_000));
        assert!(matches!(parse(&assigns), Err(ParseError::TooDeep { .. })));

        let negations = format!("{}t", "- ".repeat(10_000));
        assert!(matches!(parse(&negations), Err(ParseError::TooDeep { .. })));
    }

    #[test]
    fn test_tree_height_is_bounded() {
        let sum = format!("t{}", "+t".repeat(100));
        assert_eq!(body(&sum).height(), 101);

        let at_limit = format!("t{}", "+t".repeat(MAX_DEPTH - 1));
        assert_eq!(body(&at_limit).height(), MAX_DEPTH);

        let over = format!("t{}", "+t".repeat(MAX_DEPTH));
        assert!(matches!(parse(&over), Err(ParseError::TooDeep { .. })));

        // height adds up across operators, postfix and unary nesting
        let wrapped = format!("-(-(-({sum})))");
        assert_eq!(body(&wrapped).height(), 104);
        let tall = format!("-(-(-({sum}+{sum})))[0]{}", "[0]".repeat(25));
        assert!(matches!(parse(&tall), Err(ParseError::TooDeep { .. })));
    }
}
