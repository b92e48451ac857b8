use crate::error::LexError;
use crate::token::{AssignOp, Span, Spanned, Token};
use crate::value::parse_radix;

pub struct Lexer {
    chars: Vec<char>,
    /// Precomputed byte offset for each char index.
    /// `byte_offsets[i]` = byte offset of `chars[i]` in the original `&str`.
    /// `byte_offsets[chars.len()]` = total byte length (sentinel for EOF).
    byte_offsets: Vec<usize>,
    pos: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let mut byte_offsets = Vec::with_capacity(chars.len() + 1);
        let mut offset = 0;
        for ch in &chars {
            byte_offsets.push(offset);
            offset += ch.len_utf8();
        }
        byte_offsets.push(offset); // sentinel for EOF
        Lexer {
            chars,
            byte_offsets,
            pos: 0,
        }
    }

    /// Tokenize the whole input. Comments and whitespace are dropped;
    /// the returned vector always ends with [`Token::EOF`].
    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let is_eof = spanned.token == Token::EOF;
            tokens.push(spanned);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    /// Skip whitespace and both comment styles.
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match (self.peek_at(0), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.pos += 1;
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek_at(0) {
                        if c == '\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        match (self.peek_at(0), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.pos += 2;
                                break;
                            }
                            (Some(_), _) => self.pos += 1,
                            (None, _) => {
                                return Err(LexError::UnterminatedComment {
                                    pos: self.byte_pos_of(start),
                                });
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Convert a char index to a byte offset.
    fn byte_pos_of(&self, char_idx: usize) -> usize {
        self.byte_offsets[char_idx.min(self.chars.len())]
    }

    fn spanned(&self, token: Token, start: usize) -> Spanned {
        Spanned {
            token,
            span: Span {
                start: self.byte_pos_of(start),
                end: self.byte_pos_of(self.pos),
            },
        }
    }

    /// Consume `len` chars and emit `token`.
    fn punct(&mut self, token: Token, start: usize, len: usize) -> Result<Spanned, LexError> {
        self.pos += len;
        Ok(self.spanned(token, start))
    }

    fn next_token(&mut self) -> Result<Spanned, LexError> {
        self.skip_trivia()?;

        if self.pos >= self.chars.len() {
            let end = self.byte_pos_of(self.pos);
            return Ok(Spanned {
                token: Token::EOF,
                span: Span { start: end, end },
            });
        }

        let start = self.pos;
        let ch = self.chars[self.pos];
        let next = self.peek_at(1);
        let third = self.peek_at(2);
        let fourth = self.peek_at(3);

        match ch {
            '+' => match next {
                Some('+') => self.punct(Token::PlusPlus, start, 2),
                Some('=') => self.punct(Token::CompoundAssign(AssignOp::Add), start, 2),
                _ => self.punct(Token::Plus, start, 1),
            },
            '-' => match next {
                Some('-') => self.punct(Token::MinusMinus, start, 2),
                Some('=') => self.punct(Token::CompoundAssign(AssignOp::Sub), start, 2),
                _ => self.punct(Token::Minus, start, 1),
            },
            '*' => match (next, third) {
                (Some('*'), Some('=')) => self.punct(Token::CompoundAssign(AssignOp::Pow), start, 3),
                (Some('*'), _) => self.punct(Token::StarStar, start, 2),
                (Some('='), _) => self.punct(Token::CompoundAssign(AssignOp::Mul), start, 2),
                _ => self.punct(Token::Star, start, 1),
            },
            '/' => match next {
                Some('=') => self.punct(Token::CompoundAssign(AssignOp::Div), start, 2),
                _ => self.punct(Token::Slash, start, 1),
            },
            '%' => match next {
                Some('=') => self.punct(Token::CompoundAssign(AssignOp::Rem), start, 2),
                _ => self.punct(Token::Percent, start, 1),
            },
            '<' => match (next, third) {
                (Some('<'), Some('=')) => self.punct(Token::CompoundAssign(AssignOp::Shl), start, 3),
                (Some('<'), _) => self.punct(Token::Shl, start, 2),
                (Some('='), _) => self.punct(Token::LtEq, start, 2),
                _ => self.punct(Token::Lt, start, 1),
            },
            '>' => match (next, third, fourth) {
                (Some('>'), Some('>'), Some('=')) => {
                    self.punct(Token::CompoundAssign(AssignOp::UShr), start, 4)
                }
                (Some('>'), Some('>'), _) => self.punct(Token::UShr, start, 3),
                (Some('>'), Some('='), _) => {
                    self.punct(Token::CompoundAssign(AssignOp::Shr), start, 3)
                }
                (Some('>'), _, _) => self.punct(Token::Shr, start, 2),
                (Some('='), _, _) => self.punct(Token::GtEq, start, 2),
                _ => self.punct(Token::Gt, start, 1),
            },
            '&' => match next {
                Some('&') => self.punct(Token::AmpAmp, start, 2),
                Some('=') => self.punct(Token::CompoundAssign(AssignOp::And), start, 2),
                _ => self.punct(Token::Amp, start, 1),
            },
            '|' => match next {
                Some('|') => self.punct(Token::PipePipe, start, 2),
                Some('=') => self.punct(Token::CompoundAssign(AssignOp::Or), start, 2),
                _ => self.punct(Token::Pipe, start, 1),
            },
            '^' => match next {
                Some('=') => self.punct(Token::CompoundAssign(AssignOp::Xor), start, 2),
                _ => self.punct(Token::Caret, start, 1),
            },
            '=' => match (next, third) {
                (Some('='), Some('=')) => self.punct(Token::EqEqEq, start, 3),
                (Some('='), _) => self.punct(Token::EqEq, start, 2),
                _ => self.punct(Token::Eq, start, 1),
            },
            '!' => match (next, third) {
                (Some('='), Some('=')) => self.punct(Token::NotEqEq, start, 3),
                (Some('='), _) => self.punct(Token::NotEq, start, 2),
                _ => self.punct(Token::Bang, start, 1),
            },
            '?' => match next {
                Some('?') => self.punct(Token::QuestionQuestion, start, 2),
                _ => self.punct(Token::Question, start, 1),
            },
            '~' => self.punct(Token::Tilde, start, 1),
            ':' => self.punct(Token::Colon, start, 1),
            ',' => self.punct(Token::Comma, start, 1),
            ';' => self.punct(Token::Semicolon, start, 1),
            '(' => self.punct(Token::LParen, start, 1),
            ')' => self.punct(Token::RParen, start, 1),
            '[' => self.punct(Token::LBracket, start, 1),
            ']' => self.punct(Token::RBracket, start, 1),
            '.' if next.is_some_and(|c| c.is_ascii_digit()) => self.lex_number(start),
            '.' => self.punct(Token::Dot, start, 1),
            '"' | '\'' => self.lex_string(start),
            c if c.is_ascii_digit() => self.lex_number(start),
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => self.lex_ident(start),
            _ => Err(LexError::UnexpectedChar { ch, pos: self.byte_pos_of(start) }),
        }
    }

    fn lex_string(&mut self, start: usize) -> Result<Spanned, LexError> {
        let Some(quote) = self.advance() else {
            return Err(LexError::UnterminatedString { pos: self.byte_pos_of(start) });
        };
        let mut s = String::new();
        loop {
            match self.advance() {
                Some(c) if c == quote => break,
                Some('\\') => match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('0') => s.push('\0'),
                    Some(c) => s.push(c),
                    None => return Err(LexError::UnterminatedString { pos: self.byte_pos_of(start) }),
                },
                Some('\n') | None => {
                    return Err(LexError::UnterminatedString { pos: self.byte_pos_of(start) });
                }
                Some(c) => s.push(c),
            }
        }
        Ok(self.spanned(Token::StringLit(s), start))
    }

    fn lex_number(&mut self, start: usize) -> Result<Spanned, LexError> {
        let radix = match (self.chars[start], self.peek_at(1)) {
            ('0', Some('x' | 'X')) => Some(16),
            ('0', Some('b' | 'B')) => Some(2),
            ('0', Some('o' | 'O')) => Some(8),
            _ => None,
        };

        if let Some(radix) = radix {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek_at(0).is_some_and(|c| c.is_ascii_alphanumeric()) {
                self.pos += 1;
            }
            let digits: String = self.chars[digits_start..self.pos].iter().collect();
            return match parse_radix(&digits, radix) {
                Some(n) => Ok(self.spanned(Token::Number(n), start)),
                None => Err(self.invalid_number(start)),
            };
        }

        while self.peek_at(0).is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek_at(0) == Some('.') {
            self.pos += 1;
            while self.peek_at(0).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek_at(0), Some('e' | 'E')) {
            let sign = matches!(self.peek_at(1), Some('+' | '-')) as usize;
            if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1 + sign;
                while self.peek_at(0).is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
        // `12abc` is not a number followed by an identifier
        if self.peek_at(0).is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$') {
            while self.peek_at(0).is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
                self.pos += 1;
            }
            return Err(self.invalid_number(start));
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        let num: f64 = text.parse().map_err(|_| self.invalid_number(start))?;
        Ok(self.spanned(Token::Number(num), start))
    }

    fn invalid_number(&self, start: usize) -> LexError {
        LexError::InvalidNumber {
            text: self.chars[start..self.pos].iter().collect(),
            pos: self.byte_pos_of(start),
        }
    }

    fn lex_ident(&mut self, start: usize) -> Result<Spanned, LexError> {
        while self
            .peek_at(0)
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        Ok(self.spanned(Token::Ident(text), start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .filter(|t| !matches!(t, Token::EOF))
            .collect()
    }

    #[test]
    fn test_classic_formula() {
        let tokens = lex("t*(t>>5|t>>8)");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("t".into()),
                Token::Star,
                Token::LParen,
                Token::Ident("t".into()),
                Token::Shr,
                Token::Number(5.0),
                Token::Pipe,
                Token::Ident("t".into()),
                Token::Shr,
                Token::Number(8.0),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_longest_operator_wins() {
        let tokens = lex("a>>>=b>>>c>=d**=e**f");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".into()),
                Token::CompoundAssign(AssignOp::UShr),
                Token::Ident("b".into()),
                Token::UShr,
                Token::Ident("c".into()),
                Token::GtEq,
                Token::Ident("d".into()),
                Token::CompoundAssign(AssignOp::Pow),
                Token::Ident("e".into()),
                Token::StarStar,
                Token::Ident("f".into()),
            ]
        );
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(lex("0xFF"), vec![Token::Number(255.0)]);
        assert_eq!(lex("0b101"), vec![Token::Number(5.0)]);
        assert_eq!(lex("0o17"), vec![Token::Number(15.0)]);
        assert_eq!(lex(".5"), vec![Token::Number(0.5)]);
        assert_eq!(lex("1e3"), vec![Token::Number(1000.0)]);
        assert_eq!(lex("2.5e-1"), vec![Token::Number(0.25)]);
    }

    #[test]
    fn test_wide_radix_literals() {
        assert_eq!(lex("0xFFFFFFFFFFFFFFFFFF"), vec![Token::Number(2f64.powi(72))]);
        let wide = format!("0b1{}", "0".repeat(70));
        assert_eq!(lex(&wide), vec![Token::Number(2f64.powi(70))]);
        assert!(matches!(
            Lexer::new("0x").tokenize(),
            Err(LexError::InvalidNumber { .. })
        ));
        assert!(matches!(
            Lexer::new("0b102").tokenize(),
            Err(LexError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_member_dot_after_number() {
        // `a.b` keeps the dot as member access
        assert_eq!(
            lex("Math.PI"),
            vec![Token::Ident("Math".into()), Token::Dot, Token::Ident("PI".into())]
        );
    }

    #[test]
    fn test_comments_are_dropped() {
        let tokens = lex("// intro\nt /* inline */ >> 4");
        assert_eq!(
            tokens,
            vec![Token::Ident("t".into()), Token::Shr, Token::Number(4.0)]
        );
        assert!(lex("// nothing but a comment").is_empty());
    }

    #[test]
    fn test_string_literal() {
        let tokens = lex(r#"'ab\'c'[1]"#);
        assert_eq!(
            tokens,
            vec![
                Token::StringLit("ab'c".into()),
                Token::LBracket,
                Token::Number(1.0),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            Lexer::new("t # 2").tokenize(),
            Err(LexError::UnexpectedChar { ch: '#', pos: 2 })
        ));
        assert!(matches!(
            Lexer::new("'open").tokenize(),
            Err(LexError::UnterminatedString { pos: 0 })
        ));
        assert!(matches!(
            Lexer::new("t /* never closed").tokenize(),
            Err(LexError::UnterminatedComment { pos: 2 })
        ));
        assert!(matches!(
            Lexer::new("12abc").tokenize(),
            Err(LexError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_spans_are_byte_offsets() {
        let tokens = Lexer::new("'é' + t").tokenize().unwrap();
        // 'é' is two bytes in UTF-8, so the quoted literal spans 0..4
        assert_eq!(tokens[0].span, Span::new(0, 4));
        assert_eq!(tokens[2].span, Span::new(7, 8));
    }
}
