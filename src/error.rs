use crate::token::{Span, Token, token_to_string};
use ariadne::{Config, IndexType, Label, Report, ReportKind, Source};
use std::fmt;

/// Everything that can stop a formula from becoming a runnable program.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    Lex(LexError),
    Parse(ParseError),
    /// A call to a name outside the whitelisted function table.
    UnknownFunction { name: String, span: Span },
    /// Assignment to something that is not `t`, a global, or `window.name`.
    InvalidAssignment { target: String, span: Span },
    /// A call whose callee is not a plain function name.
    NotCallable { span: Span },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LexError {
    UnexpectedChar { ch: char, pos: usize },
    UnterminatedString { pos: usize },
    UnterminatedComment { pos: usize },
    InvalidNumber { text: String, pos: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    UnexpectedToken {
        expected: String,
        found: Token,
        span: Span,
    },
    UnexpectedEOF {
        expected: String,
        pos: usize,
    },
    TooDeep {
        span: Span,
    },
}

/// A failure raised while a compiled program was running.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Read of a global that was never assigned.
    Undefined(String),
    /// Index or member read on `undefined`.
    ReadOfUndefined { property: String },
    /// A string method invoked on something that is not a string.
    NotAFunction { method: String },
}

/// An [`EvalError`] tagged with the emulated time it happened at.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub time: u32,
    pub cause: EvalError,
}

/// Why an offline render did not produce audio.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    Compile(CompileError),
    /// Not a number, or longer than the render limit.
    Duration { seconds: f64 },
    /// Output rate of zero or above the supported maximum.
    Rate { rate: u32 },
    /// More sample data than a WAV file can describe.
    TooLarge { samples: usize },
}

impl RenderError {
    /// Annotated report for compile failures, the plain message otherwise.
    pub fn report(&self, source: &str) -> String {
        match self {
            RenderError::Compile(e) => e.report(source),
            other => other.to_string(),
        }
    }
}

impl CompileError {
    /// Byte range of the source the error points at.
    pub fn span(&self) -> Span {
        match self {
            CompileError::Lex(e) => match e {
                LexError::UnexpectedChar { ch, pos } => Span::new(*pos, *pos + ch.len_utf8()),
                LexError::UnterminatedString { pos }
                | LexError::UnterminatedComment { pos } => Span::new(*pos, *pos + 1),
                LexError::InvalidNumber { text, pos } => Span::new(*pos, *pos + text.len()),
            },
            CompileError::Parse(e) => match e {
                ParseError::UnexpectedToken { span, .. } | ParseError::TooDeep { span } => *span,
                ParseError::UnexpectedEOF { pos, .. } => Span::new(*pos, *pos),
            },
            CompileError::UnknownFunction { span, .. }
            | CompileError::InvalidAssignment { span, .. }
            | CompileError::NotCallable { span } => *span,
        }
    }

    /// Render an annotated, uncoloured diagnostic against the formula text.
    pub fn report(&self, source: &str) -> String {
        let span = self.span();
        let start = span.start.min(source.len());
        let end = span.end.clamp(start, source.len());
        let range = match (start == end, end < source.len()) {
            (true, true) => start..end + 1,
            (true, false) if start > 0 => start - 1..end,
            _ => start..end,
        };

        let mut buf = Vec::new();
        let written = Report::build(ReportKind::Error, range.clone())
            .with_config(
                Config::default()
                    .with_color(false)
                    .with_index_type(IndexType::Byte),
            )
            .with_message(self.to_string())
            .with_label(Label::new(range).with_message(self.label()))
            .finish()
            .write(Source::from(source), &mut buf);

        match written {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => self.to_string(),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            CompileError::Lex(_) => "cannot read this",
            CompileError::Parse(ParseError::TooDeep { .. }) => "nested too deeply",
            CompileError::Parse(_) => "unexpected here",
            CompileError::UnknownFunction { .. } => "not a known function",
            CompileError::InvalidAssignment { .. } => "cannot assign to this",
            CompileError::NotCallable { .. } => "not callable",
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Lex(e) => write!(f, "Lexer error: {e}"),
            CompileError::Parse(e) => write!(f, "Parse error: {e}"),
            CompileError::UnknownFunction { name, span } => {
                write!(f, "Unknown function '{name}' at pos {}", span.start)
            }
            CompileError::InvalidAssignment { target, span } => {
                write!(f, "Invalid assignment target '{target}' at pos {}", span.start)
            }
            CompileError::NotCallable { span } => {
                write!(f, "Expression at pos {} is not callable", span.start)
            }
        }
    }
}

impl std::error::Error for CompileError {}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::UnexpectedChar { ch, pos } => write!(f, "Unexpected char '{ch}' at pos {pos}"),
            LexError::UnterminatedString { pos } => write!(f, "Unterminated string at pos {pos}"),
            LexError::UnterminatedComment { pos } => write!(f, "Unterminated comment at pos {pos}"),
            LexError::InvalidNumber { text, pos } => write!(f, "Invalid number '{text}' at pos {pos}"),
        }
    }
}

impl std::error::Error for LexError {}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedToken { expected, found, span } => {
                write!(
                    f,
                    "Expected {expected}, found '{}' at pos {}",
                    token_to_string(found),
                    span.start
                )
            }
            ParseError::UnexpectedEOF { expected, .. } => {
                write!(f, "Unexpected end of formula, expected {expected}")
            }
            ParseError::TooDeep { span } => {
                write!(f, "Expression nested too deeply at pos {}", span.start)
            }
        }
    }
}

impl std::error::Error for ParseError {}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Undefined(name) => write!(f, "{name} is not defined"),
            EvalError::ReadOfUndefined { property } => {
                write!(f, "Cannot read properties of undefined (reading '{property}')")
            }
            EvalError::NotAFunction { method } => write!(f, "{method} is not a function"),
        }
    }
}

impl std::error::Error for EvalError {}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at t={})", self.cause, self.time)
    }
}

impl std::error::Error for RuntimeError {}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Compile(e) => write!(f, "{e}"),
            RenderError::Duration { seconds } => write!(f, "Cannot render {seconds} seconds"),
            RenderError::Rate { rate } => write!(f, "Unsupported output rate {rate} Hz"),
            RenderError::TooLarge { samples } => {
                write!(f, "{samples} samples do not fit in a WAV file")
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Compile(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CompileError> for RenderError {
    fn from(e: CompileError) -> Self {
        RenderError::Compile(e)
    }
}

impl From<LexError> for CompileError {
    fn from(e: LexError) -> Self {
        CompileError::Lex(e)
    }
}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError::Parse(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_mentions_time() {
        let err = RuntimeError {
            time: 4096,
            cause: EvalError::Undefined("foo".into()),
        };
        assert_eq!(err.to_string(), "foo is not defined (at t=4096)");
    }

    #[test]
    fn report_points_at_offending_text() {
        let source = "t*bogus(3)";
        let err = CompileError::UnknownFunction {
            name: "bogus".into(),
            span: Span::new(2, 7),
        };
        let report = err.report(source);
        assert!(report.contains("Unknown function 'bogus'"), "got: {report}");
        assert!(report.contains("not a known function"), "got: {report}");
    }

    #[test]
    fn render_error_reports() {
        let err = RenderError::from(CompileError::Lex(LexError::UnexpectedChar { ch: '#', pos: 2 }));
        assert!(err.report("t # 2").contains("Unexpected char '#'"));
        assert_eq!(
            RenderError::Duration { seconds: f64::INFINITY }.report("t"),
            "Cannot render inf seconds"
        );
    }

    #[test]
    fn report_survives_span_past_end() {
        let err = CompileError::Parse(ParseError::UnexpectedEOF {
            expected: "expression".into(),
            pos: 40,
        });
        let report = err.report("t>>");
        assert!(report.contains("Unexpected end of formula"), "got: {report}");
    }
}
