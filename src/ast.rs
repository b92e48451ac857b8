use serde::{Deserialize, Serialize};

use crate::token::{AssignOp, Span};

/// A parsed formula: a single (possibly comma-sequenced) expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Formula {
    /// `None` when the source held nothing but whitespace and comments.
    pub body: Option<Expr>,
}

/// An expression node with the source range it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    #[serde(skip, default = "empty_span")]
    pub span: Span,
    /// Nodes on the longest path from here to a leaf, this one included.
    #[serde(skip)]
    height: usize,
}

fn empty_span() -> Span {
    Span::new(0, 0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    Number(f64),
    StringLit(String),
    Identifier(String),
    Array(Vec<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// `target = value` or `target op= value`.
    Assign {
        op: Option<AssignOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `++x`, `x--`, ...
    Update {
        increment: bool,
        prefix: bool,
        target: Box<Expr>,
    },
    /// `a, b, c`: evaluates all, yields the last.
    Sequence(Vec<Expr>),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Shl,
    Shr,
    UShr,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

impl From<AssignOp> for BinaryOp {
    fn from(op: AssignOp) -> Self {
        match op {
            AssignOp::Add => BinaryOp::Add,
            AssignOp::Sub => BinaryOp::Sub,
            AssignOp::Mul => BinaryOp::Mul,
            AssignOp::Div => BinaryOp::Div,
            AssignOp::Rem => BinaryOp::Rem,
            AssignOp::Pow => BinaryOp::Pow,
            AssignOp::Shl => BinaryOp::Shl,
            AssignOp::Shr => BinaryOp::Shr,
            AssignOp::UShr => BinaryOp::UShr,
            AssignOp::And => BinaryOp::BitAnd,
            AssignOp::Or => BinaryOp::BitOr,
            AssignOp::Xor => BinaryOp::BitXor,
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        let height = 1 + kind.child_height();
        Expr { kind, span, height }
    }

    /// Depth of the tree rooted here. Compiling and evaluating recurse once
    /// per level, so the parser bounds this.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Short human-readable rendering of an assignment target, for errors.
    pub fn describe(&self) -> String {
        match &self.kind {
            ExprKind::Identifier(name) => name.clone(),
            ExprKind::Member { object, property } => format!("{}.{property}", object.describe()),
            ExprKind::Number(n) => format!("{n}"),
            ExprKind::StringLit(s) => format!("\"{s}\""),
            ExprKind::Call { callee, .. } => format!("{}(...)", callee.describe()),
            ExprKind::Index { object, .. } => format!("{}[...]", object.describe()),
            _ => "expression".into(),
        }
    }
}

impl ExprKind {
    fn child_height(&self) -> usize {
        let tallest = |items: &[Expr]| items.iter().map(Expr::height).max().unwrap_or(0);
        match self {
            ExprKind::Number(_) | ExprKind::StringLit(_) | ExprKind::Identifier(_) => 0,
            ExprKind::Array(items) | ExprKind::Sequence(items) => tallest(items),
            ExprKind::Unary { operand, .. } => operand.height,
            ExprKind::Binary { lhs, rhs, .. } | ExprKind::Logical { lhs, rhs, .. } => {
                lhs.height.max(rhs.height)
            }
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => cond.height.max(then.height).max(otherwise.height),
            ExprKind::Assign { target, value, .. } => target.height.max(value.height),
            ExprKind::Update { target, .. } => target.height,
            ExprKind::Call { callee, args } => callee.height.max(tallest(args)),
            ExprKind::Index { object, index } => object.height.max(index.height),
            ExprKind::Member { object, .. } => object.height,
        }
    }
}
