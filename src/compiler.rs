//! Expression compiler — resolves a parsed [`Formula`] into a [`Program`].
//!
//! Every name is bound here, once: `t` and `SR`, the math constants and
//! functions (bare or through `Math.`), `int`, and `window`. Whatever is
//! left is a formula global looked up at run time. Calls are restricted to
//! the whitelisted function table, and subtrees built only from literals
//! are folded to constants so the audio thread never recomputes them.

use std::sync::Arc;

use crate::ast::*;
use crate::error::CompileError;
use crate::program::{MathFn, Node, Program, Target};
use crate::value::Value;

// ── Environment ─────────────────────────────────────────────

/// `Math` constants, also visible as bare names.
pub fn math_constant(name: &str) -> Option<f64> {
    use std::f64::consts;
    let value = match name {
        "E" => consts::E,
        "LN2" => consts::LN_2,
        "LN10" => consts::LN_10,
        "LOG2E" => consts::LOG2_E,
        "LOG10E" => consts::LOG10_E,
        "PI" => consts::PI,
        "SQRT1_2" => consts::FRAC_1_SQRT_2,
        "SQRT2" => consts::SQRT_2,
        _ => return None,
    };
    Some(value)
}

/// Global literals formulas may use by name.
fn literal(name: &str) -> Option<Value> {
    let value = match name {
        "true" => Value::from(true),
        "false" => Value::from(false),
        "NaN" => Value::Number(f64::NAN),
        "Infinity" => Value::Number(f64::INFINITY),
        "undefined" => Value::Undefined,
        _ => return None,
    };
    Some(value)
}

/// Names formulas may read but never assign.
fn is_reserved(name: &str) -> bool {
    matches!(name, "SR" | "Math" | "window")
        || math_constant(name).is_some()
        || MathFn::from_name(name).is_some()
        || literal(name).is_some()
}

// ── Compiler ────────────────────────────────────────────────

/// Compile formula text into a program with `SR` bound to `sample_rate`.
///
/// Empty formulas and formulas made only of comments compile to the
/// constant `0`.
pub fn compile(source: &str, sample_rate: f64) -> Result<Program, CompileError> {
    let formula = crate::parse(source)?;
    compile_formula(&formula, source, sample_rate)
}

pub fn compile_formula(
    formula: &Formula,
    source: &str,
    sample_rate: f64,
) -> Result<Program, CompileError> {
    let ctx = CompileCtx { sample_rate };
    let root = match &formula.body {
        Some(expr) => ctx.expr(expr)?,
        None => Node::Const(Value::Number(0.0)),
    };
    Ok(Program::new(source, sample_rate, root))
}

struct CompileCtx {
    sample_rate: f64,
}

impl CompileCtx {
    fn expr(&self, expr: &Expr) -> Result<Node, CompileError> {
        let node = match &expr.kind {
            ExprKind::Number(n) => Node::Const(Value::Number(*n)),
            ExprKind::StringLit(s) => Node::Const(Value::Str(s.as_str().into())),
            ExprKind::Identifier(name) => self.identifier(name),
            ExprKind::Array(items) => Node::Array(self.list(items)?),
            ExprKind::Unary { op, operand } => Node::Unary(*op, Box::new(self.expr(operand)?)),
            ExprKind::Binary { op, lhs, rhs } => {
                Node::Binary(*op, Box::new(self.expr(lhs)?), Box::new(self.expr(rhs)?))
            }
            ExprKind::Logical { op, lhs, rhs } => {
                Node::Logical(*op, Box::new(self.expr(lhs)?), Box::new(self.expr(rhs)?))
            }
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => Node::Conditional(
                Box::new(self.expr(cond)?),
                Box::new(self.expr(then)?),
                Box::new(self.expr(otherwise)?),
            ),
            ExprKind::Assign { op, target, value } => Node::Assign {
                target: self.target(target)?,
                op: op.map(BinaryOp::from),
                value: Box::new(self.expr(value)?),
            },
            ExprKind::Update {
                increment,
                prefix,
                target,
            } => Node::Update {
                target: self.target(target)?,
                increment: *increment,
                prefix: *prefix,
            },
            ExprKind::Sequence(items) => {
                let mut nodes = self.list(items)?;
                // Leading constants have no effect; only the tail matters.
                let last = nodes.pop();
                nodes.retain(|n| !n.is_const());
                match last {
                    Some(last) if nodes.is_empty() => last,
                    Some(last) => {
                        nodes.push(last);
                        Node::Sequence(nodes)
                    }
                    None => Node::Const(Value::Undefined),
                }
            }
            ExprKind::Call { callee, args } => self.call(callee, args)?,
            ExprKind::Index { object, index } => {
                Node::Index(Box::new(self.expr(object)?), Box::new(self.expr(index)?))
            }
            ExprKind::Member { object, property } => self.member(object, property)?,
        };
        Ok(fold(node))
    }

    fn list(&self, items: &[Expr]) -> Result<Vec<Node>, CompileError> {
        items.iter().map(|e| self.expr(e)).collect()
    }

    fn identifier(&self, name: &str) -> Node {
        match name {
            "t" => Node::Time,
            "SR" => Node::Const(Value::Number(self.sample_rate)),
            "window" => Node::Const(Value::Str("[object Window]".into())),
            "Math" => Node::Const(Value::Str("[object Math]".into())),
            _ => {
                if let Some(c) = math_constant(name) {
                    Node::Const(Value::Number(c))
                } else if let Some(v) = literal(name) {
                    Node::Const(v)
                } else if MathFn::from_name(name).is_some() {
                    // A function used as a value: numerically NaN
                    Node::Const(Value::Number(f64::NAN))
                } else {
                    Node::Global(Arc::from(name))
                }
            }
        }
    }

    fn member(&self, object: &Expr, property: &str) -> Result<Node, CompileError> {
        match &object.kind {
            ExprKind::Identifier(name) if name == "Math" => {
                let node = if let Some(c) = math_constant(property) {
                    Node::Const(Value::Number(c))
                } else if MathFn::from_math_name(property).is_some() {
                    Node::Const(Value::Number(f64::NAN))
                } else {
                    Node::Const(Value::Undefined)
                };
                Ok(node)
            }
            ExprKind::Identifier(name) if name == "window" => {
                Ok(Node::WindowProperty(Arc::from(property)))
            }
            _ => Ok(Node::Property(Box::new(self.expr(object)?), Arc::from(property))),
        }
    }

    fn target(&self, target: &Expr) -> Result<Target, CompileError> {
        let invalid = || CompileError::InvalidAssignment {
            target: target.describe(),
            span: target.span,
        };
        match &target.kind {
            ExprKind::Identifier(name) if name == "t" => Ok(Target::Time),
            ExprKind::Identifier(name) if is_reserved(name) => Err(invalid()),
            ExprKind::Identifier(name) => Ok(Target::Global(Arc::from(name.as_str()))),
            ExprKind::Member { object, property } => match &object.kind {
                ExprKind::Identifier(name) if name == "window" => {
                    Ok(Target::Global(Arc::from(property.as_str())))
                }
                _ => Err(invalid()),
            },
            _ => Err(invalid()),
        }
    }

    fn call(&self, callee: &Expr, args: &[Expr]) -> Result<Node, CompileError> {
        let unknown = |name: &str| CompileError::UnknownFunction {
            name: name.to_string(),
            span: callee.span,
        };
        match &callee.kind {
            ExprKind::Identifier(name) => match MathFn::from_name(name) {
                Some(f) => Ok(Node::Call(f, self.list(args)?)),
                None => Err(unknown(name)),
            },
            ExprKind::Member { object, property } => match &object.kind {
                ExprKind::Identifier(name) if name == "Math" => {
                    match MathFn::from_math_name(property) {
                        Some(f) => Ok(Node::Call(f, self.list(args)?)),
                        None => Err(unknown(&format!("Math.{property}"))),
                    }
                }
                _ if property == "charCodeAt" => {
                    let mut args = self.list(args)?;
                    let index = if args.is_empty() {
                        Node::Const(Value::Number(0.0))
                    } else {
                        args.swap_remove(0)
                    };
                    Ok(Node::CharCodeAt(
                        Box::new(self.expr(object)?),
                        Box::new(index),
                    ))
                }
                _ => Err(unknown(property)),
            },
            _ => Err(CompileError::NotCallable { span: callee.span }),
        }
    }
}

/// Replace `node` with its value when every input is already constant.
/// Nodes whose evaluation would fail are left alone so the failure
/// surfaces at run time, where it is reported.
fn fold(node: Node) -> Node {
    let foldable = match &node {
        Node::Array(items) => items.iter().all(Node::is_const),
        Node::Unary(_, operand) => operand.is_const(),
        Node::Binary(_, lhs, rhs) | Node::Index(lhs, rhs) | Node::CharCodeAt(lhs, rhs) => {
            lhs.is_const() && rhs.is_const()
        }
        Node::Logical(_, lhs, _) | Node::Conditional(lhs, _, _) => lhs.is_const(),
        Node::Call(f, args) => f.is_pure() && args.iter().all(Node::is_const),
        Node::Property(object, _) => object.is_const(),
        _ => false,
    };
    if !foldable {
        return node;
    }

    match node {
        // Only the condition is known; keep whichever branch survives.
        Node::Logical(op, lhs, rhs) => {
            let l = match *lhs {
                Node::Const(l) => l,
                other => return Node::Logical(op, Box::new(other), rhs),
            };
            let short_circuit = match op {
                LogicalOp::And => !l.truthy(),
                LogicalOp::Or => l.truthy(),
                LogicalOp::Nullish => !matches!(l, Value::Undefined),
            };
            if short_circuit { Node::Const(l) } else { *rhs }
        }
        Node::Conditional(cond, then, otherwise) => {
            let c = match *cond {
                Node::Const(c) => c,
                other => return Node::Conditional(Box::new(other), then, otherwise),
            };
            if c.truthy() { *then } else { *otherwise }
        }
        other => match other.eval_const() {
            Ok(value) => Node::Const(value),
            Err(_) => other,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;
    use crate::program::Scope;

    fn run(src: &str, t: u32) -> Value {
        let program = compile(src, 8000.0).expect("compile failed");
        program.eval(t, &mut Scope::new()).expect("eval failed")
    }

    fn num(src: &str, t: u32) -> f64 {
        run(src, t).to_number()
    }

    #[test]
    fn empty_and_comment_only_formulas_are_zero() {
        assert_eq!(num("", 5), 0.0);
        assert_eq!(num("   \n", 5), 0.0);
        assert_eq!(num("// nothing here", 5), 0.0);
        assert_eq!(num("/* block */", 5), 0.0);
    }

    #[test]
    fn classic_formulas() {
        assert_eq!(num("t", 1234), 1234.0);
        assert_eq!(num("t*(t>>5|t>>8)", 1000), (1000 * (1000 >> 5 | 1000 >> 8)) as f64);
        assert_eq!(num("t&t>>8", 0x1234), (0x1234 & (0x1234 >> 8)) as f64);
        assert_eq!(
            num("(t*5&t>>7)|(t*3&t>>10)", 70000),
            ((70000 * 5 & 70000 >> 7) | (70000 * 3 & 70000 >> 10)) as f64
        );
    }

    #[test]
    fn sample_rate_is_bound() {
        let program = compile("SR", 11025.0).unwrap();
        assert_eq!(program.sample_rate(), 11025.0);
        assert!(program.is_constant());
        assert_eq!(program.eval(0, &mut Scope::new()), Ok(Value::Number(11025.0)));
    }

    #[test]
    fn math_names_bare_and_qualified() {
        assert_eq!(num("PI", 0), std::f64::consts::PI);
        assert_eq!(num("Math.PI", 0), std::f64::consts::PI);
        assert_eq!(num("sin(0)+cos(0)", 0), 1.0);
        assert_eq!(num("Math.floor(t/3)", 10), 3.0);
        assert_eq!(num("int(-7.9)", 0), -7.0);
        assert_eq!(num("max(1,t,3)", 9), 9.0);
    }

    #[test]
    fn literal_subtrees_fold() {
        let program = compile("(1+2)*PI", 8000.0).unwrap();
        assert!(program.is_constant());
        let program = compile("[1,2,3][t%3]", 8000.0).unwrap();
        assert!(!program.is_constant());
        assert_eq!(program.eval(4, &mut Scope::new()), Ok(Value::Number(2.0)));
        // random() must stay live
        assert!(!compile("random()", 8000.0).unwrap().is_constant());
    }

    #[test]
    fn stereo_array_results() {
        let program = compile("[t, t*2]", 8000.0).unwrap();
        assert_eq!(program.frame(3, &mut Scope::new()), Ok((3.0, 6.0)));
    }

    #[test]
    fn globals_persist_in_scope() {
        let program = compile("a=(typeof_a_never_read=1, t>>4), a+1", 8000.0).unwrap();
        let mut scope = Scope::new();
        assert_eq!(program.eval(32, &mut scope), Ok(Value::Number(3.0)));
        assert_eq!(scope.get("a"), Some(&Value::Number(2.0)));

        let counter = compile("n = (window.n || 0) + 1", 8000.0).unwrap();
        let mut scope = Scope::new();
        for _ in 0..3 {
            counter.eval(0, &mut scope).unwrap();
        }
        assert_eq!(scope.get("n"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn time_assignment_is_local() {
        let program = compile("t=t*2, t", 8000.0).unwrap();
        let mut scope = Scope::new();
        assert_eq!(program.eval(5, &mut scope), Ok(Value::Number(10.0)));
        assert!(scope.is_empty());
    }

    #[test]
    fn update_and_compound_assignment() {
        let program = compile("x=1, x+=t, x<<=1, y=x++, [x, y]", 8000.0).unwrap();
        assert_eq!(program.frame(2, &mut Scope::new()), Ok((7.0, 6.0)));
    }

    #[test]
    fn string_melody_lookup() {
        let program = compile("'AZ'.charCodeAt(t>>1&1)", 8000.0).unwrap();
        let mut scope = Scope::new();
        assert_eq!(program.eval(0, &mut scope), Ok(Value::Number(65.0)));
        assert_eq!(program.eval(2, &mut scope), Ok(Value::Number(90.0)));
        assert_eq!(num("'hello'.length", 0), 5.0);
    }

    #[test]
    fn non_numeric_results_coerce_without_error() {
        assert!(num("'abc'", 0).is_nan());
        assert!(num("undefined", 0).is_nan());
        assert_eq!(num("'12'", 0), 12.0);
    }

    #[test]
    fn undefined_global_is_a_runtime_error() {
        let program = compile("t + bogus", 8000.0).unwrap();
        assert_eq!(
            program.eval(0, &mut Scope::new()),
            Err(EvalError::Undefined("bogus".into()))
        );
        // `window.` reads are lenient
        assert!(num("window.bogus", 0).is_nan());
    }

    #[test]
    fn reading_from_undefined_fails_at_run_time() {
        let program = compile("undefined[t]", 8000.0).unwrap();
        assert!(!program.is_constant());
        assert!(matches!(
            program.eval(0, &mut Scope::new()),
            Err(EvalError::ReadOfUndefined { .. })
        ));
    }

    #[test]
    fn compile_errors() {
        assert!(matches!(compile("t>>", 8000.0), Err(CompileError::Parse(_))));
        assert!(matches!(compile("t # 1", 8000.0), Err(CompileError::Lex(_))));
        assert!(matches!(
            compile("fetch(t)", 8000.0),
            Err(CompileError::UnknownFunction { ref name, .. }) if name == "fetch"
        ));
        assert!(matches!(
            compile("Math.bogus(t)", 8000.0),
            Err(CompileError::UnknownFunction { .. })
        ));
        assert!(matches!(
            compile("SR = 3", 8000.0),
            Err(CompileError::InvalidAssignment { .. })
        ));
        assert!(matches!(
            compile("sin = 3", 8000.0),
            Err(CompileError::InvalidAssignment { .. })
        ));
        assert!(matches!(
            compile("[t](1)", 8000.0),
            Err(CompileError::NotCallable { .. })
        ));
        assert!(matches!(
            compile("1 = 2", 8000.0),
            Err(CompileError::InvalidAssignment { .. })
        ));
    }

    #[test]
    fn conditional_and_logical() {
        assert_eq!(num("t>4?1:2", 5), 1.0);
        assert_eq!(num("t>4?1:2", 3), 2.0);
        assert_eq!(num("t&&7", 0), 0.0);
        assert_eq!(num("t||7", 0), 7.0);
        assert_eq!(num("undefined??9", 0), 9.0);
        assert_eq!(num("0??9", 0), 0.0);
    }
}
