//! Compiled programs and the tree-walking evaluator that runs them.
//!
//! A [`Program`] is immutable once built; all mutable state a formula can
//! touch lives in a [`Scope`] owned by the engine, so swapping programs
//! never loses the formula's globals and a reset can wipe them in one go.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{BinaryOp, LogicalOp, UnaryOp};
use crate::error::EvalError;
use crate::value::{Value, format_number, to_int32};

// ── Scope ───────────────────────────────────────────────────

/// Mutable state shared by every program an engine runs.
#[derive(Debug, Clone)]
pub struct Scope {
    /// Globals introduced by formulas (`a = t >> 4`, `window.x = 1`).
    globals: HashMap<Arc<str>, Value>,
    rng: XorShift,
}

impl Scope {
    pub fn new() -> Self {
        Scope {
            globals: HashMap::new(),
            rng: XorShift::new(0x9E37_79B9_7F4A_7C15),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn set(&mut self, name: &Arc<str>, value: Value) {
        match self.globals.get_mut(name) {
            Some(slot) => *slot = value,
            None => {
                self.globals.insert(Arc::clone(name), value);
            }
        }
    }

    /// Number of globals formulas have introduced.
    pub fn len(&self) -> usize {
        self.globals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.globals.is_empty()
    }

    /// Drop every formula-introduced global.
    pub fn clear(&mut self) {
        self.globals.clear();
    }

    fn random(&mut self) -> f64 {
        self.rng.next_f64()
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

/// xorshift64* generator behind `random()`.
#[derive(Debug, Clone)]
struct XorShift {
    state: u64,
}

impl XorShift {
    fn new(seed: u64) -> Self {
        XorShift { state: seed.max(1) }
    }

    fn next_f64(&mut self) -> f64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        let bits = x.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11;
        bits as f64 / (1u64 << 53) as f64
    }
}

// ── Compiled node tree ──────────────────────────────────────

/// Whitelisted functions callable from formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFn {
    /// `int(x)`: truncation toward zero.
    Int,
    Abs,
    Acos,
    Acosh,
    Asin,
    Asinh,
    Atan,
    Atan2,
    Atanh,
    Cbrt,
    Ceil,
    Clz32,
    Cos,
    Cosh,
    Exp,
    Expm1,
    Floor,
    Fround,
    Hypot,
    Imul,
    Log,
    Log10,
    Log1p,
    Log2,
    Max,
    Min,
    Pow,
    Random,
    Round,
    Sign,
    Sin,
    Sinh,
    Sqrt,
    Tan,
    Tanh,
    Trunc,
}

impl MathFn {
    /// Look up a `Math` function by name. `int` is not part of `Math`.
    pub fn from_math_name(name: &str) -> Option<MathFn> {
        let f = match name {
            "abs" => MathFn::Abs,
            "acos" => MathFn::Acos,
            "acosh" => MathFn::Acosh,
            "asin" => MathFn::Asin,
            "asinh" => MathFn::Asinh,
            "atan" => MathFn::Atan,
            "atan2" => MathFn::Atan2,
            "atanh" => MathFn::Atanh,
            "cbrt" => MathFn::Cbrt,
            "ceil" => MathFn::Ceil,
            "clz32" => MathFn::Clz32,
            "cos" => MathFn::Cos,
            "cosh" => MathFn::Cosh,
            "exp" => MathFn::Exp,
            "expm1" => MathFn::Expm1,
            "floor" => MathFn::Floor,
            "fround" => MathFn::Fround,
            "hypot" => MathFn::Hypot,
            "imul" => MathFn::Imul,
            "log" => MathFn::Log,
            "log10" => MathFn::Log10,
            "log1p" => MathFn::Log1p,
            "log2" => MathFn::Log2,
            "max" => MathFn::Max,
            "min" => MathFn::Min,
            "pow" => MathFn::Pow,
            "random" => MathFn::Random,
            "round" => MathFn::Round,
            "sign" => MathFn::Sign,
            "sin" => MathFn::Sin,
            "sinh" => MathFn::Sinh,
            "sqrt" => MathFn::Sqrt,
            "tan" => MathFn::Tan,
            "tanh" => MathFn::Tanh,
            "trunc" => MathFn::Trunc,
            _ => return None,
        };
        Some(f)
    }

    /// Look up a bare function name as formulas see it: `int` plus `Math`.
    pub fn from_name(name: &str) -> Option<MathFn> {
        match name {
            "int" => Some(MathFn::Int),
            other => MathFn::from_math_name(other),
        }
    }

    /// Whether calls can be evaluated ahead of time.
    pub fn is_pure(self) -> bool {
        self != MathFn::Random
    }

    fn apply(self, args: &[f64], scope: &mut Scope) -> f64 {
        let arg = |i: usize| args.get(i).copied().unwrap_or(f64::NAN);
        let x = arg(0);
        match self {
            MathFn::Int | MathFn::Trunc => x.trunc(),
            MathFn::Abs => x.abs(),
            MathFn::Acos => x.acos(),
            MathFn::Acosh => x.acosh(),
            MathFn::Asin => x.asin(),
            MathFn::Asinh => x.asinh(),
            MathFn::Atan => x.atan(),
            MathFn::Atan2 => x.atan2(arg(1)),
            MathFn::Atanh => x.atanh(),
            MathFn::Cbrt => x.cbrt(),
            MathFn::Ceil => x.ceil(),
            MathFn::Clz32 => f64::from((to_int32(x) as u32).leading_zeros()),
            MathFn::Cos => x.cos(),
            MathFn::Cosh => x.cosh(),
            MathFn::Exp => x.exp(),
            MathFn::Expm1 => x.exp_m1(),
            MathFn::Floor => x.floor(),
            MathFn::Fround => f64::from(x as f32),
            MathFn::Hypot => {
                if args.iter().any(|a| a.is_infinite()) {
                    f64::INFINITY
                } else {
                    args.iter().map(|a| a * a).sum::<f64>().sqrt()
                }
            }
            MathFn::Imul => f64::from(to_int32(x).wrapping_mul(to_int32(arg(1)))),
            MathFn::Log => x.ln(),
            MathFn::Log10 => x.log10(),
            MathFn::Log1p => x.ln_1p(),
            MathFn::Log2 => x.log2(),
            MathFn::Max => args.iter().fold(f64::NEG_INFINITY, |acc, &a| {
                if acc.is_nan() || a.is_nan() { f64::NAN } else { acc.max(a) }
            }),
            MathFn::Min => args.iter().fold(f64::INFINITY, |acc, &a| {
                if acc.is_nan() || a.is_nan() { f64::NAN } else { acc.min(a) }
            }),
            MathFn::Pow => js_pow(x, arg(1)),
            MathFn::Random => scope.random(),
            MathFn::Round => {
                let floor = x.floor();
                if x - floor >= 0.5 { floor + 1.0 } else { floor }
            }
            MathFn::Sign => {
                if x.is_nan() || x == 0.0 { x } else { x.signum() }
            }
            MathFn::Sin => x.sin(),
            MathFn::Sinh => x.sinh(),
            MathFn::Sqrt => x.sqrt(),
            MathFn::Tan => x.tan(),
            MathFn::Tanh => x.tanh(),
        }
    }
}

/// Exponentiation with JavaScript's NaN rules (`1 ** NaN` is `NaN`).
fn js_pow(base: f64, exp: f64) -> f64 {
    if exp.is_nan() || (base.abs() == 1.0 && exp.is_infinite()) {
        f64::NAN
    } else {
        base.powf(exp)
    }
}

/// Something a formula may assign to.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// The invocation-local time variable.
    Time,
    Global(Arc<str>),
}

/// Resolved expression tree. Names are bound at compile time, so the
/// evaluator never consults a symbol table except for formula globals.
#[derive(Debug, Clone)]
pub enum Node {
    Const(Value),
    Time,
    /// A formula global; reading one that was never set is an error.
    Global(Arc<str>),
    /// `window.name`; reading an unset one yields `undefined`.
    WindowProperty(Arc<str>),
    Array(Vec<Node>),
    Unary(UnaryOp, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Logical(LogicalOp, Box<Node>, Box<Node>),
    Conditional(Box<Node>, Box<Node>, Box<Node>),
    Assign {
        target: Target,
        op: Option<BinaryOp>,
        value: Box<Node>,
    },
    Update {
        target: Target,
        increment: bool,
        prefix: bool,
    },
    Sequence(Vec<Node>),
    Call(MathFn, Vec<Node>),
    CharCodeAt(Box<Node>, Box<Node>),
    Index(Box<Node>, Box<Node>),
    Property(Box<Node>, Arc<str>),
}

/// Per-invocation state: just the (assignable) time variable.
struct Frame {
    t: f64,
}

impl Node {
    pub fn is_const(&self) -> bool {
        matches!(self, Node::Const(_))
    }

    fn eval(&self, frame: &mut Frame, scope: &mut Scope) -> Result<Value, EvalError> {
        match self {
            Node::Const(v) => Ok(v.clone()),
            Node::Time => Ok(Value::Number(frame.t)),
            Node::Global(name) => scope
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::Undefined(name.to_string())),
            Node::WindowProperty(name) => Ok(scope.get(name).cloned().unwrap_or(Value::Undefined)),
            Node::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| item.eval(frame, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(Arc::from(values)))
            }
            Node::Unary(op, operand) => {
                let v = operand.eval(frame, scope)?;
                Ok(unary(*op, &v))
            }
            Node::Binary(op, lhs, rhs) => {
                let l = lhs.eval(frame, scope)?;
                let r = rhs.eval(frame, scope)?;
                Ok(binary(*op, &l, &r))
            }
            Node::Logical(op, lhs, rhs) => {
                let l = lhs.eval(frame, scope)?;
                let short_circuit = match op {
                    LogicalOp::And => !l.truthy(),
                    LogicalOp::Or => l.truthy(),
                    LogicalOp::Nullish => !matches!(l, Value::Undefined),
                };
                if short_circuit { Ok(l) } else { rhs.eval(frame, scope) }
            }
            Node::Conditional(cond, then, otherwise) => {
                if cond.eval(frame, scope)?.truthy() {
                    then.eval(frame, scope)
                } else {
                    otherwise.eval(frame, scope)
                }
            }
            Node::Assign { target, op, value } => {
                let rhs = value.eval(frame, scope)?;
                let result = match op {
                    Some(op) => binary(*op, &read_target(target, frame, scope)?, &rhs),
                    None => rhs,
                };
                write_target(target, result.clone(), frame, scope);
                Ok(result)
            }
            Node::Update {
                target,
                increment,
                prefix,
            } => {
                let old = read_target(target, frame, scope)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                write_target(target, Value::Number(new), frame, scope);
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Node::Sequence(items) => {
                let mut last = Value::Undefined;
                for item in items {
                    last = item.eval(frame, scope)?;
                }
                Ok(last)
            }
            Node::Call(f, args) => {
                // Every whitelisted function takes at most a handful of
                // arguments; keep short calls off the heap.
                let mut inline = [0.0_f64; 4];
                if args.len() <= inline.len() {
                    for (slot, arg) in inline.iter_mut().zip(args) {
                        *slot = arg.eval(frame, scope)?.to_number();
                    }
                    Ok(Value::Number(f.apply(&inline[..args.len()], scope)))
                } else {
                    let values = args
                        .iter()
                        .map(|a| a.eval(frame, scope).map(|v| v.to_number()))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(Value::Number(f.apply(&values, scope)))
                }
            }
            Node::CharCodeAt(object, index) => {
                let object = object.eval(frame, scope)?;
                let index = index.eval(frame, scope)?.to_number();
                char_code_at(&object, index)
            }
            Node::Index(object, index) => {
                let object = object.eval(frame, scope)?;
                let index = index.eval(frame, scope)?;
                index_value(&object, &index)
            }
            Node::Property(object, name) => {
                let object = object.eval(frame, scope)?;
                property(&object, name)
            }
        }
    }

    /// Evaluate straight into raw `(left, right)`. Two-element array
    /// literals, also as the tail of a sequence or a conditional branch,
    /// never build an array value.
    fn frame(&self, frame: &mut Frame, scope: &mut Scope) -> Result<(f64, f64), EvalError> {
        match self {
            Node::Array(items) if items.len() == 2 => {
                let left = items[0].eval(frame, scope)?.to_number();
                let right = items[1].eval(frame, scope)?.to_number();
                Ok((left, right))
            }
            Node::Sequence(items) => match items.split_last() {
                Some((last, init)) => {
                    for item in init {
                        item.eval(frame, scope)?;
                    }
                    last.frame(frame, scope)
                }
                None => Ok(stereo(&Value::Undefined)),
            },
            Node::Conditional(cond, then, otherwise) => {
                if cond.eval(frame, scope)?.truthy() {
                    then.frame(frame, scope)
                } else {
                    otherwise.frame(frame, scope)
                }
            }
            other => Ok(stereo(&other.eval(frame, scope)?)),
        }
    }

    /// Evaluate a node that references neither time nor globals.
    pub(crate) fn eval_const(&self) -> Result<Value, EvalError> {
        self.eval(&mut Frame { t: 0.0 }, &mut Scope::new())
    }
}

fn read_target(target: &Target, frame: &Frame, scope: &Scope) -> Result<Value, EvalError> {
    match target {
        Target::Time => Ok(Value::Number(frame.t)),
        Target::Global(name) => scope
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::Undefined(name.to_string())),
    }
}

fn write_target(target: &Target, value: Value, frame: &mut Frame, scope: &mut Scope) {
    match target {
        Target::Time => frame.t = value.to_number(),
        Target::Global(name) => scope.set(name, value),
    }
}

fn unary(op: UnaryOp, v: &Value) -> Value {
    match op {
        UnaryOp::Neg => Value::Number(-v.to_number()),
        UnaryOp::Plus => Value::Number(v.to_number()),
        UnaryOp::Not => Value::from(!v.truthy()),
        UnaryOp::BitNot => Value::Number(f64::from(!v.to_int32())),
    }
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    let num = |f: fn(f64, f64) -> f64| Value::Number(f(l.to_number(), r.to_number()));
    let shift = || r.to_uint32() & 31;
    match op {
        BinaryOp::Add => {
            let concat = |v: &Value| matches!(v, Value::Str(_) | Value::Array(_));
            if concat(l) || concat(r) {
                let mut s = l.to_js_string();
                s.push_str(&r.to_js_string());
                Value::Str(s.into())
            } else {
                num(|a, b| a + b)
            }
        }
        BinaryOp::Sub => num(|a, b| a - b),
        BinaryOp::Mul => num(|a, b| a * b),
        BinaryOp::Div => num(|a, b| a / b),
        BinaryOp::Rem => num(|a, b| a % b),
        BinaryOp::Pow => num(js_pow),
        BinaryOp::Shl => Value::Number(f64::from(l.to_int32().wrapping_shl(shift()))),
        BinaryOp::Shr => Value::Number(f64::from(l.to_int32() >> shift())),
        BinaryOp::UShr => Value::Number(f64::from(l.to_uint32() >> shift())),
        BinaryOp::BitAnd => Value::Number(f64::from(l.to_int32() & r.to_int32())),
        BinaryOp::BitOr => Value::Number(f64::from(l.to_int32() | r.to_int32())),
        BinaryOp::BitXor => Value::Number(f64::from(l.to_int32() ^ r.to_int32())),
        BinaryOp::Eq => Value::from(l.loose_eq(r)),
        BinaryOp::NotEq => Value::from(!l.loose_eq(r)),
        BinaryOp::StrictEq => Value::from(l.strict_eq(r)),
        BinaryOp::StrictNotEq => Value::from(!l.strict_eq(r)),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            Value::from(compare(op, l, r))
        }
    }
}

fn compare(op: BinaryOp, l: &Value, r: &Value) -> bool {
    if let (Value::Str(a), Value::Str(b)) = (l, r) {
        let (a, b) = (a.encode_utf16(), b.encode_utf16());
        let ord = a.cmp(b);
        return match op {
            BinaryOp::Lt => ord.is_lt(),
            BinaryOp::LtEq => ord.is_le(),
            BinaryOp::Gt => ord.is_gt(),
            _ => ord.is_ge(),
        };
    }
    let (a, b) = (l.to_number(), r.to_number());
    match op {
        BinaryOp::Lt => a < b,
        BinaryOp::LtEq => a <= b,
        BinaryOp::Gt => a > b,
        _ => a >= b,
    }
}

/// Integer index into a string or array, if `n` is one.
fn as_index(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0 && n < usize::MAX as f64).then_some(n as usize)
}

fn index_value(object: &Value, index: &Value) -> Result<Value, EvalError> {
    if let Value::Str(key) = index {
        if &**key == "length" {
            return property(object, key);
        }
    }
    let position = match index {
        Value::Str(key) => as_index(crate::value::parse_number(key)),
        other => as_index(other.to_number()),
    };
    match object {
        Value::Undefined => Err(EvalError::ReadOfUndefined {
            property: index.to_js_string(),
        }),
        Value::Array(items) => Ok(position
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Undefined)),
        Value::Str(s) => Ok(position
            .and_then(|i| s.encode_utf16().nth(i))
            .map_or(Value::Undefined, |unit| {
                Value::Str(String::from_utf16_lossy(&[unit]).into())
            })),
        Value::Number(_) => Ok(Value::Undefined),
    }
}

fn property(object: &Value, name: &str) -> Result<Value, EvalError> {
    match object {
        Value::Undefined => Err(EvalError::ReadOfUndefined {
            property: name.to_string(),
        }),
        _ if name == "length" => Ok(object
            .length()
            .map_or(Value::Undefined, |n| Value::Number(n as f64))),
        _ => Ok(Value::Undefined),
    }
}

fn char_code_at(object: &Value, index: f64) -> Result<Value, EvalError> {
    match object {
        Value::Str(s) => {
            let index = if index.is_nan() { 0.0 } else { index.trunc() };
            let code = as_index(index)
                .and_then(|i| s.encode_utf16().nth(i))
                .map_or(f64::NAN, f64::from);
            Ok(Value::Number(code))
        }
        Value::Undefined => Err(EvalError::ReadOfUndefined {
            property: "charCodeAt".into(),
        }),
        other => Err(EvalError::NotAFunction {
            method: format!("{}.charCodeAt", describe(other)),
        }),
    }
}

fn describe(v: &Value) -> String {
    match v {
        Value::Number(n) => format_number(*n),
        Value::Array(_) => "array".into(),
        other => other.to_js_string(),
    }
}

// ── Program ─────────────────────────────────────────────────

/// A compiled formula, ready to be evaluated once per emulated sample.
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    sample_rate: f64,
    root: Node,
}

impl Program {
    pub(crate) fn new(source: &str, sample_rate: f64, root: Node) -> Self {
        Program {
            source: source.to_string(),
            sample_rate,
            root,
        }
    }

    /// The constant-zero program engines start with.
    pub fn silence() -> Self {
        Program {
            source: "0".into(),
            sample_rate: 8000.0,
            root: Node::Const(Value::Number(0.0)),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The `SR` value this program was compiled against.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// True when the whole formula folded to a single value.
    pub fn is_constant(&self) -> bool {
        self.root.is_const()
    }

    /// Evaluate the formula at time `t`.
    pub fn eval(&self, t: u32, scope: &mut Scope) -> Result<Value, EvalError> {
        let mut frame = Frame { t: f64::from(t) };
        self.root.eval(&mut frame, scope)
    }

    /// Evaluate and split into raw `(left, right)` numbers. Array results
    /// are stereo; anything else drives both channels.
    pub fn frame(&self, t: u32, scope: &mut Scope) -> Result<(f64, f64), EvalError> {
        let mut frame = Frame { t: f64::from(t) };
        self.root.frame(&mut frame, scope)
    }
}

/// Split a formula result into left/right raw values.
pub fn stereo(value: &Value) -> (f64, f64) {
    match value {
        Value::Array(items) => {
            let channel = |i: usize| items.get(i).map_or(f64::NAN, Value::to_number);
            (channel(0), channel(1))
        }
        other => {
            let n = other.to_number();
            (n, n)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xorshift_stays_in_unit_interval() {
        let mut rng = XorShift::new(1);
        for _ in 0..10_000 {
            let x = rng.next_f64();
            assert!((0.0..1.0).contains(&x), "out of range: {x}");
        }
    }

    #[test]
    fn math_edge_cases() {
        let mut scope = Scope::new();
        assert_eq!(MathFn::Round.apply(&[-2.5], &mut scope), -2.0);
        assert_eq!(MathFn::Round.apply(&[2.5], &mut scope), 3.0);
        assert_eq!(MathFn::Int.apply(&[-3.7], &mut scope), -3.0);
        assert_eq!(MathFn::Clz32.apply(&[1.0], &mut scope), 31.0);
        assert_eq!(MathFn::Imul.apply(&[65536.0, 65536.0], &mut scope), 0.0);
        assert_eq!(MathFn::Max.apply(&[], &mut scope), f64::NEG_INFINITY);
        assert!(MathFn::Max.apply(&[1.0, f64::NAN], &mut scope).is_nan());
        assert_eq!(MathFn::Min.apply(&[3.0, -1.0, 2.0], &mut scope), -1.0);
        assert_eq!(MathFn::Hypot.apply(&[3.0, 4.0], &mut scope), 5.0);
        assert!(MathFn::Sin.apply(&[], &mut scope).is_nan());
        assert!(js_pow(1.0, f64::NAN).is_nan());
    }

    #[test]
    fn binary_operators_follow_int32_rules() {
        let n = |x: f64| Value::Number(x);
        assert_eq!(binary(BinaryOp::Shl, &n(1.0), &n(33.0)), n(2.0));
        assert_eq!(binary(BinaryOp::Shr, &n(-8.0), &n(1.0)), n(-4.0));
        assert_eq!(binary(BinaryOp::UShr, &n(-1.0), &n(0.0)), n(4_294_967_295.0));
        assert_eq!(binary(BinaryOp::BitAnd, &n(300.5), &n(255.0)), n(44.0));
        assert_eq!(binary(BinaryOp::Rem, &n(-7.0), &n(3.0)), n(-1.0));
    }

    #[test]
    fn add_concatenates_strings() {
        let s = binary(BinaryOp::Add, &Value::Str("a".into()), &Value::Number(1.0));
        assert_eq!(s, Value::Str("a1".into()));
    }

    #[test]
    fn indexing() {
        let arr = Value::Array(Arc::from(vec![Value::Number(4.0), Value::Number(5.0)]));
        assert_eq!(index_value(&arr, &Value::Number(1.0)), Ok(Value::Number(5.0)));
        assert_eq!(index_value(&arr, &Value::Number(2.0)), Ok(Value::Undefined));
        assert_eq!(index_value(&arr, &Value::Number(0.5)), Ok(Value::Undefined));
        assert_eq!(
            index_value(&arr, &Value::Str("length".into())),
            Ok(Value::Number(2.0))
        );
        assert!(matches!(
            index_value(&Value::Undefined, &Value::Number(0.0)),
            Err(EvalError::ReadOfUndefined { .. })
        ));
    }

    #[test]
    fn char_codes() {
        let s = Value::Str("AB".into());
        assert_eq!(char_code_at(&s, 1.0), Ok(Value::Number(66.0)));
        assert_eq!(char_code_at(&s, f64::NAN), Ok(Value::Number(65.0)));
        assert!(matches!(char_code_at(&s, 5.0), Ok(Value::Number(n)) if n.is_nan()));
        assert!(matches!(
            char_code_at(&Value::Number(3.0), 0.0),
            Err(EvalError::NotAFunction { .. })
        ));
    }

    #[test]
    fn stereo_split() {
        assert_eq!(stereo(&Value::Number(3.0)), (3.0, 3.0));
        let pair = Value::Array(Arc::from(vec![Value::Number(1.0), Value::Number(2.0)]));
        assert_eq!(stereo(&pair), (1.0, 2.0));
        let single = Value::Array(Arc::from(vec![Value::Number(1.0)]));
        let (l, r) = stereo(&single);
        assert_eq!(l, 1.0);
        assert!(r.is_nan());
    }

    #[test]
    fn frame_matches_eval_for_pairs() {
        let left = Node::Binary(BinaryOp::Mul, Box::new(Node::Time), Box::new(Node::Const(Value::Number(2.0))));
        let pair = Node::Array(vec![Node::Time, left]);
        let program = Program::new("[t, t*2]", 8000.0, pair);
        let mut scope = Scope::new();
        assert_eq!(program.frame(21, &mut scope), Ok((21.0, 42.0)));
        assert_eq!(stereo(&program.eval(21, &mut scope).unwrap()), (21.0, 42.0));
    }

    #[test]
    fn frame_follows_sequence_and_branch_tails() {
        let x: Arc<str> = Arc::from("x");
        let assign = Node::Assign {
            target: Target::Global(Arc::clone(&x)),
            op: None,
            value: Box::new(Node::Time),
        };
        let negated = Node::Unary(UnaryOp::Neg, Box::new(Node::Global(Arc::clone(&x))));
        let tail = Node::Conditional(
            Box::new(Node::Time),
            Box::new(Node::Array(vec![Node::Global(x), negated])),
            Box::new(Node::Const(Value::Number(7.0))),
        );
        let program = Program::new("x=t, t ? [x, -x] : 7", 8000.0, Node::Sequence(vec![assign, tail]));
        let mut scope = Scope::new();
        assert_eq!(program.frame(5, &mut scope), Ok((5.0, -5.0)));
        assert_eq!(program.frame(0, &mut scope), Ok((7.0, 7.0)));
        assert_eq!(scope.get("x"), Some(&Value::Number(0.0)));
    }

    #[test]
    fn frame_of_other_arrays_uses_positions() {
        let triple = Node::Array(vec![
            Node::Const(Value::Number(1.0)),
            Node::Time,
            Node::Const(Value::Number(3.0)),
        ]);
        let program = Program::new("[1, t, 3]", 8000.0, triple);
        assert_eq!(program.frame(2, &mut Scope::new()), Ok((1.0, 2.0)));
    }

    #[test]
    fn silence_is_zero() {
        let mut scope = Scope::new();
        let program = Program::silence();
        assert!(program.is_constant());
        assert_eq!(program.frame(1234, &mut scope), Ok((0.0, 0.0)));
    }
}
