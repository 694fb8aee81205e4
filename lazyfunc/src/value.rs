use std::fmt::Display;

use itertools::Itertools;
use num_traits::{CheckedAdd, CheckedMul, CheckedSub, Zero};

use crate::{Error, Operator, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Vector(Vec<f64>),
    Str(String),
}

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn float(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

impl Value {
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Vector(_) => "vector",
            Value::Str(_) => "str",
        }
    }

    /// Real numbers are the only plain values allowed as composition operands.
    pub const fn is_real(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Int(_) | Value::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.num().map(Num::float)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn num(&self) -> Option<Num> {
        match self {
            Value::Bool(b) => Some(Num::Int(*b as i64)),
            Value::Int(i) => Some(Num::Int(*i)),
            Value::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    /// Applies `f` to every element, treating a real scalar as a one element vector.
    pub fn map_float(&self, f: impl Fn(f64) -> f64) -> Option<Value> {
        match self {
            Value::Vector(v) => Some(Value::Vector(v.iter().copied().map(f).collect())),
            other => other.as_f64().map(|x| Value::Float(f(x))),
        }
    }
}

fn unsupported(op: Operator, lhs: &Value, rhs: &Value) -> Error {
    Error::UnsupportedOperandTypes {
        symbol: op.symbol(),
        left: lhs.type_name(),
        right: rhs.type_name(),
    }
}

pub(crate) fn unary(op: Operator, value: &Value) -> Result<Value> {
    let bad = || Error::BadUnaryOperand {
        symbol: op.symbol(),
        operand: value.type_name(),
    };
    match (op, value) {
        (Operator::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (Operator::Neg, Value::Vector(v)) => Ok(Value::Vector(v.iter().map(|x| -x).collect())),
        (Operator::Neg, v) => {
            let i = v.as_int().ok_or_else(bad)?;
            i.checked_neg()
                .map(Value::Int)
                .ok_or(Error::Overflow(op.name()))
        }
        (Operator::Pos, Value::Float(_) | Value::Vector(_)) => Ok(value.clone()),
        (Operator::Pos, v) => v.as_int().map(Value::Int).ok_or_else(bad),
        (Operator::Invert, v) => v.as_int().map(|i| Value::Int(!i)).ok_or_else(bad),
        _ => Err(Error::UnsupportedArity {
            operator: op.name(),
            expected: op.operand_count(),
            got: 1,
        }),
    }
}

pub(crate) fn binary(op: Operator, lhs: &Value, rhs: &Value) -> Result<Value> {
    use Value::*;

    if matches!(op, Operator::Eq | Operator::Ne) && !(lhs.is_real() && rhs.is_real()) {
        let equal = lhs == rhs;
        return Ok(Bool(if op == Operator::Eq { equal } else { !equal }));
    }
    match (lhs, rhs) {
        (Vector(_), _) | (_, Vector(_)) => vector_binary(op, lhs, rhs),
        (Str(a), Str(b)) => match op {
            Operator::Add => Ok(Str(format!("{a}{b}"))),
            Operator::Lt => Ok(Bool(a < b)),
            Operator::Le => Ok(Bool(a <= b)),
            Operator::Gt => Ok(Bool(a > b)),
            Operator::Ge => Ok(Bool(a >= b)),
            _ => Err(unsupported(op, lhs, rhs)),
        },
        (Str(s), n) | (n, Str(s)) if op == Operator::Mul => {
            let times = n.as_int().ok_or_else(|| unsupported(op, lhs, rhs))?;
            let times = usize::try_from(times.max(0)).map_err(|_| Error::Overflow(op.name()))?;
            s.len()
                .checked_mul(times)
                .filter(|&len| len <= isize::MAX as usize)
                .ok_or(Error::Overflow(op.name()))?;
            Ok(Str(s.repeat(times)))
        }
        (Bool(a), Bool(b)) if matches!(op, Operator::And | Operator::Or | Operator::Xor) => {
            Ok(Bool(match op {
                Operator::And => a & b,
                Operator::Or => a | b,
                _ => a ^ b,
            }))
        }
        _ => match (lhs.num(), rhs.num()) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => int_binary(op, a, b)
                .transpose()
                .unwrap_or_else(|| Err(unsupported(op, lhs, rhs))),
            (Some(a), Some(b)) => float_binary(op, a.float(), b.float())
                .transpose()
                .unwrap_or_else(|| Err(unsupported(op, lhs, rhs))),
            _ => Err(unsupported(op, lhs, rhs)),
        },
    }
}

fn checked(op: Operator, value: Option<i64>) -> Result<Value> {
    value.map(Value::Int).ok_or(Error::Overflow(op.name()))
}

fn int_binary(op: Operator, a: i64, b: i64) -> Result<Option<Value>> {
    let nonzero = |b: i64| {
        if b.is_zero() {
            Err(Error::DivisionByZero)
        } else {
            Ok(b)
        }
    };
    let value = match op {
        Operator::Add => checked(op, CheckedAdd::checked_add(&a, &b))?,
        Operator::Sub => checked(op, CheckedSub::checked_sub(&a, &b))?,
        Operator::Mul => checked(op, CheckedMul::checked_mul(&a, &b))?,
        Operator::TrueDiv => Value::Float(a as f64 / nonzero(b)? as f64),
        Operator::FloorDiv => {
            let b = nonzero(b)?;
            let q = a.checked_div(b).ok_or(Error::Overflow(op.name()))?;
            Value::Int(if (a % b != 0) && ((a < 0) != (b < 0)) { q - 1 } else { q })
        }
        Operator::Mod => {
            let b = nonzero(b)?;
            let r = a.checked_rem(b).ok_or(Error::Overflow(op.name()))?;
            Value::Int(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
        }
        Operator::Pow => {
            if b >= 0 {
                let exp = u32::try_from(b).map_err(|_| Error::Overflow(op.name()))?;
                checked(op, a.checked_pow(exp))?
            } else if a.is_zero() {
                return Err(Error::DivisionByZero);
            } else {
                Value::Float((a as f64).powf(b as f64))
            }
        }
        Operator::LShift => {
            if b < 0 {
                return Err(Error::NegativeShift);
            }
            if a.is_zero() {
                Value::Int(0)
            } else if b >= 63 {
                return Err(Error::Overflow(op.name()));
            } else {
                let shifted = a << b;
                checked(op, (shifted >> b == a).then_some(shifted))?
            }
        }
        Operator::RShift => {
            if b < 0 {
                return Err(Error::NegativeShift);
            }
            Value::Int(if b >= 64 { if a < 0 { -1 } else { 0 } } else { a >> b })
        }
        Operator::And => Value::Int(a & b),
        Operator::Or => Value::Int(a | b),
        Operator::Xor => Value::Int(a ^ b),
        Operator::Lt => Value::Bool(a < b),
        Operator::Le => Value::Bool(a <= b),
        Operator::Gt => Value::Bool(a > b),
        Operator::Ge => Value::Bool(a >= b),
        Operator::Eq => Value::Bool(a == b),
        Operator::Ne => Value::Bool(a != b),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn float_binary(op: Operator, a: f64, b: f64) -> Result<Option<Value>> {
    let nonzero = |b: f64| {
        if b.is_zero() {
            Err(Error::DivisionByZero)
        } else {
            Ok(b)
        }
    };
    let value = match op {
        Operator::TrueDiv => Value::Float(a / nonzero(b)?),
        Operator::FloorDiv => Value::Float((a / nonzero(b)?).floor()),
        Operator::Mod => Value::Float(floored_mod(a, nonzero(b)?)),
        Operator::Pow if a.is_zero() && b < 0.0 => return Err(Error::DivisionByZero),
        Operator::Lt => Value::Bool(a < b),
        Operator::Le => Value::Bool(a <= b),
        Operator::Gt => Value::Bool(a > b),
        Operator::Ge => Value::Bool(a >= b),
        Operator::Eq => Value::Bool(a == b),
        Operator::Ne => Value::Bool(a != b),
        op => match float_elementwise(op) {
            Some(f) => Value::Float(f(a, b)),
            None => return Ok(None),
        },
    };
    Ok(Some(value))
}

fn floored_mod(a: f64, b: f64) -> f64 {
    a - b * (a / b).floor()
}

/// Element-wise arithmetic shared by floats and vectors. Division follows IEEE semantics here.
fn float_elementwise(op: Operator) -> Option<fn(f64, f64) -> f64> {
    let f: fn(f64, f64) -> f64 = match op {
        Operator::Add => |a, b| a + b,
        Operator::Sub => |a, b| a - b,
        Operator::Mul => |a, b| a * b,
        Operator::TrueDiv => |a, b| a / b,
        Operator::FloorDiv => |a: f64, b| (a / b).floor(),
        Operator::Mod => floored_mod,
        Operator::Pow => f64::powf,
        _ => return None,
    };
    Some(f)
}

fn vector_binary(op: Operator, lhs: &Value, rhs: &Value) -> Result<Value> {
    if op == Operator::MatMul {
        return match (lhs, rhs) {
            (Value::Vector(a), Value::Vector(b)) if a.len() == b.len() => {
                Ok(Value::Float(a.iter().zip(b).map(|(x, y)| x * y).sum()))
            }
            (Value::Vector(a), Value::Vector(b)) => Err(Error::LengthMismatch(a.len(), b.len())),
            _ => Err(unsupported(op, lhs, rhs)),
        };
    }
    let f = float_elementwise(op).ok_or_else(|| unsupported(op, lhs, rhs))?;
    match (lhs, rhs) {
        (Value::Vector(a), Value::Vector(b)) => {
            if a.len() != b.len() {
                return Err(Error::LengthMismatch(a.len(), b.len()));
            }
            Ok(Value::Vector(a.iter().zip(b).map(|(x, y)| f(*x, *y)).collect()))
        }
        (Value::Vector(a), scalar) => {
            let y = scalar.as_f64().ok_or_else(|| unsupported(op, lhs, rhs))?;
            Ok(Value::Vector(a.iter().map(|x| f(*x, y)).collect()))
        }
        (scalar, Value::Vector(b)) => {
            let x = scalar.as_f64().ok_or_else(|| unsupported(op, lhs, rhs))?;
            Ok(Value::Vector(b.iter().map(|y| f(x, *y)).collect()))
        }
        _ => Err(unsupported(op, lhs, rhs)),
    }
}

fn fmt_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        String::from(if f > 0.0 { "inf" } else { "-inf" })
    } else if f != 0.0 && !(1e-4..1e16).contains(&f.abs()) {
        let text = format!("{f:e}");
        let (mantissa, exponent) = text.split_once('e').unwrap_or((&text, "0"));
        let exponent: i32 = exponent.parse().unwrap_or(0);
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    } else if f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{}", fmt_float(*x)),
            Value::Vector(v) => write!(f, "[{}]", v.iter().map(|x| fmt_float(*x)).join(", ")),
            Value::Str(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}
