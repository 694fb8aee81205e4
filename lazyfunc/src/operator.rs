use std::{fmt::Display, str::FromStr};

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use once_cell::sync::Lazy;

use crate::{
    value::{binary, unary},
    Error, Result, Value,
};

/// Binding strength of function application, above every operator in the table.
pub const CALL_PRECEDENCE: u8 = 17;

pub const COMPARISON_PRECEDENCE: u8 = 7;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, FromPrimitive)]
#[repr(u8)]
pub enum Operator {
    Pow = 0,
    Pos = 1,
    Neg = 2,
    Invert = 3,
    Mul = 4,
    MatMul = 5,
    TrueDiv = 6,
    FloorDiv = 7,
    Mod = 8,
    Add = 9,
    Sub = 10,
    RShift = 11,
    LShift = 12,
    And = 13,
    Xor = 14,
    Or = 15,
    Lt = 16,
    Le = 17,
    Gt = 18,
    Ge = 19,
    Ne = 20,
    Eq = 21,
}

impl Operator {
    pub const COUNT: u8 = 22;

    pub fn iter() -> impl Iterator<Item = Operator> {
        (0..Self::COUNT).filter_map(Operator::from_u8)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Operator::Pow => "pow",
            Operator::Pos => "pos",
            Operator::Neg => "neg",
            Operator::Invert => "invert",
            Operator::Mul => "mul",
            Operator::MatMul => "matmul",
            Operator::TrueDiv => "truediv",
            Operator::FloorDiv => "floordiv",
            Operator::Mod => "mod",
            Operator::Add => "add",
            Operator::Sub => "sub",
            Operator::RShift => "rshift",
            Operator::LShift => "lshift",
            Operator::And => "and",
            Operator::Xor => "xor",
            Operator::Or => "or",
            Operator::Lt => "lt",
            Operator::Le => "le",
            Operator::Gt => "gt",
            Operator::Ge => "ge",
            Operator::Ne => "ne",
            Operator::Eq => "eq",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::iter().find(|op| op.name() == name)
    }

    pub const fn symbol(&self) -> &'static str {
        match self {
            Operator::Pow => "**",
            Operator::Pos | Operator::Add => "+",
            Operator::Neg | Operator::Sub => "-",
            Operator::Invert => "~",
            Operator::Mul => "*",
            Operator::MatMul => "@",
            Operator::TrueDiv => "/",
            Operator::FloorDiv => "//",
            Operator::Mod => "%",
            Operator::RShift => ">>",
            Operator::LShift => "<<",
            Operator::And => "&",
            Operator::Xor => "^",
            Operator::Or => "|",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Ne => "!=",
            Operator::Eq => "==",
        }
    }

    /// Plain-language description of the primitive; the display template is derived from it.
    pub const fn doc(&self) -> &'static str {
        match self {
            Operator::Pow => "Same as a ** b.",
            Operator::Pos => "Same as +a.",
            Operator::Neg => "Same as -a.",
            Operator::Invert => "Same as ~a.",
            Operator::Mul => "Same as a * b.",
            Operator::MatMul => "Same as a @ b.",
            Operator::TrueDiv => "Same as a / b.",
            Operator::FloorDiv => "Same as a // b.",
            Operator::Mod => "Same as a % b.",
            Operator::Add => "Same as a + b.",
            Operator::Sub => "Same as a - b.",
            Operator::RShift => "Same as a >> b.",
            Operator::LShift => "Same as a << b.",
            Operator::And => "Same as a & b.",
            Operator::Xor => "Same as a ^ b.",
            Operator::Or => "Same as a | b.",
            Operator::Lt => "Same as a < b.",
            Operator::Le => "Same as a <= b.",
            Operator::Gt => "Same as a > b.",
            Operator::Ge => "Same as a >= b.",
            Operator::Ne => "Same as a != b.",
            Operator::Eq => "Same as a == b.",
        }
    }

    pub const fn operand_count(&self) -> usize {
        match self {
            Operator::Pos | Operator::Neg | Operator::Invert => 1,
            _ => 2,
        }
    }

    pub const fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge | Operator::Ne | Operator::Eq
        )
    }

    pub fn spec(&self) -> &'static OperatorSpec {
        &lookup_all()[*self as usize]
    }

    pub fn precedence(&self) -> u8 {
        self.spec().precedence
    }

    pub fn evaluate(&self, operands: &[Value]) -> Result<Value> {
        #[cfg(feature = "tracy")]
        profiling::scope!("Operator::evaluate");
        match operands {
            [a] if self.operand_count() == 1 => unary(*self, a),
            [a, b] if self.operand_count() == 2 => binary(*self, a, b),
            _ => Err(Error::UnsupportedArity {
                operator: self.name(),
                expected: self.operand_count(),
                got: operands.len(),
            }),
        }
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Operator::from_name(s).ok_or_else(|| Error::UnknownOperator(s.to_string()))
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OperatorSpec {
    pub operator: Operator,
    pub precedence: u8,
    has_reverse: bool,
    template: String,
}

impl OperatorSpec {
    /// `has_reverse` defaults to whether the operator is binary.
    pub fn new(name: &str, precedence: u8, has_reverse: Option<bool>) -> Result<Self> {
        let operator: Operator = name.parse()?;
        Ok(OperatorSpec {
            operator,
            precedence,
            has_reverse: has_reverse.unwrap_or(operator.operand_count() == 2),
            template: template_from_doc(operator.doc()),
        })
    }

    pub fn name(&self) -> &'static str {
        self.operator.name()
    }

    pub fn operand_count(&self) -> usize {
        self.operator.operand_count()
    }

    pub fn has_reverse(&self) -> bool {
        self.has_reverse
    }

    pub fn reverse_name(&self) -> Option<String> {
        self.has_reverse.then(|| format!("r{}", self.name()))
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Substitutes `operands` into the template in the order given.
    pub fn format<S: AsRef<str>>(&self, operands: &[S]) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut chars = self.template.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '{' {
                let mut index = String::new();
                while let Some(d) = chars.next_if(|d| d.is_ascii_digit()) {
                    index.push(d);
                }
                if chars.next_if_eq(&'}').is_some() {
                    if let Some(text) = index.parse::<usize>().ok().and_then(|i| operands.get(i)) {
                        out.push_str(text.as_ref());
                        continue;
                    }
                    index.push('}');
                }
                out.push('{');
                out.push_str(&index);
            } else {
                out.push(c);
            }
        }
        out
    }
}

fn template_from_doc(doc: &str) -> String {
    let doc = doc.strip_prefix("Same as ").unwrap_or(doc);
    let doc = doc.strip_suffix('.').unwrap_or(doc);
    doc.chars()
        .map(|c| match c {
            'a' => "{0}".to_string(),
            'b' => "{1}".to_string(),
            c => c.to_string(),
        })
        .collect()
}

// Order matches the discriminants of `Operator`.
const CATALOGUE: [(&str, u8, Option<bool>); Operator::COUNT as usize] = [
    ("pow", 15, None),
    ("pos", 14, None),
    ("neg", 14, None),
    ("invert", 14, None),
    ("mul", 13, None),
    ("matmul", 13, None),
    ("truediv", 13, None),
    ("floordiv", 13, None),
    ("mod", 13, None),
    ("add", 12, None),
    ("sub", 12, None),
    ("rshift", 11, None),
    ("lshift", 11, None),
    ("and", 10, None),
    ("xor", 9, None),
    ("or", 8, None),
    ("lt", COMPARISON_PRECEDENCE, Some(false)),
    ("le", COMPARISON_PRECEDENCE, Some(false)),
    ("gt", COMPARISON_PRECEDENCE, Some(false)),
    ("ge", COMPARISON_PRECEDENCE, Some(false)),
    ("ne", COMPARISON_PRECEDENCE, Some(false)),
    ("eq", COMPARISON_PRECEDENCE, Some(false)),
];

static OPERATORS: Lazy<Vec<OperatorSpec>> = Lazy::new(|| {
    build_table(&CATALOGUE).unwrap_or_else(|err| panic!("malformed operator catalogue: {err}"))
});

pub fn build_table(entries: &[(&str, u8, Option<bool>)]) -> Result<Vec<OperatorSpec>> {
    entries
        .iter()
        .map(|&(name, precedence, has_reverse)| OperatorSpec::new(name, precedence, has_reverse))
        .collect()
}

pub fn lookup_all() -> &'static [OperatorSpec] {
    &OPERATORS
}
