use std::{fmt::Display, rc::Rc};

use crate::{Args, Error, Param, Result, Signature, Value};

/// A user type that can be called like a function.
pub trait Function {
    fn signature(&self) -> Signature;

    fn call(&self, args: &Args) -> Result<Value>;

    /// Display name; the type's own name is used when this is `None`.
    fn name(&self) -> Option<&str> {
        None
    }
}

type Evaluator = dyn Fn(&Args) -> Result<Value>;

/// A named invokable with an explicit parameter descriptor.
#[derive(Clone)]
pub struct Callable {
    name: Rc<str>,
    signature: Rc<Signature>,
    function: Rc<Evaluator>,
}

impl Callable {
    pub fn new(
        name: impl Into<String>,
        signature: Signature,
        function: impl Fn(&Args) -> Result<Value> + 'static,
    ) -> Self {
        Callable {
            name: name.into().into(),
            signature: Rc::new(signature),
            function: Rc::new(function),
        }
    }

    pub fn from_function<F: Function + 'static>(function: F) -> Self {
        let name = function
            .name()
            .map(str::to_string)
            .unwrap_or_else(short_type_name::<F>);
        let signature = function.signature();
        Callable::new(name, signature, move |args| function.call(args))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Checks `args` against the signature, then invokes.
    pub fn call(&self, args: &Args) -> Result<Value> {
        self.signature.check(args)?;
        self.invoke(args)
    }

    pub(crate) fn invoke(&self, args: &Args) -> Result<Value> {
        (self.function)(args)
    }
}

fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::").next().unwrap_or(path).to_string()
}

impl std::fmt::Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Callable({}{})", self.name, self.signature)
    }
}

impl Display for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Builtin {
    Abs,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Ln,
    Exp,
    Sqrt,
}

impl Builtin {
    pub const fn get_func(&self) -> fn(f64) -> f64 {
        match self {
            Builtin::Abs => f64::abs,
            Builtin::Sin => f64::sin,
            Builtin::Cos => f64::cos,
            Builtin::Tan => f64::tan,
            Builtin::Asin => f64::asin,
            Builtin::Acos => f64::acos,
            Builtin::Atan => f64::atan,
            Builtin::Ln => f64::ln,
            Builtin::Exp => f64::exp,
            Builtin::Sqrt => f64::sqrt,
        }
    }

    pub fn from_name(string: &str) -> Option<Self> {
        match string {
            "abs" => Some(Builtin::Abs),
            "sin" => Some(Builtin::Sin),
            "cos" => Some(Builtin::Cos),
            "tan" => Some(Builtin::Tan),
            "asin" => Some(Builtin::Asin),
            "acos" => Some(Builtin::Acos),
            "atan" => Some(Builtin::Atan),
            "ln" => Some(Builtin::Ln),
            "exp" => Some(Builtin::Exp),
            "sqrt" => Some(Builtin::Sqrt),
            _ => None,
        }
    }

    /// Applies the function element-wise over vectors.
    pub fn evaluate(&self, value: &Value) -> Result<Value> {
        value
            .map_float(self.get_func())
            .ok_or_else(|| Error::TypeMismatch {
                name: "x".to_string(),
                expected: "a real number or vector",
                found: value.type_name(),
            })
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Builtin::Abs => "abs",
            Builtin::Sin => "sin",
            Builtin::Cos => "cos",
            Builtin::Tan => "tan",
            Builtin::Asin => "asin",
            Builtin::Acos => "acos",
            Builtin::Atan => "atan",
            Builtin::Ln => "ln",
            Builtin::Exp => "exp",
            Builtin::Sqrt => "sqrt",
        }
    }
}

impl Display for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<Builtin> for Callable {
    fn from(builtin: Builtin) -> Self {
        Callable::new(
            builtin.as_str(),
            unary_signature(),
            move |args| builtin.evaluate(args.require(0, "x")?),
        )
    }
}

fn unary_signature() -> Signature {
    Signature::new(vec![Param::positional_only("x")]).unwrap_or_default()
}
