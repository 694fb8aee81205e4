use std::{
    cell::{Cell, RefCell},
    fmt::Display,
    mem, ops,
    ops::Deref,
    rc::Rc,
};

use itertools::Itertools;
use log::{debug, trace, warn};

use crate::{
    operator::{CALL_PRECEDENCE, COMPARISON_PRECEDENCE},
    Args, Callable, Error, IntoKwargs, Kwargs, Operator, Result, Signature, Value,
};

/// Anything that can take part in a composition.
#[derive(Clone, Debug)]
pub enum Operand {
    Node(LazyFunc),
    Callable(Callable),
    Scalar(Value),
}

impl Operand {
    pub fn type_name(&self) -> &'static str {
        match self {
            Operand::Node(_) => "LazyFunc",
            Operand::Callable(_) => "callable",
            Operand::Scalar(value) => value.type_name(),
        }
    }

    /// `None` for scalars, which contribute no parameters.
    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Operand::Node(node) => Some(node.signature()),
            Operand::Callable(callable) => Some(callable.signature()),
            Operand::Scalar(_) => None,
        }
    }

    fn precedence(&self) -> Option<u8> {
        match self {
            Operand::Node(node) => node.precedence(),
            _ => None,
        }
    }

    fn display_text(&self) -> String {
        match self {
            Operand::Node(node) => node.description().to_string(),
            Operand::Callable(callable) => callable.name().to_string(),
            Operand::Scalar(value) => value.to_string(),
        }
    }

    /// Parenthesized iff the operand binds more loosely than `precedence`.
    fn display_within(&self, precedence: u8) -> String {
        let text = self.display_text();
        match self.precedence() {
            Some(own) if own < precedence => format!("({text})"),
            _ => text,
        }
    }

    fn evaluate(&self, args: &Args) -> Result<Value> {
        match self {
            Operand::Node(node) => node.call(args.route(node.signature())),
            Operand::Callable(callable) => callable.call(&args.route(callable.signature())),
            Operand::Scalar(value) => Ok(value.clone()),
        }
    }
}

impl From<LazyFunc> for Operand {
    fn from(node: LazyFunc) -> Self {
        Operand::Node(node)
    }
}

impl From<&LazyFunc> for Operand {
    fn from(node: &LazyFunc) -> Self {
        Operand::Node(node.clone())
    }
}

impl From<Callable> for Operand {
    fn from(callable: Callable) -> Self {
        Operand::Callable(callable)
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Scalar(value)
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::Scalar(Value::Float(value))
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Scalar(Value::Int(value))
    }
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Scalar(Value::Int(value.into()))
    }
}

impl From<bool> for Operand {
    fn from(value: bool) -> Self {
        Operand::Scalar(Value::Bool(value))
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Operand::Scalar(Value::from(value))
    }
}

/// Operand types for which composition can never fail, usable with the `std::ops` traits.
pub trait Composable: Into<Operand> {}

impl Composable for LazyFunc {}
impl Composable for &LazyFunc {}
impl Composable for Callable {}
impl Composable for f64 {}
impl Composable for i64 {}

/// Result of [`LazyFunc::invoke`].
#[derive(Debug)]
pub enum Invocation {
    Value(Value),
    Composed(LazyFunc),
}

struct Inner {
    function: Callable,
    description: String,
    precedence: Option<u8>,
    args: Vec<Value>,
    kwargs: RefCell<Kwargs>,
    overrides: RefCell<Vec<Override>>,
    generation: Cell<u64>,
}

impl Inner {
    fn new(
        function: Callable,
        description: String,
        precedence: Option<u8>,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Self {
        Inner {
            function,
            description,
            precedence,
            args,
            kwargs: RefCell::new(kwargs),
            overrides: RefCell::new(Vec::new()),
            generation: Cell::new(0),
        }
    }
}

/// Default keywords in effect before a live [`KwargsGuard`] was taken, innermost last.
struct Override {
    generation: u64,
    previous: Kwargs,
}

/// A callable that composes with operators instead of evaluating.
///
/// Combining nodes builds a new node whose evaluation calls the operands and combines their
/// results; nothing is evaluated until the outermost node is called. Each node also carries a
/// description of the expression it stands for, parenthesized according to operator precedence.
///
/// Cloning is cheap and shares the node.
#[derive(Clone)]
pub struct LazyFunc {
    inner: Rc<Inner>,
}

impl LazyFunc {
    pub fn new(function: impl Into<Callable>) -> Self {
        LazyFunc::wrap(function, Vec::new(), None, Kwargs::new())
    }

    pub fn named(function: impl Into<Callable>, description: impl Into<String>) -> Self {
        LazyFunc::wrap(function, Vec::new(), Some(description.into()), Kwargs::new())
    }

    /// `args` are appended to every call; `kwargs` fill keywords the call leaves out.
    pub fn wrap(
        function: impl Into<Callable>,
        args: Vec<Value>,
        description: Option<String>,
        kwargs: impl IntoKwargs,
    ) -> Self {
        let function = function.into();
        let description = description.unwrap_or_else(|| function.name().to_string());
        LazyFunc {
            inner: Rc::new(Inner::new(
                function,
                description,
                None,
                args,
                kwargs.kwargs(),
            )),
        }
    }

    fn composite(function: Callable, description: String, precedence: u8) -> Self {
        trace!("composed `{description}`");
        LazyFunc {
            inner: Rc::new(Inner::new(
                function,
                description,
                Some(precedence),
                Vec::new(),
                Kwargs::new(),
            )),
        }
    }

    pub fn description(&self) -> &str {
        &self.inner.description
    }

    /// `None` for a leaf wrapping an external callable.
    pub fn precedence(&self) -> Option<u8> {
        self.inner.precedence
    }

    pub fn signature(&self) -> &Signature {
        self.inner.function.signature()
    }

    pub fn kwargs(&self) -> Kwargs {
        self.inner.kwargs.borrow().clone()
    }

    /// Evaluates the node. Keywords given here take precedence over the node's defaults.
    pub fn call(&self, args: impl Into<Args>) -> Result<Value> {
        #[cfg(feature = "tracy")]
        profiling::scope!("LazyFunc::call");
        let args = {
            let kwargs = self.inner.kwargs.borrow();
            args.into().with_defaults(&self.inner.args, &kwargs)
        };
        match self.inner.precedence {
            None => self.inner.function.call(&args),
            Some(_) => {
                self.signature().check_keywords(&args)?;
                self.inner.function.invoke(&args)
            }
        }
    }

    /// Composes with `first` when it is invokable, otherwise evaluates with `first` prepended.
    pub fn invoke(&self, first: impl Into<Operand>, rest: impl Into<Args>) -> Result<Invocation> {
        let rest = rest.into();
        match first.into() {
            Operand::Scalar(value) => {
                let mut args = rest;
                args.positional.insert(0, value);
                self.call(args).map(Invocation::Value)
            }
            inner => self.compose(inner, rest).map(Invocation::Composed),
        }
    }

    /// `self(inner(...), *bound.positional, **bound.keywords)`, described as `self(inner)`.
    pub fn compose(&self, inner: impl Into<Operand>, bound: impl Into<Args>) -> Result<LazyFunc> {
        let inner = inner.into();
        let signature = inner
            .signature()
            .cloned()
            .ok_or(Error::NotInvokable {
                type_name: inner.type_name(),
            })?;
        let description = format!(
            "{}({})",
            Operand::from(self).display_within(CALL_PRECEDENCE),
            inner.display_text()
        );
        let outer = self.clone();
        let bound = bound.into();
        let function = Callable::new(description.clone(), signature, move |args| {
            let mut outer_args = bound.clone();
            outer_args.positional.insert(0, inner.evaluate(args)?);
            outer.call(outer_args)
        });
        Ok(LazyFunc::composite(function, description, CALL_PRECEDENCE))
    }

    /// Applies `operator` to `operands`; `reverse` swaps the two operands of a binary operator.
    pub fn apply(operator: Operator, operands: Vec<Operand>, reverse: bool) -> Result<LazyFunc> {
        let spec = operator.spec();
        if operands.len() > 2 || operands.len() != spec.operand_count() {
            return Err(Error::UnsupportedArity {
                operator: spec.name(),
                expected: spec.operand_count(),
                got: operands.len(),
            });
        }
        if reverse && !spec.has_reverse() {
            return Err(Error::NoReflectedVariant {
                operator: spec.name(),
            });
        }
        if let Some(Operand::Scalar(value)) = operands
            .iter()
            .find(|operand| matches!(operand, Operand::Scalar(value) if !value.is_real()))
        {
            return Err(Error::UnsupportedOperand {
                operator: spec.name(),
                type_name: value.type_name(),
            });
        }
        if operator.is_comparison()
            && operands
                .iter()
                .any(|operand| operand.precedence() == Some(COMPARISON_PRECEDENCE))
        {
            return Err(Error::ChainedComparison {
                operator: spec.name(),
            });
        }
        Ok(LazyFunc::combine(operator, operands, reverse))
    }

    fn combine(operator: Operator, operands: Vec<Operand>, reverse: bool) -> LazyFunc {
        let spec = operator.spec();
        let signature = Signature::merge(operands.iter().filter_map(Operand::signature));
        let mut texts = operands
            .iter()
            .map(|operand| operand.display_within(spec.precedence))
            .collect_vec();
        if reverse {
            texts.reverse();
        }
        let description = spec.format(&texts);
        let function = Callable::new(description.clone(), signature, move |args| {
            let mut values = operands
                .iter()
                .map(|operand| operand.evaluate(args))
                .collect::<Result<Vec<_>>>()?;
            if reverse {
                values.reverse();
            }
            operator.evaluate(&values)
        });
        LazyFunc::composite(function, description, spec.precedence)
    }

    pub fn unary(&self, operator: Operator) -> Result<LazyFunc> {
        LazyFunc::apply(operator, vec![self.into()], false)
    }

    pub fn binary(
        &self,
        operator: Operator,
        other: impl Into<Operand>,
        reverse: bool,
    ) -> Result<LazyFunc> {
        LazyFunc::apply(operator, vec![self.into(), other.into()], reverse)
    }

    /// Replaces the default keywords until the returned guard is dropped.
    ///
    /// Guards may be dropped in any order. Once every guard is gone the defaults are back to what
    /// they were before the first one was taken.
    pub fn set_kwargs(&self, kwargs: impl IntoKwargs) -> KwargsGuard<'_> {
        let previous = mem::replace(&mut *self.inner.kwargs.borrow_mut(), kwargs.kwargs());
        let generation = self.inner.generation.get();
        self.inner.generation.set(generation + 1);
        self.inner.overrides.borrow_mut().push(Override {
            generation,
            previous,
        });
        debug!(
            "`{}` default keywords set to {:?}",
            self.description(),
            self.inner.kwargs.borrow()
        );
        KwargsGuard {
            node: self,
            generation,
        }
    }

    /// Compares descriptions without evaluating either side.
    ///
    /// Differing descriptions only mean the expressions differ syntactically, so a mismatch is
    /// also reported as a warning.
    pub fn is_equivalent_to(&self, other: impl Into<Operand>) -> Result<bool> {
        match other.into() {
            Operand::Node(other) => {
                let equal = self.description() == other.description();
                if !equal {
                    warn!(
                        "LazyFunc descriptions `{}` and `{}` are not equal, though the functions may still be equivalent",
                        self.description(),
                        other.description()
                    );
                }
                Ok(equal)
            }
            other => Err(Error::InvalidComparison {
                type_name: other.type_name(),
            }),
        }
    }
}

/// Restores a node's previous default keywords when dropped.
pub struct KwargsGuard<'a> {
    node: &'a LazyFunc,
    generation: u64,
}

impl Deref for KwargsGuard<'_> {
    type Target = LazyFunc;

    fn deref(&self) -> &LazyFunc {
        self.node
    }
}

impl Drop for KwargsGuard<'_> {
    fn drop(&mut self) {
        let mut overrides = self.node.inner.overrides.borrow_mut();
        let Some(index) = overrides
            .iter()
            .position(|o| o.generation == self.generation)
        else {
            return;
        };
        let Override { previous, .. } = overrides.remove(index);
        match overrides.get_mut(index) {
            // A newer guard is still live; it restores what this one saw on entry.
            Some(newer) => {
                newer.previous = previous;
                debug!(
                    "`{}` default keyword guard dropped before a newer one",
                    self.node.description()
                );
            }
            None => {
                *self.node.inner.kwargs.borrow_mut() = previous;
                debug!("`{}` default keywords restored", self.node.description());
            }
        }
    }
}

macro_rules! unary_methods {
    ($($method:ident => $operator:ident),* $(,)?) => {
        impl LazyFunc {
            $(
                pub fn $method(&self) -> Result<LazyFunc> {
                    self.unary(Operator::$operator)
                }
            )*
        }
    };
}

macro_rules! binary_methods {
    ($($method:ident => $operator:ident, $reverse:literal);* $(;)?) => {
        impl LazyFunc {
            $(
                pub fn $method(&self, other: impl Into<Operand>) -> Result<LazyFunc> {
                    self.binary(Operator::$operator, other, $reverse)
                }
            )*
        }
    };
}

unary_methods! {
    pos => Pos,
    neg => Neg,
    invert => Invert,
}

binary_methods! {
    pow => Pow, false;
    rpow => Pow, true;
    mul => Mul, false;
    rmul => Mul, true;
    matmul => MatMul, false;
    rmatmul => MatMul, true;
    truediv => TrueDiv, false;
    rtruediv => TrueDiv, true;
    floordiv => FloorDiv, false;
    rfloordiv => FloorDiv, true;
    modulo => Mod, false;
    rmodulo => Mod, true;
    add => Add, false;
    radd => Add, true;
    sub => Sub, false;
    rsub => Sub, true;
    rshift => RShift, false;
    rrshift => RShift, true;
    lshift => LShift, false;
    rlshift => LShift, true;
    and => And, false;
    rand => And, true;
    xor => Xor, false;
    rxor => Xor, true;
    or => Or, false;
    ror => Or, true;
    lt => Lt, false;
    le => Le, false;
    gt => Gt, false;
    ge => Ge, false;
    ne => Ne, false;
    eq => Eq, false;
}

macro_rules! operator_traits {
    ($($trait:ident :: $method:ident => $operator:ident),* $(,)?) => {
        $(
            impl<T: Composable> ops::$trait<T> for &LazyFunc {
                type Output = LazyFunc;

                fn $method(self, rhs: T) -> LazyFunc {
                    LazyFunc::combine(Operator::$operator, vec![self.into(), rhs.into()], false)
                }
            }

            impl<T: Composable> ops::$trait<T> for LazyFunc {
                type Output = LazyFunc;

                fn $method(self, rhs: T) -> LazyFunc {
                    ops::$trait::$method(&self, rhs)
                }
            }

            operator_traits!(@reflected $trait :: $method => $operator; f64, i64, Callable);
        )*
    };
    (@reflected $trait:ident :: $method:ident => $operator:ident; $($lhs:ty),*) => {
        $(
            impl ops::$trait<LazyFunc> for $lhs {
                type Output = LazyFunc;

                fn $method(self, rhs: LazyFunc) -> LazyFunc {
                    LazyFunc::combine(Operator::$operator, vec![rhs.into(), self.into()], true)
                }
            }

            impl ops::$trait<&LazyFunc> for $lhs {
                type Output = LazyFunc;

                fn $method(self, rhs: &LazyFunc) -> LazyFunc {
                    LazyFunc::combine(Operator::$operator, vec![rhs.into(), self.into()], true)
                }
            }
        )*
    };
}

operator_traits! {
    Add::add => Add,
    Sub::sub => Sub,
    Mul::mul => Mul,
    Div::div => TrueDiv,
    Rem::rem => Mod,
    BitAnd::bitand => And,
    BitOr::bitor => Or,
    BitXor::bitxor => Xor,
    Shl::shl => LShift,
    Shr::shr => RShift,
}

impl ops::Neg for &LazyFunc {
    type Output = LazyFunc;

    fn neg(self) -> LazyFunc {
        LazyFunc::combine(Operator::Neg, vec![self.into()], false)
    }
}

impl ops::Not for &LazyFunc {
    type Output = LazyFunc;

    fn not(self) -> LazyFunc {
        LazyFunc::combine(Operator::Invert, vec![self.into()], false)
    }
}

impl ops::Neg for LazyFunc {
    type Output = LazyFunc;

    fn neg(self) -> LazyFunc {
        -&self
    }
}

impl ops::Not for LazyFunc {
    type Output = LazyFunc;

    fn not(self) -> LazyFunc {
        !&self
    }
}

impl Display for LazyFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl std::fmt::Debug for LazyFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LazyFunc({})", self.description())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use log::{Level, LevelFilter, Log, Metadata, Record};

    use super::*;
    use crate::{Builtin, Function};

    thread_local! {
        static RECORDS: RefCell<Vec<(Level, String)>> = RefCell::new(Vec::new());
    }

    struct CaptureLogger;

    impl Log for CaptureLogger {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            RECORDS.with(|r| r.borrow_mut().push((record.level(), record.args().to_string())));
        }

        fn flush(&self) {}
    }

    static LOGGER: CaptureLogger = CaptureLogger;

    fn capture_logs() {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Trace);
        RECORDS.with(|r| r.borrow_mut().clear());
    }

    fn warnings() -> Vec<String> {
        RECORDS.with(|r| {
            r.borrow()
                .iter()
                .filter(|(level, _)| *level == Level::Warn)
                .map(|(_, message)| message.clone())
                .collect()
        })
    }

    fn single_parameter_function() -> LazyFunc {
        LazyFunc::new(Callable::new(
            "single_parameter_function",
            "x".parse().unwrap(),
            |args| Ok(args.require(0, "x")?.clone()),
        ))
    }

    fn multi_parameter_function() -> Callable {
        Callable::new("multi_parameter_function", "x, y".parse().unwrap(), |args| {
            Operator::Add.evaluate(&[args.require(0, "x")?.clone(), args.require(1, "y")?.clone()])
        })
    }

    struct SingleParameterClass;

    impl Function for SingleParameterClass {
        fn signature(&self) -> Signature {
            "x".parse().unwrap()
        }

        fn call(&self, args: &Args) -> Result<Value> {
            Ok(args.require(0, "x")?.clone())
        }
    }

    struct MultiParameterClass;

    impl Function for MultiParameterClass {
        fn signature(&self) -> Signature {
            "x, y".parse().unwrap()
        }

        fn call(&self, args: &Args) -> Result<Value> {
            Operator::Add.evaluate(&[args.require(0, "x")?.clone(), args.require(1, "y")?.clone()])
        }
    }

    fn constant(name: &str, value: i64) -> LazyFunc {
        LazyFunc::new(Callable::new(name, Signature::empty(), move |_| {
            Ok(Value::Int(value))
        }))
    }

    fn square() -> LazyFunc {
        LazyFunc::new(Callable::new(
            "square",
            "x, *, foo=...".parse().unwrap(),
            |args| Ok(Value::Float(args.float(0, "x")?.powi(2) + args.keyword_float_or("foo", 2.0)?)),
        ))
    }

    fn cube() -> Callable {
        Callable::new("cube", "x, /, bar".parse().unwrap(), |args| {
            Ok(Value::Float(args.float(0, "x")?.powi(3) + args.float(1, "bar")?))
        })
    }

    #[test]
    fn descriptions() {
        let f = single_parameter_function();
        assert_eq!(format!("{f:?}"), "LazyFunc(single_parameter_function)");
        let named = LazyFunc::named(f.inner.function.clone(), "my_single_parameter_function");
        assert_eq!(format!("{named:?}"), "LazyFunc(my_single_parameter_function)");
        let class = LazyFunc::new(Callable::from_function(MultiParameterClass));
        assert_eq!(class.description(), "MultiParameterClass");
        assert_eq!(class.precedence(), None);
        assert_eq!(format!("{:?}", &f + &f), "LazyFunc(single_parameter_function + single_parameter_function)");
    }

    #[test]
    fn wrapping_is_transparent() {
        let callable = multi_parameter_function();
        let wrapped = LazyFunc::new(callable.clone());
        for (x, y) in [(1, 2), (-4, 9), (0, 0)] {
            let args = Args::new().arg(x).arg(y);
            assert_eq!(wrapped.call(args.clone()), callable.call(&args));
        }
        assert_eq!(wrapped.signature(), callable.signature());
    }

    #[test]
    fn mul() {
        let f = single_parameter_function();
        let h = LazyFunc::new(Callable::from_function(SingleParameterClass));
        let fh = f.mul(&h).unwrap();
        assert_eq!(fh.description(), "single_parameter_function * SingleParameterClass");
        assert_eq!(fh.call(3.0), Ok(Value::Float(9.0)));

        let g = LazyFunc::new(multi_parameter_function());
        let gj = g.mul(Callable::from_function(MultiParameterClass)).unwrap();
        assert_eq!(gj.description(), "multi_parameter_function * MultiParameterClass");
        assert_eq!(gj.call(Args::new().arg(2).arg(3)), Ok(Value::Int(25)));

        let f2 = f.mul(2).unwrap();
        assert_eq!(f2.description(), "single_parameter_function * 2");
        assert_eq!(f2.call(Value::Vector(vec![1.0, 2.0])), Ok(Value::Vector(vec![2.0, 4.0])));

        assert_eq!(
            f.mul("foo").unwrap_err(),
            Error::UnsupportedOperand {
                operator: "mul",
                type_name: "str"
            }
        );
        assert!(f.mul(Value::Vector(vec![1.0])).is_err());
    }

    #[test]
    fn reflected_operands() {
        let f = single_parameter_function();
        let g = LazyFunc::new(multi_parameter_function());

        let jg = g.radd(Callable::from_function(MultiParameterClass)).unwrap();
        assert_eq!(jg.description(), "MultiParameterClass + multi_parameter_function");
        assert_eq!(jg.call(Args::new().arg(1).arg(2)), Ok(Value::Int(6)));

        let two_plus_f = 2.0 + &f;
        assert_eq!(two_plus_f.description(), "2.0 + single_parameter_function");
        let f_plus_two = &f + 2.0;
        assert_eq!(f_plus_two.description(), "single_parameter_function + 2.0");
        assert_eq!(two_plus_f.call(1.5), f_plus_two.call(1.5));
        assert_eq!(two_plus_f.call(1.5), Ok(Value::Float(3.5)));

        let two_minus_f = f.rsub(2).unwrap();
        assert_eq!(two_minus_f.description(), "2 - single_parameter_function");
        assert_eq!(two_minus_f.call(5), Ok(Value::Int(-3)));
        assert_eq!((2_i64 - &f).call(5), Ok(Value::Int(-3)));
        assert_eq!(f.rpow(2).unwrap().call(3), Ok(Value::Int(8)));
    }

    #[test]
    fn reflected_operands_evaluate_self_first() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let recording = |name: &'static str, value: i64| {
            let order = order.clone();
            LazyFunc::new(Callable::new(name, Signature::empty(), move |_| {
                order.borrow_mut().push(name);
                Ok(Value::Int(value))
            }))
        };
        let a = recording("a", 10);
        let b = Callable::new("b", Signature::empty(), {
            let order = order.clone();
            move |_| {
                order.borrow_mut().push("b");
                Ok(Value::Int(3))
            }
        });
        let b_minus_a = a.rsub(b).unwrap();
        assert_eq!(b_minus_a.description(), "b - a");
        assert_eq!(b_minus_a.call(()), Ok(Value::Int(-7)));
        assert_eq!(*order.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn precedence_and_parentheses() {
        let one = constant("one", 1);
        let two = constant("two", 2);
        let three = constant("three", 3);

        let eq = &one + &one.truediv(&two).unwrap();
        assert_eq!(eq.description(), "one + one / two");
        assert_eq!(eq.call(()), Ok(Value::Float(1.5)));

        let eq = &(&one + &one) / &two;
        assert_eq!(eq.description(), "(one + one) / two");
        assert_eq!(eq.call(()), Ok(Value::Float(1.0)));

        let eq = &(&two + &(&(&one + &one) / &two)) + &three;
        assert_eq!(eq.description(), "two + (one + one) / two + three");
        assert_eq!(eq.call(()), Ok(Value::Float(6.0)));

        let eq = eq.pow(&two).unwrap();
        assert_eq!(eq.description(), "(two + (one + one) / two + three) ** two");
        assert_eq!(eq.call(()), Ok(Value::Float(36.0)));

        let base = &(&(&one + &one) * &two) / &two;
        let eq = &base.pow(&three.truediv(&one).unwrap()).unwrap() + &one;
        assert_eq!(eq.description(), "((one + one) * two / two) ** (three / one) + one");
        assert_eq!(eq.call(()), Ok(Value::Float(9.0)));
        assert_eq!(eq.precedence(), Some(12));
    }

    #[test]
    fn unary_operators() {
        let one = constant("one", 1);
        let two = constant("two", 2);
        assert_eq!((-&one).description(), "-one");
        assert_eq!((-&(&one + &two)).description(), "-(one + two)");
        assert_eq!((-&(&one + &two)).call(()), Ok(Value::Int(-3)));
        assert_eq!((!&two).call(()), Ok(Value::Int(-3)));
        assert_eq!(one.pos().unwrap().description(), "+one");
        assert_eq!((-&one.pow(&two).unwrap()).description(), "-one ** two");
        assert_eq!((-&one).pow(&two).unwrap().description(), "(-one) ** two");
        assert_eq!(two.invert().unwrap().signature(), two.signature());
    }

    #[test]
    fn owned_operands_chain() {
        let one = constant("one", 1);
        let two = constant("two", 2);
        let three = constant("three", 3);

        let eq = (one.clone() + one.clone()) / two.clone() + three.clone();
        assert_eq!(eq.description(), "(one + one) / two + three");
        assert_eq!(eq.call(()), Ok(Value::Float(4.0)));

        let eq = -(two.clone() * 2_i64) - !three.clone() % 5_i64;
        assert_eq!(eq.description(), "-(two * 2) - ~three % 5");
        assert_eq!(eq.call(()), Ok(Value::Int(-5)));

        let eq = 1.0 - (one + &two) * three;
        assert_eq!(eq.description(), "1.0 - (one + two) * three");
        assert_eq!(eq.call(()), Ok(Value::Float(-8.0)));
    }

    #[test]
    fn bitwise_and_shift_operators() {
        let six = constant("six", 6);
        let three = constant("three", 3);
        let x = &(&six & &three) | 8_i64;
        assert_eq!(x.description(), "six & three | 8");
        assert_eq!(x.call(()), Ok(Value::Int(10)));
        let x = &(&six ^ &three) << 2_i64;
        assert_eq!(x.description(), "(six ^ three) << 2");
        assert_eq!(x.call(()), Ok(Value::Int(20)));
        assert_eq!((&six >> 1_i64).call(()), Ok(Value::Int(3)));
        assert_eq!((&six % 4_i64).call(()), Ok(Value::Int(2)));
        assert_eq!(six.floordiv(4).unwrap().call(()), Ok(Value::Int(1)));
    }

    #[test]
    fn comparisons_do_not_chain() {
        let one = constant("one", 1);
        let two = constant("two", 2);
        let lt = one.lt(&two).unwrap();
        assert_eq!(lt.description(), "one < two");
        assert_eq!(lt.call(()), Ok(Value::Bool(true)));
        assert_eq!(
            lt.lt(&two).unwrap_err(),
            Error::ChainedComparison { operator: "lt" }
        );
        assert_eq!(
            one.eq(&lt).unwrap_err(),
            Error::ChainedComparison { operator: "eq" }
        );
        assert_eq!(
            one.binary(Operator::Lt, &two, true).unwrap_err(),
            Error::NoReflectedVariant { operator: "lt" }
        );
        let both = &lt & &one.ne(&two).unwrap();
        assert_eq!(both.description(), "(one < two) & (one != two)");
        assert_eq!(both.call(()), Ok(Value::Bool(true)));
    }

    #[test]
    fn arity() {
        let one = constant("one", 1);
        assert_eq!(
            LazyFunc::apply(Operator::Add, vec![one.clone().into(); 3], false).unwrap_err(),
            Error::UnsupportedArity {
                operator: "add",
                expected: 2,
                got: 3
            }
        );
        assert!(LazyFunc::apply(Operator::Neg, vec![one.clone().into(); 2], false).is_err());
        assert!(LazyFunc::apply(Operator::Add, vec![one.into()], false).is_err());
    }

    #[test]
    fn signature_propagation() {
        let sq = square();
        assert_eq!(sq.invert().unwrap().signature(), sq.signature());
        assert_eq!((&sq * 2.0).signature(), sq.signature());
        let combined = sq.add(cube()).unwrap();
        assert_eq!(combined.signature().to_string(), "(x, /, bar, *, foo=...)");
    }

    #[test]
    fn keyword_routing() {
        let f = square().add(cube()).unwrap();
        assert_eq!(f.call(Args::new().arg(2).kwarg("foo", 1).kwarg("bar", 2)), Ok(Value::Float(15.0)));
        assert_eq!(f.call(Args::new().arg(2).kwarg("bar", 2)), Ok(Value::Float(16.0)));
        assert_eq!(
            f.call(Args::new().arg(2).kwarg("foo", 1)),
            Err(Error::MissingArgument("bar".to_string()))
        );
        assert_eq!(
            f.call(Args::new().arg(2).arg(2).kwarg("foo", 1)),
            Err(Error::TooManyPositional {
                expected: 1,
                got: 2
            })
        );
        assert_eq!(
            f.call(Args::new().arg(2).kwarg("bar", 2).kwarg("baz", 3)),
            Err(Error::UnexpectedKeyword("baz".to_string()))
        );
    }

    #[test]
    fn default_arguments() {
        let power = Callable::new("power", "x, n, *, offset=...".parse().unwrap(), |args| {
            Ok(Value::Float(
                args.float(0, "x")?.powf(args.float(1, "n")?) + args.keyword_float_or("offset", 0.0)?,
            ))
        });
        let cubed = LazyFunc::wrap(power, vec![Value::Int(3)], None, ("offset", 1.0));
        assert_eq!(cubed.call(2.0), Ok(Value::Float(9.0)));
        assert_eq!(cubed.call(Args::from(2.0).kwarg("offset", 0.0)), Ok(Value::Float(8.0)));
        assert_eq!(cubed.description(), "power");
    }

    #[test]
    fn scoped_kwargs_override() {
        let sq = square();
        let doubled = &sq * 2.0;
        {
            let guard = sq.set_kwargs(("foo", 10.0));
            assert_eq!(guard.call(1.0), Ok(Value::Float(11.0)));
            assert_eq!(doubled.call(1.0), Ok(Value::Float(22.0)));
        }
        assert_eq!(sq.kwargs(), Kwargs::new());
        assert_eq!(sq.call(1.0), Ok(Value::Float(3.0)));

        let outcome: Result<Value> = (|| {
            let guard = sq.set_kwargs(("foo", 0.0));
            guard.call(Value::from("not a number"))
        })();
        assert!(outcome.is_err());
        assert_eq!(sq.kwargs(), Kwargs::new());

        let preset = LazyFunc::wrap(sq.inner.function.clone(), Vec::new(), None, ("foo", 5.0));
        {
            let _guard = preset.set_kwargs(Kwargs::new());
            assert_eq!(preset.call(1.0), Ok(Value::Float(3.0)));
        }
        assert_eq!(preset.call(1.0), Ok(Value::Float(6.0)));
    }

    #[test]
    fn scoped_kwargs_override_out_of_order() {
        let preset = LazyFunc::wrap(square().inner.function.clone(), Vec::new(), None, ("foo", 1));
        let outer = preset.set_kwargs(("foo", 2));
        let inner = preset.set_kwargs(("foo", 3));
        assert_eq!(preset.kwargs(), ("foo", 3).kwargs());
        drop(outer);
        assert_eq!(preset.kwargs(), ("foo", 3).kwargs());
        drop(inner);
        assert_eq!(preset.kwargs(), ("foo", 1).kwargs());

        let first = preset.set_kwargs(("foo", 4));
        let second = preset.set_kwargs(("foo", 5));
        let third = preset.set_kwargs(("foo", 6));
        drop(second);
        drop(third);
        assert_eq!(preset.kwargs(), ("foo", 4).kwargs());
        assert_eq!(first.call(1.0), Ok(Value::Float(5.0)));
        drop(first);
        assert_eq!(preset.kwargs(), ("foo", 1).kwargs());
        assert_eq!(preset.call(1.0), Ok(Value::Float(2.0)));
    }

    #[test]
    fn function_composition() {
        let f = single_parameter_function();
        let min = LazyFunc::new(Callable::new("min", "values, /".parse().unwrap(), |args| {
            match args.require(0, "values")? {
                Value::Vector(v) => Ok(Value::Float(v.iter().copied().fold(f64::INFINITY, f64::min))),
                other => Ok(other.clone()),
            }
        }));
        let min_f = match min.invoke(&f, ()).unwrap() {
            Invocation::Composed(node) => node,
            Invocation::Value(value) => panic!("expected a composition, got {value}"),
        };
        assert_eq!(format!("{min_f:?}"), "LazyFunc(min(single_parameter_function))");
        assert_eq!(min_f.precedence(), Some(CALL_PRECEDENCE));
        assert_eq!(min_f.signature(), f.signature());

        let doubled = &min_f * 2_i64;
        assert_eq!(doubled.description(), "min(single_parameter_function) * 2");
        assert_eq!(doubled.call(Value::Vector(vec![3.0, 1.0, 4.0])), Ok(Value::Float(2.0)));

        match min.invoke(Value::Vector(vec![5.0, 2.0]), ()).unwrap() {
            Invocation::Value(value) => assert_eq!(value, Value::Float(2.0)),
            Invocation::Composed(node) => panic!("unexpected composition {node:?}"),
        }

        let sum = LazyFunc::new(multi_parameter_function()).add(1).unwrap();
        let exp_sum = LazyFunc::new(Builtin::Exp).compose(&sum, ()).unwrap();
        assert_eq!(exp_sum.description(), "exp(multi_parameter_function + 1)");
        assert_eq!(exp_sum.call(Args::new().arg(-1).arg(0)), Ok(Value::Float(1.0)));
        let sum_of_f = sum.compose(&f, ()).unwrap();
        assert_eq!(sum_of_f.description(), "(multi_parameter_function + 1)(single_parameter_function)");

        let offset = LazyFunc::new(multi_parameter_function()).compose(&f, Args::from(10_i64)).unwrap();
        assert_eq!(offset.call(5), Ok(Value::Int(15)));

        assert_eq!(
            f.compose(2.0, ()).unwrap_err(),
            Error::NotInvokable { type_name: "float" }
        );
    }

    #[test]
    fn equivalence() {
        capture_logs();
        let f = single_parameter_function();
        let h = LazyFunc::new(Callable::from_function(SingleParameterClass));
        assert_eq!((&f + &h).is_equivalent_to(&f + &h), Ok(true));
        assert!(warnings().is_empty());

        let fh = &f + &h;
        let hf = &h + &f;
        assert_eq!(fh.call(2.0), hf.call(2.0));
        assert_eq!(fh.is_equivalent_to(&hf), Ok(false));
        assert_eq!(warnings().len(), 1);
        assert!(warnings()[0].contains("may still be equivalent"));

        assert_eq!(
            f.is_equivalent_to(2.0),
            Err(Error::InvalidComparison { type_name: "float" })
        );
        assert_eq!(
            f.is_equivalent_to(cube()),
            Err(Error::InvalidComparison { type_name: "callable" })
        );
    }
}
