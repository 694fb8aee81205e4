//! Lazily composed functions.
//!
//! A [`LazyFunc`] wraps a callable and, instead of evaluating, builds a new node whenever it is
//! combined with operators or other callables. Calling the outermost node evaluates the whole
//! expression, routing keyword arguments to the operands that accept them.

mod args;
mod error;
mod func;
mod lazy_func;
mod operator;
mod signature;
mod value;

pub use args::{Args, IntoKwargs, Kwargs};
pub use error::{Error, Result};
pub use func::{Builtin, Callable, Function};
pub use lazy_func::{Composable, Invocation, KwargsGuard, LazyFunc, Operand};
pub use operator::{build_table, lookup_all, Operator, OperatorSpec, CALL_PRECEDENCE};
pub use signature::{Param, ParamKind, Signature, ARGUMENT_ORDER};
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readme_example() {
        let square = LazyFunc::new(Callable::new("square", "x".parse().unwrap(), |args| {
            Ok(Value::Float(args.float(0, "x")?.powi(2)))
        }));
        let shifted = &(&square * 2.0) + 1.0;
        assert_eq!(shifted.to_string(), "square * 2.0 + 1.0");
        assert_eq!(shifted.call(3.0), Ok(Value::Float(19.0)));
    }
}
