use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum Error {
    // Composition
    #[error("unsupported operand type for {operator}: '{type_name}'")]
    UnsupportedOperand {
        operator: &'static str,
        type_name: &'static str,
    },
    #[error("{operator} takes {expected} operand(s) but {got} were given; operators of arity three or more are not implemented")]
    UnsupportedArity {
        operator: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("comparison {operator} cannot be chained onto another comparison")]
    ChainedComparison { operator: &'static str },
    #[error("{operator} has no reflected variant")]
    NoReflectedVariant { operator: &'static str },
    #[error("can only compare a LazyFunc with another LazyFunc, not '{type_name}'")]
    InvalidComparison { type_name: &'static str },
    #[error("'{type_name}' object is not callable")]
    NotInvokable { type_name: &'static str },

    // Configuration
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),
    #[error("invalid signature '{signature}': {reason}")]
    InvalidSignature { signature: String, reason: String },

    // Call binding
    #[error("missing required argument '{0}'")]
    MissingArgument(String),
    #[error("got an unexpected keyword argument '{0}'")]
    UnexpectedKeyword(String),
    #[error("takes {expected} positional argument(s) but {got} were given")]
    TooManyPositional { expected: usize, got: usize },
    #[error("got multiple values for argument '{0}'")]
    MultipleValues(String),
    #[error("positional-only argument '{0}' passed as keyword argument")]
    PositionalOnlyAsKeyword(String),

    // Evaluation
    #[error("unsupported operand type(s) for {symbol}: '{left}' and '{right}'")]
    UnsupportedOperandTypes {
        symbol: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("bad operand type for unary {symbol}: '{operand}'")]
    BadUnaryOperand {
        symbol: &'static str,
        operand: &'static str,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow in {0}")]
    Overflow(&'static str),
    #[error("negative shift count")]
    NegativeShift,
    #[error("operands could not be broadcast together with lengths {0} and {1}")]
    LengthMismatch(usize, usize),
    #[error("argument '{name}' must be {expected}, not '{found}'")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("{0}")]
    Function(String),
}

impl Error {
    pub fn function(message: impl Into<String>) -> Self {
        Error::Function(message.into())
    }
}
