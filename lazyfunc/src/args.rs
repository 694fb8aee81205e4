use std::collections::BTreeMap;

use crate::{Error, Result, Signature, Value};

pub type Kwargs = BTreeMap<String, Value>;

/// Concrete arguments of one call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keywords: Kwargs,
}

impl Args {
    pub fn new() -> Self {
        Args::default()
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keywords.insert(name.into(), value.into());
        self
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords.get(name)
    }

    /// Looks `name` up among the keywords first, then at `position`.
    pub fn get(&self, position: usize, name: &str) -> Option<&Value> {
        self.keyword(name).or_else(|| self.positional.get(position))
    }

    pub fn require(&self, position: usize, name: &str) -> Result<&Value> {
        self.get(position, name)
            .ok_or_else(|| Error::MissingArgument(name.to_string()))
    }

    pub fn float(&self, position: usize, name: &str) -> Result<f64> {
        to_float(name, self.require(position, name)?)
    }

    pub fn keyword_float_or(&self, name: &str, default: f64) -> Result<f64> {
        self.keyword(name)
            .map_or(Ok(default), |value| to_float(name, value))
    }

    /// Keeps only the keywords `signature` is able to receive.
    pub(crate) fn route(&self, signature: &Signature) -> Args {
        Args {
            positional: self.positional.clone(),
            keywords: self
                .keywords
                .iter()
                .filter(|(name, _)| signature.accepts_keyword(name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }

    /// Appends default positionals and fills keywords the call did not supply.
    pub(crate) fn with_defaults(mut self, args: &[Value], kwargs: &Kwargs) -> Args {
        self.positional.extend(args.iter().cloned());
        for (name, value) in kwargs {
            self.keywords
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }
}

fn to_float(name: &str, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| Error::TypeMismatch {
        name: name.to_string(),
        expected: "a real number",
        found: value.type_name(),
    })
}

impl From<()> for Args {
    fn from(_: ()) -> Self {
        Args::default()
    }
}

impl From<Value> for Args {
    fn from(value: Value) -> Self {
        Args::new().arg(value)
    }
}

impl From<f64> for Args {
    fn from(value: f64) -> Self {
        Args::new().arg(value)
    }
}

impl From<i64> for Args {
    fn from(value: i64) -> Self {
        Args::new().arg(value)
    }
}

impl From<i32> for Args {
    fn from(value: i32) -> Self {
        Args::new().arg(value)
    }
}

impl From<Vec<Value>> for Args {
    fn from(positional: Vec<Value>) -> Self {
        Args {
            positional,
            keywords: Kwargs::new(),
        }
    }
}

pub trait IntoKwargs {
    fn kwargs(self) -> Kwargs;
}

impl IntoKwargs for Kwargs {
    fn kwargs(self) -> Kwargs {
        self
    }
}

impl<K: Into<String>, V: Into<Value>> IntoKwargs for (K, V) {
    fn kwargs(self) -> Kwargs {
        let (name, value) = self;
        let mut map = Kwargs::new();
        map.insert(name.into(), value.into());
        map
    }
}

impl<K: Into<String> + Clone, V: Into<Value> + Clone> IntoKwargs for &[(K, V)] {
    fn kwargs(self) -> Kwargs {
        self.iter()
            .map(|(k, v)| (k.clone().into(), v.clone().into()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> IntoKwargs for [(K, V); N] {
    fn kwargs(self) -> Kwargs {
        self.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
    }
}
