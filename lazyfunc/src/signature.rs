use std::{collections::HashSet, fmt::Display, str::FromStr};

use itertools::Itertools;

use crate::{Args, Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamKind {
    PositionalOnly,
    PositionalOrKeyword,
    VarPositional,
    KeywordOnly,
    VarKeyword,
}

/// Positional parameters come first, keyword parameters last.
pub const ARGUMENT_ORDER: [ParamKind; 5] = [
    ParamKind::PositionalOnly,
    ParamKind::PositionalOrKeyword,
    ParamKind::VarPositional,
    ParamKind::KeywordOnly,
    ParamKind::VarKeyword,
];

impl ParamKind {
    pub const fn is_variadic(&self) -> bool {
        matches!(self, ParamKind::VarPositional | ParamKind::VarKeyword)
    }

    pub const fn is_positional(&self) -> bool {
        matches!(
            self,
            ParamKind::PositionalOnly | ParamKind::PositionalOrKeyword
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub has_default: bool,
}

impl Param {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Param {
            name: name.into(),
            kind,
            has_default: false,
        }
    }

    pub fn positional(name: impl Into<String>) -> Self {
        Param::new(name, ParamKind::PositionalOrKeyword)
    }

    pub fn positional_only(name: impl Into<String>) -> Self {
        Param::new(name, ParamKind::PositionalOnly)
    }

    pub fn keyword_only(name: impl Into<String>) -> Self {
        Param::new(name, ParamKind::KeywordOnly)
    }

    pub fn var_positional(name: impl Into<String>) -> Self {
        Param::new(name, ParamKind::VarPositional)
    }

    pub fn var_keyword(name: impl Into<String>) -> Self {
        Param::new(name, ParamKind::VarKeyword)
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    fn takes_keyword(&self) -> bool {
        matches!(
            self.kind,
            ParamKind::PositionalOrKeyword | ParamKind::KeywordOnly
        )
    }
}

impl Display for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ParamKind::VarPositional => write!(f, "*{}", self.name),
            ParamKind::VarKeyword => write!(f, "**{}", self.name),
            _ if self.has_default => write!(f, "{}=...", self.name),
            _ => write!(f, "{}", self.name),
        }
    }
}

/// Formal parameter list of a callable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    pub fn new(params: Vec<Param>) -> Result<Self> {
        let signature = Signature { params };
        signature.validate()?;
        Ok(signature)
    }

    pub fn empty() -> Self {
        Signature::default()
    }

    /// Accepts any call, `(*args, **kwargs)`.
    pub fn variadic() -> Self {
        Signature {
            params: vec![Param::var_positional("args"), Param::var_keyword("kwargs")],
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidSignature {
            signature: self.to_string(),
            reason: reason.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for param in &self.params {
            if !is_identifier(&param.name) {
                return Err(self.invalid(format!("'{}' is not a valid name", param.name)));
            }
            if !names.insert(param.name.as_str()) {
                return Err(self.invalid(format!("duplicate parameter '{}'", param.name)));
            }
        }
        for (a, b) in self.params.iter().tuple_windows() {
            if a.kind > b.kind || (a.kind == b.kind && a.kind.is_variadic()) {
                return Err(self.invalid(format!("'{b}' cannot follow '{a}'")));
            }
        }
        Ok(())
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn has_kind(&self, kind: ParamKind) -> bool {
        self.params.iter().any(|p| p.kind == kind)
    }

    /// Whether a call may pass `name` as a keyword to this callable.
    pub fn accepts_keyword(&self, name: &str) -> bool {
        self.get(name).map_or(false, Param::takes_keyword) || self.has_kind(ParamKind::VarKeyword)
    }

    /// Union of `signatures`, grouped by kind and deduplicated by name.
    ///
    /// Within a kind, earlier signatures come first and the first occurrence of a name wins.
    /// At most one parameter of each variadic kind is kept.
    pub fn merge<'a>(signatures: impl IntoIterator<Item = &'a Signature>) -> Signature {
        let signatures = signatures.into_iter().collect_vec();
        if let [only] = signatures.as_slice() {
            return (*only).clone();
        }
        let mut seen = HashSet::new();
        let mut params: Vec<Param> = Vec::new();
        for kind in ARGUMENT_ORDER {
            for signature in &signatures {
                for param in signature.params.iter().filter(|p| p.kind == kind) {
                    if kind.is_variadic() && params.iter().any(|p| p.kind == kind) {
                        continue;
                    }
                    if seen.insert(param.name.as_str()) {
                        params.push(param.clone());
                    }
                }
            }
        }
        Signature { params }
    }

    /// Validates a concrete call against this parameter list.
    pub fn check(&self, args: &Args) -> Result<()> {
        let positional = self
            .params
            .iter()
            .filter(|p| p.kind.is_positional())
            .collect_vec();
        let var_positional = self.has_kind(ParamKind::VarPositional);
        let var_keyword = self.has_kind(ParamKind::VarKeyword);

        if args.positional.len() > positional.len() && !var_positional {
            return Err(Error::TooManyPositional {
                expected: positional.len(),
                got: args.positional.len(),
            });
        }
        for (i, param) in positional.iter().enumerate() {
            let by_position = i < args.positional.len();
            let by_keyword = args.keywords.contains_key(&param.name);
            match param.kind {
                ParamKind::PositionalOnly if by_keyword && !var_keyword => {
                    return Err(Error::PositionalOnlyAsKeyword(param.name.clone()));
                }
                ParamKind::PositionalOrKeyword if by_position && by_keyword => {
                    return Err(Error::MultipleValues(param.name.clone()));
                }
                _ => {}
            }
            let supplied = by_position || (by_keyword && param.takes_keyword());
            if !supplied && !param.has_default {
                return Err(Error::MissingArgument(param.name.clone()));
            }
        }
        for param in self.params.iter().filter(|p| p.kind == ParamKind::KeywordOnly) {
            if !param.has_default && !args.keywords.contains_key(&param.name) {
                return Err(Error::MissingArgument(param.name.clone()));
            }
        }
        self.check_keywords(args)
    }

    /// Rejects keywords no parameter of this signature can receive.
    pub fn check_keywords(&self, args: &Args) -> Result<()> {
        if self.has_kind(ParamKind::VarKeyword) {
            return Ok(());
        }
        match args.keywords.keys().find(|name| {
            self.get(name)
                .map_or(true, |p| p.kind.is_variadic() || p.kind == ParamKind::PositionalOnly)
        }) {
            Some(name) => Err(Error::UnexpectedKeyword(name.clone())),
            None => Ok(()),
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .map_or(false, |c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

impl FromStr for Signature {
    type Err = Error;

    /// Parses the familiar descriptor notation, e.g. `x, /, bar, *, foo=...`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidSignature {
            signature: s.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix('(')
            .and_then(|b| b.strip_suffix(')'))
            .unwrap_or(trimmed)
            .trim();
        if body.is_empty() {
            return Ok(Signature::empty());
        }

        let mut params: Vec<Param> = Vec::new();
        let mut kind = ParamKind::PositionalOrKeyword;
        let mut slash = false;
        let mut bare_star = false;
        for token in body.split(',').map(str::trim) {
            match token {
                "" => return Err(invalid("empty parameter")),
                "/" => {
                    if slash || kind != ParamKind::PositionalOrKeyword || params.is_empty() {
                        return Err(invalid("'/' must follow the positional parameters"));
                    }
                    slash = true;
                    params
                        .iter_mut()
                        .for_each(|p| p.kind = ParamKind::PositionalOnly);
                }
                "*" => {
                    if kind == ParamKind::KeywordOnly {
                        return Err(invalid("'*' may appear only once"));
                    }
                    kind = ParamKind::KeywordOnly;
                    bare_star = true;
                }
                _ => {
                    if let Some(name) = token.strip_prefix("**") {
                        params.push(Param::var_keyword(name));
                    } else if let Some(name) = token.strip_prefix('*') {
                        if kind == ParamKind::KeywordOnly {
                            return Err(invalid("'*' may appear only once"));
                        }
                        params.push(Param::var_positional(name));
                        kind = ParamKind::KeywordOnly;
                    } else {
                        let (name, has_default) = match token.split_once('=') {
                            Some((name, _)) => (name.trim(), true),
                            None => (token, false),
                        };
                        bare_star = false;
                        let param = Param::new(name, kind);
                        params.push(if has_default { param.with_default() } else { param });
                    }
                }
            }
        }
        if bare_star {
            return Err(invalid("named parameters must follow bare '*'"));
        }
        Signature::new(params).map_err(|err| match err {
            Error::InvalidSignature { reason, .. } => invalid(&reason),
            err => err,
        })
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::with_capacity(self.params.len() + 2);
        let var_positional = self.has_kind(ParamKind::VarPositional);
        for (i, param) in self.params.iter().enumerate() {
            if param.kind == ParamKind::KeywordOnly
                && !var_positional
                && self.params[..i].iter().all(|p| p.kind != ParamKind::KeywordOnly)
            {
                parts.push("*".to_string());
            }
            parts.push(param.to_string());
            let next = self.params.get(i + 1).map(|p| p.kind);
            if param.kind == ParamKind::PositionalOnly && next != Some(ParamKind::PositionalOnly) {
                parts.push("/".to_string());
            }
        }
        write!(f, "({})", parts.join(", "))
    }
}
