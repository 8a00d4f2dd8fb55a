//! Structured descriptors for the additive terms of a model formula.
//!
//! A [`ModelSpec`](crate::ModelSpec) never stores formula text. It keeps a stack of
//! [`Fragment`]s, each holding the [`Term`]s produced by one call, and renders the
//! formula string only when it is displayed or resolved.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An argument passed to a transform after the leading column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    /// The row's value in another column.
    Column(String),
    /// A literal number.
    Value(f64),
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::Column(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Self::Column(value)
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Self::Value(value)
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Self::Value(f64::from(value))
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(name) => write_name(f, name),
            Self::Value(value) => write!(f, "{value}"),
        }
    }
}

/// One additive term of the right-hand side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Term {
    /// A column used as-is.
    Column { name: String },
    /// A registered transform applied row-wise to `column` and `args`.
    Call {
        function: String,
        column: String,
        args: Vec<Arg>,
    },
}

impl Term {
    /// A term that uses the named column directly.
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column { name: name.into() }
    }

    /// A term that calls `function` on `column` followed by `args`.
    pub fn call(function: impl Into<String>, column: impl Into<String>, args: Vec<Arg>) -> Self {
        Self::Call {
            function: function.into(),
            column: column.into(),
            args,
        }
    }

    /// Every column this term reads.
    pub fn referenced_columns(&self) -> Vec<&str> {
        match self {
            Self::Column { name } => vec![name.as_str()],
            Self::Call { column, args, .. } => std::iter::once(column.as_str())
                .chain(args.iter().filter_map(|arg| match arg {
                    Arg::Column(name) => Some(name.as_str()),
                    Arg::Value(_) => None,
                }))
                .collect(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column { name } => write_name(f, name),
            Self::Call {
                function,
                column,
                args,
            } => {
                write!(f, "{function}(")?;
                write_name(f, column)?;
                for arg in args {
                    write!(f, ", {arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// The terms added by a single mutating call; the unit of undo.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    terms: Vec<Term>,
}

impl Fragment {
    /// Groups the terms of one call into a fragment.
    pub fn new(terms: Vec<Term>) -> Self {
        Self { terms }
    }

    /// A fragment holding a single term.
    pub fn single(term: Term) -> Self {
        Self { terms: vec![term] }
    }

    /// Terms in the order they were generated.
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, term) in self.terms.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            write!(f, "+ {term}")?;
        }
        Ok(())
    }
}

/// Extra arguments for [`ModelSpec::add_function_feature`](crate::ModelSpec::add_function_feature).
///
/// Every element of `Each` or `EachTuple` yields one generated term, and all of them
/// land in the same fragment.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ExtraArgs {
    /// `f(column)`.
    #[default]
    None,
    /// `f(column, v)` for every `v`.
    Each(Vec<Arg>),
    /// `f(column, a, b, ...)` for every list.
    EachTuple(Vec<Vec<Arg>>),
}

impl ExtraArgs {
    /// Builds [`ExtraArgs::EachTuple`] from nested lists.
    pub fn tuples<T: Into<Arg>>(lists: Vec<Vec<T>>) -> Self {
        Self::EachTuple(
            lists
                .into_iter()
                .map(|list| list.into_iter().map(Into::into).collect())
                .collect(),
        )
    }

    /// Argument lists of the generated terms, following the leading column.
    pub(crate) fn into_arg_lists(self) -> Vec<Vec<Arg>> {
        match self {
            Self::None => vec![Vec::new()],
            Self::Each(values) if values.is_empty() => vec![Vec::new()],
            Self::Each(values) => values.into_iter().map(|value| vec![value]).collect(),
            Self::EachTuple(lists) if lists.is_empty() => vec![Vec::new()],
            Self::EachTuple(lists) => lists,
        }
    }
}

impl<T: Into<Arg>> From<Vec<T>> for ExtraArgs {
    fn from(values: Vec<T>) -> Self {
        Self::Each(values.into_iter().map(Into::into).collect())
    }
}

/// Whether `name` can appear in a formula without quoting.
pub fn is_plain_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Writes a column name, backtick-quoting it when needed. Backticks inside the
/// name are doubled.
fn write_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if is_plain_name(name) {
        f.write_str(name)
    } else {
        write!(f, "`{}`", name.replace('`', "``"))
    }
}
