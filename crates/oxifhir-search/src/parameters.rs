use serde::{Deserialize, Serialize};
use std::fmt;

/// The search parameter shapes this engine dispatches on.
///
/// Each shape determines the predicate built for a value: substring match,
/// exact equality, range comparison, or reference match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchParameterType {
    String,
    Token,
    Date,
    Reference,
    Number,
    Quantity,
}

impl SearchParameterType {
    /// Parse a search parameter type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "token" => Some(Self::Token),
            "date" => Some(Self::Date),
            "reference" => Some(Self::Reference),
            "number" => Some(Self::Number),
            "quantity" => Some(Self::Quantity),
            _ => None,
        }
    }

    /// Returns `true` for types whose values carry comparison semantics.
    #[must_use]
    pub fn is_ordinal(self) -> bool {
        matches!(self, Self::Date | Self::Number | Self::Quantity)
    }
}

impl fmt::Display for SearchParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Token => "token",
            Self::Date => "date",
            Self::Reference => "reference",
            Self::Number => "number",
            Self::Quantity => "quantity",
        };
        f.write_str(s)
    }
}

/// Comparison prefixes for search values, e.g. `ge2020-01-01`, `lt5.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchPrefix {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Sa, // starts after
    Eb, // ends before
    Ap, // approximately
}

impl SearchPrefix {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "lt" => Some(Self::Lt),
            "ge" => Some(Self::Ge),
            "le" => Some(Self::Le),
            "sa" => Some(Self::Sa),
            "eb" => Some(Self::Eb),
            "ap" => Some(Self::Ap),
            _ => None,
        }
    }

    /// Maps the prefix to its SQL comparison operator.
    ///
    /// `sa` and `ap` reuse `>` and `=` rather than implementing full
    /// started-after / approximately semantics.
    #[must_use]
    pub fn as_sql_operator(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Sa => ">",
            Self::Eb => "<",
            Self::Ap => "=",
        }
    }
}

impl fmt::Display for SearchPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Ge => "ge",
            Self::Le => "le",
            Self::Sa => "sa",
            Self::Eb => "eb",
            Self::Ap => "ap",
        };
        f.write_str(s)
    }
}
