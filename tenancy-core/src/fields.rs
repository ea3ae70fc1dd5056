//! Field selectors over the indexable fields a strategy exposes for an object
//!
//! Only equality based requirements exist for fields: `=`, `==` and `!=`.
//! Values are taken verbatim; a literal `\`, `,` or `=` in a value is escaped with a backslash.
use crate::labels::{valid_key, ParseError};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// Field name to value, as produced by a strategy's attribute function
pub type Fields = BTreeMap<String, String>;

/// A single field requirement
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Requirement {
    /// The field must have this value
    Equal(String, String),
    /// The field must not have this value
    NotEqual(String, String),
}

impl Requirement {
    /// The field this requirement is about
    pub fn field(&self) -> &str {
        match self {
            Requirement::Equal(f, _) | Requirement::NotEqual(f, _) => f,
        }
    }

    // Missing fields compare as the empty string
    fn matches(&self, fields: &Fields) -> bool {
        let actual = fields.get(self.field()).map(String::as_str).unwrap_or_default();
        match self {
            Requirement::Equal(_, v) => actual == v,
            Requirement::NotEqual(_, v) => actual != v,
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Equal(k, v) => write!(f, "{k}={}", escape_value(v)),
            Requirement::NotEqual(k, v) => write!(f, "{k}!={}", escape_value(v)),
        }
    }
}

/// Escapes `value` so it reads back as a single field selector value
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ',' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn unescape_value(value: &str) -> Result<String, &'static str> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(c @ ('\\' | ',' | '=')) => out.push(c),
                _ => return Err("invalid escape sequence in value"),
            },
            ',' | '=' => return Err("values must escape = and ,"),
            c => out.push(c),
        }
    }
    Ok(out)
}

// Splits on commas not preceded by an escaping backslash
fn split_terms(s: &str) -> Vec<&str> {
    let mut terms = vec![];
    let (mut start, mut escaped) = (0, false);
    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                terms.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    terms.push(&s[start..]);
    terms
}

// The key, whether the operator negates, and the raw value around the first unescaped operator
fn split_term(term: &str) -> Option<(&str, bool, &str)> {
    let mut escaped = false;
    for (i, c) in term.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '!' if term[i + 1..].starts_with('=') => return Some((&term[..i], true, &term[i + 2..])),
            '=' if term[i + 1..].starts_with('=') => return Some((&term[..i], false, &term[i + 2..])),
            '=' => return Some((&term[..i], false, &term[i + 1..])),
            _ => {}
        }
    }
    None
}

/// A conjunction of field requirements; empty selects everything
#[derive(Clone, Debug, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct FieldSelector(Vec<Requirement>);

impl FieldSelector {
    /// A selector requiring `field` to equal `value`
    pub fn one_term_equal(field: &str, value: &str) -> Self {
        Self(vec![Requirement::Equal(field.into(), value.into())])
    }

    /// Both `self` and `other` must hold
    #[must_use]
    pub fn and(mut self, other: FieldSelector) -> Self {
        self.0.extend(other.0);
        self
    }

    /// Whether every requirement holds for `fields`
    pub fn matches(&self, fields: &Fields) -> bool {
        self.0.iter().all(|r| r.matches(fields))
    }

    /// The requirements of this selector
    pub fn requirements(&self) -> &[Requirement] {
        &self.0
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&terms.join(","))
    }
}

impl FromStr for FieldSelector {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |term: &str, message: &str| ParseError {
            selector: s.into(),
            term: term.into(),
            message: message.into(),
        };
        let mut reqs = vec![];
        for term in split_terms(s).into_iter().filter(|t| !t.trim().is_empty()) {
            let Some((key, negate, raw)) = split_term(term) else {
                return Err(err(term, "field selectors only support =, == and !="));
            };
            let key = key.trim();
            if !valid_key(key) {
                return Err(err(term, "invalid field name"));
            }
            let value = unescape_value(raw).map_err(|message| err(term, message))?;
            reqs.push(if negate {
                Requirement::NotEqual(key.into(), value)
            } else {
                Requirement::Equal(key.into(), value)
            });
        }
        Ok(Self(reqs))
    }
}
