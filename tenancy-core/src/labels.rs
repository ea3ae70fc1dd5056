//! Label selectors: parsing the api string form and matching it against object labels
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};
use thiserror::Error;

// local type aliases
type Map = BTreeMap<String, String>;
type Expressions = Vec<Expression>;

/// A selector string could not be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unable to parse requirement {term:?} in selector {selector:?}: {message}")]
pub struct ParseError {
    /// The full selector string
    pub selector: String,
    /// The offending requirement
    pub term: String,
    /// What was wrong with it
    pub message: String,
}

impl From<ParseError> for crate::Error {
    fn from(err: ParseError) -> Self {
        crate::Error::BadRequest(err.to_string())
    }
}

/// A selector expression with existing operations
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Expression {
    In(String, BTreeSet<String>),
    NotIn(String, BTreeSet<String>),
    Equal(String, String),
    NotEqual(String, String),
    Exists(String),
    DoesNotExist(String),
}

/// Perform selection on a list of expressions
///
/// All expressions must match; an empty selector matches everything.
#[derive(Clone, Debug, Eq, PartialEq, Default, Deserialize, Serialize)]
pub struct Selector(Expressions);

impl Selector {
    /// Convert a selector to its api string form
    pub fn to_selector_string(&self) -> String {
        let selectors: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        selectors.join(",")
    }

    /// Whether every expression holds for `labels`
    pub fn matches(&self, labels: &Map) -> bool {
        self.0.iter().all(|expr| expr.matches(labels))
    }
}

// === Expression ===

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::In(key, values) => {
                write!(f, "{key} in ({})", values.iter().cloned().collect::<Vec<_>>().join(","))
            }
            Expression::NotIn(key, values) => {
                write!(
                    f,
                    "{key} notin ({})",
                    values.iter().cloned().collect::<Vec<_>>().join(",")
                )
            }
            Expression::Equal(key, value) => write!(f, "{key}={value}"),
            Expression::NotEqual(key, value) => write!(f, "{key}!={value}"),
            Expression::Exists(key) => write!(f, "{key}"),
            Expression::DoesNotExist(key) => write!(f, "!{key}"),
        }
    }
}

impl Expression {
    fn matches(&self, labels: &Map) -> bool {
        match self {
            Expression::In(key, values) => match labels.get(key) {
                Some(v) => values.contains(v),
                None => false,
            },
            Expression::NotIn(key, values) => match labels.get(key) {
                Some(v) => !values.contains(v),
                None => true,
            },
            Expression::Exists(key) => labels.contains_key(key),
            Expression::DoesNotExist(key) => !labels.contains_key(key),
            Expression::Equal(key, value) => labels.get(key) == Some(value),
            Expression::NotEqual(key, value) => labels.get(key) != Some(value),
        }
    }
}

// === Parsing ===

/// Split `s` on commas that are not inside a parenthesised value set
fn split_terms(s: &str) -> Vec<&str> {
    let mut terms = vec![];
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                terms.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    terms.push(&s[start..]);
    terms.into_iter().map(str::trim).filter(|t| !t.is_empty()).collect()
}

pub(crate) fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
}

fn parse_set(raw: &str) -> Option<BTreeSet<String>> {
    let inner = raw.trim().strip_prefix('(')?.strip_suffix(')')?;
    Some(
        inner
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect(),
    )
}

fn parse_term(term: &str) -> Result<Expression, String> {
    if let Some(key) = term.strip_prefix('!') {
        let key = key.trim();
        return if valid_key(key) {
            Ok(Expression::DoesNotExist(key.into()))
        } else {
            Err("invalid label key".into())
        };
    }
    if let Some(idx) = term.find('(') {
        let mut words = term[..idx].split_whitespace();
        let (key, op) = match (words.next(), words.next(), words.next()) {
            (Some(key), Some(op), None) => (key, op),
            _ => return Err("expected `<key> in (...)` or `<key> notin (...)`".into()),
        };
        if !valid_key(key) {
            return Err("invalid label key".into());
        }
        let values = parse_set(&term[idx..]).ok_or("unterminated value set")?;
        return match op {
            "in" => Ok(Expression::In(key.into(), values)),
            "notin" => Ok(Expression::NotIn(key.into(), values)),
            other => Err(format!("unknown set operator {other:?}")),
        };
    }
    let (key, value, negate) = if let Some((k, v)) = term.split_once("!=") {
        (k, v, true)
    } else if let Some((k, v)) = term.split_once("==") {
        (k, v, false)
    } else if let Some((k, v)) = term.split_once('=') {
        (k, v, false)
    } else {
        let key = term.trim();
        return if valid_key(key) {
            Ok(Expression::Exists(key.into()))
        } else {
            Err("invalid label key".into())
        };
    };
    let (key, value) = (key.trim(), value.trim());
    if !valid_key(key) {
        return Err("invalid label key".into());
    }
    if value.contains(['=', '!', '(', ')', ' ']) {
        return Err("invalid label value".into());
    }
    Ok(if negate {
        Expression::NotEqual(key.into(), value.into())
    } else {
        Expression::Equal(key.into(), value.into())
    })
}

impl FromStr for Selector {
    type Err = ParseError;

    /// Parse the api string form, e.g. `app=web,tier in (a,b),!legacy`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        split_terms(s)
            .into_iter()
            .map(|term| {
                parse_term(term).map_err(|message| ParseError {
                    selector: s.into(),
                    term: term.into(),
                    message,
                })
            })
            .collect::<Result<_, _>>()
            .map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Map {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_raw_matches() {
        for (selector, labels, matches, msg) in &[
            (Selector::default(), Map::default(), true, "empty match"),
            (
                Selector(vec![Expression::Equal("foo".into(), "bar".into())]),
                labels(&[("foo", "bar"), ("bah", "baz")]),
                true,
                "sufficient label match",
            ),
            (
                Selector(vec![Expression::NotEqual("foo".into(), "bar".into())]),
                labels(&[("foo", "bar")]),
                false,
                "NotEqual expression match",
            ),
            (
                Selector(vec![Expression::NotIn("foo".into(), ["quux".into()].into())]),
                labels(&[("foo", "bar")]),
                true,
                "NotIn expression match",
            ),
            (
                Selector(vec![
                    Expression::Equal("foo".to_string(), "bar".to_string()),
                    Expression::In("bah".into(), ["bar".into()].into()),
                ]),
                labels(&[("foo", "bar"), ("bah", "baz")]),
                false,
                "matches labels but not expressions",
            ),
        ] {
            assert_eq!(selector.matches(labels), *matches, "{}", msg);
        }
    }

    #[test]
    fn test_to_selector_string() {
        let selector = Selector(vec![
            Expression::In("foo".into(), ["bar".into(), "baz".into()].into()),
            Expression::NotIn("foo".into(), ["bar".into(), "baz".into()].into()),
            Expression::Equal("foo".into(), "bar".into()),
            Expression::NotEqual("foo".into(), "bar".into()),
            Expression::Exists("foo".into()),
            Expression::DoesNotExist("foo".into()),
        ])
        .to_selector_string();

        assert_eq!(
            selector,
            "foo in (bar,baz),foo notin (bar,baz),foo=bar,foo!=bar,foo,!foo"
        )
    }

    #[test]
    fn parses_its_own_string_form() {
        let raw = "foo in (bar,baz),foo notin (qux),env==prod,tier!=db,app,!legacy";
        let selector: Selector = raw.parse().unwrap();
        assert_eq!(selector.0.len(), 6);
        assert_eq!(
            selector.to_selector_string(),
            "foo in (bar,baz),foo notin (qux),env=prod,tier!=db,app,!legacy"
        );
        assert!(selector.matches(&labels(&[("foo", "bar"), ("env", "prod"), ("app", "x")])));
        assert!(!selector.matches(&labels(&[("foo", "bar"), ("env", "prod"), ("app", "x"), ("legacy", "")])));
    }

    #[test]
    fn empty_string_selects_all() {
        assert_eq!("".parse::<Selector>().unwrap(), Selector::default());
        assert_eq!(" , ".parse::<Selector>().unwrap(), Selector::default());
    }

    #[test]
    fn rejects_garbage() {
        for raw in ["foo in bar", "=x", "a b c (d)", "foo=(x)", "k in (a"] {
            let err = raw.parse::<Selector>().unwrap_err();
            assert_eq!(err.selector, raw, "{raw}");
        }
    }
}
