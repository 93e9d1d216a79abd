//! Path-pattern parsing and extraction.
//!
//! A [`Pattern`] is a parsed path template: a sequence of literal segments,
//! `:name` parameter segments, and an optional terminal `*` wildcard. It is
//! the unit both `PatternMap` keys its trie on and that a matched
//! [`crate::entity::WebEntity`] re-runs against the concrete request path to
//! bind parameters.

use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::fmt;

/// One element of a parsed pattern.
#[derive(Debug, Clone)]
pub enum Token {
    Literal(String),
    Parameter(String),
    /// Only ever the final token of a pattern.
    Wildcard,
}

/// `exact` patterns must consume the whole path; `forward` patterns end in a
/// terminal wildcard and consume any suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Exact,
    Forward,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("wildcard '*' is only valid as the final path segment")]
    WildcardNotFinal,
    #[error("parameter name must be non-empty (segment was bare ':')")]
    EmptyParameterName,
    #[error("duplicate parameter name ':{0}' in pattern")]
    DuplicateParameter(String),
}

/// A parsed path template.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    case_sensitive: bool,
    tokens: Vec<Token>,
    kind: PatternKind,
}

/// The result of successfully matching a concrete path against an `exact` or
/// `forward` pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Leading literal segment values, in pattern order, percent-decoded.
    pub first: Vec<String>,
    /// Parameter bindings, percent-decoded per segment.
    pub params: HashMap<String, String>,
    /// Trailing segments consumed by a terminal wildcard, percent-decoded.
    pub last: Vec<String>,
}

impl Pattern {
    /// Parse `raw` into tokens. Case sensitivity governs later comparisons in
    /// `extract` and in `PartialEq`.
    pub fn new(raw: impl Into<String>, case_sensitive: bool) -> Result<Self, PatternError> {
        let raw = raw.into();
        let tokens = tokenize(&raw)?;
        let kind = if matches!(tokens.last(), Some(Token::Wildcard)) {
            PatternKind::Forward
        } else {
            PatternKind::Exact
        };
        Ok(Self {
            raw,
            case_sensitive,
            tokens,
            kind,
        })
    }

    /// Build a pattern whose tokens are literal copies of `path`'s segments —
    /// used to turn a concrete request path into a lookup key that never
    /// re-interprets `:` or `*`.
    pub fn escape(path: &str, case_sensitive: bool) -> Self {
        let tokens = split_segments(path)
            .into_iter()
            .map(|s| Token::Literal(s.to_string()))
            .collect();
        Self {
            raw: path.to_string(),
            case_sensitive,
            tokens,
            kind: PatternKind::Exact,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn is_exact(&self) -> bool {
        self.kind == PatternKind::Exact
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Match `request_path` against this pattern, binding parameters and
    /// (for `forward` patterns) the wildcard tail. Percent-decodes each
    /// matched segment independently, so `%2F` is never treated as `/`.
    pub fn extract(&self, request_path: &str) -> Option<Extraction> {
        let segments = split_segments(request_path);
        let mut out = Extraction::default();
        let mut idx = 0usize;

        for token in &self.tokens {
            match token {
                Token::Literal(lit) => {
                    let seg = segments.get(idx)?;
                    let decoded = decode_segment(seg);
                    let matches = if self.case_sensitive {
                        decoded == *lit
                    } else {
                        decoded.eq_ignore_ascii_case(lit)
                    };
                    if !matches {
                        return None;
                    }
                    out.first.push(decoded);
                    idx += 1;
                }
                Token::Parameter(name) => {
                    let seg = segments.get(idx)?;
                    out.params.insert(name.clone(), decode_segment(seg));
                    idx += 1;
                }
                Token::Wildcard => {
                    out.last = segments[idx..].iter().map(|s| decode_segment(s)).collect();
                    return Some(out);
                }
            }
        }

        if idx != segments.len() {
            return None;
        }
        Some(out)
    }
}

impl PartialEq for Pattern {
    /// Two patterns are equal iff their token sequences are pointwise equal
    /// modulo case per the case-sensitivity flag.
    fn eq(&self, other: &Self) -> bool {
        if self.tokens.len() != other.tokens.len() {
            return false;
        }
        let case_sensitive = self.case_sensitive;
        self.tokens
            .iter()
            .zip(other.tokens.iter())
            .all(|(a, b)| tokens_equal(a, b, case_sensitive))
    }
}
impl Eq for Pattern {}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

fn tokens_equal(a: &Token, b: &Token, case_sensitive: bool) -> bool {
    match (a, b) {
        (Token::Wildcard, Token::Wildcard) => true,
        (Token::Parameter(x), Token::Parameter(y)) => {
            if case_sensitive {
                x == y
            } else {
                x.eq_ignore_ascii_case(y)
            }
        }
        (Token::Literal(x), Token::Literal(y)) => {
            if case_sensitive {
                x == y
            } else {
                x.eq_ignore_ascii_case(y)
            }
        }
        _ => false,
    }
}

fn tokenize(raw: &str) -> Result<Vec<Token>, PatternError> {
    let segments = split_segments(raw);
    if segments.first().copied() == Some("*") && segments.len() > 1 {
        // Structurally unreachable below (wildcard-not-final already rejects
        // this), kept as an explicit check for "may not start with `*/`".
        return Err(PatternError::WildcardNotFinal);
    }

    let mut tokens = Vec::with_capacity(segments.len());
    let mut seen_params = std::collections::HashSet::new();
    let last_idx = segments.len().saturating_sub(1);

    for (i, seg) in segments.iter().enumerate() {
        if *seg == "*" {
            if i != last_idx {
                return Err(PatternError::WildcardNotFinal);
            }
            tokens.push(Token::Wildcard);
        } else if let Some(name) = seg.strip_prefix(':') {
            if name.is_empty() {
                return Err(PatternError::EmptyParameterName);
            }
            if !seen_params.insert(name.to_string()) {
                return Err(PatternError::DuplicateParameter(name.to_string()));
            }
            tokens.push(Token::Parameter(name.to_string()));
        } else {
            tokens.push(Token::Literal((*seg).to_string()));
        }
    }

    Ok(tokens)
}

fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn decode_segment(seg: &str) -> String {
    percent_decode_str(seg)
        .decode_utf8()
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| seg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_vs_forward_kind() {
        let p = Pattern::new("/users/:id", true).unwrap();
        assert_eq!(p.kind(), PatternKind::Exact);
        let p = Pattern::new("/users/*", true).unwrap();
        assert_eq!(p.kind(), PatternKind::Forward);
    }

    #[test]
    fn wildcard_must_be_final() {
        assert_eq!(
            Pattern::new("/*/users", true).unwrap_err(),
            PatternError::WildcardNotFinal
        );
    }

    #[test]
    fn parameter_name_must_be_nonempty_and_unique() {
        assert_eq!(
            Pattern::new("/users/:", true).unwrap_err(),
            PatternError::EmptyParameterName
        );
        assert_eq!(
            Pattern::new("/:id/nested/:id", true).unwrap_err(),
            PatternError::DuplicateParameter("id".to_string())
        );
    }

    #[test]
    fn extract_binds_percent_decoded_parameter_without_splitting_encoded_slash() {
        let p = Pattern::new("/users/:id", true).unwrap();
        let e = p.extract("/users/42%2Fadmin").unwrap();
        assert_eq!(e.params.get("id").unwrap(), "42/admin");
    }

    #[test]
    fn extract_fails_on_structural_mismatch() {
        let p = Pattern::new("/users/:id", true).unwrap();
        assert!(p.extract("/users").is_none());
        assert!(p.extract("/users/42/extra").is_none());
        assert!(p.extract("/other/42").is_none());
    }

    #[test]
    fn forward_pattern_consumes_remainder_into_last() {
        let p = Pattern::new("/static/*", true).unwrap();
        let e = p.extract("/static/css/app.css").unwrap();
        assert_eq!(e.first, vec!["static".to_string()]);
        assert_eq!(e.last, vec!["css".to_string(), "app.css".to_string()]);
    }

    #[test]
    fn case_insensitive_literal_match() {
        let p = Pattern::new("/Users", false).unwrap();
        assert!(p.extract("/users").is_some());
        let p = Pattern::new("/Users", true).unwrap();
        assert!(p.extract("/users").is_none());
    }

    #[test]
    fn equality_is_token_sequence_modulo_case() {
        let a = Pattern::new("/users/:id", false).unwrap();
        let b = Pattern::new("/Users/:ID", false).unwrap();
        assert_eq!(a, b);
        let c = Pattern::new("/users/:id", true).unwrap();
        let d = Pattern::new("/Users/:id", true).unwrap();
        assert_ne!(c, d);
    }

    #[test]
    fn round_trip_literal_and_wildcard_pattern() {
        let p = Pattern::new("/a/b/*", true).unwrap();
        let path = "/a/b/c/d";
        let e = p.extract(path).unwrap();
        let mut reconstructed = String::new();
        for seg in e.first.iter().chain(e.last.iter()) {
            reconstructed.push('/');
            reconstructed.push_str(seg);
        }
        assert_eq!(reconstructed, path);
    }
}
