//! Header value grammars: a generic `value *( ; name=value )`
//! grammar and a credentials grammar (`authorization` / `www-authenticate`),
//! both built on top of the outer/fine tokenisers in [`tokenizer`].

pub mod tokenizer;

use std::collections::HashMap;
use tokenizer::{fine_tokenize, outer_tokenize, FineToken, HeaderParseError};

/// One comma-separated member of a parsed header field. Parameter names are stored lowercased; values that
/// were quoted on the wire are already unescaped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderDescriptor {
    pub value: String,
    pub params: Option<HashMap<String, String>>,
}

impl HeaderDescriptor {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            params: None,
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.as_ref()?.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    fn insert_param(&mut self, name: String, value: String) {
        self.params
            .get_or_insert_with(HashMap::new)
            .insert(name.to_ascii_lowercase(), value);
    }
}

/// `true` iff every character of `s` is a valid RFC 7230 `tchar`.
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| {
            c.is_ascii_alphanumeric()
                || "!#$%&'*+-.^_`|~".contains(c)
        })
}

/// Render `value` as a bare token if possible, otherwise as a quoted-string
/// with `"` and `\` escaped.
pub fn quote_if_needed(value: &str) -> String {
    if is_token(value) {
        value.to_string()
    } else {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('"');
        for c in value.chars() {
            if c == '"' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('"');
        out
    }
}

/// Split a fine-token stream into top-level chunks delimited by `delim`,
/// skipping leading/trailing whitespace in each chunk and dropping chunks
/// that are entirely whitespace (the `#rule` list grammar allows empty
/// members between delimiters).
fn split_top_level(tokens: &[FineToken], delim: char) -> Vec<Vec<FineToken>> {
    let mut chunks = Vec::new();
    let mut cur = Vec::new();
    for tok in tokens {
        match tok {
            FineToken::Delim(c) if *c == delim => {
                chunks.push(std::mem::take(&mut cur));
            }
            _ => cur.push(tok.clone()),
        }
    }
    chunks.push(cur);

    chunks
        .into_iter()
        .map(trim_whitespace)
        .filter(|c| !c.is_empty())
        .collect()
}

fn trim_whitespace(mut toks: Vec<FineToken>) -> Vec<FineToken> {
    while matches!(toks.first(), Some(FineToken::Whitespace)) {
        toks.remove(0);
    }
    while matches!(toks.last(), Some(FineToken::Whitespace)) {
        toks.pop();
    }
    toks
}

/// Render a run of fine tokens (no embedded top-level delimiters of the
/// caller's grammar) back into a plain string — whitespace runs collapse to
/// a single space, `Quoted`/`Word` content is taken verbatim.
fn render_tokens(toks: &[FineToken]) -> String {
    let mut out = String::new();
    for tok in toks {
        match tok {
            FineToken::Word(w) => out.push_str(w),
            FineToken::Quoted(q) => out.push_str(q),
            FineToken::Whitespace => {
                if !out.is_empty() && !out.ends_with(' ') {
                    out.push(' ');
                }
            }
            FineToken::Delim(c) => out.push(*c),
        }
    }
    out.trim().to_string()
}

// ---------------------------------------------------------------------------
// Generic grammar: `1#( field-value *( OWS ";" OWS name "=" value ) )`
// ---------------------------------------------------------------------------

/// Parse a header value under the generic grammar. Used for
/// every header that isn't in the specialisation table.
pub fn parse_generic(input: &str) -> Result<Vec<HeaderDescriptor>, HeaderParseError> {
    let outer = outer_tokenize(input)?;
    let fine = fine_tokenize(&outer, &[',', ';', '=']);
    let members = split_top_level(&fine, ',');
    if members.is_empty() {
        return Err(HeaderParseError::EmptyFieldValue);
    }

    let mut out = Vec::with_capacity(members.len());
    for member in members {
        let mut parts = split_top_level(&member, ';');
        if parts.is_empty() {
            return Err(HeaderParseError::EmptyFieldValue);
        }
        let value_toks = parts.remove(0);
        if value_toks.is_empty() {
            return Err(HeaderParseError::UnexpectedToken(
                "empty field-value before ';'".to_string(),
            ));
        }
        let mut desc = HeaderDescriptor::new(render_tokens(&value_toks));

        for param_toks in parts {
            let eq_idx = param_toks
                .iter()
                .position(|t| matches!(t, FineToken::Delim('=')));
            let eq_idx = eq_idx.ok_or_else(|| {
                HeaderParseError::UnexpectedToken(render_tokens(&param_toks))
            })?;
            let name = render_tokens(&param_toks[..eq_idx]);
            let value = render_tokens(&param_toks[eq_idx + 1..]);
            if name.is_empty() {
                return Err(HeaderParseError::UnexpectedToken(
                    "empty parameter name".to_string(),
                ));
            }
            desc.insert_param(name, value);
        }

        out.push(desc);
    }

    Ok(out)
}

/// Render descriptors produced by [`parse_generic`] back to wire form.
pub fn render_generic(descriptors: &[HeaderDescriptor]) -> String {
    descriptors
        .iter()
        .map(|d| {
            let mut s = d.value.clone();
            if let Some(params) = &d.params {
                let mut pairs: Vec<_> = params.iter().collect();
                pairs.sort_by(|a, b| a.0.cmp(b.0));
                for (name, value) in pairs {
                    s.push_str(&format!("; {}={}", name, quote_if_needed(value)));
                }
            }
            s
        })
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Credentials grammar: `credentials = auth-scheme [ 1*SP ( token68 / #auth-param ) ]`
// ---------------------------------------------------------------------------

const TOKEN68_CHARS: &str = "-._~+/";

fn is_token68_body(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || TOKEN68_CHARS.contains(c))
}

/// Parse a `#credentials` list.
/// `authorization` carries exactly one credential; `www-authenticate`
/// carries a list of challenges. Both use this parser.
pub fn parse_credentials_list(input: &str) -> Result<Vec<HeaderDescriptor>, HeaderParseError> {
    let outer = outer_tokenize(input)?;
    let fine = fine_tokenize(&outer, &[',', '=']);
    let chunks = split_top_level(&fine, ',');
    if chunks.is_empty() {
        return Err(HeaderParseError::EmptyFieldValue);
    }

    let mut out: Vec<HeaderDescriptor> = Vec::new();

    for chunk in chunks {
        let eq_idx = chunk.iter().position(|t| matches!(t, FineToken::Delim('=')));

        match eq_idx {
            None => {
                // Either a bare scheme, or "scheme SP token68".
                let words: Vec<&FineToken> = chunk
                    .iter()
                    .filter(|t| !matches!(t, FineToken::Whitespace))
                    .collect();
                let has_space = chunk.iter().any(|t| matches!(t, FineToken::Whitespace));
                if has_space {
                    // scheme SP token68-fragment (no trailing '=' padding, or
                    // '=' fell inside the Delim('=') branch below already).
                    let split_at = chunk
                        .iter()
                        .position(|t| matches!(t, FineToken::Whitespace))
                        .unwrap();
                    let scheme = render_tokens(&chunk[..split_at]).to_ascii_lowercase();
                    let rest = trim_whitespace(chunk[split_at..].to_vec());
                    let token68 = render_tokens(&rest);
                    if !is_token68_like(&token68) {
                        return Err(HeaderParseError::InvalidToken68(token68));
                    }
                    let mut desc = new_scheme_descriptor(&scheme);
                    desc.insert_param("token68".to_string(), token68);
                    out.push(desc);
                } else if words.len() == 1 {
                    let scheme = render_tokens(&chunk).to_ascii_lowercase();
                    out.push(new_scheme_descriptor(&scheme));
                } else {
                    return Err(HeaderParseError::UnexpectedToken(render_tokens(&chunk)));
                }
            }
            Some(idx) => {
                let prefix = trim_whitespace(chunk[..idx].to_vec());
                let has_internal_space = prefix.iter().any(|t| matches!(t, FineToken::Whitespace));

                if has_internal_space {
                    let split_at = prefix
                        .iter()
                        .position(|t| matches!(t, FineToken::Whitespace))
                        .unwrap();
                    let scheme = render_tokens(&prefix[..split_at]).to_ascii_lowercase();

                    // A padded token68 (e.g. "Basic dXNlcg==") also has an
                    // '=' in the chunk, but it isn't a name=value pair — the
                    // '=' is trailing padding on the single word after the
                    // scheme. Check that shape before assuming auth-param.
                    let rest = trim_whitespace(chunk[split_at..].to_vec());
                    if let Some(token68) = as_padded_token68(&rest) {
                        let mut desc = new_scheme_descriptor(&scheme);
                        desc.insert_param("token68".to_string(), token68);
                        out.push(desc);
                        continue;
                    }

                    // "scheme SP name=value": starts a new credential whose
                    // first auth-param is given inline.
                    let name = render_tokens(&trim_whitespace(prefix[split_at..].to_vec()))
                        .to_ascii_lowercase();
                    let value = decode_param_value(&chunk[idx + 1..]);
                    if name.is_empty() {
                        return Err(HeaderParseError::UnexpectedToken(
                            "empty parameter name".to_string(),
                        ));
                    }
                    let mut desc = new_scheme_descriptor(&scheme);
                    desc.insert_param(name, value);
                    out.push(desc);
                } else if !prefix.is_empty() {
                    // Bare "name=value": continues the current credential.
                    let name = render_tokens(&prefix).to_ascii_lowercase();
                    let value = decode_param_value(&chunk[idx + 1..]);
                    let desc = out.last_mut().ok_or_else(|| {
                        HeaderParseError::UnexpectedToken(format!(
                            "auth-param '{name}' with no preceding scheme"
                        ))
                    })?;
                    desc.insert_param(name, value);
                } else {
                    return Err(HeaderParseError::UnexpectedToken(render_tokens(&chunk)));
                }
            }
        }
    }

    Ok(out)
}

fn new_scheme_descriptor(scheme: &str) -> HeaderDescriptor {
    let mut desc = HeaderDescriptor::new(scheme.to_string());
    desc.insert_param("scheme".to_string(), scheme.to_string());
    desc
}

fn decode_param_value(toks: &[FineToken]) -> String {
    let trimmed = trim_whitespace(toks.to_vec());
    if trimmed.len() == 1 {
        if let FineToken::Quoted(s) = &trimmed[0] {
            return s.clone();
        }
    }
    render_tokens(&trimmed)
}

/// Does `toks` (already whitespace-trimmed) look like a single token68 word
/// followed by zero or more trailing `=` padding delimiters? Padding only
/// ever shows up as `Delim('=')` runs after the one `Word` — the fine
/// tokenizer never splits a token68 body itself, since its alphabet doesn't
/// include any of the credentials grammar's delimiters (`,` `=`).
fn as_padded_token68(toks: &[FineToken]) -> Option<String> {
    let mut iter = toks.iter();
    let word = match iter.next()? {
        FineToken::Word(w) => w.clone(),
        _ => return None,
    };
    let mut padding = 0usize;
    for tok in iter {
        match tok {
            FineToken::Delim('=') => padding += 1,
            _ => return None,
        }
    }
    let candidate = format!("{word}{}", "=".repeat(padding));
    is_token68_like(&candidate).then_some(candidate)
}

/// `token68 = 1*( ALPHA / DIGIT / "-" / "." / "_" / "~" / "+" / "/" ) *"="`.
fn is_token68_like(s: &str) -> bool {
    let trimmed_eq = s.trim_end_matches('=');
    if trimmed_eq.is_empty() && !s.is_empty() {
        // all padding, no body — invalid.
        return false;
    }
    is_token68_body(trimmed_eq)
}

/// Parse exactly one credential.
/// Returns only the first descriptor if more than one scheme is present
/// (malformed `Authorization` header); callers treat a header with zero
/// descriptors as absent.
pub fn parse_single_credential(input: &str) -> Result<HeaderDescriptor, HeaderParseError> {
    let mut list = parse_credentials_list(input)?;
    if list.is_empty() {
        return Err(HeaderParseError::EmptyFieldValue);
    }
    Ok(list.remove(0))
}

// ---------------------------------------------------------------------------
// Specialisation table
// ---------------------------------------------------------------------------

/// How a header's value is parsed, keyed by lowercased header name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderGrammar {
    /// `authorization`: a single credentials descriptor.
    SingleCredential,
    /// `www-authenticate`: a list of credentials descriptors (challenges).
    CredentialsList,
    /// `user-agent` and friends: the entire value, unsplit.
    SingleValue,
    /// Everything else: the generic `value *( ; name=value )` grammar.
    Generic,
}

pub fn grammar_for(header_name: &str) -> HeaderGrammar {
    match header_name.to_ascii_lowercase().as_str() {
        "authorization" => HeaderGrammar::SingleCredential,
        "www-authenticate" => HeaderGrammar::CredentialsList,
        "user-agent" => HeaderGrammar::SingleValue,
        _ => HeaderGrammar::Generic,
    }
}

/// Parse `value` according to the grammar registered for `header_name` in
/// the specialisation table. Fatal parse errors are the caller's job to turn
/// into a 400 response.
pub fn parse_header(header_name: &str, value: &str) -> Result<Vec<HeaderDescriptor>, HeaderParseError> {
    match grammar_for(header_name) {
        HeaderGrammar::SingleCredential => Ok(vec![parse_single_credential(value)?]),
        HeaderGrammar::CredentialsList => parse_credentials_list(value),
        HeaderGrammar::SingleValue => Ok(vec![HeaderDescriptor::new(value.trim().to_string())]),
        HeaderGrammar::Generic => parse_generic(value),
    }
}
