//! Outer and fine tokenisers for HTTP header field values.
//!
//! The outer tokeniser is grammar-agnostic: it only knows about quoted
//! strings, whitespace runs, and everything else. The fine tokeniser then
//! further splits the "everything else" runs on the handful of
//! single-byte delimiters a particular grammar cares about.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderParseError {
    #[error("unterminated quoted-string in header value")]
    UnterminatedQuotedString,
    #[error("disallowed control byte 0x{0:02x} in header value")]
    ControlByte(u8),
    #[error("unexpected token in header value: {0}")]
    UnexpectedToken(String),
    #[error("empty header field value")]
    EmptyFieldValue,
    #[error("malformed token68 credential: {0}")]
    InvalidToken68(String),
}

/// A run produced by the outer, grammar-agnostic tokeniser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OuterToken {
    /// Already unescaped quoted-string content (the surrounding quotes and
    /// `\`-escapes are consumed).
    Quoted(String),
    /// A run of SP/HTAB.
    Whitespace,
    /// A maximal run of bytes that are not `"`, SP, or HTAB, and not a
    /// rejected control byte.
    Raw(String),
}

/// Control bytes except HTAB, and DEL, are rejected.
fn is_rejected_control(c: char) -> bool {
    let c = c as u32;
    (c < 0x20 && c != 0x09) || c == 0x7F
}

pub fn outer_tokenize(input: &str) -> Result<Vec<OuterToken>, HeaderParseError> {
    let mut out = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        if c == '"' {
            let (s, consumed) = read_quoted_string(&chars[i..])?;
            out.push(OuterToken::Quoted(s));
            i += consumed;
        } else if c == ' ' || c == '\t' {
            while i < chars.len() && (chars[i] == ' ' || chars[i] == '\t') {
                i += 1;
            }
            out.push(OuterToken::Whitespace);
        } else if is_rejected_control(c) {
            return Err(HeaderParseError::ControlByte(c as u8));
        } else {
            let start = i;
            while i < chars.len()
                && chars[i] != '"'
                && chars[i] != ' '
                && chars[i] != '\t'
                && !is_rejected_control(chars[i])
            {
                i += 1;
            }
            out.push(OuterToken::Raw(chars[start..i].iter().collect()));
        }
    }

    Ok(out)
}

/// `chars` must start with the opening `"`. Returns the decoded content and
/// the number of `chars` consumed (including both quotes).
fn read_quoted_string(chars: &[char]) -> Result<(String, usize), HeaderParseError> {
    debug_assert_eq!(chars[0], '"');
    let mut out = String::new();
    let mut i = 1usize;
    loop {
        if i >= chars.len() {
            return Err(HeaderParseError::UnterminatedQuotedString);
        }
        let c = chars[i];
        if c == '\\' {
            i += 1;
            if i >= chars.len() {
                return Err(HeaderParseError::UnterminatedQuotedString);
            }
            out.push(chars[i]);
            i += 1;
        } else if c == '"' {
            i += 1;
            return Ok((out, i));
        } else if is_rejected_control(c) {
            return Err(HeaderParseError::ControlByte(c as u8));
        } else {
            out.push(c);
            i += 1;
        }
    }
}

/// A lexeme produced by splitting `Raw` runs on grammar-specific delimiters.
/// `Quoted` and `Whitespace` pass through from the outer pass unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FineToken {
    Quoted(String),
    Whitespace,
    Delim(char),
    Word(String),
}

/// Split `Raw` runs on any byte in `delimiters`; `Quoted`/`Whitespace` pass
/// through. Generic grammar uses `,` `;` `=`; credentials grammar uses `,` `=`.
pub fn fine_tokenize(outer: &[OuterToken], delimiters: &[char]) -> Vec<FineToken> {
    let mut out = Vec::new();
    for tok in outer {
        match tok {
            OuterToken::Quoted(s) => out.push(FineToken::Quoted(s.clone())),
            OuterToken::Whitespace => out.push(FineToken::Whitespace),
            OuterToken::Raw(s) => {
                let mut word = String::new();
                for c in s.chars() {
                    if delimiters.contains(&c) {
                        if !word.is_empty() {
                            out.push(FineToken::Word(std::mem::take(&mut word)));
                        }
                        out.push(FineToken::Delim(c));
                    } else {
                        word.push(c);
                    }
                }
                if !word.is_empty() {
                    out.push(FineToken::Word(word));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outer_tokenize_splits_quoted_whitespace_and_raw() {
        let toks = outer_tokenize(r#"Basic realm="my realm", x"#).unwrap();
        assert_eq!(
            toks,
            vec![
                OuterToken::Raw("Basic".to_string()),
                OuterToken::Whitespace,
                OuterToken::Raw("realm=".to_string()),
                OuterToken::Quoted("my realm".to_string()),
                OuterToken::Raw(",".to_string()),
                OuterToken::Whitespace,
                OuterToken::Raw("x".to_string()),
            ]
        );
    }

    #[test]
    fn quoted_string_supports_escapes() {
        let toks = outer_tokenize(r#""a\"b""#).unwrap();
        assert_eq!(toks, vec![OuterToken::Quoted("a\"b".to_string())]);
    }

    #[test]
    fn unterminated_quoted_string_is_fatal() {
        assert_eq!(
            outer_tokenize(r#""unterminated"#).unwrap_err(),
            HeaderParseError::UnterminatedQuotedString
        );
    }

    #[test]
    fn rejects_control_bytes_except_htab() {
        assert!(outer_tokenize("a\tb").is_ok());
        assert!(outer_tokenize("a\u{0001}b").is_err());
        assert!(outer_tokenize("a\u{007F}b").is_err());
    }

    #[test]
    fn fine_tokenize_splits_on_grammar_delimiters() {
        let outer = outer_tokenize("a=b;c=d").unwrap();
        let fine = fine_tokenize(&outer, &[',', ';', '=']);
        assert_eq!(
            fine,
            vec![
                FineToken::Word("a".to_string()),
                FineToken::Delim('='),
                FineToken::Word("b".to_string()),
                FineToken::Delim(';'),
                FineToken::Word("c".to_string()),
                FineToken::Delim('='),
                FineToken::Word("d".to_string()),
            ]
        );
    }
}
