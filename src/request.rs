//! Request parsing: turns a transport-agnostic
//! [`RawRequest`] into a [`RequestDescriptor`] — header grammar parsing,
//! `Content-Length` enforcement, and body decoding by `Content-Type`.

use crate::error::WebApiError;
use crate::headers::{self, HeaderDescriptor};
use percent_encoding::percent_decode_str;
use std::collections::HashMap;

/// The decoded request body.
#[derive(Debug, Clone)]
pub enum Body {
    Empty,
    Raw(Vec<u8>),
    Text(String),
    Json(serde_json::Value),
    UrlEncoded(HashMap<String, String>),
    Multipart(HashMap<String, PartValue>),
}

impl Body {
    /// `true` for the method-dispatch "merge body into params" rule: only a
    /// map-shaped body merges directly.
    pub fn as_map(&self) -> Option<HashMap<String, serde_json::Value>> {
        match self {
            Body::Json(serde_json::Value::Object(map)) => {
                Some(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            }
            Body::UrlEncoded(map) => Some(
                map.iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                    .collect(),
            ),
            Body::Multipart(map) => Some(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// One decoded `multipart/form-data` part value.
#[derive(Debug, Clone)]
pub enum PartValue {
    Text(String),
    Json(serde_json::Value),
    Raw(Vec<u8>),
}

impl PartValue {
    fn to_json(&self) -> serde_json::Value {
        match self {
            PartValue::Text(s) => serde_json::Value::String(s.clone()),
            PartValue::Json(v) => v.clone(),
            PartValue::Raw(bytes) => {
                serde_json::Value::String(base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    bytes,
                ))
            }
        }
    }
}

/// Transport-agnostic request input. The caller (the
/// HTTP server front-end) is responsible for draining the transport's body
/// stream into `body` and reporting `content_length` from the wire, if any.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: String,
    pub path: String,
    pub raw_query: Option<String>,
    /// Raw header lines in wire order; a name appearing more than once is
    /// joined with `", "` before grammar parsing.
    pub raw_headers: Vec<(String, String)>,
    pub content_length: Option<usize>,
    pub body: Vec<u8>,
}

/// The parsed request handed to the router.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, Vec<HeaderDescriptor>>,
    pub query: HashMap<String, String>,
    pub body: Body,
}

impl RequestDescriptor {
    /// The first descriptor of `name` (lowercased), if the header is present.
    pub fn header(&self, name: &str) -> Option<&HeaderDescriptor> {
        self.headers.get(&name.to_ascii_lowercase())?.first()
    }

    pub fn header_list(&self, name: &str) -> &[HeaderDescriptor] {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

pub struct RequestParser {
    pub max_body_bytes: usize,
}

impl RequestParser {
    pub fn new(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }

    pub fn parse(&self, raw: RawRequest) -> Result<RequestDescriptor, WebApiError> {
        if let Some(declared) = raw.content_length {
            if declared != raw.body.len() {
                return Err(WebApiError::bad_request(format!(
                    "Content-Length mismatch: declared {declared}, received {}",
                    raw.body.len()
                )));
            }
        }
        if raw.body.len() > self.max_body_bytes {
            return Err(WebApiError::new(413, "request body exceeds max_body_bytes"));
        }

        let query = parse_urlencoded(raw.raw_query.as_deref().unwrap_or(""));
        let headers = parse_headers(&raw.raw_headers)?;
        let body = self.decode_body(&headers, &raw.body)?;

        Ok(RequestDescriptor {
            method: raw.method.to_ascii_uppercase(),
            path: raw.path,
            headers,
            query,
            body,
        })
    }

    fn decode_body(
        &self,
        headers: &HashMap<String, Vec<HeaderDescriptor>>,
        body: &[u8],
    ) -> Result<Body, WebApiError> {
        if body.is_empty() {
            return Ok(Body::Empty);
        }

        let content_type = headers
            .get("content-type")
            .and_then(|list| list.first())
            .cloned();

        let Some(ct) = content_type else {
            return Ok(Body::Raw(body.to_vec()));
        };

        let mime = ct.value.to_ascii_lowercase();
        match mime.as_str() {
            "application/json" => {
                let value = decode_safe_json(body)?;
                Ok(Body::Json(value))
            }
            "application/x-www-form-urlencoded" => {
                let text = std::str::from_utf8(body)
                    .map_err(|_| WebApiError::bad_request("urlencoded body is not valid UTF-8"))?;
                Ok(Body::UrlEncoded(parse_urlencoded(text)))
            }
            "multipart/form-data" => {
                let boundary = ct.param("boundary").ok_or_else(|| {
                    WebApiError::bad_request("multipart/form-data requires a boundary parameter")
                })?;
                Ok(Body::Multipart(decode_multipart(body, boundary)?))
            }
            _ if mime.starts_with("text/") => {
                let charset = ct.param("charset").unwrap_or("utf-8").to_string();
                Ok(Body::Text(decode_text(body, &charset)?))
            }
            _ => Ok(Body::Raw(body.to_vec())),
        }
    }
}

/// Join multi-valued raw headers with `", "` and run each through the
/// specialisation-table grammar.
fn parse_headers(
    raw_headers: &[(String, String)],
) -> Result<HashMap<String, Vec<HeaderDescriptor>>, WebApiError> {
    let mut joined: HashMap<String, Vec<String>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for (name, value) in raw_headers {
        let lower = name.to_ascii_lowercase();
        if !joined.contains_key(&lower) {
            order.push(lower.clone());
        }
        joined.entry(lower).or_default().push(value.clone());
    }

    let mut out = HashMap::new();
    for name in order {
        let combined = joined.remove(&name).unwrap().join(", ");
        let descriptors = headers::parse_header(&name, &combined)
            .map_err(|e| WebApiError::bad_request(format!("malformed '{name}' header: {e}")))?;
        out.insert(name, descriptors);
    }
    Ok(out)
}

/// Standard `application/x-www-form-urlencoded` decoding: `+` is a space,
/// `name=value` pairs separated by `&`.
fn parse_urlencoded(input: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    if input.is_empty() {
        return out;
    }
    for pair in input.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        out.insert(decode_form_component(name), decode_form_component(value));
    }
    out
}

fn decode_form_component(s: &str) -> String {
    let replaced = s.replace('+', " ");
    percent_decode_str(&replaced)
        .decode_utf8()
        .map(|c| c.into_owned())
        .unwrap_or(replaced)
}

/// JSON decoding that rejects `__proto__` as an object key at any depth
/// — an anti prototype-pollution
/// measure carried over even though Rust's `serde_json::Value` has no
/// prototype chain, because the wire format is the attack surface shared
/// with any downstream consumer that does.
fn decode_safe_json(body: &[u8]) -> Result<serde_json::Value, WebApiError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| WebApiError::bad_request(format!("invalid JSON body: {e}")))?;
    reject_proto_pollution(&value)?;
    Ok(value)
}

fn reject_proto_pollution(value: &serde_json::Value) -> Result<(), WebApiError> {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                if k == "__proto__" {
                    return Err(WebApiError::bad_request(
                        "JSON body may not use '__proto__' as an object key",
                    ));
                }
                reject_proto_pollution(v)?;
            }
            Ok(())
        }
        serde_json::Value::Array(items) => {
            for item in items {
                reject_proto_pollution(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Decode `bytes` as `charset`, fatally; on failure fall back to UTF-8
/// fatally; on failure surface a decode error.
fn decode_text(bytes: &[u8], charset: &str) -> Result<String, WebApiError> {
    if let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) {
        let (text, _, had_errors) = encoding.decode(bytes);
        if !had_errors {
            return Ok(text.into_owned());
        }
    }
    let (text, _, had_errors) = encoding_rs::UTF_8.decode(bytes);
    if !had_errors {
        return Ok(text.into_owned());
    }
    Err(WebApiError::bad_request(format!(
        "could not decode text body as '{charset}' or UTF-8"
    )))
}

// ---------------------------------------------------------------------------
// multipart/form-data (RFC 7578)
// ---------------------------------------------------------------------------

fn decode_multipart(body: &[u8], boundary: &str) -> Result<HashMap<String, PartValue>, WebApiError> {
    let dash_boundary = format!("--{boundary}");
    let delimiter = format!("\r\n{dash_boundary}");

    // Tolerate an optional preamble by searching for the first occurrence of
    // `--boundary` (possibly prefixed by CRLF, possibly at offset 0).
    let first = find(body, dash_boundary.as_bytes())
        .ok_or_else(|| WebApiError::bad_request("multipart body missing initial boundary"))?;
    let mut cursor = first + dash_boundary.len();

    let mut parts = HashMap::new();

    loop {
        // After a boundary line comes either "--" (close) or CRLF then headers.
        if body[cursor..].starts_with(b"--") {
            break;
        }
        if !body[cursor..].starts_with(b"\r\n") {
            return Err(WebApiError::bad_request("malformed multipart boundary line"));
        }
        cursor += 2;

        let header_end = find(&body[cursor..], b"\r\n\r\n").ok_or_else(|| {
            WebApiError::bad_request("multipart part headers missing terminating blank line")
        })?;
        let header_block = &body[cursor..cursor + header_end];
        cursor += header_end + 4;

        let next_boundary = find(&body[cursor..], delimiter.as_bytes()).ok_or_else(|| {
            WebApiError::bad_request("multipart part missing terminating boundary")
        })?;
        let part_body = &body[cursor..cursor + next_boundary];
        cursor += next_boundary + delimiter.len();

        let part_headers = parse_part_headers(header_block)?;
        let disposition = part_headers
            .get("content-disposition")
            .ok_or_else(|| WebApiError::bad_request("multipart part missing Content-Disposition"))?;
        let descs = headers::parse_generic(disposition)
            .map_err(|e| WebApiError::bad_request(format!("malformed Content-Disposition: {e}")))?;
        let disposition_desc = descs
            .first()
            .ok_or_else(|| WebApiError::bad_request("empty Content-Disposition"))?;
        let name = disposition_desc
            .param("name")
            .ok_or_else(|| WebApiError::bad_request("multipart part missing name= in Content-Disposition"))?
            .to_string();

        let part_content_type = part_headers.get("content-type").cloned();
        let value = decode_part_value(part_body, part_content_type.as_deref())?;
        parts.insert(name, value);

        // Loop head re-checks for "--" (close delimiter) vs CRLF (another part).
    }

    Ok(parts)
}

fn decode_part_value(body: &[u8], content_type: Option<&str>) -> Result<PartValue, WebApiError> {
    match content_type.map(|s| s.to_ascii_lowercase()) {
        Some(ref ct) if ct.starts_with("text/") => {
            let charset = headers::parse_generic(content_type.unwrap())
                .ok()
                .and_then(|d| d.first().and_then(|d| d.param("charset").map(str::to_string)))
                .unwrap_or_else(|| "utf-8".to_string());
            Ok(PartValue::Text(decode_text(body, &charset)?))
        }
        Some(ref ct) if ct == "application/json" => {
            Ok(PartValue::Json(decode_safe_json(body)?))
        }
        None => {
            // No explicit Content-Type: per RFC 7578 this defaults to
            // text/plain for simple form fields.
            Ok(PartValue::Text(
                String::from_utf8(body.to_vec())
                    .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()),
            ))
        }
        _ => Ok(PartValue::Raw(body.to_vec())),
    }
}

/// Parse and RFC-5322 unfold a multipart part's header block (CRLF-joined
/// lines, no terminating blank line — that was already consumed by the
/// caller).
fn parse_part_headers(block: &[u8]) -> Result<HashMap<String, String>, WebApiError> {
    let text = std::str::from_utf8(block)
        .map_err(|_| WebApiError::bad_request("multipart part headers are not valid UTF-8"))?;

    let mut unfolded: Vec<String> = Vec::new();
    for line in text.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        if (line.starts_with(' ') || line.starts_with('\t')) && !unfolded.is_empty() {
            let last = unfolded.last_mut().unwrap();
            last.push(' ');
            last.push_str(line.trim_start());
        } else {
            unfolded.push(line.to_string());
        }
    }

    let mut out = HashMap::new();
    for line in unfolded {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| WebApiError::bad_request("malformed multipart part header line"))?;
        out.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }
    Ok(out)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    memchr::memmem::find(haystack, needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> RequestParser {
        RequestParser::new(2 * 1024 * 1024)
    }

    #[test]
    fn content_length_mismatch_is_fatal() {
        let raw = RawRequest {
            method: "POST".to_string(),
            path: "/x".to_string(),
            raw_query: None,
            raw_headers: vec![],
            content_length: Some(10),
            body: b"short".to_vec(),
        };
        let err = parser().parse(raw).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn oversized_body_is_413() {
        let small = RequestParser::new(4);
        let raw = RawRequest {
            method: "POST".to_string(),
            path: "/x".to_string(),
            raw_query: None,
            raw_headers: vec![],
            content_length: None,
            body: b"too long".to_vec(),
        };
        let err = small.parse(raw).unwrap_err();
        assert_eq!(err.status_code(), 413);
    }

    #[test]
    fn query_parsed_as_string_map() {
        let raw = RawRequest {
            method: "GET".to_string(),
            path: "/x".to_string(),
            raw_query: Some("a=1&b=hello+world&c=%2F".to_string()),
            raw_headers: vec![],
            content_length: None,
            body: vec![],
        };
        let desc = parser().parse(raw).unwrap();
        assert_eq!(desc.query.get("a").unwrap(), "1");
        assert_eq!(desc.query.get("b").unwrap(), "hello world");
        assert_eq!(desc.query.get("c").unwrap(), "/");
    }

    #[test]
    fn json_body_is_decoded() {
        let raw = RawRequest {
            method: "POST".to_string(),
            path: "/x".to_string(),
            raw_query: None,
            raw_headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            content_length: None,
            body: br#"{"a":1}"#.to_vec(),
        };
        let desc = parser().parse(raw).unwrap();
        assert!(matches!(desc.body, Body::Json(serde_json::Value::Object(_))));
    }

    #[test]
    fn json_body_rejects_proto_pollution() {
        let raw = RawRequest {
            method: "POST".to_string(),
            path: "/x".to_string(),
            raw_query: None,
            raw_headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            content_length: None,
            body: br#"{"__proto__":{"polluted":true}}"#.to_vec(),
        };
        let err = parser().parse(raw).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn urlencoded_body_is_decoded_to_string_map() {
        let raw = RawRequest {
            method: "POST".to_string(),
            path: "/x".to_string(),
            raw_query: None,
            raw_headers: vec![(
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            )],
            content_length: None,
            body: b"name=Ada+Lovelace&lang=en".to_vec(),
        };
        let desc = parser().parse(raw).unwrap();
        match desc.body {
            Body::UrlEncoded(map) => {
                assert_eq!(map.get("name").unwrap(), "Ada Lovelace");
                assert_eq!(map.get("lang").unwrap(), "en");
            }
            _ => panic!("expected UrlEncoded body"),
        }
    }

    #[test]
    fn multipart_with_text_and_binary_parts() {
        let body = [
            "--X\r\n",
            "Content-Disposition: form-data; name=\"title\"\r\n",
            "\r\n",
            "hi\r\n",
            "--X\r\n",
            "Content-Disposition: form-data; name=\"data\"; filename=\"a.bin\"\r\n",
            "Content-Type: application/octet-stream\r\n",
            "\r\n",
        ]
        .concat()
        .into_bytes();
        let mut full = body;
        full.extend_from_slice(&[0x00, 0x01]);
        full.extend_from_slice(b"\r\n--X--\r\n");

        let raw = RawRequest {
            method: "POST".to_string(),
            path: "/upload".to_string(),
            raw_query: None,
            raw_headers: vec![(
                "Content-Type".to_string(),
                "multipart/form-data; boundary=X".to_string(),
            )],
            content_length: None,
            body: full,
        };
        let desc = parser().parse(raw).unwrap();
        match desc.body {
            Body::Multipart(parts) => {
                match &parts["title"] {
                    PartValue::Text(s) => assert_eq!(s, "hi"),
                    _ => panic!("expected text part"),
                }
                match &parts["data"] {
                    PartValue::Raw(b) => assert_eq!(b, &vec![0x00, 0x01]),
                    _ => panic!("expected raw part"),
                }
            }
            _ => panic!("expected Multipart body"),
        }
    }

    #[test]
    fn text_body_decodes_declared_charset_or_falls_back_to_utf8() {
        let raw = RawRequest {
            method: "POST".to_string(),
            path: "/x".to_string(),
            raw_query: None,
            raw_headers: vec![("Content-Type".to_string(), "text/plain; charset=utf-8".to_string())],
            content_length: None,
            body: "héllo".as_bytes().to_vec(),
        };
        let desc = parser().parse(raw).unwrap();
        match desc.body {
            Body::Text(s) => assert_eq!(s, "héllo"),
            _ => panic!("expected Text body"),
        }
    }

    #[test]
    fn unknown_content_type_is_raw_bytes() {
        let raw = RawRequest {
            method: "POST".to_string(),
            path: "/x".to_string(),
            raw_query: None,
            raw_headers: vec![("Content-Type".to_string(), "application/octet-stream".to_string())],
            content_length: None,
            body: vec![0xDE, 0xAD, 0xBE, 0xEF],
        };
        let desc = parser().parse(raw).unwrap();
        assert!(matches!(desc.body, Body::Raw(_)));
    }
}
