//! Sealed HTTP-status-bearing error taxonomy.
//!
//! Every error that can cross the router boundary is a `WebApiError`:
//! a status code, a human description, and an optional `Retry-After`.
//! Handlers raise these directly; anything else a handler returns as an
//! error is wrapped into a generic 500 by the router (see `router::mod`).

use std::fmt;
use std::time::{Duration, SystemTime};

/// Accepted inputs for constructing a `Retry-After` value.
///
/// `retryAfter` is "normalised to an HTTP-date string (accepts int-ms-delta,
/// absolute date, or HTTP-date string; on invalid input, default to now + 5 ms)".
#[derive(Debug, Clone)]
pub enum RetryAfter {
    /// Milliseconds from now.
    MillisFromNow(u64),
    /// An absolute instant.
    At(SystemTime),
    /// An already-formatted HTTP-date string, parsed and re-validated.
    HttpDate(String),
}

impl RetryAfter {
    fn resolve(&self) -> SystemTime {
        match self {
            RetryAfter::MillisFromNow(ms) => SystemTime::now() + Duration::from_millis(*ms),
            RetryAfter::At(t) => *t,
            RetryAfter::HttpDate(s) => httpdate::parse_http_date(s)
                .unwrap_or_else(|_| SystemTime::now() + Duration::from_millis(5)),
        }
    }

    /// Render as an HTTP-date string suitable for the `Retry-After` header.
    pub fn to_http_date(&self) -> String {
        httpdate::fmt_http_date(self.resolve())
    }
}

/// A status-bearing error produced by request parsing, routing, authentication,
/// or a user handler.
///
/// `statusCode` is clamped to `[100,599]`; values outside that range default
/// to 500.
#[derive(Debug, Clone)]
pub struct WebApiError {
    status_code: u16,
    description: String,
    retry_after: Option<RetryAfter>,
}

impl WebApiError {
    /// Construct a new error, clamping an out-of-range status to 500.
    pub fn new(status_code: u16, description: impl Into<String>) -> Self {
        let status_code = if (100..=599).contains(&status_code) {
            status_code
        } else {
            500
        };
        Self {
            status_code,
            description: description.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: RetryAfter) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn retry_after_http_date(&self) -> Option<String> {
        self.retry_after.as_ref().map(RetryAfter::to_http_date)
    }

    // --- fixed-status constructors ---

    pub fn bad_request(description: impl Into<String>) -> Self {
        Self::new(400, description)
    }
    pub fn unauthorized(description: impl Into<String>) -> Self {
        Self::new(401, description)
    }
    pub fn forbidden(description: impl Into<String>) -> Self {
        Self::new(403, description)
    }
    pub fn not_found(description: impl Into<String>) -> Self {
        Self::new(404, description)
    }
    pub fn method_not_allowed(description: impl Into<String>) -> Self {
        Self::new(405, description)
    }
    pub fn not_acceptable(description: impl Into<String>) -> Self {
        Self::new(406, description)
    }
    pub fn proxy_authentication_required(description: impl Into<String>) -> Self {
        Self::new(407, description)
    }
    pub fn request_timeout(description: impl Into<String>) -> Self {
        Self::new(408, description)
    }
    pub fn conflict(description: impl Into<String>) -> Self {
        Self::new(409, description)
    }
    pub fn gone(description: impl Into<String>) -> Self {
        Self::new(410, description)
    }
    pub fn unsupported_media_type(description: impl Into<String>) -> Self {
        Self::new(415, description)
    }
    pub fn internal(description: impl Into<String>) -> Self {
        Self::new(500, description)
    }
    pub fn not_implemented(description: impl Into<String>) -> Self {
        Self::new(501, description)
    }
    pub fn bad_gateway(description: impl Into<String>) -> Self {
        Self::new(502, description)
    }
    pub fn service_unavailable(description: impl Into<String>, retry_after: RetryAfter) -> Self {
        Self::new(503, description).with_retry_after(retry_after)
    }
    pub fn network_authentication_required(description: impl Into<String>) -> Self {
        Self::new(511, description)
    }
}

impl fmt::Display for WebApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description, self.status_code)
    }
}

impl std::error::Error for WebApiError {}

impl Default for WebApiError {
    fn default() -> Self {
        Self::internal("Something went wrong")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_status_to_500() {
        let e = WebApiError::new(999, "bogus");
        assert_eq!(e.status_code(), 500);
        let e = WebApiError::new(50, "bogus");
        assert_eq!(e.status_code(), 500);
    }

    #[test]
    fn fixed_status_constructors_return_expected_codes() {
        assert_eq!(WebApiError::bad_request("x").status_code(), 400);
        assert_eq!(WebApiError::unauthorized("x").status_code(), 401);
        assert_eq!(WebApiError::forbidden("x").status_code(), 403);
        assert_eq!(WebApiError::not_found("x").status_code(), 404);
        assert_eq!(WebApiError::method_not_allowed("x").status_code(), 405);
        assert_eq!(WebApiError::not_acceptable("x").status_code(), 406);
        assert_eq!(
            WebApiError::proxy_authentication_required("x").status_code(),
            407
        );
        assert_eq!(WebApiError::request_timeout("x").status_code(), 408);
        assert_eq!(WebApiError::conflict("x").status_code(), 409);
        assert_eq!(WebApiError::gone("x").status_code(), 410);
        assert_eq!(WebApiError::unsupported_media_type("x").status_code(), 415);
        assert_eq!(WebApiError::internal("x").status_code(), 500);
        assert_eq!(WebApiError::not_implemented("x").status_code(), 501);
        assert_eq!(WebApiError::bad_gateway("x").status_code(), 502);
        assert_eq!(
            WebApiError::network_authentication_required("x").status_code(),
            511
        );
    }

    #[test]
    fn retry_after_millis_renders_as_http_date_in_the_future() {
        let e = WebApiError::service_unavailable("busy", RetryAfter::MillisFromNow(120_000));
        let rendered = e.retry_after_http_date().unwrap();
        assert!(!rendered.is_empty());
        let parsed = httpdate::parse_http_date(&rendered).unwrap();
        assert!(parsed > SystemTime::now());
    }

    #[test]
    fn retry_after_invalid_http_date_falls_back_to_now_plus_5ms() {
        let e = WebApiError::service_unavailable(
            "busy",
            RetryAfter::HttpDate("not a date".to_string()),
        );
        let rendered = e.retry_after_http_date().unwrap();
        let parsed = httpdate::parse_http_date(&rendered).unwrap();
        assert!(parsed >= SystemTime::now() - Duration::from_secs(1));
    }
}
