//! Request front-end pipeline: normalise → lookup → verify → dispatch →
//! translate the handler's return envelope into an HTTP response. This
//! module has no transport dependency of its own — the
//! server front-end (`crate::server`) owns the hyper plumbing and calls
//! [`Router::handle`] with a [`RawRequest`] built from the wire.

use crate::auth::VerifyResult;
use crate::config::{RouterConfig, TrailingSlashPolicy};
use crate::content_type::ContentTypeRegistry;
use crate::entity::{Method, ResourceBody, WebApi, WebEntity, WebResource};
use crate::error::WebApiError;
use crate::headers::quote_if_needed;
use crate::pattern::Pattern;
use crate::pattern_map::{PatternMap, PatternMapError};
use crate::request::{Body, RawRequest, RequestDescriptor, RequestParser};
use std::collections::HashMap;
use std::sync::Arc;

/// A transport-agnostic HTTP response; the server front-end renders this
/// into a `hyper::Response`.
#[derive(Debug, Clone)]
pub struct RouterResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum RouterSetupError {
    #[error("a route is already registered at '{0}'")]
    DuplicateRoute(String),
    #[error(transparent)]
    PatternMap(#[from] PatternMapError),
}

/// Method-override headers honoured on `POST`, in priority order.
const METHOD_OVERRIDE_HEADERS: [&str; 3] =
    ["x-http-method", "x-http-method-override", "x-method-override"];

pub struct Router {
    config: RouterConfig,
    routes: PatternMap<Arc<WebEntity>>,
    content_types: Arc<dyn ContentTypeRegistry>,
}

impl Router {
    pub fn new(config: RouterConfig, content_types: Arc<dyn ContentTypeRegistry>) -> Self {
        let case_sensitive = true;
        Self {
            config,
            routes: PatternMap::new(case_sensitive),
            content_types,
        }
    }

    /// Register a `WebApi` or `WebResource` at its own pattern. Re-registering
    /// an already-reachable path is a setup-time error: this treats "same
    /// path, different entity" as a configuration error.
    pub fn register(&mut self, entity: WebEntity) -> Result<(), RouterSetupError> {
        let pattern = entity.pattern().clone();
        if self.routes.has(&pattern) {
            return Err(RouterSetupError::DuplicateRoute(pattern.raw().to_string()));
        }
        self.routes.set(&pattern, Arc::new(entity))?;
        metrics::gauge!("router_routes_registered").increment(1.0);
        Ok(())
    }

    /// Remove the route registered at `pattern`, if any.
    pub fn unregister(&mut self, pattern: &Pattern) -> Option<Arc<WebEntity>> {
        let removed = self.routes.delete(pattern);
        if removed.is_some() {
            metrics::gauge!("router_routes_registered").decrement(1.0);
        }
        removed
    }

    /// Number of routes currently registered. Used by the admin `/ready`
    /// probe: a router with no routes isn't ready to serve traffic yet.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub async fn handle(&self, raw: RawRequest) -> RouterResponse {
        let start = std::time::Instant::now();
        metrics::gauge!("router_requests_in_flight").increment(1.0);
        let response = self.handle_inner(raw).await;
        metrics::gauge!("router_requests_in_flight").decrement(1.0);

        metrics::counter!(
            "router_requests_total",
            "status" => response.status.to_string(),
        )
        .increment(1);
        metrics::histogram!("router_request_duration_seconds").record(start.elapsed().as_secs_f64());
        metrics::histogram!("router_response_size_bytes").record(response.body.len() as f64);
        response
    }

    async fn handle_inner(&self, raw: RawRequest) -> RouterResponse {
        let parser = RequestParser::new(self.config.max_body_bytes);
        let request = match parser.parse(raw) {
            Ok(r) => r,
            Err(e) => return self.error_response(&e),
        };

        let path = normalize_path(&request.path, self.config.trailing_slash_policy);
        let method = resolve_method(
            &request.method,
            &request.headers,
            self.config.allows_post_method_override,
        );

        let Some(entity) = self.routes.lookup_path(&path) else {
            metrics::counter!("router_not_found_total").increment(1);
            return self.error_response(&WebApiError::not_found("no route matches this path"));
        };
        let entity = entity.clone();

        if !entity.supports_method(&method) {
            metrics::counter!("router_method_not_allowed_total").increment(1);
            return self.error_response(&WebApiError::method_not_allowed(format!(
                "{method} not supported by this endpoint"
            )));
        }

        let verify_result = entity.verify(&request).await;
        metrics::counter!(
            "router_auth_verify_total",
            "scheme" => verify_result.scheme.clone().unwrap_or_else(|| "none".to_string()),
            "outcome" => if verify_result.ok { "ok" } else { "rejected" },
        )
        .increment(1);
        if !verify_result.ok {
            return self.auth_failure_response(&entity, &verify_result).await;
        }

        match &*entity {
            WebEntity::Resource(resource) => self.dispatch_resource(resource, &request, &path).await,
            WebEntity::Api(api) => self.dispatch_api(api, &request, &path, &method).await,
        }
    }

    async fn dispatch_api(
        &self,
        api: &WebApi,
        request: &RequestDescriptor,
        path: &str,
        method: &str,
    ) -> RouterResponse {
        // supports_method already validated this parses and is registered.
        let method = Method::parse(method).expect("method validated by supports_method");
        let handler = api
            .handler(method)
            .expect("handler presence validated by supports_method");

        let mut params: HashMap<String, serde_json::Value> = HashMap::new();
        for (key, raw_value) in &request.query {
            let value = if self.config.parses_query_as_json {
                match serde_json::from_str::<serde_json::Value>(raw_value) {
                    Ok(parsed) => parsed,
                    Err(_) => {
                        tracing::warn!(query_key = %key, "query value is not valid JSON, keeping raw string");
                        serde_json::Value::String(raw_value.clone())
                    }
                }
            } else {
                serde_json::Value::String(raw_value.clone())
            };
            params.insert(key.clone(), value);
        }

        if let Some(extraction) = api.path().extract(path) {
            for (key, value) in &extraction.params {
                params.insert(key.clone(), serde_json::Value::String(value.clone()));
            }
        }

        if method.carries_body_params() {
            match request.body.as_map() {
                Some(body_map) => params.extend(body_map),
                None => match &request.body {
                    Body::Text(text) => {
                        params.insert("body".to_string(), serde_json::Value::String(text.clone()));
                    }
                    Body::Raw(bytes) => {
                        let encoded = base64::Engine::encode(
                            &base64::engine::general_purpose::STANDARD,
                            bytes,
                        );
                        params.insert("body".to_string(), serde_json::Value::String(encoded));
                    }
                    Body::Empty | Body::Json(_) | Body::UrlEncoded(_) | Body::Multipart(_) => {}
                },
            }
        }

        match handler.call(request, params).await {
            Ok(envelope) => translate_envelope(method, envelope),
            Err(e) => self.error_response(&e),
        }
    }

    async fn dispatch_resource(
        &self,
        resource: &WebResource,
        request: &RequestDescriptor,
        path: &str,
    ) -> RouterResponse {
        let Some(extraction) = resource.path().extract(path) else {
            return self.error_response(&WebApiError::not_found("resource not found"));
        };

        let accept = request.header_list("accept");
        let extension = path_extension(path);
        let negotiated = resource.negotiate(accept, extension, self.content_types.as_ref());
        let content_type = match negotiated {
            Ok(ct) => ct,
            Err(rejected) => {
                let body = serde_json::json!({"error": {"status": 415, "unacceptable": rejected}});
                let bytes = serde_json::to_vec(&body).unwrap_or_default();
                return RouterResponse {
                    status: 415,
                    headers: vec![content_type_header(), content_length_header(bytes.len())],
                    body: bytes,
                };
            }
        };

        match resource.get(&extraction, &content_type).await {
            Ok(ResourceBody::Bytes(bytes)) => RouterResponse {
                status: 200,
                headers: vec![
                    ("content-type".to_string(), content_type),
                    content_length_header(bytes.len()),
                ],
                body: bytes,
            },
            Ok(ResourceBody::Text(text)) => {
                let bytes = text.into_bytes();
                RouterResponse {
                    status: 200,
                    headers: vec![
                        ("content-type".to_string(), content_type),
                        content_length_header(bytes.len()),
                    ],
                    body: bytes,
                }
            }
            Err(e) => self.error_response(&e),
        }
    }

    async fn auth_failure_response(&self, entity: &WebEntity, result: &VerifyResult) -> RouterResponse {
        let status = match result.status {
            Some(400) => 400,
            Some(403) => 403,
            _ => 401,
        };
        let www_authenticate = build_www_authenticate(entity, result).await;
        let body = serde_json::json!({"error": {"status": status}});
        let bytes = serde_json::to_vec(&body).unwrap_or_default();
        RouterResponse {
            status,
            headers: vec![
                content_type_header(),
                content_length_header(bytes.len()),
                ("www-authenticate".to_string(), www_authenticate),
            ],
            body: bytes,
        }
    }

    fn error_response(&self, err: &WebApiError) -> RouterResponse {
        let body = serde_json::json!({
            "error": {"message": err.description(), "status": err.status_code()},
        });
        let bytes = serde_json::to_vec(&body).unwrap_or_default();
        let mut headers = vec![content_type_header(), content_length_header(bytes.len())];
        if let Some(retry_after) = err.retry_after_http_date() {
            headers.push(("retry-after".to_string(), retry_after));
        }
        RouterResponse {
            status: err.status_code(),
            headers,
            body: bytes,
        }
    }
}

async fn build_www_authenticate(entity: &WebEntity, result: &VerifyResult) -> String {
    let Some(scheme) = &result.scheme else {
        return entity.get_challenges().await;
    };
    let base = entity
        .auth()
        .challenge_for(scheme)
        .await
        .unwrap_or_else(|| scheme.clone());

    let Some(reason) = &result.reason else {
        return base;
    };
    let mut pairs: Vec<_> = reason.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = base;
    for (name, value) in pairs {
        out.push_str(&format!(", {name}={}", quote_if_needed(&value.to_string())));
    }
    out
}

/// Normalise `path` per `policy` before PatternMap lookup.
fn normalize_path(path: &str, policy: TrailingSlashPolicy) -> String {
    match policy {
        TrailingSlashPolicy::AsIs => path.to_string(),
        TrailingSlashPolicy::Remove => {
            if path.len() > 1 && path.ends_with('/') {
                path.trim_end_matches('/').to_string()
            } else {
                path.to_string()
            }
        }
        TrailingSlashPolicy::Add => {
            if path.ends_with('/') {
                path.to_string()
            } else {
                format!("{path}/")
            }
        }
    }
}

/// Honour `X-HTTP-Method`, `X-HTTP-Method-Override`, `X-Method-Override` on
/// `POST` only, first match in listed order, uppercased.
fn resolve_method(
    raw_method: &str,
    headers: &HashMap<String, Vec<crate::headers::HeaderDescriptor>>,
    allow_override: bool,
) -> String {
    if allow_override && raw_method.eq_ignore_ascii_case("POST") {
        for name in METHOD_OVERRIDE_HEADERS {
            if let Some(descriptor) = headers.get(name).and_then(|list| list.first()) {
                return descriptor.value.to_ascii_uppercase();
            }
        }
    }
    raw_method.to_ascii_uppercase()
}

fn path_extension(path: &str) -> &str {
    let last_segment = path.rsplit('/').next().unwrap_or("");
    match last_segment.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext,
        _ => "",
    }
}

fn content_type_header() -> (String, String) {
    ("content-type".to_string(), "application/json".to_string())
}

fn content_length_header(len: usize) -> (String, String) {
    ("content-length".to_string(), len.to_string())
}

// ---------------------------------------------------------------------------
// Envelope translation
// ---------------------------------------------------------------------------

fn translate_envelope(method: Method, envelope: serde_json::Value) -> RouterResponse {
    let obj = match envelope {
        serde_json::Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    match method {
        Method::Head => translate_head(obj),
        Method::Get | Method::Post | Method::Patch | Method::Options => translate_body_methods(obj),
        Method::Put => translate_put(obj),
        Method::Delete => translate_delete(obj),
    }
}

fn translate_head(mut obj: serde_json::Map<String, serde_json::Value>) -> RouterResponse {
    let status = take_status_code(&mut obj, 204);
    let headers = fields_to_headers(obj);
    RouterResponse {
        status,
        headers,
        body: Vec::new(),
    }
}

fn translate_body_methods(mut obj: serde_json::Map<String, serde_json::Value>) -> RouterResponse {
    let status = take_status_code(&mut obj, 200);
    let bytes = serde_json::to_vec(&serde_json::Value::Object(obj)).unwrap_or_default();
    RouterResponse {
        status,
        headers: vec![content_type_header(), content_length_header(bytes.len())],
        body: bytes,
    }
}

fn translate_put(mut obj: serde_json::Map<String, serde_json::Value>) -> RouterResponse {
    let no_content = take_bool(&mut obj, "noContent");
    let created = take_bool(&mut obj, "created");
    let status = if no_content && created {
        tracing::warn!("PUT envelope set both noContent and created; defaulting to 200");
        200
    } else if no_content {
        204
    } else if created {
        201
    } else {
        take_status_code_opt(&mut obj).unwrap_or(200)
    };
    let headers = fields_to_headers(obj);
    RouterResponse {
        status,
        headers,
        body: Vec::new(),
    }
}

fn translate_delete(mut obj: serde_json::Map<String, serde_json::Value>) -> RouterResponse {
    let no_content = take_bool(&mut obj, "noContent");
    let accepted = take_bool(&mut obj, "accepted");
    let status = if no_content && accepted {
        tracing::warn!("DELETE envelope set both noContent and accepted; defaulting to 200");
        200
    } else if no_content {
        204
    } else if accepted {
        202
    } else {
        take_status_code_opt(&mut obj).unwrap_or(200)
    };

    if status == 204 {
        RouterResponse {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    } else {
        let bytes = serde_json::to_vec(&serde_json::Value::Object(obj)).unwrap_or_default();
        RouterResponse {
            status,
            headers: vec![content_type_header(), content_length_header(bytes.len())],
            body: bytes,
        }
    }
}

fn take_status_code(obj: &mut serde_json::Map<String, serde_json::Value>, default: u16) -> u16 {
    take_status_code_opt(obj).unwrap_or(default)
}

fn take_status_code_opt(obj: &mut serde_json::Map<String, serde_json::Value>) -> Option<u16> {
    let value = obj.remove("statusCode")?;
    let code = value.as_u64()?;
    if (200..=599).contains(&code) {
        Some(code as u16)
    } else {
        None
    }
}

fn take_bool(obj: &mut serde_json::Map<String, serde_json::Value>, key: &str) -> bool {
    obj.remove(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

fn fields_to_headers(obj: serde_json::Map<String, serde_json::Value>) -> Vec<(String, String)> {
    obj.into_iter()
        .map(|(k, v)| {
            let rendered = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, rendered)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthProtocol, ReasonValue};
    use crate::content_type::StaticContentTypeRegistry;
    use crate::entity::{EntityError, Handler, ResourceTarget};
    use async_trait::async_trait;
    use std::path::PathBuf;

    fn config() -> RouterConfig {
        RouterConfig {
            trailing_slash_policy: TrailingSlashPolicy::Remove,
            allows_post_method_override: true,
            parses_query_as_json: true,
            max_body_bytes: 1024 * 1024,
            listen_addr: "127.0.0.1:0".to_string(),
            admin_listen_addr: "127.0.0.1:0".to_string(),
        }
    }

    fn router() -> Router {
        Router::new(config(), Arc::new(StaticContentTypeRegistry::new()))
    }

    fn raw_get(path: &str) -> RawRequest {
        RawRequest {
            method: "GET".to_string(),
            path: path.to_string(),
            raw_query: None,
            raw_headers: vec![],
            content_length: None,
            body: vec![],
        }
    }

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn call(
            &self,
            _request: &RequestDescriptor,
            params: HashMap<String, serde_json::Value>,
        ) -> Result<serde_json::Value, WebApiError> {
            Ok(serde_json::json!({"echo": params}))
        }
    }

    fn echo_api(path: &str) -> WebEntity {
        WebEntity::Api(
            WebApi::new(Pattern::new(path, true).unwrap())
                .unwrap()
                .on(Method::Get, Arc::new(Echo)),
        )
    }

    #[tokio::test]
    async fn miss_is_404() {
        let router = router();
        let resp = router.handle(raw_get("/nope")).await;
        assert_eq!(resp.status, 404);
    }

    #[tokio::test]
    async fn unsupported_method_is_405() {
        let mut router = router();
        router.register(echo_api("/items")).unwrap();
        let mut raw = raw_get("/items");
        raw.method = "DELETE".to_string();
        let resp = router.handle(raw).await;
        assert_eq!(resp.status, 405);
    }

    #[tokio::test]
    async fn trailing_slash_is_removed_before_lookup() {
        let mut router = router();
        router.register(echo_api("/items")).unwrap();
        let resp = router.handle(raw_get("/items/")).await;
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn get_envelope_defaults_to_200_json_body() {
        let mut router = router();
        router.register(echo_api("/items")).unwrap();
        let mut raw = raw_get("/items");
        raw.raw_query = Some("q=%22hi%22".to_string());
        let resp = router.handle(raw).await;
        assert_eq!(resp.status, 200);
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["echo"]["q"], serde_json::json!("hi"));
    }

    #[tokio::test]
    async fn post_method_override_dispatches_put_handler() {
        struct PutOk;
        #[async_trait]
        impl Handler for PutOk {
            async fn call(
                &self,
                _r: &RequestDescriptor,
                _p: HashMap<String, serde_json::Value>,
            ) -> Result<serde_json::Value, WebApiError> {
                Ok(serde_json::json!({"noContent": true}))
            }
        }
        let mut router = router();
        router
            .register(WebEntity::Api(
                WebApi::new(Pattern::new("/items/:id", true).unwrap())
                    .unwrap()
                    .on(Method::Put, Arc::new(PutOk)),
            ))
            .unwrap();

        let raw = RawRequest {
            method: "POST".to_string(),
            path: "/items/42".to_string(),
            raw_query: None,
            raw_headers: vec![("X-HTTP-Method-Override".to_string(), "PUT".to_string())],
            content_length: None,
            body: vec![],
        };
        let resp = router.handle(raw).await;
        assert_eq!(resp.status, 204);
        assert!(resp.body.is_empty());
    }

    #[tokio::test]
    async fn put_envelope_noContent_and_created_warns_and_defaults_200() {
        struct Conflicted;
        #[async_trait]
        impl Handler for Conflicted {
            async fn call(
                &self,
                _r: &RequestDescriptor,
                _p: HashMap<String, serde_json::Value>,
            ) -> Result<serde_json::Value, WebApiError> {
                Ok(serde_json::json!({"noContent": true, "created": true, "location": "/items/1"}))
            }
        }
        let mut router = router();
        router
            .register(WebEntity::Api(
                WebApi::new(Pattern::new("/items/1", true).unwrap())
                    .unwrap()
                    .on(Method::Put, Arc::new(Conflicted)),
            ))
            .unwrap();
        let mut raw = raw_get("/items/1");
        raw.method = "PUT".to_string();
        let resp = router.handle(raw).await;
        assert_eq!(resp.status, 200);
        assert!(resp
            .headers
            .iter()
            .any(|(k, v)| k == "location" && v == "/items/1"));
    }

    #[tokio::test]
    async fn delete_no_content_has_empty_body() {
        struct DeleteOk;
        #[async_trait]
        impl Handler for DeleteOk {
            async fn call(
                &self,
                _r: &RequestDescriptor,
                _p: HashMap<String, serde_json::Value>,
            ) -> Result<serde_json::Value, WebApiError> {
                Ok(serde_json::json!({"noContent": true}))
            }
        }
        let mut router = router();
        router
            .register(WebEntity::Api(
                WebApi::new(Pattern::new("/items/1", true).unwrap())
                    .unwrap()
                    .on(Method::Delete, Arc::new(DeleteOk)),
            ))
            .unwrap();
        let mut raw = raw_get("/items/1");
        raw.method = "DELETE".to_string();
        let resp = router.handle(raw).await;
        assert_eq!(resp.status, 204);
        assert!(resp.body.is_empty());
    }

    #[tokio::test]
    async fn handler_error_maps_to_typed_status() {
        struct Failing;
        #[async_trait]
        impl Handler for Failing {
            async fn call(
                &self,
                _r: &RequestDescriptor,
                _p: HashMap<String, serde_json::Value>,
            ) -> Result<serde_json::Value, WebApiError> {
                Err(WebApiError::conflict("already exists"))
            }
        }
        let mut router = router();
        router
            .register(WebEntity::Api(
                WebApi::new(Pattern::new("/items", true).unwrap())
                    .unwrap()
                    .on(Method::Post, Arc::new(Failing)),
            ))
            .unwrap();
        let mut raw = raw_get("/items");
        raw.method = "POST".to_string();
        let resp = router.handle(raw).await;
        assert_eq!(resp.status, 409);
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["error"]["status"], 409);
    }

    #[tokio::test]
    async fn missing_auth_yields_401_with_www_authenticate() {
        struct DenyAll;
        #[async_trait]
        impl AuthProtocol for DenyAll {
            fn scheme(&self) -> &str {
                "Basic"
            }
            async fn verify(&self, _r: &RequestDescriptor) -> VerifyResult {
                VerifyResult::no_scheme_matched()
            }
            async fn get_challenge(&self) -> String {
                r#"Basic realm="secure""#.to_string()
            }
        }
        let mut router = router();
        router
            .register(WebEntity::Api(
                WebApi::new(Pattern::new("/secure", true).unwrap())
                    .unwrap()
                    .with_auth(Arc::new(DenyAll))
                    .on(Method::Get, Arc::new(Echo)),
            ))
            .unwrap();
        let resp = router.handle(raw_get("/secure")).await;
        assert_eq!(resp.status, 401);
        let www = resp
            .headers
            .iter()
            .find(|(k, _)| k == "www-authenticate")
            .map(|(_, v)| v.clone())
            .unwrap();
        assert!(www.contains("Basic"));
    }

    #[tokio::test]
    async fn scheme_specific_rejection_appends_reason_params() {
        struct RejectWithReason;
        #[async_trait]
        impl AuthProtocol for RejectWithReason {
            fn scheme(&self) -> &str {
                "Digest"
            }
            async fn verify(&self, _r: &RequestDescriptor) -> VerifyResult {
                VerifyResult::failed("Digest").with_reason("stale", ReasonValue::Bool(true))
            }
            async fn get_challenge(&self) -> String {
                r#"Digest realm="x""#.to_string()
            }
        }
        let mut router = router();
        router
            .register(WebEntity::Api(
                WebApi::new(Pattern::new("/secure", true).unwrap())
                    .unwrap()
                    .with_auth(Arc::new(RejectWithReason))
                    .on(Method::Get, Arc::new(Echo)),
            ))
            .unwrap();
        let resp = router.handle(raw_get("/secure")).await;
        assert_eq!(resp.status, 401);
        let www = resp
            .headers
            .iter()
            .find(|(k, _)| k == "www-authenticate")
            .map(|(_, v)| v.clone())
            .unwrap();
        assert!(www.starts_with(r#"Digest realm="x""#));
        assert!(www.contains("stale=true"));
    }

    #[tokio::test]
    async fn resource_unsupported_accept_is_415() {
        let dir = std::env::temp_dir().join(format!("webframe-router-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("page.html"), b"<html></html>").unwrap();

        let mut router = router();
        router
            .register(WebEntity::Resource(WebResource::new(
                Pattern::new("/page.html", true).unwrap(),
                "text/html",
                ResourceTarget::FileSystem(dir.clone()),
            )))
            .unwrap();

        let mut raw = raw_get("/page.html");
        raw.raw_headers
            .push(("Accept".to_string(), "application/pdf".to_string()));
        let resp = router.handle(raw).await;
        assert_eq!(resp.status, 415);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn duplicate_route_registration_is_a_setup_error() {
        let mut router = router();
        router.register(echo_api("/items")).unwrap();
        let err = router.register(echo_api("/items")).unwrap_err();
        assert!(matches!(err, RouterSetupError::DuplicateRoute(_)));
    }

    #[test]
    fn route_count_tracks_register_and_unregister() {
        let mut router = router();
        assert_eq!(router.route_count(), 0);
        router.register(echo_api("/items")).unwrap();
        assert_eq!(router.route_count(), 1);
        router.register(echo_api("/items/:id")).unwrap();
        assert_eq!(router.route_count(), 2);
        router.unregister(&Pattern::new("/items", true).unwrap());
        assert_eq!(router.route_count(), 1);
    }

    #[test]
    fn webapi_construction_rejects_non_exact_pattern() {
        let err = WebApi::new(Pattern::new("/files/*", true).unwrap()).unwrap_err();
        assert!(matches!(err, EntityError::ApiPatternMustBeExact));
    }
}
