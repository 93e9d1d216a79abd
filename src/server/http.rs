//! Translate between `hyper`'s wire types and the transport-agnostic
//! [`crate::request::RawRequest`] / [`crate::router::RouterResponse`] the
//! [`crate::router::Router`] operates on.

use super::ServerState;
use crate::request::RawRequest;
use crate::router::RouterResponse;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response};
use std::net::SocketAddr;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub async fn handle_request(
    req: Request<Incoming>,
    state: ServerState,
    peer_addr: SocketAddr,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();
    let raw_query = req.uri().query().map(str::to_string);
    let content_length = req
        .headers()
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    let raw_headers: Vec<(String, String)> = req
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();

    let body_bytes = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes().to_vec(),
        Err(e) => {
            tracing::warn!(peer = %peer_addr, "failed to read request body: {e}");
            Vec::new()
        }
    };

    let raw = RawRequest {
        method,
        path,
        raw_query,
        raw_headers,
        content_length,
        body: body_bytes,
    };

    let response = state.router.handle(raw).await;
    Ok(render(response))
}

fn render(response: RouterResponse) -> Response<BoxBody> {
    let mut builder = Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(full_body(response.body))
        .unwrap_or_else(|_| Response::new(full_body(Vec::new())))
}
