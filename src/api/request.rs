use axum::{
    body::Bytes,
    extract::{ConnectInfo, Extension, Path, Query, State},
    http::HeaderMap,
    routing::{any, MethodRouter},
};
use serde_json::Value;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::error::{ApiError, ErrorCode, ErrorType};
use crate::handlers::{method_not_allowed, Endpoint};
use crate::middleware::{authorization_header, Reply, SessionContext};
use crate::services::RequestContext;
use crate::types::Method;

/// Route every verb of a path to `endpoint`.
pub fn mount<S>(endpoint: Endpoint) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    any(serve_endpoint).with_state(Arc::new(endpoint))
}

/// Turn the axum request into a `RequestContext` and run the endpoint.
#[allow(clippy::too_many_arguments)]
async fn serve_endpoint(
    State(endpoint): State<Arc<Endpoint>>,
    method: axum::http::Method,
    params: Option<Path<HashMap<String, String>>>,
    query: Option<Query<HashMap<String, String>>>,
    session: Option<Extension<SessionContext>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Reply, ApiError> {
    let Some(verb) = Method::from_http(&method) else {
        return Ok(method_not_allowed(method));
    };
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(reply) => return Ok(reply),
    };

    let mut ctx = RequestContext::new(verb);
    ctx.captures = params.map(|Path(p)| p).unwrap_or_default();
    ctx.query = query.map(|Query(q)| q).unwrap_or_default();
    ctx.body = body;
    ctx.client_ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    ctx.authorization = authorization_header(&headers);
    if let Some(Extension(session)) = session {
        ctx.user = session.user;
        ctx.session_resolved = true;
    }

    endpoint.serve(ctx).await
}

/// Empty bodies are absent; anything else must be JSON.
fn parse_body(bytes: &[u8]) -> Result<Option<Value>, Reply> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(bytes).map(Some).map_err(|e| {
        Reply::failure(ErrorType::Custom {
            code: ErrorCode::InvalidInputType,
            field: None,
            context: Some(Value::String(e.to_string())),
        })
    })
}

/// First `X-Forwarded-For` hop when it is an address, else the peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|hop| hop.trim().parse::<IpAddr>().ok())
        .or_else(|| peer.map(|addr| addr.ip()))
        .map(|ip| ip.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};
    use serde_json::json;

    #[test]
    fn forwarded_address_wins_over_peer() {
        let peer: SocketAddr = "10.0.0.9:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("10.0.0.9"));

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("203.0.113.7"));

        headers.insert("x-forwarded-for", HeaderValue::from_static("unknown"));
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("10.0.0.9"));
        assert_eq!(client_ip(&headers, None), None);
    }

    #[test]
    fn blank_bodies_are_absent_and_bad_json_is_a_400() {
        assert_eq!(parse_body(b"").unwrap(), None);
        assert_eq!(parse_body(b" \n").unwrap(), None);
        assert_eq!(parse_body(br#"{"a":1}"#).unwrap(), Some(json!({"a": 1})));

        let reply = parse_body(b"{oops").unwrap_err();
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body[0]["code"], json!(14));
        assert_eq!(reply.body[0]["field"], Value::Null);
        assert!(reply.body[0]["context"].is_string());
    }
}
