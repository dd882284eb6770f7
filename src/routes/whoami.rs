//! Caller identity endpoint, useful when debugging proxy and load balancer
//! setups in front of the service.

use std::net::SocketAddr;

use axum::{extract::ConnectInfo, http::HeaderMap, Json};
use serde_json::{json, Value};

/// Handler for `GET /whoami`.
///
/// Behind a proxy or load balancer the peer address is the proxy's, so the
/// first entry of `X-Forwarded-For` wins when present.
pub async fn whoami(
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Json<Value> {
    let ip = forwarded_ip(&headers).unwrap_or_else(|| addr.ip().to_string());
    Json(json!({ "ip": ip }))
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("x-forwarded-for")?.to_str().ok()?;
    value
        .split(',')
        .next()
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}
