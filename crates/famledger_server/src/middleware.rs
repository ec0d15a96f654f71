use crate::admission::AdmissionController;
use crate::error::ApiError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;

/// Resolved client address, stored in request extensions for later layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

#[derive(Clone)]
pub struct AdmissionState {
    pub controller: Arc<AdmissionController>,
    pub trust_forwarded_for: bool,
}

/// Runs every request through the admission controller before routing.
pub async fn admit(
    State(state): State<AdmissionState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client = client_address(&request, state.trust_forwarded_for);
    state
        .controller
        .check(&client, request.uri().path())
        .map_err(ApiError::Denied)?;

    request.extensions_mut().insert(ClientAddr(client));
    Ok(next.run(request).await)
}

/// Socket peer IP, or the first `X-Forwarded-For` hop when proxies are trusted.
pub fn client_address(request: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(first_hop) = forwarded {
            return first_hop.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with(forwarded: Option<&str>, peer: Option<SocketAddr>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/expenses");
        if let Some(value) = forwarded {
            builder = builder.header("x-forwarded-for", value);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        if let Some(addr) = peer {
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    #[test]
    fn peer_address_is_used_by_default() {
        let peer: SocketAddr = "192.168.1.20:50000".parse().unwrap();
        let request = request_with(Some("203.0.113.7"), Some(peer));
        assert_eq!(client_address(&request, false), "192.168.1.20");
    }

    #[test]
    fn forwarded_header_wins_when_trusted() {
        let peer: SocketAddr = "10.0.0.1:50000".parse().unwrap();
        let request = request_with(Some(" 203.0.113.7 , 10.0.0.1"), Some(peer));
        assert_eq!(client_address(&request, true), "203.0.113.7");
    }

    #[test]
    fn falls_back_to_unknown() {
        let request = request_with(None, None);
        assert_eq!(client_address(&request, true), "unknown");
    }
}
