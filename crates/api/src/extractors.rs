//! Request extractors.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use analytics_core::limits::MAX_USER_ID_LEN;

/// Client IP address.
#[derive(Debug, Clone)]
pub struct ClientIp(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Try X-Forwarded-For first (for proxied requests)
        if let Some(xff) = parts.headers.get("X-Forwarded-For") {
            if let Ok(xff_str) = xff.to_str() {
                // Take the first IP in the chain
                if let Some(ip) = xff_str.split(',').next() {
                    return Ok(ClientIp(Some(ip.trim().to_string())));
                }
            }
        }

        // Try X-Real-IP
        if let Some(real_ip) = parts.headers.get("X-Real-IP") {
            if let Ok(ip) = real_ip.to_str() {
                return Ok(ClientIp(Some(ip.to_string())));
            }
        }

        Ok(ClientIp(None))
    }
}

/// Authenticated user id, forwarded by the auth layer as `X-User-Id`.
///
/// Authentication itself is an external collaborator; the pipeline only
/// links identities opportunistically when the header is present.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-Id")
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty() && s.len() <= MAX_USER_ID_LEN)
            .map(String::from);

        Ok(AuthUser(user_id))
    }
}

/// Ambient request metadata used by identity resolution.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// Our own host, for landing-page detection
    pub host: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let get = |name: header::HeaderName| {
            parts
                .headers
                .get(name)
                .and_then(|h| h.to_str().ok())
                .map(String::from)
        };

        Ok(RequestMeta {
            host: get(header::HOST).map(|h| {
                // Strip any port so comparisons are host-only.
                h.split(':').next().unwrap_or(&h).to_string()
            }),
            user_agent: get(header::USER_AGENT),
            referrer: get(header::REFERER),
        })
    }
}
