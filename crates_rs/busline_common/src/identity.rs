//! Identity forwarded by the upstream auth proxy.
//!
//! The proxy authenticates the user and sets `x-user-*` headers along with a shared
//! secret. [`TrustedIdentityLayer`] turns those headers into an [`Identity`] request
//! extension, but only when the secret matches; otherwise the request is anonymous.

use axum::http::{HeaderMap, Request};
use axum::response::Response;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use subtle::ConstantTimeEq;
use tower::{Layer, Service};

pub const PROXY_SECRET_HEADER: &str = "x-auth-proxy-secret";
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ROLES_HEADER: &str = "x-user-roles";

const ADMIN_ROLES: &[&str] = &["admin", "staff"];
const MAX_USER_ID_LEN: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

impl Identity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    pub fn is_admin(&self) -> bool {
        ADMIN_ROLES.iter().any(|r| self.has_role(r))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn identity_from_headers(headers: &HeaderMap) -> Option<Identity> {
    let user_id = header_str(headers, USER_ID_HEADER)?;
    if user_id.len() > MAX_USER_ID_LEN {
        return None;
    }
    let roles = header_str(headers, USER_ROLES_HEADER)
        .map(|raw| {
            let mut out: Vec<String> = Vec::new();
            for role in raw.split(',') {
                let role = role.trim().to_ascii_lowercase();
                if !role.is_empty() && !out.contains(&role) {
                    out.push(role);
                }
            }
            out
        })
        .unwrap_or_default();
    Some(Identity {
        user_id: user_id.to_string(),
        name: header_str(headers, USER_NAME_HEADER).map(str::to_string),
        email: header_str(headers, USER_EMAIL_HEADER).map(str::to_string),
        roles,
    })
}

fn proxy_secret_matches(headers: &HeaderMap, secret: Option<&str>) -> bool {
    let Some(expected) = secret.map(str::trim).filter(|s| !s.is_empty()) else {
        return false;
    };
    let provided = header_str(headers, PROXY_SECRET_HEADER).unwrap_or("");
    !provided.is_empty() && provided.as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() == 1
}

fn has_secret(secret: Option<&str>) -> bool {
    secret.map(str::trim).is_some_and(|s| !s.is_empty())
}

#[derive(Clone)]
pub struct TrustedIdentityLayer {
    require_secret: bool,
    secret: Option<String>,
}

impl TrustedIdentityLayer {
    /// A configured secret is always checked. Only with no secret at all and
    /// `require_secret == false` are identity headers trusted as-is, which is meant for
    /// local development without a proxy in front.
    pub fn new(require_secret: bool, secret: Option<String>) -> Self {
        Self {
            require_secret,
            secret,
        }
    }
}

impl<S> Layer<S> for TrustedIdentityLayer {
    type Service = TrustedIdentityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TrustedIdentityService {
            inner,
            require_secret: self.require_secret,
            secret: self.secret.clone(),
        }
    }
}

#[derive(Clone)]
pub struct TrustedIdentityService<S> {
    inner: S,
    require_secret: bool,
    secret: Option<String>,
}

impl<S, B> Service<Request<B>> for TrustedIdentityService<S>
where
    S: Service<Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        req.extensions_mut().remove::<Identity>();

        let trusted = if has_secret(self.secret.as_deref()) {
            proxy_secret_matches(req.headers(), self.secret.as_deref())
        } else {
            !self.require_secret
        };
        if trusted {
            if let Some(identity) = identity_from_headers(req.headers()) {
                req.extensions_mut().insert(identity);
            }
        }

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        h
    }

    #[test]
    fn parses_roles_lowercased_and_deduplicated() {
        let h = headers(&[
            (USER_ID_HEADER, "u-1"),
            (USER_ROLES_HEADER, "Staff, staff ,,rider"),
        ]);
        let id = identity_from_headers(&h).expect("identity");
        assert_eq!(id.roles, vec!["staff".to_string(), "rider".to_string()]);
        assert!(id.is_admin());
    }

    #[test]
    fn missing_user_id_is_anonymous() {
        let h = headers(&[(USER_NAME_HEADER, "Ana")]);
        assert!(identity_from_headers(&h).is_none());
    }

    #[test]
    fn secret_must_match_exactly() {
        let h = headers(&[(PROXY_SECRET_HEADER, "proxy-secret")]);
        assert!(proxy_secret_matches(&h, Some("proxy-secret")));
        assert!(!proxy_secret_matches(&h, Some("proxy-secret-2")));
        assert!(!proxy_secret_matches(&h, None));
        assert!(!proxy_secret_matches(&HeaderMap::new(), Some("proxy-secret")));
    }
}
