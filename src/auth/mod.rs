/*!
 * # Authentication gate
 *
 * Every ledger, catalog and dashboard route sits behind this gate. A caller is
 * identified by an HS256 JWT whose `sub` claim carries the caller's UUID. The
 * token may arrive as an `Authorization: Bearer` header or a `token` cookie.
 *
 * The gate only answers "is there a valid caller"; it performs no authorization.
 */

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::request::Parts,
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::config::AppConfig;

/// Cookie name accepted when no bearer header is present
pub const AUTH_COOKIE: &str = "token";

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Caller id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// Opaque identity of an authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(pub Uuid);

impl CallerId {
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authenticated caller extracted from the token, stored in request extensions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub caller_id: CallerId,
    pub email: Option<String>,
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub token_ttl_secs: i64,
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            jwt_secret: cfg.jwt_secret.clone(),
            jwt_issuer: cfg.jwt_issuer.clone(),
            jwt_audience: cfg.jwt_audience.clone(),
            token_ttl_secs: cfg.jwt_expiration as i64,
        }
    }
}

/// Validates caller credentials
#[derive(Clone, Debug)]
pub struct AuthService {
    config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        if !self.config.jwt_issuer.is_empty() {
            validation.set_issuer(&[self.config.jwt_issuer.as_str()]);
        }
        if !self.config.jwt_audience.is_empty() {
            validation.set_audience(&[self.config.jwt_audience.as_str()]);
        }
        validation
    }

    /// Decode and verify a token
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &self.validation(),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }

    /// Resolve a raw credential to the caller it identifies
    pub fn identify(&self, credential: &str) -> Result<AuthUser, AuthError> {
        let claims = self.validate_token(credential)?;
        let caller = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(AuthUser {
            caller_id: CallerId(caller),
            email: claims.email,
        })
    }

    /// Mint a token for `caller`. Used by operators and test harnesses;
    /// the service exposes no login endpoint.
    pub fn issue_token(&self, caller: CallerId, email: Option<String>) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: caller.to_string(),
            email,
            iat: now,
            exp: now + self.config.token_ttl_secs,
            iss: (!self.config.jwt_issuer.is_empty()).then(|| self.config.jwt_issuer.clone()),
            aud: (!self.config.jwt_audience.is_empty()).then(|| self.config.jwt_audience.clone()),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Auth failures render through the service error envelope so every 401
/// carries the same body shape as other API errors.
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        crate::errors::ServiceError::from(self).into_response()
    }
}

/// Pull the raw credential out of the bearer header, falling back to the cookie
fn credential_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == AUTH_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Middleware that rejects unauthenticated requests and stores `AuthUser`
/// in the request extensions for handlers.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return AuthError::InternalError("Authentication service not available".into())
                .into_response();
        }
    };

    let Some(credential) = credential_from_headers(request.headers()) else {
        return AuthError::MissingAuth.into_response();
    };

    match auth_service.identify(&credential) {
        Ok(user) => {
            debug!(caller = %user.caller_id, "authenticated request");
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Handlers behind `with_auth` take the caller as an extractor.
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingAuth)
    }
}

pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn service() -> AuthService {
        AuthService::new(AuthConfig {
            jwt_secret: "k".repeat(32) + "unit-test-signing-material-0123",
            jwt_issuer: String::new(),
            jwt_audience: String::new(),
            token_ttl_secs: 600,
        })
    }

    #[test]
    fn issued_token_identifies_caller() {
        let svc = service();
        let caller = CallerId(Uuid::new_v4());
        let token = svc.issue_token(caller, Some("a@b.c".into())).unwrap();
        let user = svc.identify(&token).unwrap();
        assert_eq!(user.caller_id, caller);
        assert_eq!(user.email.as_deref(), Some("a@b.c"));
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let caller = CallerId(Uuid::new_v4());
        let other = AuthService::new(AuthConfig {
            jwt_secret: "another-secret-entirely-different-from-the-first-one".into(),
            ..service().config
        });
        let token = other.issue_token(caller, None).unwrap();
        assert!(matches!(
            service().identify(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let svc = AuthService::new(AuthConfig {
            token_ttl_secs: -3600,
            ..service().config
        });
        let token = svc.issue_token(CallerId(Uuid::new_v4()), None).unwrap();
        assert!(matches!(svc.identify(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn non_uuid_subject_is_invalid() {
        let svc = service();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "not-a-uuid".into(),
            email: None,
            iat: now,
            exp: now + 60,
            iss: None,
            aud: None,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(svc.config.jwt_secret.as_bytes()),
        )
        .unwrap();
        assert!(matches!(svc.identify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn credential_prefers_bearer_then_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; token=cookie-token"),
        );
        assert_eq!(
            credential_from_headers(&headers).as_deref(),
            Some("cookie-token")
        );

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer header-token"),
        );
        assert_eq!(
            credential_from_headers(&headers).as_deref(),
            Some("header-token")
        );

        assert!(credential_from_headers(&HeaderMap::new()).is_none());
    }
}
