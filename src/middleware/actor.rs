//! Actor extraction for authenticated routes.
//!
//! Authentication itself is an upstream concern: an authenticating proxy
//! forwards the caller's identity via headers. Headers are trusted as-is,
//! which matches how the gateway in front of this service operates.
//! The webhook route deliberately takes no actor.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_EMAIL_HEADER: &str = "X-User-Email";
pub const USER_NAME_HEADER: &str = "X-User-Name";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

/// The caller on whose behalf a request runs.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// Staff/admin callers may act on bookings they do not own.
    pub is_privileged: bool,
}

impl Actor {
    /// Whether this actor may operate on a resource owned by `owner_id`.
    pub fn can_access(&self, owner_id: &str) -> bool {
        self.is_privileged || self.user_id == owner_id
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing X-User-Id header"))
            })?;

        let email = parts
            .headers
            .get(USER_EMAIL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let display_name = parts
            .headers
            .get(USER_NAME_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let is_privileged = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|role| role.eq_ignore_ascii_case("admin"))
            .unwrap_or(false);

        let span = tracing::Span::current();
        span.record("user_id", user_id);

        Ok(Actor {
            user_id: user_id.to_string(),
            email,
            display_name,
            is_privileged,
        })
    }
}
