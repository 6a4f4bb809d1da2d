use crate::error::ApiError;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use busline_common::identity::Identity;

/// Any authenticated passenger. Anonymous requests get 401.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub Identity);

/// Authenticated user holding the admin or staff role. Others get 403.
#[derive(Clone, Debug)]
pub struct AdminUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| ApiError::unauthorized("authentication required"))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(identity) = CurrentUser::from_request_parts(parts, state).await?;
        if !identity.is_admin() {
            return Err(ApiError::forbidden("admin role required"));
        }
        Ok(AdminUser(identity))
    }
}

/// Bookings of other users look like they do not exist, unless the caller is an admin.
pub fn ensure_owner(identity: &Identity, owner_id: &str) -> Result<(), ApiError> {
    if identity.user_id == owner_id || identity.is_admin() {
        Ok(())
    } else {
        Err(ApiError::not_found("booking not found"))
    }
}
