use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::{ServerContext, ServerError};

pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Proof that the request carried the configured API key.
/// Every request passes when no key is configured.
pub struct ApiKey;

#[async_trait]
impl FromRequestParts<ServerContext> for ApiKey {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.api_key.as_deref() else {
            return Ok(Self);
        };

        let provided = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|x| x.to_str().ok())
            .ok_or(ServerError::Unauthorized)?;

        if provided != expected {
            return Err(ServerError::Unauthorized);
        }

        Ok(Self)
    }
}
