use axum::{debug_handler, Json};
use log::info;
use tunelink_collab::Job;

use crate::{
    auth::ApiKey,
    schemas::{ErrorResponse, LinkByCodeSchema, LinkedResponse, ValidatedJson},
    ServerContext, ServerError, ServerResult,
};

/// Marks the owner of a link code as linked to the website
#[utoipa::path(
    post,
    path = "/api/link_by_code",
    request_body = LinkByCodeSchema,
    responses(
        (status = 200, description = "The user is now linked", body = LinkedResponse),
        (status = 400, description = "The code is missing or not a number", body = ErrorResponse),
        (status = 401, description = "Missing or wrong API key", body = ErrorResponse),
        (status = 404, description = "No user has this code", body = ErrorResponse),
    ),
    security(("api_key" = []))
)]
#[debug_handler(state = ServerContext)]
pub async fn link_by_code(
    _: ApiKey,
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<LinkByCodeSchema>,
) -> ServerResult<Json<LinkedResponse>> {
    let code = body.code.ok_or(ServerError::InvalidInput("code required"))?;

    let user = context
        .collab
        .links
        .mark_linked(code)
        .await?
        .ok_or(ServerError::NotFound("Link code"))?;

    info!("Linked user {} through the website", user.id);

    // The bot may be down, the link itself still stands
    context.bridge.dispatch(Job::NotifyLinked { user_id: user.id });

    Ok(Json(LinkedResponse {
        status: "linked".to_string(),
        user_id: user.id,
    }))
}
