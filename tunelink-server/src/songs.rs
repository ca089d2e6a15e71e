use axum::{debug_handler, http::StatusCode, Json};
use log::info;
use tunelink_collab::{Job, NewUser, Origin};

use crate::{
    auth::ApiKey,
    schemas::{
        non_empty, ErrorResponse, ScheduledResponse, SendSongByCodeSchema, SendSongSchema,
        ValidatedJson,
    },
    ServerContext, ServerError, ServerResult,
};

type Scheduled = (StatusCode, Json<ScheduledResponse>);

/// Schedules delivery of a song to the user that owns a linked code
#[utoipa::path(
    post,
    path = "/api/send_song_by_code",
    request_body = SendSongByCodeSchema,
    responses(
        (status = 202, description = "Delivery is scheduled", body = ScheduledResponse),
        (status = 400, description = "The code or query is missing", body = ErrorResponse),
        (status = 401, description = "Missing or wrong API key", body = ErrorResponse),
        (status = 404, description = "The code is unknown or not linked", body = ErrorResponse),
        (status = 503, description = "The bot is not ready", body = ErrorResponse),
    ),
    security(("api_key" = []))
)]
#[debug_handler(state = ServerContext)]
pub async fn send_song_by_code(
    _: ApiKey,
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<SendSongByCodeSchema>,
) -> ServerResult<Scheduled> {
    let (Some(code), Some(query)) = (body.code, non_empty(body.query)) else {
        return Err(ServerError::InvalidInput("code and query are required"));
    };

    let user = context
        .collab
        .links
        .resolve_by_code(code)
        .await?
        .filter(|u| u.linked)
        .ok_or(ServerError::NotFound("Linked user"))?;

    let profile = NewUser {
        id: user.id,
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
    };

    // Private chats share their id with the user
    context
        .bridge
        .try_dispatch(Job::deliver(user.id, profile, query.clone(), Origin::Web))?;

    info!("Scheduled {:?} for user {}", query, user.id);

    Ok((
        StatusCode::ACCEPTED,
        Json(ScheduledResponse {
            status: "scheduled".to_string(),
            user_id: Some(user.id),
            chat_id: None,
            query,
        }),
    ))
}

/// Schedules delivery of a song to a chat
#[utoipa::path(
    post,
    path = "/api/send_song",
    request_body = SendSongSchema,
    responses(
        (status = 202, description = "Delivery is scheduled", body = ScheduledResponse),
        (status = 400, description = "The chat id or query is missing", body = ErrorResponse),
        (status = 401, description = "Missing or wrong API key", body = ErrorResponse),
        (status = 503, description = "The bot is not ready", body = ErrorResponse),
    ),
    security(("api_key" = []))
)]
#[debug_handler(state = ServerContext)]
pub async fn send_song(
    _: ApiKey,
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<SendSongSchema>,
) -> ServerResult<Scheduled> {
    let (Some(chat_id), Some(query)) = (body.chat_id, non_empty(body.query)) else {
        return Err(ServerError::InvalidInput("chat_id and query are required"));
    };

    context.bridge.try_dispatch(Job::deliver(
        chat_id,
        NewUser::with_id(chat_id),
        query.clone(),
        Origin::Web,
    ))?;

    info!("Scheduled {:?} for chat {}", query, chat_id);

    Ok((
        StatusCode::ACCEPTED,
        Json(ScheduledResponse {
            status: "scheduled".to_string(),
            user_id: None,
            chat_id: Some(chat_id),
            query,
        }),
    ))
}
