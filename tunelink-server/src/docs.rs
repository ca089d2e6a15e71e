use std::borrow::BorrowMut;

use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{ApiKey as ApiKeyScheme, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

use crate::{auth::API_KEY_HEADER, links, schemas, songs};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::health,
        links::link_by_code,
        songs::send_song_by_code,
        songs::send_song
    ),
    components(schemas(
        schemas::LinkByCodeSchema,
        schemas::SendSongByCodeSchema,
        schemas::SendSongSchema,
        schemas::HealthResponse,
        schemas::LinkedResponse,
        schemas::ScheduledResponse,
        schemas::ErrorResponse
    )),
    modifiers(&Security),
    info(
        description = "tunelink-server lets the website link accounts and schedule deliveries to the bot"
    ))
]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.borrow_mut() {
            let scheme = ApiKeyScheme::Header(ApiKeyValue::new(API_KEY_HEADER));
            components.add_security_scheme("api_key", SecurityScheme::ApiKey(scheme))
        }
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
