use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::ServerError;

#[derive(Debug, ToSchema, Validate, Deserialize)]
pub struct LinkByCodeSchema {
    /// The link code shown to the user, as a number or a numeric string
    #[serde(default, deserialize_with = "lenient_integer")]
    #[schema(example = 12345678)]
    pub code: Option<i64>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
pub struct SendSongByCodeSchema {
    #[serde(default, deserialize_with = "lenient_integer")]
    #[schema(example = 12345678)]
    pub code: Option<i64>,
    /// A free-text search or a media URL
    #[validate(length(max = 512))]
    pub query: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
pub struct SendSongSchema {
    #[serde(default, deserialize_with = "lenient_integer")]
    pub chat_id: Option<i64>,
    #[validate(length(max = 512))]
    pub query: Option<String>,
}

#[derive(Debug, ToSchema, Serialize, Deserialize)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
}

#[derive(Debug, ToSchema, Serialize, Deserialize)]
pub struct LinkedResponse {
    #[schema(example = "linked")]
    pub status: String,
    pub user_id: i64,
}

#[derive(Debug, ToSchema, Serialize, Deserialize)]
pub struct ScheduledResponse {
    #[schema(example = "scheduled")]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
    pub query: String,
}

#[derive(Debug, ToSchema, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Integer {
    Number(i64),
    Text(String),
}

/// Accepts an integer as a JSON number or a numeric string.
/// Anything that is not a number becomes `None`.
fn lenient_integer<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Integer>::deserialize(deserializer)?;

    Ok(match value {
        Some(Integer::Number(n)) => Some(n),
        Some(Integer::Text(text)) => text.trim().parse().ok(),
        None => None,
    })
}

/// Returns the trimmed query, if there is anything left of it
pub fn non_empty(query: Option<String>) -> Option<String> {
    query
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|_| ServerError::InvalidInput("JSON parse failed"))?;

        extracted_json
            .0
            .validate()
            .map_err(|_| ServerError::InvalidInput("Request body is invalid"))?;

        Ok(Self(extracted_json.0))
    }
}
