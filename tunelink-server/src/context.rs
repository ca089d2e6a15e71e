use std::{convert::Infallible, sync::Arc};

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tunelink_collab::{DefaultCollab, Job};
use tunelink_core::DispatchBridge;

#[derive(Clone)]
pub struct ServerContext {
    pub collab: Arc<DefaultCollab>,
    pub bridge: Arc<DispatchBridge<Job>>,
    /// Requests must carry this key when it is set
    pub api_key: Option<Arc<str>>,
}

impl ServerContext {
    pub fn new(collab: Arc<DefaultCollab>, bridge: Arc<DispatchBridge<Job>>) -> Self {
        Self {
            collab,
            bridge,
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.map(Into::into);
        self
    }
}

#[async_trait]
impl FromRequestParts<ServerContext> for ServerContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        Ok(state.clone())
    }
}
