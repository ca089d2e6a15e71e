use async_trait::async_trait;
use thiserror::Error;

mod data;
pub use data::*;

mod sqlite;
pub use sqlite::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    /// No free value for a unique field could be found
    #[error("Could not find a free {resource} {field} after {attempts} attempts")]
    Exhausted {
        resource: &'static str,
        field: &'static str,
        attempts: usize,
    },
}

impl DatabaseError {
    /// Returns true if this is a conflict on the given field
    pub fn is_conflict_on(&self, field: &str) -> bool {
        matches!(self, DatabaseError::Conflict { field: f, .. } if *f == field)
    }
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn conflict_or(self, resource: &'static str, field: &'static str, value: &str)
        -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult<T> {
    /// Turns a not found error into `None`
    fn optional(self) -> Result<Option<T>>;
}

impl<T> DatabaseResult<T> for Result<T> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(DatabaseError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Represents a type that can store tunelink data.
///
/// Every method is a self-contained unit of work: either a single statement
/// or a single transaction. Uniqueness is left to the store's own constraints,
/// so races between find-or-create calls resolve to the same row.
#[async_trait]
pub trait Database: Send + Sync {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData>;
    async fn user_by_link_code(&self, code: LinkCode) -> Result<UserData>;
    async fn link_code_exists(&self, code: LinkCode) -> Result<bool>;
    /// Returns the existing user unchanged, or creates it holding `link_code`.
    /// Fails with a conflict on `link_code` if another user holds the code.
    async fn find_or_create_user(&self, new_user: NewUser, link_code: LinkCode)
        -> Result<UserData>;
    /// Assigns a new link code and link state to an existing user.
    async fn update_link(
        &self,
        user_id: PrimaryKey,
        link_code: LinkCode,
        linked: bool,
    ) -> Result<UserData>;
    /// Sets the link state of the user holding the code.
    async fn set_linked_by_code(&self, code: LinkCode, linked: bool) -> Result<UserData>;

    /// Returns the track with the same url unchanged, or creates it.
    async fn find_or_create_track(&self, new_track: NewTrack) -> Result<TrackData>;

    /// Creates the user and track if needed and appends a history row, all in one transaction.
    async fn record_delivery(
        &self,
        new_user: NewUser,
        link_code: LinkCode,
        new_track: NewTrack,
    ) -> Result<HistoryData>;
    async fn list_history(&self, user_id: PrimaryKey, limit: u32) -> Result<Vec<HistoryEntry>>;

    async fn create_favorite(&self, user_id: PrimaryKey, track_id: PrimaryKey)
        -> Result<FavoriteData>;
    async fn list_favorites(&self, user_id: PrimaryKey) -> Result<Vec<TrackData>>;
}

/// The profile of a chat user, as reported by the chat platform
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub id: PrimaryKey,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl NewUser {
    /// A profile that only carries the identity
    pub fn with_id(id: PrimaryKey) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewTrack {
    pub title: String,
    pub artist: Option<String>,
    /// The canonical source url, which identifies the track
    pub url: String,
    pub thumbnail_url: Option<String>,
    /// Duration in seconds
    pub duration: u32,
}
