use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// The type used for primary keys in the database.
pub type PrimaryKey = i64;

/// A numeric code that links a chat user to a website account
pub type LinkCode = i64;

/// A chat user
#[derive(Debug, Clone, FromRow)]
pub struct UserData {
    /// The id assigned by the chat platform
    pub id: PrimaryKey,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Whether a website account confirmed the link code
    pub linked: bool,
    pub link_code: LinkCode,
    pub created_at: DateTime<Utc>,
}

/// A track that was delivered at least once
#[derive(Debug, Clone, FromRow)]
pub struct TrackData {
    pub id: PrimaryKey,
    pub title: String,
    pub artist: Option<String>,
    /// The canonical source url, unique across tracks
    pub url: String,
    pub thumbnail_url: Option<String>,
    /// Duration in seconds
    pub duration: i64,
    pub created_at: DateTime<Utc>,
}

/// A single delivery of a track to a user
#[derive(Debug, Clone, FromRow)]
pub struct HistoryData {
    pub id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub track_id: PrimaryKey,
    pub downloaded_at: DateTime<Utc>,
}

/// A delivery along with the delivered track
#[derive(Debug, Clone, FromRow)]
pub struct HistoryEntry {
    pub history_id: PrimaryKey,
    pub downloaded_at: DateTime<Utc>,
    #[sqlx(flatten)]
    pub track: TrackData,
}

/// A track bookmarked by a user.
/// Note: `user_id` and `track_id` are unique together.
#[derive(Debug, Clone, FromRow)]
pub struct FavoriteData {
    pub id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub track_id: PrimaryKey,
}
