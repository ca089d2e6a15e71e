use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use log::info;
use sqlx::{
    query, query_as,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Error as SqlxError, SqliteConnection, SqlitePool,
};

use crate::{
    Database, DatabaseError, FavoriteData, HistoryData, HistoryEntry, IntoDatabaseError, LinkCode,
    NewTrack, NewUser, PrimaryKey, Result, TrackData, UserData,
};

/// How long a writer waits for another connection's write transaction
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// A sqlite database implementation for tunelink
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub async fn new(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| e.any())?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| e.any())?;

        Self::migrate(pool).await
    }

    /// A private database that lives as long as the returned value.
    /// Every query goes through one connection, since each sqlite memory connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| e.any())?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| e.any())?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        info!("Database is ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        query_as::<_, UserData>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "id"))
    }

    async fn user_by_link_code(&self, code: LinkCode) -> Result<UserData> {
        query_as::<_, UserData>("SELECT * FROM users WHERE link_code = ?")
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "link_code"))
    }

    async fn link_code_exists(&self, code: LinkCode) -> Result<bool> {
        query_as::<_, (i64,)>("SELECT COUNT(*) FROM users WHERE link_code = ?")
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .map(|(count,)| count > 0)
            .map_err(|e| e.any())
    }

    async fn find_or_create_user(
        &self,
        new_user: NewUser,
        link_code: LinkCode,
    ) -> Result<UserData> {
        let mut connection = self.pool.acquire().await.map_err(|e| e.any())?;
        upsert_user(&mut connection, &new_user, link_code).await
    }

    async fn update_link(
        &self,
        user_id: PrimaryKey,
        link_code: LinkCode,
        linked: bool,
    ) -> Result<UserData> {
        query_as::<_, UserData>(
            "UPDATE users SET link_code = ?, linked = ? WHERE id = ? RETURNING *",
        )
        .bind(link_code)
        .bind(linked)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            },
            e => e.conflict_or("user", "link_code", &link_code.to_string()),
        })
    }

    async fn set_linked_by_code(&self, code: LinkCode, linked: bool) -> Result<UserData> {
        query_as::<_, UserData>("UPDATE users SET linked = ? WHERE link_code = ? RETURNING *")
            .bind(linked)
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "link_code"))
    }

    async fn find_or_create_track(&self, new_track: NewTrack) -> Result<TrackData> {
        let mut connection = self.pool.acquire().await.map_err(|e| e.any())?;
        upsert_track(&mut connection, &new_track).await
    }

    async fn record_delivery(
        &self,
        new_user: NewUser,
        link_code: LinkCode,
        new_track: NewTrack,
    ) -> Result<HistoryData> {
        let mut transaction = self.pool.begin().await.map_err(|e| e.any())?;

        // The user insert is the first statement, which makes this a write transaction from the start
        let user = upsert_user(&mut transaction, &new_user, link_code).await?;
        let track = upsert_track(&mut transaction, &new_track).await?;
        let history = insert_history(&mut transaction, user.id, track.id).await?;

        transaction.commit().await.map_err(|e| e.any())?;

        Ok(history)
    }

    async fn list_history(&self, user_id: PrimaryKey, limit: u32) -> Result<Vec<HistoryEntry>> {
        query_as::<_, HistoryEntry>(
            "
            SELECT
                history.id AS history_id,
                history.downloaded_at,
                tracks.*
            FROM history
                INNER JOIN tracks ON history.track_id = tracks.id
            WHERE history.user_id = ?
            ORDER BY history.downloaded_at DESC, history.id DESC
            LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn create_favorite(
        &self,
        user_id: PrimaryKey,
        track_id: PrimaryKey,
    ) -> Result<FavoriteData> {
        query_as::<_, FavoriteData>(
            "INSERT INTO favorites (user_id, track_id) VALUES (?, ?) RETURNING *",
        )
        .bind(user_id)
        .bind(track_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.conflict_or("favorite", "track_id", &track_id.to_string()))
    }

    async fn list_favorites(&self, user_id: PrimaryKey) -> Result<Vec<TrackData>> {
        query_as::<_, TrackData>(
            "
            SELECT tracks.*
            FROM favorites
                INNER JOIN tracks ON favorites.track_id = tracks.id
            WHERE favorites.user_id = ?
            ORDER BY favorites.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }
}

/// Writes before it reads, so a transaction running this first takes the write lock up front
/// and waits for concurrent writers instead of failing to upgrade a read lock.
async fn upsert_user(
    connection: &mut SqliteConnection,
    new_user: &NewUser,
    link_code: LinkCode,
) -> Result<UserData> {
    // An existing id is absorbed, another user holding the code is not
    query(
        "
        INSERT INTO users (id, username, first_name, last_name, linked, link_code, created_at)
        VALUES (?, ?, ?, ?, FALSE, ?, ?)
        ON CONFLICT (id) DO NOTHING",
    )
    .bind(new_user.id)
    .bind(&new_user.username)
    .bind(&new_user.first_name)
    .bind(&new_user.last_name)
    .bind(link_code)
    .bind(Utc::now())
    .execute(&mut *connection)
    .await
    .map_err(|e| e.conflict_or("user", "link_code", &link_code.to_string()))?;

    query_as::<_, UserData>("SELECT * FROM users WHERE id = ?")
        .bind(new_user.id)
        .fetch_one(&mut *connection)
        .await
        .map_err(|e| e.not_found_or("user", "id"))
}

async fn upsert_track(connection: &mut SqliteConnection, new_track: &NewTrack) -> Result<TrackData> {
    query(
        "
        INSERT INTO tracks (title, artist, url, thumbnail_url, duration, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (url) DO NOTHING",
    )
    .bind(&new_track.title)
    .bind(&new_track.artist)
    .bind(&new_track.url)
    .bind(&new_track.thumbnail_url)
    .bind(new_track.duration)
    .bind(Utc::now())
    .execute(&mut *connection)
    .await
    .map_err(|e| e.any())?;

    query_as::<_, TrackData>("SELECT * FROM tracks WHERE url = ?")
        .bind(&new_track.url)
        .fetch_one(&mut *connection)
        .await
        .map_err(|e| e.not_found_or("track", "url"))
}

async fn insert_history(
    connection: &mut SqliteConnection,
    user_id: PrimaryKey,
    track_id: PrimaryKey,
) -> Result<HistoryData> {
    query_as::<_, HistoryData>(
        "INSERT INTO history (user_id, track_id, downloaded_at) VALUES (?, ?, ?) RETURNING *",
    )
    .bind(user_id)
    .bind(track_id)
    .bind(Utc::now())
    .fetch_one(&mut *connection)
    .await
    .map_err(|e| e.any())
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }

    fn conflict_or(self, resource: &'static str, field: &'static str, value: &str) -> DatabaseError {
        let is_unique_violation = self
            .as_database_error()
            .map(|e| e.is_unique_violation())
            .unwrap_or_default();

        if is_unique_violation {
            return DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            };
        }

        Self::any(self)
    }
}
