use std::sync::Arc;

use log::info;

use crate::{
    db, links::with_fresh_code, util::random_link_code, Database, DatabaseResult, FavoriteData,
    HistoryData, HistoryEntry, LinkCode, NewTrack, NewUser, PrimaryKey, TrackData, UserData,
};

/// The durable record of users, tracks, and what was delivered to whom.
pub struct Library<Db> {
    database: Arc<Db>,
}

impl<Db> Library<Db>
where
    Db: Database,
{
    pub fn new(database: Arc<Db>) -> Self {
        Self { database }
    }

    /// Returns the user, creating it with a fresh link code if it is new.
    /// An existing user is returned unchanged.
    pub async fn find_or_create_user(&self, profile: NewUser) -> db::Result<UserData> {
        if let Some(user) = self.database.user_by_id(profile.id).await.optional()? {
            return Ok(user);
        }

        let db = self.database.as_ref();
        with_fresh_code(db, random_link_code, |code| {
            db.find_or_create_user(profile.clone(), code)
        })
        .await
    }

    pub async fn find_or_create_track(&self, new_track: NewTrack) -> db::Result<TrackData> {
        self.database.find_or_create_track(new_track).await
    }

    /// Records one delivery of a track, creating the user and track if needed.
    /// Nothing is written unless everything is.
    pub async fn record_delivery(
        &self,
        profile: NewUser,
        new_track: NewTrack,
    ) -> db::Result<HistoryData> {
        let db = self.database.as_ref();

        let history = with_fresh_code(db, random_link_code, |code: LinkCode| {
            db.record_delivery(profile.clone(), code, new_track.clone())
        })
        .await?;

        info!(
            "Recorded delivery of track {} to user {}",
            history.track_id, history.user_id
        );

        Ok(history)
    }

    pub async fn lookup_user(&self, user_id: PrimaryKey) -> db::Result<Option<UserData>> {
        self.database.user_by_id(user_id).await.optional()
    }

    pub async fn lookup_user_by_code(&self, code: LinkCode) -> db::Result<Option<UserData>> {
        self.database.user_by_link_code(code).await.optional()
    }

    /// Returns the latest deliveries to the user, newest first.
    pub async fn history(&self, user_id: PrimaryKey, limit: u32) -> db::Result<Vec<HistoryEntry>> {
        self.database.list_history(user_id, limit).await
    }

    pub async fn add_favorite(
        &self,
        user_id: PrimaryKey,
        track_id: PrimaryKey,
    ) -> db::Result<FavoriteData> {
        self.database.create_favorite(user_id, track_id).await
    }

    pub async fn favorites(&self, user_id: PrimaryKey) -> db::Result<Vec<TrackData>> {
        self.database.list_favorites(user_id).await
    }
}
