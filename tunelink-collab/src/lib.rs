mod db;
mod jobs;
mod library;
mod links;
mod media;
mod thumbnails;
mod transport;
mod util;

use std::sync::Arc;

pub use db::*;
pub use jobs::*;
pub use library::*;
pub use links::{LinkCodes, LinkError, LinkMessages, LINK_CODE_ATTEMPTS};
pub use media::*;
pub use thumbnails::*;
pub use transport::*;

use tunelink_core::Config;

/// The tunelink collab system, tying media acquisition, caching, and the user record together.
pub struct Collab<Db, E> {
    pub config: Config,
    pub links: LinkCodes<Db>,
    pub library: Library<Db>,
    pub media: MediaService<E>,
    pub thumbnails: ThumbnailCache,
    pub link_messages: LinkMessages,
}

/// The collab system as it runs in production
pub type DefaultCollab = Collab<SqliteDatabase, YtDlp>;

impl<Db, E> Collab<Db, E>
where
    Db: Database,
    E: Extractor,
{
    pub fn new(config: Config, database: Db, extractor: E) -> Self {
        let database = Arc::new(database);

        Self {
            links: LinkCodes::new(database.clone()),
            library: Library::new(database),
            media: MediaService::new(&config, extractor),
            thumbnails: ThumbnailCache::new(&config),
            link_messages: LinkMessages::new(),
            config,
        }
    }
}
