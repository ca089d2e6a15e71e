use std::{future::Future, sync::Arc};

use dashmap::DashMap;
use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    db, util::random_link_code, Database, DatabaseError, DatabaseResult, LinkCode, MessageRef,
    NewUser, PrimaryKey, UserData,
};

/// How many codes are tried before giving up on finding a free one
pub const LINK_CODE_ATTEMPTS: usize = 32;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("No free link code was found after {attempts} attempts")]
    CodeSpaceExhausted { attempts: usize },
    #[error("User {0} doesn't exist")]
    UserNotFound(PrimaryKey),
    #[error(transparent)]
    Database(DatabaseError),
}

impl From<DatabaseError> for LinkError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::Exhausted { attempts, .. } => LinkError::CodeSpaceExhausted { attempts },
            e => LinkError::Database(e),
        }
    }
}

/// Runs `attempt` with freshly generated codes until one is accepted.
///
/// A code that is already taken is skipped before `attempt` runs, and a conflict
/// on `link_code` reported by `attempt` counts as a collision with a concurrent writer.
pub(crate) async fn with_fresh_code<Db, G, F, Fut, T>(
    database: &Db,
    mut generate: G,
    mut attempt: F,
) -> db::Result<T>
where
    Db: Database + ?Sized,
    G: FnMut() -> LinkCode,
    F: FnMut(LinkCode) -> Fut,
    Fut: Future<Output = db::Result<T>>,
{
    for _ in 0..LINK_CODE_ATTEMPTS {
        let code = generate();

        if database.link_code_exists(code).await? {
            debug!("Link code collision, retrying");
            continue;
        }

        match attempt(code).await {
            Err(e) if e.is_conflict_on("link_code") => {
                debug!("Link code was taken concurrently, retrying");
            }
            result => return result,
        }
    }

    warn!(
        "Could not find a free link code in {} attempts",
        LINK_CODE_ATTEMPTS
    );

    Err(DatabaseError::Exhausted {
        resource: "user",
        field: "link_code",
        attempts: LINK_CODE_ATTEMPTS,
    })
}

/// Issues and validates the codes that link a chat user to a website account.
pub struct LinkCodes<Db> {
    database: Arc<Db>,
    generate: fn() -> LinkCode,
}

impl<Db> LinkCodes<Db>
where
    Db: Database,
{
    pub fn new(database: Arc<Db>) -> Self {
        Self::with_generator(database, random_link_code)
    }

    pub fn with_generator(database: Arc<Db>, generate: fn() -> LinkCode) -> Self {
        Self { database, generate }
    }

    /// Gives the user a fresh unlinked code, creating the user if needed.
    pub async fn issue_code(&self, profile: NewUser) -> Result<LinkCode, LinkError> {
        let db = self.database.as_ref();
        let user_id = profile.id;

        let user = match db.user_by_id(user_id).await.optional()? {
            Some(_) => {
                with_fresh_code(db, self.generate, |code| {
                    db.update_link(user_id, code, false)
                })
                .await?
            }
            None => {
                with_fresh_code(db, self.generate, |code| {
                    db.find_or_create_user(profile.clone(), code)
                })
                .await?
            }
        };

        info!("Issued link code for user {}", user_id);
        Ok(user.link_code)
    }

    /// Severs the link and invalidates the current code by issuing a new one.
    pub async fn disconnect(&self, user_id: PrimaryKey) -> Result<LinkCode, LinkError> {
        let db = self.database.as_ref();

        db.user_by_id(user_id)
            .await
            .optional()?
            .ok_or(LinkError::UserNotFound(user_id))?;

        let user = with_fresh_code(db, self.generate, |code| {
            db.update_link(user_id, code, false)
        })
        .await?;

        info!("User {} disconnected their account", user_id);
        Ok(user.link_code)
    }

    pub async fn resolve_by_code(&self, code: LinkCode) -> Result<Option<UserData>, LinkError> {
        Ok(self.database.user_by_link_code(code).await.optional()?)
    }

    /// Marks the owner of the code as linked. Returns `None` for unknown codes.
    pub async fn mark_linked(&self, code: LinkCode) -> Result<Option<UserData>, LinkError> {
        let user = self
            .database
            .set_linked_by_code(code, true)
            .await
            .optional()?;

        if let Some(user) = &user {
            info!("User {} linked their account", user.id);
        }

        Ok(user)
    }
}

/// Remembers the last message that displayed a link code to each user,
/// so it can be updated once the code is used.
#[derive(Debug, Default)]
pub struct LinkMessages {
    messages: DashMap<PrimaryKey, MessageRef>,
}

impl LinkMessages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the message for the user, replacing any previous one.
    pub fn register(&self, user_id: PrimaryKey, message: MessageRef) {
        self.messages.insert(user_id, message);
    }

    pub fn get(&self, user_id: PrimaryKey) -> Option<MessageRef> {
        self.messages.get(&user_id).map(|m| *m)
    }

    /// Removes and returns the message for the user.
    pub fn take(&self, user_id: PrimaryKey) -> Option<MessageRef> {
        self.messages.remove(&user_id).map(|(_, m)| m)
    }

    pub fn clear(&self, user_id: PrimaryKey) {
        self.messages.remove(&user_id);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::SqliteDatabase;
    use std::collections::HashSet;

    async fn link_codes() -> LinkCodes<SqliteDatabase> {
        LinkCodes::new(Arc::new(SqliteDatabase::in_memory().await.unwrap()))
    }

    #[tokio::test]
    async fn test_link_lifecycle() {
        let codes = link_codes().await;

        assert!(codes.mark_linked(10_000_000).await.unwrap().is_none());

        let code = codes.issue_code(NewUser::with_id(42)).await.unwrap();
        let user = codes.resolve_by_code(code).await.unwrap().unwrap();
        assert_eq!(user.id, 42);
        assert!(!user.linked);

        let linked = codes.mark_linked(code).await.unwrap().unwrap();
        assert!(linked.linked);

        let new_code = codes.disconnect(42).await.unwrap();
        assert_ne!(code, new_code);

        let user = codes.resolve_by_code(new_code).await.unwrap().unwrap();
        assert!(!user.linked);

        // The old code is dead
        assert!(codes.resolve_by_code(code).await.unwrap().is_none());
        assert!(codes.mark_linked(code).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reissue_replaces_code() {
        let codes = link_codes().await;

        let first = codes.issue_code(NewUser::with_id(1)).await.unwrap();
        codes.mark_linked(first).await.unwrap();
        let second = codes.issue_code(NewUser::with_id(1)).await.unwrap();

        assert_ne!(first, second);
        let user = codes.resolve_by_code(second).await.unwrap().unwrap();
        assert!(!user.linked);
    }

    #[tokio::test]
    async fn test_concurrent_issuance_yields_distinct_codes() {
        let codes = Arc::new(link_codes().await);

        let tasks: Vec<_> = (0..20)
            .map(|id| {
                let codes = codes.clone();
                tokio::spawn(async move { codes.issue_code(NewUser::with_id(id)).await })
            })
            .collect();

        let mut issued = HashSet::new();
        for task in tasks {
            issued.insert(task.await.unwrap().unwrap());
        }

        assert_eq!(issued.len(), 20);
    }

    #[tokio::test]
    async fn test_disconnect_unknown_user() {
        let codes = link_codes().await;

        let result = codes.disconnect(404).await;
        assert!(matches!(result, Err(LinkError::UserNotFound(404))));
    }

    #[tokio::test]
    async fn test_exhausted_code_space_fails() {
        let database = Arc::new(SqliteDatabase::in_memory().await.unwrap());
        let codes = LinkCodes::with_generator(database, || 11_111_111);

        codes.issue_code(NewUser::with_id(1)).await.unwrap();
        let result = codes.issue_code(NewUser::with_id(2)).await;

        assert!(matches!(
            result,
            Err(LinkError::CodeSpaceExhausted {
                attempts: LINK_CODE_ATTEMPTS
            })
        ));
    }

    #[test]
    fn test_link_messages_replace_per_user() {
        let messages = LinkMessages::new();

        messages.register(1, MessageRef::new(1, 10));
        messages.register(1, MessageRef::new(1, 11));
        messages.register(2, MessageRef::new(2, 20));

        assert_eq!(messages.get(1), Some(MessageRef::new(1, 11)));
        assert_eq!(messages.take(1), Some(MessageRef::new(1, 11)));
        assert_eq!(messages.get(1), None);

        messages.clear(2);
        assert_eq!(messages.get(2), None);
    }
}
