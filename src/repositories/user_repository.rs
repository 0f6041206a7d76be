use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{decode, decode_all, encode};
use crate::{
    errors::ServiceError,
    models::User,
    store::{Collection, DocumentStore},
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, ServiceError>;

    /// Case-insensitive lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError>;

    /// Insert a new user; a conflict if the email is already registered.
    async fn insert(&self, user: &User) -> Result<(), ServiceError>;
}

pub struct DocumentUserRepository {
    store: Arc<dyn DocumentStore>,
    // Emails are unique across documents, which `modify` cannot guard alone.
    insert_lock: Mutex<()>,
}

impl DocumentUserRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            insert_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl UserRepository for DocumentUserRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, ServiceError> {
        self.store
            .get(Collection::Users, id)
            .await?
            .map(decode)
            .transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let documents = self.store.list(Collection::Users).await?;
        let users: Vec<User> = decode_all(documents, "user");
        Ok(users
            .into_iter()
            .find(|user| user.email.eq_ignore_ascii_case(email.trim())))
    }

    async fn insert(&self, user: &User) -> Result<(), ServiceError> {
        let _guard = self.insert_lock.lock().await;
        if self.find_by_email(&user.email).await?.is_some() {
            return Err(ServiceError::Conflict("User already exists".to_string()));
        }
        self.store
            .put(Collection::Users, &user.id, encode(user)?)
            .await?;
        Ok(())
    }
}
