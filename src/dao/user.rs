//! User accounts: creation with uniqueness guarantees, lookup,
//! authentication, profile updates.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::auth::password;
use crate::entities::{User, SK_USER};
use crate::error::CoreError;
use crate::store::{AttrValue, Condition, KeyValueStore, Query, StoreError, Table, EMAIL_INDEX};

pub struct UserDao {
    store: Arc<dyn KeyValueStore>,
}

impl UserDao {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        UserDao { store }
    }

    /// Create a new user. Username uniqueness is enforced by a conditional
    /// put on the partition key; email uniqueness by a read on the email
    /// index first (a racing duplicate surfaces as `EntityAlreadyExists`
    /// on the later write).
    pub async fn create(&self, user: User) -> Result<User, CoreError> {
        if self.find_by_email(&user.email).await?.is_some() {
            return Err(CoreError::already_exists("user", &user.email));
        }

        match self
            .store
            .put(Table::Users, user.to_item(), Some(Condition::NotExists))
            .await
        {
            Ok(()) => {
                info!(username = %user.username, "user created");
                Ok(user)
            }
            Err(StoreError::ConditionFailed) => {
                Err(CoreError::already_exists("user", &user.username))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get_by_username(&self, username: &str) -> Result<User, CoreError> {
        let item = self
            .store
            .get(Table::Users, username, SK_USER)
            .await?
            .ok_or_else(|| CoreError::not_found("user", username))?;
        Ok(User::from_item(&item)?)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, CoreError> {
        let items = self
            .store
            .query(
                Table::Users,
                Query::partition(email).on_index(EMAIL_INDEX).limit(1),
            )
            .await?;
        match items.first() {
            Some(item) => Ok(Some(User::from_item(item)?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_email(&self, email: &str) -> Result<User, CoreError> {
        self.find_by_email(email)
            .await?
            .ok_or_else(|| CoreError::not_found("user", email))
    }

    /// Verify credentials. A missing user and a wrong password are
    /// indistinguishable to the caller.
    pub async fn authenticate(&self, username: &str, pass: &str) -> Result<User, CoreError> {
        let user = match self.get_by_username(username).await {
            Ok(user) => user,
            Err(CoreError::EntityNotFound { .. }) => return Err(CoreError::InvalidCredentials),
            Err(err) => return Err(err),
        };
        if !password::verify(pass, &user.password_hash)? {
            return Err(CoreError::InvalidCredentials);
        }
        Ok(user)
    }

    /// Persist profile changes. Identity fields (username, created_at) are
    /// taken from the stored row; `updated_at` is touched here.
    pub async fn update(&self, user: User) -> Result<User, CoreError> {
        let mut user = user;
        user.updated_at = Utc::now();

        match self
            .store
            .put(
                Table::Users,
                user.to_item(),
                Some(Condition::Equals(
                    "username",
                    AttrValue::S(user.username.clone()),
                )),
            )
            .await
        {
            Ok(()) => Ok(user),
            Err(StoreError::ConditionFailed) => {
                Err(CoreError::not_found("user", &user.username))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn dao() -> UserDao {
        UserDao::new(Arc::new(MemoryStore::new()))
    }

    fn user(username: &str, email: &str) -> User {
        let now = Utc::now();
        User {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password::hash("CorrectHorse9!x").unwrap(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            phone: None,
            date_of_birth: None,
            marketing_emails_consent: false,
            role: crate::entities::UserRole::Customer,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn duplicate_username_is_conflict() {
        let dao = dao();
        dao.create(user("alice", "a@example.com")).await.unwrap();
        let err = dao.create(user("alice", "other@example.com")).await.unwrap_err();
        assert!(matches!(err, CoreError::EntityAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn duplicate_email_is_conflict_and_first_user_unchanged() {
        let dao = dao();
        dao.create(user("alice", "a@example.com")).await.unwrap();
        let err = dao.create(user("bob", "a@example.com")).await.unwrap_err();
        assert!(matches!(err, CoreError::EntityAlreadyExists { .. }));

        let original = dao.get_by_username("alice").await.unwrap();
        assert_eq!(original.email, "a@example.com");
        assert!(dao.get_by_username("bob").await.is_err());
    }

    #[tokio::test]
    async fn authenticate_rejects_wrong_password_and_unknown_user() {
        let dao = dao();
        dao.create(user("alice", "a@example.com")).await.unwrap();

        assert!(dao.authenticate("alice", "CorrectHorse9!x").await.is_ok());
        assert!(matches!(
            dao.authenticate("alice", "WrongHorse9!xx").await,
            Err(CoreError::InvalidCredentials)
        ));
        assert!(matches!(
            dao.authenticate("nobody", "CorrectHorse9!x").await,
            Err(CoreError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn lookup_by_email_via_index() {
        let dao = dao();
        dao.create(user("alice", "a@example.com")).await.unwrap();
        let found = dao.get_by_email("a@example.com").await.unwrap();
        assert_eq!(found.username, "alice");
    }
}
