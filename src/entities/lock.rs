//! The per-user lock row.

use chrono::{DateTime, Utc};

use crate::store::{Item, StoreError};

/// Lock rows share the users table under `USER#<username>` / `LOCK`.
pub const LOCK_PK_PREFIX: &str = "USER#";
pub const SK_LOCK: &str = "LOCK";

/// A TTL'd advisory mutex row. At most one non-expired row exists per
/// user; `expires_at` is persisted as epoch milliseconds so the acquire
/// condition can compare it numerically.
#[derive(Debug, Clone)]
pub struct UserLock {
    pub username: String,
    pub lock_id: String,
    pub operation: String,
    pub expires_at: DateTime<Utc>,
    pub request_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserLock {
    pub fn partition_key(username: &str) -> String {
        format!("{LOCK_PK_PREFIX}{username}")
    }

    pub fn to_item(&self) -> Item {
        let mut item = Item::with_key(Self::partition_key(&self.username), SK_LOCK);
        item.set_s("entity_type", "user_lock")
            .set_s("username", &self.username)
            .set_s("lock_id", &self.lock_id)
            .set_s("operation", &self.operation)
            .set_epoch_ms("expires_at", self.expires_at)
            .set_s("request_id", &self.request_id)
            .set_ts("created_at", self.created_at)
            .set_ts("updated_at", self.updated_at);
        item
    }

    pub fn from_item(item: &Item) -> Result<Self, StoreError> {
        Ok(UserLock {
            username: item.get_s("username")?.to_string(),
            lock_id: item.get_s("lock_id")?.to_string(),
            operation: item.get_s("operation")?.to_string(),
            expires_at: item.get_epoch_ms("expires_at")?,
            request_id: item.get_s("request_id")?.to_string(),
            created_at: item.get_ts("created_at")?,
            updated_at: item.get_ts("updated_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_round_trip_preserves_expiry_to_the_millisecond() {
        let now = Utc::now();
        let lock = UserLock {
            username: "bob".to_string(),
            lock_id: "token-1".to_string(),
            operation: "withdraw".to_string(),
            expires_at: now + chrono::Duration::seconds(2),
            request_id: "req-1".to_string(),
            created_at: now,
            updated_at: now,
        };
        let item = lock.to_item();
        assert_eq!(item.pk().unwrap(), "USER#bob");
        assert_eq!(item.sk().unwrap(), SK_LOCK);

        let back = UserLock::from_item(&item).unwrap();
        assert_eq!(
            back.expires_at.timestamp_millis(),
            lock.expires_at.timestamp_millis()
        );
    }
}
