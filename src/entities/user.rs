//! User account record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::store::{Item, StoreError};

pub const SK_USER: &str = "USER";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Customer,
    Admin,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Customer => "customer",
            UserRole::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "customer" => Some(UserRole::Customer),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

/// An account. The username is immutable and doubles as the partition key
/// of everything the user owns. `password_hash` never leaves the process
/// boundary (the gateway serializes profile DTOs, not this struct).
#[derive(Debug, Clone)]
pub struct User {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub marketing_emails_consent: bool,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn key(username: &str) -> (String, &'static str) {
        (username.to_string(), SK_USER)
    }

    pub fn to_item(&self) -> Item {
        let mut item = Item::with_key(&self.username, SK_USER);
        item.set_s("entity_type", "user")
            .set_s("username", &self.username)
            .set_s("email", &self.email)
            .set_s("password_hash", &self.password_hash)
            .set_s("first_name", &self.first_name)
            .set_s("last_name", &self.last_name)
            .set_opt_s("phone", self.phone.clone())
            .set_opt_s(
                "date_of_birth",
                self.date_of_birth.map(|d| d.format("%Y-%m-%d").to_string()),
            )
            .set_bool("marketing_emails_consent", self.marketing_emails_consent)
            .set_s("role", self.role.as_str())
            .set_ts("created_at", self.created_at)
            .set_ts("updated_at", self.updated_at);
        item
    }

    pub fn from_item(item: &Item) -> Result<Self, StoreError> {
        let role_raw = item.get_s("role")?;
        let role = UserRole::parse(role_raw)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown role '{role_raw}'")))?;
        let date_of_birth = match item.opt_s("date_of_birth") {
            Some(raw) => Some(
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|_| StoreError::Corrupt(format!("bad date_of_birth '{raw}'")))?,
            ),
            None => None,
        };
        Ok(User {
            username: item.get_s("username")?.to_string(),
            email: item.get_s("email")?.to_string(),
            password_hash: item.get_s("password_hash")?.to_string(),
            first_name: item.get_s("first_name")?.to_string(),
            last_name: item.get_s("last_name")?.to_string(),
            phone: item.opt_s("phone").map(str::to_string),
            date_of_birth,
            marketing_emails_consent: item.get_bool("marketing_emails_consent").unwrap_or(false),
            role,
            created_at: item.get_ts("created_at")?,
            updated_at: item.get_ts("updated_at")?,
        })
    }
}
