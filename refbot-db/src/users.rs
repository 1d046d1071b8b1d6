//! User entity and its input schemas

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::dao::Dao;
use crate::error::Result;
use crate::models::{FieldMap, IntoFields};
use crate::schema::{Column, ColumnKind, Entity};

/// A messaging-platform user registered through the start interaction.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// External platform identity (unique)
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// External identity of the referring user, not enforced as a key
    pub referral_id: Option<i64>,
}

impl Entity for User {
    const NAME: &'static str = "User";
    const COLUMNS: &'static [Column] = &[
        Column::required("telegram_id", ColumnKind::BigInt),
        Column::optional("username", ColumnKind::Text),
        Column::optional("first_name", ColumnKind::Text),
        Column::optional("last_name", ColumnKind::Text),
        Column::optional("referral_id", ColumnKind::BigInt),
    ];
    const UNIQUE_KEYS: &'static [&'static [&'static str]] = &[&["telegram_id"]];

    fn id(&self) -> i64 {
        self.id
    }
}

/// Data access for users.
pub type UserDao = Dao<User>;

impl Dao<User> {
    pub async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>> {
        self.find_one_or_none(UserFilter {
            telegram_id: Some(telegram_id),
            ..Default::default()
        })
        .await
    }

    /// Users credited to `referrer`, oldest first.
    pub async fn referrals_of(&self, referrer: i64) -> Result<Vec<User>> {
        self.find_all(UserFilter {
            referral_id: Some(referrer),
            ..Default::default()
        })
        .await
    }
}

/// Input schema for inserting a user. Unset optional fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub referral_id: Option<i64>,
}

impl NewUser {
    pub fn new(telegram_id: i64) -> Self {
        Self {
            telegram_id,
            ..Default::default()
        }
    }
}

impl IntoFields for NewUser {
    fn into_fields(self) -> FieldMap {
        let mut fields = FieldMap::new().with("telegram_id", self.telegram_id);
        fields.insert_opt("username", self.username);
        fields.insert_opt("first_name", self.first_name);
        fields.insert_opt("last_name", self.last_name);
        fields.insert_opt("referral_id", self.referral_id);
        fields
    }
}

/// Equality filter over user columns; only set fields take part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub id: Option<i64>,
    pub telegram_id: Option<i64>,
    pub username: Option<String>,
    pub referral_id: Option<i64>,
}

impl IntoFields for UserFilter {
    fn into_fields(self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert_opt("id", self.id);
        fields.insert_opt("telegram_id", self.telegram_id);
        fields.insert_opt("username", self.username);
        fields.insert_opt("referral_id", self.referral_id);
        fields
    }
}

/// Partial update of a user's profile fields; only set fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub referral_id: Option<i64>,
}

impl IntoFields for UserUpdate {
    fn into_fields(self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert_opt("username", self.username);
        fields.insert_opt("first_name", self.first_name);
        fields.insert_opt("last_name", self.last_name);
        fields.insert_opt("referral_id", self.referral_id);
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    #[test]
    fn new_user_omits_unset_fields() {
        let fields = NewUser {
            telegram_id: 42,
            first_name: Some("Ada".into()),
            ..Default::default()
        }
        .into_fields();

        let keys: Vec<_> = fields.keys().collect();
        assert_eq!(keys, ["telegram_id", "first_name"]);
        assert_eq!(fields.get("telegram_id"), Some(&Value::BigInt(42)));
    }

    #[test]
    fn empty_filter_is_empty() {
        assert!(UserFilter::default().into_fields().is_empty());
    }

    #[test]
    fn update_sets_only_given_fields() {
        let fields = UserUpdate {
            referral_id: Some(7),
            ..Default::default()
        }
        .into_fields();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("referral_id"), Some(&Value::BigInt(7)));
    }

    #[test]
    fn user_serializes_as_a_flat_record() {
        let user = User {
            id: 1,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            telegram_id: 42,
            username: Some("ada".into()),
            first_name: None,
            last_name: None,
            referral_id: Some(7),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["telegram_id"], 42);
        assert_eq!(json["referral_id"], 7);
        assert!(json["first_name"].is_null());
    }
}
