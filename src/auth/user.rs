use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub external_id: String,
    pub email: Option<String>,
    pub name: String,
    pub xp: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_activity_date: Option<NaiveDate>,
    pub onboarding_complete: bool,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: Option<i64>,
    pub external_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub xp: Option<i64>,
    pub current_streak: Option<i64>,
    pub longest_streak: Option<i64>,
    pub last_activity_date: Option<NaiveDate>,
    pub onboarding_complete: Option<bool>,
    pub metadata: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(user: DbUser) -> Result<Self, Self::Error> {
        let metadata = match user.metadata.as_deref() {
            None | Some("") => Map::new(),
            Some(raw) => serde_json::from_str(raw)?,
        };

        Ok(Self {
            id: user.id.unwrap_or_default(),
            external_id: user.external_id.unwrap_or_default(),
            email: user.email,
            name: user.name.unwrap_or_default(),
            xp: user.xp.unwrap_or_default(),
            current_streak: user.current_streak.unwrap_or_default(),
            longest_streak: user.longest_streak.unwrap_or_default(),
            last_activity_date: user.last_activity_date,
            onboarding_complete: user.onboarding_complete.unwrap_or_default(),
            metadata,
            created_at: user
                .created_at
                .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
                .unwrap_or_else(Utc::now),
        })
    }
}

/// Outcome of resolving an external handle to a local user.
#[derive(Debug, Clone)]
pub enum Resolution {
    Found(User),
    Created(User),
}

impl Resolution {
    pub fn user(&self) -> &User {
        match self {
            Resolution::Found(user) | Resolution::Created(user) => user,
        }
    }

    pub fn into_user(self) -> User {
        match self {
            Resolution::Found(user) | Resolution::Created(user) => user,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Resolution::Created(_))
    }
}
