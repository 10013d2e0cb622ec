use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

fn to_utc(dt: Option<NaiveDateTime>) -> DateTime<Utc> {
    dt.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationStatus {
    #[serde(rename = "Not Started")]
    NotStarted,
    Researching,
    #[serde(rename = "Preparing Documents")]
    PreparingDocuments,
    Applied,
    Interview,
    #[serde(rename = "Offer Received")]
    OfferReceived,
    Accepted,
    Rejected,
    Enrolled,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 9] = [
        ApplicationStatus::NotStarted,
        ApplicationStatus::Researching,
        ApplicationStatus::PreparingDocuments,
        ApplicationStatus::Applied,
        ApplicationStatus::Interview,
        ApplicationStatus::OfferReceived,
        ApplicationStatus::Accepted,
        ApplicationStatus::Rejected,
        ApplicationStatus::Enrolled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::NotStarted => "Not Started",
            ApplicationStatus::Researching => "Researching",
            ApplicationStatus::PreparingDocuments => "Preparing Documents",
            ApplicationStatus::Applied => "Applied",
            ApplicationStatus::Interview => "Interview",
            ApplicationStatus::OfferReceived => "Offer Received",
            ApplicationStatus::Accepted => "Accepted",
            ApplicationStatus::Rejected => "Rejected",
            ApplicationStatus::Enrolled => "Enrolled",
        }
    }
}

impl FromStr for ApplicationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ApplicationStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| AppError::Validation(format!("Invalid application status: {}", s)))
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Course,
    University,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Course => "course",
            TargetType::University => "university",
        }
    }
}

impl FromStr for TargetType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "course" => Ok(TargetType::Course),
            "university" => Ok(TargetType::University),
            _ => Err(AppError::Validation(format!("Unknown favorite type: {}", s))),
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a favorite points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FavoriteTarget {
    pub target_type: TargetType,
    pub id: i64,
}

impl FavoriteTarget {
    pub fn course(id: i64) -> Self {
        Self {
            target_type: TargetType::Course,
            id,
        }
    }

    pub fn university(id: i64) -> Self {
        Self {
            target_type: TargetType::University,
            id,
        }
    }
}

/// A bookmark. `name` and `city` are copied from the course or university
/// when the favorite is created and are not refreshed afterwards.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub id: i64,
    pub user_id: i64,
    pub target_type: TargetType,
    pub target_id: i64,
    pub name: String,
    pub city: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbFavorite {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub target_type: Option<String>,
    pub target_id: Option<i64>,
    pub name: Option<String>,
    pub city: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl TryFrom<DbFavorite> for Favorite {
    type Error = AppError;

    fn try_from(db: DbFavorite) -> Result<Self, Self::Error> {
        Ok(Self {
            id: db.id.unwrap_or_default(),
            user_id: db.user_id.unwrap_or_default(),
            target_type: db.target_type.unwrap_or_default().parse()?,
            target_id: db.target_id.unwrap_or_default(),
            name: db.name.unwrap_or_default(),
            city: db.city.unwrap_or_default(),
            created_at: to_utc(db.created_at),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TrackedItem {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub course_name: String,
    pub course_link: String,
    pub status: ApplicationStatus,
    pub notes: String,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbTrackedItem {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub course_id: Option<i64>,
    pub course_name: Option<String>,
    pub course_link: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
    pub archived: Option<bool>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl TryFrom<DbTrackedItem> for TrackedItem {
    type Error = AppError;

    fn try_from(db: DbTrackedItem) -> Result<Self, Self::Error> {
        let status = match db.status {
            Some(status) => status.parse()?,
            None => ApplicationStatus::NotStarted,
        };

        Ok(Self {
            id: db.id.unwrap_or_default(),
            user_id: db.user_id.unwrap_or_default(),
            course_id: db.course_id.unwrap_or_default(),
            course_name: db.course_name.unwrap_or_default(),
            course_link: db.course_link.unwrap_or_default(),
            status,
            notes: db.notes.unwrap_or_default(),
            archived: db.archived.unwrap_or_default(),
            created_at: to_utc(db.created_at),
            updated_at: to_utc(db.updated_at),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrackingFilter {
    pub archived: Option<bool>,
    pub status: Option<ApplicationStatus>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Community {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub community_type: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CommunityPost {
    pub id: i64,
    pub community_id: Option<i64>,
    pub author_name: String,
    pub content: String,
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbCommunityPost {
    pub id: Option<i64>,
    pub community_id: Option<i64>,
    pub author_name: Option<String>,
    pub content: Option<String>,
    pub country: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbCommunityPost> for CommunityPost {
    fn from(db: DbCommunityPost) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            community_id: db.community_id,
            author_name: db.author_name.unwrap_or_default(),
            content: db.content.unwrap_or_default(),
            country: db.country,
            created_at: to_utc(db.created_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LeaderboardEntry {
    pub id: i64,
    pub name: String,
    pub xp: i64,
}
