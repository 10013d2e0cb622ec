use crate::{
    auth::{DbUser, ExternalIdentity, Resolution, User},
    error::AppError,
    ledger::Streak,
};
use serde_json::{Map, Value};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};

use crate::models::{
    ApplicationStatus, Community, CommunityPost, DbCommunityPost, DbFavorite, DbTrackedItem,
    Favorite, FavoriteTarget, LeaderboardEntry, TargetType, TrackedItem, TrackingFilter,
};

const USER_COLUMNS: &str = "id, external_id, email, name, xp, current_streak, longest_streak, \
     last_activity_date, onboarding_complete, metadata, created_at";

#[instrument]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(user) => User::try_from(user),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument]
pub async fn find_user_by_external_id(
    pool: &Pool<Sqlite>,
    external_id: &str,
) -> Result<Option<User>, AppError> {
    let row = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE external_id = ?"
    ))
    .bind(external_id)
    .fetch_optional(pool)
    .await?;

    row.map(User::try_from).transpose()
}

/// Looks up the local user for an external handle, creating it on first
/// sight. Concurrent first resolutions race on the `external_id` unique
/// index: the loser's insert is a no-op and it reads the winner's row.
#[instrument(skip(pool, identity), fields(handle = %identity.handle))]
pub async fn resolve_user(
    pool: &Pool<Sqlite>,
    identity: &ExternalIdentity,
) -> Result<Resolution, AppError> {
    if let Some(user) = find_user_by_external_id(pool, &identity.handle).await? {
        return Ok(Resolution::Found(user));
    }

    info!("Creating user for unseen identity");
    let name = identity.name.clone().unwrap_or_default();
    let res = sqlx::query(
        "INSERT INTO users (external_id, email, name)
         VALUES (?, ?, ?)
         ON CONFLICT DO NOTHING",
    )
    .bind(&identity.handle)
    .bind(identity.normalized_email())
    .bind(name)
    .execute(pool)
    .await?;

    if res.rows_affected() == 1 {
        let user = get_user(pool, res.last_insert_rowid()).await?;
        return Ok(Resolution::Created(user));
    }

    match find_user_by_external_id(pool, &identity.handle).await? {
        Some(user) => Ok(Resolution::Found(user)),
        None => {
            warn!("Identity collided with an existing email");
            Err(AppError::Duplicate(format!(
                "A user with email {} already exists",
                identity.normalized_email().unwrap_or_default()
            )))
        }
    }
}

/// Adds XP and stores the advanced streak in one statement. Returns the new
/// XP total.
#[instrument(skip(pool))]
pub async fn apply_activity(
    pool: &Pool<Sqlite>,
    user_id: i64,
    xp: i64,
    streak: Streak,
) -> Result<i64, AppError> {
    let total = sqlx::query_scalar::<_, i64>(
        "UPDATE users
         SET xp = xp + ?, current_streak = ?, longest_streak = ?, last_activity_date = ?
         WHERE id = ?
         RETURNING xp",
    )
    .bind(xp)
    .bind(streak.current)
    .bind(streak.longest)
    .bind(streak.last_activity)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    total.ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))
}

#[instrument(skip(pool))]
pub async fn leaderboard(pool: &Pool<Sqlite>, limit: i64) -> Result<Vec<LeaderboardEntry>, AppError> {
    let limit = limit.clamp(1, 100);
    let rows = sqlx::query_as::<_, LeaderboardEntry>(
        "SELECT id, name, xp FROM users
         ORDER BY xp DESC, id ASC
         LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Merges `fields` into the user's metadata, later values winning per key,
/// and marks onboarding complete. The merge is one `json_patch` statement,
/// so concurrent submissions for a user cannot lose each other's keys.
#[instrument(skip(pool, fields))]
pub async fn complete_onboarding(
    pool: &Pool<Sqlite>,
    user_id: i64,
    fields: Map<String, Value>,
) -> Result<User, AppError> {
    info!(field_count = fields.len(), "Completing onboarding");
    let patch = serde_json::to_string(&fields)?;

    let row = sqlx::query_as::<_, DbUser>(&format!(
        "UPDATE users
         SET metadata = json_patch(COALESCE(NULLIF(metadata, ''), '{{}}'), ?),
             onboarding_complete = TRUE
         WHERE id = ?
         RETURNING {USER_COLUMNS}"
    ))
    .bind(patch)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(user) => User::try_from(user),
        None => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            user_id
        ))),
    }
}

#[instrument(skip(pool))]
pub async fn add_favorite(
    pool: &Pool<Sqlite>,
    user_id: i64,
    target: FavoriteTarget,
) -> Result<Favorite, AppError> {
    info!("Adding favorite");
    let insert = match target.target_type {
        TargetType::Course => {
            "INSERT INTO favorites (user_id, target_type, target_id, name, city)
             SELECT ?, 'course', c.id, c.name, u.city
             FROM courses c JOIN universities u ON u.id = c.university_id
             WHERE c.id = ?
             RETURNING id, user_id, target_type, target_id, name, city, created_at"
        }
        TargetType::University => {
            "INSERT INTO favorites (user_id, target_type, target_id, name, city)
             SELECT ?, 'university', u.id, u.name, u.city
             FROM universities u
             WHERE u.id = ?
             RETURNING id, user_id, target_type, target_id, name, city, created_at"
        }
    };

    let row = sqlx::query_as::<_, DbFavorite>(insert)
        .bind(user_id)
        .bind(target.id)
        .fetch_optional(pool)
        .await
        .map_err(|err| {
            AppError::from_insert(
                err,
                format!("{} {} is already a favorite", target.target_type, target.id),
            )
        })?;

    match row {
        Some(favorite) => Favorite::try_from(favorite),
        None => Err(AppError::NotFound(format!(
            "{} with id {} not found",
            target.target_type, target.id
        ))),
    }
}

/// Removes a favorite if present. Returns whether anything was deleted.
#[instrument(skip(pool))]
pub async fn remove_favorite(
    pool: &Pool<Sqlite>,
    user_id: i64,
    target: FavoriteTarget,
) -> Result<bool, AppError> {
    info!("Removing favorite");
    let res = sqlx::query(
        "DELETE FROM favorites WHERE user_id = ? AND target_type = ? AND target_id = ?",
    )
    .bind(user_id)
    .bind(target.target_type.as_str())
    .bind(target.id)
    .execute(pool)
    .await?;

    Ok(res.rows_affected() > 0)
}

#[instrument(skip(pool))]
pub async fn list_favorites(
    pool: &Pool<Sqlite>,
    user_id: i64,
    target_type: Option<TargetType>,
) -> Result<Vec<Favorite>, AppError> {
    let rows = sqlx::query_as::<_, DbFavorite>(
        "SELECT id, user_id, target_type, target_id, name, city, created_at
         FROM favorites
         WHERE user_id = ?1 AND (?2 IS NULL OR target_type = ?2)
         ORDER BY created_at ASC, id ASC",
    )
    .bind(user_id)
    .bind(target_type.map(|t| t.as_str()))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Favorite::try_from).collect()
}

/// Creates or updates the user's tracked entry for a course. `notes` and
/// `archived` keep their stored values when `None`. The course name and
/// link are copied at creation time only.
#[instrument(skip(pool, notes))]
pub async fn upsert_tracked_item(
    pool: &Pool<Sqlite>,
    user_id: i64,
    course_id: i64,
    status: ApplicationStatus,
    notes: Option<&str>,
    archived: Option<bool>,
) -> Result<TrackedItem, AppError> {
    info!("Upserting tracked item");
    let row = sqlx::query_as::<_, DbTrackedItem>(
        "INSERT INTO tracked_items (user_id, course_id, course_name, course_link, status, notes, archived)
         SELECT ?1, c.id, c.name, c.link, ?3, COALESCE(?4, ''), COALESCE(?5, FALSE)
         FROM courses c WHERE c.id = ?2
         ON CONFLICT (user_id, course_id) DO UPDATE SET
             status = excluded.status,
             notes = COALESCE(?4, tracked_items.notes),
             archived = COALESCE(?5, tracked_items.archived),
             updated_at = CURRENT_TIMESTAMP
         RETURNING id, user_id, course_id, course_name, course_link, status, notes, archived,
                   created_at, updated_at",
    )
    .bind(user_id)
    .bind(course_id)
    .bind(status.as_str())
    .bind(notes)
    .bind(archived)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(item) => TrackedItem::try_from(item),
        None => Err(AppError::NotFound(format!(
            "course with id {} not found",
            course_id
        ))),
    }
}

#[instrument(skip(pool))]
pub async fn list_tracked_items(
    pool: &Pool<Sqlite>,
    user_id: i64,
    filter: TrackingFilter,
) -> Result<Vec<TrackedItem>, AppError> {
    let rows = sqlx::query_as::<_, DbTrackedItem>(
        "SELECT id, user_id, course_id, course_name, course_link, status, notes, archived,
                created_at, updated_at
         FROM tracked_items
         WHERE user_id = ?1
           AND (?2 IS NULL OR archived = ?2)
           AND (?3 IS NULL OR status = ?3)
         ORDER BY created_at ASC, id ASC",
    )
    .bind(user_id)
    .bind(filter.archived)
    .bind(filter.status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(TrackedItem::try_from).collect()
}

#[instrument(skip(pool))]
pub async fn list_distinct_countries(pool: &Pool<Sqlite>) -> Result<Vec<String>, AppError> {
    let countries = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT TRIM(country, ' ' || char(9, 10, 11, 12, 13)) AS country
         FROM community_posts
         WHERE country IS NOT NULL AND TRIM(country, ' ' || char(9, 10, 11, 12, 13)) <> ''
         ORDER BY country ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(countries)
}

#[instrument(skip(pool))]
pub async fn search_communities(
    pool: &Pool<Sqlite>,
    community_type: Option<&str>,
    search: Option<&str>,
) -> Result<Vec<Community>, AppError> {
    let community_type = community_type.map(str::trim).filter(|t| !t.is_empty());
    let search = search.map(str::trim).filter(|s| !s.is_empty());

    let rows = sqlx::query_as::<_, Community>(
        "SELECT id, name, type FROM communities
         WHERE ?1 IS NULL OR type = ?1
         ORDER BY name ASC",
    )
    .bind(community_type)
    .fetch_all(pool)
    .await?;

    // SQLite's lower() only folds ASCII, so the name match happens here
    let Some(needle) = search.map(str::to_lowercase) else {
        return Ok(rows);
    };

    Ok(rows
        .into_iter()
        .filter(|community| community.name.to_lowercase().contains(&needle))
        .collect())
}

#[instrument(skip(pool))]
pub async fn list_posts(
    pool: &Pool<Sqlite>,
    country: Option<&str>,
) -> Result<Vec<CommunityPost>, AppError> {
    let country = country.map(str::trim).filter(|c| !c.is_empty());

    let rows = sqlx::query_as::<_, DbCommunityPost>(
        "SELECT id, community_id, author_name, content, country, created_at
         FROM community_posts
         WHERE ?1 IS NULL OR TRIM(country, ' ' || char(9, 10, 11, 12, 13)) = ?1
         ORDER BY created_at DESC, id DESC",
    )
    .bind(country)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(CommunityPost::from).collect())
}
