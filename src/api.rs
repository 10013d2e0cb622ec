use chrono::Utc;
use rocket::FromForm;
use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{CurrentUser, ExternalIdentity, User};
use crate::db::{
    add_favorite, complete_onboarding, leaderboard, list_distinct_countries, list_favorites,
    list_posts, list_tracked_items, remove_favorite, resolve_user, search_communities,
    upsert_tracked_item,
};
use crate::error::AppError;
use crate::ledger::{ActionAward, ActionRewards, award_action};
use crate::models::{
    ApplicationStatus, Community, CommunityPost, Favorite, FavoriteTarget, LeaderboardEntry,
    TargetType, TrackedItem, TrackingFilter,
};
use crate::validation::{ApiResult, AppErrorExt, JsonValidateExt, ValidationResponse};

#[derive(Serialize, Deserialize, Debug)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> DataResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SuccessResponse {
    pub success: bool,
}

#[get("/health")]
pub fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[get("/user/me")]
pub async fn api_me(user: CurrentUser) -> Json<User> {
    Json(user.0)
}

#[derive(Deserialize, Validate)]
pub struct ActionRequest {
    #[validate(length(min = 1, max = 64, message = "Action name is required"))]
    action: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub success: bool,
    pub action: String,
    pub xp_gained: i64,
    pub new_xp_total: i64,
    pub current_streak: i64,
}

impl From<ActionAward> for ActionResponse {
    fn from(award: ActionAward) -> Self {
        Self {
            success: true,
            action: award.action,
            xp_gained: award.xp_gained,
            new_xp_total: award.new_xp_total,
            current_streak: award.current_streak,
        }
    }
}

#[post("/user/actions", data = "<request>")]
pub async fn api_award_action(
    identity: ExternalIdentity,
    request: Json<ActionRequest>,
    db: &State<Pool<Sqlite>>,
    rewards: &State<ActionRewards>,
) -> ApiResult<ActionResponse> {
    let validated = request.validate_custom()?;
    let today = Utc::now().date_naive();

    let award = award_action(db, rewards, &identity, validated.action.trim(), today)
        .await
        .validate_custom()?;

    Ok(Json(ActionResponse::from(award)))
}

#[get("/leaderboard?<limit>")]
pub async fn api_leaderboard(
    limit: Option<i64>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<LeaderboardEntry>> {
    let entries = leaderboard(db, limit.unwrap_or(10))
        .await
        .validate_custom()?;

    Ok(Json(entries))
}

#[derive(Serialize, Deserialize, Validate, Default, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingRequest {
    #[validate(length(min = 1, max = 120))]
    pub full_name: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(length(max = 64))]
    pub nationality: Option<String>,
    #[validate(length(max = 120))]
    pub current_education: Option<String>,
    #[validate(length(max = 32))]
    pub study_level: Option<String>,
    #[validate(length(max = 10, message = "Pick at most 10 countries"))]
    pub target_countries: Option<Vec<String>>,
    #[validate(length(max = 10, message = "Pick at most 10 fields"))]
    pub preferred_fields: Option<Vec<String>>,
    #[validate(length(max = 32))]
    pub intended_intake: Option<String>,
    #[validate(length(max = 32))]
    pub budget_range: Option<String>,
    #[validate(length(max = 64))]
    pub english_test: Option<String>,
}

impl OnboardingRequest {
    /// The fields that were actually supplied, keyed by their wire names.
    pub fn into_fields(self) -> Result<Map<String, Value>, serde_json::Error> {
        let fields = match serde_json::to_value(self)? {
            Value::Object(map) => map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
            _ => Map::new(),
        };
        Ok(fields)
    }
}

#[post("/onboarding", data = "<profile>")]
pub async fn api_onboarding(
    identity: ExternalIdentity,
    profile: Json<OnboardingRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<SuccessResponse> {
    let validated = profile.validate_custom()?;
    let fields = validated
        .into_fields()
        .map_err(AppError::from)
        .validate_custom()?;

    let user = resolve_user(db, &identity)
        .await
        .validate_custom()?
        .into_user();

    complete_onboarding(db, user.id, fields)
        .await
        .validate_custom()?;

    Ok(Json(SuccessResponse { success: true }))
}

#[derive(FromForm, Debug)]
pub struct CommunityQuery {
    #[field(name = "type")]
    pub community_type: Option<String>,
    pub search: Option<String>,
}

#[get("/communities?<query..>")]
pub async fn api_search_communities(
    query: CommunityQuery,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Community>> {
    let communities = search_communities(
        db,
        query.community_type.as_deref(),
        query.search.as_deref(),
    )
    .await
    .validate_custom()?;

    Ok(Json(communities))
}

#[get("/feed/countries")]
pub async fn api_feed_countries(db: &State<Pool<Sqlite>>) -> ApiResult<DataResponse<Vec<String>>> {
    let countries = list_distinct_countries(db).await.validate_custom()?;

    Ok(DataResponse::ok(countries))
}

#[get("/feed/posts?<country>")]
pub async fn api_feed_posts(
    country: Option<String>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<DataResponse<Vec<CommunityPost>>> {
    let posts = list_posts(db, country.as_deref())
        .await
        .validate_custom()?;

    Ok(DataResponse::ok(posts))
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRequest {
    #[validate(range(min = 1, message = "Target id must be positive"))]
    target_id: i64,
    target_type: TargetType,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RemovedResponse {
    pub success: bool,
    pub removed: bool,
}

fn parse_target_type(raw: Option<&str>) -> Result<Option<TargetType>, AppError> {
    raw.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::parse)
        .transpose()
}

#[derive(FromForm, Debug)]
pub struct FavoritesQuery {
    #[field(name = "type")]
    pub target_type: Option<String>,
}

#[get("/favorites?<query..>")]
pub async fn api_list_favorites(
    query: FavoritesQuery,
    user: CurrentUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Favorite>> {
    let target_type = parse_target_type(query.target_type.as_deref()).validate_custom()?;

    let favorites = list_favorites(db, user.0.id, target_type)
        .await
        .validate_custom()?;

    Ok(Json(favorites))
}

#[post("/favorites", data = "<request>")]
pub async fn api_add_favorite(
    request: Json<FavoriteRequest>,
    user: CurrentUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<Favorite>>, Custom<Json<ValidationResponse>>> {
    let validated = request.validate_custom()?;
    let target = FavoriteTarget {
        target_type: validated.target_type,
        id: validated.target_id,
    };

    let favorite = add_favorite(db, user.0.id, target)
        .await
        .validate_custom()?;

    Ok(Custom(Status::Created, Json(favorite)))
}

#[delete("/favorites/<target_type>/<target_id>")]
pub async fn api_remove_favorite(
    target_type: &str,
    target_id: i64,
    user: CurrentUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<RemovedResponse> {
    let target_type = target_type.parse::<TargetType>().validate_custom()?;
    let target = FavoriteTarget {
        target_type,
        id: target_id,
    };

    let removed = remove_favorite(db, user.0.id, target)
        .await
        .validate_custom()?;

    Ok(Json(RemovedResponse {
        success: true,
        removed,
    }))
}

#[derive(FromForm, Debug)]
pub struct TrackingQuery {
    pub archived: Option<bool>,
    pub status: Option<String>,
}

#[get("/tracking?<query..>")]
pub async fn api_list_tracking(
    query: TrackingQuery,
    user: CurrentUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<TrackedItem>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ApplicationStatus>)
        .transpose()
        .validate_custom()?;

    let filter = TrackingFilter {
        archived: query.archived,
        status,
    };

    let items = list_tracked_items(db, user.0.id, filter)
        .await
        .validate_custom()?;

    Ok(Json(items))
}

#[derive(Deserialize, Validate)]
pub struct TrackingUpdateRequest {
    status: String,
    #[validate(length(max = 2000, message = "Notes are limited to 2000 characters"))]
    notes: Option<String>,
    archived: Option<bool>,
}

#[put("/tracking/<course_id>", data = "<request>")]
pub async fn api_upsert_tracking(
    course_id: i64,
    request: Json<TrackingUpdateRequest>,
    user: CurrentUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<TrackedItem> {
    let validated = request.validate_custom()?;
    let status = validated
        .status
        .parse::<ApplicationStatus>()
        .validate_custom()?;

    let item = upsert_tracked_item(
        db,
        user.0.id,
        course_id,
        status,
        validated.notes.as_deref(),
        validated.archived,
    )
    .await
    .validate_custom()?;

    Ok(Json(item))
}
