use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use sqlx::SqlitePool;
use tracing::Instrument;

use crate::config::AppConfig;
use crate::db::resolve_user;
use crate::validation::{ToValidationResponse, ValidationResponse};

use super::User;

/// The verified handle the auth provider attached to the request, plus
/// whatever profile hints came along with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub handle: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl ExternalIdentity {
    pub fn new(handle: &str) -> Self {
        Self {
            handle: handle.to_string(),
            email: None,
            name: None,
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn normalized_email(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(|email| email.trim().to_lowercase())
            .filter(|email| !email.is_empty())
    }
}

fn header_value(request: &Request<'_>, name: &str) -> Option<String> {
    request
        .headers()
        .get_one(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ExternalIdentity {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = match request.rocket().state::<AppConfig>() {
            Some(config) => config,
            _ => {
                tracing::error!("App config not found in managed state");
                return Outcome::Error((Status::InternalServerError, ()));
            }
        };

        match header_value(request, &config.identity_header) {
            Some(handle) => Outcome::Success(ExternalIdentity {
                handle,
                email: header_value(request, &config.email_header),
                name: header_value(request, &config.name_header),
            }),
            None => {
                tracing::debug!(header = %config.identity_header, "No external identity on request");
                Outcome::Error((Status::Unauthorized, ()))
            }
        }
    }
}

/// A resolved local user, created on first sight of the handle.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        resolve_current_user(request)
            .instrument(tracing::info_span!("user_identity_guard"))
            .await
    }
}

async fn resolve_current_user(request: &Request<'_>) -> Outcome<CurrentUser, ()> {
    let identity = match request.guard::<ExternalIdentity>().await {
        Outcome::Success(identity) => identity,
        Outcome::Error(e) => return Outcome::Error(e),
        Outcome::Forward(status) => return Outcome::Forward(status),
    };

    let db = match request.rocket().state::<SqlitePool>() {
        Some(pool) => pool,
        _ => {
            tracing::error!("Database pool not found in managed state");
            return Outcome::Error((Status::InternalServerError, ()));
        }
    };

    match resolve_user(db, &identity).await {
        Ok(resolution) => {
            if resolution.was_created() {
                tracing::info!(handle = %identity.handle, "Created local user for new identity");
            }
            Outcome::Success(CurrentUser(resolution.into_user()))
        }
        Err(err) => {
            let status = err.to_status_with_log("Resolving current user");
            Outcome::Error((status, ()))
        }
    }
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> Custom<Json<ValidationResponse>> {
    tracing::warn!("Unauthenticated API request");
    Status::Unauthorized.to_validation_response()
}

#[catch(default)]
pub fn default_api(status: Status, _req: &Request) -> Custom<Json<ValidationResponse>> {
    status.to_validation_response()
}
