#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod config;
mod db;
mod env;
mod error;
mod ledger;
mod models;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use std::str::FromStr;

use api::{
    api_add_favorite, api_award_action, api_feed_countries, api_feed_posts, api_leaderboard,
    api_list_favorites, api_list_tracking, api_me, api_onboarding, api_remove_favorite,
    api_search_communities, api_upsert_tracking, health,
};
use auth::{default_api, unauthorized_api};
use config::AppConfig;
use error::AppError;
use ledger::ActionRewards;
use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use telemetry::{TelemetryFairing, TelemetryShutdown, init_tracing};
use thiserror::Error;
use tracing::info;

const DEFAULT_DATABASE_URL: &str = "sqlite:study_tracker.db";

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Env(#[from] dotenvy::Error),
    #[error("{0}")]
    Figment(#[from] rocket::figment::Error),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("{0}")]
    Rocket(#[from] rocket::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    let env_report = env::load_environment()?;
    let otel_guard = init_tracing();
    env_report.log();

    let config = AppConfig::load()?;
    let database_url =
        dotenvy::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

    let options = SqliteConnectOptions::from_str(&database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(AppError::from)?;
    info!("Migrations completed successfully");

    let rewards = ActionRewards::with_overrides(&config.action_rewards);
    info!(actions = rewards.len(), "Loaded action rewards");

    let _rocket = init_rocket(pool, config, rewards)
        .attach(TelemetryShutdown::new(otel_guard))
        .launch()
        .await?;

    Ok(())
}

pub fn init_rocket(pool: SqlitePool, config: AppConfig, rewards: ActionRewards) -> Rocket<Build> {
    info!("Starting study tracker");

    rocket::build()
        .manage(pool)
        .manage(config)
        .manage(rewards)
        .mount(
            "/api",
            routes![
                health,
                api_me,
                api_award_action,
                api_leaderboard,
                api_onboarding,
                api_search_communities,
                api_feed_countries,
                api_feed_posts,
                api_list_favorites,
                api_add_favorite,
                api_remove_favorite,
                api_list_tracking,
                api_upsert_tracking,
            ],
        )
        .register("/api", catchers![unauthorized_api, default_api])
        .attach(TelemetryFairing)
}
