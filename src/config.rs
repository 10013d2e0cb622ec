use std::collections::HashMap;

use rocket::figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "Study.toml";
pub const ENV_PREFIX: &str = "STUDY_TRACKER_";

/// Application settings. Compiled defaults are overridden by `Study.toml`,
/// which is overridden by `STUDY_TRACKER_*` variables (`__` separates
/// nested keys, e.g. `STUDY_TRACKER_ACTION_REWARDS__DAILY_LOGIN=15`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub max_connections: u32,
    pub identity_header: String,
    pub email_header: String,
    pub name_header: String,
    #[serde(default)]
    pub action_rewards: HashMap<String, u32>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            identity_header: "x-user-id".to_string(),
            email_header: "x-user-email".to_string(),
            name_header: "x-user-name".to_string(),
            action_rewards: HashMap::new(),
        }
    }
}

impl AppConfig {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load() -> Result<Self, rocket::figment::Error> {
        Self::figment().extract()
    }
}
