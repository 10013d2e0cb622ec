use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::ExternalIdentity;
use crate::db::{apply_activity, resolve_user};
use crate::error::AppError;

const STANDARD_REWARDS: [(&str, u32); 9] = [
    ("daily_login", 10),
    ("complete_profile", 50),
    ("complete_onboarding", 100),
    ("add_favorite", 5),
    ("track_course", 10),
    ("upload_document", 20),
    ("create_post", 15),
    ("comment", 5),
    ("book_consultation", 25),
];

/// Action name to XP reward. Built once at startup and handed to Rocket as
/// managed state; there is no way to change it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRewards {
    rewards: HashMap<String, u32>,
}

impl ActionRewards {
    pub fn standard() -> Self {
        Self::from_table(STANDARD_REWARDS)
    }

    pub fn from_table<I, S>(table: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        Self {
            rewards: table
                .into_iter()
                .map(|(action, xp)| (action.into(), xp))
                .collect(),
        }
    }

    /// Standard table with configured entries layered on top.
    pub fn with_overrides(overrides: &HashMap<String, u32>) -> Self {
        let mut rewards = Self::standard();
        for (action, xp) in overrides {
            rewards.rewards.insert(action.clone(), *xp);
        }
        rewards
    }

    pub fn reward_for(&self, action: &str) -> Option<u32> {
        self.rewards.get(action).copied()
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }
}

impl Default for ActionRewards {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Streak {
    pub current: i64,
    pub longest: i64,
    pub last_activity: Option<NaiveDate>,
}

impl Streak {
    /// Streak after recording activity on `today`. Activity on the same day
    /// leaves it alone, the next day extends it, anything else restarts it.
    pub fn advance(self, today: NaiveDate) -> Streak {
        let current = match self.last_activity {
            Some(last) if last == today => self.current.max(1),
            Some(last) if last.succ_opt() == Some(today) => self.current + 1,
            _ => 1,
        };

        Streak {
            current,
            longest: self.longest.max(current),
            last_activity: Some(today),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionAward {
    pub action: String,
    pub xp_gained: i64,
    pub new_xp_total: i64,
    pub current_streak: i64,
}

/// Awards the XP mapped to `action`. Repeated calls award again: callers
/// are responsible for not double-submitting.
#[instrument(skip(pool, rewards))]
pub async fn award_action(
    pool: &Pool<Sqlite>,
    rewards: &ActionRewards,
    identity: &ExternalIdentity,
    action: &str,
    today: NaiveDate,
) -> Result<ActionAward, AppError> {
    let reward = rewards
        .reward_for(action)
        .ok_or_else(|| AppError::UnknownAction(action.to_string()))?;

    let user = resolve_user(pool, identity).await?.into_user();

    let streak = Streak {
        current: user.current_streak,
        longest: user.longest_streak,
        last_activity: user.last_activity_date,
    }
    .advance(today);

    let new_xp_total = apply_activity(pool, user.id, i64::from(reward), streak).await?;

    info!(user_id = user.id, xp_gained = reward, new_xp_total, "Awarded action XP");

    Ok(ActionAward {
        action: action.to_string(),
        xp_gained: i64::from(reward),
        new_xp_total,
        current_streak: streak.current,
    })
}
