use crate::core::recommend::ScoringWeights;
use crate::core::window::WindowSchedule;
use crate::domain::model::{Item, User};
use crate::utils::error::{LunchError, Result};
use crate::utils::validation::{
    validate_positive_number, validate_range, validate_time_order, validate_unique_ids, Validate,
};
use chrono::{FixedOffset, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub scoring: ScoringWeights,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub items: Vec<Item>,
}

/// Wall-clock times are `HH:MM` in the group's local offset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub opens_at: String,
    pub closes_at: String,
    pub auto_close_at: String,
    pub utc_offset: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            opens_at: "09:00".to_string(),
            closes_at: "12:00".to_string(),
            auto_close_at: "13:00".to_string(),
            utc_offset: "+09:00".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub tick_seconds: u64,
    /// Fixed seed for the tie-break generator; entropy when absent.
    pub tie_break_seed: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 30,
            tie_break_seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

fn parse_time(field: &str, value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|e| LunchError::InvalidConfigValueError {
        field: field.to_string(),
        value: value.to_string(),
        reason: format!("Expected HH:MM: {}", e),
    })
}

impl WindowConfig {
    pub fn to_schedule(&self) -> Result<WindowSchedule> {
        let offset = self.utc_offset.parse::<FixedOffset>().map_err(|e| {
            LunchError::InvalidConfigValueError {
                field: "window.utc_offset".to_string(),
                value: self.utc_offset.clone(),
                reason: format!("Expected +HH:MM: {}", e),
            }
        })?;
        Ok(WindowSchedule {
            opens_at: parse_time("window.opens_at", &self.opens_at)?,
            closes_at: parse_time("window.closes_at", &self.closes_at)?,
            auto_close_at: parse_time("window.auto_close_at", &self.auto_close_at)?,
            offset,
        })
    }
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| LunchError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unknown variables stay verbatim.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| LunchError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.tick_seconds)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.timeout_ms)
    }
}

impl Validate for EngineConfig {
    fn validate(&self) -> Result<()> {
        let schedule = self.window.to_schedule()?;
        validate_time_order("window.opens_at", schedule.opens_at, schedule.closes_at)?;
        validate_time_order(
            "window.auto_close_at",
            schedule.closes_at,
            schedule.auto_close_at,
        )?;

        validate_range("scoring.jitter_range", self.scoring.jitter_range, 1, 10_000)?;
        // At most one re-evaluation gap of a minute.
        validate_range("scheduler.tick_seconds", self.scheduler.tick_seconds, 1, 60)?;
        validate_positive_number("store.timeout_ms", self.store.timeout_ms, 1)?;

        validate_unique_ids("users", self.users.iter().map(|u| u.id.as_str()))?;
        validate_unique_ids("items", self.items.iter().map(|i| i.id.as_str()))?;
        for item in &self.items {
            validate_range("items.price_tier", item.price_tier, 1, 3)?;
        }
        for user in &self.users {
            if let Some(id) = user
                .preferences
                .preferred
                .intersection(&user.preferences.disliked)
                .next()
            {
                return Err(LunchError::InvalidConfigValueError {
                    field: format!("users.{}.preferences", user.id),
                    value: id.clone(),
                    reason: "Item cannot be both preferred and disliked".to_string(),
                });
            }
        }
        Ok(())
    }
}
