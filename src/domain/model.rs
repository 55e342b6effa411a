use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub type ItemId = String;
pub type UserId = String;

/// Collection names understood by the document store.
pub mod collections {
    pub const ITEMS: &str = "items";
    pub const USERS: &str = "users";
    pub const VOTES: &str = "votes";
    pub const HISTORY: &str = "history";
    pub const CLOSURES: &str = "closures";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Heaviness {
    Light,
    Normal,
    Heavy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub category: String,
    pub heaviness: Heaviness,
    /// 1 (cheap) to 3 (expensive).
    pub price_tier: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub map_links: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Preferences {
    #[serde(default)]
    pub preferred: BTreeSet<ItemId>,
    #[serde(default)]
    pub disliked: BTreeSet<ItemId>,
}

impl Preferences {
    /// Toggles `item_id` in the preferred set, dropping it from `disliked`.
    pub fn toggle_preferred(&mut self, item_id: &str) {
        if !self.preferred.remove(item_id) {
            self.disliked.remove(item_id);
            self.preferred.insert(item_id.to_string());
        }
    }

    /// Toggles `item_id` in the disliked set, dropping it from `preferred`.
    pub fn toggle_disliked(&mut self, item_id: &str) {
        if !self.disliked.remove(item_id) {
            self.preferred.remove(item_id);
            self.disliked.insert(item_id.to_string());
        }
    }

    pub fn is_disliked(&self, item_id: &str) -> bool {
        self.disliked.contains(item_id)
    }

    pub fn is_preferred(&self, item_id: &str) -> bool {
        self.preferred.contains(item_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub preferences: Preferences,
}

/// One day's selections. Sets keep every item at most once per user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoteSession {
    pub date: NaiveDate,
    #[serde(default)]
    pub votes: BTreeMap<UserId, BTreeSet<ItemId>>,
}

impl VoteSession {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            votes: BTreeMap::new(),
        }
    }

    /// Adds the item if absent, removes it otherwise. Returns whether it is now selected.
    pub fn toggle(&mut self, user_id: &str, item_id: &str) -> bool {
        let selections = self.votes.entry(user_id.to_string()).or_default();
        if selections.remove(item_id) {
            false
        } else {
            selections.insert(item_id.to_string());
            true
        }
    }

    pub fn selections(&self, user_id: &str) -> Option<&BTreeSet<ItemId>> {
        self.votes.get(user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryRecord {
    pub date: NaiveDate,
    pub item_id: ItemId,
    pub user_id: UserId,
    pub automatic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_count: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

impl HistoryRecord {
    /// Store key; one record per (date, user).
    pub fn key(&self) -> String {
        history_key(self.date, &self.user_id)
    }
}

pub fn history_key(date: NaiveDate, user_id: &str) -> String {
    format!("{}_{}", day_key(date), user_id)
}

pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosureState {
    Closing,
    Closed,
}

/// Durable per-day record that the auto-close ran (or is running).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClosureMarker {
    pub date: NaiveDate,
    pub state: ClosureState,
    #[serde(default)]
    pub winner: Option<ItemId>,
    pub vote_count: u32,
    pub closed_at: DateTime<Utc>,
}

/// Session-scoped reroll bookkeeping for one user's recommendation view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RerollState {
    pub reroll_counter: u32,
    pub excluded_item_id: Option<ItemId>,
}

impl RerollState {
    pub fn advance(&mut self, shown_top: &str) {
        self.reroll_counter += 1;
        self.excluded_item_id = Some(shown_top.to_string());
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Narrows the candidate list, mirroring the menu filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    pub category: Option<String>,
    pub heaviness: Option<Heaviness>,
    pub price_tier: Option<u8>,
}

impl ItemFilter {
    pub fn matches(&self, item: &Item) -> bool {
        self.category.as_ref().map_or(true, |c| *c == item.category)
            && self.heaviness.map_or(true, |h| h == item.heaviness)
            && self.price_tier.map_or(true, |p| p == item.price_tier)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub item: Item,
    pub score: u32,
    pub days_since_last_eaten: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn test_preferences_are_mutually_exclusive() {
        let mut prefs = Preferences::default();
        prefs.toggle_preferred("kimchi");
        assert!(prefs.is_preferred("kimchi"));

        prefs.toggle_disliked("kimchi");
        assert!(prefs.is_disliked("kimchi"));
        assert!(!prefs.is_preferred("kimchi"));

        prefs.toggle_preferred("kimchi");
        assert!(prefs.is_preferred("kimchi"));
        assert!(!prefs.is_disliked("kimchi"));

        prefs.toggle_preferred("kimchi");
        assert!(prefs.preferred.is_empty());
        assert!(prefs.disliked.is_empty());
    }

    #[test]
    fn test_double_toggle_restores_session() {
        let mut session = VoteSession::new(date());
        session.toggle("alice", "pasta");
        let before = session.clone();

        assert!(session.toggle("alice", "sushi"));
        assert!(!session.toggle("alice", "sushi"));
        assert_eq!(session, before);
    }

    #[test]
    fn test_session_rejects_unknown_fields() {
        let doc = serde_json::json!({"date": "2024-05-01", "votes": {}, "extra": 1});
        assert!(serde_json::from_value::<VoteSession>(doc).is_err());
    }

    #[test]
    fn test_history_key_is_per_day_and_user() {
        assert_eq!(history_key(date(), "alice"), "2024-05-01_alice");
    }

    #[test]
    fn test_item_filter() {
        let item = Item {
            id: "salad".to_string(),
            name: "Salad".to_string(),
            category: "western".to_string(),
            heaviness: Heaviness::Light,
            price_tier: 2,
            map_links: vec![],
        };
        assert!(ItemFilter::default().matches(&item));
        assert!(ItemFilter {
            heaviness: Some(Heaviness::Light),
            ..Default::default()
        }
        .matches(&item));
        assert!(!ItemFilter {
            price_tier: Some(1),
            ..Default::default()
        }
        .matches(&item));
    }

    #[test]
    fn test_reroll_state_advance() {
        let mut state = RerollState::default();
        state.advance("pasta");
        state.advance("sushi");
        assert_eq!(state.reroll_counter, 2);
        assert_eq!(state.excluded_item_id.as_deref(), Some("sushi"));
        state.reset();
        assert_eq!(state, RerollState::default());
    }
}
