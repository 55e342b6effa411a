//! Deterministic recommendation scoring.
//!
//! `score = days since last eaten + preferred bonus + jitter`, where the jitter
//! is a hash of `(date, reroll counter, item id)` so every ranking can be replayed.

use crate::core::history;
use crate::domain::model::{day_key, HistoryRecord, Item, Preferences, Recommendation};
use crate::utils::error::{LunchError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringWeights {
    pub preferred_bonus: u32,
    /// Jitter is drawn from `[0, jitter_range)`.
    pub jitter_range: u32,
    /// Days-since value for items with no history.
    pub never_eaten_days: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            preferred_bonus: 50,
            jitter_range: 30,
            never_eaten_days: 999,
        }
    }
}

/// First eight bytes of SHA-256, big endian. Stable across platforms and releases.
pub fn deterministic_hash(input: &str) -> u64 {
    let digest = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecommendationScorer {
    weights: ScoringWeights,
}

impl RecommendationScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn jitter(&self, date: NaiveDate, reroll_counter: u32, item_id: &str) -> u32 {
        let seed = format!("{}_reroll_{}{}", day_key(date), reroll_counter, item_id);
        let range = u64::from(self.weights.jitter_range.max(1));
        (deterministic_hash(&seed) % range) as u32
    }

    fn days_since(&self, history: &[HistoryRecord], item_id: &str, today: NaiveDate) -> u32 {
        match history::last_eaten(history, item_id) {
            Some(last) => (today - last.date).num_days().clamp(0, i64::from(u32::MAX)) as u32,
            None => self.weights.never_eaten_days,
        }
    }

    /// Ranks eligible items, best first.
    ///
    /// Disliked items never appear. `excluded_item_id` is dropped too, unless it is
    /// the only eligible item left, in which case it is returned again.
    pub fn recommend(
        &self,
        items: &[Item],
        history: &[HistoryRecord],
        prefs: &Preferences,
        date: NaiveDate,
        reroll_counter: u32,
        excluded_item_id: Option<&str>,
    ) -> Result<Vec<Recommendation>> {
        let eligible: Vec<&Item> = items
            .iter()
            .filter(|item| !prefs.is_disliked(&item.id))
            .collect();
        if eligible.is_empty() {
            return Err(LunchError::NoEligibleItems);
        }

        let mut candidates: Vec<&Item> = eligible
            .iter()
            .copied()
            .filter(|item| Some(item.id.as_str()) != excluded_item_id)
            .collect();
        if candidates.is_empty() {
            tracing::debug!(
                "Only the excluded item {:?} is eligible, keeping it",
                excluded_item_id
            );
            candidates = eligible;
        }

        let mut ranked: Vec<Recommendation> = candidates
            .into_iter()
            .map(|item| {
                let days_since = self.days_since(history, &item.id, date);
                let bonus = if prefs.is_preferred(&item.id) {
                    self.weights.preferred_bonus
                } else {
                    0
                };
                let jitter = self.jitter(date, reroll_counter, &item.id);
                Recommendation {
                    item: item.clone(),
                    score: days_since.saturating_add(bonus).saturating_add(jitter),
                    days_since_last_eaten: days_since,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.item.id.cmp(&b.item.id))
        });
        Ok(ranked)
    }
}
