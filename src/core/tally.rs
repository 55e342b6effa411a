use crate::domain::model::{ItemId, VoteSession};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

pub type Tally = BTreeMap<ItemId, u32>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Leaders {
    pub max_count: u32,
    pub items: BTreeSet<ItemId>,
}

impl Leaders {
    pub fn is_tie(&self) -> bool {
        self.items.len() > 1
    }
}

/// Per-item vote counts; each user contributes at most one count per item.
pub fn tally(session: &VoteSession) -> Tally {
    let mut counts = Tally::new();
    for selections in session.votes.values() {
        for item_id in selections {
            *counts.entry(item_id.clone()).or_insert(0) += 1;
        }
    }
    counts
}

/// Items sharing the highest count. An all-zero tally has no leaders.
pub fn leaders(tally: &Tally) -> Leaders {
    let max_count = tally.values().copied().max().unwrap_or(0);
    if max_count == 0 {
        return Leaders::default();
    }
    Leaders {
        max_count,
        items: tally
            .iter()
            .filter(|(_, count)| **count == max_count)
            .map(|(id, _)| id.clone())
            .collect(),
    }
}

/// Applies one toggle to the stored session for `date`, creating it on first vote.
pub(crate) fn toggled(
    current: Option<VoteSession>,
    date: NaiveDate,
    user_id: &str,
    item_id: &str,
) -> VoteSession {
    let mut session = current
        .filter(|s| s.date == date)
        .unwrap_or_else(|| VoteSession::new(date));
    session.toggle(user_id, item_id);
    session
}
