use crate::core::tally::{leaders, tally};
use crate::domain::model::{HistoryRecord, ItemId, UserId, VoteSession};
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseOutcome {
    pub winner: Option<ItemId>,
    pub vote_count: u32,
    pub records: Vec<HistoryRecord>,
    pub session_cleared: bool,
}

impl CloseOutcome {
    fn nothing() -> Self {
        Self {
            winner: None,
            vote_count: 0,
            records: Vec::new(),
            session_cleared: false,
        }
    }
}

/// One automatic record per user for the day's winner.
pub fn winner_records(
    date: NaiveDate,
    now: DateTime<Utc>,
    winner: &str,
    vote_count: u32,
    users: &[UserId],
) -> Vec<HistoryRecord> {
    users
        .iter()
        .map(|user_id| HistoryRecord {
            date,
            item_id: winner.to_string(),
            user_id: user_id.clone(),
            automatic: true,
            vote_count: Some(vote_count),
            timestamp: now,
        })
        .collect()
}

/// Turns a day's session into history. Pure apart from `rng`, which breaks ties
/// uniformly among the leaders.
///
/// A missing session or one without any votes yields no records and leaves the
/// session alone; sessions for another day are treated as missing.
pub fn resolve_close<R: Rng + ?Sized>(
    date: NaiveDate,
    now: DateTime<Utc>,
    session: Option<&VoteSession>,
    users: &[UserId],
    rng: &mut R,
) -> CloseOutcome {
    let Some(session) = session.filter(|s| s.date == date) else {
        return CloseOutcome::nothing();
    };

    let leaders = leaders(&tally(session));
    if leaders.items.is_empty() {
        return CloseOutcome::nothing();
    }

    let pick = rng.gen_range(0..leaders.items.len());
    let Some(winner) = leaders.items.iter().nth(pick).cloned() else {
        return CloseOutcome::nothing();
    };

    CloseOutcome {
        records: winner_records(date, now, &winner, leaders.max_count, users),
        winner: Some(winner),
        vote_count: leaders.max_count,
        session_cleared: true,
    }
}
