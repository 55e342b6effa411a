use crate::config::EngineConfig;
use crate::core::auto_close::{resolve_close, winner_records};
use crate::core::documents::{decode, Documents};
use crate::core::recommend::{RecommendationScorer, ScoringWeights};
use crate::core::scheduler::{AutoCloseScheduler, CloseState};
use crate::core::tally::{self, Leaders, Tally};
use crate::core::window::{VotingWindow, WindowSchedule, WindowStatus};
use crate::domain::model::{
    collections, day_key, ClosureMarker, ClosureState, HistoryRecord, Item, ItemFilter, ItemId,
    Preferences, Recommendation, RerollState, User, UserId, VoteSession,
};
use crate::domain::ports::{ChangeEvent, ChangeKind, Clock, DocumentStore};
use crate::utils::error::{LunchError, Result};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use futures::stream::{BoxStream, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Mutex;
use std::time::Duration;

/// A `Closing` marker younger than this belongs to a live engine.
const CLOSE_LEASE_SECS: i64 = 120;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub schedule: WindowSchedule,
    pub weights: ScoringWeights,
    pub store_timeout: Duration,
    pub tie_break_seed: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            schedule: WindowSchedule::default(),
            weights: ScoringWeights::default(),
            store_timeout: Duration::from_secs(5),
            tie_break_seed: None,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            schedule: config.window.to_schedule()?,
            weights: config.scoring,
            store_timeout: config.store_timeout(),
            tie_break_seed: config.scheduler.tie_break_seed,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReport {
    NotDue,
    /// Another engine holds the day's closure marker; retried on the next tick.
    InProgress {
        date: NaiveDate,
    },
    AlreadyClosed {
        date: NaiveDate,
    },
    Closed {
        date: NaiveDate,
        winner: Option<ItemId>,
        vote_count: u32,
        records_written: usize,
    },
}

/// Voting and recommendation engine over a document store and a clock.
pub struct LunchEngine<S: DocumentStore, C: Clock> {
    docs: Documents<S>,
    clock: C,
    window: VotingWindow,
    scorer: RecommendationScorer,
    scheduler: AutoCloseScheduler,
    rng: Mutex<StdRng>,
}

impl<S: DocumentStore, C: Clock> LunchEngine<S, C> {
    pub fn new(store: S, clock: C, settings: EngineSettings) -> Self {
        let rng = match settings.tie_break_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            docs: Documents::new(store, settings.store_timeout),
            clock,
            window: VotingWindow::new(settings.schedule),
            scorer: RecommendationScorer::new(settings.weights),
            scheduler: AutoCloseScheduler::new(),
            rng: Mutex::new(rng),
        }
    }

    pub fn with_defaults(store: S, clock: C) -> Self {
        Self::new(store, clock, EngineSettings::default())
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.window.local_date(self.now())
    }

    pub fn window(&self) -> &VotingWindow {
        &self.window
    }

    pub fn window_status(&self) -> WindowStatus {
        self.window.status(self.now())
    }

    pub fn close_state(&self) -> CloseState {
        self.scheduler.state(self.today())
    }

    pub fn store(&self) -> &S {
        self.docs.store()
    }

    pub async fn items(&self) -> Result<Vec<Item>> {
        self.docs.load_all(collections::ITEMS).await
    }

    pub async fn users(&self) -> Result<Vec<User>> {
        self.docs.load_all(collections::USERS).await
    }

    async fn user(&self, user_id: &str) -> Result<User> {
        self.docs
            .load(collections::USERS, user_id)
            .await?
            .ok_or_else(|| LunchError::not_found(collections::USERS, user_id))
    }

    async fn require_item(&self, item_id: &str) -> Result<Item> {
        self.docs
            .load(collections::ITEMS, item_id)
            .await?
            .ok_or_else(|| LunchError::not_found(collections::ITEMS, item_id))
    }

    /// Adds or removes `item_id` from the user's selections for today.
    pub async fn toggle_vote(&self, user_id: &str, item_id: &str) -> Result<VoteSession> {
        let now = self.now();
        self.window.ensure_open(now)?;
        self.user(user_id).await?;
        self.require_item(item_id).await?;

        let date = self.window.local_date(now);
        let session = self
            .docs
            .update::<VoteSession>(
                collections::VOTES,
                &day_key(date),
                &|current: Option<VoteSession>| {
                    // Checked again at commit time so a delayed write cannot land after close.
                    self.window.ensure_open(self.clock.now())?;
                    Ok(tally::toggled(current, date, user_id, item_id))
                },
            )
            .await?;

        let selected = session
            .selections(user_id)
            .map_or(false, |items| items.contains(item_id));
        tracing::debug!(
            "{} {} {} for {}",
            user_id,
            if selected { "voted for" } else { "withdrew" },
            item_id,
            date
        );
        Ok(session)
    }

    pub async fn today_session(&self) -> Result<Option<VoteSession>> {
        self.docs
            .load(collections::VOTES, &day_key(self.today()))
            .await
    }

    pub async fn today_tally(&self) -> Result<Tally> {
        Ok(self
            .today_session()
            .await?
            .map(|s| tally::tally(&s))
            .unwrap_or_default())
    }

    pub async fn today_leaders(&self) -> Result<Leaders> {
        Ok(tally::leaders(&self.today_tally().await?))
    }

    /// Live tallies recomputed from every vote-session change.
    pub fn tally_updates(&self) -> BoxStream<'static, (String, Tally)> {
        self.docs
            .subscribe(collections::VOTES)
            .filter_map(|event| async move { tally_from_event(event) })
            .boxed()
    }

    pub fn subscribe(&self, collection: &str) -> BoxStream<'static, ChangeEvent> {
        self.docs.subscribe(collection)
    }

    pub async fn history(&self) -> Result<Vec<HistoryRecord>> {
        self.docs.load_all(collections::HISTORY).await
    }

    pub async fn recommend(&self, user_id: &str, state: &RerollState) -> Result<Vec<Recommendation>> {
        self.recommend_filtered(user_id, state, &ItemFilter::default())
            .await
    }

    pub async fn recommend_filtered(
        &self,
        user_id: &str,
        state: &RerollState,
        filter: &ItemFilter,
    ) -> Result<Vec<Recommendation>> {
        let user = self.user(user_id).await?;
        let items: Vec<Item> = self
            .items()
            .await?
            .into_iter()
            .filter(|item| filter.matches(item))
            .collect();
        let history = self.history().await?;

        self.scorer.recommend(
            &items,
            &history,
            &user.preferences,
            self.today(),
            state.reroll_counter,
            state.excluded_item_id.as_deref(),
        )
    }

    /// Recomputes with `shown_top` excluded. `state` only advances when the reroll succeeds.
    pub async fn reroll(
        &self,
        user_id: &str,
        state: &mut RerollState,
        shown_top: &str,
    ) -> Result<Vec<Recommendation>> {
        self.window.ensure_open(self.now())?;

        let mut next = state.clone();
        next.advance(shown_top);
        let ranked = self.recommend(user_id, &next).await?;

        // A reroll that outlived the window fails rather than racing the close.
        self.window.ensure_open(self.now())?;
        *state = next;
        Ok(ranked)
    }

    /// Records an explicit lunch choice for today.
    pub async fn record_lunch(&self, user_id: &str, item_id: &str) -> Result<HistoryRecord> {
        self.user(user_id).await?;
        self.require_item(item_id).await?;

        let now = self.now();
        let record = HistoryRecord {
            date: self.window.local_date(now),
            item_id: item_id.to_string(),
            user_id: user_id.to_string(),
            automatic: false,
            vote_count: None,
            timestamp: now,
        };
        self.append_history(&record).await?;
        tracing::info!("{} recorded {} for {}", user_id, item_id, record.date);
        Ok(record)
    }

    /// Writes `record` unless the user already has one for that day.
    async fn append_history(&self, record: &HistoryRecord) -> Result<()> {
        self.docs
            .update::<HistoryRecord>(
                collections::HISTORY,
                &record.key(),
                &|current: Option<HistoryRecord>| match current {
                    Some(existing) => Err(LunchError::AlreadyRecorded {
                        date: existing.date,
                        user_id: existing.user_id,
                    }),
                    None => Ok(record.clone()),
                },
            )
            .await
            .map(|_| ())
    }

    pub async fn toggle_preferred(&self, user_id: &str, item_id: &str) -> Result<User> {
        self.update_preferences(user_id, item_id, Preferences::toggle_preferred)
            .await
    }

    pub async fn toggle_disliked(&self, user_id: &str, item_id: &str) -> Result<User> {
        self.update_preferences(user_id, item_id, Preferences::toggle_disliked)
            .await
    }

    async fn update_preferences(
        &self,
        user_id: &str,
        item_id: &str,
        toggle: fn(&mut Preferences, &str),
    ) -> Result<User> {
        self.require_item(item_id).await?;
        self.docs
            .update::<User>(collections::USERS, user_id, &|current: Option<User>| {
                let mut user =
                    current.ok_or_else(|| LunchError::not_found(collections::USERS, user_id))?;
                toggle(&mut user.preferences, item_id);
                Ok(user)
            })
            .await
    }

    /// Closes today's vote once the cutoff has passed.
    pub async fn auto_close_if_due(&self) -> Result<CloseReport> {
        let now = self.now();
        if !self.window.is_past_cutoff(now) {
            return Ok(CloseReport::NotDue);
        }
        self.close_day(self.window.local_date(now)).await
    }

    /// Closes sessions left over from earlier days, e.g. when no engine ran
    /// through a cutoff. Days already closed are skipped.
    pub async fn close_overdue_days(&self) -> Result<Vec<CloseReport>> {
        let today = self.today();
        let mut overdue: Vec<NaiveDate> = self
            .docs
            .load_all::<VoteSession>(collections::VOTES)
            .await?
            .into_iter()
            .map(|session| session.date)
            .filter(|date| *date < today)
            .collect();
        overdue.sort();
        overdue.dedup();

        let mut reports = Vec::new();
        for date in overdue {
            match self.close_day(date).await {
                Ok(report) => reports.push(report),
                Err(LunchError::AlreadyClosed { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        if !reports.is_empty() {
            tracing::info!("Caught up on {} overdue day(s)", reports.len());
        }
        Ok(reports)
    }

    /// Host entry point for the periodic timer. Failures are logged and retried on the next tick.
    pub async fn tick(&self) -> Result<CloseReport> {
        match self.auto_close_if_due().await {
            Ok(report) => {
                if let CloseReport::Closed { .. } = report {
                    tracing::info!("Auto-close finished: {:?}", report);
                }
                Ok(report)
            }
            Err(LunchError::AlreadyClosed { date }) => {
                tracing::debug!("Auto-close for {} already done", date);
                Ok(CloseReport::AlreadyClosed { date })
            }
            Err(e) => {
                tracing::warn!("Auto-close failed, retrying next tick: {}", e);
                Err(e)
            }
        }
    }

    /// Resolves `date`'s votes into history. A day is closed at most once, across
    /// every engine sharing the store.
    pub async fn close_day(&self, date: NaiveDate) -> Result<CloseReport> {
        if !self.scheduler.begin(date) {
            return Err(LunchError::AlreadyClosed { date });
        }
        match self.run_close(date).await {
            Ok(CloseReport::InProgress { date }) => {
                self.scheduler.set(date, CloseState::Idle);
                Ok(CloseReport::InProgress { date })
            }
            Ok(report) => {
                self.scheduler.set(date, CloseState::ClosedForDay);
                Ok(report)
            }
            Err(LunchError::AlreadyClosed { date }) => {
                self.scheduler.set(date, CloseState::ClosedForDay);
                Err(LunchError::AlreadyClosed { date })
            }
            Err(e) => {
                self.scheduler.set(date, CloseState::Idle);
                Err(e)
            }
        }
    }

    async fn run_close(&self, date: NaiveDate) -> Result<CloseReport> {
        let key = day_key(date);
        let now = self.now();
        let users: Vec<UserId> = self.users().await?.into_iter().map(|u| u.id).collect();
        let marker: Option<ClosureMarker> = self.docs.load(collections::CLOSURES, &key).await?;

        let (winner, vote_count, records) = match marker {
            Some(marker) if marker.state == ClosureState::Closed => {
                return Err(LunchError::AlreadyClosed { date });
            }
            Some(marker) if now - marker.closed_at < ChronoDuration::seconds(CLOSE_LEASE_SECS) => {
                tracing::debug!("Another engine is closing {}", date);
                return Ok(CloseReport::InProgress { date });
            }
            Some(marker) => {
                tracing::warn!("Resuming interrupted auto-close for {}", date);
                let records = match &marker.winner {
                    Some(winner) => {
                        winner_records(date, marker.closed_at, winner, marker.vote_count, &users)
                    }
                    None => Vec::new(),
                };
                (marker.winner, marker.vote_count, records)
            }
            None => {
                let session: Option<VoteSession> =
                    self.docs.load(collections::VOTES, &key).await?;
                let outcome = {
                    let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                    resolve_close(date, now, session.as_ref(), &users, &mut *rng)
                };

                let claim = ClosureMarker {
                    date,
                    state: if outcome.winner.is_some() {
                        ClosureState::Closing
                    } else {
                        ClosureState::Closed
                    },
                    winner: outcome.winner.clone(),
                    vote_count: outcome.vote_count,
                    closed_at: now,
                };
                let claimed = self
                    .docs
                    .update::<ClosureMarker>(
                        collections::CLOSURES,
                        &key,
                        &|current: Option<ClosureMarker>| match current {
                            Some(_) => Err(LunchError::AlreadyClosed { date }),
                            None => Ok(claim.clone()),
                        },
                    )
                    .await;
                match claimed {
                    Ok(_) => {}
                    Err(LunchError::AlreadyClosed { .. }) => {
                        tracing::debug!("Lost the close claim for {}", date);
                        return Ok(CloseReport::InProgress { date });
                    }
                    Err(e) => return Err(e),
                }

                if outcome.winner.is_none() {
                    tracing::info!("No votes for {}, closed without a winner", date);
                    return Ok(CloseReport::Closed {
                        date,
                        winner: None,
                        vote_count: 0,
                        records_written: 0,
                    });
                }
                (outcome.winner, outcome.vote_count, outcome.records)
            }
        };

        let mut records_written = 0;
        for record in &records {
            match self.append_history(record).await {
                Ok(()) => records_written += 1,
                Err(LunchError::AlreadyRecorded { user_id, .. }) => {
                    tracing::debug!("{} already has lunch recorded for {}", user_id, date);
                }
                Err(e) => return Err(e),
            }
        }
        if winner.is_some() {
            self.docs.remove(collections::VOTES, &key).await?;
        }

        self.docs
            .update::<ClosureMarker>(
                collections::CLOSURES,
                &key,
                &|current: Option<ClosureMarker>| {
                    let mut marker = current
                        .ok_or_else(|| LunchError::not_found(collections::CLOSURES, &key))?;
                    marker.state = ClosureState::Closed;
                    Ok(marker)
                },
            )
            .await?;

        tracing::info!(
            "Closed {}: winner {:?} with {} votes, {} history records",
            date,
            winner,
            vote_count,
            records_written
        );
        Ok(CloseReport::Closed {
            date,
            winner,
            vote_count,
            records_written,
        })
    }
}

fn tally_from_event(event: ChangeEvent) -> Option<(String, Tally)> {
    match (event.kind, event.document) {
        (ChangeKind::Deleted, _) | (_, None) => Some((event.key, Tally::new())),
        (ChangeKind::Upserted, Some(document)) => {
            match decode::<VoteSession>(&event.collection, &event.key, document) {
                Ok(session) => Some((event.key, tally::tally(&session))),
                Err(e) => {
                    tracing::warn!("Skipping vote change: {}", e);
                    None
                }
            }
        }
    }
}
