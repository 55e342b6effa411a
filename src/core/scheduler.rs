use crate::core::engine::LunchEngine;
use crate::domain::ports::{Clock, DocumentStore};
use chrono::NaiveDate;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseState {
    Idle,
    Closing,
    ClosedForDay,
}

/// Process-local view of the auto-close state machine. The durable closure
/// marker in the store stays authoritative; this only spares store round trips
/// once a day is known to be closed.
#[derive(Debug, Default)]
pub struct AutoCloseScheduler {
    current: Mutex<Option<(NaiveDate, CloseState)>>,
}

impl AutoCloseScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, date: NaiveDate) -> CloseState {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        match *current {
            Some((day, state)) if day == date => state,
            _ => CloseState::Idle,
        }
    }

    pub fn set(&self, date: NaiveDate, state: CloseState) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        tracing::debug!("Auto-close state for {} -> {:?}", date, state);
        *current = Some((date, state));
    }

    /// Moves `date` from `Idle` to `Closing`. Returns false if it was not idle.
    pub fn begin(&self, date: NaiveDate) -> bool {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        match *current {
            Some((day, state)) if day == date && state != CloseState::Idle => false,
            _ => {
                *current = Some((date, CloseState::Closing));
                true
            }
        }
    }
}

/// Closes overdue days once, then runs [`LunchEngine::tick`] every `period`
/// until `shutdown` flips to true.
pub fn spawn_ticker<S, C>(
    engine: Arc<LunchEngine<S, C>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    S: DocumentStore + 'static,
    C: Clock + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("Auto-close ticker started, period {:?}", period);
        if let Err(e) = engine.close_overdue_days().await {
            tracing::warn!("Closing overdue days failed: {}", e);
        }
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let _ = engine.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Auto-close ticker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryStore, ManualClock};
    use crate::core::documents::encode;
    use crate::core::engine::EngineSettings;
    use crate::domain::model::{collections, Heaviness, Item, Preferences, User};
    use chrono::{DateTime, TimeZone, Utc};

    fn local(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap() - chrono::Duration::hours(9)
    }

    async fn voted_engine(clock: &ManualClock) -> Arc<LunchEngine<InMemoryStore, ManualClock>> {
        let store = InMemoryStore::new();
        let user = User {
            id: "a".to_string(),
            name: "A".to_string(),
            preferences: Preferences::default(),
        };
        let item = Item {
            id: "item1".to_string(),
            name: "Item 1".to_string(),
            category: "korean".to_string(),
            heaviness: Heaviness::Normal,
            price_tier: 1,
            map_links: vec![],
        };
        store
            .put(collections::USERS, "a", encode(&user).unwrap())
            .await
            .unwrap();
        store
            .put(collections::ITEMS, "item1", encode(&item).unwrap())
            .await
            .unwrap();
        let engine = LunchEngine::new(
            store,
            clock.clone(),
            EngineSettings {
                tie_break_seed: Some(1),
                ..EngineSettings::default()
            },
        );
        engine.toggle_vote("a", "item1").await.unwrap();
        Arc::new(engine)
    }

    #[test]
    fn test_state_machine_per_day() {
        let scheduler = AutoCloseScheduler::new();
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let tomorrow = today.succ_opt().unwrap();

        assert_eq!(scheduler.state(today), CloseState::Idle);
        assert!(scheduler.begin(today));
        assert!(!scheduler.begin(today));
        assert_eq!(scheduler.state(today), CloseState::Closing);

        scheduler.set(today, CloseState::ClosedForDay);
        assert!(!scheduler.begin(today));
        assert_eq!(scheduler.state(tomorrow), CloseState::Idle);
        assert!(scheduler.begin(tomorrow));
    }

    #[test]
    fn test_failed_close_can_restart() {
        let scheduler = AutoCloseScheduler::new();
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert!(scheduler.begin(today));
        scheduler.set(today, CloseState::Idle);
        assert!(scheduler.begin(today));
    }

    #[tokio::test]
    async fn test_ticker_closes_after_cutoff_and_stops_on_shutdown() {
        let clock = ManualClock::new(local(10, 0));
        let engine = voted_engine(&clock).await;
        clock.set(local(12, 59));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ticker = spawn_ticker(engine.clone(), Duration::from_millis(20), shutdown_rx);
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(engine.history().await.unwrap().is_empty());
        assert_eq!(engine.close_state(), CloseState::Idle);

        clock.set(local(13, 0));
        tokio::time::timeout(Duration::from_secs(2), async {
            while engine.close_state() != CloseState::ClosedForDay {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(engine.history().await.unwrap().len(), 1);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), ticker)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_ticker_catches_up_on_a_missed_day() {
        let clock = ManualClock::new(local(10, 0));
        let engine = voted_engine(&clock).await;
        clock.advance(chrono::Duration::days(1));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ticker = spawn_ticker(engine.clone(), Duration::from_secs(60), shutdown_rx);
        tokio::time::timeout(Duration::from_secs(2), async {
            while engine.history().await.unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let history = engine.history().await.unwrap();
        assert_eq!(history[0].date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        shutdown_tx.send(true).unwrap();
        ticker.await.unwrap();
    }
}
