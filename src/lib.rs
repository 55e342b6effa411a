pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{InMemoryStore, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use crate::core::engine::{CloseReport, EngineSettings, LunchEngine};
pub use crate::core::scheduler::spawn_ticker;
pub use utils::error::{LunchError, Result};
