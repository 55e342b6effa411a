pub mod auto_close;
pub mod documents;
pub mod engine;
pub mod history;
pub mod recommend;
pub mod scheduler;
pub mod tally;
pub mod window;

pub use crate::domain::model::{HistoryRecord, Item, Recommendation, User, VoteSession};
pub use crate::domain::ports::{Clock, DocumentStore};
pub use crate::utils::error::Result;
