// Adapters layer: concrete implementations of the domain ports.

pub mod clock;
pub mod memory_store;

pub use clock::{ManualClock, SystemClock};
pub use memory_store::InMemoryStore;
