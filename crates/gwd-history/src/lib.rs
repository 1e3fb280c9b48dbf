pub mod build;
pub mod percentile;
pub mod remote;
pub mod store;

pub use build::build_history_store;
pub use store::{
    FileHistoryStore, HistoryEntry, HistoryStore, InMemoryHistoryStore, NullHistoryStore, Outcome,
    SharedHistoryStore,
};
