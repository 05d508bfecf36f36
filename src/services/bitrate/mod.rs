pub mod channel;
pub mod client;
pub mod history;
pub mod polling;

pub use channel::ConnectionManager;
pub use client::{BitrateClient, BitrateSource, BitrateStats, CurrentBitrate};
pub use history::HistoryLoader;
pub use polling::PollingScheduler;
