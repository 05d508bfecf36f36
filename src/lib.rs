pub mod config;
pub mod error;
pub mod kernel;
pub mod services;

// Re-export specific items for convenient access
pub use config::TelemetryConfig;
pub use kernel::classifier::QualityTier;
pub use kernel::connection::ConnectionState;
pub use kernel::controller::{Command, TelemetryController, TelemetryHandle};
pub use kernel::state::TelemetrySnapshot;
