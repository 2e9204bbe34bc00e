pub mod config;
pub mod health;
pub mod recall;
pub mod record;
pub mod stats;

pub use config::ConfigCommand;
pub use health::HealthCommand;
pub use recall::RecallCommand;
pub use record::RecordCommand;
pub use stats::StatsCommand;
