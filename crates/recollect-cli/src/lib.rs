pub mod commands;
pub mod error;
pub mod output;

pub use commands::{ConfigCommand, HealthCommand, RecallCommand, RecordCommand, StatsCommand};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, format_count, format_timestamp, truncate_string};
