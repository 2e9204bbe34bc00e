use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use recollect::Config;
use recollect::memory::{HealthReport, open_cold_store, open_hot_store};

use crate::commands::stats::yes_no;
use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct HealthCommand {}

impl HealthCommand {
    /// Ping both tiers; exits with an error when either is unreachable
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let hot = match open_hot_store(&config.hot) {
            Ok(store) => store.ping().await,
            Err(e) => Err(e),
        };
        let cold = match open_cold_store(config).await {
            Ok(store) => store.ping().await,
            Err(e) => Err(e),
        };

        let report = HealthReport {
            hot_reachable: hot.is_ok(),
            cold_reachable: cold.is_ok(),
            hot_error: hot.err().map(|e| e.to_string()),
            cold_error: cold.err().map(|e| e.to_string()),
        };

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Tier", "Reachable", "Error"]);

                table.add_row([
                    "Hot",
                    yes_no(report.hot_reachable),
                    report.hot_error.as_deref().unwrap_or("-"),
                ]);
                table.add_row([
                    "Cold",
                    yes_no(report.cold_reachable),
                    report.cold_error.as_deref().unwrap_or("-"),
                ]);

                println!("{table}");
            }
        }

        if report.healthy() {
            Ok(())
        } else {
            Err(CliError("one or more tiers unreachable".to_string()))
        }
    }
}
