use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use recollect::Config;
use recollect::memory::{MemoryStats, StatsReporter};

use crate::error::CliResult;
use crate::output::{OutputFormat, format_count};

#[derive(Parser)]
pub struct StatsCommand {}

impl StatsCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let reporter = StatsReporter::from_config(config).await?;
        let stats = reporter.collect().await;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
            OutputFormat::Table => print_table(&stats),
        }

        Ok(())
    }
}

fn print_table(stats: &MemoryStats) {
    println!("Recollect Statistics");
    println!("====================\n");

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["Tier", "Reachable", "Keys", "Entries"]);

    table.add_row([
        "Hot".to_string(),
        yes_no(stats.hot_reachable).to_string(),
        format_count(stats.hot_keys),
        format_count(stats.hot_entries),
    ]);
    table.add_row([
        "Cold".to_string(),
        yes_no(stats.cold_reachable).to_string(),
        "-".to_string(),
        format_count(stats.cold_records),
    ]);

    println!("{table}");

    for (tier, error) in [("hot", &stats.hot_error), ("cold", &stats.cold_error)] {
        if let Some(error) = error {
            println!("\n{tier} tier: {error}");
        }
    }
}

pub(crate) fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
