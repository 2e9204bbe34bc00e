use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use recollect::Config;
use recollect::memory::{MemoryCoordinator, Recall, RecallScope};

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, truncate_string};

#[derive(Parser)]
pub struct RecallCommand {
    #[clap(help = "Conversation key to recall")]
    pub key: String,

    #[clap(long, short, help = "Text to search the cold tier with")]
    pub query: Option<String>,

    #[clap(
        long,
        help = "Search every conversation (requires recall.allow_global)",
        requires = "query"
    )]
    pub global: bool,
}

impl RecallCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let coordinator = MemoryCoordinator::from_config(config).await?;
        let scope = if self.global {
            RecallScope::Global
        } else {
            RecallScope::Conversation
        };

        let recall = coordinator
            .recall(&self.key, self.query.as_deref(), scope)
            .await?;

        match format {
            OutputFormat::Json => print_json(&recall)?,
            OutputFormat::Table => print_tables(&recall),
        }

        Ok(())
    }
}

fn print_json(recall: &Recall) -> CliResult<()> {
    let output = serde_json::json!({
        "hot": &recall.hot,
        "cold": &recall.cold,
        "hot_error": recall.hot_error.as_ref().map(|e| e.to_string()),
        "cold_error": recall.cold_error.as_ref().map(|e| e.to_string()),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_tables(recall: &Recall) {
    if recall.hot.is_empty() {
        println!("No recent turns.");
    } else {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(["Written", "Agent", "Message", "Response"]);

        for entry in &recall.hot {
            let message = entry
                .messages
                .last()
                .map(|m| m.content.as_str())
                .unwrap_or("");
            table.add_row([
                format_timestamp(&entry.written_at),
                entry.selected_agent.clone(),
                truncate_string(message, 40),
                truncate_string(&entry.response_content, 40),
            ]);
        }

        println!("Recent turns");
        println!("{table}");
    }

    if !recall.cold.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(["ID", "Similarity", "Conversation", "Content", "Created"]);

        for found in &recall.cold {
            table.add_row([
                truncate_string(&found.memory.id.to_string(), 8),
                format!("{:.3}", found.similarity),
                found.memory.conversation_key.clone(),
                truncate_string(&found.memory.content, 50),
                format_timestamp(&found.memory.created_at),
            ]);
        }

        println!("\nSimilar memories");
        println!("{table}");
    }

    if let Some(e) = &recall.hot_error {
        println!("\nhot tier unavailable: {e}");
    }
    if let Some(e) = &recall.cold_error {
        println!("\ncold tier unavailable: {e}");
    }
}
