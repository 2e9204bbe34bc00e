use std::time::Duration;

use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use recollect::Config;
use recollect::config::HotConfig;
use recollect::memory::{ConversationTurn, MemoryCoordinator, MemoryItem, TierOutcome};

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct RecordCommand {
    #[clap(help = "Conversation key the turn belongs to")]
    pub key: String,

    #[clap(help = "Message content")]
    pub content: String,

    #[clap(long, short, default_value = "", help = "Agent response text")]
    pub response: String,

    #[clap(long, default_value = "cli", help = "Agent that handled the turn")]
    pub agent: String,

    #[clap(long, default_value = "operator", help = "Author of the message")]
    pub actor: String,

    #[clap(long, default_value = "1.0", help = "Routing confidence in [0, 1]")]
    pub confidence: f32,

    #[clap(long, help = "Override the hot-tier TTL for this turn, in seconds")]
    pub ttl_secs: Option<u64>,
}

impl RecordCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let coordinator = MemoryCoordinator::from_config(config).await?;

        let message = MemoryItem::new(&self.content, &self.key, &self.actor, &self.agent)
            .with_confidence(self.confidence);
        let mut turn = ConversationTurn::new(&self.key, vec![message], &self.agent, &self.response)
            .with_confidence(self.confidence);
        if let Some(secs) = self.ttl_secs {
            turn = turn.with_ttl_override(Duration::from_secs(secs));
        }

        let outcome = coordinator.record_turn(&turn).await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "conversation_key": &self.key,
                    "hot": describe(&outcome.hot),
                    "cold": describe(&outcome.cold),
                    "cold_record_id": outcome.cold_record_id().map(|id| id.to_string()),
                    "hot_persistent": config.hot.redis_url.is_some(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Tier", "Outcome"]);

                table.add_row(["Hot", &describe(&outcome.hot)]);
                table.add_row(["Cold", &describe(&outcome.cold)]);

                println!("{table}");
                if let Some(note) = hot_backend_note(&config.hot) {
                    println!("\n{note}");
                }
            }
        }

        Ok(())
    }
}

/// Without Redis the hot tier lives only as long as this process
fn hot_backend_note(config: &HotConfig) -> Option<&'static str> {
    if config.redis_url.is_some() {
        None
    } else {
        Some(
            "Note: no hot.redis_url configured; the hot entry is discarded when this command \
             exits. Set REDIS_URL to keep recent turns across invocations.",
        )
    }
}

fn describe(outcome: &TierOutcome) -> String {
    match outcome {
        TierOutcome::Written(Some(id)) => format!("written ({id})"),
        TierOutcome::Written(None) => "written".to_string(),
        TierOutcome::Skipped(reason) => format!("skipped: {reason}"),
        TierOutcome::Failed(e) => format!("failed: {e}"),
    }
}
