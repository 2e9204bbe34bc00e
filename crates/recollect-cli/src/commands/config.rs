use clap::{Parser, Subcommand};
use recollect::Config;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct ConfigCommand {
    #[clap(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    #[clap(about = "Print the effective configuration")]
    Show,
}

impl ConfigCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            ConfigSubcommand::Show => match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
                OutputFormat::Table => print!("{}", toml::to_string_pretty(config)?),
            },
        }
        Ok(())
    }
}
