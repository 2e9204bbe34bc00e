use std::path::PathBuf;

use clap::{Parser, Subcommand};
use recollect::Config;
use recollect_cli::commands::{
    ConfigCommand, HealthCommand, RecallCommand, RecordCommand, StatsCommand,
};
use recollect_cli::error::CliResult;
use recollect_cli::output::OutputFormat;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "recollect")]
#[command(about = "Recollect CLI - inspect and exercise two-tier conversational memory")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'd', global = true, help = "Path to the cold-tier data directory")]
    pub data_dir: Option<PathBuf>,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Record a conversation turn in both tiers")]
    Record(RecordCommand),

    #[clap(about = "Recall recent turns and similar memories for a conversation")]
    Recall(RecallCommand),

    #[clap(about = "Show per-tier statistics")]
    Stats(StatsCommand),

    #[clap(about = "Check that both tiers are reachable")]
    Health(HealthCommand),

    #[clap(about = "Configuration commands")]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    init_logging();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,recollect=debug"));

    // Logs go to stderr so --json output stays parseable
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.cold.data_dir = data_dir;
    }

    match &cli.command {
        Command::Record(cmd) => cmd.execute(&config, format).await,
        Command::Recall(cmd) => cmd.execute(&config, format).await,
        Command::Stats(cmd) => cmd.execute(&config, format).await,
        Command::Health(cmd) => cmd.execute(&config, format).await,
        Command::Config(cmd) => cmd.execute(&config, format).await,
    }
}
