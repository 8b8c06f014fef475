//! imgbot - Telegram image generation bot daemon

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use imgbot::config::Config;
use imgbot::Bot;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Telegram image generation bot
#[derive(Parser, Debug)]
#[command(name = "imgbot", version, about = "Telegram image generation bot daemon")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the per-user cooldown, in seconds
    #[arg(long)]
    cooldown: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(cooldown) = args.cooldown {
        config.cooldown_secs = cooldown;
    }

    // Log to stderr and to a daily file, like logs/imgbot.log.2026-08-06
    std::fs::create_dir_all(&config.log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "imgbot.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imgbot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    let bot = Bot::new(config);
    bot.run().await
}
