use std::sync::Arc;

use signal_relay::bot::{Controller, runner};
use signal_relay::channels::{Channel, CliChannel, TelegramChannel};
use signal_relay::config::BotConfig;
use signal_relay::dispatch::WebhookDispatcher;
use signal_relay::store::LibSqlBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Warning: a rustls crypto provider was already installed");
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env()?;

    eprintln!("📈 Signal Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook: {}", config.webhook_url);
    eprintln!("   Timeout: {}s", config.webhook_timeout.as_secs());
    eprintln!(
        "   Numbers: {}",
        if config.wizard.strict_numbers {
            "strict"
        } else {
            "verbatim"
        }
    );

    // ── Database ─────────────────────────────────────────────────────────
    let store = LibSqlBackend::new_local(&config.db_path)
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to open database at {}: {e}",
                config.db_path.display()
            )
        })?;
    eprintln!("   Database: {}", config.db_path.display());

    // ── Wizard ───────────────────────────────────────────────────────────
    let sink = WebhookDispatcher::new(config.webhook_url.clone(), config.webhook_timeout);
    let controller =
        Arc::new(Controller::new(Arc::new(store), Arc::new(sink)).with_options(config.wizard));

    // ── Channel ──────────────────────────────────────────────────────────
    let channel: Arc<dyn Channel> = match config.telegram {
        Some(telegram) => {
            eprintln!(
                "   Channel: telegram (allowed: {})",
                if telegram.allows_everyone() {
                    "everyone".to_string()
                } else {
                    telegram.allowed_users.join(", ")
                }
            );
            let channel = TelegramChannel::new(telegram.bot_token, telegram.allowed_users);
            channel.health_check().await?;
            Arc::new(channel)
        }
        None => {
            eprintln!("   Channel: cli (set TELEGRAM_BOT_TOKEN to use Telegram)");
            eprintln!("   Commands: /start /newsignal /managepresets, !<payload> presses a button, !!text sends \"!text\"\n");
            Arc::new(CliChannel::new())
        }
    };

    runner::run(channel, controller).await?;

    Ok(())
}
