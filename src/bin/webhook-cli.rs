use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use url::Url;

use webhook_relay::config::{load_config, Config};
use webhook_relay::telegram::{BotApi, RegistrationOptions, WebhookRegistrar};

#[derive(Parser)]
#[command(name = "webhook-cli")]
#[command(about = "Inspect and manage the bot's webhook registration", long_about = None)]
struct Cli {
    /// TOML settings file; environment variables override its values.
    #[arg(short, long, env = "WEBHOOK_RELAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current registration (getWebhookInfo)
    Info,
    /// Register a webhook URL with the configured delivery options
    Set {
        /// Public HTTPS URL, used verbatim
        url: Url,
    },
    /// Remove the registration
    Delete,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config: Config = load_config(cli.config.as_deref())?.config;

    let api = BotApi::new(reqwest::Client::new(), config.api_base.clone(), config.bot_token.clone());
    let registrar = WebhookRegistrar::new(Arc::new(api));

    match cli.command {
        Commands::Info => {
            let info = registrar.query_status().await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Set { url } => {
            let options = RegistrationOptions::from_config(&config);
            let ack = registrar.register(&url, &options).await?;
            println!("{}", ack.description.as_deref().unwrap_or("Webhook was set"));
        }
        Commands::Delete => {
            let ack = registrar.deregister().await?;
            println!("{}", ack.description.as_deref().unwrap_or("Webhook was deleted"));
        }
    }

    Ok(())
}
