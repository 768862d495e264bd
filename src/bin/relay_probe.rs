//! CLI tool for locating the relay and reading webhook logs through it
//!
//! Usage:
//!   webhook-relay-probe discover [--json]
//!   webhook-relay-probe token new
//!   webhook-relay-probe token check <token>
//!   webhook-relay-probe logs <token> [--count <n>] [--json]

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use webhook_relay::discovery::DEFAULT_PROBE_TIMEOUT;
use webhook_relay::webhook::DEFAULT_LOG_COUNT;
use webhook_relay::{Discovery, RelayConfig, RelayEndpoint, RelayProbe, WebhookClient, WebhookToken};

/// CLI tool for locating the webhook relay
#[derive(Parser, Debug)]
#[command(name = "webhook-relay-probe")]
#[command(author = "WebhookRelay Contributors")]
#[command(version = "1.0.0")]
#[command(about = "Locate the webhook relay and read captured requests through it")]
struct Args {
    /// Config file shared with the relay
    #[arg(long, env = "RELAY_CONFIG", default_value = "./config.json")]
    config: PathBuf,

    /// Host the relay listens on
    #[arg(long, default_value = "localhost")]
    host: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find the port the relay ended up on
    Discover {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate or validate webhook tokens
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Show captured requests for a token
    Logs {
        /// Webhook token (GUID)
        token: String,

        /// Number of requests to fetch
        #[arg(short = 'n', long, default_value_t = DEFAULT_LOG_COUNT)]
        count: u32,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TokenAction {
    /// Generate a new token and print its webhook URL
    New,

    /// Check that a token is a valid GUID
    Check {
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .with_target(false)
        .compact()
        .init();

    let config = RelayConfig::load(&args.config)?;

    match args.command {
        Commands::Discover { json } => {
            let endpoint = discover(&config, &args.host).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&endpoint)?);
            } else {
                println!("Proxy connected");
                println!("  Port:     {}", endpoint.port);
                println!("  Health:   {}", endpoint.health_url());
                println!("  API base: {}", endpoint.api_url);
            }
        }

        Commands::Token { action } => match action {
            TokenAction::New => {
                let token = WebhookToken::generate();
                println!("Token:       {}", token);
                println!("Webhook URL: {}", token.webhook_url(&config.upstream_origin));
            }
            TokenAction::Check { token } => {
                let token: WebhookToken = token.parse()?;
                println!("Valid token: {}", token);
            }
        },

        Commands::Logs { token, count, json } => {
            let token: WebhookToken = token.parse()?;
            let endpoint = discover(&config, &args.host).await?;

            let client = WebhookClient::new(reqwest::Client::new(), endpoint);
            let entries = client.fetch_log(&token, count).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }

            if entries.is_empty() {
                println!("No requests captured for {}", token);
                return Ok(());
            }

            println!("{:<38} {:<8} {:<30} {:<30}", "ID", "METHOD", "RECEIVED", "PATH");
            println!("{}", "-".repeat(109));

            for entry in &entries {
                println!(
                    "{:<38} {:<8} {:<30} {:<30}",
                    field(entry, &["/Id", "/id"]),
                    field(entry, &["/MessageObject/Method", "/method"]).to_uppercase(),
                    field(entry, &["/Date", "/timestamp"]),
                    field(entry, &["/MessageObject/Value", "/path", "/url"]),
                );
            }

            println!("\nTotal: {} request(s)", entries.len());
        }
    }

    Ok(())
}

async fn discover(config: &RelayConfig, host: &str) -> Result<RelayEndpoint> {
    let probe = RelayProbe::new(host, &config.path_prefix, DEFAULT_PROBE_TIMEOUT)?;

    match probe.discover(config.preferred_port, config.fallback_ports).await {
        Discovery::Found(endpoint) => Ok(endpoint),
        Discovery::NotFound { attempted } => {
            eprintln!("Proxy disconnected");
            bail!(
                "no relay answered on {} (tried ports {:?})",
                host,
                attempted
            )
        }
    }
}

/// First present field among the JSON `pointers`, rendered as text.
/// Backend records nest method and path under `MessageObject`.
fn field(entry: &serde_json::Value, pointers: &[&str]) -> String {
    pointers
        .iter()
        .find_map(|p| entry.pointer(p))
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_reads_nested_message_object() {
        let entry = json!({
            "Id": "42",
            "Date": "2024-01-01T00:00:00Z",
            "MessageObject": { "Method": "post", "Value": "/123e4567/orders" }
        });

        assert_eq!(field(&entry, &["/Id", "/id"]), "42");
        assert_eq!(field(&entry, &["/MessageObject/Method", "/method"]), "post");
        assert_eq!(field(&entry, &["/MessageObject/Value", "/path", "/url"]), "/123e4567/orders");
    }

    #[test]
    fn test_field_falls_back_to_top_level_keys() {
        let entry = json!({ "id": 7, "method": "GET", "url": "/hook" });

        assert_eq!(field(&entry, &["/Id", "/id"]), "7");
        assert_eq!(field(&entry, &["/MessageObject/Method", "/method"]), "GET");
        assert_eq!(field(&entry, &["/MessageObject/Value", "/path", "/url"]), "/hook");
        assert_eq!(field(&entry, &["/Date", "/timestamp"]), "-");
    }
}
