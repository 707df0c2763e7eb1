//! wa-gateway: WhatsApp ↔ assistant bridge
//!
//! Usage:
//!   wa-gateway                      - Start the webhook server
//!   wa-gateway --cli                - Chat from the terminal
//!   wa-gateway --ask "<text>"       - Answer one message and exit
//!   wa-gateway --help               - Show help

mod cli;

use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use wa_core::assistant::bootstrap::ensure_assistant;
use wa_core::{
    ChatClient, ChatResponder, Config, OpenAiAssistantClient, Responder, ResponderMode,
    ResponseGenerator, RunPoller, SqliteThreadStore,
};
use wa_whatsapp::WhatsAppBot;

/// Run mode
#[derive(Debug, PartialEq, Eq)]
enum RunMode {
    /// Webhook server
    Server,
    /// Interactive CLI mode
    Cli,
    /// Answer one message
    Ask { text: String, user_id: String },
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = parse_args(std::env::args().skip(1))?;

    match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("wa-gateway {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting wa-gateway...");
    tracing::info!("Responder mode: {:?}", config.assistant.mode);

    let responder = build_responder(&config).await?;

    match mode {
        RunMode::Cli => cli::run_cli(responder).await,
        RunMode::Ask { text, user_id } => cli::run_ask(responder, &user_id, &text).await,
        RunMode::Server => run_server(config, responder).await,
        RunMode::Help | RunMode::Version => Ok(()),
    }
}

/// Parse command line arguments
fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<RunMode> {
    let mut args = args.into_iter();
    let mut mode = RunMode::Server;
    let mut ask_user: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--cli" | "-c" => mode = RunMode::Cli,
            "--help" | "-h" => return Ok(RunMode::Help),
            "--version" | "-v" => return Ok(RunMode::Version),
            "--ask" | "-a" => {
                let text = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--ask needs a message"))?;
                mode = RunMode::Ask {
                    text,
                    user_id: cli::DEFAULT_CLI_USER.to_string(),
                };
            }
            "--user" | "-u" => {
                ask_user = Some(
                    args.next()
                        .ok_or_else(|| anyhow::anyhow!("--user needs an id"))?,
                );
            }
            other => anyhow::bail!("Unknown argument: {} (see --help)", other),
        }
    }

    if let (RunMode::Ask { user_id, .. }, Some(user)) = (&mut mode, ask_user) {
        *user_id = user;
    }

    Ok(mode)
}

/// Print help message
fn print_help() {
    println!("wa-gateway - WhatsApp assistant bridge");
    println!();
    println!("Usage:");
    println!("  wa-gateway                          Start the webhook server");
    println!("  wa-gateway --cli                    Chat from the terminal");
    println!("  wa-gateway --ask <text> [--user ID] Answer one message and exit");
    println!("  wa-gateway --help                   Show this help message");
    println!("  wa-gateway --version                Show version");
    println!();
    println!("Environment Variables:");
    println!("  OPENAI_API_KEY            API key (required)");
    println!("  ASSISTANT_ID              Assistant to run (created on first start when unset)");
    println!("  RESPONDER_MODE            assistant or chat (default: assistant)");
    println!("  REFERENCE_FILE            Document attached to a new assistant (default: data/data.csv)");
    println!("  FACEBOOK_ACCESS_TOKEN     WhatsApp Cloud API token");
    println!("  FACEBOOK_PHONE_NUMBER_ID  WhatsApp sender phone number id");
    println!("  WHATSAPP_VERIFY_TOKEN     Token expected by the webhook handshake");
    println!("  PORT                      Webhook port (default: 8000)");
    println!("  THREADS_DB_PATH           Thread store path (default: data/threads.db)");
    println!("  RUN_POLL_INTERVAL_MS      Run poll interval (default: 500)");
    println!("  RUN_TIMEOUT_SECS          Run timeout (default: 120)");
}

/// Build the responder selected by configuration
async fn build_responder(config: &Config) -> anyhow::Result<Arc<dyn Responder>> {
    match config.assistant.mode {
        ResponderMode::Assistant => {
            let client = OpenAiAssistantClient::new(&config.openai)
                .map_err(|e| anyhow::anyhow!("Failed to create assistant client: {}", e))?;

            let assistant_id = ensure_assistant(&client, &config.openai, &config.assistant)
                .await
                .map_err(|e| anyhow::anyhow!("No assistant available: {}", e))?;
            tracing::info!("Using assistant {}", assistant_id);

            let threads = SqliteThreadStore::open(Path::new(&config.threads.db_path))
                .map_err(|e| anyhow::anyhow!("Failed to open thread store: {}", e))?;
            tracing::info!("Thread store: {}", config.threads.db_path);

            let generator = Arc::new(ResponseGenerator::new(
                Arc::new(client),
                Arc::new(threads),
                RunPoller::from_config(&config.poller),
            ));

            Ok(Arc::new(generator.with_assistant(assistant_id)))
        }
        ResponderMode::Chat => {
            let client = ChatClient::new(config)
                .map_err(|e| anyhow::anyhow!("Failed to create chat client: {}", e))?;
            tracing::info!("Chat model: {}", client.model());

            Ok(Arc::new(ChatResponder::new(
                Arc::new(client),
                config.assistant.system_prompt.clone(),
            )))
        }
    }
}

/// Run the webhook server until Ctrl+C
async fn run_server(config: Config, responder: Arc<dyn Responder>) -> anyhow::Result<()> {
    let bot = WhatsAppBot::new(&config.whatsapp, responder)
        .map_err(|e| anyhow::anyhow!("WhatsApp setup failed: {}", e))?;

    let mut handle = tokio::spawn(async move {
        if let Err(e) = bot.start().await {
            tracing::error!("Webhook server error: {}", e);
        }
    });
    tracing::info!("Webhook server started on port {}", config.whatsapp.port);
    tracing::info!("Press Ctrl+C to exit");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down..."),
        _ = &mut handle => {
            anyhow::bail!("Webhook server stopped unexpectedly");
        }
    }

    handle.abort();
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_mode_is_server() {
        assert_eq!(parse_args(args(&[])).unwrap(), RunMode::Server);
    }

    #[test]
    fn test_ask_with_user() {
        let mode = parse_args(args(&["--ask", "What are the check-in timings?", "--user", "wa_12345"])).unwrap();
        assert_eq!(
            mode,
            RunMode::Ask {
                text: "What are the check-in timings?".to_string(),
                user_id: "wa_12345".to_string(),
            }
        );
    }

    #[test]
    fn test_ask_defaults_to_cli_user() {
        let mode = parse_args(args(&["-a", "hi"])).unwrap();
        assert_eq!(
            mode,
            RunMode::Ask {
                text: "hi".to_string(),
                user_id: cli::DEFAULT_CLI_USER.to_string(),
            }
        );
    }

    #[test]
    fn test_bad_arguments() {
        assert!(parse_args(args(&["--ask"])).is_err());
        assert!(parse_args(args(&["--bogus"])).is_err());
        assert_eq!(parse_args(args(&["--cli", "--help"])).unwrap(), RunMode::Help);
    }
}
