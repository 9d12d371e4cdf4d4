use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use director::config::DirectorConfig;
use director::controller::InterviewController;
use director::schema::Category;
use director::session::{SessionManager, SessionSettings};
use director::{chat, web_server};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the web chat UI.
    Serve {
        #[arg(long, default_value_t = 9900, help = "Port for the web server.")]
        port: u16,
    },
    /// Run the interview in the terminal.
    Chat {
        #[arg(long, help = "Reference image to ground the suggestions.")]
        image: Option<PathBuf>,
    },
    /// List the interview categories and the fields each one requires.
    Fields,
}

fn print_fields() {
    for (i, category) in Category::ALL.iter().enumerate() {
        println!("{}. {} ({})", i + 1, category.title(), category.as_str());
        for field in category.fields() {
            println!("   - {}: {} [{}]", field.name, field.question, field.options.join(" | "));
        }
    }
}

// The main entry point of the application, using tokio's async runtime
#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for environment variables like HF_TOKEN)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG environment variable (e.g., RUST_LOG=info,director=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Parse command-line arguments
    let cli = Cli::parse();

    info!("Director starting with command: {:?}", cli.command);

    if let Commands::Fields = cli.command {
        print_fields();
        return Ok(());
    }

    // Configuration problems are fatal before any turn runs.
    let config = DirectorConfig::from_env().context("Invalid configuration")?;
    let controller = Arc::new(InterviewController::from_config(&config));

    match cli.command {
        Commands::Serve { port } => {
            info!("Starting Director web UI on port {}...", port);
            let sessions = Arc::new(SessionManager::new(
                controller,
                SessionSettings::from(&config),
            ));

            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) = web_server::start_web_server(port, sessions).await {
                    error!("Web server failed: {:?}", e);
                }
            });

            let ctrl_c = tokio::signal::ctrl_c();
            // Pin the ctrl_c future to the stack so its address is stable
            tokio::pin!(ctrl_c);

            tokio::select! {
                // Wait for Ctrl-C signal for graceful shutdown
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, initiating shutdown...");
                }
                // Handle potential completion/failure of the web server task
                res = &mut web_server_handle => {
                     match res {
                         Ok(_) => info!("Web server task completed unexpectedly."),
                         // Handle JoinError (e.g., if the task panicked)
                         Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                         Err(e) => error!("Web server task failed: {:?}", e),
                     }
                }
            }

            if !web_server_handle.is_finished() {
                info!("Aborting web server task...");
                web_server_handle.abort();
            }
            info!("Shutdown complete.");
        }
        Commands::Chat { image } => {
            let session = chat::run_interview_chat(&controller, image)
                .await
                .context("Chat session failed")?;
            info!(
                "Chat ended after {} messages with {} selections",
                session.history.len(),
                session.selections.len()
            );
        }
        Commands::Fields => {}
    }

    Ok(())
}
