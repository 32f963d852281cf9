#[macro_use]
pub mod logging;

pub mod api;
pub mod chat;
pub mod credentials;
pub mod events;
pub mod session;
pub mod settings;
pub mod store_manager;
pub mod tui;

use clap::Parser;

/// Command line options
#[derive(Parser, Debug)]
#[command(
    name = "ResumeDesk",
    version,
    about = "Terminal client for the ResumeDesk AI resume review service"
)]
pub struct Cli {
    /// Override the backend base URL from settings
    #[arg(long)]
    pub server: Option<String>,
    /// Override the chat WebSocket URL from settings
    #[arg(long)]
    pub ws_url: Option<String>,
}

/// App bootstrap: settings, logging, durable store, session restore, API and
/// chat wiring, then the terminal UI until quit.
pub async fn run(cli: Cli) -> Result<(), String> {
    let mut settings = settings::load_settings()?;
    if let Some(server) = cli.server {
        settings.server_url = server;
    }
    if let Some(ws_url) = cli.ws_url {
        settings.chat_ws_url = Some(ws_url);
    }

    // Log files live next to downloaded reports
    let log_dir = std::path::PathBuf::from(&settings.reports_dir).join("logs");
    if let Err(e) = logging::init_file_logging(&log_dir) {
        eprintln!("[setup] File logging unavailable: {}", e);
    }

    store_manager::initialise()?;
    // Restoring a stored session never opens a chat channel - channels are
    // strictly selection-driven
    session::restore_from_store();
    api::init(&settings.server_url)?;
    chat::controller::init(chat::ChatConfig::from_settings(&settings)).await;

    tlog!(
        "[setup] Backend: {} | Chat endpoint: {}",
        settings.server_url,
        settings.chat_ws_url()
    );

    let result = tui::run(settings).await;

    logging::stop_file_logging();
    result
}
