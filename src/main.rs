use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = resumedesk_lib::Cli::parse();

    if let Err(e) = resumedesk_lib::run(cli).await {
        eprintln!("ResumeDesk failed: {}", e);
        std::process::exit(1);
    }
}
