use apt_repo::cli::{run, Cli, ExitStatus};
use clap::error::ErrorKind;
use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing for the CLI.
    tracing_subscriber::fmt::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            return ExitStatus::Usage.into();
        }
    };
    tracing::info!("CLI arguments parsed, invoking run");

    let status = run(cli).await;
    match status {
        ExitStatus::Success => tracing::info!("CLI completed successfully"),
        other => tracing::error!(code = other.code(), status = ?other, "CLI exited with error"),
    }
    status.into()
}
