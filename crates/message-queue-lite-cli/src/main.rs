use message_queue_lite_cli::{run_cli, CliError};
use tracing::error;

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        // Without a subscriber the error would otherwise go nowhere.
        if matches!(e, CliError::Logging { .. }) {
            eprintln!("CLI error: {}", e);
        } else {
            error!("CLI error: {}", e);
        }

        std::process::exit(e.exit_code());
    }
}
