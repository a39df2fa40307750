use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use db_warden::backup::CommandSnapshot;
use db_warden::config;
use db_warden::db::PgConnector;
use db_warden::logging;
use db_warden::monitor::Monitor;
use db_warden::notify::SmtpMailer;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine, the variables may come from the environment
    dotenvy::dotenv().ok();

    let (config, source) = config::load()?;
    let _log_guard = logging::init(&config.logging)?;

    info!(source = %source, "Loaded configuration");

    let transport = Arc::new(SmtpMailer::new(&config.smtp)?);
    let connector = Arc::new(PgConnector::new());
    let snapshot = Arc::new(CommandSnapshot::from_config(&config.backup));

    let monitor = Monitor::new(config, connector, snapshot, transport);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, stopping after the current step");
                    shutdown.cancel();
                }
                Err(e) => error!(error = %e, "Failed to listen for interrupt"),
            }
        }
    });

    monitor.run(shutdown).await;
    Ok(())
}
