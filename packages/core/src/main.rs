use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use tokio::sync::watch;

use library_circulation::alerts::{
    EmailSender, LogEmailSender, OverdueEmailNotifier, ReminderService, SmtpEmailSender,
};
use library_circulation::api::{self, ApiState};
use library_circulation::cli::Cli;
use library_circulation::config::Config;
use library_circulation::directory::{InMemoryCatalog, InMemoryMembers};
use library_circulation::error::AppError;
use library_circulation::loans::{LoanService, OverdueScanner, TestingModeWatcher};
use library_circulation::logging::init_logging;
use library_circulation::metrics::AppMetrics;
use library_circulation::scheduler::{run_overdue_scans, ScanSchedule};
use library_circulation::store::LoanStore;

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config = Config::from_env()
        .and_then(|mut config| cli.apply(&mut config).map(|_| config))
        .map_err(AppError::Config)
        .unwrap_or_else(|err| {
            tracing::error!("{}", err);
            std::process::exit(1);
        });

    tracing::info!("Service started with config: {:?}", config);

    if let Err(err) = run(config).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), AppError> {
    let metrics = Arc::new(
        AppMetrics::new().map_err(|e| AppError::Server(format!("metrics registry: {}", e)))?,
    );

    let email: Arc<dyn EmailSender> = match config.smtp.clone() {
        Some(smtp) => {
            tracing::info!("Delivering email via SMTP relay {}:{}", smtp.host, smtp.port);
            Arc::new(SmtpEmailSender::new(smtp)?)
        }
        None => {
            tracing::warn!("SMTP_HOST not set; emails will be logged, not sent");
            Arc::new(LogEmailSender)
        }
    };

    // Directories start empty; operators fill them through POST /members and /media.
    let store = Arc::new(LoanStore::new());
    let members = Arc::new(InMemoryMembers::new());
    let catalog = Arc::new(InMemoryCatalog::new());
    let service = Arc::new(LoanService::new(store.clone(), members.clone(), catalog.clone()));
    let reminders = Arc::new(ReminderService::new(store.clone(), members.clone(), email.clone()));

    let notifier = Arc::new(OverdueEmailNotifier::new(email.clone()));
    let scanner = Arc::new(OverdueScanner::new(store.clone(), notifier, metrics.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let schedule = ScanSchedule::new(config.scan_interval_seconds, config.scan_jitter_seconds);
    let scans = tokio::spawn(run_overdue_scans(scanner, schedule, shutdown_rx.clone()));

    let mut watcher = TestingModeWatcher::new(
        store,
        members.clone(),
        catalog.clone(),
        email,
        metrics.clone(),
        config.testing_poll_interval_ms,
    );
    watcher.start();

    let app = api::router(ApiState {
        service,
        members,
        catalog,
        reminders,
        metrics,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Operator API listening on {}", addr);

    let mut server_shutdown = shutdown_rx;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = server_shutdown.changed() => {}
            }
        })
        .await;

    tracing::info!("Shutdown signal received. Stopping background tasks.");
    let _ = shutdown_tx.send(true);
    watcher.shutdown().await;
    if let Err(err) = scans.await {
        tracing::error!("Overdue scan task failed: {}", err);
    }

    served.map_err(AppError::from)
}
