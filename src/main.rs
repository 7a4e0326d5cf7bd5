use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rlcp::config::{Config, LogFormat};
use rlcp::controller::Controller;
use rlcp::http::{self, AppState};
use rlcp::metrics::Metrics;
use rlcp::repository::{self, Repository};

fn init_logging(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_logging(&config);

    info!(http_addr = %config.http_addr, "starting control plane");

    let metrics = Arc::new(Metrics::new());
    let repository = Arc::new(Repository::new(config.max_top_offenders_report, Arc::clone(&metrics)));

    let (report_tx, report_rx) = mpsc::channel(64);
    let controller = Arc::new(Controller::new(config.clone(), Arc::clone(&metrics), report_tx));

    tokio::spawn(repository::run(Arc::clone(&repository), report_rx));

    let state = AppState {
        controller: Arc::clone(&controller),
        repository: Arc::clone(&repository),
    };
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    info!(addr = %listener.local_addr()?, "http server listening");

    let shutdown = {
        let controller = Arc::clone(&controller);
        async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            controller.shutdown_all();
            rlcp::controller::graceful_shutdown_delay().await;
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
