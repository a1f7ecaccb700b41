use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use danmu_server::config::{self, AppConfig};

#[derive(Parser, Debug)]
#[command(
    name = "danmu-server",
    version,
    about = "Danmaku aggregation server speaking the dandan protocol"
)]
struct Args {
    /// Path to the config file
    #[arg(short, long, env = "DANMU_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "danmu_server=info,danmaku=info,dandan=info,platform_adapters=info,tower_http=warn"
                .into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(config::default_path);
    let config_dir = config_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let config = AppConfig::load(&config_path)?;
    info!(config = %config_path.display(), "configuration loaded");

    let app = danmu_server::build(&config, &config_dir)?;
    app.hooks.run_startup().await;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "server listening");

    let router = danmu_server::api::router(app.state.clone(), &config.server);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(app.shutdown.clone()))
        .await?;

    app.hooks.run_shutdown().await;
    Ok(())
}

/// Resolve on ctrl-c or SIGTERM, cancelling in-flight searches first.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
    token.cancel();
}
