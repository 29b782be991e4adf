//! yardd, the switchyard daemon.
//!
//! Serves an [`InferenceRouter`](switchyard::InferenceRouter) over HTTP.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use switchyard::server::{Config, app, serve};

/// switchyard daemon: local-or-remote text generation with a response cache.
#[derive(Parser)]
#[command(name = "yardd")]
#[command(version = switchyard::PKG_VERSION)]
#[command(about = "switchyard text generation daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "SWITCHYARD_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Override the bind address from the config file.
    #[arg(short, long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("switchyard=info,yardd=info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    let router = Arc::new(config.router_builder().build()?);

    // Startup capability check: report only, never install or mutate anything.
    let assessment = router.assess().await;
    info!(
        version = switchyard::PKG_VERSION,
        model = router.model(),
        mode = router.mode().as_str(),
        score = assessment.verdict.score,
        can_run_local = assessment.verdict.can_run_local,
        gpu = assessment.snapshot.gpu_present,
        "yardd starting"
    );
    for (position, backend) in router.dispatcher().backends().iter().enumerate() {
        info!(position, name = %backend.name, endpoint = %backend.endpoint, timeout = ?backend.timeout, "backend");
    }
    match router.cache() {
        Some(cache) => info!(location = cache.location(), "response cache enabled"),
        None => info!("response cache disabled"),
    }

    if let Some(cache) = router.cache().cloned() {
        let interval = config.cache.sweep_interval_secs;
        if interval > 0 {
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(interval));
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let cache = cache.clone();
                    let _ = tokio::task::spawn_blocking(move || cache.sweep_expired()).await;
                }
            });
        }
    }

    let address = args.address.unwrap_or_else(|| config.server.address.clone());
    let application = app(router.clone(), &config.server.allowed_origins);
    serve(application, &address).await?;

    router.flush().await;
    Ok(())
}
