use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;

use namebook::app::Services;
use namebook::app::queue::InProcessQueue;
use namebook::app::server::{AppState, router};
use namebook::assets::LocalAssetIndex;
use namebook::config::AppConfig;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Overrides NAMEBOOK_DATA_DIR.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 2)]
    max_concurrency: usize,

    /// Bundled artwork directory (served under the local asset prefix if it exists).
    #[arg(long, default_value = "assets")]
    assets_dir: PathBuf,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    namebook::logging::init()?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting namebook-app");

    let mut config = AppConfig::from_env().context("read environment config")?;
    if let Some(data_dir) = args.data_dir.clone() {
        config.data_dir = data_dir;
    }
    if config.internal_auth_token.is_none() {
        tracing::warn!("NAMEBOOK_INTERNAL_AUTH_TOKEN is unset; internal endpoints are open");
    }
    let services = Services::from_config(&config)?;

    let (assets, assets_dir) = if args.assets_dir.is_dir() {
        let index = LocalAssetIndex::scan_dir(
            &services.book_config.local_asset_prefix,
            &args.assets_dir,
        )?;
        tracing::info!(dir = %args.assets_dir.display(), assets = index.len(), "serving bundled assets");
        (index, Some(args.assets_dir.clone()))
    } else {
        tracing::warn!(dir = %args.assets_dir.display(), "assets dir not found; previews will show placeholders");
        (
            LocalAssetIndex::new(&services.book_config.local_asset_prefix, Vec::<String>::new()),
            None,
        )
    };

    let state = AppState {
        store: services.store,
        checkout: services.checkout,
        runner: services.runner,
        queue: InProcessQueue::new(args.max_concurrency),
        assets: Arc::new(assets),
        theme_orders: services.book_config.theme_orders,
        internal_auth_token: config.internal_auth_token,
    };
    let app = router(state, assets_dir);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
