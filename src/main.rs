use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    sync::Arc,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use bingo_generator::{
    config::Config,
    generator::{Generator, SERVICE_NAME},
    http,
    pool::Pool,
};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_args(std::env::args())?.with_password_from_env();
    let pool = Pool::new(
        config.store_addr(),
        config.max_idle()?,
        config.idle_timeout()?,
    );
    let generator = Generator::new(pool.clone(), config.password.clone(), config.mode()?);
    tracing::info!(
        service = SERVICE_NAME,
        store = pool.addr(),
        mode = ?generator.mode(),
        authenticated = config.password.is_some(),
        "configured store"
    );

    let app = http::router(Arc::new(generator));
    let listener = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port()?)).await?;
    tracing::info!("Start listening on {}...", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}
