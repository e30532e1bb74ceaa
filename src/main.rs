use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt};

use kg_service::prelude::*;
use kg_service::discovery;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("kg_service=info,tower_http=info"));
    fmt().with_env_filter(filter).with_target(true).compact().init();

    let config = Config::load().context("loading configuration")?;

    let store = Store::open(&config.database.url, config.database.max_connections)
        .await
        .with_context(|| format!("opening database {}", config.database.url))?;
    if config.database.migrate {
        store.migrate().await.context("running migrations")?;
    }

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    let bound = listener.local_addr().context("reading bound address")?;

    tracing::info!(
        addr = %bound,
        local = %discovery::local_address(),
        "kg service listening"
    );
    axum::serve(listener, app(store))
        .await
        .context("serving http")?;
    Ok(())
}
