use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use linkgate::Config;
use linkgate::bot::{BotApi, CommandRouter, Platform};
use linkgate::gate::GateService;
use linkgate::http::server::{AppState, serve};
use linkgate::store::{LibSqlStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().context("loading configuration")?;

    let store: Arc<dyn Store> = Arc::new(
        LibSqlStore::new_local(&config.database.path)
            .await
            .context("opening database")?,
    );
    store.migrate().await.context("running migrations")?;

    let platform: Arc<dyn Platform> = Arc::new(BotApi::new(&config.bot));
    let gate = GateService::new(
        Arc::clone(&store),
        Arc::clone(&platform),
        config.bot.token.clone(),
    );
    let commands = CommandRouter::new(store, platform, config.bot.username.clone());
    let state = Arc::new(AppState { gate, commands });

    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port)
        .parse()
        .context("parsing listen address")?;
    tracing::info!(%addr, "redemption service listening");
    serve(addr, state).await.context("serving")?;
    Ok(())
}
