//! Green Token chain service — entry point.
//!
//! Restores the wallet session, starts the event synchronizer that keeps
//! the pending-company view consistent with the Green Token contract, and
//! exposes the dashboard REST API over Axum.

mod api;
mod chain;
mod config;
mod contract;
mod dispatch;
mod errors;
mod events;
mod evidence;
mod reports;
mod session;
mod store;
mod sync;
#[cfg(test)]
mod testing;
mod wallet;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chain::{ChainClient, ContractGateway};
use config::Config;
use dispatch::Dispatchers;
use evidence::EvidenceClient;
use reports::ReportService;
use session::Session;
use store::Store;
use sync::Synchronizer;
use wallet::{NodeWallet, UnavailableWallet, WalletProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    let store = Store::init(&config.database_url).await?;

    let wallet: Arc<dyn WalletProvider> = match &config.wallet_rpc_url {
        Some(url) => Arc::new(NodeWallet::new(url)?),
        None => {
            info!("No WALLET_RPC_URL configured; running read-only");
            Arc::new(UnavailableWallet::default())
        }
    };

    // One chain client for the whole service; everything downstream holds
    // it through the gateway trait.
    let chain = Arc::new(ChainClient::new(&config, wallet.clone())?);
    let gateway: Arc<dyn ContractGateway> = chain;

    // ─── Session ──────────────────────────────────────────
    let session = Session::new(gateway.clone(), wallet, Some(store.clone()));
    session.restore().await;
    session.start_account_watcher();

    // ─── Event synchronizer ───────────────────────────────
    let sync = Arc::new(Synchronizer::new(
        gateway.clone(),
        Some(store),
        config.start_block,
        Duration::from_secs(config.refresh_min_secs),
    ));
    sync.preload().await;
    sync.clone()
        .spawn(Duration::from_secs(config.poll_interval_secs));

    // ─── Dispatchers & report service ─────────────────────
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let evidence = config
        .evidence_api_url
        .clone()
        .map(|url| EvidenceClient::new(url, http));

    let dispatchers = Arc::new(Dispatchers::new(
        gateway.clone(),
        session.clone(),
        sync.clone(),
        evidence,
    ));
    let reports = Arc::new(ReportService::new(gateway.clone(), dispatchers.clone()));

    // ─── REST API ─────────────────────────────────────────
    let state = Arc::new(api::ApiState {
        session,
        sync,
        dispatchers,
        reports,
        gateway,
        start_block: config.start_block,
    });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/session", get(api::get_session))
        .route("/session/connect", post(api::connect))
        .route("/session/disconnect", post(api::disconnect))
        .route("/companies/pending", get(api::pending_companies))
        .route("/companies", post(api::register_company))
        .route("/companies/:wallet", get(api::company_details))
        .route("/companies/:wallet/verify", post(api::verify_company))
        .route("/transfers", post(api::transfer))
        .route("/mints", post(api::mint))
        .route("/transactions", get(api::transactions))
        .route("/stats", get(api::stats))
        .route("/reports", get(api::list_reports).post(api::submit_report))
        .route("/reports/:id", get(api::report_status))
        .route("/reports/:id/verify", post(api::verify_report))
        .route("/sync/refresh", post(api::refresh))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
