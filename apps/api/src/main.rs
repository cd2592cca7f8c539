use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{debug, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::SchedulingEngine;
use doctor_cell::handlers::DoctorCellState;
use intervention_cell::build_dispatcher;
use patient_cell::PatientCellState;
use risk_cell::FlagVerifier;
use shared_config::AppConfig;
use shared_database::build_store;
use shared_utils::{Clock, SystemClock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic scheduling API server");

    let config = AppConfig::from_env();
    let storage_timeout_ms = config.storage.timeout_ms;

    let store = build_store(&config.storage).context("building clinic store")?;
    let dispatcher = build_dispatcher(&config.dispatch).context("building notification dispatcher")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let engine = Arc::new(SchedulingEngine::new(
        &config,
        store.clone(),
        dispatcher,
        Arc::new(FlagVerifier),
        clock.clone(),
    ));
    let doctors = Arc::new(DoctorCellState::new(
        store.clone(),
        clock.clone(),
        storage_timeout_ms,
        config.scheduling.clone(),
        engine.resolver().locks().clone(),
    ));
    let patients = Arc::new(PatientCellState::new(
        store.clone(),
        clock,
        storage_timeout_ms,
        config.risk.high_risk_no_show_count,
    ));

    // Delivery reports, follow-ups and checkpoint recomputation
    let sweeper = Arc::clone(&engine);
    let period = Duration::from_secs(config.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let report = sweeper.run_sweeps().await;
            debug!("Sweep pass: {:?}", report);
        }
    });

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(store, doctors, patients, engine)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await.context("binding listener")?;
    axum::serve(listener, app).await.context("serving HTTP")?;
    Ok(())
}
