#![allow(dead_code)]
#[macro_use]
mod macros;

mod actions;
mod analysis;
mod autonomous;
mod blob;
mod classify;
mod db_core;
mod error;
mod llm;
mod mail;
mod memory;
mod model;
mod pipeline;
mod rate_limiters;
mod realtime;
mod reasoning;
mod retrain;
mod retry;
mod routes;
mod server_config;

use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use axum::{extract::FromRef, Router};
use blob::{BlobStoreHandle, FsBlobStore};
use classify::ModelStore;
use futures::future::join_all;
use llm::{LlmHandle, MistralClient};
use mimalloc::MiMalloc;
use pipeline::ActivePipelineMap;
use rate_limiters::RateLimiters;
use realtime::Broadcaster;
use routes::AppRouter;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use server_config::cfg;
use tokio::{signal, task::JoinHandle};
use tokio_cron_scheduler::JobScheduler;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;

#[derive(Clone, FromRef)]
pub struct ServerState {
    http_client: HttpClient,
    conn: DatabaseConnection,
    rate_limiters: RateLimiters,
    broadcaster: Broadcaster,
    model_store: ModelStore,
    blob_store: BlobStoreHandle,
    llm: LlmHandle,
    active_pipelines: ActivePipelineMap,
}

/// One background cycle: retraining first so a freshly fitted model serves
/// the pipeline runs that follow, then every user's inbox.
async fn run_sync_cycle(state: ServerState) -> error::AppResult<()> {
    if let Err(e) = retrain::maybe_retrain(state.clone()).await {
        tracing::error!("Retrain check failed: {:?}", e);
    }

    pipeline::process_all_inboxes(state).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_env("RUST_LOG"))
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL is not set in .env file");
    let mut db_options = ConnectOptions::new(db_url);
    db_options.sqlx_logging(false);

    let conn = Database::connect(db_options)
        .await
        .expect("Database connection failed");

    let http_client = reqwest::ClientBuilder::new().use_rustls_tls().build()?;
    let rate_limiters = RateLimiters::from_config();
    let blob_store: BlobStoreHandle = Arc::new(FsBlobStore::new(cfg.blob_root.clone()));
    let llm: LlmHandle = Arc::new(MistralClient::new(http_client.clone(), rate_limiters.clone()));

    let state = ServerState {
        http_client,
        conn: conn.clone(),
        rate_limiters,
        broadcaster: Broadcaster::new(conn),
        model_store: ModelStore::empty(),
        blob_store,
        llm,
        active_pipelines: ActivePipelineMap::new(),
    };

    match state.model_store.load(&state.blob_store).await {
        Ok(true) => tracing::info!("Classifier loaded from blob store"),
        Ok(false) => tracing::info!("No classifier artifacts yet"),
        Err(e) => tracing::error!("Classifier load failed: {:?}", e),
    }

    let router = AppRouter::create(state.clone());

    let mut scheduler = JobScheduler::new()
        .await
        .expect("Failed to create scheduler");

    {
        // Catch up immediately at startup, then steady-state on cron ticks.
        let state_clone = state.clone();
        scheduler
            .add(tokio_cron_scheduler::Job::new_one_shot_async(
                Duration::from_secs(5),
                move |uuid, _l| {
                    let state = state_clone.clone();
                    Box::pin(async move {
                        tracing::info!("Running startup sync job {}", uuid);
                        match run_sync_cycle(state).await {
                            Ok(_) => tracing::info!("Startup sync job {} succeeded", uuid),
                            Err(e) => tracing::error!("Startup sync failed: {:?}", e),
                        }
                    })
                },
            )?)
            .await?;

        let state_clone = state.clone();
        schedule_job!(
            scheduler,
            "inbox_sync",
            "0 */5 * * * *",
            run_sync_cycle,
            state_clone
        );

        let state_clone = state.clone();
        schedule_job!(
            scheduler,
            "action_worker",
            "*/30 * * * * *",
            actions::drain_pending_actions,
            state_clone
        );

        let state_clone = state.clone();
        schedule_job!(
            scheduler,
            "autonomous_tasks",
            "0 2/5 * * * *",
            autonomous::run_autonomous_tasks,
            state_clone
        );
    }

    scheduler.shutdown_on_ctrl_c();

    scheduler.set_shutdown_handler(Box::new(move || {
        Box::pin(async move {
            tracing::info!("Shutting down scheduler");
        })
    }));

    match scheduler.start().await {
        Ok(_) => {
            tracing::info!("Scheduler started");
        }
        Err(e) => {
            tracing::error!("Failed to start scheduler: {:?}", e);
        }
    }

    // Handle Ctrl+C
    let shutdown_handle = {
        tokio::spawn(async move {
            if env::var("NO_SHUTDOWN").unwrap_or("false".to_string()) == "true" {
                return;
            }
            signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
            tracing::info!("Received Ctrl+C, shutting down");
            std::process::exit(0);
        })
    };

    join_all(vec![run_server(router), shutdown_handle]).await;

    Ok(())
}

fn run_server(router: Router) -> JoinHandle<()> {
    tokio::spawn(async {
        let port = env::var("PORT").unwrap_or("5006".to_string());
        tracing::info!("Mailsense agent running on http://0.0.0.0:{}", port);

        let addr = SocketAddr::from(([0, 0, 0, 0], port.parse::<u16>().unwrap()));
        tracing::debug!("listening on {addr}");
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        axum::serve(listener, router).await.unwrap();
    })
}
