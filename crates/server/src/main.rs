//! galley-server: hosts the pipeline workers and the minimal HTTP surface
//! (progress reads, bundle read, submission).

mod handlers;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use galley_adapters::AnthropicModel;
use galley_core::config::Config;
use galley_core::cost::MemoryCostLedger;
use galley_core::editorial::EditorialService;
use galley_core::assets::AssetService;
use galley_core::env::PipelineEnv;
use galley_core::jobs::{AnalysisJob, AssetJob};
use galley_core::manuscript::MemoryManuscriptDirectory;
use galley_core::model::ThreadSleeper;
use galley_core::prompts::PromptRegistry;
use galley_core::queue::{spawn_worker, MemoryQueue, WorkerHandle};
use galley_core::store::FsObjectStore;

use crate::state::{AppContext, Shared, TracingLogSink};

const ANALYSIS_QUEUE: &str = "analysis";
const ASSET_QUEUE: &str = "assets";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    config.require_api_key()?;

    let data_dir = std::env::var("GALLEY_DATA_DIR").unwrap_or_else(|_| "galley-data".to_string());
    let store = FsObjectStore::open(PathBuf::from(&data_dir))?;
    let model = AnthropicModel::from_settings(&config.llm)?;
    let prompts = PromptRegistry::from_prompt_config(&config.prompts)?;

    let analysis_queue = Arc::new(MemoryQueue::<AnalysisJob>::new(
        ANALYSIS_QUEUE,
        config.queue.max_attempts,
    ));
    let asset_queue = Arc::new(MemoryQueue::<AssetJob>::new(
        ASSET_QUEUE,
        config.queue.max_attempts,
    ));

    let shared = Arc::new(Shared {
        config,
        store,
        costs: MemoryCostLedger::new(),
        manuscripts: MemoryManuscriptDirectory::new(),
        sink: Arc::new(TracingLogSink),
        prompts,
        model,
        analysis_queue,
        asset_queue,
    });

    // Worker handles stop and join their threads on drop; keep them alive
    // for the life of the server.
    let _workers = spawn_pipeline_workers(Arc::clone(&shared));

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/analyze", post(handlers::submit_analysis))
        .route("/analyze/status", get(handlers::editorial_status))
        .route("/assets", get(handlers::asset_bundle))
        .route("/assets", post(handlers::submit_assets))
        .route("/assets/status", get(handlers::asset_status))
        .layer(CorsLayer::permissive())
        .with_state(AppContext { shared });

    let port: u16 = std::env::var("GALLEY_PORT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(8098);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("galley-server listening on {addr}, data dir `{data_dir}`");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// One consumer thread per queue. Long jobs are expected: a full editorial
/// pass can spend minutes inside model calls and back-off sleeps.
fn spawn_pipeline_workers(shared: Arc<Shared>) -> [WorkerHandle; 2] {
    let editorial_shared = Arc::clone(&shared);
    let editorial = spawn_worker(
        Arc::clone(&shared.analysis_queue),
        Arc::clone(&shared.sink),
        move |job: &AnalysisJob, _attempt| {
            let s = editorial_shared.as_ref();
            let sleeper = ThreadSleeper;
            let env = PipelineEnv {
                model: &s.model,
                store: &s.store,
                costs: &s.costs,
                manuscripts: &s.manuscripts,
                sink: s.sink.as_ref(),
                sleeper: &sleeper,
                prompts: &s.prompts,
                pricing: &s.config.pricing,
                model_name: &s.config.llm.model,
            };
            EditorialService::new(&env, s.asset_queue.as_ref()).run(job)
        },
    );

    let asset_shared = Arc::clone(&shared);
    let assets = spawn_worker(
        Arc::clone(&shared.asset_queue),
        Arc::clone(&shared.sink),
        move |job: &AssetJob, _attempt| {
            let s = asset_shared.as_ref();
            let sleeper = ThreadSleeper;
            let env = PipelineEnv {
                model: &s.model,
                store: &s.store,
                costs: &s.costs,
                manuscripts: &s.manuscripts,
                sink: s.sink.as_ref(),
                sleeper: &sleeper,
                prompts: &s.prompts,
                pricing: &s.config.pricing,
                model_name: &s.config.llm.model,
            };
            AssetService::new(&env).run(job)
        },
    );

    [editorial, assets]
}
