//! galley: drive a full analysis pipeline against a manuscript file on
//! disk, or query the records of a previous run.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use galley_adapters::{AdapterError, AnthropicModel};
use galley_core::assets::AssetService;
use galley_core::config::{Config, ConfigError, ConfigStore};
use galley_core::cost::MemoryCostLedger;
use galley_core::editorial::EditorialService;
use galley_core::env::PipelineEnv;
use galley_core::jobs::{AnalysisJob, AssetJob};
use galley_core::logging::StdoutLogSink;
use galley_core::manuscript::MemoryManuscriptDirectory;
use galley_core::model::ThreadSleeper;
use galley_core::progress::ProgressStore;
use galley_core::prompts::{PromptError, PromptRegistry};
use galley_core::queue::MemoryQueue;
use galley_core::store::{self, keys, FsObjectStore, ObjectMetadata, ObjectStore, StorageError};
use galley_core::submit::{EditorialRequest, SubmitError, SubmitService};

#[derive(Debug, Error)]
enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),
    #[error("prompt error: {0}")]
    Prompt(#[from] PromptError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("submission error: {0}")]
    Submit(#[from] SubmitError),
    #[error("editorial analysis failed: {0}")]
    Editorial(#[from] galley_core::editorial::EditorialError),
    #[error("asset generation failed: {0}")]
    Assets(#[from] galley_core::assets::AssetRunError),
    #[error("io error at `{path}`: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0}")]
    Custom(String),
}

#[derive(Parser)]
#[command(name = "galley", about = "Manuscript analysis pipeline")]
struct Cli {
    /// Config file (JSON); environment variables override it.
    #[arg(long, default_value = "galley.json")]
    config: PathBuf,
    /// Object store directory for pipeline artifacts.
    #[arg(long, default_value = "galley-data")]
    data_dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run editorial analysis and asset generation over a manuscript file.
    Analyze(AnalyzeArgs),
    /// Print the progress records for a report id.
    Status(ReportArgs),
    /// Print the combined asset bundle for a report id.
    Assets(ReportArgs),
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Manuscript file (plain text).
    file: PathBuf,
    #[arg(long)]
    genre: String,
    #[arg(long, default_value = "chicago")]
    style_guide: String,
    /// Skip the twelve-agent asset fan-out after the editorial pass.
    #[arg(long)]
    no_assets: bool,
}

#[derive(Args)]
struct ReportArgs {
    report_id: String,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => run_analyze(&cli.config, &cli.data_dir, args),
        Command::Status(args) => run_status(&cli.data_dir, args),
        Command::Assets(args) => run_assets(&cli.data_dir, args),
    }
}

fn load_config(path: &Path) -> Result<Config, CliError> {
    let store = ConfigStore::open(path.to_path_buf())?;
    let mut config = store.config().clone();
    config.apply_env();
    config.require_api_key()?;
    Ok(config)
}

fn run_analyze(config_path: &Path, data_dir: &Path, args: AnalyzeArgs) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let store = FsObjectStore::open(data_dir.to_path_buf())?;
    let sink = StdoutLogSink::new();

    let bytes = fs::read(&args.file).map_err(|source| CliError::Io {
        path: args.file.clone(),
        source,
    })?;
    let file_name = args
        .file
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| CliError::Custom(format!("`{}` has no file name", args.file.display())))?;
    let stem = args
        .file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("manuscript");
    let manuscript_key = format!("local/{stem}/{file_name}");
    store.put(&manuscript_key, bytes, ObjectMetadata::default())?;

    let model = AnthropicModel::from_settings(&config.llm)?;
    let prompts = PromptRegistry::from_prompt_config(&config.prompts)?;
    let costs = MemoryCostLedger::new();
    let manuscripts = MemoryManuscriptDirectory::new();
    let sleeper = ThreadSleeper;

    let analysis_queue = MemoryQueue::<AnalysisJob>::new("analysis", config.queue.max_attempts);
    let asset_queue = MemoryQueue::<AssetJob>::new("assets", config.queue.max_attempts);

    let submit = SubmitService::new(&store, &analysis_queue, &asset_queue, &sink);
    let report_id = submit.submit_editorial(&EditorialRequest {
        manuscript_key: manuscript_key.clone(),
        genre: args.genre.clone(),
        style_guide: args.style_guide.clone(),
    })?;
    println!("report id: {report_id}");

    let env = PipelineEnv {
        model: &model,
        store: &store,
        costs: &costs,
        manuscripts: &manuscripts,
        sink: &sink,
        sleeper: &sleeper,
        prompts: &prompts,
        pricing: &config.pricing,
        model_name: &config.llm.model,
    };

    // The CLI is its own worker: drain each queue inline instead of
    // spawning consumer threads.
    let delivery = analysis_queue
        .next_timeout(Duration::from_millis(100))
        .ok_or_else(|| CliError::Custom("editorial job was not queued".to_string()))?;
    EditorialService::new(&env, &asset_queue).run(&delivery.job)?;

    if args.no_assets {
        println!("editorial analysis complete (asset generation skipped)");
    } else if let Some(delivery) = asset_queue.next_timeout(Duration::from_millis(100)) {
        AssetService::new(&env).run(&delivery.job)?;
        println!("asset bundle: {}", keys::asset_bundle(&manuscript_key));
    }

    let spent = costs.total_for_manuscript(
        manuscript_key
            .split('/')
            .nth(1)
            .unwrap_or(manuscript_key.as_str()),
    );
    println!("model spend: ${spent:.4}");
    println!("done. poll with: galley status {report_id}");
    Ok(())
}

fn run_status(data_dir: &Path, args: ReportArgs) -> Result<(), CliError> {
    let store = FsObjectStore::open(data_dir.to_path_buf())?;
    let progress = ProgressStore::new(&store);

    match progress.read_editorial(&args.report_id)? {
        Some(record) => println!(
            "editorial: {}",
            serde_json::to_string_pretty(&record).unwrap_or_default()
        ),
        None => println!("editorial: not_started"),
    }
    match progress.read_asset(&args.report_id)? {
        Some(record) => println!(
            "assets: {}",
            serde_json::to_string_pretty(&record).unwrap_or_default()
        ),
        None => println!("assets: not_started"),
    }
    Ok(())
}

fn run_assets(data_dir: &Path, args: ReportArgs) -> Result<(), CliError> {
    let store = FsObjectStore::open(data_dir.to_path_buf())?;
    let sink = StdoutLogSink::new();
    let analysis_queue = MemoryQueue::<AnalysisJob>::new("analysis", 1);
    let asset_queue = MemoryQueue::<AssetJob>::new("assets", 1);
    let submit = SubmitService::new(&store, &analysis_queue, &asset_queue, &sink);

    let manuscript_key = submit
        .resolve(&args.report_id)?
        .ok_or_else(|| CliError::Custom(format!("unknown report id `{}`", args.report_id)))?;
    let bundle: Option<serde_json::Value> =
        store::get_json(&store, &keys::asset_bundle(&manuscript_key))?;
    match bundle {
        Some(bundle) => println!("{}", serde_json::to_string_pretty(&bundle).unwrap_or_default()),
        None => println!("asset bundle not written yet"),
    }
    Ok(())
}
