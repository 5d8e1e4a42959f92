use std::sync::Arc;

use galley_core::config::Config;
use galley_core::jobs::{AnalysisJob, AssetJob};
use galley_core::logging::{LogLevel, LogRecord, LogSink};
use galley_core::manuscript::MemoryManuscriptDirectory;
use galley_core::cost::MemoryCostLedger;
use galley_core::progress::ProgressStore;
use galley_core::prompts::PromptRegistry;
use galley_core::queue::MemoryQueue;
use galley_core::store::FsObjectStore;
use galley_core::submit::SubmitService;
use galley_adapters::AnthropicModel;

/// Bridges pipeline log records onto the server's tracing subscriber.
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, record: LogRecord) {
        match record.level {
            LogLevel::Debug => tracing::debug!(scope = %record.scope, "{}", record.message),
            LogLevel::Info => tracing::info!(scope = %record.scope, "{}", record.message),
            LogLevel::Warn => tracing::warn!(scope = %record.scope, "{}", record.message),
            LogLevel::Error => tracing::error!(scope = %record.scope, "{}", record.message),
        }
    }
}

/// Everything the handlers and workers share. Handlers borrow through
/// short-lived service values; workers rebuild a `PipelineEnv` per job.
pub struct Shared {
    pub config: Config,
    pub store: FsObjectStore,
    pub costs: MemoryCostLedger,
    pub manuscripts: MemoryManuscriptDirectory,
    pub sink: Arc<dyn LogSink>,
    pub prompts: PromptRegistry,
    pub model: AnthropicModel,
    pub analysis_queue: Arc<MemoryQueue<AnalysisJob>>,
    pub asset_queue: Arc<MemoryQueue<AssetJob>>,
}

impl Shared {
    pub fn progress(&self) -> ProgressStore<'_> {
        ProgressStore::new(&self.store)
    }

    pub fn submit(&self) -> SubmitService<'_> {
        SubmitService::new(
            &self.store,
            self.analysis_queue.as_ref(),
            self.asset_queue.as_ref(),
            self.sink.as_ref(),
        )
    }
}

/// Shared application context passed to all handlers. Clone is cheap; the
/// state itself lives behind one Arc.
#[derive(Clone)]
pub struct AppContext {
    pub shared: Arc<Shared>,
}
