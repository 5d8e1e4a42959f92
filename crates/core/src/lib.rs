pub mod agents;
pub mod assets;
pub mod config;
pub mod cost;
pub mod editorial;
pub mod env;
pub mod jobs;
pub mod llm;
pub mod logging;
pub mod manuscript;
pub mod model;
pub mod progress;
pub mod prompts;
pub mod queue;
pub mod store;
pub mod submit;

pub use agents::{AgentError, AgentKind, AgentRunner, ASSET_AGENTS, EDITORIAL_AGENTS};
pub use assets::{AssetRunError, AssetService};
pub use config::{Config, ConfigError, ConfigStore, ModelRates, PricingTable};
pub use cost::{CallScope, CostRecord, CostSink, MemoryCostLedger, NullCostSink};
pub use editorial::{EditorialError, EditorialService};
pub use env::PipelineEnv;
pub use jobs::{AnalysisJob, AssetJob};
pub use llm::{CallSpec, LlmError, LlmRunner, RuleViolation};
pub use logging::{LogLevel, LogRecord, LogSink, MemoryLogSink, NullLogSink, StdoutLogSink};
pub use manuscript::{
    ManuscriptDirectory, ManuscriptStatus, MemoryManuscriptDirectory, NullManuscriptDirectory,
};
pub use model::{
    ChatModel, ModelCallError, ModelReply, ModelRequest, RecordingSleeper, Sleeper,
    TemperaturePreset, ThreadSleeper, TokenUsage,
};
pub use progress::{
    AgentProgress, AgentState, AssetFailure, AssetProgress, EditorialProgress, ProgressStatus,
    ProgressStore,
};
pub use prompts::{PromptArguments, PromptError, PromptRegistry};
pub use queue::{spawn_worker, Delivery, JobQueue, MemoryQueue, QueueError, WorkerHandle};
pub use store::{
    FsObjectStore, MemoryObjectStore, ObjectMetadata, ObjectStore, StorageError, StoredObject,
};
pub use submit::{AssetRequest, EditorialRequest, SubmitError, SubmitService};
