//! Job submission: the synchronous entry points the enclosing HTTP layer
//! calls to start a pipeline run.

use rand::Rng;
use serde_json::Value;
use thiserror::Error;

use crate::agents::ASSET_AGENTS;
use crate::jobs::{AnalysisJob, AssetJob};
use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::progress::{AssetProgress, EditorialProgress, ProgressStore};
use crate::queue::{JobQueue, QueueError};
use crate::store::{keys, ObjectMetadata, ObjectStore, StorageError};

pub const REPORT_ID_LEN: usize = 8;
const REPORT_ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("unknown report id `{0}`")]
    UnknownReportId(String),
    #[error("developmental analysis not found for `{key}`; run editorial analysis first")]
    MissingDevelopmental { key: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[derive(Clone, Debug)]
pub struct EditorialRequest {
    pub manuscript_key: String,
    pub genre: String,
    pub style_guide: String,
}

#[derive(Clone, Debug)]
pub struct AssetRequest {
    pub report_id: String,
    pub genre: String,
    pub author_data: Value,
    pub series_data: Value,
}

pub fn mint_report_id() -> String {
    let mut rng = rand::thread_rng();
    (0..REPORT_ID_LEN)
        .map(|_| {
            let index = rng.gen_range(0..REPORT_ID_CHARS.len());
            REPORT_ID_CHARS[index] as char
        })
        .collect()
}

pub struct SubmitService<'a> {
    store: &'a dyn ObjectStore,
    analysis_queue: &'a dyn JobQueue<AnalysisJob>,
    asset_queue: &'a dyn JobQueue<AssetJob>,
    sink: &'a dyn LogSink,
}

impl<'a> SubmitService<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        analysis_queue: &'a dyn JobQueue<AnalysisJob>,
        asset_queue: &'a dyn JobQueue<AssetJob>,
        sink: &'a dyn LogSink,
    ) -> Self {
        Self {
            store,
            analysis_queue,
            asset_queue,
            sink,
        }
    }

    /// Mint a report id, record its mapping, seed the progress record, and
    /// enqueue the editorial job. A fresh id is minted on every call, so
    /// re-analysis of the same manuscript yields independent runs.
    pub fn submit_editorial(&self, request: &EditorialRequest) -> Result<String, SubmitError> {
        let report_id = mint_report_id();

        self.store.put(
            &keys::report_mapping(&report_id),
            request.manuscript_key.clone().into_bytes(),
            ObjectMetadata {
                ttl: Some(keys::REPORT_MAPPING_TTL),
                ..ObjectMetadata::default()
            },
        )?;

        let progress = ProgressStore::new(self.store);
        progress.write_editorial(&report_id, EditorialProgress::queued())?;

        self.analysis_queue.publish(AnalysisJob {
            manuscript_key: request.manuscript_key.clone(),
            genre: request.genre.clone(),
            style_guide: request.style_guide.clone(),
            report_id: report_id.clone(),
        })?;

        self.sink.log(LogRecord::new(
            LogLevel::Info,
            &report_id,
            format!("editorial job queued for `{}`", request.manuscript_key),
        ));
        Ok(report_id)
    }

    /// Enqueue asset generation for an existing report. Fails fast when the
    /// developmental artifact is absent rather than queueing a job that can
    /// only bounce.
    pub fn submit_assets(&self, request: &AssetRequest) -> Result<(), SubmitError> {
        let manuscript_key = self
            .resolve(&request.report_id)?
            .ok_or_else(|| SubmitError::UnknownReportId(request.report_id.clone()))?;

        let developmental_key = keys::developmental_analysis(&manuscript_key);
        if self.store.get(&developmental_key)?.is_none() {
            return Err(SubmitError::MissingDevelopmental {
                key: manuscript_key,
            });
        }

        let progress = ProgressStore::new(self.store);
        progress.write_asset(
            &request.report_id,
            AssetProgress::queued(ASSET_AGENTS.iter().map(|kind| kind.name().to_string())),
        )?;

        self.asset_queue.publish(AssetJob {
            manuscript_key: manuscript_key.clone(),
            report_id: request.report_id.clone(),
            genre: request.genre.clone(),
            author_data: request.author_data.clone(),
            series_data: request.series_data.clone(),
        })?;

        self.sink.log(LogRecord::new(
            LogLevel::Info,
            &request.report_id,
            format!("asset job queued for `{manuscript_key}`"),
        ));
        Ok(())
    }

    /// Resolve a report id to its manuscript key, honoring the mapping TTL.
    pub fn resolve(&self, report_id: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .store
            .get(&keys::report_mapping(report_id))?
            .map(|object| object.text()))
    }
}
