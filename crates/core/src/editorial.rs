//! The editorial orchestrator: three strictly ordered phases over one
//! manuscript, with progress published at every boundary and ticked while an
//! agent is in flight.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::agents::{inputs, AgentError, AgentKind};
use crate::env::{scope_for, PipelineEnv};
use crate::jobs::{AnalysisJob, AssetJob};
use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::manuscript::{ManuscriptDirectory, ManuscriptStatus};
use crate::progress::{EditorialProgress, ProgressStore};
use crate::queue::JobQueue;
use crate::store::{ObjectStore, StorageError};

/// Tick cadence while an agent call is in flight.
const TICK_INTERVAL: Duration = Duration::from_secs(2);
/// How often the ticker checks whether its phase has settled.
const TICK_DRAIN: Duration = Duration::from_millis(100);
/// Progress points added per tick.
const TICK_STEP: u8 = 2;

#[derive(Debug, Error)]
pub enum EditorialError {
    #[error("manuscript object `{key}` is missing")]
    MissingManuscript { key: String },
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The three phases and their progress bands. Boundary writes land at each
/// band's floor; ticks advance toward the cap without crossing it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Developmental,
    LineEditing,
    CopyEditing,
}

const PHASES: [Phase; 3] = [Phase::Developmental, Phase::LineEditing, Phase::CopyEditing];

impl Phase {
    fn agent(&self) -> AgentKind {
        match self {
            Phase::Developmental => AgentKind::Developmental,
            Phase::LineEditing => AgentKind::LineEditing,
            Phase::CopyEditing => AgentKind::CopyEditing,
        }
    }

    fn band(&self) -> (u8, u8) {
        match self {
            Phase::Developmental => (5, 30),
            Phase::LineEditing => (33, 63),
            Phase::CopyEditing => (66, 98),
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Phase::Developmental => "Running developmental analysis",
            Phase::LineEditing => "Running line editing analysis",
            Phase::CopyEditing => "Running copy editing analysis",
        }
    }
}

pub struct EditorialService<'a> {
    env: &'a PipelineEnv<'a>,
    asset_queue: &'a dyn JobQueue<AssetJob>,
}

impl<'a> EditorialService<'a> {
    pub fn new(env: &'a PipelineEnv<'a>, asset_queue: &'a dyn JobQueue<AssetJob>) -> Self {
        Self { env, asset_queue }
    }

    /// Drive one analysis job to a terminal state. An Err return signals the
    /// queue to redeliver; all artifacts are keyed by manuscript, so a rerun
    /// overwrites cleanly.
    pub fn run(&self, job: &AnalysisJob) -> Result<(), EditorialError> {
        self.log(
            LogLevel::Info,
            &job.report_id,
            format!("editorial analysis starting for `{}`", job.manuscript_key),
        );
        self.env
            .manuscripts
            .set_status(&job.manuscript_key, ManuscriptStatus::Analyzing);

        match self.run_phases(job) {
            Ok(()) => {
                let progress = ProgressStore::new(self.env.store);
                progress.write_editorial(&job.report_id, EditorialProgress::complete())?;
                self.env
                    .manuscripts
                    .set_status(&job.manuscript_key, ManuscriptStatus::Complete);
                self.enqueue_assets(job);
                self.log(
                    LogLevel::Info,
                    &job.report_id,
                    "editorial analysis complete",
                );
                Ok(())
            }
            Err(err) => {
                let progress = ProgressStore::new(self.env.store);
                let _ = progress
                    .write_editorial(&job.report_id, EditorialProgress::failed(err.to_string()));
                self.env
                    .manuscripts
                    .set_status(&job.manuscript_key, ManuscriptStatus::Failed);
                self.log(
                    LogLevel::Error,
                    &job.report_id,
                    format!("editorial analysis failed: {err}"),
                );
                Err(err)
            }
        }
    }

    fn run_phases(&self, job: &AnalysisJob) -> Result<(), EditorialError> {
        let manuscript = self
            .env
            .store
            .get(&job.manuscript_key)?
            .ok_or_else(|| EditorialError::MissingManuscript {
                key: job.manuscript_key.clone(),
            })?;
        let text = manuscript.text();

        for phase in PHASES {
            self.run_phase(job, phase, &text)?;
        }
        Ok(())
    }

    fn run_phase(&self, job: &AnalysisJob, phase: Phase, text: &str) -> Result<Value, EditorialError> {
        let kind = phase.agent();
        let (floor, cap) = phase.band();
        let progress = ProgressStore::new(self.env.store);

        progress.write_editorial(
            &job.report_id,
            EditorialProgress::processing(floor, phase.message(), kind.name()),
        )?;

        let args = inputs::editorial_arguments(kind, &job.genre, &job.style_guide, text);
        let scope = scope_for(&job.manuscript_key, "editorial", kind.name());
        let runner = self.env.agent_runner();

        let settled = AtomicBool::new(false);
        let current = AtomicU8::new(floor);

        let outcome = thread::scope(|threads| {
            let ticker = threads.spawn(|| {
                // Advance 2 points every 2 seconds while the agent runs,
                // never reaching the band cap; drain on a 100 ms poll so a
                // finished phase is noticed promptly.
                let polls_per_tick = (TICK_INTERVAL.as_millis() / TICK_DRAIN.as_millis()) as u32;
                loop {
                    for _ in 0..polls_per_tick {
                        if settled.load(Ordering::SeqCst) {
                            return;
                        }
                        thread::sleep(TICK_DRAIN);
                    }
                    let next = current.load(Ordering::SeqCst).saturating_add(TICK_STEP).min(cap);
                    current.store(next, Ordering::SeqCst);
                    let record =
                        EditorialProgress::processing(next, phase.message(), kind.name());
                    if let Err(err) = progress.write_editorial(&job.report_id, record) {
                        self.log(
                            LogLevel::Warn,
                            &job.report_id,
                            format!("progress tick failed: {err}"),
                        );
                    }
                }
            });

            let result = runner.run(kind, &job.manuscript_key, &args, &scope);
            settled.store(true, Ordering::SeqCst);
            let _ = ticker.join();
            result
        });

        Ok(outcome?)
    }

    /// Editorial artifacts are the contractual output; a publish failure
    /// here must not fail the job. Asset generation can be re-triggered
    /// through the submission interface.
    fn enqueue_assets(&self, job: &AnalysisJob) {
        let (author_data, series_data) = self.job_side_data(&job.manuscript_key);
        let asset_job = AssetJob {
            manuscript_key: job.manuscript_key.clone(),
            report_id: job.report_id.clone(),
            genre: job.genre.clone(),
            author_data,
            series_data,
        };
        if let Err(err) = self.asset_queue.publish(asset_job) {
            self.log(
                LogLevel::Error,
                &job.report_id,
                format!("failed to enqueue asset generation: {err}"),
            );
        }
    }

    /// Author and series details ride as custom metadata on the manuscript
    /// object; absent or unreadable values degrade to null.
    fn job_side_data(&self, manuscript_key: &str) -> (Value, Value) {
        let Ok(Some(object)) = self.env.store.get(manuscript_key) else {
            return (Value::Null, Value::Null);
        };
        let read = |field: &str| {
            object
                .metadata
                .custom
                .get(field)
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or(Value::Null)
        };
        (read("authorData"), read("seriesData"))
    }

    fn log(&self, level: LogLevel, scope: &str, message: impl Into<String>) {
        self.env.sink.log(LogRecord::new(level, scope, message));
    }
}
