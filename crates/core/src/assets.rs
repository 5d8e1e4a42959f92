//! The asset orchestrator: twelve agents fanned out over scoped threads,
//! reconciled into one combined bundle and a terminal progress write.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::thread;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::agents::{inputs, AgentError, AgentKind, ASSET_AGENTS};
use crate::agents::inputs::{AssetContext, DevelopmentalReport, MetadataInputs};
use crate::env::{scope_for, PipelineEnv};
use crate::jobs::AssetJob;
use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::progress::{AgentProgress, AgentState, AssetFailure, AssetProgress, ProgressStore};
use crate::store::{self, keys, ObjectStore, StorageError};

#[derive(Debug, Error)]
pub enum AssetRunError {
    #[error("developmental artifact missing for `{key}`")]
    MissingPrerequisite { key: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The three agents the metadata packager reads from.
const METADATA_DEPENDENCIES: [AgentKind; 3] = [
    AgentKind::BookDescription,
    AgentKind::Categories,
    AgentKind::Keywords,
];

pub struct AssetService<'a> {
    env: &'a PipelineEnv<'a>,
}

impl<'a> AssetService<'a> {
    pub fn new(env: &'a PipelineEnv<'a>) -> Self {
        Self { env }
    }

    /// Drive one asset job to a terminal state. Individual agent failures
    /// become null bundle fields; only orchestrator-level problems (missing
    /// prerequisite, bundle write failure) return Err for redelivery.
    pub fn run(&self, job: &AssetJob) -> Result<(), AssetRunError> {
        match self.run_inner(job) {
            Ok(()) => Ok(()),
            Err(err) => {
                let progress = ProgressStore::new(self.env.store);
                let _ = progress.write_asset(
                    &job.report_id,
                    AssetProgress::failed(pending_map(), err.to_string()),
                );
                self.log(
                    LogLevel::Error,
                    &job.report_id,
                    format!("asset generation failed: {err}"),
                );
                Err(err)
            }
        }
    }

    fn run_inner(&self, job: &AssetJob) -> Result<(), AssetRunError> {
        let developmental_key = keys::developmental_analysis(&job.manuscript_key);
        let developmental: Value = store::get_json(self.env.store, &developmental_key)?
            .ok_or_else(|| AssetRunError::MissingPrerequisite {
                key: developmental_key.clone(),
            })?;
        let developmental = DevelopmentalReport::new(developmental);

        // The raw manuscript is only needed for excerpts and windows;
        // its absence degrades those prompts rather than failing the run.
        let manuscript_text = self
            .env
            .store
            .get(&job.manuscript_key)
            .ok()
            .flatten()
            .map(|object| object.text())
            .unwrap_or_default();

        let progress = ProgressStore::new(self.env.store);
        progress.write_asset(
            &job.report_id,
            AssetProgress::launched(ASSET_AGENTS.iter().map(|kind| kind.name().to_string())),
        )?;
        self.log(
            LogLevel::Info,
            &job.report_id,
            format!("asset generation starting for `{}`", job.manuscript_key),
        );

        let context = AssetContext {
            developmental: &developmental,
            genre: &job.genre,
            manuscript_text: &manuscript_text,
            author_data: &job.author_data,
            series_data: &job.series_data,
        };

        let outcomes = self.fan_out(job, &context);

        let mut bundle = Map::new();
        let mut agents = BTreeMap::new();
        let mut errors = Vec::new();
        for kind in ASSET_AGENTS {
            match outcomes.get(&kind.name().to_string()) {
                Some(Ok(value)) => {
                    bundle.insert(kind.bundle_field().to_string(), value.clone());
                    agents.insert(kind.name().to_string(), AgentProgress::complete());
                }
                Some(Err(reason)) => {
                    bundle.insert(kind.bundle_field().to_string(), Value::Null);
                    agents.insert(kind.name().to_string(), AgentProgress::failed());
                    errors.push(AssetFailure {
                        kind: kind.name().to_string(),
                        error: reason.clone(),
                    });
                }
                None => {
                    // A scoped thread cannot vanish without an outcome, but
                    // account for it as a failure rather than panic.
                    bundle.insert(kind.bundle_field().to_string(), Value::Null);
                    agents.insert(kind.name().to_string(), AgentProgress::failed());
                    errors.push(AssetFailure {
                        kind: kind.name().to_string(),
                        error: "agent produced no outcome".to_string(),
                    });
                }
            }
        }
        bundle.insert(
            "errors".to_string(),
            serde_json::to_value(&errors).unwrap_or(Value::Array(Vec::new())),
        );
        let bundle = Value::Object(bundle);

        store::put_json(
            self.env.store,
            &keys::asset_bundle(&job.manuscript_key),
            &bundle,
            None,
        )?;

        let failed = errors.len();
        progress.write_asset(&job.report_id, AssetProgress::finished(agents, bundle, errors))?;
        self.log(
            LogLevel::Info,
            &job.report_id,
            format!(
                "asset generation finished: {} succeeded, {} failed",
                ASSET_AGENTS.len() - failed,
                failed
            ),
        );
        Ok(())
    }

    /// Launch all twelve agents concurrently and wait for every one to
    /// settle. The metadata agent blocks on a channel fed by its three
    /// dependencies as they finish (success or failure), then runs over
    /// whatever arrived; a failed dependency reads as absent.
    fn fan_out(
        &self,
        job: &AssetJob,
        context: &AssetContext<'_>,
    ) -> BTreeMap<String, Result<Value, String>> {
        let runner = self.env.agent_runner();
        let (dep_tx, dep_rx) = mpsc::channel::<(AgentKind, Option<Value>)>();
        let (result_tx, result_rx) = mpsc::channel::<(AgentKind, Result<Value, AgentError>)>();

        thread::scope(|threads| {
            for kind in ASSET_AGENTS {
                if kind == AgentKind::AudiobookMetadata {
                    continue;
                }
                // Only dependency agents hold a sender, so the metadata
                // barrier opens as soon as those three settle.
                let dep_tx = METADATA_DEPENDENCIES
                    .contains(&kind)
                    .then(|| dep_tx.clone());
                let result_tx = result_tx.clone();
                let runner = &runner;
                threads.spawn(move || {
                    let args = inputs::asset_arguments(kind, context, &MetadataInputs::default());
                    let scope = scope_for(&job.manuscript_key, "assets", kind.name());
                    let outcome = runner.run(kind, &job.manuscript_key, &args, &scope);
                    if let Some(tx) = dep_tx {
                        let _ = tx.send((kind, outcome.as_ref().ok().cloned()));
                    }
                    let _ = result_tx.send((kind, outcome));
                });
            }
            // Close our ends so the channels drain when the workers finish.
            drop(dep_tx);

            let result_tx_meta = result_tx.clone();
            drop(result_tx);
            let runner = &runner;
            threads.spawn(move || {
                let mut dependencies = MetadataInputs::default();
                for (kind, value) in dep_rx.iter() {
                    match kind {
                        AgentKind::BookDescription => dependencies.description = value,
                        AgentKind::Categories => dependencies.categories = value,
                        AgentKind::Keywords => dependencies.keywords = value,
                        _ => {}
                    }
                }
                let kind = AgentKind::AudiobookMetadata;
                let args = inputs::asset_arguments(kind, context, &dependencies);
                let scope = scope_for(&job.manuscript_key, "assets", kind.name());
                let outcome = runner.run(kind, &job.manuscript_key, &args, &scope);
                let _ = result_tx_meta.send((kind, outcome));
            });
        });

        let mut outcomes = BTreeMap::new();
        for (kind, outcome) in result_rx.iter() {
            outcomes.insert(
                kind.name().to_string(),
                outcome.map_err(|err| err.to_string()),
            );
        }
        outcomes
    }

    fn log(&self, level: LogLevel, scope: &str, message: impl Into<String>) {
        self.env.sink.log(LogRecord::new(level, scope, message));
    }
}

fn pending_map() -> BTreeMap<String, AgentProgress> {
    ASSET_AGENTS
        .iter()
        .map(|kind| {
            (
                kind.name().to_string(),
                AgentProgress {
                    status: AgentState::Pending,
                    progress: 0,
                },
            )
        })
        .collect()
}
