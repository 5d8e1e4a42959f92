use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::store::{self, keys, ObjectStore, StorageError};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Queued,
    Processing,
    Partial,
    Complete,
    Failed,
}

impl ProgressStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressStatus::Partial | ProgressStatus::Complete | ProgressStatus::Failed
        )
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Pending,
    Running,
    Complete,
    Failed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AgentProgress {
    pub status: AgentState,
    pub progress: u8,
}

impl AgentProgress {
    pub fn running() -> Self {
        Self {
            status: AgentState::Running,
            progress: 10,
        }
    }

    pub fn complete() -> Self {
        Self {
            status: AgentState::Complete,
            progress: 100,
        }
    }

    pub fn failed() -> Self {
        Self {
            status: AgentState::Failed,
            progress: 100,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetFailure {
    #[serde(rename = "type")]
    pub kind: String,
    pub error: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EditorialProgress {
    pub status: ProgressStatus,
    pub progress: u8,
    pub message: String,
    pub current_step: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EditorialProgress {
    pub fn queued() -> Self {
        Self {
            status: ProgressStatus::Queued,
            progress: 0,
            message: "Waiting for an analysis worker".to_string(),
            current_step: "queued".to_string(),
            updated_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn processing(progress: u8, message: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            status: ProgressStatus::Processing,
            progress,
            message: message.into(),
            current_step: step.into(),
            updated_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn complete() -> Self {
        let now = Utc::now();
        Self {
            status: ProgressStatus::Complete,
            progress: 100,
            message: "Editorial analysis complete".to_string(),
            current_step: "complete".to_string(),
            updated_at: now,
            completed_at: Some(now),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let now = Utc::now();
        let error = error.into();
        Self {
            status: ProgressStatus::Failed,
            progress: 100,
            message: "Editorial analysis failed".to_string(),
            current_step: "failed".to_string(),
            updated_at: now,
            completed_at: Some(now),
            error: Some(error),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetProgress {
    pub status: ProgressStatus,
    pub progress: u8,
    pub message: String,
    pub agents: BTreeMap<String, AgentProgress>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Present only on the terminal write: the combined bundle inline so a
    /// polling client needs no second fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<AssetFailure>,
}

impl AssetProgress {
    pub fn queued(agent_names: impl IntoIterator<Item = String>) -> Self {
        let agents = agent_names
            .into_iter()
            .map(|name| {
                (
                    name,
                    AgentProgress {
                        status: AgentState::Pending,
                        progress: 0,
                    },
                )
            })
            .collect();
        Self {
            status: ProgressStatus::Queued,
            progress: 0,
            message: "Waiting for an asset worker".to_string(),
            agents,
            updated_at: Utc::now(),
            completed_at: None,
            error: None,
            assets: None,
            errors: Vec::new(),
        }
    }

    pub fn launched(agent_names: impl IntoIterator<Item = String>) -> Self {
        let agents = agent_names
            .into_iter()
            .map(|name| (name, AgentProgress::running()))
            .collect();
        Self {
            status: ProgressStatus::Processing,
            progress: 10,
            message: "Generating marketing and audiobook assets".to_string(),
            agents,
            updated_at: Utc::now(),
            completed_at: None,
            error: None,
            assets: None,
            errors: Vec::new(),
        }
    }

    pub fn finished(
        agents: BTreeMap<String, AgentProgress>,
        bundle: serde_json::Value,
        errors: Vec<AssetFailure>,
    ) -> Self {
        let now = Utc::now();
        let status = if errors.is_empty() {
            ProgressStatus::Complete
        } else {
            ProgressStatus::Partial
        };
        let message = if errors.is_empty() {
            "All assets generated".to_string()
        } else {
            format!("{} of {} assets generated", agents.len() - errors.len(), agents.len())
        };
        Self {
            status,
            progress: 100,
            message,
            agents,
            updated_at: now,
            completed_at: Some(now),
            error: None,
            assets: Some(bundle),
            errors,
        }
    }

    pub fn failed(agents: BTreeMap<String, AgentProgress>, error: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            status: ProgressStatus::Failed,
            progress: 100,
            message: "Asset generation failed".to_string(),
            agents,
            updated_at: now,
            completed_at: Some(now),
            error: Some(error.into()),
            assets: None,
            errors: Vec::new(),
        }
    }
}

trait Guarded {
    fn status(&self) -> ProgressStatus;
    fn progress(&self) -> u8;
    fn set_progress(&mut self, progress: u8);
}

impl Guarded for EditorialProgress {
    fn status(&self) -> ProgressStatus {
        self.status
    }
    fn progress(&self) -> u8 {
        self.progress
    }
    fn set_progress(&mut self, progress: u8) {
        self.progress = progress;
    }
}

impl Guarded for AssetProgress {
    fn status(&self) -> ProgressStatus {
        self.status
    }
    fn progress(&self) -> u8 {
        self.progress
    }
    fn set_progress(&mut self, progress: u8) {
        self.progress = progress;
    }
}

/// Progress reads and writes for one report id. Writes enforce two
/// invariants: a terminal status is never replaced by a non-terminal one,
/// and the published progress value never decreases.
pub struct ProgressStore<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> ProgressStore<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    pub fn write_editorial(
        &self,
        report_id: &str,
        record: EditorialProgress,
    ) -> Result<(), StorageError> {
        self.write_guarded(&keys::editorial_status(report_id), record)
    }

    pub fn read_editorial(&self, report_id: &str) -> Result<Option<EditorialProgress>, StorageError> {
        store::get_json(self.store, &keys::editorial_status(report_id))
    }

    pub fn write_asset(&self, report_id: &str, record: AssetProgress) -> Result<(), StorageError> {
        self.write_guarded(&keys::asset_status(report_id), record)
    }

    pub fn read_asset(&self, report_id: &str) -> Result<Option<AssetProgress>, StorageError> {
        store::get_json(self.store, &keys::asset_status(report_id))
    }

    fn write_guarded<T>(&self, key: &str, mut record: T) -> Result<(), StorageError>
    where
        T: Guarded + Serialize + DeserializeOwned,
    {
        if let Some(existing) = store::get_json::<T>(self.store, key)? {
            if existing.status().is_terminal() && !record.status().is_terminal() {
                return Ok(());
            }
            if record.progress() < existing.progress() && !record.status().is_terminal() {
                record.set_progress(existing.progress());
            }
        }
        store::put_json(self.store, key, &record, Some(keys::PROGRESS_TTL))
    }
}
