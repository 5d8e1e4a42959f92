use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManuscriptStatus {
    Uploaded,
    Analyzing,
    Complete,
    Failed,
}

impl ManuscriptStatus {
    /// Status transitions form a DAG with one sanctioned back-edge: any
    /// settled state may return to `analyzing` through explicit re-analysis.
    pub fn can_transition(self, next: ManuscriptStatus) -> bool {
        use ManuscriptStatus::*;
        match (self, next) {
            (Uploaded, Analyzing) => true,
            (Analyzing, Complete) | (Analyzing, Failed) => true,
            (Complete, Analyzing) | (Failed, Analyzing) => true,
            (a, b) => a == b,
        }
    }
}

/// The externally owned manuscript row. The pipeline mutates `status` only;
/// every other field is set by the upload path.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManuscriptRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub genre: String,
    pub object_key: String,
    pub total_size: u64,
    pub status: ManuscriptStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Seam to the surrounding application's manuscript table. The pipeline
/// resolves rows by object key because that is what jobs carry.
pub trait ManuscriptDirectory: Send + Sync {
    fn set_status(&self, object_key: &str, status: ManuscriptStatus);
    fn status_of(&self, object_key: &str) -> Option<ManuscriptStatus>;
}

#[derive(Default)]
pub struct MemoryManuscriptDirectory {
    statuses: Mutex<BTreeMap<String, ManuscriptStatus>>,
}

impl MemoryManuscriptDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, object_key: impl Into<String>, status: ManuscriptStatus) {
        if let Ok(mut guard) = self.statuses.lock() {
            guard.insert(object_key.into(), status);
        }
    }
}

impl ManuscriptDirectory for MemoryManuscriptDirectory {
    fn set_status(&self, object_key: &str, status: ManuscriptStatus) {
        if let Ok(mut guard) = self.statuses.lock() {
            match guard.get(object_key) {
                Some(current) if !current.can_transition(status) => {}
                _ => {
                    guard.insert(object_key.to_string(), status);
                }
            }
        }
    }

    fn status_of(&self, object_key: &str) -> Option<ManuscriptStatus> {
        self.statuses
            .lock()
            .ok()
            .and_then(|guard| guard.get(object_key).copied())
    }
}

/// No-op directory for deployments where the enclosing layer owns status.
#[derive(Default)]
pub struct NullManuscriptDirectory;

impl ManuscriptDirectory for NullManuscriptDirectory {
    fn set_status(&self, _object_key: &str, _status: ManuscriptStatus) {}
    fn status_of(&self, _object_key: &str) -> Option<ManuscriptStatus> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_the_dag() {
        use ManuscriptStatus::*;
        assert!(Uploaded.can_transition(Analyzing));
        assert!(Analyzing.can_transition(Complete));
        assert!(Analyzing.can_transition(Failed));
        assert!(Complete.can_transition(Analyzing));
        assert!(Failed.can_transition(Analyzing));
        assert!(!Complete.can_transition(Failed));
        assert!(!Uploaded.can_transition(Complete));
    }

    #[test]
    fn record_serializes_camel_case() {
        let record = ManuscriptRecord {
            id: "m1".to_string(),
            user_id: "u1".to_string(),
            title: "Night Courier".to_string(),
            genre: "thriller".to_string(),
            object_key: "u1/m1/f.txt".to_string(),
            total_size: 51_200,
            status: ManuscriptStatus::Uploaded,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["objectKey"], "u1/m1/f.txt");
        assert_eq!(value["status"], "uploaded");
    }

    #[test]
    fn directory_rejects_illegal_transitions() {
        let directory = MemoryManuscriptDirectory::new();
        directory.insert("u1/m1/f.txt", ManuscriptStatus::Complete);

        directory.set_status("u1/m1/f.txt", ManuscriptStatus::Failed);
        assert_eq!(
            directory.status_of("u1/m1/f.txt"),
            Some(ManuscriptStatus::Complete)
        );

        directory.set_status("u1/m1/f.txt", ManuscriptStatus::Analyzing);
        assert_eq!(
            directory.status_of("u1/m1/f.txt"),
            Some(ManuscriptStatus::Analyzing)
        );
    }
}
