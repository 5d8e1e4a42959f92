use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Temperature regimes the agents draw from. The numeric values are part of
/// each agent's contract; agents never pass raw floats around.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperaturePreset {
    Precise,
    Balanced,
    Creative,
}

impl TemperaturePreset {
    pub fn value(&self) -> f32 {
        match self {
            TemperaturePreset::Precise => 0.3,
            TemperaturePreset::Balanced => 0.5,
            TemperaturePreset::Creative => 0.8,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ModelRequest<'a> {
    pub prompt: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Clone, Debug)]
pub struct ModelReply {
    pub text: String,
    pub usage: TokenUsage,
}

/// Transport-level failure of one round-trip. The call layer decides what is
/// retryable; adapters only report what happened.
#[derive(Debug, Error)]
pub enum ModelCallError {
    #[error("model endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model transport failed: {0}")]
    Transport(String),
    #[error("model returned an empty reply")]
    EmptyReply,
}

impl ModelCallError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ModelCallError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 429 and 5xx are transient per the endpoint's contract; so are
    /// transport drops and empty replies. Every other 4xx is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelCallError::Status { status, .. } => *status == 429 || *status >= 500,
            ModelCallError::Transport(_) => true,
            ModelCallError::EmptyReply => true,
        }
    }
}

/// One prompt -> text round-trip against the external model endpoint.
/// Implementations live in the adapters crate; tests script their own.
pub trait ChatModel: Send + Sync {
    fn complete(&self, request: &ModelRequest<'_>) -> Result<ModelReply, ModelCallError>;
}

/// Seam for back-off and tick sleeps so tests observe schedules instead of
/// waiting them out.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Default, Clone)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Records requested durations without sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: std::sync::Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut guard) = self.slept.lock() {
            guard.push(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_values_match_contract() {
        assert_eq!(TemperaturePreset::Precise.value(), 0.3);
        assert_eq!(TemperaturePreset::Balanced.value(), 0.5);
        assert_eq!(TemperaturePreset::Creative.value(), 0.8);
    }

    #[test]
    fn retryable_classification() {
        let too_many = ModelCallError::Status {
            status: 429,
            body: String::new(),
        };
        let server = ModelCallError::Status {
            status: 503,
            body: String::new(),
        };
        let bad_request = ModelCallError::Status {
            status: 400,
            body: String::new(),
        };
        assert!(too_many.is_retryable());
        assert!(server.is_retryable());
        assert!(!bad_request.is_retryable());
        assert!(ModelCallError::Transport("reset".into()).is_retryable());
    }
}
