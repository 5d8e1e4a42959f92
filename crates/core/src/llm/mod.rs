pub mod extract;

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::config::PricingTable;
use crate::cost::{CallScope, CostRecord, CostSink};
use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::model::{ChatModel, ModelRequest, Sleeper, TemperaturePreset};

pub const MAX_ATTEMPTS: usize = 5;

/// Terminal outcome of an agent call. Retryable conditions never escape the
/// call layer; callers see either a parsed object or this.
#[derive(Debug, Error)]
#[error("agent `{agent}` failed after {attempts} attempt(s): {reason}")]
pub struct LlmError {
    pub agent: String,
    pub attempts: usize,
    pub reason: String,
    pub last_status: Option<u16>,
}

/// Outcome of a per-agent validation rule, applied to the parsed object
/// inside the attempt loop. Retryable violations burn an attempt; terminal
/// ones end the call immediately.
#[derive(Debug)]
pub enum RuleViolation {
    Retryable(String),
    Terminal(String),
}

pub struct RuleEnv<'a> {
    pub agent: &'a str,
    pub sink: &'a dyn LogSink,
}

pub type Rule = fn(&mut Value, &RuleEnv<'_>) -> Result<(), RuleViolation>;

#[derive(Clone)]
pub struct CallSpec<'a> {
    pub agent: &'a str,
    pub prompt: String,
    pub temperature: TemperaturePreset,
    pub max_tokens: u32,
    /// Top-level keys that must be present in the parsed object.
    pub required_fields: &'a [&'a str],
    pub rule: Option<Rule>,
}

/// The single place retry loops live. Drives one prompt to a validated JSON
/// object: bounded attempts, exponential back-off, response extraction and
/// repair, required-field checks, rule hooks, cost recording.
pub struct LlmRunner<'a> {
    model: &'a dyn ChatModel,
    costs: &'a dyn CostSink,
    sink: &'a dyn LogSink,
    sleeper: &'a dyn Sleeper,
    pricing: &'a PricingTable,
    model_name: &'a str,
    max_attempts: usize,
}

impl<'a> LlmRunner<'a> {
    pub fn new(
        model: &'a dyn ChatModel,
        costs: &'a dyn CostSink,
        sink: &'a dyn LogSink,
        sleeper: &'a dyn Sleeper,
        pricing: &'a PricingTable,
        model_name: &'a str,
    ) -> Self {
        Self {
            model,
            costs,
            sink,
            sleeper,
            pricing,
            model_name,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    pub fn run_json(&self, spec: &CallSpec<'_>, scope: &CallScope) -> Result<Value, LlmError> {
        let request = ModelRequest {
            prompt: &spec.prompt,
            temperature: spec.temperature.value(),
            max_tokens: spec.max_tokens,
        };

        let mut last_reason = String::from("no attempts made");
        let mut last_status: Option<u16> = None;

        for attempt in 1..=self.max_attempts {
            self.log(
                LogLevel::Debug,
                spec.agent,
                format!("attempt {}/{}", attempt, self.max_attempts),
            );

            let reply = match self.model.complete(&request) {
                Ok(reply) => reply,
                Err(err) => {
                    last_status = err.status();
                    last_reason = err.to_string();
                    if !err.is_retryable() {
                        return Err(self.terminal(spec.agent, attempt, last_reason, last_status));
                    }
                    self.back_off(spec.agent, attempt, &last_reason);
                    continue;
                }
            };

            // Tokens were consumed whether or not the reply parses.
            self.costs.record(CostRecord::from_usage(
                scope,
                spec.agent,
                reply.usage,
                self.pricing,
                self.model_name,
            ));
            last_status = None;

            let Some(mut value) = extract::extract_json_object(&reply.text) else {
                last_reason = "response contained no parseable JSON object".to_string();
                self.back_off(spec.agent, attempt, &last_reason);
                continue;
            };

            if let Some(missing) = first_missing_field(&value, spec.required_fields) {
                last_reason = format!("response missing required field `{missing}`");
                self.back_off(spec.agent, attempt, &last_reason);
                continue;
            }

            if let Some(rule) = spec.rule {
                let env = RuleEnv {
                    agent: spec.agent,
                    sink: self.sink,
                };
                match rule(&mut value, &env) {
                    Ok(()) => {}
                    Err(RuleViolation::Retryable(reason)) => {
                        last_reason = reason;
                        self.back_off(spec.agent, attempt, &last_reason);
                        continue;
                    }
                    Err(RuleViolation::Terminal(reason)) => {
                        return Err(self.terminal(spec.agent, attempt, reason, None));
                    }
                }
            }

            return Ok(value);
        }

        Err(LlmError {
            agent: spec.agent.to_string(),
            attempts: self.max_attempts,
            reason: last_reason,
            last_status,
        })
    }

    /// Sleep `2^attempt` seconds before the next try. The final attempt
    /// never sleeps; the loop exits and reports the last failure instead.
    fn back_off(&self, agent: &str, attempt: usize, reason: &str) {
        if attempt >= self.max_attempts {
            return;
        }
        let delay = Duration::from_secs(1u64 << attempt);
        self.log(
            LogLevel::Warn,
            agent,
            format!(
                "attempt {}/{} failed ({reason}); retrying in {}s",
                attempt,
                self.max_attempts,
                delay.as_secs()
            ),
        );
        self.sleeper.sleep(delay);
    }

    fn terminal(
        &self,
        agent: &str,
        attempts: usize,
        reason: String,
        last_status: Option<u16>,
    ) -> LlmError {
        self.log(
            LogLevel::Error,
            agent,
            format!("terminal failure: {reason}"),
        );
        LlmError {
            agent: agent.to_string(),
            attempts,
            reason,
            last_status,
        }
    }

    fn log(&self, level: LogLevel, scope: &str, message: impl Into<String>) {
        self.sink.log(LogRecord::new(level, scope, message));
    }
}

fn first_missing_field<'f>(value: &Value, fields: &[&'f str]) -> Option<&'f str> {
    let object = value.as_object()?;
    fields.iter().find(|field| !object.contains_key(**field)).copied()
}
