use crate::agents::AgentRunner;
use crate::config::PricingTable;
use crate::cost::{CallScope, CostSink};
use crate::llm::LlmRunner;
use crate::logging::LogSink;
use crate::manuscript::ManuscriptDirectory;
use crate::model::{ChatModel, Sleeper};
use crate::prompts::PromptRegistry;
use crate::store::ObjectStore;

/// Everything a pipeline run borrows from its host. Both orchestrators and
/// the agent executor are built from this one bundle.
pub struct PipelineEnv<'a> {
    pub model: &'a dyn ChatModel,
    pub store: &'a dyn ObjectStore,
    pub costs: &'a dyn CostSink,
    pub manuscripts: &'a dyn ManuscriptDirectory,
    pub sink: &'a dyn LogSink,
    pub sleeper: &'a dyn Sleeper,
    pub prompts: &'a PromptRegistry,
    pub pricing: &'a PricingTable,
    pub model_name: &'a str,
}

impl<'a> PipelineEnv<'a> {
    pub fn agent_runner(&self) -> AgentRunner<'a> {
        let llm = LlmRunner::new(
            self.model,
            self.costs,
            self.sink,
            self.sleeper,
            self.pricing,
            self.model_name,
        );
        AgentRunner::new(llm, self.prompts, self.store, self.sink)
    }
}

/// Cost-attribution scope derived from the manuscript key's
/// `<user>/<manuscript>/<file>` layout. Keys without that shape attribute
/// to themselves.
pub fn scope_for(manuscript_key: &str, group: &str, operation: &str) -> CallScope {
    let mut segments = manuscript_key.split('/');
    let user = segments.next().unwrap_or(manuscript_key);
    let manuscript = segments.next().unwrap_or(manuscript_key);
    CallScope::new(user, manuscript, group, operation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_splits_user_and_manuscript() {
        let scope = scope_for("u1/m1/f.txt", "editorial", "developmental");
        assert_eq!(scope.user_id, "u1");
        assert_eq!(scope.manuscript_id, "m1");
    }

    #[test]
    fn flat_keys_attribute_to_themselves() {
        let scope = scope_for("loose-key", "assets", "keywords");
        assert_eq!(scope.user_id, "loose-key");
        assert_eq!(scope.manuscript_id, "loose-key");
    }
}
