pub mod inputs;
pub mod rules;

use serde_json::Value;
use thiserror::Error;

use crate::cost::CallScope;
use crate::llm::{CallSpec, LlmError, LlmRunner, Rule};
use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::model::TemperaturePreset;
use crate::prompts::{PromptArguments, PromptError, PromptRegistry};
use crate::store::{self, keys, ObjectStore, StorageError};

/// The fifteen pipeline agents as one data-driven table. Orchestrators and
/// the executor are driven entirely off this enum; adding an agent means
/// adding a row here and a prompt template.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AgentKind {
    Developmental,
    LineEditing,
    CopyEditing,
    BookDescription,
    Keywords,
    Categories,
    AuthorBio,
    BackMatter,
    CoverBrief,
    SeriesDescription,
    AudiobookNarration,
    AudiobookPronunciation,
    AudiobookTiming,
    AudiobookSamples,
    AudiobookMetadata,
}

pub const EDITORIAL_AGENTS: [AgentKind; 3] = [
    AgentKind::Developmental,
    AgentKind::LineEditing,
    AgentKind::CopyEditing,
];

pub const ASSET_AGENTS: [AgentKind; 12] = [
    AgentKind::BookDescription,
    AgentKind::Keywords,
    AgentKind::Categories,
    AgentKind::AuthorBio,
    AgentKind::BackMatter,
    AgentKind::CoverBrief,
    AgentKind::SeriesDescription,
    AgentKind::AudiobookNarration,
    AgentKind::AudiobookPronunciation,
    AgentKind::AudiobookTiming,
    AgentKind::AudiobookSamples,
    AgentKind::AudiobookMetadata,
];

impl AgentKind {
    /// Canonical name: artifact key suffix and `errors[].type` value.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Developmental => "developmental",
            Self::LineEditing => "line-editing",
            Self::CopyEditing => "copy-editing",
            Self::BookDescription => "description",
            Self::Keywords => "keywords",
            Self::Categories => "categories",
            Self::AuthorBio => "author-bio",
            Self::BackMatter => "back-matter",
            Self::CoverBrief => "cover-brief",
            Self::SeriesDescription => "series-description",
            Self::AudiobookNarration => "audiobook-narration",
            Self::AudiobookPronunciation => "audiobook-pronunciation",
            Self::AudiobookTiming => "audiobook-timing",
            Self::AudiobookSamples => "audiobook-samples",
            Self::AudiobookMetadata => "audiobook-metadata",
        }
    }

    /// Field the agent's artifact occupies in the combined bundle.
    pub fn bundle_field(&self) -> &'static str {
        match self {
            Self::Developmental => "developmentalAnalysis",
            Self::LineEditing => "lineAnalysis",
            Self::CopyEditing => "copyAnalysis",
            Self::BookDescription => "bookDescription",
            Self::Keywords => "keywords",
            Self::Categories => "categories",
            Self::AuthorBio => "authorBio",
            Self::BackMatter => "backMatter",
            Self::CoverBrief => "coverBrief",
            Self::SeriesDescription => "seriesDescription",
            Self::AudiobookNarration => "audiobookNarration",
            Self::AudiobookPronunciation => "audiobookPronunciation",
            Self::AudiobookTiming => "audiobookTiming",
            Self::AudiobookSamples => "audiobookSamples",
            Self::AudiobookMetadata => "audiobookMetadata",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Developmental => "Developmental analysis",
            Self::LineEditing => "Line editing",
            Self::CopyEditing => "Copy editing",
            Self::BookDescription => "Book description",
            Self::Keywords => "Search keywords",
            Self::Categories => "BISAC categories",
            Self::AuthorBio => "Author bio",
            Self::BackMatter => "Back matter",
            Self::CoverBrief => "Cover brief",
            Self::SeriesDescription => "Series description",
            Self::AudiobookNarration => "Audiobook narration brief",
            Self::AudiobookPronunciation => "Pronunciation guide",
            Self::AudiobookTiming => "Audiobook timing",
            Self::AudiobookSamples => "Audiobook samples",
            Self::AudiobookMetadata => "Audiobook metadata",
        }
    }

    pub fn prompt_key(&self) -> &'static str {
        match self {
            Self::Developmental => "developmental_analysis",
            Self::LineEditing => "line_editing",
            Self::CopyEditing => "copy_editing",
            Self::BookDescription => "book_description",
            Self::Keywords => "keywords",
            Self::Categories => "categories",
            Self::AuthorBio => "author_bio",
            Self::BackMatter => "back_matter",
            Self::CoverBrief => "cover_brief",
            Self::SeriesDescription => "series_description",
            Self::AudiobookNarration => "audiobook_narration",
            Self::AudiobookPronunciation => "audiobook_pronunciation",
            Self::AudiobookTiming => "audiobook_timing",
            Self::AudiobookSamples => "audiobook_samples",
            Self::AudiobookMetadata => "audiobook_metadata",
        }
    }

    pub fn temperature(&self) -> TemperaturePreset {
        match self {
            Self::Developmental => TemperaturePreset::Balanced,
            Self::LineEditing => TemperaturePreset::Balanced,
            Self::CopyEditing => TemperaturePreset::Precise,
            Self::BookDescription => TemperaturePreset::Balanced,
            Self::Keywords => TemperaturePreset::Precise,
            Self::Categories => TemperaturePreset::Precise,
            Self::AuthorBio => TemperaturePreset::Creative,
            Self::BackMatter => TemperaturePreset::Creative,
            Self::CoverBrief => TemperaturePreset::Creative,
            Self::SeriesDescription => TemperaturePreset::Creative,
            Self::AudiobookNarration => TemperaturePreset::Balanced,
            Self::AudiobookPronunciation => TemperaturePreset::Precise,
            Self::AudiobookTiming => TemperaturePreset::Balanced,
            Self::AudiobookSamples => TemperaturePreset::Balanced,
            Self::AudiobookMetadata => TemperaturePreset::Balanced,
        }
    }

    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Developmental => &[
                "overallScore",
                "plot",
                "characters",
                "pacing",
                "topPriorities",
                "marketability",
                "structure",
            ],
            Self::LineEditing => &[
                "overallScore",
                "voiceAndStyle",
                "sentenceCraft",
                "dialogue",
                "topPriorities",
            ],
            Self::CopyEditing => &[
                "errorSummary",
                "grammar",
                "punctuation",
                "consistency",
                "corrections",
            ],
            Self::BookDescription => &["short", "medium", "long", "hooks"],
            Self::Keywords => &["keywords"],
            Self::Categories => &["primary", "secondary", "alternatives"],
            Self::AuthorBio => &["short", "medium", "long"],
            Self::BackMatter => &["thankYou", "newsletterCta", "connect", "closing"],
            Self::CoverBrief => &["concept", "palette", "aiPrompts"],
            Self::SeriesDescription => &["seriesTagline", "seriesDescription", "bookByBookArc"],
            Self::AudiobookNarration => &["narratorProfile", "toneGuidance", "characterVoices"],
            Self::AudiobookPronunciation => &["names", "terms"],
            Self::AudiobookTiming => &["chapterTimings", "overallTiming"],
            Self::AudiobookSamples => &["retailSample", "auditionSamples"],
            Self::AudiobookMetadata => &[
                "retailDescription",
                "categoryHints",
                "keywordHints",
                "narratorNotes",
            ],
        }
    }

    pub fn max_tokens(&self) -> u32 {
        match self {
            Self::Developmental | Self::LineEditing | Self::CopyEditing => 8000,
            Self::AudiobookSamples => 3000,
            Self::BookDescription
            | Self::CoverBrief
            | Self::SeriesDescription
            | Self::AudiobookNarration
            | Self::AudiobookPronunciation
            | Self::AudiobookTiming
            | Self::AudiobookMetadata => 2000,
            Self::AuthorBio | Self::BackMatter => 1500,
            Self::Keywords | Self::Categories => 1000,
        }
    }

    pub fn rule(&self) -> Option<Rule> {
        match self {
            Self::Keywords => Some(rules::keywords),
            Self::Categories => Some(rules::categories),
            Self::BookDescription => Some(rules::book_description),
            Self::SeriesDescription => Some(rules::series_description),
            _ => None,
        }
    }

    /// Object-store key the agent's artifact persists to.
    pub fn artifact_key(&self, manuscript_key: &str) -> String {
        match self {
            Self::Developmental => keys::developmental_analysis(manuscript_key),
            Self::LineEditing => keys::line_analysis(manuscript_key),
            Self::CopyEditing => keys::copy_analysis(manuscript_key),
            asset => keys::asset_artifact(manuscript_key, asset.name()),
        }
    }

    pub fn is_editorial(&self) -> bool {
        EDITORIAL_AGENTS.contains(self)
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("failed to render prompt for `{agent}`: {source}")]
    Prompt {
        agent: &'static str,
        source: PromptError,
    },
    #[error("failed to persist artifact for `{agent}`: {source}")]
    Storage {
        agent: &'static str,
        source: StorageError,
    },
}

/// Runs one agent end-to-end: render the prompt, drive the call layer,
/// persist the validated artifact. A storage failure retries the whole
/// agent call once before going terminal.
pub struct AgentRunner<'a> {
    llm: LlmRunner<'a>,
    prompts: &'a PromptRegistry,
    store: &'a dyn ObjectStore,
    sink: &'a dyn LogSink,
}

impl<'a> AgentRunner<'a> {
    pub fn new(
        llm: LlmRunner<'a>,
        prompts: &'a PromptRegistry,
        store: &'a dyn ObjectStore,
        sink: &'a dyn LogSink,
    ) -> Self {
        Self {
            llm,
            prompts,
            store,
            sink,
        }
    }

    pub fn run(
        &self,
        kind: AgentKind,
        manuscript_key: &str,
        args: &PromptArguments,
        scope: &CallScope,
    ) -> Result<Value, AgentError> {
        match self.run_once(kind, manuscript_key, args, scope) {
            Ok(value) => Ok(value),
            Err(AgentError::Storage { agent, source }) => {
                self.sink.log(LogRecord::new(
                    LogLevel::Warn,
                    kind.name(),
                    format!("storage failure ({source}); retrying agent once"),
                ));
                self.run_once(kind, manuscript_key, args, scope)
                    .map_err(|err| match err {
                        AgentError::Storage { source, .. } => AgentError::Storage { agent, source },
                        other => other,
                    })
            }
            Err(other) => Err(other),
        }
    }

    fn run_once(
        &self,
        kind: AgentKind,
        manuscript_key: &str,
        args: &PromptArguments,
        scope: &CallScope,
    ) -> Result<Value, AgentError> {
        let prompt = self
            .prompts
            .format(kind.prompt_key(), args)
            .map_err(|source| AgentError::Prompt {
                agent: kind.name(),
                source,
            })?;

        let spec = CallSpec {
            agent: kind.name(),
            prompt,
            temperature: kind.temperature(),
            max_tokens: kind.max_tokens(),
            required_fields: kind.required_fields(),
            rule: kind.rule(),
        };

        let value = self.llm.run_json(&spec, scope)?;

        let key = kind.artifact_key(manuscript_key);
        store::put_json(self.store, &key, &value, None).map_err(|source| AgentError::Storage {
            agent: kind.name(),
            source,
        })?;

        self.sink.log(LogRecord::new(
            LogLevel::Info,
            kind.name(),
            format!("artifact written to `{key}`"),
        ));

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::PromptRegistry;

    #[test]
    fn every_agent_has_a_built_in_prompt() {
        let registry = PromptRegistry::new().unwrap();
        for kind in EDITORIAL_AGENTS.iter().chain(ASSET_AGENTS.iter()) {
            assert!(
                registry.contains(kind.prompt_key()),
                "no prompt for {:?}",
                kind
            );
        }
    }

    #[test]
    fn asset_names_are_distinct_and_kebab_case() {
        let mut names: Vec<_> = ASSET_AGENTS.iter().map(|kind| kind.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 12);
        for name in names {
            assert!(name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c == '-'));
        }
    }

    #[test]
    fn artifact_keys_match_canonical_layout() {
        assert_eq!(
            AgentKind::Developmental.artifact_key("u1/m1/f.txt"),
            "u1/m1/f.txt-analysis.json"
        );
        assert_eq!(
            AgentKind::LineEditing.artifact_key("k"),
            "k-line-analysis.json"
        );
        assert_eq!(
            AgentKind::Keywords.artifact_key("k"),
            "k-keywords.json"
        );
        assert_eq!(
            AgentKind::AudiobookMetadata.artifact_key("k"),
            "k-audiobook-metadata.json"
        );
    }
}
