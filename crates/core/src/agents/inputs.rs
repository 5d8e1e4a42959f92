//! Prompt-input assembly: text windows over the raw manuscript and argument
//! maps built from the developmental report and job data.

use serde_json::{json, Value};

use crate::agents::AgentKind;
use crate::prompts::PromptArguments;

/// Character budgets for the text windows each agent sees. Copy editing
/// reads the widest window, developmental next, everything else the default.
pub const DEFAULT_WINDOW: usize = 10_000;
pub const DEVELOPMENTAL_WINDOW: usize = 30_000;
pub const COPY_EDIT_WINDOW: usize = 50_000;
pub const PRONUNCIATION_WINDOW: usize = 30_000;
pub const EXCERPT_CHARS: usize = 2_000;

/// Summaries embedded into downstream prompts are capped so one agent's
/// output cannot blow another's context.
const SUMMARY_CHARS: usize = 4_000;
const DEPENDENCY_CHARS: usize = 1_500;

/// First `max_chars` characters, never splitting a code point.
pub fn text_window(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

pub fn count_words(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

fn clip(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text
    } else {
        text.chars().take(max_chars).collect()
    }
}

/// Free-form job data (author details, series details) rendered for a
/// prompt. Absent data reads as "unavailable" so templates degrade instead
/// of interpolating "null".
pub fn render_data(value: &Value) -> String {
    match value {
        Value::Null => "unavailable".to_string(),
        Value::String(text) if text.trim().is_empty() => "unavailable".to_string(),
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| "unavailable".to_string()),
    }
}

/// Read-only view over the developmental artifact. Every asset agent is fed
/// from here; accessors tolerate whatever shape the model produced.
#[derive(Clone, Debug)]
pub struct DevelopmentalReport {
    value: Value,
}

impl DevelopmentalReport {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn total_words(&self) -> Option<u64> {
        self.value
            .pointer("/structure/totalWords")
            .and_then(Value::as_u64)
    }

    pub fn chapter_count(&self) -> Option<u64> {
        self.value
            .pointer("/structure/chapterCount")
            .and_then(Value::as_u64)
    }

    /// Chapter list formatted one-per-line for the timing prompt.
    pub fn chapter_list_text(&self) -> String {
        let Some(chapters) = self
            .value
            .pointer("/structure/chapters")
            .and_then(Value::as_array)
        else {
            return "unavailable".to_string();
        };
        let mut lines = Vec::with_capacity(chapters.len());
        for chapter in chapters {
            let number = chapter.get("number").and_then(Value::as_u64).unwrap_or(0);
            let title = chapter
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("(untitled)");
            let words = chapter.get("wordCount").and_then(Value::as_u64).unwrap_or(0);
            lines.push(format!("{number}. {title} ({words} words)"));
        }
        if lines.is_empty() {
            "unavailable".to_string()
        } else {
            lines.join("\n")
        }
    }

    /// The slice of the report downstream prompts embed: premise, scoring,
    /// priorities, market read. Compact JSON, clipped.
    pub fn summary(&self) -> String {
        let digest = json!({
            "analysis": self.value.get("analysis").cloned().unwrap_or(Value::Null),
            "overallScore": self.value.get("overallScore").cloned().unwrap_or(Value::Null),
            "topPriorities": self.value.get("topPriorities").cloned().unwrap_or(Value::Null),
            "marketability": self.value.get("marketability").cloned().unwrap_or(Value::Null),
            "compTitles": self.value.get("compTitles").cloned().unwrap_or(Value::Null),
        });
        clip(
            serde_json::to_string(&digest).unwrap_or_default(),
            SUMMARY_CHARS,
        )
    }
}

/// Best-effort outputs of the three agents the metadata agent reads.
#[derive(Clone, Debug, Default)]
pub struct MetadataInputs {
    pub description: Option<Value>,
    pub categories: Option<Value>,
    pub keywords: Option<Value>,
}

impl MetadataInputs {
    fn summarize(value: Option<&Value>) -> String {
        match value {
            Some(value) => clip(
                serde_json::to_string(value).unwrap_or_default(),
                DEPENDENCY_CHARS,
            ),
            None => "unavailable".to_string(),
        }
    }
}

/// Arguments for one editorial agent.
pub fn editorial_arguments(
    kind: AgentKind,
    genre: &str,
    style_guide: &str,
    manuscript_text: &str,
) -> PromptArguments {
    let mut args = PromptArguments::new();
    args.insert("genre".into(), genre.to_string());
    match kind {
        AgentKind::Developmental => {
            args.insert(
                "word_count".into(),
                count_words(manuscript_text).to_string(),
            );
            args.insert(
                "manuscript_text".into(),
                text_window(manuscript_text, DEVELOPMENTAL_WINDOW),
            );
        }
        AgentKind::LineEditing => {
            args.insert(
                "manuscript_text".into(),
                text_window(manuscript_text, DEFAULT_WINDOW),
            );
        }
        AgentKind::CopyEditing => {
            args.insert("style_guide".into(), style_guide.to_string());
            args.insert(
                "manuscript_text".into(),
                text_window(manuscript_text, COPY_EDIT_WINDOW),
            );
        }
        other => unreachable!("not an editorial agent: {other:?}"),
    }
    args
}

pub struct AssetContext<'a> {
    pub developmental: &'a DevelopmentalReport,
    pub genre: &'a str,
    pub manuscript_text: &'a str,
    pub author_data: &'a Value,
    pub series_data: &'a Value,
}

/// Arguments for one asset agent. The metadata agent additionally receives
/// whatever dependency outputs have settled.
pub fn asset_arguments(
    kind: AgentKind,
    context: &AssetContext<'_>,
    dependencies: &MetadataInputs,
) -> PromptArguments {
    let mut args = PromptArguments::new();
    args.insert("genre".into(), context.genre.to_string());
    args.insert("analysis_summary".into(), context.developmental.summary());

    match kind {
        AgentKind::BookDescription | AgentKind::CoverBrief => {
            args.insert(
                "excerpt".into(),
                text_window(context.manuscript_text, EXCERPT_CHARS),
            );
        }
        AgentKind::AuthorBio | AgentKind::BackMatter => {
            args.insert("author_info".into(), render_data(context.author_data));
        }
        AgentKind::SeriesDescription => {
            args.insert("series_info".into(), render_data(context.series_data));
        }
        AgentKind::AudiobookPronunciation => {
            args.insert(
                "manuscript_text".into(),
                text_window(context.manuscript_text, PRONUNCIATION_WINDOW),
            );
        }
        AgentKind::AudiobookSamples => {
            args.insert(
                "manuscript_text".into(),
                text_window(context.manuscript_text, DEFAULT_WINDOW),
            );
        }
        AgentKind::AudiobookTiming => {
            let total_words = context
                .developmental
                .total_words()
                .unwrap_or_else(|| count_words(context.manuscript_text));
            args.insert("total_words".into(), total_words.to_string());
            args.insert(
                "chapter_list".into(),
                context.developmental.chapter_list_text(),
            );
        }
        AgentKind::AudiobookMetadata => {
            args.insert(
                "description_summary".into(),
                MetadataInputs::summarize(dependencies.description.as_ref()),
            );
            args.insert(
                "categories_summary".into(),
                MetadataInputs::summarize(dependencies.categories.as_ref()),
            );
            args.insert(
                "keywords_summary".into(),
                MetadataInputs::summarize(dependencies.keywords.as_ref()),
            );
        }
        AgentKind::Keywords | AgentKind::Categories | AgentKind::AudiobookNarration => {}
        other => unreachable!("not an asset agent: {other:?}"),
    }
    args
}
