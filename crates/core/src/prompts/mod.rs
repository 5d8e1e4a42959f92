use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::PromptConfig;

const BUILT_IN_PROMPTS: &str = include_str!("../../prompts/default.toml");

pub type PromptArguments = HashMap<String, String>;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt `{0}` not found")]
    NotFound(String),
    #[error("missing argument `{argument}` when rendering prompt `{key}`")]
    MissingArgument { key: String, argument: String },
    #[error("failed to read prompt file `{path}`: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse prompt definitions: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("required key `{argument}` declared for prompt `{key}` has no matching placeholder")]
    InvalidRequired { key: String, argument: String },
}

#[derive(Clone, Debug)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// One agent prompt. Placeholders are `{name}`; `{{` and `}}` escape braces.
#[derive(Clone, Debug)]
pub struct PromptTemplate {
    key: String,
    segments: Vec<Segment>,
    required: BTreeSet<String>,
}

impl PromptTemplate {
    fn from_raw(key: String, raw: RawPrompt) -> Result<Self, PromptError> {
        let (segments, placeholders) = parse_template(&raw.template);
        let required = if raw.required.is_empty() {
            placeholders
        } else {
            let mut set = BTreeSet::new();
            for argument in raw.required {
                let trimmed = argument.trim().to_string();
                if !placeholders.contains(&trimmed) {
                    return Err(PromptError::InvalidRequired {
                        key: key.clone(),
                        argument: trimmed,
                    });
                }
                set.insert(trimmed);
            }
            set
        };
        Ok(Self {
            key,
            segments,
            required,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn required_arguments(&self) -> impl Iterator<Item = &str> {
        self.required.iter().map(|s| s.as_str())
    }

    pub fn render(&self, arguments: &PromptArguments) -> Result<String, PromptError> {
        for required in &self.required {
            if !arguments.contains_key(required) {
                return Err(PromptError::MissingArgument {
                    key: self.key.clone(),
                    argument: required.clone(),
                });
            }
        }

        let mut output = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => output.push_str(text),
                Segment::Placeholder(name) => {
                    if let Some(value) = arguments.get(name) {
                        output.push_str(value);
                    }
                }
            }
        }
        Ok(output)
    }
}

/// Built-in templates (one per agent) plus TOML overrides from the
/// configured directories. Later directories win; files are read in sorted
/// order within a directory.
#[derive(Debug)]
pub struct PromptRegistry {
    prompts: BTreeMap<String, PromptTemplate>,
}

impl PromptRegistry {
    pub fn new() -> Result<Self, PromptError> {
        Self::from_prompt_config(&PromptConfig::default())
    }

    pub fn from_prompt_config(config: &PromptConfig) -> Result<Self, PromptError> {
        let mut prompts = BTreeMap::new();
        load_document(BUILT_IN_PROMPTS, &mut prompts)?;
        for dir in &config.custom_directories {
            load_directory(dir, &mut prompts)?;
        }
        Ok(Self { prompts })
    }

    pub fn get(&self, key: &str) -> Option<&PromptTemplate> {
        self.prompts.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.prompts.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.prompts.keys().map(|k| k.as_str())
    }

    pub fn format(&self, key: &str, args: &PromptArguments) -> Result<String, PromptError> {
        let template = self
            .get(key)
            .ok_or_else(|| PromptError::NotFound(key.to_string()))?;
        template.render(args)
    }
}

#[derive(Debug, Deserialize)]
struct PromptDocument {
    #[serde(default)]
    prompts: BTreeMap<String, RawPrompt>,
}

#[derive(Debug, Deserialize)]
struct RawPrompt {
    #[serde(alias = "text")]
    template: String,
    #[serde(default)]
    required: Vec<String>,
}

fn load_document(
    source: &str,
    prompts: &mut BTreeMap<String, PromptTemplate>,
) -> Result<(), PromptError> {
    let document: PromptDocument = toml::from_str(source)?;
    for (key, raw) in document.prompts {
        let template = PromptTemplate::from_raw(key.clone(), raw)?;
        prompts.insert(key, template);
    }
    Ok(())
}

fn load_directory(
    dir: &Path,
    prompts: &mut BTreeMap<String, PromptTemplate>,
) -> Result<(), PromptError> {
    if !dir.is_dir() {
        return Ok(());
    }

    let read_dir = fs::read_dir(dir).map_err(|source| PromptError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|source| PromptError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("toml") {
            files.push(path);
        }
    }
    files.sort();

    for path in files {
        let contents = fs::read_to_string(&path).map_err(|source| PromptError::Io {
            path: path.clone(),
            source,
        })?;
        load_document(&contents, prompts)?;
    }
    Ok(())
}

fn parse_template(template: &str) -> (Vec<Segment>, BTreeSet<String>) {
    let mut segments = Vec::new();
    let mut placeholders = BTreeSet::new();
    let mut buffer = String::new();
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' => {
                if matches!(chars.peek(), Some('{')) {
                    chars.next();
                    buffer.push('{');
                    continue;
                }

                let mut name = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    name.push(next);
                }

                if closed && !name.trim().is_empty() {
                    if !buffer.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut buffer)));
                    }
                    let key = name.trim().to_string();
                    placeholders.insert(key.clone());
                    segments.push(Segment::Placeholder(key));
                } else {
                    buffer.push('{');
                    buffer.push_str(&name);
                    if closed {
                        buffer.push('}');
                    }
                }
            }
            '}' => {
                if matches!(chars.peek(), Some('}')) {
                    chars.next();
                }
                buffer.push('}');
            }
            _ => buffer.push(ch),
        }
    }

    if !buffer.is_empty() {
        segments.push(Segment::Literal(buffer));
    }

    (segments, placeholders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn built_in_covers_every_agent_prompt() {
        let registry = PromptRegistry::new().expect("registry");
        for key in [
            "developmental_analysis",
            "line_editing",
            "copy_editing",
            "book_description",
            "keywords",
            "categories",
            "author_bio",
            "back_matter",
            "cover_brief",
            "series_description",
            "audiobook_narration",
            "audiobook_pronunciation",
            "audiobook_timing",
            "audiobook_samples",
            "audiobook_metadata",
        ] {
            assert!(registry.contains(key), "missing built-in prompt `{key}`");
        }
    }

    #[test]
    fn renders_with_placeholders_substituted() {
        let registry = PromptRegistry::new().unwrap();
        let args = PromptArguments::from([
            ("genre".to_string(), "thriller".to_string()),
            ("manuscript_text".to_string(), "Chapter one.".to_string()),
        ]);
        let output = registry.format("developmental_analysis", &args).unwrap();
        assert!(output.contains("thriller"));
        assert!(output.contains("Chapter one."));
    }

    #[test]
    fn missing_argument_fails() {
        let registry = PromptRegistry::new().unwrap();
        let template = registry.get("developmental_analysis").unwrap();
        let error = template
            .render(&PromptArguments::from([(
                "genre".to_string(),
                "romance".to_string(),
            )]))
            .expect_err("manuscript_text is required");
        match error {
            PromptError::MissingArgument { argument, .. } => {
                assert_eq!(argument, "manuscript_text");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn custom_directory_overrides_builtin() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(
            &path,
            "[prompts.keywords]\ntemplate = \"custom {genre}\"\n",
        )
        .unwrap();

        let config = PromptConfig {
            custom_directories: vec![dir.path().to_path_buf()],
        };
        let registry = PromptRegistry::from_prompt_config(&config).unwrap();
        let output = registry
            .format(
                "keywords",
                &PromptArguments::from([("genre".to_string(), "fantasy".to_string())]),
            )
            .unwrap();
        assert_eq!(output, "custom fantasy");
    }

    #[test]
    fn escaped_braces_survive() {
        let raw = RawPrompt {
            template: "Return JSON shaped {{\"keywords\": [...]}} for {genre}".to_string(),
            required: vec![],
        };
        let template = PromptTemplate::from_raw("t".to_string(), raw).unwrap();
        let output = template
            .render(&PromptArguments::from([(
                "genre".to_string(),
                "horror".to_string(),
            )]))
            .unwrap();
        assert_eq!(output, "Return JSON shaped {\"keywords\": [...]} for horror");
    }
}
