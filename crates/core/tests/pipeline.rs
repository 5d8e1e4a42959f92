//! End-to-end pipeline runs against a scripted model: editorial phases,
//! asset fan-out, progress records, cost accounting.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{json, Value};

use galley_core::config::PricingTable;
use galley_core::cost::MemoryCostLedger;
use galley_core::editorial::EditorialService;
use galley_core::assets::{AssetRunError, AssetService};
use galley_core::env::PipelineEnv;
use galley_core::jobs::{AnalysisJob, AssetJob};
use galley_core::logging::MemoryLogSink;
use galley_core::manuscript::{ManuscriptDirectory, ManuscriptStatus, MemoryManuscriptDirectory};
use galley_core::model::{
    ChatModel, ModelCallError, ModelReply, ModelRequest, RecordingSleeper, TokenUsage,
};
use galley_core::progress::{AgentState, ProgressStatus, ProgressStore};
use galley_core::prompts::PromptRegistry;
use galley_core::queue::MemoryQueue;
use galley_core::store::{self, keys, MemoryObjectStore, ObjectMetadata, ObjectStore};

/// Routes each prompt to a scripted reply queue by a distinctive substring
/// of the agent's template. Concurrent agents pull from their own queues.
struct RoutedModel {
    routes: Mutex<Vec<(&'static str, VecDeque<Result<String, u16>>)>>,
}

impl RoutedModel {
    fn new(routes: Vec<(&'static str, Vec<Result<String, u16>>)>) -> Self {
        Self {
            routes: Mutex::new(
                routes
                    .into_iter()
                    .map(|(needle, replies)| (needle, replies.into_iter().collect()))
                    .collect(),
            ),
        }
    }

    fn assert_drained(&self) {
        let guard = self.routes.lock().unwrap();
        for (needle, replies) in guard.iter() {
            assert!(
                replies.is_empty(),
                "route `{needle}` has {} unconsumed replies",
                replies.len()
            );
        }
    }
}

impl ChatModel for RoutedModel {
    fn complete(&self, request: &ModelRequest<'_>) -> Result<ModelReply, ModelCallError> {
        let mut guard = self.routes.lock().unwrap();
        for (needle, replies) in guard.iter_mut() {
            if request.prompt.contains(*needle) {
                return match replies.pop_front() {
                    Some(Ok(text)) => Ok(ModelReply {
                        text,
                        usage: TokenUsage {
                            input_tokens: 1000,
                            output_tokens: 500,
                        },
                    }),
                    Some(Err(status)) => Err(ModelCallError::Status {
                        status,
                        body: "scripted failure".to_string(),
                    }),
                    None => Err(ModelCallError::Transport(format!(
                        "route `{needle}` exhausted"
                    ))),
                };
            }
        }
        Err(ModelCallError::Transport(format!(
            "no route matched prompt: {}...",
            request.prompt.chars().take(60).collect::<String>()
        )))
    }
}

struct Fixture {
    store: MemoryObjectStore,
    costs: MemoryCostLedger,
    manuscripts: MemoryManuscriptDirectory,
    sink: MemoryLogSink,
    sleeper: RecordingSleeper,
    prompts: PromptRegistry,
    pricing: PricingTable,
}

impl Fixture {
    fn new() -> Self {
        Self {
            store: MemoryObjectStore::new(),
            costs: MemoryCostLedger::new(),
            manuscripts: MemoryManuscriptDirectory::new(),
            sink: MemoryLogSink::new(),
            sleeper: RecordingSleeper::new(),
            prompts: PromptRegistry::new().expect("built-in prompts"),
            pricing: PricingTable::default(),
        }
    }

    fn env<'a>(&'a self, model: &'a dyn ChatModel) -> PipelineEnv<'a> {
        PipelineEnv {
            model,
            store: &self.store,
            costs: &self.costs,
            manuscripts: &self.manuscripts,
            sink: &self.sink,
            sleeper: &self.sleeper,
            prompts: &self.prompts,
            pricing: &self.pricing,
            model_name: "claude-3-5-sonnet-20241022",
        }
    }

    fn seed_manuscript(&self, key: &str, words: usize) {
        let text = "the night courier ran ".repeat(words / 4);
        self.store
            .put(key, text.into_bytes(), ObjectMetadata::default())
            .unwrap();
        self.manuscripts.insert(key, ManuscriptStatus::Uploaded);
    }
}

const MANUSCRIPT_KEY: &str = "u1/m1/f.txt";

fn analysis_job(report_id: &str) -> AnalysisJob {
    AnalysisJob {
        manuscript_key: MANUSCRIPT_KEY.to_string(),
        genre: "thriller".to_string(),
        style_guide: "chicago".to_string(),
        report_id: report_id.to_string(),
    }
}

fn asset_job(report_id: &str) -> AssetJob {
    AssetJob {
        manuscript_key: MANUSCRIPT_KEY.to_string(),
        report_id: report_id.to_string(),
        genre: "thriller".to_string(),
        author_data: json!("Jordan Vale, two prior thrillers"),
        series_data: json!({"name": "Night Courier", "planned": 3}),
    }
}

fn developmental_reply() -> String {
    json!({
        "overallScore": 8,
        "plot": {"score": 8, "strengths": ["propulsive opening"], "weaknesses": [], "notes": "tight"},
        "characters": {"score": 7, "principals": ["Mara", "Deck"], "arcs": "solid", "notes": ""},
        "pacing": {"score": 7, "slowSections": ["chapter 2 middle"], "notes": ""},
        "topPriorities": ["sharpen the midpoint", "cut chapter 2 detour", "raise stakes earlier"],
        "marketability": {"assessment": "strong", "audience": "thriller readers", "comparableAuthors": ["Tana French"]},
        "compTitles": [{"title": "The Courier", "author": "K. Mills", "why": "same premise energy"}],
        "analysis": {"premise": "a courier carries the wrong package", "themes": ["trust"], "genreFit": "clean thriller"},
        "structure": {
            "totalWords": 9300,
            "chapterCount": 2,
            "chapters": [
                {"number": 1, "title": "Pickup", "wordCount": 5000},
                {"number": 2, "title": "Dropoff", "wordCount": 4300}
            ]
        }
    })
    .to_string()
}

fn line_reply() -> String {
    json!({
        "overallScore": 7,
        "voiceAndStyle": {"assessment": "consistent", "issues": []},
        "sentenceCraft": {"assessment": "varied", "patterns": ["opens on weather twice"]},
        "dialogue": {"assessment": "natural", "issues": []},
        "examples": [{"original": "She was afraid.", "revised": "Her hands would not stay still.", "why": "show"}],
        "topPriorities": ["trim filter words", "vary paragraph openings", "tighten tags"]
    })
    .to_string()
}

fn copy_reply() -> String {
    json!({
        "errorSummary": {"total": 3, "byCategory": {"grammar": 1, "punctuation": 1, "spelling": 0, "consistency": 1}},
        "grammar": [{"context": "between you and I", "correction": "between you and me", "rule": "case"}],
        "punctuation": [{"context": "however the door", "correction": "however, the door", "rule": "comma"}],
        "consistency": [{"issue": "Deck/Dek", "instances": ["ch1", "ch2"], "recommendation": "Deck"}],
        "styleGuideNotes": ["serial comma throughout"],
        "corrections": [{"original": "alright", "corrected": "all right"}]
    })
    .to_string()
}

fn keywords_reply(count: usize) -> String {
    let keywords: Vec<String> = (0..count).map(|i| format!("night courier thriller {i}")).collect();
    json!({"keywords": keywords, "rationale": "reader search phrasing"}).to_string()
}

fn asset_routes() -> Vec<(&'static str, Vec<Result<String, u16>>)> {
    vec![
        (
            "retail descriptions",
            vec![Ok(json!({
                "short": "A courier. A package. A lie.",
                "medium": "Mara delivers anything, no questions asked...",
                "long": "Mara Voss has one rule: never look inside.",
                "hooks": ["Never look inside.", "One delivery left."]
            })
            .to_string())],
        ),
        ("search keyword phrases", vec![Ok(keywords_reply(7))]),
        (
            "BISAC subject codes",
            vec![Ok(json!({
                "primary": {"code": "FIC031000", "heading": "Thrillers / General", "why": "core shelf"},
                "secondary": {"code": "FIC030000", "heading": "Suspense", "why": "crossover"},
                "alternatives": [{"code": "FIC022000", "heading": "Mystery"}]
            })
            .to_string())],
        ),
        (
            "author bios",
            vec![Ok(json!({
                "short": "Jordan Vale writes thrillers.",
                "medium": "Jordan Vale is the author of two prior thrillers.",
                "long": "Jordan Vale is the author of two prior thrillers. They live nowhere in particular."
            })
            .to_string())],
        ),
        (
            "back matter",
            vec![Ok(json!({
                "thankYou": "Thank you for riding along.",
                "newsletterCta": "Join the reader list for the next drop.",
                "connect": "Find Jordan online.",
                "closing": "A short review helps more than you know."
            })
            .to_string())],
        ),
        (
            "cover design brief",
            vec![Ok(json!({
                "concept": {"description": "lone rider under sodium light", "mood": "tense", "focalPoint": "the package"},
                "palette": [{"hex": "#0B0E1A", "role": "background"}, {"hex": "#F2A900", "role": "accent"}],
                "typography": {"title": "condensed sans", "author": "small caps"},
                "aiPrompts": ["noir courier on rain-slick street", "sodium-lit underpass, lone figure", "close crop on a sealed package"]
            })
            .to_string())],
        ),
        (
            "series-level marketing copy",
            vec![Ok(json!({
                "seriesTagline": "Every delivery has a price.",
                "seriesDescription": "The Night Courier novels follow Mara Voss...",
                "bookByBookArc": [
                    {"book": 1, "title": "Night Courier", "arc": "the rule breaks", "status": "published"},
                    {"book": 2, "title": "Dead Drop", "arc": "the debt comes due", "status": "planned"},
                    {"book": 3, "title": "Last Mile", "arc": "the network falls", "status": "planned"}
                ]
            })
            .to_string())],
        ),
        (
            "narration brief",
            vec![Ok(json!({
                "narratorProfile": {"voiceAge": "30s", "register": "low", "accent": "neutral", "pacing": "quick"},
                "toneGuidance": "dry, coiled; let the quiet scenes breathe",
                "characterVoices": [{"character": "Mara", "voice": "flat calm"}, {"character": "Deck", "voice": "gravel"}]
            })
            .to_string())],
        ),
        (
            "pronunciation guide",
            vec![Ok(json!({
                "names": [{"text": "Voss", "phonetic": "VAWSS", "note": "stress first"}],
                "terms": [{"text": "dead drop", "phonetic": "DED-drop", "note": "compound"}]
            })
            .to_string())],
        ),
        (
            "audiobook production planner",
            vec![Ok(json!({
                "chapterTimings": [
                    {"number": 1, "title": "Pickup", "minutes": 32, "breakPoint": "scene break at midpoint"},
                    {"number": 2, "title": "Dropoff", "minutes": 28, "breakPoint": ""}
                ],
                "overallTiming": {"totalListeningMinutes": 60, "totalHours": "1.0", "sessionsAtTypicalPace": 2}
            })
            .to_string())],
        ),
        (
            "sample passages",
            vec![Ok(json!({
                "retailSample": {"passage": "The package was lighter than a lie...", "why": "tone-setting open", "estimatedMinutes": 4},
                "auditionSamples": [{"passage": "\"You looked,\" Deck said...", "why": "two voices, fast turns"}]
            })
            .to_string())],
        ),
        (
            "metadata package",
            vec![Ok(json!({
                "retailDescription": "A courier thriller built for one sitting.",
                "categoryHints": ["Thrillers / General"],
                "keywordHints": ["night courier thriller 0"],
                "narratorNotes": "single narrator, low register",
                "contentAdvisories": ["violence"]
            })
            .to_string())],
        ),
    ]
}

fn editorial_routes() -> Vec<(&'static str, Vec<Result<String, u16>>)> {
    vec![
        ("developmental editor", vec![Ok(developmental_reply())]),
        ("line editor", vec![Ok(line_reply())]),
        ("copy editor", vec![Ok(copy_reply())]),
    ]
}

#[test]
fn happy_path_produces_all_artifacts_and_terminal_progress() {
    let fixture = Fixture::new();
    fixture.seed_manuscript(MANUSCRIPT_KEY, 9300);

    let mut routes = editorial_routes();
    routes.extend(asset_routes());
    let model = RoutedModel::new(routes);
    let env = fixture.env(&model);
    let asset_queue = MemoryQueue::<AssetJob>::new("assets", 3);

    EditorialService::new(&env, &asset_queue)
        .run(&analysis_job("abc12345"))
        .unwrap();

    for key in [
        keys::developmental_analysis(MANUSCRIPT_KEY),
        keys::line_analysis(MANUSCRIPT_KEY),
        keys::copy_analysis(MANUSCRIPT_KEY),
    ] {
        assert!(fixture.store.get(&key).unwrap().is_some(), "missing {key}");
    }
    assert_eq!(
        fixture.manuscripts.status_of(MANUSCRIPT_KEY),
        Some(ManuscriptStatus::Complete)
    );

    let progress = ProgressStore::new(&fixture.store);
    let editorial = progress.read_editorial("abc12345").unwrap().unwrap();
    assert_eq!(editorial.status, ProgressStatus::Complete);
    assert_eq!(editorial.progress, 100);

    // The editorial orchestrator hands off to the asset queue on success.
    let delivery = asset_queue.next_timeout(Duration::from_millis(100)).unwrap();
    AssetService::new(&env).run(&delivery.job).unwrap();

    let bundle: Value =
        store::get_json(&fixture.store, &keys::asset_bundle(MANUSCRIPT_KEY))
            .unwrap()
            .unwrap();
    let object = bundle.as_object().unwrap();
    assert_eq!(object.len(), 13); // twelve agents + errors
    assert_eq!(object["errors"].as_array().unwrap().len(), 0);
    for field in [
        "bookDescription",
        "keywords",
        "categories",
        "authorBio",
        "backMatter",
        "coverBrief",
        "seriesDescription",
        "audiobookNarration",
        "audiobookPronunciation",
        "audiobookTiming",
        "audiobookSamples",
        "audiobookMetadata",
    ] {
        assert!(!object[field].is_null(), "field {field} is null");
    }

    let assets = progress.read_asset("abc12345").unwrap().unwrap();
    assert_eq!(assets.status, ProgressStatus::Complete);
    assert_eq!(assets.progress, 100);
    assert!(assets
        .agents
        .values()
        .all(|agent| agent.status == AgentState::Complete));
    assert!(assets.assets.is_some());

    // ~60 minutes for 9300 words sits inside the 8000-10500 words/hour band.
    let minutes = bundle["audiobookTiming"]["overallTiming"]["totalListeningMinutes"]
        .as_f64()
        .unwrap();
    let words_per_hour = 9300.0 / (minutes / 60.0);
    assert!((8000.0..=10500.0).contains(&words_per_hour));

    // Fifteen successful calls, one cost row each; no back-off sleeps.
    assert_eq!(fixture.costs.records().len(), 15);
    assert!(fixture.sleeper.slept().is_empty());
    assert!(fixture.costs.total_for_manuscript("m1") > 0.0);
    model.assert_drained();
}

#[test]
fn transient_429_costs_one_two_second_backoff() {
    let fixture = Fixture::new();
    fixture.seed_manuscript(MANUSCRIPT_KEY, 9300);

    let model = RoutedModel::new(vec![
        (
            "developmental editor",
            vec![Err(429), Ok(developmental_reply())],
        ),
        ("line editor", vec![Ok(line_reply())]),
        ("copy editor", vec![Ok(copy_reply())]),
    ]);
    let env = fixture.env(&model);
    let asset_queue = MemoryQueue::<AssetJob>::new("assets", 3);

    EditorialService::new(&env, &asset_queue)
        .run(&analysis_job("abc12345"))
        .unwrap();

    assert_eq!(fixture.sleeper.slept(), vec![Duration::from_secs(2)]);
    assert!(fixture
        .store
        .get(&keys::developmental_analysis(MANUSCRIPT_KEY))
        .unwrap()
        .is_some());
    model.assert_drained();
}

#[test]
fn keywords_schema_failure_yields_partial_bundle() {
    let fixture = Fixture::new();
    fixture.seed_manuscript(MANUSCRIPT_KEY, 9300);

    let mut routes = editorial_routes();
    routes.extend(asset_routes());
    // Replace the keywords route: six keywords on every one of the five
    // attempts the call layer will make.
    let keywords_route = routes
        .iter_mut()
        .find(|(needle, _)| *needle == "search keyword phrases")
        .unwrap();
    keywords_route.1 = (0..5).map(|_| Ok(keywords_reply(6))).collect();

    let model = RoutedModel::new(routes);
    let env = fixture.env(&model);
    let asset_queue = MemoryQueue::<AssetJob>::new("assets", 3);

    EditorialService::new(&env, &asset_queue)
        .run(&analysis_job("abc12345"))
        .unwrap();
    let delivery = asset_queue.next_timeout(Duration::from_millis(100)).unwrap();
    AssetService::new(&env).run(&delivery.job).unwrap();

    let bundle: Value =
        store::get_json(&fixture.store, &keys::asset_bundle(MANUSCRIPT_KEY))
            .unwrap()
            .unwrap();
    assert!(bundle["keywords"].is_null());
    let errors = bundle["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["type"], "keywords");
    assert!(errors[0]["error"].as_str().unwrap().contains("keywords"));

    let progress = ProgressStore::new(&fixture.store);
    let assets = progress.read_asset("abc12345").unwrap().unwrap();
    assert_eq!(assets.status, ProgressStatus::Partial);
    assert_eq!(assets.progress, 100);
    assert_eq!(assets.agents["keywords"].status, AgentState::Failed);

    // Partial asset outcomes never demote the manuscript.
    assert_eq!(
        fixture.manuscripts.status_of(MANUSCRIPT_KEY),
        Some(ManuscriptStatus::Complete)
    );
    model.assert_drained();
}

#[test]
fn missing_developmental_artifact_fails_the_asset_run() {
    let fixture = Fixture::new();
    fixture.seed_manuscript(MANUSCRIPT_KEY, 9300);

    let model = RoutedModel::new(vec![]);
    let env = fixture.env(&model);

    let outcome = AssetService::new(&env).run(&asset_job("abc12345"));
    assert!(matches!(
        outcome,
        Err(AssetRunError::MissingPrerequisite { .. })
    ));

    let progress = ProgressStore::new(&fixture.store);
    let record = progress.read_asset("abc12345").unwrap().unwrap();
    assert_eq!(record.status, ProgressStatus::Failed);
    assert!(fixture
        .store
        .get(&keys::asset_bundle(MANUSCRIPT_KEY))
        .unwrap()
        .is_none());
}

#[test]
fn reanalysis_overwrites_artifacts_and_keeps_both_progress_records() {
    let fixture = Fixture::new();
    fixture.seed_manuscript(MANUSCRIPT_KEY, 9300);

    let first_dev = developmental_reply();
    let mut second_dev: Value = serde_json::from_str(&first_dev).unwrap();
    second_dev["overallScore"] = json!(9);

    let model = RoutedModel::new(vec![
        (
            "developmental editor",
            vec![Ok(first_dev), Ok(second_dev.to_string())],
        ),
        ("line editor", vec![Ok(line_reply()), Ok(line_reply())]),
        ("copy editor", vec![Ok(copy_reply()), Ok(copy_reply())]),
    ]);
    let env = fixture.env(&model);
    let asset_queue = MemoryQueue::<AssetJob>::new("assets", 3);
    let service = EditorialService::new(&env, &asset_queue);

    service.run(&analysis_job("aaaa1111")).unwrap();
    service.run(&analysis_job("bbbb2222")).unwrap();

    let stored: Value =
        store::get_json(&fixture.store, &keys::developmental_analysis(MANUSCRIPT_KEY))
            .unwrap()
            .unwrap();
    assert_eq!(stored["overallScore"], 9);

    let progress = ProgressStore::new(&fixture.store);
    assert!(progress.read_editorial("aaaa1111").unwrap().is_some());
    assert!(progress.read_editorial("bbbb2222").unwrap().is_some());
    model.assert_drained();
}

#[test]
fn fenced_response_with_trailing_commas_parses_without_retry() {
    let fixture = Fixture::new();
    fixture.seed_manuscript(MANUSCRIPT_KEY, 9300);

    // Inject a trailing comma before a closing brace, the classic model tic.
    let fenced = format!(
        "Here is the report you asked for:\n```json\n{}\n```",
        developmental_reply().replace("\"wordCount\":4300}", "\"wordCount\":4300,}")
    );
    let model = RoutedModel::new(vec![
        ("developmental editor", vec![Ok(fenced)]),
        ("line editor", vec![Ok(line_reply())]),
        ("copy editor", vec![Ok(copy_reply())]),
    ]);
    let env = fixture.env(&model);
    let asset_queue = MemoryQueue::<AssetJob>::new("assets", 3);

    EditorialService::new(&env, &asset_queue)
        .run(&analysis_job("abc12345"))
        .unwrap();

    assert!(fixture.sleeper.slept().is_empty());
    let stored: Value =
        store::get_json(&fixture.store, &keys::developmental_analysis(MANUSCRIPT_KEY))
            .unwrap()
            .unwrap();
    assert_eq!(stored["structure"]["totalWords"], 9300);
    model.assert_drained();
}
