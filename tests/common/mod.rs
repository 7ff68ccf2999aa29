//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which wires an in-memory DB, a temp-dir artifact
//! store, fake collaborators, the runner pool, and the full [`AppContext`].
//! The [`with_server`] constructor starts Axum on a random port for
//! HTTP-level testing.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use lectern_core::config::Config;
use lectern_core::storage::ArtifactStore;
use lectern_core::{AvatarOption, FileType, ParsedDocument, Section, SlideRecord, StylePreset};
use lectern_db::pool::{init_memory_pool, DbPool};
use lectern_pipeline::collab::{
    AvatarGenerator, Collaborators, DocumentParser, NarrationSynthesizer, ScriptGenerator,
    SlideRenderer, VideoComposer,
};
use lectern_pipeline::stage::{StageError, StageResult};
use lectern_pipeline::tools::ToolRegistry;
use lectern_pipeline::{Orchestrator, RunnerPool};
use lectern_server::context::AppContext;
use lectern_server::router::build_router;

/// Invocation counters shared between the harness and its fakes.
#[derive(Default)]
pub struct Calls {
    pub parse: AtomicUsize,
    pub script: AtomicUsize,
    pub render: AtomicUsize,
    pub narrate: AtomicUsize,
    pub compose: AtomicUsize,
}

/// Knobs controlling fake behavior per harness.
pub struct FakePlan {
    /// Transient narration failures to inject before succeeding.
    pub narration_failures: AtomicUsize,
    /// Delay inside the parse stage, to observe runs mid-flight.
    pub parse_delay: Duration,
}

impl Default for FakePlan {
    fn default() -> Self {
        Self {
            narration_failures: AtomicUsize::new(0),
            parse_delay: Duration::from_millis(0),
        }
    }
}

struct FakeParser {
    calls: Arc<Calls>,
    plan: Arc<FakePlan>,
}

#[async_trait]
impl DocumentParser for FakeParser {
    async fn parse(&self, source: &Path, _ft: FileType) -> StageResult<ParsedDocument> {
        self.calls.parse.fetch_add(1, Ordering::SeqCst);
        if !self.plan.parse_delay.is_zero() {
            tokio::time::sleep(self.plan.parse_delay).await;
        }
        let text = std::fs::read_to_string(source).unwrap_or_default();
        if text.trim().is_empty() {
            return Err(StageError::fatal("document contains no extractable text"));
        }
        Ok(ParsedDocument {
            text,
            sections: vec![Section {
                title: "Introduction".into(),
                content: "content".into(),
            }],
        })
    }
}

struct FakeScript {
    calls: Arc<Calls>,
}

#[async_trait]
impl ScriptGenerator for FakeScript {
    async fn generate(
        &self,
        _doc: &ParsedDocument,
        _style: StylePreset,
        title: &str,
    ) -> StageResult<Vec<SlideRecord>> {
        self.calls.script.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            SlideRecord {
                slide_number: 1,
                title: title.to_string(),
                bullets: vec!["first point".into()],
                narration: "Welcome to the talk.".into(),
                speaker_notes: String::new(),
            },
            SlideRecord {
                slide_number: 2,
                title: "Conclusion".into(),
                bullets: vec!["wrap up".into()],
                narration: "Thanks for watching.".into(),
                speaker_notes: String::new(),
            },
        ])
    }
}

struct FakeRenderer {
    calls: Arc<Calls>,
}

#[async_trait]
impl SlideRenderer for FakeRenderer {
    async fn render(
        &self,
        _slide: &SlideRecord,
        _style: StylePreset,
        output: &Path,
    ) -> StageResult<()> {
        self.calls.render.fetch_add(1, Ordering::SeqCst);
        std::fs::write(output, b"\x89PNG fake").map_err(StageError::from)
    }
}

struct FakeNarrator {
    calls: Arc<Calls>,
    plan: Arc<FakePlan>,
}

#[async_trait]
impl NarrationSynthesizer for FakeNarrator {
    async fn synthesize(&self, _text: &str, output: &Path) -> StageResult<f64> {
        self.calls.narrate.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .plan
            .narration_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(StageError::transient("tts rate limited"));
        }
        std::fs::write(output, b"ID3 fake mp3").map_err(StageError::from)?;
        Ok(4.0)
    }
}

struct FakeAvatar;

#[async_trait]
impl AvatarGenerator for FakeAvatar {
    async fn generate(
        &self,
        _option: AvatarOption,
        _duration: f64,
        output: &Path,
    ) -> StageResult<()> {
        std::fs::write(output, b"overlay").map_err(StageError::from)
    }
}

struct FakeComposer {
    calls: Arc<Calls>,
}

#[async_trait]
impl VideoComposer for FakeComposer {
    async fn compose(
        &self,
        _slides: &[PathBuf],
        clips: &[Option<(PathBuf, f64)>],
        _avatar: Option<&Path>,
        output: &Path,
    ) -> StageResult<f64> {
        self.calls.compose.fetch_add(1, Ordering::SeqCst);
        std::fs::write(output, b"fake mp4 payload").map_err(StageError::from)?;
        Ok(clips.iter().flatten().map(|(_, d)| d).sum::<f64>().max(1.0))
    }
}

/// Test harness wrapping a fully-constructed [`AppContext`] backed by an
/// in-memory database and fake collaborators.
pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
    pub store: ArtifactStore,
    pub calls: Arc<Calls>,
    _artifacts: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new harness with default configuration and fakes.
    pub fn new() -> Self {
        Self::with_plan(Config::default(), FakePlan::default())
    }

    /// Create a new harness with custom config and fake behavior.
    pub fn with_plan(config: Config, plan: FakePlan) -> Self {
        let artifacts = tempfile::tempdir().expect("failed to create artifacts dir");
        let db = init_memory_pool().expect("failed to create in-memory pool");
        let store = ArtifactStore::new(artifacts.path().to_path_buf());
        let tools = Arc::new(ToolRegistry::discover(&config.tools));
        let calls = Arc::new(Calls::default());
        let plan = Arc::new(plan);

        let collab = Collaborators {
            parser: Arc::new(FakeParser {
                calls: calls.clone(),
                plan: plan.clone(),
            }),
            script: Arc::new(FakeScript {
                calls: calls.clone(),
            }),
            slides: Arc::new(FakeRenderer {
                calls: calls.clone(),
            }),
            narration: Arc::new(FakeNarrator {
                calls: calls.clone(),
                plan,
            }),
            avatar: Arc::new(FakeAvatar),
            composer: Arc::new(FakeComposer {
                calls: calls.clone(),
            }),
        };

        let orchestrator = Orchestrator::new(db.clone(), store.clone(), collab);
        let runner = RunnerPool::start(
            orchestrator,
            db.clone(),
            config.pipeline.max_concurrent_jobs,
            config.pipeline.queue_depth,
        );

        let ctx = AppContext {
            db: db.clone(),
            config: Arc::new(config),
            store: store.clone(),
            tools,
            runner,
        };

        Self {
            ctx,
            db,
            store,
            calls,
            _artifacts: artifacts,
        }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::serve(Self::new()).await
    }

    /// Start a server with custom config and fake behavior.
    pub async fn with_server_plan(config: Config, plan: FakePlan) -> (Self, SocketAddr) {
        Self::serve(Self::with_plan(config, plan)).await
    }

    async fn serve(harness: Self) -> (Self, SocketAddr) {
        let app = build_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }

    /// Upload a small plain-text document, returning the created job's id.
    pub async fn upload_text(
        &self,
        addr: SocketAddr,
        filename: &str,
        style: &str,
        avatar: &str,
    ) -> String {
        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(b"A short two page document.".to_vec())
                    .file_name(filename.to_string()),
            )
            .text("style_preset", style.to_string())
            .text("avatar_option", avatar.to_string());

        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/api/upload"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201, "upload failed");
        let json: serde_json::Value = resp.json().await.unwrap();
        json["id"].as_str().unwrap().to_string()
    }

    /// Poll the job endpoint until a terminal status, returning the final
    /// record. Panics after ~3 seconds.
    pub async fn wait_terminal(&self, addr: SocketAddr, job_id: &str) -> serde_json::Value {
        let client = reqwest::Client::new();
        for _ in 0..300 {
            let resp = client
                .get(format!("http://{addr}/api/jobs/{job_id}"))
                .send()
                .await
                .unwrap();
            let json: serde_json::Value = resp.json().await.unwrap();
            let status = json["status"].as_str().unwrap_or_default().to_string();
            if status == "completed" || status == "failed" {
                return json;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never reached a terminal state");
    }
}
