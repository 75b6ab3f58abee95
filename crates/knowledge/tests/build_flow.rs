use ashguard_knowledge::{
    ArtifactPaths, BuildConfig, BuildOptions, BuildStatus, ChunkId, ChunkManifest, FetchError,
    Fetcher, KnowledgeBaseBuilder,
};
use ashguard_text_chunker::ChunkerConfig;
use ashguard_vector_store::{Embedder, EmbeddingModel, VectorIndex};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const SMOKE: &str = "https://example.org/smoke";
const ASH: &str = "https://example.org/ash";
const DOWN: &str = "https://example.org/down";

#[derive(Default)]
struct MapFetcher {
    pages: HashMap<String, Result<String, FetchError>>,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
}

impl MapFetcher {
    fn page(mut self, url: &str, text: &str) -> Self {
        self.pages.insert(url.to_string(), Ok(text.to_string()));
        self
    }

    fn failing(mut self, url: &str, err: FetchError) -> Self {
        self.pages.insert(url.to_string(), Err(err));
        self
    }

    fn delayed(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }
}

#[async_trait]
impl Fetcher for MapFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        self.pages
            .get(url)
            .cloned()
            .unwrap_or(Err(FetchError::Status { status: 404 }))
    }
}

struct CountingEmbedder {
    inner: EmbeddingModel,
    model_id: String,
    calls: AtomicUsize,
}

impl CountingEmbedder {
    fn new() -> Self {
        Self::with_model_id(ashguard_vector_store::DEFAULT_MODEL_ID)
    }

    fn with_model_id(model_id: &str) -> Self {
        Self {
            inner: EmbeddingModel::stub(),
            model_id: model_id.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed(&self, text: &str) -> ashguard_vector_store::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text).await
    }
}

fn long_text(topic: &str) -> String {
    (0..30)
        .map(|i| format!("Sentence {i} about {topic} exposure after a wildfire."))
        .collect::<Vec<_>>()
        .join(" ")
}

fn builder(dir: &TempDir) -> KnowledgeBaseBuilder {
    builder_with(dir, BuildConfig::default())
}

fn builder_with(dir: &TempDir, config: BuildConfig) -> KnowledgeBaseBuilder {
    KnowledgeBaseBuilder::new(ArtifactPaths::new(dir.path().join("data")), config)
        .expect("builder")
}

fn urls(list: &[&str]) -> Vec<String> {
    list.iter().map(|u| (*u).to_string()).collect()
}

#[tokio::test]
async fn one_failed_fetch_yields_partial_build_with_remaining_chunks() {
    let tmp = TempDir::new().expect("tempdir");
    let kb = builder(&tmp);
    let fetcher = Arc::new(
        MapFetcher::default()
            .page(SMOKE, &long_text("smoke"))
            .failing(DOWN, FetchError::Network("connection refused".into())),
    );
    let embedder = CountingEmbedder::new();

    let outcome = kb
        .build(&urls(&[SMOKE, DOWN]), fetcher, &embedder, BuildOptions::default())
        .await
        .expect("build");

    let report = outcome.report;
    assert_eq!(report.status, BuildStatus::Partial);
    assert_eq!(report.documents, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].url, DOWN);
    assert!(report.chunks > 1);
    assert_eq!(report.embedded, report.chunks);
    assert_eq!(report.indexed, report.chunks);

    let manifest = ChunkManifest::load(&kb.paths().manifest)
        .await
        .expect("manifest");
    assert_eq!(manifest.urls(), vec![SMOKE]);
    assert_eq!(manifest.chunk_count(), report.chunks);
    assert_eq!(outcome.index.expect("index").count(), report.chunks);
}

#[tokio::test]
async fn populated_index_short_circuits_embedding() {
    let tmp = TempDir::new().expect("tempdir");
    let kb = builder(&tmp);
    let fetcher = Arc::new(
        MapFetcher::default()
            .page(SMOKE, &long_text("smoke"))
            .page(ASH, &long_text("ash")),
    );
    let sources = urls(&[SMOKE, ASH]);

    let first = CountingEmbedder::new();
    let initial = kb
        .build(&sources, fetcher.clone(), &first, BuildOptions::default())
        .await
        .expect("initial build");
    assert_eq!(first.calls(), initial.report.chunks);
    assert_eq!(initial.report.status, BuildStatus::Complete);

    let second = CountingEmbedder::new();
    let rerun = kb
        .build(&sources, fetcher, &second, BuildOptions::default())
        .await
        .expect("second build");

    assert_eq!(second.calls(), 0);
    assert!(rerun.report.reused_index);
    assert_eq!(rerun.report.embedded, 0);

    let before = initial.index.expect("index");
    let after = rerun.index.expect("index");
    assert_eq!(before.count(), after.count());
    assert_eq!(before.ids(), after.ids());
}

#[tokio::test]
async fn forced_reindex_embeds_everything_without_duplicates() {
    let tmp = TempDir::new().expect("tempdir");
    let kb = builder(&tmp);
    let fetcher = Arc::new(MapFetcher::default().page(SMOKE, &long_text("smoke")));
    let sources = urls(&[SMOKE]);

    let initial = kb
        .build(&sources, fetcher.clone(), &CountingEmbedder::new(), BuildOptions::default())
        .await
        .expect("initial build");

    let embedder = CountingEmbedder::new();
    let forced = kb
        .build(
            &sources,
            fetcher,
            &embedder,
            BuildOptions {
                force_reindex: true,
            },
        )
        .await
        .expect("forced build");

    assert_eq!(embedder.calls(), initial.report.chunks);
    assert!(!forced.report.reused_index);

    let on_disk = VectorIndex::load(&kb.paths().index).await.expect("index");
    assert_eq!(on_disk.count(), initial.report.chunks);
    assert_eq!(on_disk.ids(), initial.index.expect("index").ids());
}

#[tokio::test]
async fn index_from_foreign_model_is_rebuilt() {
    let tmp = TempDir::new().expect("tempdir");
    let kb = builder(&tmp);
    let fetcher = Arc::new(MapFetcher::default().page(ASH, &long_text("ash")));
    let sources = urls(&[ASH]);

    kb.build(
        &sources,
        fetcher.clone(),
        &CountingEmbedder::with_model_id("other-model"),
        BuildOptions::default(),
    )
    .await
    .expect("initial build");

    let embedder = CountingEmbedder::new();
    let rebuilt = kb
        .build(&sources, fetcher, &embedder, BuildOptions::default())
        .await
        .expect("rebuild");

    assert!(!rebuilt.report.reused_index);
    assert!(embedder.calls() > 0);
    assert_eq!(
        rebuilt.index.expect("index").model_id(),
        ashguard_vector_store::DEFAULT_MODEL_ID
    );
}

#[tokio::test]
async fn stuck_fetch_is_skipped_after_timeout() {
    let tmp = TempDir::new().expect("tempdir");
    let kb = builder_with(
        &tmp,
        BuildConfig {
            fetch_timeout: Duration::from_millis(50),
            ..BuildConfig::default()
        },
    );
    let fetcher = Arc::new(
        MapFetcher::default()
            .page(SMOKE, "Stay indoors with windows closed.")
            .page(ASH, "never delivered")
            .delayed(ASH, Duration::from_secs(30)),
    );

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        kb.build(
            &urls(&[SMOKE, ASH]),
            fetcher,
            &CountingEmbedder::new(),
            BuildOptions::default(),
        ),
    )
    .await
    .expect("build must not hang")
    .expect("build");

    assert_eq!(outcome.report.status, BuildStatus::Partial);
    assert_eq!(outcome.report.failures[0].url, ASH);
    assert!(outcome.report.failures[0].error.contains("Timed out"));
}

#[tokio::test]
async fn manifest_follows_input_order_and_duplicates_fetch_once() {
    let tmp = TempDir::new().expect("tempdir");
    let kb = builder(&tmp);
    let fetcher = Arc::new(
        MapFetcher::default()
            .page(SMOKE, "Smoke page.")
            .page(ASH, "Ash page.")
            .delayed(SMOKE, Duration::from_millis(100)),
    );

    let outcome = kb
        .build(
            &urls(&[SMOKE, ASH, SMOKE]),
            fetcher.clone(),
            &CountingEmbedder::new(),
            BuildOptions::default(),
        )
        .await
        .expect("build");

    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.report.documents, 2);
    let manifest = kb.load_manifest().await.expect("load").expect("manifest");
    assert_eq!(manifest.urls(), vec![SMOKE, ASH]);
    assert_eq!(manifest.chunks()[0].id, ChunkId::new(SMOKE, 0));
    assert_eq!(manifest.chunks()[1].id, ChunkId::new(ASH, 0));
}

#[tokio::test]
async fn zero_documents_is_an_empty_build_that_keeps_artifacts() {
    let tmp = TempDir::new().expect("tempdir");
    let kb = builder(&tmp);

    let empty = kb
        .build(
            &urls(&[DOWN]),
            Arc::new(MapFetcher::default()),
            &CountingEmbedder::new(),
            BuildOptions::default(),
        )
        .await
        .expect("empty build is not an error");
    assert_eq!(empty.report.status, BuildStatus::Empty);
    assert!(empty.index.is_none());
    assert!(!kb.paths().manifest.exists());

    kb.build(
        &urls(&[SMOKE]),
        Arc::new(MapFetcher::default().page(SMOKE, "Smoke page.")),
        &CountingEmbedder::new(),
        BuildOptions::default(),
    )
    .await
    .expect("build");
    let before = kb.load_manifest().await.expect("load").expect("manifest");

    let again = kb
        .build(
            &urls(&[SMOKE]),
            Arc::new(MapFetcher::default()),
            &CountingEmbedder::new(),
            BuildOptions::default(),
        )
        .await
        .expect("empty rebuild");
    assert_eq!(again.report.status, BuildStatus::Empty);
    let after = kb.load_manifest().await.expect("load").expect("manifest");
    assert_eq!(before, after);
}

#[tokio::test]
async fn index_is_rebuilt_from_manifest_without_fetching() {
    let tmp = TempDir::new().expect("tempdir");
    let kb = builder_with(
        &tmp,
        BuildConfig {
            chunker: ChunkerConfig::new(120, 20),
            ..BuildConfig::default()
        },
    );
    let initial = kb
        .build(
            &urls(&[SMOKE]),
            Arc::new(MapFetcher::default().page(SMOKE, &long_text("smoke"))),
            &CountingEmbedder::new(),
            BuildOptions::default(),
        )
        .await
        .expect("build");
    tokio::fs::remove_file(&kb.paths().index)
        .await
        .expect("delete index");

    let manifest = kb.load_manifest().await.expect("load").expect("manifest");
    let embedder = CountingEmbedder::new();
    let rebuilt = kb
        .index_manifest(&manifest, &embedder, false)
        .await
        .expect("reindex");

    assert_eq!(embedder.calls(), manifest.chunk_count());
    assert_eq!(
        rebuilt.index.expect("index").ids(),
        initial.index.expect("index").ids()
    );
    assert!(kb.load_index(&embedder).await.expect("load").is_some());
}

#[tokio::test]
async fn truncated_manifest_reads_as_absent_and_is_rebuilt() {
    let tmp = TempDir::new().expect("tempdir");
    let kb = builder(&tmp);
    tokio::fs::create_dir_all(&kb.paths().data_dir)
        .await
        .expect("data dir");
    tokio::fs::write(&kb.paths().manifest, "{truncated")
        .await
        .expect("write manifest");

    assert!(kb.load_manifest().await.expect("load").is_none());

    let embedder = CountingEmbedder::new();
    let outcome = kb
        .build(
            &urls(&[SMOKE]),
            Arc::new(MapFetcher::default().page(SMOKE, "Stay indoors when smoke is heavy.")),
            &embedder,
            BuildOptions::default(),
        )
        .await
        .expect("build");

    assert_eq!(outcome.report.status, BuildStatus::Complete);
    let manifest = kb.load_manifest().await.expect("load").expect("manifest");
    assert_eq!(manifest.urls(), vec![SMOKE]);
}
