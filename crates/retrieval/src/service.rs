use crate::config::{InitStrategy, ServiceConfig};
use crate::error::{InitError, Result, RetrievalError};
use ashguard_knowledge::{
    BuildOptions, BuildReport, Fetcher, KnowledgeBaseBuilder, KnowledgeError,
};
use ashguard_vector_store::{Embedder, ScoredRecord, VectorIndex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl Phase {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Initializing => 1,
            Self::Ready => 2,
            Self::Failed => 3,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Initializing,
            2 => Self::Ready,
            3 => Self::Failed,
            _ => Self::Uninitialized,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReinitMode {
    /// Reuse artifacts on disk where possible
    Reload,
    /// Fetch every source again and re-embed
    Refetch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    pub url: String,
    pub score: f32,
}

impl From<ScoredRecord> for RetrievedChunk {
    fn from(record: ScoredRecord) -> Self {
        Self {
            id: record.id,
            text: record.text,
            url: record.url,
            score: record.score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub phase: Phase,
    pub chunks: usize,
    pub last_error: Option<String>,
    pub last_report: Option<BuildReport>,
}

/// Owns the knowledge-base lifecycle and answers `retrieve` against the published index.
///
/// Cloning yields another handle to the same service.
#[derive(Clone)]
pub struct RetrievalService {
    inner: Arc<Inner>,
}

struct Inner {
    config: ServiceConfig,
    builder: KnowledgeBaseBuilder,
    embedder: Arc<dyn Embedder>,
    fetcher: Arc<dyn Fetcher>,
    phase: AtomicU8,
    phase_tx: watch::Sender<Phase>,
    index: RwLock<Option<Arc<VectorIndex>>>,
    last_error: Mutex<Option<String>>,
    last_report: Mutex<Option<BuildReport>>,
}

impl RetrievalService {
    pub fn new(
        config: ServiceConfig,
        embedder: Arc<dyn Embedder>,
        fetcher: Arc<dyn Fetcher>,
    ) -> std::result::Result<Self, KnowledgeError> {
        let builder = KnowledgeBaseBuilder::new(config.artifact_paths(), config.build.clone())?;
        let (phase_tx, _) = watch::channel(Phase::Uninitialized);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                builder,
                embedder,
                fetcher,
                phase: AtomicU8::new(Phase::Uninitialized.to_u8()),
                phase_tx,
                index: RwLock::new(None),
                last_error: Mutex::new(None),
                last_report: Mutex::new(None),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    /// Apply the configured `InitStrategy`.
    ///
    /// Eager returns `Unavailable` when initialization fails.
    pub async fn start(&self) -> Result<()> {
        match self.inner.config.init_strategy {
            InitStrategy::Eager => match self.initialize(ReinitMode::Reload).await? {
                Phase::Ready => Ok(()),
                _ => Err(self.unavailable()),
            },
            InitStrategy::Background => self.spawn_init(ReinitMode::Reload),
            InitStrategy::Lazy => Ok(()),
        }
    }

    /// Run initialization on the current task and return the settled phase
    pub async fn initialize(&self, mode: ReinitMode) -> Result<Phase> {
        self.inner.begin_init()?;
        self.inner.run_init(mode).await;
        Ok(self.phase())
    }

    /// Explicit re-init trigger; the build runs in the background
    pub fn reinitialize(&self, mode: ReinitMode) -> Result<()> {
        log::info!("Re-initialization requested ({mode:?})");
        self.spawn_init(mode)
    }

    fn spawn_init(&self, mode: ReinitMode) -> Result<()> {
        self.inner.begin_init()?;
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.run_init(mode).await;
        });
        Ok(())
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.inner.phase.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn ready(&self) -> bool {
        self.phase() == Phase::Ready
    }

    /// Resolves once no initialization is running
    pub async fn wait_until_settled(&self) -> Phase {
        let mut rx = self.inner.phase_tx.subscribe();
        loop {
            let phase = *rx.borrow_and_update();
            if phase != Phase::Initializing {
                return phase;
            }
            if rx.changed().await.is_err() {
                return self.phase();
            }
        }
    }

    #[must_use]
    pub fn status(&self) -> ServiceStatus {
        let phase = self.phase();
        let chunks = if phase == Phase::Ready {
            self.inner.snapshot().map_or(0, |index| index.count())
        } else {
            0
        };
        ServiceStatus {
            phase,
            chunks,
            last_error: lock_clone(&self.inner.last_error),
            last_report: lock_clone(&self.inner.last_report),
        }
    }

    /// Top-`k` chunks for `question`, best first.
    ///
    /// Only a published index is ever queried; every other phase is `NotReady` or `Unavailable`.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RetrievalError::EmptyQuestion);
        }

        match self.phase() {
            Phase::Ready => {}
            Phase::Failed => return Err(self.unavailable()),
            Phase::Uninitialized if self.inner.config.init_strategy == InitStrategy::Lazy => {
                match self.spawn_init(ReinitMode::Reload) {
                    Ok(()) => log::info!("First query received; initializing knowledge base"),
                    Err(err) => log::debug!("Lazy initialization not started: {err}"),
                }
                return Err(RetrievalError::NotReady {
                    phase: self.phase(),
                });
            }
            phase => return Err(RetrievalError::NotReady { phase }),
        }

        let index = self
            .inner
            .snapshot()
            .ok_or_else(|| RetrievalError::Unavailable {
                reason: "no index published".to_string(),
            })?;

        let vector = self
            .inner
            .embedder
            .embed(question)
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;
        let hits = index
            .query(&vector, k)
            .map_err(|e| RetrievalError::Index(e.to_string()))?;

        log::debug!(
            "Retrieved {} chunk(s) for question ({} chars)",
            hits.len(),
            question.chars().count()
        );
        Ok(hits.into_iter().map(RetrievedChunk::from).collect())
    }

    fn unavailable(&self) -> RetrievalError {
        RetrievalError::Unavailable {
            reason: lock_clone(&self.inner.last_error)
                .unwrap_or_else(|| "initialization failed".to_string()),
        }
    }
}

impl Inner {
    /// Single-flight guard: only one initialization may hold `Initializing`
    fn begin_init(&self) -> Result<()> {
        self.phase
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                (Phase::from_u8(raw) != Phase::Initializing)
                    .then_some(Phase::Initializing.to_u8())
            })
            .map_err(|_| RetrievalError::AlreadyInitializing)?;
        self.phase_tx.send_replace(Phase::Initializing);
        Ok(())
    }

    async fn run_init(&self, mode: ReinitMode) {
        let mut guard = SettleGuard {
            inner: self,
            settled: false,
        };
        match self.load_or_build(mode).await {
            Ok(index) => {
                let count = index.count();
                if let Ok(mut slot) = self.index.write() {
                    *slot = Some(Arc::new(index));
                }
                set_lock(&self.last_error, None);
                self.publish(Phase::Ready);
                log::info!("Retrieval service ready ({count} chunk(s))");
            }
            Err(err) => {
                log::error!("Knowledge base initialization failed: {err}");
                set_lock(&self.last_error, Some(err.to_string()));
                self.publish(Phase::Failed);
            }
        }
        guard.settled = true;
    }

    fn publish(&self, phase: Phase) {
        self.phase.store(phase.to_u8(), Ordering::Release);
        self.phase_tx.send_replace(phase);
    }

    fn snapshot(&self) -> Option<Arc<VectorIndex>> {
        self.index.read().ok().and_then(|slot| slot.clone())
    }

    async fn load_or_build(&self, mode: ReinitMode) -> std::result::Result<VectorIndex, InitError> {
        let embedder = self.embedder.as_ref();
        if mode == ReinitMode::Reload {
            if let Some(index) = self.builder.load_index(embedder).await? {
                log::info!("Loaded existing index ({} records)", index.count());
                return Ok(index);
            }
            if let Some(index) = self.index_existing_manifest(false).await? {
                return Ok(index);
            }
        }

        let outcome = self
            .builder
            .build(
                &self.config.sources,
                self.fetcher.clone(),
                embedder,
                BuildOptions {
                    force_reindex: mode == ReinitMode::Refetch,
                },
            )
            .await?;
        set_lock(&self.last_report, Some(outcome.report));
        if let Some(index) = outcome.index {
            return Ok(index);
        }

        if let Some(index) = self.index_existing_manifest(false).await? {
            log::warn!("No sources could be fetched; serving the previous manifest");
            return Ok(index);
        }
        Err(InitError::EmptyKnowledgeBase {
            attempted: self.config.sources.len(),
        })
    }

    async fn index_existing_manifest(
        &self,
        force_reindex: bool,
    ) -> std::result::Result<Option<VectorIndex>, InitError> {
        let Some(manifest) = self.builder.load_manifest().await? else {
            return Ok(None);
        };
        if manifest.is_empty() {
            return Ok(None);
        }
        let outcome = self
            .builder
            .index_manifest(&manifest, self.embedder.as_ref(), force_reindex)
            .await?;
        set_lock(&self.last_report, Some(outcome.report));
        Ok(outcome.index)
    }
}

/// Publishes `Failed` when an initialization unwinds or is dropped before settling
struct SettleGuard<'a> {
    inner: &'a Inner,
    settled: bool,
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let reason = if std::thread::panicking() {
            "initialization panicked"
        } else {
            "initialization was cancelled"
        };
        log::error!("Knowledge base {reason}");
        set_lock(&self.inner.last_error, Some(reason.to_string()));
        self.inner.publish(Phase::Failed);
    }
}

fn lock_clone<T: Clone>(slot: &Mutex<Option<T>>) -> Option<T> {
    slot.lock().ok().and_then(|guard| guard.clone())
}

fn set_lock<T>(slot: &Mutex<Option<T>>, value: Option<T>) {
    if let Ok(mut guard) = slot.lock() {
        *guard = value;
    }
}
