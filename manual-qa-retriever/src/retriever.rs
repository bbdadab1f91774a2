//! The retrieval engine: builds or loads the index for a corpus and answers
//! vector, keyword, and fallback searches against it.

use crate::config::RetrieverConfig;
use crate::error::{Result, RetrieverError};
use crate::fingerprint::Fingerprint;
use crate::index::VectorIndex;
use crate::keyword::{self, KeywordHit};
use crate::manuals::{ChunkMetadata, ManualsData};
use crate::query_cache::QueryEmbeddingCache;
use crate::store::{self, CachePaths};
use manual_qa_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Everything a search reads, swapped in as one unit so readers never pair an
/// index with metadata or text from a different build.
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    pub corpus: Arc<ManualsData>,
    pub index: VectorIndex,
    pub chunk_metadata: Vec<ChunkMetadata>,
    pub fingerprint: Option<Fingerprint>,
}

impl IndexSnapshot {
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// How [`Retriever::ensure_index`] obtained the current index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// The corpus had no chunks; searches return nothing
    Empty,
    /// Read from the on-disk cache without encoding anything
    Loaded { rows: usize, index_path: PathBuf },
    /// Encoded from scratch. `persisted` is false when the cache write failed.
    Built {
        rows: usize,
        index_path: PathBuf,
        persisted: bool,
    },
}

impl IndexOutcome {
    pub fn rows(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Loaded { rows, .. } | Self::Built { rows, .. } => *rows,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorHit {
    pub text: String,
    pub group: String,
    /// Squared L2 distance to the query; smaller is closer
    pub distance: f32,
    pub chunk_index: usize,
}

/// A result from [`Retriever::search_with_fallback`], tagged with the search
/// that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SearchHit {
    Vector(VectorHit),
    Keyword(KeywordHit),
}

impl SearchHit {
    pub fn text(&self) -> &str {
        match self {
            Self::Vector(hit) => &hit.text,
            Self::Keyword(hit) => &hit.text,
        }
    }

    pub fn group(&self) -> &str {
        match self {
            Self::Vector(hit) => &hit.group,
            Self::Keyword(hit) => &hit.group,
        }
    }

    pub fn chunk_index(&self) -> usize {
        match self {
            Self::Vector(hit) => hit.chunk_index,
            Self::Keyword(hit) => hit.chunk_index,
        }
    }
}

pub struct Retriever {
    provider: Arc<dyn EmbeddingProvider>,
    config: RetrieverConfig,
    snapshot: RwLock<Arc<IndexSnapshot>>,
    build_lock: Mutex<()>,
    query_cache: QueryEmbeddingCache,
}

impl Retriever {
    /// Create a retriever around `provider`.
    ///
    /// Does not load the embedding model; that happens on the first build or
    /// query that needs a vector.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: RetrieverConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "Creating retriever with {} embeddings (model: {})",
            provider.provider_name(),
            provider.model_name()
        );
        Ok(Self {
            provider,
            query_cache: QueryEmbeddingCache::new(config.query_cache_capacity),
            config,
            snapshot: RwLock::new(Arc::new(IndexSnapshot::default())),
            build_lock: Mutex::new(()),
        })
    }

    /// Create a retriever backed by a local FastEmbed model described by
    /// `config.embed`.
    pub fn with_fastembed(config: RetrieverConfig) -> Result<Self> {
        let provider = FastEmbedProvider::new(config.embed.clone());
        Self::new(Arc::new(provider), config)
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn embed_config(&self) -> &EmbedConfig {
        &self.config.embed
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn query_cache(&self) -> &QueryEmbeddingCache {
        &self.query_cache
    }

    /// The index, metadata, and corpus searches currently read
    pub async fn snapshot(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// [`Retriever::ensure_index`] with the configured cache directory and
    /// rebuild policy and a computed fingerprint
    pub async fn load_or_build(&self, manuals: &ManualsData) -> Result<IndexOutcome> {
        self.ensure_index(manuals, None, None, self.config.force_rebuild)
            .await
    }

    /// Make `manuals` the searchable corpus, reusing a persisted index when
    /// one exists for the same model and fingerprint.
    ///
    /// `fingerprint` defaults to the corpus content fingerprint and
    /// `cache_dir` to the configured one. With `force_rebuild` the cache is
    /// not consulted, but the fresh index is still written back. Cache read
    /// and write problems are logged; only encoding failures are returned.
    /// Calls are serialized, and searches keep using the previous snapshot
    /// until the new one is complete.
    pub async fn ensure_index(
        &self,
        manuals: &ManualsData,
        fingerprint: Option<Fingerprint>,
        cache_dir: Option<&Path>,
        force_rebuild: bool,
    ) -> Result<IndexOutcome> {
        let _build = self.build_lock.lock().await;

        let corpus = Arc::new(manuals.clone());
        let (texts, chunk_metadata) = corpus.flatten();

        if texts.is_empty() {
            info!("No chunks found to index");
            self.install(IndexSnapshot {
                corpus,
                ..IndexSnapshot::default()
            })
            .await;
            return Ok(IndexOutcome::Empty);
        }

        let fingerprint = fingerprint.unwrap_or_else(|| crate::fingerprint::fingerprint(&corpus));
        let model_name = self.provider.model_name().to_string();
        let cache_dir = cache_dir.unwrap_or(self.config.cache_dir.as_path());
        let paths = CachePaths::new(&model_name, &fingerprint, cache_dir);

        if force_rebuild {
            debug!("Forced rebuild, skipping cache lookup");
        } else {
            let lookup = (paths.clone(), model_name.clone(), fingerprint.clone());
            let cached = tokio::task::spawn_blocking(move || {
                let (paths, model_name, fingerprint) = lookup;
                store::load(&paths, &model_name, &fingerprint)
            })
            .await?;

            if let Some((index, chunk_metadata)) = cached {
                let rows = index.len();
                self.install(IndexSnapshot {
                    corpus,
                    index,
                    chunk_metadata,
                    fingerprint: Some(fingerprint),
                })
                .await;
                return Ok(IndexOutcome::Loaded {
                    rows,
                    index_path: paths.index_path,
                });
            }
        }

        info!("Generating embeddings for {} chunks...", texts.len());
        let embeddings = self.provider.embed_texts(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(RetrieverError::EmbeddingCount {
                expected: texts.len(),
                actual: embeddings.len(),
            });
        }
        let index = VectorIndex::build(embeddings.embeddings)?;
        let rows = index.len();
        info!(
            "Built index with {rows} rows of dimension {}",
            index.dimension()
        );

        let snapshot = Arc::new(IndexSnapshot {
            corpus,
            index,
            chunk_metadata,
            fingerprint: Some(fingerprint.clone()),
        });
        self.install_arc(Arc::clone(&snapshot)).await;

        let index_path = paths.index_path.clone();
        let persisted = match tokio::task::spawn_blocking(move || {
            store::save(
                &snapshot.index,
                &snapshot.chunk_metadata,
                &model_name,
                &fingerprint,
                &paths,
            )
        })
        .await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Could not persist index, continuing with in-memory copy: {e}");
                false
            }
            Err(e) => {
                warn!("Index persistence task failed: {e}");
                false
            }
        };

        Ok(IndexOutcome::Built {
            rows,
            index_path,
            persisted,
        })
    }

    /// The `top_k` chunks nearest to `query`, optionally restricted to one
    /// group.
    ///
    /// Fetches `top_k * overfetch_factor` candidates from the whole index and
    /// filters those, so a group whose chunks all rank below that window
    /// yields fewer than `top_k` results (possibly none) even though it has
    /// matching chunks. An empty `group` means no filter.
    pub async fn search(
        &self,
        query: &str,
        group: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<VectorHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let snapshot = self.snapshot().await;
        if snapshot.is_empty() {
            debug!("Search on empty index");
            return Ok(Vec::new());
        }
        let group = group.filter(|g| !g.is_empty());

        let provider = Arc::clone(&self.provider);
        let query_vector = self
            .query_cache
            .get_or_compute(query, |normalized| async move {
                provider.embed_text(&normalized).await
            })
            .await?;

        let candidates = top_k
            .saturating_mul(self.config.overfetch_factor)
            .min(snapshot.index.len());
        let neighbors = snapshot.index.search(&query_vector, candidates)?;

        let mut hits = Vec::with_capacity(top_k);
        for neighbor in neighbors {
            let Some(meta) = snapshot.chunk_metadata.get(neighbor.row) else {
                continue;
            };
            if group.is_some_and(|wanted| wanted != meta.group) {
                continue;
            }
            let Some(chunk) = snapshot.corpus.chunk(&meta.group, meta.chunk_index) else {
                warn!(
                    "Index row {} points at missing chunk {}#{}",
                    neighbor.row, meta.group, meta.chunk_index
                );
                continue;
            };
            hits.push(VectorHit {
                text: chunk.text.clone(),
                group: meta.group.clone(),
                distance: neighbor.distance,
                chunk_index: meta.chunk_index,
            });
            if hits.len() == top_k {
                break;
            }
        }

        debug!(
            "Vector search returned {} of {top_k} requested from {candidates} candidates",
            hits.len()
        );
        Ok(hits)
    }

    /// Keyword search over the corpus of the current snapshot.
    /// Needs no embedding backend.
    pub async fn simple_keyword_search(
        &self,
        query: &str,
        group: Option<&str>,
        top_k: usize,
    ) -> Vec<KeywordHit> {
        let snapshot = self.snapshot().await;
        keyword::simple_keyword_search(
            &snapshot.corpus,
            query,
            group.filter(|g| !g.is_empty()),
            top_k,
        )
    }

    /// Vector search, falling back to keyword search when a group was given
    /// and vector search found nothing in it.
    ///
    /// Embedding errors are returned, not papered over with keyword results.
    pub async fn search_with_fallback(
        &self,
        query: &str,
        group: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let hits = self.search(query, group, top_k).await?;
        let group = group.filter(|g| !g.is_empty());

        match group {
            Some(group) if hits.is_empty() && top_k > 0 => {
                info!("No vector results in group '{group}', falling back to keyword search");
                Ok(self
                    .simple_keyword_search(query, Some(group), top_k)
                    .await
                    .into_iter()
                    .map(SearchHit::Keyword)
                    .collect())
            }
            _ => Ok(hits.into_iter().map(SearchHit::Vector).collect()),
        }
    }

    async fn install(&self, snapshot: IndexSnapshot) {
        self.install_arc(Arc::new(snapshot)).await;
    }

    async fn install_arc(&self, snapshot: Arc<IndexSnapshot>) {
        *self.snapshot.write().await = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manuals::Chunk;
    use manual_qa_embed::MockEmbeddingProvider;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    fn corpus() -> ManualsData {
        ManualsData::from_iter([
            (
                "MG Astor",
                vec![
                    Chunk::new("engine oil capacity four litres", 0, 5),
                    Chunk::new("tyre pressure thirty five psi", 5, 10),
                ],
            ),
            (
                "Tata Tiago",
                vec![Chunk::new("engine oil grade five w thirty", 0, 6)],
            ),
        ])
    }

    fn retriever(provider: Arc<MockEmbeddingProvider>, cache_dir: &Path) -> Retriever {
        Retriever::new(
            provider,
            RetrieverConfig::default().with_cache_dir(cache_dir),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_construction_does_not_load_model() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(MockEmbeddingProvider::new("mock", 32));
        let retriever = retriever(provider.clone(), dir.path());

        assert!(!retriever.provider().is_loaded());
        assert_eq!(provider.load_calls(), 0);
        assert!(retriever.snapshot().await.is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_build_then_search() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(MockEmbeddingProvider::new("mock", 64));
        let retriever = retriever(provider.clone(), dir.path());

        let outcome = retriever.load_or_build(&corpus()).await.unwrap();
        assert!(matches!(
            outcome,
            IndexOutcome::Built {
                rows: 3,
                persisted: true,
                ..
            }
        ));
        assert!(logs_contain("Generating embeddings for 3 chunks"));

        let hits = retriever
            .search("tyre pressure", Some("MG Astor"), 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "tyre pressure thirty five psi");
        assert_eq!(hits[0].chunk_index, 1);
    }

    #[tokio::test]
    async fn test_empty_corpus_never_touches_backend() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(MockEmbeddingProvider::new("mock", 8));
        let retriever = retriever(provider.clone(), dir.path());

        let outcome = retriever
            .load_or_build(&ManualsData::from_iter([("Empty", Vec::new())]))
            .await
            .unwrap();
        assert_eq!(outcome, IndexOutcome::Empty);
        assert!(retriever.search("anything", None, 5).await.unwrap().is_empty());
        assert_eq!(provider.load_calls(), 0);
        assert_eq!(provider.encode_calls(), 0);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_zero_top_k() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(MockEmbeddingProvider::new("mock", 8));
        let retriever = retriever(provider.clone(), dir.path());
        retriever.load_or_build(&corpus()).await.unwrap();

        assert!(retriever.search("engine", None, 0).await.unwrap().is_empty());
        assert!(retriever
            .search_with_fallback("engine", Some("MG Astor"), 0)
            .await
            .unwrap()
            .is_empty());
        // Only the build encoded anything
        assert_eq!(provider.encode_calls(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unwritable_cache_still_serves_searches() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();
        let provider = Arc::new(MockEmbeddingProvider::new("mock", 16));
        let retriever = retriever(provider, &blocker.join("cache"));

        let outcome = retriever.load_or_build(&corpus()).await.unwrap();
        assert!(matches!(outcome, IndexOutcome::Built { persisted: false, .. }));
        assert!(logs_contain("Could not persist index"));
        assert_eq!(retriever.search("engine oil", None, 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_keyword_search_uses_installed_corpus() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(MockEmbeddingProvider::new("mock", 16));
        let retriever = retriever(provider, dir.path());
        assert!(retriever.simple_keyword_search("engine", None, 5).await.is_empty());

        retriever.load_or_build(&corpus()).await.unwrap();
        let hits = retriever.simple_keyword_search("engine oil", Some(""), 5).await;
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_search_hit_serialization_is_tagged() {
        let hit = SearchHit::Keyword(KeywordHit {
            text: "engine oil".to_string(),
            group: "MG Astor".to_string(),
            chunk_index: 0,
            score: 2,
        });
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["source"], "keyword");
        assert_eq!(json["score"], 2);
        assert_eq!(hit.group(), "MG Astor");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let provider = Arc::new(MockEmbeddingProvider::new("mock", 8));
        let result = Retriever::new(provider, RetrieverConfig::default().with_overfetch_factor(0));
        assert!(matches!(result, Err(err) if err.is_configuration()));
    }
}
