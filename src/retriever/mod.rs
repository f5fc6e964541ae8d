#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::chunker::{self, ChunkerConfig};
use crate::embeddings::EmbeddingProvider;
use crate::highlight::{self, HighlightSource};
use crate::index::{SearchResult, VectorIndex};
use crate::notify::{BusyGuard, UiNotice, UiNotifier};
use crate::{PagechatError, Result};

/// Per-use-case retrieval settings. The two deployed granularities are
/// exposed as presets; nothing is hardcoded beyond their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieverConfig {
    pub chunker: ChunkerConfig,
    /// Default result count for [`Retriever::answer_query`].
    pub top_k: usize,
}

impl RetrieverConfig {
    /// Fine chunks, few results: DOM highlighting.
    #[inline]
    pub fn highlighting() -> Self {
        Self {
            chunker: ChunkerConfig::fine(),
            top_k: 3,
        }
    }

    /// Coarse chunks, more results: chat grounding.
    #[inline]
    pub fn chat() -> Self {
        Self {
            chunker: ChunkerConfig::coarse(),
            top_k: 5,
        }
    }
}

impl Default for RetrieverConfig {
    #[inline]
    fn default() -> Self {
        Self::chat()
    }
}

/// The one piece of process-wide shared state: the current index, the
/// content it was built from, and the generation number of the build that
/// installed it. Replaced whole under the lock, never mutated in place.
#[derive(Default)]
struct IndexSlot {
    index: Option<Arc<VectorIndex>>,
    content: Option<String>,
    generation: u64,
}

/// Coordinates chunking, embedding and index builds on content change,
/// and embed-then-search on user questions.
///
/// Concurrent rebuilds resolve by issuance order: each build takes a
/// monotonically increasing generation number up front, and a build only
/// installs its index if no newer build has installed first. Queries
/// snapshot the current index `Arc` once at entry and search that
/// snapshot even if a rebuild lands mid-flight.
pub struct Retriever<E> {
    provider: E,
    notifier: Arc<dyn UiNotifier>,
    config: RetrieverConfig,
    slot: Mutex<IndexSlot>,
    issued: AtomicU64,
}

impl<E: EmbeddingProvider> Retriever<E> {
    #[inline]
    pub fn new(provider: E, notifier: Arc<dyn UiNotifier>, config: RetrieverConfig) -> Self {
        Self {
            provider,
            notifier,
            config,
            slot: Mutex::new(IndexSlot::default()),
            issued: AtomicU64::new(0),
        }
    }

    /// Handle new page content: chunk, embed, build and atomically swap
    /// in a fresh index.
    ///
    /// Empty content raises a `NoContent` notice and takes no indexing
    /// action; content identical to the currently indexed page is a
    /// silent no-op. On failure the previous index stays intact and the
    /// error is surfaced to the UI.
    #[inline]
    pub async fn on_content_changed(&self, new_content: &str) -> Result<()> {
        if new_content.is_empty() {
            self.notifier.notify(UiNotice::NoContent);
            return Ok(());
        }

        {
            let slot = self.slot.lock().expect("index slot lock poisoned");
            if slot.content.as_deref() == Some(new_content) {
                debug!("Content unchanged, skipping rebuild");
                return Ok(());
            }
        }

        let _busy = BusyGuard::engage(Arc::clone(&self.notifier));
        // Issuance order decides which concurrent build wins.
        let generation = self.issued.fetch_add(1, Ordering::SeqCst) + 1;

        let result = self.rebuild(generation, new_content).await;
        if let Err(e) = &result {
            self.notifier
                .notify(UiNotice::Error(format!("Indexing failed: {e}")));
        }
        result
    }

    async fn rebuild(&self, generation: u64, content: &str) -> Result<()> {
        let chunks = chunker::split(content, &self.config.chunker)?;
        debug!(
            "Rebuild generation {} produced {} chunks",
            generation,
            chunks.len()
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.provider.embed(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(PagechatError::EmbeddingUnavailable(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        let entries: Vec<(String, Vec<f32>)> = chunks
            .into_iter()
            .map(|c| c.text)
            .zip(embeddings)
            .collect();
        let index = VectorIndex::build(entries)?;

        let mut slot = self.slot.lock().expect("index slot lock poisoned");
        if generation <= slot.generation {
            // A newer build finished first; this one loses.
            warn!(
                "Discarding stale index build (generation {} <= installed {})",
                generation, slot.generation
            );
            return Ok(());
        }
        info!(
            "Installed index generation {} with {} records",
            generation,
            index.len()
        );
        slot.index = Some(Arc::new(index));
        slot.content = Some(content.to_string());
        slot.generation = generation;
        Ok(())
    }

    /// Answer a user question with the configured default `top_k`.
    #[inline]
    pub async fn answer_query(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.answer_query_top_k(query, self.config.top_k).await
    }

    /// Embed the question as a single-item batch and rank passages from
    /// the current index snapshot.
    ///
    /// # Errors
    /// `NotReady` when no index has ever been built.
    #[inline]
    pub async fn answer_query_top_k(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let snapshot = {
            let slot = self.slot.lock().expect("index slot lock poisoned");
            slot.index.clone()
        }
        .ok_or(PagechatError::NotReady)?;

        let _busy = BusyGuard::engage(Arc::clone(&self.notifier));
        let result = self.search_snapshot(&snapshot, query, top_k).await;
        if let Err(e) = &result {
            self.notifier
                .notify(UiNotice::Error(format!("Search failed: {e}")));
        }
        result
    }

    async fn search_snapshot(
        &self,
        snapshot: &VectorIndex,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let batch = vec![query.to_string()];
        let mut embeddings = self.provider.embed(&batch).await?;
        let query_embedding = if embeddings.is_empty() {
            return Err(PagechatError::EmbeddingUnavailable(
                "backend returned no embedding for the query".to_string(),
            ));
        } else {
            embeddings.swap_remove(0)
        };

        let results = snapshot.search(&query_embedding, top_k)?;
        debug!("Query matched {} passages", results.len());
        Ok(results)
    }

    /// Ordered list of strings for the host to highlight in the page,
    /// taken from the top-ranked passages for `query`.
    #[inline]
    pub async fn highlight_targets(&self, query: &str) -> Result<Vec<String>> {
        let results = self.answer_query(query).await?;
        let sources: Vec<HighlightSource> = results
            .into_iter()
            .map(|r| HighlightSource::Plain(r.record.text))
            .collect();
        Ok(highlight::flatten_all(&sources))
    }

    /// Whether an index is currently installed.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.slot
            .lock()
            .expect("index slot lock poisoned")
            .index
            .is_some()
    }
}
