use super::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

/// Deterministic embedding: a 4-bucket byte histogram. Identical texts
/// embed identically, so a query equal to a chunk scores 1.0 against it.
fn embed_text(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 4];
    for (i, b) in text.bytes().enumerate() {
        v[i % 4] += f32::from(b);
    }
    v
}

#[derive(Default)]
struct ProviderState {
    embed_calls: AtomicUsize,
    fail_next: AtomicBool,
    /// Drop the last vector from the next batch, violating the
    /// one-vector-per-input contract.
    short_next: AtomicBool,
    /// Batches containing a key as a substring block until notified.
    gates: std::sync::Mutex<HashMap<String, Arc<Notify>>>,
}

/// Embedding fake with call counting, scripted failure and per-content
/// gating so tests can hold a build or query mid-embed.
#[derive(Clone, Default)]
struct TestProvider {
    state: Arc<ProviderState>,
}

impl TestProvider {
    fn gate(&self, key: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state
            .gates
            .lock()
            .expect("gate map lock poisoned")
            .insert(key.to_string(), Arc::clone(&gate));
        gate
    }

    fn embed_calls(&self) -> usize {
        self.state.embed_calls.load(Ordering::SeqCst)
    }

    async fn wait_for_calls(&self, at_least: usize) {
        let mut waited = Duration::ZERO;
        while self.embed_calls() < at_least {
            assert!(
                waited < Duration::from_secs(5),
                "embed was never called {at_least} times"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
            waited += Duration::from_millis(5);
        }
    }
}

#[async_trait]
impl EmbeddingProvider for TestProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.state.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_next.swap(false, Ordering::SeqCst) {
            return Err(PagechatError::EmbeddingUnavailable(
                "backend offline".to_string(),
            ));
        }
        let gate = {
            let gates = self.state.gates.lock().expect("gate map lock poisoned");
            gates
                .iter()
                .find(|(key, _)| texts.iter().any(|t| t.contains(key.as_str())))
                .map(|(_, gate)| Arc::clone(gate))
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let mut vectors: Vec<Vec<f32>> = texts.iter().map(|t| embed_text(t)).collect();
        if self.state.short_next.swap(false, Ordering::SeqCst) {
            vectors.pop();
        }
        Ok(vectors)
    }
}

/// Notifier that records every notice for later assertions.
#[derive(Default)]
struct CaptureNotifier {
    notices: std::sync::Mutex<Vec<UiNotice>>,
}

impl CaptureNotifier {
    fn notices(&self) -> Vec<UiNotice> {
        self.notices.lock().expect("notice lock poisoned").clone()
    }
}

impl UiNotifier for CaptureNotifier {
    fn notify(&self, notice: UiNotice) {
        self.notices
            .lock()
            .expect("notice lock poisoned")
            .push(notice);
    }
}

fn retriever_with(
    provider: TestProvider,
    notifier: Arc<CaptureNotifier>,
) -> Retriever<TestProvider> {
    let config = RetrieverConfig {
        chunker: ChunkerConfig {
            max_size: 30,
            overlap: 0,
        },
        top_k: 3,
    };
    Retriever::new(provider, notifier, config)
}

#[tokio::test]
async fn querying_before_any_index_is_not_ready() {
    let retriever = retriever_with(TestProvider::default(), Arc::default());

    let result = retriever.answer_query("anything").await;

    assert!(matches!(result, Err(PagechatError::NotReady)));
    assert!(!retriever.is_ready());
}

#[tokio::test]
async fn empty_content_raises_no_content_and_builds_nothing() {
    let provider = TestProvider::default();
    let notifier = Arc::new(CaptureNotifier::default());
    let retriever = retriever_with(provider.clone(), Arc::clone(&notifier));

    retriever
        .on_content_changed("")
        .await
        .expect("empty content is not an error");

    assert_eq!(notifier.notices(), vec![UiNotice::NoContent]);
    assert_eq!(provider.embed_calls(), 0);
    assert!(!retriever.is_ready());
}

#[tokio::test]
async fn unchanged_content_does_not_rebuild() {
    let provider = TestProvider::default();
    let notifier = Arc::new(CaptureNotifier::default());
    let retriever = retriever_with(provider.clone(), Arc::clone(&notifier));

    retriever
        .on_content_changed("the page text")
        .await
        .expect("build should succeed");
    assert_eq!(provider.embed_calls(), 1);
    assert!(retriever.is_ready());

    retriever
        .on_content_changed("the page text")
        .await
        .expect("no-op should succeed");
    assert_eq!(provider.embed_calls(), 1);
}

#[tokio::test]
async fn busy_notices_bracket_a_rebuild() {
    let notifier = Arc::new(CaptureNotifier::default());
    let retriever = retriever_with(TestProvider::default(), Arc::clone(&notifier));

    retriever
        .on_content_changed("some page text")
        .await
        .expect("build should succeed");

    assert_eq!(
        notifier.notices(),
        vec![UiNotice::Busy(true), UiNotice::Busy(false)]
    );
}

#[tokio::test]
async fn query_returns_the_matching_passage_first() {
    let retriever = retriever_with(TestProvider::default(), Arc::default());
    retriever
        .on_content_changed("First paragraph here.\n\nSecond paragraph there.\n\nThird one.")
        .await
        .expect("build should succeed");

    let results = retriever
        .answer_query("Second paragraph there.\n\n")
        .await
        .expect("query should succeed");

    assert!(!results.is_empty());
    assert_eq!(results[0].record.text, "Second paragraph there.\n\n");
    assert!((results[0].score - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn highlight_targets_are_the_top_passage_texts() {
    let retriever = retriever_with(TestProvider::default(), Arc::default());
    retriever
        .on_content_changed("Alpha highlight section.\n\nBeta highlight section.")
        .await
        .expect("build should succeed");

    let targets = retriever
        .highlight_targets("Alpha highlight section.\n\n")
        .await
        .expect("query should succeed");

    assert_eq!(targets.len(), 2);
    assert_eq!(targets[0], "Alpha highlight section.\n\n");
}

#[tokio::test]
async fn embed_failure_keeps_the_previous_index() {
    let provider = TestProvider::default();
    let notifier = Arc::new(CaptureNotifier::default());
    let retriever = retriever_with(provider.clone(), Arc::clone(&notifier));

    retriever
        .on_content_changed("original page")
        .await
        .expect("first build should succeed");

    provider.state.fail_next.store(true, Ordering::SeqCst);
    let result = retriever.on_content_changed("replacement page").await;
    assert!(matches!(
        result,
        Err(PagechatError::EmbeddingUnavailable(_))
    ));
    assert!(
        notifier
            .notices()
            .iter()
            .any(|n| matches!(n, UiNotice::Error(_))),
        "failure should be surfaced to the UI"
    );

    // The old index still answers.
    let results = retriever
        .answer_query("original page")
        .await
        .expect("old index should survive the failed rebuild");
    assert_eq!(results[0].record.text, "original page");
}

#[tokio::test]
async fn missing_embeddings_fail_the_rebuild() {
    let provider = TestProvider::default();
    let notifier = Arc::new(CaptureNotifier::default());
    let retriever = retriever_with(provider.clone(), Arc::clone(&notifier));

    provider.state.short_next.store(true, Ordering::SeqCst);
    let result = retriever
        .on_content_changed("First paragraph here.\n\nSecond paragraph there.\n\nThird one.")
        .await;

    assert!(matches!(
        result,
        Err(PagechatError::EmbeddingUnavailable(_))
    ));
    assert!(
        notifier
            .notices()
            .iter()
            .any(|n| matches!(n, UiNotice::Error(_))),
        "short batch should be surfaced to the UI"
    );
    assert!(!retriever.is_ready());
}

#[tokio::test]
async fn stale_build_loses_to_a_newer_one() {
    let provider = TestProvider::default();
    let retriever = Arc::new(retriever_with(provider.clone(), Arc::default()));
    let gate = provider.gate("slow page");

    let held = {
        let retriever = Arc::clone(&retriever);
        tokio::spawn(async move { retriever.on_content_changed("slow page content").await })
    };
    // The held build has taken its generation number once its embed call
    // is in flight.
    provider.wait_for_calls(1).await;

    retriever
        .on_content_changed("fast page content")
        .await
        .expect("newer build should succeed");

    gate.notify_one();
    held.await
        .expect("build task should not panic")
        .expect("stale build completes without error");

    let results = retriever
        .answer_query("fast page content")
        .await
        .expect("query should succeed");
    assert_eq!(results[0].record.text, "fast page content");
}

#[tokio::test]
async fn queries_search_the_snapshot_taken_at_entry() {
    let provider = TestProvider::default();
    let retriever = Arc::new(retriever_with(provider.clone(), Arc::default()));
    retriever
        .on_content_changed("alpha passage")
        .await
        .expect("first build should succeed");

    let gate = provider.gate("held question");
    let query = {
        let retriever = Arc::clone(&retriever);
        tokio::spawn(async move { retriever.answer_query("held question").await })
    };
    // Build embed was call 1; the gated query embed is call 2.
    provider.wait_for_calls(2).await;

    retriever
        .on_content_changed("beta passage")
        .await
        .expect("rebuild should succeed");

    gate.notify_one();
    let results = query
        .await
        .expect("query task should not panic")
        .expect("query should succeed");

    assert_eq!(results[0].record.text, "alpha passage");
}
