
pub mod ollama;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{PagechatError, Result};

/// One frame received from a generation backend.
///
/// `Content` carries the full text produced so far (cumulative), not a
/// delta; the manager diffs consecutive frames before forwarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFrame {
    Content(String),
    Done,
    Error(String),
}

/// A finite sequence of frames from one generation exchange. Dropping the
/// source disconnects the underlying channel.
pub type SegmentSource = BoxStream<'static, ChannelFrame>;

/// Generation backend transports, primary and fallback.
#[async_trait]
pub trait GenerationBackend: Send + Sync + 'static {
    /// Open the persistent streaming channel and submit the prompt.
    ///
    /// # Errors
    /// `Channel` when the channel cannot be established; this failure is
    /// recoverable and makes the manager fall back to [`Self::send_once`].
    async fn open_channel(&self, prompt: &str) -> Result<SegmentSource>;

    /// Single request/response exchange used as the fallback path. The
    /// backend may still deliver multiple frames for the one request.
    ///
    /// # Errors
    /// `Generation` on failure; fallback errors are fatal for the query.
    async fn send_once(&self, prompt: &str) -> Result<SegmentSource>;
}

/// Lifecycle of one generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Streaming,
    Done,
    Errored,
}

/// Ephemeral state for one in-flight generation, owned by the driver task
/// and discarded when the run completes or errors. Each run gets a fresh
/// session, so cumulative-length tracking never leaks across queries.
#[derive(Debug)]
pub struct StreamSession {
    pub prompt_text: String,
    pub accumulated_text: String,
    pub status: SessionStatus,
}

impl StreamSession {
    fn new(prompt: &str) -> Self {
        Self {
            prompt_text: prompt.to_string(),
            accumulated_text: String::new(),
            status: SessionStatus::Pending,
        }
    }

    /// Absorb a cumulative content frame, returning the suffix beyond what
    /// was already seen. `None` when the frame adds nothing.
    fn absorb(&mut self, cumulative: &str) -> Result<Option<String>> {
        let seen = self.accumulated_text.chars().count();
        let total = cumulative.chars().count();
        if total < seen {
            return Err(PagechatError::Generation(
                "backend cumulative content shrank between frames".to_string(),
            ));
        }
        if total == seen {
            return Ok(None);
        }
        let delta: String = cumulative.chars().skip(seen).collect();
        self.accumulated_text = cumulative.to_string();
        Ok(Some(delta))
    }
}

/// Incremental output of [`GenerationManager::generate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerEvent {
    /// Newly generated text since the previous event.
    Delta(String),
    /// Terminal signal carrying the complete answer.
    Done { answer: String },
}

/// Consumer side of one generation run: a finite stream yielding deltas
/// followed by exactly one terminal item (`Done` or an error). Dropping
/// it abandons the session; the driver disconnects the backend channel
/// and delivers nothing further.
pub struct AnswerStream {
    receiver: mpsc::Receiver<Result<AnswerEvent>>,
}

impl Stream for AnswerStream {
    type Item = Result<AnswerEvent>;

    #[inline]
    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Drives streamed answer generation with a single-shot fallback.
///
/// The primary path opens the backend's streaming channel; if that fails
/// the prompt is re-sent once over the single-exchange fallback. A
/// generation-level error on an established channel is terminal and does
/// not trigger fallback.
pub struct GenerationManager<B> {
    backend: Arc<B>,
}

impl<B: GenerationBackend> GenerationManager<B> {
    #[inline]
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Start a generation run for `prompt`. Each call is an independent
    /// session; the returned stream is finite and not restartable.
    #[inline]
    pub fn generate(&self, prompt: &str) -> AnswerStream {
        let (sender, receiver) = mpsc::channel(16);
        let backend = Arc::clone(&self.backend);
        let session = StreamSession::new(prompt);
        tokio::spawn(drive_session(backend, session, sender));
        AnswerStream { receiver }
    }
}

async fn drive_session<B: GenerationBackend>(
    backend: Arc<B>,
    mut session: StreamSession,
    sender: mpsc::Sender<Result<AnswerEvent>>,
) {
    let source = match backend.open_channel(&session.prompt_text).await {
        Ok(source) => source,
        Err(PagechatError::Channel(reason)) => {
            warn!("Stream channel unavailable, falling back to single exchange: {reason}");
            match backend.send_once(&session.prompt_text).await {
                Ok(source) => source,
                Err(e) => {
                    session.status = SessionStatus::Errored;
                    let _ = sender.send(Err(e)).await;
                    return;
                }
            }
        }
        Err(e) => {
            session.status = SessionStatus::Errored;
            let _ = sender.send(Err(e)).await;
            return;
        }
    };

    pump_frames(source, &mut session, &sender).await;
}

async fn pump_frames(
    mut source: SegmentSource,
    session: &mut StreamSession,
    sender: &mpsc::Sender<Result<AnswerEvent>>,
) {
    session.status = SessionStatus::Streaming;

    while let Some(frame) = source.next().await {
        match frame {
            ChannelFrame::Content(cumulative) => match session.absorb(&cumulative) {
                Ok(None) => {}
                Ok(Some(delta)) => {
                    if sender.send(Ok(AnswerEvent::Delta(delta))).await.is_err() {
                        // Consumer abandoned the session; disconnect
                        // without emitting a terminal.
                        debug!("Answer stream dropped, disconnecting channel");
                        return;
                    }
                }
                Err(e) => {
                    session.status = SessionStatus::Errored;
                    let _ = sender.send(Err(e)).await;
                    return;
                }
            },
            ChannelFrame::Done => {
                session.status = SessionStatus::Done;
                debug!(
                    "Generation complete ({} chars)",
                    session.accumulated_text.chars().count()
                );
                let answer = session.accumulated_text.clone();
                let _ = sender.send(Ok(AnswerEvent::Done { answer })).await;
                return;
            }
            ChannelFrame::Error(message) => {
                session.status = SessionStatus::Errored;
                let _ = sender.send(Err(PagechatError::Generation(message))).await;
                return;
            }
        }
    }

    // The backend closed the stream without a terminal frame.
    session.status = SessionStatus::Errored;
    let _ = sender
        .send(Err(PagechatError::Generation(
            "backend stream ended without a done signal".to_string(),
        )))
        .await;
}

/// Compose the grounded prompt sent to the generation backend from a user
/// question and the retrieved page excerpts.
#[inline]
pub fn compose_grounded_prompt(question: &str, passages: &[String]) -> String {
    let mut prompt =
        String::from("Answer the question using only the provided page excerpts.\n\n");
    for (i, passage) in passages.iter().enumerate() {
        prompt.push_str(&format!("Excerpt {}:\n{}\n\n", i + 1, passage.trim()));
    }
    prompt.push_str(&format!("Question: {question}\nAnswer:"));
    prompt
}
