
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{ChannelFrame, GenerationBackend, SegmentSource};
use crate::config::OllamaConfig;
use crate::{PagechatError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 120;

/// Generation backend talking to Ollama's `/api/generate` endpoint.
///
/// The primary channel uses `stream: true` and decodes the NDJSON body
/// incrementally; the fallback re-sends the prompt with `stream: false`
/// and delivers the whole answer as a single-frame source.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Client,
    url: Url,
    model: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// One NDJSON line from the streaming endpoint, or the whole body of a
/// non-streaming response. `response` carries the newly generated text.
#[derive(Debug, Deserialize)]
struct GenerateFrame {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaGenerator {
    /// # Errors
    /// `Channel` when the endpoint URL is invalid or the HTTP client
    /// cannot be built.
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let url = config
            .base_url()?
            .join("/api/generate")
            .map_err(|e| PagechatError::Channel(format!("invalid generate URL: {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS))
            .build()
            .map_err(|e| PagechatError::Channel(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            model: config.generation_model.clone(),
        })
    }
}

#[async_trait]
impl GenerationBackend for OllamaGenerator {
    async fn open_channel(&self, prompt: &str) -> Result<SegmentSource> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
        };

        debug!("Opening generation stream to {}", self.url);
        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| PagechatError::Channel(format!("transport error: {e}")))?;

        if !response.status().is_success() {
            return Err(PagechatError::Channel(format!(
                "HTTP {} from generation endpoint",
                response.status()
            )));
        }

        let body = response.bytes_stream().boxed();
        let frames = stream::unfold(
            (body, NdjsonDecoder::new(), false),
            |(mut body, mut decoder, finished)| async move {
                if finished {
                    return None;
                }
                loop {
                    match body.next().await {
                        Some(Ok(bytes)) => {
                            let frames = decoder.feed(&bytes);
                            if !frames.is_empty() {
                                return Some((stream::iter(frames), (body, decoder, false)));
                            }
                        }
                        Some(Err(e)) => {
                            let frames =
                                vec![ChannelFrame::Error(format!("stream transport error: {e}"))];
                            return Some((stream::iter(frames), (body, decoder, true)));
                        }
                        None => {
                            return Some((stream::iter(decoder.finish()), (body, decoder, true)));
                        }
                    }
                }
            },
        )
        .flatten();

        Ok(frames.boxed())
    }

    async fn send_once(&self, prompt: &str) -> Result<SegmentSource> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        debug!("Sending single-shot generation request to {}", self.url);
        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| PagechatError::Generation(format!("transport error: {e}")))?;

        if !response.status().is_success() {
            return Err(PagechatError::Generation(format!(
                "HTTP {} from generation endpoint",
                response.status()
            )));
        }

        let frame: GenerateFrame = response.json().await.map_err(|e| {
            PagechatError::Generation(format!("failed to parse generate response: {e}"))
        })?;

        if let Some(error) = frame.error {
            return Err(PagechatError::Generation(error));
        }

        let mut frames = Vec::with_capacity(2);
        if !frame.response.is_empty() {
            frames.push(ChannelFrame::Content(frame.response));
        }
        frames.push(ChannelFrame::Done);
        Ok(stream::iter(frames).boxed())
    }
}

/// Incremental NDJSON decoder for one generation channel.
///
/// Network chunks are buffered as raw bytes and split at newline bytes,
/// so a multi-byte character arriving half in one chunk and half in the
/// next is reassembled before any UTF-8 decoding happens. The reported
/// text folds into a cumulative buffer, so every emitted frame carries
/// cumulative content as the manager expects.
struct NdjsonDecoder {
    buffer: Vec<u8>,
    cumulative: String,
}

impl NdjsonDecoder {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            cumulative: String::new(),
        }
    }

    /// Buffer a network chunk and decode every complete line in it.
    fn feed(&mut self, bytes: &[u8]) -> Vec<ChannelFrame> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.decode_line(&line, &mut frames);
        }
        frames
    }

    /// Decode whatever is still buffered when the body ends. NDJSON
    /// bodies may omit the newline after the final line, and that line
    /// is usually the one carrying the done marker.
    fn finish(&mut self) -> Vec<ChannelFrame> {
        let rest = std::mem::take(&mut self.buffer);
        let mut frames = Vec::new();
        self.decode_line(&rest, &mut frames);
        frames
    }

    fn decode_line(&mut self, line: &[u8], frames: &mut Vec<ChannelFrame>) {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match serde_json::from_str::<GenerateFrame>(line) {
            Ok(frame) => {
                if let Some(error) = frame.error {
                    frames.push(ChannelFrame::Error(error));
                    return;
                }
                if !frame.response.is_empty() {
                    self.cumulative.push_str(&frame.response);
                    frames.push(ChannelFrame::Content(self.cumulative.clone()));
                }
                if frame.done {
                    frames.push(ChannelFrame::Done);
                }
            }
            Err(e) => frames.push(ChannelFrame::Error(format!("malformed stream frame: {e}"))),
        }
    }
}
