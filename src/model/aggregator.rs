//! Turns raw streaming fragments into partial events plus one final event.

use futures::StreamExt;

use super::ResponseStream;
use crate::types::{Content, FinishReason, LlmResponse, Part, Role, Usage};

/// Buffers streamed text so the stream ends with one consolidated response.
///
/// Text fragments pass through immediately as `partial`. A fragment with
/// non-text content (a function call, inline data) first flushes the buffer
/// as a consolidated response and is then passed through as final.
#[derive(Debug, Default)]
pub struct StreamingResponseAggregator {
    text: String,
    thought: String,
    usage: Option<Usage>,
    finish_reason: Option<FinishReason>,
    error_message: Option<String>,
}

impl StreamingResponseAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment; returns the responses to emit, in order.
    pub fn process(&mut self, mut response: LlmResponse) -> Vec<LlmResponse> {
        if response.usage.is_some() {
            self.usage = response.usage.clone();
        }
        if response.finish_reason.is_some() {
            self.finish_reason = response.finish_reason;
        }
        if response.error_message.is_some() {
            self.error_message = response.error_message.clone();
        }

        // Metadata-only chunk, typically the last one of a stream.
        if response.content.is_none() {
            return Vec::new();
        }

        let text_only = response
            .content
            .as_ref()
            .is_some_and(|c| !c.parts.is_empty() && c.parts.iter().all(Part::is_text));

        if text_only {
            for part in response.content.iter().flat_map(|c| c.parts.iter()) {
                if let Part::Text { text, thought } = part {
                    if *thought {
                        self.thought.push_str(text);
                    } else {
                        self.text.push_str(text);
                    }
                }
            }
            response.partial = true;
            return vec![response];
        }

        let mut out = Vec::with_capacity(2);
        if let Some(flushed) = self.flush(false) {
            out.push(flushed);
        }
        response.partial = false;
        out.push(response);
        out
    }

    /// Finish the stream: the consolidated response, or `None` when nothing
    /// is buffered.
    pub fn close(&mut self) -> Option<LlmResponse> {
        self.flush(true)
    }

    fn flush(&mut self, closing: bool) -> Option<LlmResponse> {
        if self.text.is_empty() && self.thought.is_empty() {
            return None;
        }
        let mut parts = Vec::with_capacity(2);
        if !self.thought.is_empty() {
            parts.push(Part::thought(std::mem::take(&mut self.thought)));
        }
        if !self.text.is_empty() {
            parts.push(Part::text(std::mem::take(&mut self.text)));
        }
        Some(LlmResponse {
            content: Some(Content::new(Role::Model, parts)),
            partial: false,
            turn_complete: closing,
            finish_reason: if closing { self.finish_reason } else { None },
            usage: self.usage.clone(),
            error_message: if closing { self.error_message.take() } else { None },
        })
    }
}

/// Run a raw fragment stream through a fresh aggregator.
///
/// An error is relayed and ends the stream without a consolidated response.
pub fn aggregate(stream: ResponseStream) -> ResponseStream {
    Box::pin(async_stream::stream! {
        let mut aggregator = StreamingResponseAggregator::new();
        let mut inner = stream;
        while let Some(item) = inner.next().await {
            match item {
                Ok(response) => {
                    for out in aggregator.process(response) {
                        yield Ok(out);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        if let Some(last) = aggregator.close() {
            yield Ok(last);
        }
    })
}
