//! Streamed one-shot search against the backend.
//!
//! The response body is newline-delimited JSON. Each packet is turned into a
//! call on a [`SearchHandlers`] implementation, always through a
//! [`GuardedDispatcher`] so nothing reaches the handlers once the query's
//! [`CancellationToken`] is cancelled.

use async_trait::async_trait;
use futures::StreamExt;
use shared::{
    domain::{EvaluationType, FlowType, MessageId, MessageType, PersonaId, SearchType},
    protocol::{
        Comments, DirectQaRequest, Quote, RelevanceSummaries, RetrievalOptions, RunSearch,
        SearchDoc, SearchFilters, StreamPacket, ThreadMessage,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::http::ApiClient;

pub const STREAM_ANSWER_PATH: &str = "/query/stream-answer-with-quote";

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: String,
    pub filters: SearchFilters,
    pub persona_id: PersonaId,
    pub narration: bool,
    pub offset: Option<u32>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, persona_id: PersonaId) -> Self {
        Self {
            query: query.into(),
            filters: SearchFilters::default(),
            persona_id,
            narration: false,
            offset: None,
        }
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_narration(mut self, narration: bool) -> Self {
        self.narration = narration;
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn to_request(&self) -> DirectQaRequest {
        DirectQaRequest {
            messages: vec![ThreadMessage {
                message: self.query.clone(),
                sender: None,
                role: MessageType::User,
            }],
            prompt_id: None,
            persona_id: self.persona_id,
            retrieval_options: RetrievalOptions {
                run_search: RunSearch::Always,
                real_time: true,
                filters: self.filters.clone(),
                enable_auto_detect_filters: None,
                offset: self.offset,
                limit: None,
            },
            evaluation_type: if self.narration {
                EvaluationType::Agentic
            } else {
                EvaluationType::Basic
            },
            chain_of_thought: false,
            return_contexts: false,
            skip_gen_ai_answer_generation: false,
        }
    }
}

/// One callback per stream event kind. Every method defaults to a no-op so
/// implementors only handle what they render.
#[async_trait]
pub trait SearchHandlers: Send {
    /// Receives the whole answer accumulated so far, not the single piece.
    async fn on_answer(&mut self, _answer: String) {}
    async fn on_quotes(&mut self, _quotes: Vec<Quote>) {}
    async fn on_documents(&mut self, _documents: Vec<SearchDoc>) {}
    async fn on_suggested_search_type(&mut self, _search_type: SearchType) {}
    async fn on_suggested_flow_type(&mut self, _flow_type: FlowType) {}
    async fn on_selected_doc_indices(&mut self, _indices: Vec<usize>) {}
    async fn on_error(&mut self, _error: String) {}
    async fn on_message_id(&mut self, _message_id: MessageId) {}
    async fn on_relevance(&mut self, _relevance: RelevanceSummaries) {}
    async fn on_comments(&mut self, _comments: Comments) {}
    async fn on_done(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// Routes packets to handlers, checking the token before every call.
pub struct GuardedDispatcher<'a, H: SearchHandlers + ?Sized> {
    token: CancellationToken,
    handlers: &'a mut H,
    answer: String,
}

impl<'a, H: SearchHandlers + ?Sized> GuardedDispatcher<'a, H> {
    pub fn new(token: CancellationToken, handlers: &'a mut H) -> Self {
        Self {
            token,
            handlers,
            answer: String::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns `false` once the token is cancelled; nothing was delivered then.
    pub async fn dispatch(&mut self, packet: StreamPacket) -> bool {
        if self.is_cancelled() {
            return false;
        }

        match packet {
            StreamPacket::AnswerPiece(piece) => {
                let Some(piece) = piece else {
                    return true;
                };
                self.answer.push_str(&piece);
                self.handlers.on_answer(self.answer.clone()).await;
            }
            StreamPacket::Documents(packet) => {
                debug!(
                    count = packet.top_documents.len(),
                    "search: received documents"
                );
                self.handlers.on_documents(packet.top_documents).await;
                if let Some(search_type) = packet.predicted_search {
                    if self.is_cancelled() {
                        return false;
                    }
                    self.handlers.on_suggested_search_type(search_type).await;
                }
                if let Some(flow_type) = packet.predicted_flow {
                    if self.is_cancelled() {
                        return false;
                    }
                    self.handlers.on_suggested_flow_type(flow_type).await;
                }
            }
            StreamPacket::Quotes(quotes) => self.handlers.on_quotes(quotes).await,
            StreamPacket::SelectedDocIndices(indices) => {
                self.handlers.on_selected_doc_indices(indices).await
            }
            StreamPacket::Error(error) => {
                warn!(error = %error, "search: backend reported stream error");
                self.handlers.on_error(error).await
            }
            StreamPacket::MessageId(message_id) => self.handlers.on_message_id(message_id).await,
            StreamPacket::Relevance(relevance) => self.handlers.on_relevance(relevance).await,
            StreamPacket::Comments(comments) => self.handlers.on_comments(comments).await,
            StreamPacket::Unknown(object) => {
                let keys: Vec<&str> = object.keys().map(String::as_str).collect();
                debug!(?keys, "search: ignoring unrecognized packet");
            }
        }

        !self.is_cancelled()
    }

    pub async fn error(&mut self, error: String) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.handlers.on_error(error).await;
        true
    }

    pub async fn done(&mut self) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.handlers.on_done().await;
        true
    }

    async fn dispatch_line(&mut self, line: &[u8]) -> bool {
        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        if text.is_empty() {
            return !self.is_cancelled();
        }
        match StreamPacket::parse(text) {
            Ok(packet) => self.dispatch(packet).await,
            Err(err) => {
                warn!("search: skipping malformed packet: {err}");
                !self.is_cancelled()
            }
        }
    }
}

/// Runs one streamed search to completion, failure, or cancellation.
///
/// Transport failures and non-2xx statuses are reported through
/// `on_error`; `on_done` fires only when the body ends normally.
pub async fn stream_search<H>(
    api: &ApiClient,
    query: &SearchQuery,
    token: CancellationToken,
    handlers: &mut H,
) -> StreamOutcome
where
    H: SearchHandlers + ?Sized,
{
    let request = query.to_request();
    let mut dispatcher = GuardedDispatcher::new(token.clone(), handlers);

    info!(
        persona_id = query.persona_id.0,
        narration = query.narration,
        "search: starting streamed query"
    );

    let response = tokio::select! {
        biased;
        _ = token.cancelled() => return StreamOutcome::Cancelled,
        response = api.post_stream(STREAM_ANSWER_PATH, &request) => response,
    };
    let response = match response {
        Ok(response) => response,
        Err(err) => {
            warn!(status = ?err.status(), "search: stream request failed: {err}");
            return if dispatcher.error(err.detail()).await {
                StreamOutcome::Failed
            } else {
                StreamOutcome::Cancelled
            };
        }
    };

    let mut body = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        let chunk = tokio::select! {
            biased;
            _ = token.cancelled() => return StreamOutcome::Cancelled,
            chunk = body.next() => chunk,
        };

        match chunk {
            None => break,
            Some(Ok(bytes)) => {
                buffer.extend_from_slice(&bytes);
                while let Some(pos) = buffer.iter().position(|byte| *byte == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    if !dispatcher.dispatch_line(&line).await {
                        return StreamOutcome::Cancelled;
                    }
                }
            }
            Some(Err(err)) => {
                warn!("search: stream interrupted: {err}");
                return if dispatcher.error(format!("stream interrupted: {err}")).await {
                    StreamOutcome::Failed
                } else {
                    StreamOutcome::Cancelled
                };
            }
        }
    }

    if !buffer.is_empty() && !dispatcher.dispatch_line(&buffer).await {
        return StreamOutcome::Cancelled;
    }

    if dispatcher.done().await {
        info!("search: stream completed");
        StreamOutcome::Completed
    } else {
        StreamOutcome::Cancelled
    }
}

#[cfg(test)]
#[path = "tests/stream_tests.rs"]
mod tests;
