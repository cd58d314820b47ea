//! One search view: owns the state store, the phase tracker, and the single
//! live query.
//!
//! Submitting a query cancels the previous [`CancellationToken`] before the
//! new stream starts. Phase timers run under a child token of the query's
//! token, so a new query (or a terminal event) disarms them explicitly.

use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{ChatSessionId, FlowType, MessageId, SearchType},
    protocol::{
        ChatSessionDetails, ChatSessionsResponse, Comments, Quote, RelevanceSummaries, SearchDoc,
        SearchSessionDetail,
    },
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    error::RequestError,
    http::ApiClient,
    phase::{Phase, PhaseEffect, PhaseTiming, PhaseTracker},
    store::{RestoredSearch, SearchResponse, SessionStateStore},
    stream::{stream_search, SearchHandlers, SearchQuery, StreamOutcome},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseField {
    Answer,
    Quotes,
    Documents,
    SuggestedSearchType,
    SuggestedFlowType,
    SelectedDocIndices,
    Error,
    MessageId,
    Relevance,
    Comments,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    QueryStarted { query: String },
    Updated(ResponseField),
    PhaseChanged(Phase),
    Finished(StreamOutcome),
    Restored { session_id: ChatSessionId },
}

/// Point-in-time copy of the view state for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub query: Option<String>,
    pub response: SearchResponse,
    pub display_quotes: Vec<Quote>,
    pub phase: Phase,
}

struct SessionInner {
    store: SessionStateStore,
    tracker: PhaseTracker,
    query_token: CancellationToken,
    timers: CancellationToken,
}

struct Shared {
    inner: Mutex<SessionInner>,
    events: broadcast::Sender<SessionEvent>,
}

struct ActiveQuery {
    token: CancellationToken,
    task: JoinHandle<StreamOutcome>,
}

pub struct SearchSession {
    api: ApiClient,
    shared: Arc<Shared>,
    active: Mutex<Option<ActiveQuery>>,
}

impl SearchSession {
    pub fn new(api: ApiClient, timing: PhaseTiming) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let idle = CancellationToken::new();
        idle.cancel();
        Arc::new(Self {
            api,
            shared: Arc::new(Shared {
                inner: Mutex::new(SessionInner {
                    store: SessionStateStore::new(),
                    tracker: PhaseTracker::new(false, timing),
                    query_token: idle.clone(),
                    timers: idle,
                }),
                events,
            }),
            active: Mutex::new(None),
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.shared.inner.lock().await;
        SessionSnapshot {
            query: inner.store.query().map(str::to_string),
            response: inner.store.response().clone(),
            display_quotes: inner.store.display_quotes(),
            phase: inner.tracker.phase(),
        }
    }

    pub async fn phase(&self) -> Phase {
        self.shared.inner.lock().await.tracker.phase()
    }

    /// Starts `query`, superseding any live one. The returned token belongs to
    /// the new query; cancelling it silences the stream and its timers.
    pub async fn submit(&self, query: SearchQuery) -> CancellationToken {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            previous.token.cancel();
            debug!("session: cancelled superseded query");
        }

        let (token, mut handlers) = self.begin(&query).await;
        let api = self.api.clone();
        let stream_token = token.clone();
        let task = tokio::spawn(async move {
            let outcome = stream_search(&api, &query, stream_token, &mut handlers).await;
            handlers.finished(outcome).await;
            outcome
        });

        *active = Some(ActiveQuery {
            token: token.clone(),
            task,
        });
        token
    }

    /// Waits for the live query's stream task, if any.
    pub async fn wait(&self) -> Option<StreamOutcome> {
        let active = self.active.lock().await.take()?;
        match active.task.await {
            Ok(outcome) => Some(outcome),
            Err(err) if err.is_cancelled() => Some(StreamOutcome::Cancelled),
            Err(err) => {
                error!("session: stream task failed: {err}");
                Some(StreamOutcome::Failed)
            }
        }
    }

    pub async fn cancel(&self) {
        if let Some(active) = self.active.lock().await.take() {
            active.token.cancel();
        }
        let mut inner = self.shared.inner.lock().await;
        inner.query_token.cancel();
        let effect = inner.tracker.finish();
        self.shared.apply_effect(&mut inner, effect);
    }

    /// Resets the view for `query` and returns the new token plus the
    /// handlers that feed this session.
    async fn begin(&self, query: &SearchQuery) -> (CancellationToken, SessionHandlers) {
        let token = CancellationToken::new();
        {
            let mut inner = self.shared.inner.lock().await;
            inner.query_token.cancel();
            inner.query_token = token.clone();
            inner.store.reset(query.query.clone(), query.filters.clone());
            inner.tracker.set_narration(query.narration);
            let _ = self.shared.events.send(SessionEvent::QueryStarted {
                query: query.query.clone(),
            });
            let effect = inner.tracker.start_query();
            self.shared.apply_effect(&mut inner, effect);
        }

        info!(narration = query.narration, "session: query started");

        (
            token.clone(),
            SessionHandlers {
                shared: Arc::clone(&self.shared),
                token,
            },
        )
    }

    /// Loads a saved search into the view, replacing whatever was shown.
    pub async fn load_saved(&self, session_id: ChatSessionId) -> Result<(), RequestError> {
        let detail: SearchSessionDetail = self
            .api
            .get_json(&format!("/query/search-session/{}", session_id.0))
            .await?;

        if let Some(active) = self.active.lock().await.take() {
            active.token.cancel();
        }

        {
            let mut inner = self.shared.inner.lock().await;
            inner.query_token.cancel();
            inner.store.replace(RestoredSearch::from_detail(detail));
            let effect = inner.tracker.finish();
            self.shared.apply_effect(&mut inner, effect);
        }

        info!(session_id = session_id.0, "session: restored saved search");
        let _ = self.shared.events.send(SessionEvent::Restored { session_id });
        Ok(())
    }

    pub async fn list_user_searches(&self) -> Result<Vec<ChatSessionDetails>, RequestError> {
        let response: ChatSessionsResponse = self.api.get_json("/query/user-searches").await?;
        Ok(response.sessions)
    }
}

impl Shared {
    fn apply_effect(self: &Arc<Self>, inner: &mut SessionInner, effect: PhaseEffect) {
        if effect.cancel_pending {
            inner.timers.cancel();
            inner.timers = inner.query_token.child_token();
        }
        if let Some(phase) = effect.changed_to {
            debug!(phase = %phase, "phase: changed");
            let _ = self.events.send(SessionEvent::PhaseChanged(phase));
        }
        for scheduled in effect.schedule {
            let deadline = Instant::now() + scheduled.delay;
            let timer = inner.timers.clone();
            let shared = Arc::clone(self);
            tokio::spawn(async move {
                tokio::select! {
                    _ = timer.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {
                        let mut inner = shared.inner.lock().await;
                        if timer.is_cancelled() {
                            return;
                        }
                        if inner.tracker.apply(scheduled.phase, deadline) {
                            debug!(phase = %scheduled.phase, "phase: timer advanced");
                            let _ = shared.events.send(SessionEvent::PhaseChanged(scheduled.phase));
                        }
                    }
                }
            });
        }
    }
}

/// Handler set bound to one query's token; feeds the store and the tracker.
pub(crate) struct SessionHandlers {
    shared: Arc<Shared>,
    token: CancellationToken,
}

impl SessionHandlers {
    async fn update<F>(&self, field: ResponseField, apply: F)
    where
        F: FnOnce(&mut SessionInner) -> PhaseEffect + Send,
    {
        let mut inner = self.shared.inner.lock().await;
        // A newer query may have reset the view while this one waited.
        if self.token.is_cancelled() {
            return;
        }
        let effect = apply(&mut inner);
        self.shared.apply_effect(&mut inner, effect);
        let _ = self.shared.events.send(SessionEvent::Updated(field));
    }

    async fn finished(&self, outcome: StreamOutcome) {
        if outcome == StreamOutcome::Cancelled || self.token.is_cancelled() {
            return;
        }
        let _ = self.shared.events.send(SessionEvent::Finished(outcome));
    }
}

#[async_trait]
impl SearchHandlers for SessionHandlers {
    async fn on_answer(&mut self, answer: String) {
        let now = Instant::now();
        self.update(ResponseField::Answer, move |inner| {
            inner.store.update_answer(answer);
            inner.tracker.on_answer(now)
        })
        .await;
    }

    async fn on_quotes(&mut self, quotes: Vec<Quote>) {
        self.update(ResponseField::Quotes, |inner| {
            inner.store.update_quotes(quotes);
            inner.tracker.finish()
        })
        .await;
    }

    async fn on_documents(&mut self, documents: Vec<SearchDoc>) {
        self.update(ResponseField::Documents, |inner| {
            let count = documents.len();
            inner.store.update_documents(documents);
            inner.tracker.on_documents(count)
        })
        .await;
    }

    async fn on_suggested_search_type(&mut self, search_type: SearchType) {
        self.update(ResponseField::SuggestedSearchType, |inner| {
            inner.store.update_suggested_search_type(search_type);
            PhaseEffect::default()
        })
        .await;
    }

    async fn on_suggested_flow_type(&mut self, flow_type: FlowType) {
        self.update(ResponseField::SuggestedFlowType, |inner| {
            inner.store.update_suggested_flow_type(flow_type);
            PhaseEffect::default()
        })
        .await;
    }

    async fn on_selected_doc_indices(&mut self, indices: Vec<usize>) {
        self.update(ResponseField::SelectedDocIndices, |inner| {
            inner.store.update_selected_doc_indices(indices);
            inner.tracker.on_selected_docs()
        })
        .await;
    }

    async fn on_error(&mut self, error: String) {
        self.update(ResponseField::Error, |inner| {
            inner.store.update_error(error);
            inner.tracker.finish()
        })
        .await;
    }

    async fn on_message_id(&mut self, message_id: MessageId) {
        self.update(ResponseField::MessageId, |inner| {
            inner.store.update_message_id(message_id);
            PhaseEffect::default()
        })
        .await;
    }

    async fn on_relevance(&mut self, relevance: RelevanceSummaries) {
        self.update(ResponseField::Relevance, |inner| {
            inner.store.update_relevance(relevance);
            inner.tracker.on_relevance()
        })
        .await;
    }

    async fn on_comments(&mut self, comments: Comments) {
        self.update(ResponseField::Comments, |inner| {
            inner.store.update_comments(comments);
            PhaseEffect::default()
        })
        .await;
    }

    async fn on_done(&mut self) {
        let mut inner = self.shared.inner.lock().await;
        if self.token.is_cancelled() {
            return;
        }
        let effect = inner.tracker.finish();
        self.shared.apply_effect(&mut inner, effect);
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
