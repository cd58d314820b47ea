//! Per-view search state: the query, its filters, and the merged response.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;
use shared::{
    domain::{FlowType, MessageId, MessageType, SearchType},
    protocol::{
        Comments, Quote, RelevanceSummaries, SearchDoc, SearchFilters, SearchSessionDetail,
    },
};

use crate::stream::SearchHandlers;

/// Partial result of one search. Every field stays `None` until the stream
/// delivers it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResponse {
    pub answer: Option<String>,
    pub quotes: Option<Vec<Quote>>,
    pub documents: Option<Vec<SearchDoc>>,
    pub selected_doc_indices: Option<Vec<usize>>,
    pub suggested_search_type: Option<SearchType>,
    pub suggested_flow_type: Option<FlowType>,
    pub error: Option<String>,
    pub message_id: Option<MessageId>,
    pub additional_relevance: Option<RelevanceSummaries>,
    pub comments: Option<Comments>,
}

/// First occurrence of each document id wins; order is preserved.
pub fn dedupe_quotes(quotes: &[Quote]) -> Vec<Quote> {
    let mut seen = HashSet::new();
    quotes
        .iter()
        .filter(|quote| seen.insert(quote.document_id.as_str()))
        .cloned()
        .collect()
}

/// Read-only reconstruction of a past search.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoredSearch {
    pub query: Option<String>,
    pub response: SearchResponse,
}

impl RestoredSearch {
    pub fn from_detail(detail: SearchSessionDetail) -> Self {
        let query = detail
            .messages
            .iter()
            .find(|message| message.message_type == MessageType::User)
            .map(|message| message.message.clone());
        let answer_message = detail
            .messages
            .iter()
            .rev()
            .find(|message| message.message_type == MessageType::Assistant);

        let documents = if detail.documents.is_empty() {
            answer_message
                .and_then(|message| message.context_docs.clone())
                .map(|docs| docs.top_documents)
        } else {
            Some(detail.documents)
        };

        Self {
            query,
            response: SearchResponse {
                answer: answer_message.map(|message| message.message.clone()),
                documents,
                message_id: answer_message.map(|message| message.message_id),
                ..SearchResponse::default()
            },
        }
    }
}

/// Holds the query, its filters, and the merged response for one search view.
#[derive(Debug, Clone, Default)]
pub struct SessionStateStore {
    query: Option<String>,
    filters: SearchFilters,
    response: SearchResponse,
}

impl SessionStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn filters(&self) -> &SearchFilters {
        &self.filters
    }

    pub fn response(&self) -> &SearchResponse {
        &self.response
    }

    pub fn display_quotes(&self) -> Vec<Quote> {
        self.response
            .quotes
            .as_deref()
            .map(dedupe_quotes)
            .unwrap_or_default()
    }

    pub fn reset(&mut self, query: impl Into<String>, filters: SearchFilters) {
        self.query = Some(query.into());
        self.filters = filters;
        self.response = SearchResponse::default();
    }

    pub fn replace(&mut self, restored: RestoredSearch) {
        self.query = restored.query;
        self.filters = SearchFilters::default();
        self.response = restored.response;
    }

    pub fn update_answer(&mut self, answer: String) {
        self.response.answer = Some(answer);
    }

    pub fn update_quotes(&mut self, quotes: Vec<Quote>) {
        self.response.quotes = Some(quotes);
    }

    pub fn update_documents(&mut self, documents: Vec<SearchDoc>) {
        self.response.documents = Some(documents);
    }

    pub fn update_suggested_search_type(&mut self, search_type: SearchType) {
        self.response.suggested_search_type = Some(search_type);
    }

    pub fn update_suggested_flow_type(&mut self, flow_type: FlowType) {
        self.response.suggested_flow_type = Some(flow_type);
    }

    pub fn update_selected_doc_indices(&mut self, indices: Vec<usize>) {
        self.response.selected_doc_indices = Some(indices);
    }

    pub fn update_error(&mut self, error: String) {
        self.response.error = Some(error);
    }

    pub fn update_message_id(&mut self, message_id: MessageId) {
        self.response.message_id = Some(message_id);
    }

    pub fn update_relevance(&mut self, relevance: RelevanceSummaries) {
        self.response.additional_relevance = Some(relevance);
    }

    pub fn update_comments(&mut self, comments: Comments) {
        self.response.comments = Some(comments);
    }
}

#[async_trait]
impl SearchHandlers for SessionStateStore {
    async fn on_answer(&mut self, answer: String) {
        self.update_answer(answer);
    }

    async fn on_quotes(&mut self, quotes: Vec<Quote>) {
        self.update_quotes(quotes);
    }

    async fn on_documents(&mut self, documents: Vec<SearchDoc>) {
        self.update_documents(documents);
    }

    async fn on_suggested_search_type(&mut self, search_type: SearchType) {
        self.update_suggested_search_type(search_type);
    }

    async fn on_suggested_flow_type(&mut self, flow_type: FlowType) {
        self.update_suggested_flow_type(flow_type);
    }

    async fn on_selected_doc_indices(&mut self, indices: Vec<usize>) {
        self.update_selected_doc_indices(indices);
    }

    async fn on_error(&mut self, error: String) {
        self.update_error(error);
    }

    async fn on_message_id(&mut self, message_id: MessageId) {
        self.update_message_id(message_id);
    }

    async fn on_relevance(&mut self, relevance: RelevanceSummaries) {
        self.update_relevance(relevance);
    }

    async fn on_comments(&mut self, comments: Comments) {
        self.update_comments(comments);
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
