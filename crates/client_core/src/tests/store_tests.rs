use super::*;

use shared::{
    domain::ChatSessionId,
    protocol::{ChatMessageDetail, QuoteMetadata, RelevanceAnalysis, RetrievalDocs},
};

fn quote(document_id: &str, text: &str) -> Quote {
    Quote {
        document_id: document_id.to_string(),
        text: text.to_string(),
        metadata: QuoteMetadata::default(),
    }
}

fn doc(document_id: &str) -> SearchDoc {
    serde_json::from_value(serde_json::json!({
        "document_id": document_id,
        "semantic_identifier": format!("Doc {document_id}"),
        "source_type": "web",
    }))
    .expect("doc")
}

fn message(id: i64, message_type: MessageType, text: &str) -> ChatMessageDetail {
    ChatMessageDetail {
        message_id: MessageId(id),
        parent_message: None,
        latest_child_message: None,
        message: text.to_string(),
        rephrased_query: None,
        context_docs: None,
        message_type,
        time_sent: "2024-05-01T12:00:00Z".parse().expect("timestamp"),
        citations: None,
    }
}

#[test]
fn dedupe_keeps_first_quote_per_document() {
    let quotes = vec![quote("a", "first"), quote("b", "second"), quote("a", "third")];
    let deduped = dedupe_quotes(&quotes);
    assert_eq!(deduped, vec![quote("a", "first"), quote("b", "second")]);
}

#[test]
fn cross_field_update_order_commutes() {
    let mut forward = SessionStateStore::new();
    forward.update_answer("partial".into());
    forward.update_documents(vec![doc("d1")]);
    forward.update_answer("partial answer".into());
    forward.update_message_id(MessageId(9));
    forward.update_suggested_flow_type(FlowType::QuestionAnswer);

    let mut reversed = SessionStateStore::new();
    reversed.update_suggested_flow_type(FlowType::QuestionAnswer);
    reversed.update_message_id(MessageId(9));
    reversed.update_answer("partial".into());
    reversed.update_answer("partial answer".into());
    reversed.update_documents(vec![doc("d1")]);

    assert_eq!(forward.response(), reversed.response());
    assert_eq!(forward.response().answer.as_deref(), Some("partial answer"));
}

#[test]
fn reapplying_a_field_is_idempotent() {
    let mut store = SessionStateStore::new();
    store.update_selected_doc_indices(vec![0, 2]);
    let once = store.response().clone();
    store.update_selected_doc_indices(vec![0, 2]);
    assert_eq!(store.response(), &once);
}

#[test]
fn update_touches_only_its_field() {
    let mut store = SessionStateStore::new();
    store.update_documents(vec![doc("d1")]);
    store.update_error("backend exploded".into());

    let response = store.response();
    assert_eq!(response.error.as_deref(), Some("backend exploded"));
    assert_eq!(response.documents.as_ref().map(Vec::len), Some(1));
    assert!(response.answer.is_none());
}

#[test]
fn reset_clears_response_and_records_query() {
    let mut store = SessionStateStore::new();
    store.update_answer("old".into());
    store.update_relevance(RelevanceSummaries::from([(
        "d1".to_string(),
        RelevanceAnalysis {
            relevant: true,
            content: None,
        },
    )]));

    let filters = SearchFilters {
        document_set: Some(vec!["eng".into()]),
        ..SearchFilters::default()
    };
    store.reset("new question", filters.clone());

    assert_eq!(store.query(), Some("new question"));
    assert_eq!(store.filters(), &filters);
    assert_eq!(store.response(), &SearchResponse::default());
}

#[test]
fn display_quotes_are_deduplicated() {
    let mut store = SessionStateStore::new();
    assert!(store.display_quotes().is_empty());
    store.update_quotes(vec![quote("x", "1"), quote("x", "2"), quote("y", "3")]);
    let shown: Vec<_> = store
        .display_quotes()
        .into_iter()
        .map(|q| q.text)
        .collect();
    assert_eq!(shown, vec!["1", "3"]);
}

#[test]
fn restored_search_uses_first_user_and_last_assistant_message() {
    let mut answer = message(2, MessageType::Assistant, "The answer is 42.");
    answer.context_docs = Some(RetrievalDocs {
        top_documents: vec![doc("ctx")],
    });
    let detail = SearchSessionDetail {
        search_session_id: ChatSessionId(5),
        description: Some("life".into()),
        documents: Vec::new(),
        messages: vec![
            message(1, MessageType::User, "what is the meaning of life?"),
            answer,
        ],
    };

    let restored = RestoredSearch::from_detail(detail);
    assert_eq!(restored.query.as_deref(), Some("what is the meaning of life?"));
    assert_eq!(restored.response.answer.as_deref(), Some("The answer is 42."));
    assert_eq!(restored.response.message_id, Some(MessageId(2)));
    assert_eq!(
        restored.response.documents.as_ref().map(|d| d[0].document_id.as_str()),
        Some("ctx")
    );

    let mut store = SessionStateStore::new();
    store.update_error("stale".into());
    store.replace(restored);
    assert!(store.response().error.is_none());
    assert_eq!(store.query(), Some("what is the meaning of life?"));
}

#[tokio::test]
async fn store_receives_handler_calls() {
    let mut store = SessionStateStore::new();
    store.on_answer("hello".into()).await;
    store.on_suggested_search_type(SearchType::Keyword).await;
    store.on_done().await;

    assert_eq!(store.response().answer.as_deref(), Some("hello"));
    assert_eq!(
        store.response().suggested_search_type,
        Some(SearchType::Keyword)
    );
}
