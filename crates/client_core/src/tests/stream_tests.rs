use super::*;

use std::sync::Arc;

use axum::{
    body::Body, extract::State, http::StatusCode, response::IntoResponse, routing::post, Json,
    Router,
};
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
};

#[derive(Default)]
struct Recorder {
    calls: Vec<String>,
    cancel_on_documents: Option<CancellationToken>,
}

#[async_trait]
impl SearchHandlers for Recorder {
    async fn on_answer(&mut self, answer: String) {
        self.calls.push(format!("answer:{answer}"));
    }

    async fn on_quotes(&mut self, quotes: Vec<Quote>) {
        let ids: Vec<_> = quotes.iter().map(|q| q.document_id.as_str()).collect();
        self.calls.push(format!("quotes:{}", ids.join(",")));
    }

    async fn on_documents(&mut self, documents: Vec<SearchDoc>) {
        self.calls.push(format!("documents:{}", documents.len()));
        if let Some(token) = &self.cancel_on_documents {
            token.cancel();
        }
    }

    async fn on_suggested_search_type(&mut self, search_type: SearchType) {
        self.calls.push(format!("search_type:{search_type:?}"));
    }

    async fn on_suggested_flow_type(&mut self, flow_type: FlowType) {
        self.calls.push(format!("flow_type:{flow_type:?}"));
    }

    async fn on_selected_doc_indices(&mut self, indices: Vec<usize>) {
        self.calls.push(format!("selected:{indices:?}"));
    }

    async fn on_error(&mut self, error: String) {
        self.calls.push(format!("error:{error}"));
    }

    async fn on_message_id(&mut self, message_id: MessageId) {
        self.calls.push(format!("message_id:{}", message_id.0));
    }

    async fn on_relevance(&mut self, relevance: RelevanceSummaries) {
        self.calls.push(format!("relevance:{}", relevance.len()));
    }

    async fn on_comments(&mut self, _comments: Comments) {
        self.calls.push("comments".to_string());
    }

    async fn on_done(&mut self) {
        self.calls.push("done".to_string());
    }
}

const DOCS_LINE: &str = r#"{"top_documents":[{"document_id":"d1","semantic_identifier":"Doc 1","source_type":"web","blurb":"b"},{"document_id":"d2","semantic_identifier":"Doc 2","source_type":"web"}],"predicted_search":"semantic","predicted_flow":"question-answer"}"#;

#[derive(Clone)]
struct StreamServer {
    chunks: Vec<&'static str>,
    request_tx: Arc<Mutex<Option<oneshot::Sender<DirectQaRequest>>>>,
}

async fn handle_stream(
    State(state): State<StreamServer>,
    Json(request): Json<DirectQaRequest>,
) -> Body {
    if let Some(tx) = state.request_tx.lock().await.take() {
        let _ = tx.send(request);
    }
    let chunks = state
        .chunks
        .into_iter()
        .map(Ok::<_, std::io::Error>)
        .collect::<Vec<_>>();
    Body::from_stream(futures::stream::iter(chunks))
}

async fn spawn_stream_server(
    chunks: Vec<&'static str>,
) -> (String, oneshot::Receiver<DirectQaRequest>) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (tx, rx) = oneshot::channel();
    let app = Router::new()
        .route(STREAM_ANSWER_PATH, post(handle_stream))
        .with_state(StreamServer {
            chunks,
            request_tx: Arc::new(Mutex::new(Some(tx))),
        });
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), rx)
}

async fn failing_stream() -> impl IntoResponse {
    (
        StatusCode::FORBIDDEN,
        Json(serde_json::json!({ "detail": "Token rate limit exceeded" })),
    )
}

fn query() -> SearchQuery {
    SearchQuery::new("how do deploys work?", PersonaId(3)).with_narration(true)
}

#[tokio::test]
async fn dispatches_every_packet_kind_in_arrival_order() {
    let chunks = vec![
        DOCS_LINE,
        "\n{\"llm_selected_doc_indices\":[1]}\n{\"answer_pi",
        "ece\":\"Deploys \"}\n{\"answer_piece\":\"run nightly.\"}\n",
        "{\"answer_piece\":null}\n",
        "this is not json\n",
        "{\"quotes\":[{\"quote\":\"nightly\",\"document_id\":\"d2\"}]}\n",
        "{\"relevance_summaries\":{\"d1\":{\"relevant\":true,\"content\":\"yes\"}}}\n",
        "{\"comments\":\"looks good\"}\n",
        "{\"message_id\":77}",
    ];
    let (server_url, request_rx) = spawn_stream_server(chunks).await;
    let api = ApiClient::new(server_url).expect("api");

    let mut recorder = Recorder::default();
    let outcome = stream_search(&api, &query(), CancellationToken::new(), &mut recorder).await;

    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(
        recorder.calls,
        vec![
            "documents:2",
            "search_type:Semantic",
            "flow_type:QuestionAnswer",
            "selected:[1]",
            "answer:Deploys ",
            "answer:Deploys run nightly.",
            "quotes:d2",
            "relevance:1",
            "comments",
            "message_id:77",
            "done",
        ]
    );

    let request = request_rx.await.expect("request");
    assert_eq!(request.messages[0].message, "how do deploys work?");
    assert_eq!(request.persona_id, PersonaId(3));
    assert_eq!(request.evaluation_type, EvaluationType::Agentic);
    assert_eq!(request.retrieval_options.run_search, RunSearch::Always);
}

#[tokio::test]
async fn non_ok_status_is_a_terminal_error_event() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().route(STREAM_ANSWER_PATH, post(failing_stream));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let api = ApiClient::new(format!("http://{addr}")).expect("api");
    let mut recorder = Recorder::default();
    let outcome = stream_search(&api, &query(), CancellationToken::new(), &mut recorder).await;

    assert_eq!(outcome, StreamOutcome::Failed);
    assert_eq!(recorder.calls, vec!["error:Token rate limit exceeded"]);
}

#[tokio::test]
async fn network_failure_surfaces_through_error_handler() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let api = ApiClient::new(format!("http://{addr}")).expect("api");
    let mut recorder = Recorder::default();
    let outcome = stream_search(&api, &query(), CancellationToken::new(), &mut recorder).await;

    assert_eq!(outcome, StreamOutcome::Failed);
    assert_eq!(recorder.calls.len(), 1);
    assert!(recorder.calls[0].starts_with("error:"), "{:?}", recorder.calls);
}

#[tokio::test]
async fn cancelling_mid_stream_silences_later_packets() {
    let chunks = vec![
        DOCS_LINE,
        "\n{\"answer_piece\":\"never seen\"}\n{\"quotes\":[]}\n",
    ];
    let (server_url, _request_rx) = spawn_stream_server(chunks).await;
    let api = ApiClient::new(server_url).expect("api");

    let token = CancellationToken::new();
    let mut recorder = Recorder {
        cancel_on_documents: Some(token.clone()),
        ..Recorder::default()
    };
    let outcome = stream_search(&api, &query(), token, &mut recorder).await;

    assert_eq!(outcome, StreamOutcome::Cancelled);
    assert_eq!(recorder.calls, vec!["documents:2"]);
}

#[tokio::test]
async fn pre_cancelled_token_never_reaches_handlers() {
    let token = CancellationToken::new();
    token.cancel();
    let mut recorder = Recorder::default();
    let mut dispatcher = GuardedDispatcher::new(token, &mut recorder);

    for packet in [
        StreamPacket::AnswerPiece(Some("x".into())),
        StreamPacket::Error("boom".into()),
        StreamPacket::Quotes(Vec::new()),
        StreamPacket::MessageId(MessageId(1)),
    ] {
        assert!(!dispatcher.dispatch(packet).await);
    }
    assert!(!dispatcher.error("late".into()).await);
    assert!(!dispatcher.done().await);
    drop(dispatcher);

    assert!(recorder.calls.is_empty());
}

#[tokio::test]
async fn cancelled_before_request_returns_without_calls() {
    let token = CancellationToken::new();
    token.cancel();
    let api = ApiClient::new("http://127.0.0.1:9").expect("api");
    let mut recorder = Recorder::default();

    let outcome = stream_search(&api, &query(), token, &mut recorder).await;
    assert_eq!(outcome, StreamOutcome::Cancelled);
    assert!(recorder.calls.is_empty());
}

#[test]
fn plain_query_uses_basic_evaluation_and_offset() {
    let request = SearchQuery::new("q", PersonaId(0)).with_offset(20).to_request();
    assert_eq!(request.evaluation_type, EvaluationType::Basic);
    assert_eq!(request.retrieval_options.offset, Some(20));
    assert!(request.retrieval_options.filters.is_empty());
    assert_eq!(request.messages[0].role, MessageType::User);
}
