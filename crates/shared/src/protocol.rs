use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{
    ChatSessionId, EvaluationType, FlowType, MessageId, MessageType, PersonaId, PromptId,
    SearchType, Tag,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadMessage {
    pub message: String,
    #[serde(default)]
    pub sender: Option<String>,
    pub role: MessageType,
}

/// Human-selected filters attached to a search.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_set: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_cutoff: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Tag>>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.source_type.as_ref().map_or(true, Vec::is_empty)
            && self.document_set.as_ref().map_or(true, Vec::is_empty)
            && self.time_cutoff.is_none()
            && self.tags.as_ref().map_or(true, Vec::is_empty)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunSearch {
    #[default]
    Always,
    Never,
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrievalOptions {
    pub run_search: RunSearch,
    pub real_time: bool,
    pub filters: SearchFilters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_auto_detect_filters: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Body of the one-shot streamed answer endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectQaRequest {
    pub messages: Vec<ThreadMessage>,
    pub prompt_id: Option<PromptId>,
    pub persona_id: PersonaId,
    pub retrieval_options: RetrievalOptions,
    pub evaluation_type: EvaluationType,
    #[serde(default)]
    pub chain_of_thought: bool,
    #[serde(default)]
    pub return_contexts: bool,
    #[serde(default)]
    pub skip_gen_ai_answer_generation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    Single(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchDoc {
    pub document_id: String,
    #[serde(default)]
    pub chunk_ind: i64,
    pub semantic_identifier: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub blurb: String,
    pub source_type: String,
    #[serde(default)]
    pub boost: i64,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataValue>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub is_relevant: Option<bool>,
    #[serde(default)]
    pub relevance_explanation: Option<String>,
    #[serde(default)]
    pub match_highlights: Vec<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub primary_owners: Option<Vec<String>>,
    #[serde(default)]
    pub secondary_owners: Option<Vec<String>>,
    #[serde(default)]
    pub is_internet: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_doc_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuoteMetadata {
    #[serde(default)]
    pub quote_id: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub semantic_identifier: Option<String>,
    #[serde(default)]
    pub blurb: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quote {
    pub document_id: String,
    #[serde(rename = "quote")]
    pub text: String,
    #[serde(flatten)]
    pub metadata: QuoteMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelevanceAnalysis {
    pub relevant: bool,
    #[serde(default)]
    pub content: Option<String>,
}

/// Per-document relevance verdicts keyed by document id.
pub type RelevanceSummaries = BTreeMap<String, RelevanceAnalysis>;

/// Free-form commentary the backend may attach to a search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Comments {
    Text(String),
    Lines(Vec<String>),
    Structured(Map<String, Value>),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentsPacket {
    pub top_documents: Vec<SearchDoc>,
    #[serde(default)]
    pub rephrased_query: Option<String>,
    #[serde(default)]
    pub predicted_search: Option<SearchType>,
    #[serde(default)]
    pub predicted_flow: Option<FlowType>,
    #[serde(default)]
    pub applied_source_filters: Option<Vec<String>>,
    #[serde(default)]
    pub applied_time_cutoff: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recency_bias_multiplier: Option<f64>,
}

/// One newline-delimited JSON object from the answer stream. The backend does
/// not tag packets, so the variant is picked from the keys present.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPacket {
    AnswerPiece(Option<String>),
    Documents(DocumentsPacket),
    Quotes(Vec<Quote>),
    SelectedDocIndices(Vec<usize>),
    Error(String),
    MessageId(MessageId),
    Relevance(RelevanceSummaries),
    Comments(Comments),
    Unknown(Map<String, Value>),
}

impl StreamPacket {
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        let mut object: Map<String, Value> = serde_json::from_str(line)?;

        if let Some(piece) = object.remove("answer_piece") {
            return Ok(Self::AnswerPiece(serde_json::from_value(piece)?));
        }
        if object.contains_key("top_documents") {
            return Ok(Self::Documents(serde_json::from_value(Value::Object(object))?));
        }
        if let Some(quotes) = object.remove("quotes") {
            let quotes: Option<Vec<Quote>> = serde_json::from_value(quotes)?;
            return Ok(Self::Quotes(quotes.unwrap_or_default()));
        }
        for key in ["llm_selected_doc_indices", "relevant_chunk_indices"] {
            if let Some(indices) = object.remove(key) {
                return Ok(Self::SelectedDocIndices(serde_json::from_value(indices)?));
            }
        }
        if let Some(error) = object.remove("error") {
            return Ok(Self::Error(match error {
                Value::String(text) => text,
                other => other.to_string(),
            }));
        }
        for key in ["message_id", "chat_message_id"] {
            if let Some(id) = object.remove(key) {
                return Ok(Self::MessageId(serde_json::from_value(id)?));
            }
        }
        if let Some(summaries) = object.remove("relevance_summaries") {
            return Ok(Self::Relevance(serde_json::from_value(summaries)?));
        }
        if let Some(comments) = object.remove("comments") {
            return Ok(Self::Comments(serde_json::from_value(comments)?));
        }

        Ok(Self::Unknown(object))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalDocs {
    pub top_documents: Vec<SearchDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessageDetail {
    pub message_id: MessageId,
    #[serde(default)]
    pub parent_message: Option<MessageId>,
    #[serde(default)]
    pub latest_child_message: Option<MessageId>,
    pub message: String,
    #[serde(default)]
    pub rephrased_query: Option<String>,
    #[serde(default)]
    pub context_docs: Option<RetrievalDocs>,
    pub message_type: MessageType,
    pub time_sent: DateTime<Utc>,
    #[serde(default)]
    pub citations: Option<BTreeMap<i64, i64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchSessionDetail {
    pub search_session_id: ChatSessionId,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub documents: Vec<SearchDoc>,
    pub messages: Vec<ChatMessageDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSessionDetails {
    pub id: ChatSessionId,
    pub name: String,
    #[serde(default)]
    pub persona_id: Option<PersonaId>,
    pub time_created: String,
    #[serde(default)]
    pub shared_status: Option<String>,
    #[serde(default)]
    pub folder_id: Option<i64>,
    #[serde(default)]
    pub current_alternate_model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatSessionsResponse {
    pub sessions: Vec<ChatSessionDetails>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packets_are_recognized_by_their_keys() {
        assert_eq!(
            StreamPacket::parse(r#"{"answer_piece":"Hel"}"#).expect("piece"),
            StreamPacket::AnswerPiece(Some("Hel".into()))
        );
        assert_eq!(
            StreamPacket::parse(r#"{"answer_piece":null}"#).expect("end"),
            StreamPacket::AnswerPiece(None)
        );
        assert_eq!(
            StreamPacket::parse(r#"{"relevant_chunk_indices":[0,3]}"#).expect("indices"),
            StreamPacket::SelectedDocIndices(vec![0, 3])
        );
        assert_eq!(
            StreamPacket::parse(r#"{"chat_message_id":41}"#).expect("id"),
            StreamPacket::MessageId(MessageId(41))
        );
        assert_eq!(
            StreamPacket::parse(r#"{"error":{"kind":"timeout"}}"#).expect("error"),
            StreamPacket::Error(r#"{"kind":"timeout"}"#.into())
        );
        assert_eq!(
            StreamPacket::parse(r#"{"quotes":null}"#).expect("quotes"),
            StreamPacket::Quotes(Vec::new())
        );
    }

    #[test]
    fn documents_packet_carries_predictions() {
        let packet = StreamPacket::parse(
            r#"{"top_documents":[{"document_id":"a","semantic_identifier":"A","source_type":"slack","metadata":{"channel":"ops","tags":["x","y"]}}],"predicted_search":"keyword","predicted_flow":"search","rephrased_query":"deploy"}"#,
        )
        .expect("documents");
        let StreamPacket::Documents(packet) = packet else {
            panic!("expected documents, got {packet:?}");
        };
        assert_eq!(packet.top_documents[0].document_id, "a");
        assert_eq!(
            packet.top_documents[0].metadata.get("tags"),
            Some(&MetadataValue::List(vec!["x".into(), "y".into()]))
        );
        assert_eq!(packet.predicted_search, Some(SearchType::Keyword));
        assert_eq!(packet.predicted_flow, Some(FlowType::Search));
    }

    #[test]
    fn quote_metadata_is_flattened() {
        let quote: Quote = serde_json::from_str(
            r#"{"quote":"run nightly","document_id":"d2","link":"https://wiki/d2","semantic_identifier":"Runbook"}"#,
        )
        .expect("quote");
        assert_eq!(quote.text, "run nightly");
        assert_eq!(quote.metadata.link.as_deref(), Some("https://wiki/d2"));
    }

    #[test]
    fn comments_accept_text_and_objects() {
        assert_eq!(
            StreamPacket::parse(r#"{"comments":"fine"}"#).expect("text"),
            StreamPacket::Comments(Comments::Text("fine".into()))
        );
        assert!(matches!(
            StreamPacket::parse(r#"{"comments":{"a":1}}"#).expect("object"),
            StreamPacket::Comments(Comments::Structured(_))
        ));
    }

    #[test]
    fn unrecognized_and_malformed_lines() {
        assert!(matches!(
            StreamPacket::parse(r#"{"heartbeat":true}"#).expect("unknown"),
            StreamPacket::Unknown(_)
        ));
        assert!(StreamPacket::parse("not json").is_err());
        assert!(StreamPacket::parse(r#"{"answer_piece":5}"#).is_err());
    }

    #[test]
    fn empty_filters_are_omitted_from_requests() {
        let options = RetrievalOptions {
            run_search: RunSearch::Always,
            real_time: true,
            filters: SearchFilters::default(),
            enable_auto_detect_filters: None,
            offset: None,
            limit: None,
        };
        assert_eq!(
            serde_json::to_value(&options).expect("json"),
            serde_json::json!({ "run_search": "always", "real_time": true, "filters": {} })
        );
    }
}
