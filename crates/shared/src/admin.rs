use serde::{Deserialize, Serialize};

use crate::domain::{
    ApiKeyId, ApiKeyRole, DocumentSetId, PersonaId, PromptId, ToolId, UserGroupId,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptUpsertRequest {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub task_prompt: String,
    pub include_citations: bool,
    pub datetime_aware: bool,
    #[serde(default)]
    pub persona_ids: Vec<PersonaId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptSnapshot {
    pub id: PromptId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub task_prompt: String,
    #[serde(default)]
    pub include_citations: bool,
    #[serde(default)]
    pub datetime_aware: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StarterMessage {
    pub name: String,
    pub description: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonaUpsertRequest {
    pub name: String,
    pub description: String,
    pub num_chunks: f64,
    pub llm_relevance_filter: bool,
    pub is_public: bool,
    pub llm_filter_extraction: bool,
    pub recency_bias: String,
    pub prompt_ids: Vec<PromptId>,
    pub document_set_ids: Vec<DocumentSetId>,
    #[serde(default)]
    pub llm_model_provider_override: Option<String>,
    #[serde(default)]
    pub llm_model_version_override: Option<String>,
    #[serde(default)]
    pub starter_messages: Option<Vec<StarterMessage>>,
    #[serde(default)]
    pub groups: Vec<UserGroupId>,
    #[serde(default)]
    pub tool_ids: Vec<ToolId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonaSnapshot {
    pub id: PersonaId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub num_chunks: Option<f64>,
    #[serde(default)]
    pub prompts: Vec<PromptSnapshot>,
    #[serde(default)]
    pub groups: Vec<UserGroupId>,
    #[serde(default)]
    pub document_sets: Vec<DocumentSetSnapshot>,
    #[serde(default)]
    pub tools: Vec<ToolSnapshot>,
    #[serde(default)]
    pub llm_relevance_filter: bool,
    #[serde(default)]
    pub starter_messages: Option<Vec<StarterMessage>>,
    #[serde(default)]
    pub llm_model_provider_override: Option<String>,
    #[serde(default)]
    pub llm_model_version_override: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentSetSnapshot {
    pub id: DocumentSetId,
    #[serde(default)]
    pub name: String,
}

/// `in_code_tool_id` is set only for built-in tools such as `SearchTool`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolSnapshot {
    pub id: ToolId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub in_code_tool_id: Option<String>,
}

impl ToolSnapshot {
    pub const SEARCH_TOOL: &'static str = "SearchTool";

    pub fn is_search_tool(&self) -> bool {
        self.in_code_tool_id.as_deref() == Some(Self::SEARCH_TOOL)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKeyArgs {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: ApiKeyRole,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKeyDescriptor {
    pub api_key_id: ApiKeyId,
    pub api_key_display: String,
    /// Only present right after creation or regeneration.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_name: Option<String>,
    #[serde(default)]
    pub api_key_role: Option<ApiKeyRole>,
    #[serde(default)]
    pub user_id: Option<String>,
}
