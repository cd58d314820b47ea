use shared::{
    admin::{
        PersonaSnapshot, PersonaUpsertRequest, PromptSnapshot, PromptUpsertRequest,
        StarterMessage,
    },
    domain::{DocumentSetId, PersonaId, PromptId, ToolId, UserGroupId},
};
use tracing::{info, warn};

use crate::{
    error::{EditorError, SubmitStage, ValidationErrors},
    http::ApiClient,
};

pub const DEFAULT_NUM_CHUNKS: f64 = 10.0;
const DEFAULT_RECENCY_BIAS: &str = "base_decay";

/// Editable assistant fields as the user typed them.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantForm {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub task_prompt: String,
    pub include_citations: bool,
    pub datetime_aware: bool,
    /// Raw text of the chunk-count input; parsed on validation.
    pub num_chunks: String,
    pub search_tool_id: Option<ToolId>,
    pub search_tool_enabled: bool,
    pub other_tool_ids: Vec<ToolId>,
    pub llm_relevance_filter: bool,
    pub llm_model_provider_override: Option<String>,
    pub llm_model_version_override: Option<String>,
    pub document_set_ids: Vec<DocumentSetId>,
    pub is_public: bool,
    pub groups: Vec<UserGroupId>,
    pub starter_messages: Vec<StarterMessage>,
}

impl Default for AssistantForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            system_prompt: String::new(),
            task_prompt: String::new(),
            include_citations: true,
            datetime_aware: false,
            num_chunks: String::new(),
            search_tool_id: None,
            search_tool_enabled: true,
            other_tool_ids: Vec::new(),
            llm_relevance_filter: false,
            llm_model_provider_override: None,
            llm_model_version_override: None,
            document_set_ids: Vec::new(),
            is_public: true,
            groups: Vec::new(),
            starter_messages: Vec::new(),
        }
    }
}

impl AssistantForm {
    /// Prefills the form from an existing assistant and its first prompt so
    /// that saving it unchanged sends back the same document sets and tools.
    pub fn from_existing(persona: &PersonaSnapshot) -> Self {
        let prompt = persona.prompts.first();
        let num_chunks = persona.num_chunks.unwrap_or(DEFAULT_NUM_CHUNKS);
        let search_tool_id = persona
            .tools
            .iter()
            .find(|tool| tool.is_search_tool())
            .map(|tool| tool.id);
        let other_tool_ids = persona
            .tools
            .iter()
            .filter(|tool| !tool.is_search_tool())
            .map(|tool| tool.id)
            .collect();

        Self {
            name: persona.name.clone(),
            description: persona.description.clone(),
            system_prompt: prompt.map(|p| p.system_prompt.clone()).unwrap_or_default(),
            task_prompt: prompt.map(|p| p.task_prompt.clone()).unwrap_or_default(),
            include_citations: prompt.map_or(true, |p| p.include_citations),
            datetime_aware: prompt.map_or(false, |p| p.datetime_aware),
            num_chunks: num_chunks.to_string(),
            search_tool_id,
            search_tool_enabled: search_tool_id.is_some() || num_chunks > 0.0,
            other_tool_ids,
            llm_relevance_filter: persona.llm_relevance_filter,
            llm_model_provider_override: persona.llm_model_provider_override.clone(),
            llm_model_version_override: persona.llm_model_version_override.clone(),
            document_set_ids: persona.document_sets.iter().map(|set| set.id).collect(),
            is_public: persona.is_public,
            groups: persona.groups.clone(),
            starter_messages: persona.starter_messages.clone().unwrap_or_default(),
        }
    }

    /// Checks every rule and shapes the request bodies; all failures are
    /// reported together.
    pub fn validate(&self) -> Result<AssistantPayload, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.name.trim().is_empty() {
            errors.add("name", "Must give the Assistant a name!");
        }
        if self.description.trim().is_empty() {
            errors.add("description", "Must give the Assistant a description!");
        }
        if self.system_prompt.trim().is_empty() && self.task_prompt.trim().is_empty() {
            errors.add(
                "system_prompt",
                "Must provide either Instructions or Reminders (Advanced)",
            );
        }

        let num_chunks = if self.search_tool_enabled {
            match parse_num_chunks(&self.num_chunks) {
                Ok(value) => value,
                Err(message) => {
                    errors.add("num_chunks", message);
                    DEFAULT_NUM_CHUNKS
                }
            }
        } else {
            0.0
        };

        for (idx, starter) in self.starter_messages.iter().enumerate() {
            if starter.name.trim().is_empty() {
                errors.add(format!("starter_messages[{idx}].name"), "Must give a name");
            }
            if starter.message.trim().is_empty() {
                errors.add(
                    format!("starter_messages[{idx}].message"),
                    "Must give a message",
                );
            }
        }

        let mut tool_ids = self.other_tool_ids.clone();
        if self.search_tool_enabled {
            if let Some(search_tool_id) = self.search_tool_id {
                if !tool_ids.contains(&search_tool_id) {
                    tool_ids.push(search_tool_id);
                }
            }
        }

        let name = self.name.trim().to_string();
        let description = self.description.trim().to_string();
        let payload = AssistantPayload {
            prompt: PromptUpsertRequest {
                name: name.clone(),
                description: description.clone(),
                system_prompt: self.system_prompt.trim().to_string(),
                task_prompt: self.task_prompt.trim().to_string(),
                include_citations: self.include_citations,
                datetime_aware: self.datetime_aware,
                persona_ids: Vec::new(),
            },
            persona: PersonaUpsertRequest {
                name,
                description,
                num_chunks,
                llm_relevance_filter: self.search_tool_enabled && self.llm_relevance_filter,
                is_public: self.is_public,
                llm_filter_extraction: false,
                recency_bias: DEFAULT_RECENCY_BIAS.to_string(),
                prompt_ids: Vec::new(),
                document_set_ids: if self.search_tool_enabled {
                    self.document_set_ids.clone()
                } else {
                    Vec::new()
                },
                llm_model_provider_override: non_empty(&self.llm_model_provider_override),
                llm_model_version_override: non_empty(&self.llm_model_version_override),
                starter_messages: (!self.starter_messages.is_empty())
                    .then(|| self.starter_messages.clone()),
                groups: if self.is_public {
                    Vec::new()
                } else {
                    self.groups.clone()
                },
                tool_ids,
            },
        };

        errors.into_result(payload)
    }
}

fn parse_num_chunks(raw: &str) -> Result<f64, &'static str> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(DEFAULT_NUM_CHUNKS);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        Ok(_) => Err("Number of chunks must be a non-negative number"),
        Err(_) => Err("Number of chunks must be a number"),
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Request bodies produced by a successful validation.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantPayload {
    pub prompt: PromptUpsertRequest,
    pub persona: PersonaUpsertRequest,
}

/// Creates or updates an assistant: the prompt first, then the persona that
/// references it. `submit` takes `&mut self`, so one editor runs at most one
/// submission; dropping an unfinished submit leaves the editor ready to retry.
pub struct AssistantEditor {
    api: ApiClient,
    existing: Option<PersonaSnapshot>,
}

impl AssistantEditor {
    pub fn create(api: ApiClient) -> Self {
        Self {
            api,
            existing: None,
        }
    }

    pub fn edit(api: ApiClient, existing: PersonaSnapshot) -> Self {
        Self {
            api,
            existing: Some(existing),
        }
    }

    pub fn existing(&self) -> Option<&PersonaSnapshot> {
        self.existing.as_ref()
    }

    /// Validation failures never reach the network. Backend failures leave the
    /// editor unchanged for another attempt.
    pub async fn submit(&mut self, form: &AssistantForm) -> Result<PersonaSnapshot, EditorError> {
        let payload = form.validate().map_err(EditorError::Validation)?;

        match self.send(payload).await {
            Ok(persona) => {
                info!(persona_id = persona.id.0, "assistant: saved");
                self.existing = Some(persona.clone());
                Ok(persona)
            }
            Err(err) => {
                warn!("assistant: save failed: {err}");
                Err(err)
            }
        }
    }

    async fn send(&self, mut payload: AssistantPayload) -> Result<PersonaSnapshot, EditorError> {
        let existing_id = self.existing.as_ref().map(|persona| persona.id);
        let existing_prompt_id = self
            .existing
            .as_ref()
            .and_then(|persona| persona.prompts.first())
            .map(|prompt| prompt.id);

        if let Some(persona_id) = existing_id {
            payload.prompt.persona_ids = vec![persona_id];
        }
        let prompt = self.upsert_prompt(existing_prompt_id, &payload.prompt).await?;

        payload.persona.prompt_ids = vec![prompt.id];
        self.upsert_persona(existing_id, &payload.persona).await
    }

    async fn upsert_prompt(
        &self,
        existing: Option<PromptId>,
        body: &PromptUpsertRequest,
    ) -> Result<PromptSnapshot, EditorError> {
        let result = match existing {
            Some(id) => self.api.patch_json(&format!("/prompt/{}", id.0), body).await,
            None => self.api.post_json("/prompt", body).await,
        };
        result.map_err(|err| EditorError::from_request(SubmitStage::Prompt, err))
    }

    async fn upsert_persona(
        &self,
        existing: Option<PersonaId>,
        body: &PersonaUpsertRequest,
    ) -> Result<PersonaSnapshot, EditorError> {
        let result = match existing {
            Some(id) => self.api.patch_json(&format!("/persona/{}", id.0), body).await,
            None => self.api.post_json("/persona", body).await,
        };
        result.map_err(|err| EditorError::from_request(SubmitStage::Persona, err))
    }
}

#[cfg(test)]
#[path = "tests/assistant_tests.rs"]
mod tests;
