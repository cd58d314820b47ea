use shared::{
    admin::{ApiKeyArgs, ApiKeyDescriptor},
    domain::{ApiKeyId, ApiKeyRole},
};
use tracing::info;

use crate::{
    error::{EditorError, SubmitStage, ValidationErrors},
    http::ApiClient,
};

const API_KEY_PATH: &str = "/admin/api-key";
const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiKeyForm {
    pub name: String,
    pub role: ApiKeyRole,
}

impl ApiKeyForm {
    /// A blank name is allowed and sent as `null`; the backend labels it.
    pub fn validate(&self) -> Result<ApiKeyArgs, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let name = self.name.trim();
        if name.chars().count() > MAX_NAME_LEN {
            errors.add("name", format!("Name must be at most {MAX_NAME_LEN} characters"));
        }
        errors.into_result(ApiKeyArgs {
            name: (!name.is_empty()).then(|| name.to_string()),
            role: self.role,
        })
    }
}

pub struct ApiKeyAdmin {
    api: ApiClient,
}

impl ApiKeyAdmin {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn list(&self) -> Result<Vec<ApiKeyDescriptor>, EditorError> {
        self.api
            .get_json(API_KEY_PATH)
            .await
            .map_err(|err| EditorError::from_request(SubmitStage::ApiKey, err))
    }

    pub async fn create(&self, form: &ApiKeyForm) -> Result<ApiKeyDescriptor, EditorError> {
        let args = form.validate().map_err(EditorError::Validation)?;
        let created: ApiKeyDescriptor = self
            .api
            .post_json(API_KEY_PATH, &args)
            .await
            .map_err(|err| EditorError::from_request(SubmitStage::ApiKey, err))?;
        info!(api_key_id = created.api_key_id.0, "api_key: created");
        Ok(created)
    }

    pub async fn update(
        &self,
        id: ApiKeyId,
        form: &ApiKeyForm,
    ) -> Result<ApiKeyDescriptor, EditorError> {
        let args = form.validate().map_err(EditorError::Validation)?;
        self.api
            .patch_json(&format!("{API_KEY_PATH}/{}", id.0), &args)
            .await
            .map_err(|err| EditorError::from_request(SubmitStage::ApiKey, err))
    }

    pub async fn regenerate(&self, id: ApiKeyId) -> Result<ApiKeyDescriptor, EditorError> {
        let regenerated: ApiKeyDescriptor = self
            .api
            .post_empty(&format!("{API_KEY_PATH}/{}/regenerate", id.0))
            .await
            .map_err(|err| EditorError::from_request(SubmitStage::ApiKey, err))?;
        info!(api_key_id = id.0, "api_key: regenerated");
        Ok(regenerated)
    }

    pub async fn delete(&self, id: ApiKeyId) -> Result<(), EditorError> {
        self.api
            .delete(&format!("{API_KEY_PATH}/{}", id.0))
            .await
            .map_err(|err| EditorError::from_request(SubmitStage::ApiKey, err))?;
        info!(api_key_id = id.0, "api_key: deleted");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/api_keys_tests.rs"]
mod tests;
