use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::error::ApiError;
use tracing::debug;
use url::Url;

use crate::{config::ClientSettings, error::RequestError};

/// Thin wrapper over `reqwest` that knows the backend base url, attaches the
/// api key, and turns non-2xx responses into [`RequestError::Status`] carrying
/// the backend's `detail`/`message` text.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RequestError> {
        Self::with_client(Client::new(), base_url, None)
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self, RequestError> {
        let http = Client::builder()
            .connect_timeout(settings.connect_timeout())
            .build()
            .map_err(|source| RequestError::Transport {
                url: settings.api_base_url.clone(),
                source,
            })?;
        Self::with_client(http, settings.api_base_url.clone(), settings.api_key.clone())
    }

    pub fn with_client(
        http: Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, RequestError> {
        let base_url = base_url.into();
        let parsed = Url::parse(&base_url).map_err(|err| RequestError::InvalidBaseUrl {
            url: base_url.clone(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RequestError::InvalidBaseUrl {
                url: base_url,
                reason: "scheme must be http or https".into(),
            });
        }

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, url: &str, builder: RequestBuilder) -> Result<Response, RequestError> {
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|source| RequestError::Transport {
                url: url.to_string(),
                source,
            })?;
        check_status(url, response).await
    }

    async fn decode<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, RequestError> {
        response.json().await.map_err(|source| RequestError::Decode {
            url: url.to_string(),
            source,
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        let url = self.url(path);
        let response = self.send(&url, self.http.get(&url)).await?;
        Self::decode(&url, response).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, RequestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self.send(&url, self.http.post(&url).json(body)).await?;
        Self::decode(&url, response).await
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T, RequestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self.send(&url, self.http.patch(&url).json(body)).await?;
        Self::decode(&url, response).await
    }

    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        let url = self.url(path);
        let response = self.send(&url, self.http.post(&url)).await?;
        Self::decode(&url, response).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), RequestError> {
        let url = self.url(path);
        self.send(&url, self.http.delete(&url)).await?;
        Ok(())
    }

    /// Starts a request whose body is read incrementally by the caller.
    pub async fn post_stream<B>(&self, path: &str, body: &B) -> Result<Response, RequestError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url(path);
        debug!(url = %url, "http: opening streamed request");
        self.send(&url, self.http.post(&url).json(body)).await
    }
}

async fn check_status(url: &str, response: Response) -> Result<Response, RequestError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(RequestError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        error: ApiError::from_response(status.as_u16(), &body),
    })
}
