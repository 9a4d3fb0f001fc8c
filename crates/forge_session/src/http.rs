//! HTTP implementations of the collaborator traits.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::{debug, info};

use crate::backend::{ChatBackend, ChatRequest, GenerateRequest, GenerateResponse, ProjectGenerator};
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::sse::{self, TextStream};

fn authorized(builder: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
    match token {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    }
}

async fn check_status(response: reqwest::Response) -> SessionResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SessionError::Http {
        status: status.as_u16(),
        body,
    })
}

/// Chat backend that streams server-sent events from an HTTP endpoint
pub struct HttpChatBackend {
    client: reqwest::Client,
    url: String,
    api_token: Option<String>,
}

impl HttpChatBackend {
    pub fn new(url: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_token,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.chat_url.clone(), config.api_token.clone())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn stream_chat(&self, request: ChatRequest) -> SessionResult<TextStream> {
        debug!(
            "Opening chat stream at {} with {} messages",
            self.url,
            request.messages.len()
        );

        let builder = self
            .client
            .post(&self.url)
            .header(ACCEPT, "text/event-stream")
            .header(CONTENT_TYPE, "application/json")
            .json(&request);

        let response = authorized(builder, self.api_token.as_deref())
            .send()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        let response = check_status(response).await?;

        Ok(sse::text_stream(response.bytes_stream()))
    }
}

/// Project generator backed by an HTTP endpoint
pub struct HttpProjectGenerator {
    client: reqwest::Client,
    url: String,
    api_token: Option<String>,
}

impl HttpProjectGenerator {
    pub fn new(url: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_token,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.generate_url.clone(), config.api_token.clone())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ProjectGenerator for HttpProjectGenerator {
    async fn generate(&self, request: GenerateRequest) -> SessionResult<GenerateResponse> {
        info!(
            "Requesting project generation at {} ({} existing files)",
            self.url,
            request.existing_files.as_ref().map_or(0, Vec::len)
        );

        let builder = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .json(&request);

        let response = authorized(builder, self.api_token.as_deref())
            .send()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        let response = check_status(response).await?;

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| SessionError::MalformedResponse(e.to_string()))
    }
}
