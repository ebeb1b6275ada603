//! HTTP client for the backend document store.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use std::time::Duration;

use stride_sync_core::{BackendError, ContentBackend, ContentSnapshot};

use crate::config::ServerConfig;

/// Timeout for a content write.
const WRITE_TIMEOUT: Duration = Duration::from_secs(15);
/// Timeout for the health probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors building a backend client from configuration.
#[derive(Debug)]
pub enum BackendSetupError {
    /// No backend URL configured
    NotConfigured,
    /// The HTTP client could not be built
    ClientError(String),
}

impl std::fmt::Display for BackendSetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendSetupError::NotConfigured => write!(
                f,
                "Backend not configured. Add server.backend_url to config or set STRIDE_BACKEND_URL."
            ),
            BackendSetupError::ClientError(e) => write!(f, "Failed to build HTTP client: {}", e),
        }
    }
}

impl std::error::Error for BackendSetupError {}

#[derive(Serialize)]
struct UpdateContentRequest<'a> {
    content: &'a ContentSnapshot,
}

/// Writes section content with `PUT {base_url}/sections/{section_id}/content`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpBackend {
    /// Creates a client with explicit parameters.
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, BackendSetupError> {
        let client = reqwest::Client::builder()
            .timeout(WRITE_TIMEOUT)
            .build()
            .map_err(|e| BackendSetupError::ClientError(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    /// Creates a client from config.
    ///
    /// Returns an error if no backend is configured.
    pub fn from_config(config: &ServerConfig) -> Result<Self, BackendSetupError> {
        let base_url = config
            .backend_url
            .as_deref()
            .ok_or(BackendSetupError::NotConfigured)?;
        Self::new(base_url, config.api_key.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the content URL for a section, percent-encoding the id.
    fn section_url(&self, section_id: &str) -> String {
        format!(
            "{}/sections/{}/content",
            self.base_url,
            urlencoding::encode(section_id)
        )
    }

    async fn put_content(
        &self,
        section_id: &str,
        content: &ContentSnapshot,
    ) -> Result<(), BackendError> {
        let mut request = self
            .client
            .put(self.section_url(section_id))
            .json(&UpdateContentRequest { content });

        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(BackendError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

impl ContentBackend for HttpBackend {
    fn update_content<'a>(
        &'a self,
        section_id: &'a str,
        content: &'a ContentSnapshot,
    ) -> BoxFuture<'a, Result<(), BackendError>> {
        self.put_content(section_id, content).boxed()
    }
}

/// Returns true if the backend answers its health endpoint.
pub async fn check_server(base_url: &str) -> bool {
    let url = format!("{}/health", base_url.trim_end_matches('/'));
    let client = match reqwest::Client::builder().timeout(HEALTH_TIMEOUT).build() {
        Ok(client) => client,
        Err(_) => return false,
    };

    match client.get(&url).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}
