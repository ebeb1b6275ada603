//! API key authentication for the section routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::AppState;

/// Errors loading the key config file
#[derive(Debug)]
pub enum KeyConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for KeyConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            KeyConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for KeyConfigError {}

/// API key entry in the config file
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyEntry {
    pub key: String,
    /// Label used in logs
    pub client: String,
}

/// Server config file structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerConfigFile {
    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
}

/// Authenticated client, added to request extensions after auth
#[derive(Debug, Clone, PartialEq)]
pub struct AuthClient {
    pub client: String,
}

/// Maps API key -> client. An empty store leaves the routes open.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, AuthClient>,
}

impl ApiKeyStore {
    pub fn from_entries(entries: Vec<ApiKeyEntry>) -> Self {
        let keys = entries
            .into_iter()
            .map(|entry| (entry.key, AuthClient { client: entry.client }))
            .collect();
        Self { keys }
    }

    /// Load API keys from the config file.
    ///
    /// A missing file yields an empty store. A file that exists but cannot be
    /// read or parsed is an error, so a typo never opens the routes.
    pub fn load(config_path: &Path) -> Result<Self, KeyConfigError> {
        let contents = match std::fs::read_to_string(config_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "No config file at {}; section routes are open",
                    config_path.display()
                );
                return Ok(Self::default());
            }
            Err(e) => return Err(KeyConfigError::ReadError(config_path.to_path_buf(), e)),
        };

        let config: ServerConfigFile = serde_yaml::from_str(&contents)
            .map_err(|e| KeyConfigError::ParseError(config_path.to_path_buf(), e))?;
        let store = Self::from_entries(config.api_keys);
        tracing::info!("Loaded {} API key(s)", store.len());
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Validate an API key and return the associated client
    pub fn validate(&self, key: &str) -> Option<AuthClient> {
        self.keys.get(key).cloned()
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

fn unauthorized(error: &'static str, message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody {
            error,
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Authentication middleware. Passes every request through when no keys are
/// configured.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if state.api_keys.is_empty() {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) => match h.strip_prefix("Bearer ") {
            Some(key) => key,
            None => {
                return unauthorized(
                    "invalid_auth",
                    "Authorization header must use Bearer scheme",
                )
            }
        },
        None => return unauthorized("missing_auth", "Authorization header required"),
    };

    match state.api_keys.validate(api_key) {
        Some(client) => {
            request.extensions_mut().insert(client);
            next.run(request).await
        }
        None => unauthorized("invalid_key", "Invalid API key"),
    }
}
