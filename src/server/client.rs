//! API client for communicating with the board server.
//!
//! This module provides the [`ApiClient`] struct which handles all HTTP
//! communication with the board backend, and the feedback middleware that
//! turns each request's lifecycle into transient status signals.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};

use super::types::{
    parse_notification_list, ChannelAuthRequest, ChannelAuthResponse, LoginRequest,
    LoginResponse,
};
use super::{NotificationApi, RequestError};
use crate::auth::TokenStore;
use crate::config::Config;
use crate::constants;
use crate::feedback::FeedbackBus;
use crate::notifications::NotificationRecord;

/// API client for the board server.
///
/// Attaches the bearer token from the [`TokenStore`] to every request and
/// reports request status on the [`FeedbackBus`].
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
    feedback: FeedbackBus,
    loading_text: String,
    fallback_error_text: String,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Creates a new API client from the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(
        config: &Config,
        tokens: Arc<dyn TokenStore>,
        feedback: FeedbackBus,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(constants::HTTP_REQUEST_TIMEOUT)
            .build()?;

        let mut api = Self::with_client(client, config.api_base_url.clone(), tokens, feedback);
        api.loading_text.clone_from(&config.loading_text);
        api.fallback_error_text
            .clone_from(&config.fallback_error_text);
        Ok(api)
    }

    /// Creates an API client with a pre-configured HTTP client.
    ///
    /// Useful for testing or when custom client configuration is needed.
    pub fn with_client(
        client: Client,
        base_url: String,
        tokens: Arc<dyn TokenStore>,
        feedback: FeedbackBus,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            feedback,
            loading_text: constants::DEFAULT_LOADING_TEXT.to_string(),
            fallback_error_text: constants::DEFAULT_FALLBACK_ERROR_TEXT.to_string(),
        }
    }

    /// Returns the API base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Token store used for authentication.
    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Builds an authenticated request for `path` (relative to the base URL).
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let builder = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        match self.tokens.get_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends a request through the feedback middleware.
    ///
    /// Signals `loading` before sending. Afterwards the banner is cleared and,
    /// on success, a body `message` is shown as a success; on failure the
    /// most specific error text is shown. The outcome is returned unchanged:
    /// this layer observes, it never swallows.
    pub async fn execute(&self, builder: RequestBuilder) -> Result<serde_json::Value, RequestError> {
        self.feedback.loading(&self.loading_text);

        let result = Self::dispatch(builder).await;

        self.feedback.clear();
        match &result {
            Ok(body) => {
                if let Some(message) = body.get("message").and_then(serde_json::Value::as_str) {
                    if !message.is_empty() {
                        self.feedback.success(message);
                    }
                }
            }
            Err(e) => {
                log::warn!("[Api] {e}");
                self.feedback
                    .error(e.user_message(&self.fallback_error_text));
            }
        }
        result
    }

    /// Sends a request without feedback signalling.
    async fn dispatch(builder: RequestBuilder) -> Result<serde_json::Value, RequestError> {
        let response = builder
            .send()
            .await
            .map_err(|e| RequestError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RequestError::Network(e.to_string()))?;
        let body = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
        };

        if status.is_success() {
            log::debug!("[Api] {status}");
            Ok(body)
        } else {
            let field = |name: &str| {
                body.get(name)
                    .and_then(serde_json::Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
            };
            Err(RequestError::Status {
                status: status.as_u16(),
                message: field("message"),
                error: field("error"),
            })
        }
    }

    /// Logs in and returns the token and user.
    ///
    /// Does not store anything; see [`crate::auth::login`].
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, RequestError> {
        let body = self
            .execute(
                self.request(Method::POST, "/login")
                    .json(&LoginRequest { email, password }),
            )
            .await?;
        serde_json::from_value(body).map_err(|e| RequestError::Decode(e.to_string()))
    }

    /// Authorizes a private push channel for the given socket.
    ///
    /// Runs outside the feedback middleware: the push layer authorizes in the
    /// background and must not flash the request banner.
    pub async fn authorize_channel(
        &self,
        auth_url: &str,
        socket_id: &str,
        channel_name: &str,
    ) -> Result<String, RequestError> {
        let mut builder = self
            .client
            .post(auth_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&ChannelAuthRequest {
                socket_id,
                channel_name,
            });
        if let Some(token) = self.tokens.get_token() {
            builder = builder.bearer_auth(token);
        }

        let body = Self::dispatch(builder).await?;
        let response: ChannelAuthResponse =
            serde_json::from_value(body).map_err(|e| RequestError::Decode(e.to_string()))?;
        Ok(response.auth)
    }
}

#[async_trait]
impl NotificationApi for ApiClient {
    async fn fetch_notifications(&self) -> Result<Vec<NotificationRecord>, RequestError> {
        let body = self
            .execute(self.request(Method::GET, "/notifications"))
            .await?;
        parse_notification_list(body)
    }

    async fn mark_read(&self, id: &str) -> Result<(), RequestError> {
        self.execute(self.request(Method::POST, &format!("/notifications/{id}/read")))
            .await
            .map(drop)
    }

    async fn mark_all_read(&self) -> Result<(), RequestError> {
        self.execute(self.request(Method::POST, "/notifications/read-all"))
            .await
            .map(drop)
    }

    async fn delete_notification(&self, id: &str) -> Result<(), RequestError> {
        self.execute(self.request(Method::DELETE, &format!("/notifications/{id}")))
            .await
            .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;

    #[test]
    fn test_api_client_creation() {
        let client = ApiClient::new(
            &Config::default(),
            Arc::new(MemoryTokenStore::new()),
            FeedbackBus::new(),
        );

        assert!(client.is_ok());
        let client = client.unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000/api");
    }

    #[test]
    fn test_api_client_with_custom_client_trims_slash() {
        let client = ApiClient::with_client(
            Client::new(),
            "https://board.example.com/api/".to_string(),
            Arc::new(MemoryTokenStore::new()),
            FeedbackBus::new(),
        );

        assert_eq!(client.base_url(), "https://board.example.com/api");
    }

    #[test]
    fn test_request_attaches_bearer_token() {
        let tokens = MemoryTokenStore::new();
        tokens.set_token("tok-1").unwrap();
        let client = ApiClient::with_client(
            Client::new(),
            "https://board.example.com/api".to_string(),
            Arc::new(tokens),
            FeedbackBus::new(),
        );

        let request = client
            .request(Method::GET, "/notifications")
            .build()
            .unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://board.example.com/api/notifications"
        );
        assert_eq!(
            request.headers()[reqwest::header::AUTHORIZATION],
            "Bearer tok-1"
        );
    }

    #[test]
    fn test_request_without_token_has_no_authorization() {
        let client = ApiClient::with_client(
            Client::new(),
            "https://board.example.com/api".to_string(),
            Arc::new(MemoryTokenStore::new()),
            FeedbackBus::new(),
        );

        let request = client.request(Method::GET, "notifications").build().unwrap();
        assert!(request
            .headers()
            .get(reqwest::header::AUTHORIZATION)
            .is_none());
    }
}
