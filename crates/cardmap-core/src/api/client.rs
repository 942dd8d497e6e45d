//! API client for the cardmap REST backend.
//!
//! Every authenticated call goes through [`ApiClient::execute`], which
//! attaches the stored access token and, on a 401, refreshes the token pair
//! once and replays the request once.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderValue};
use reqwest::{Client, Method, Request, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::auth::{TokenKind, TokenLifetime, TokenStore};
use crate::config::Config;
use crate::models::{LoginRequest, RefreshRequest, TokenPair, UserProfile};

use super::refresh::RefreshGate;
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

const PROBE_PATH: &str = "/user/me";
const LOGIN_PATH: &str = "/user/login";
const REFRESH_PATH: &str = "/user/refresh";
const LOGOUT_PATH: &str = "/user/logout";

/// Authorization header value, kept out of `Debug` output
fn bearer(token: &str) -> Result<HeaderValue, ApiError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| ApiError::InvalidRequest("access token is not a valid header value".into()))?;
    value.set_sensitive(true);
    Ok(value)
}

/// API client for the cardmap backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<str>,
    probe_timeout: Duration,
    tokens: Arc<dyn TokenStore>,
    refresh: RefreshGate,
}

impl ApiClient {
    /// Create a new API client reading and writing tokens through `tokens`
    pub fn new(config: &Config, tokens: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: Arc::from(config.api_url().trim_end_matches('/')),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
            tokens,
            refresh: RefreshGate::default(),
        })
    }

    pub fn tokens(&self) -> &dyn TokenStore {
        self.tokens.as_ref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Start a request against `path` on the configured backend
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    // ===== Request pipeline =====

    /// Send an authenticated request, recovering once from an expired access token.
    ///
    /// Non-success statuses become [`ApiError`]. When the refresh cannot
    /// happen or fails, the caller sees the original `Unauthorized`.
    pub async fn execute(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let request = request.build()?;
        // Streaming bodies cannot be replayed, so those requests never retry
        let replay = request.try_clone();
        let method = request.method().clone();
        let url = request.url().path().to_string();

        let sent_token = self.tokens.get(TokenKind::Access);
        let response = self.dispatch(request, sent_token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::check_response(response).await;
        }

        debug!(%method, url = %url, "Request rejected with 401");
        let Some(replay) = replay else {
            debug!(url = %url, "Request body cannot be replayed, not refreshing");
            return Err(ApiError::Unauthorized);
        };

        let Some(token) = self.refresh.recover(self, sent_token.as_deref()).await else {
            return Err(ApiError::Unauthorized);
        };

        debug!(%method, url = %url, "Replaying request once with refreshed token");
        let response = self.dispatch(replay, Some(&token)).await?;
        Self::check_response(response).await
    }

    /// Send a request without credentials or 401 recovery
    async fn execute_public(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self.dispatch(request.build()?, None).await?;
        Self::check_response(response).await
    }

    async fn dispatch(&self, mut request: Request, token: Option<&str>) -> Result<Response, ApiError> {
        if let Some(token) = token {
            request.headers_mut().insert(header::AUTHORIZATION, bearer(token)?);
        }
        Ok(self.client.execute(request).await?)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response, path: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", path, e)))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.execute(self.request(Method::GET, path)).await?;
        Self::parse_json(response, path).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .execute(self.request(Method::POST, path).json(body))
            .await?;
        Self::parse_json(response, path).await
    }

    /// POST with no body and no interest in the response body
    pub async fn post_empty(&self, path: &str) -> Result<(), ApiError> {
        self.execute(self.request(Method::POST, path)).await?;
        Ok(())
    }

    // ===== Auth endpoints =====

    /// Who-am-I probe used to test whether the session is valid
    pub async fn me(&self) -> Result<UserProfile, ApiError> {
        let request = self
            .request(Method::GET, PROBE_PATH)
            .timeout(self.probe_timeout);
        let response = self.execute(request).await?;
        Self::parse_json(response, PROBE_PATH).await
    }

    /// Exchange credentials for a token pair. Does not touch the token store.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, ApiError> {
        let request = self
            .request(Method::POST, LOGIN_PATH)
            .json(&LoginRequest { email, password });
        let response = self.execute_public(request).await?;
        let pair = Self::parse_json(response, LOGIN_PATH).await?;
        info!("Login accepted");
        Ok(pair)
    }

    /// Mint a new token pair from a refresh token. Does not touch the token store.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let request = self
            .request(Method::POST, REFRESH_PATH)
            .json(&RefreshRequest { refresh_token });
        let response = self.execute_public(request).await?;
        Self::parse_json(response, REFRESH_PATH).await
    }

    /// Refresh and persist the pair, returning the new access token.
    ///
    /// Failures are logged and reported as `None`; the caller falls back to
    /// its original error.
    pub(crate) async fn rotate(self, refresh_token: String) -> Option<String> {
        match self.refresh_tokens(&refresh_token).await {
            Ok(pair) => {
                // Only remember-me sessions hold a refresh token
                TokenLifetime::for_remember_me(true).persist(
                    self.tokens(),
                    &pair.access_token,
                    &pair.refresh_token,
                );
                info!("Access token refreshed");
                Some(pair.access_token)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                None
            }
        }
    }

    /// Tell the backend the session is over
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.post_empty(LOGOUT_PATH).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;
    use chrono::Duration as TokenTtl;
    use serde::Deserialize;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Card {
        name: String,
    }

    fn client_for(server: &MockServer) -> (ApiClient, Arc<MemoryTokenStore>) {
        let tokens = Arc::new(MemoryTokenStore::new());
        let config = Config {
            api_base_url: server.uri(),
            ..Config::default()
        };
        let client = ApiClient::new(&config, tokens.clone()).expect("client");
        (client, tokens)
    }

    fn card_body() -> serde_json::Value {
        serde_json::json!({ "name": "Everyday Cashback" })
    }

    #[tokio::test]
    async fn test_attaches_bearer_when_token_present() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/card/list"))
            .and(header("authorization", "Bearer live"))
            .respond_with(ResponseTemplate::new(200).set_body_json(card_body()))
            .expect(1)
            .mount(&server)
            .await;

        let (client, tokens) = client_for(&server);
        tokens.set(TokenKind::Access, "live", TokenTtl::days(1));

        let card: Card = client.get_json("/card/list").await.expect("card");
        assert_eq!(card.name, "Everyday Cashback");
    }

    #[tokio::test]
    async fn test_sends_unauthenticated_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/event/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _tokens) = client_for(&server);
        let events: Vec<serde_json::Value> = client.get_json("/event/list").await.expect("events");
        assert!(events.is_empty());

        let requests = server.received_requests().await.expect("recording");
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_refreshes_and_retries_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/card/list"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/user/refresh"))
            .and(body_json(serde_json::json!({ "refreshToken": "r1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "fresh",
                "refreshToken": "r2"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/card/list"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(card_body()))
            .expect(1)
            .mount(&server)
            .await;

        let (client, tokens) = client_for(&server);
        tokens.set(TokenKind::Access, "stale", TokenTtl::days(1));
        tokens.set(TokenKind::Refresh, "r1", TokenTtl::days(7));

        let card: Card = client.get_json("/card/list").await.expect("card after refresh");
        assert_eq!(card.name, "Everyday Cashback");
        assert_eq!(tokens.get(TokenKind::Access).as_deref(), Some("fresh"));
        assert_eq!(tokens.get(TokenKind::Refresh).as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn test_second_401_is_not_refreshed_again() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/card/list"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/user/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "fresh",
                "refreshToken": "r2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, tokens) = client_for(&server);
        tokens.set(TokenKind::Access, "stale", TokenTtl::days(1));
        tokens.set(TokenKind::Refresh, "r1", TokenTtl::days(7));

        let err = client.get_json::<Card>("/card/list").await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_missing_refresh_token_propagates_original_401() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/card/list"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/user/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (client, tokens) = client_for(&server);
        tokens.set(TokenKind::Access, "stale", TokenTtl::days(1));

        let err = client.get_json::<Card>("/card/list").await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_failed_refresh_propagates_original_401() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/card/list"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/user/refresh"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let (client, tokens) = client_for(&server);
        tokens.set(TokenKind::Access, "stale", TokenTtl::days(1));
        tokens.set(TokenKind::Refresh, "r1", TokenTtl::days(7));

        let err = client.get_json::<Card>("/card/list").await.unwrap_err();
        assert!(err.is_unauthorized());
        // Prior tokens are left as they were
        assert_eq!(tokens.get(TokenKind::Access).as_deref(), Some("stale"));
        assert_eq!(tokens.get(TokenKind::Refresh).as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_other_failures_pass_through_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/card/list"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/user/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (client, tokens) = client_for(&server);
        tokens.set(TokenKind::Refresh, "r1", TokenTtl::days(7));

        let err = client.get_json::<Card>("/card/list").await.unwrap_err();
        assert!(matches!(err, ApiError::ServerError { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/me"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(std::time::Duration::from_secs(3))
                    .set_body_json(serde_json::json!({ "userId": 1, "userEmail": "a@b.co" })),
            )
            .mount(&server)
            .await;

        let tokens = Arc::new(MemoryTokenStore::new());
        let config = Config {
            api_base_url: server.uri(),
            probe_timeout_secs: 1,
            ..Config::default()
        };
        let client = ApiClient::new(&config, tokens).expect("client");

        let err = client.me().await.unwrap_err();
        assert!(matches!(err, ApiError::Timeout), "got {err:?}");
    }

    #[tokio::test]
    async fn test_login_401_is_not_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/login"))
            .and(body_json(serde_json::json!({ "email": "kim@example.com", "password": "pw" })))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/user/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (client, tokens) = client_for(&server);
        tokens.set(TokenKind::Refresh, "r1", TokenTtl::days(7));

        let err = client.login("kim@example.com", "pw").await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[test]
    fn test_url_joining() {
        let tokens = Arc::new(MemoryTokenStore::new());
        let config = Config {
            api_base_url: "https://api.example.com/v1/".to_string(),
            ..Config::default()
        };
        let client = ApiClient::new(&config, tokens).expect("client");
        assert_eq!(client.url("/user/me"), "https://api.example.com/v1/user/me");
        assert_eq!(client.url("user/me"), "https://api.example.com/v1/user/me");
    }

    #[test]
    fn test_bearer_header_is_sensitive() {
        let value = bearer("s3cret-token").expect("header");
        assert!(value.is_sensitive());
        assert_eq!(value.to_str().expect("ascii"), "Bearer s3cret-token");
        assert!(!format!("{:?}", value).contains("s3cret-token"));

        assert!(matches!(bearer("bad\ntoken"), Err(ApiError::InvalidRequest(_))));
    }
}
