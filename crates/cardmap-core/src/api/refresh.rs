//! Single-flight token refresh.
//!
//! Concurrent 401 handlers share one in-flight refresh instead of each
//! spending the refresh token on its own call.

use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use crate::auth::store::lock;
use crate::auth::TokenKind;

use super::ApiClient;

type InFlight = Shared<BoxFuture<'static, Option<String>>>;

#[derive(Default)]
struct Gate {
    generation: u64,
    in_flight: Option<(u64, InFlight)>,
}

#[derive(Clone, Default)]
pub(crate) struct RefreshGate {
    gate: Arc<Mutex<Gate>>,
}

impl RefreshGate {
    /// Obtain an access token to replay a request rejected while carrying `rejected`.
    ///
    /// Returns `None` when the session cannot be recovered: no refresh token
    /// is stored, or the refresh call failed.
    pub(crate) async fn recover(&self, client: &ApiClient, rejected: Option<&str>) -> Option<String> {
        let (generation, refresh) = {
            let mut gate = lock(&self.gate);
            match &gate.in_flight {
                Some((generation, refresh)) => {
                    debug!("Joining in-flight token refresh");
                    (*generation, refresh.clone())
                }
                None => {
                    let current = client.tokens().get(TokenKind::Access);
                    if current.is_some() && current.as_deref() != rejected {
                        debug!("Access token already rotated, skipping refresh");
                        return current;
                    }

                    let Some(refresh_token) = client.tokens().get(TokenKind::Refresh) else {
                        debug!("No refresh token stored, session cannot be recovered");
                        return None;
                    };

                    gate.generation += 1;
                    let generation = gate.generation;
                    let refresh = client.clone().rotate(refresh_token).boxed().shared();
                    gate.in_flight = Some((generation, refresh.clone()));
                    (generation, refresh)
                }
            }
        };

        let token = refresh.await;

        let mut gate = lock(&self.gate);
        if matches!(&gate.in_flight, Some((current, _)) if *current == generation) {
            gate.in_flight = None;
        }
        token
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::auth::{MemoryTokenStore, TokenStore};
    use crate::config::Config;

    use super::*;

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/card/benefits"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/user/refresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(std::time::Duration::from_millis(200))
                    .set_body_json(serde_json::json!({
                        "accessToken": "fresh",
                        "refreshToken": "r2"
                    })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/card/benefits"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([1, 2])))
            .expect(5)
            .mount(&server)
            .await;

        let tokens = Arc::new(MemoryTokenStore::new());
        tokens.set(TokenKind::Access, "stale", Duration::days(1));
        tokens.set(TokenKind::Refresh, "r1", Duration::days(7));
        let config = Config {
            api_base_url: server.uri(),
            ..Config::default()
        };
        let client = ApiClient::new(&config, tokens.clone()).expect("client");

        let calls = (0..5).map(|_| {
            let client = client.clone();
            async move { client.get_json::<Vec<u32>>("/card/benefits").await }
        });
        let results = futures::future::join_all(calls).await;

        for result in results {
            assert_eq!(result.expect("recovered"), vec![1, 2]);
        }
        assert_eq!(tokens.get(TokenKind::Access).as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_superseded_token_is_reused_without_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let tokens = Arc::new(MemoryTokenStore::new());
        tokens.set(TokenKind::Access, "newer", Duration::days(1));
        tokens.set(TokenKind::Refresh, "r1", Duration::days(7));
        let config = Config {
            api_base_url: server.uri(),
            ..Config::default()
        };
        let client = ApiClient::new(&config, tokens).expect("client");

        let gate = RefreshGate::default();
        let token = gate.recover(&client, Some("older")).await;
        assert_eq!(token.as_deref(), Some("newer"));
    }
}
