use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::types::Identity;

use super::CollaboratorError;

/// Resolves a bearer token to the caller's identity.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, bearer_token: &str) -> Result<Identity, CollaboratorError>;
}

/// Token table for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryIdentityResolver {
    tokens: DashMap<String, Identity>,
    outage: Mutex<Option<CollaboratorError>>,
}

impl InMemoryIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: impl Into<String>, identity: Identity) {
        self.tokens.insert(token.into(), identity);
    }

    pub fn revoke(&self, token: &str) {
        self.tokens.remove(token);
    }

    /// Fails every resolution with `error` until [`Self::recover`] is called.
    pub fn fail_with(&self, error: CollaboratorError) {
        *self.outage.lock() = Some(error);
    }

    pub fn recover(&self) {
        self.outage.lock().take();
    }
}

#[async_trait]
impl IdentityResolver for InMemoryIdentityResolver {
    async fn resolve(&self, bearer_token: &str) -> Result<Identity, CollaboratorError> {
        let outage = self.outage.lock().clone();
        if let Some(error) = outage {
            return Err(error);
        }
        self.tokens
            .get(bearer_token)
            .map(|entry| entry.value().clone())
            .ok_or(CollaboratorError::InvalidToken)
    }
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    #[serde(alias = "id")]
    user_id: serde_json::Value,
    #[serde(alias = "username")]
    display_name: String,
}

/// Asks the auth service who owns the token via `GET {base}/users/me`.
pub struct HttpIdentityResolver {
    client: reqwest::Client,
    me_url: Url,
}

impl HttpIdentityResolver {
    pub fn new(client: reqwest::Client, base: &Url) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            me_url: base.join("users/me")?,
        })
    }
}

#[async_trait]
impl IdentityResolver for HttpIdentityResolver {
    async fn resolve(&self, bearer_token: &str) -> Result<Identity, CollaboratorError> {
        let response = self
            .client
            .get(self.me_url.clone())
            .bearer_auth(bearer_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                return Err(CollaboratorError::InvalidToken)
            }
            status if !status.is_success() => {
                return Err(CollaboratorError::transient(format!(
                    "identity service answered {status}"
                )))
            }
            _ => {}
        }

        let me: MeResponse = response.json().await?;
        let user_id = match me.user_id {
            serde_json::Value::String(id) => id,
            serde_json::Value::Number(id) => id.to_string(),
            other => {
                return Err(CollaboratorError::Malformed(format!(
                    "unexpected user id {other}"
                )))
            }
        };
        Ok(Identity::new(user_id, me.display_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_tokens_resolve_and_revoked_ones_fail() {
        let resolver = InMemoryIdentityResolver::new();
        resolver.insert("tok-ana", Identity::new("u1", "ana"));

        let identity = resolver.resolve("tok-ana").await.unwrap();
        assert_eq!(identity, Identity::new("u1", "ana"));

        resolver.fail_with(CollaboratorError::transient("down"));
        assert!(resolver.resolve("tok-ana").await.unwrap_err().is_retryable());
        resolver.recover();

        resolver.revoke("tok-ana");
        assert_eq!(
            resolver.resolve("tok-ana").await,
            Err(CollaboratorError::InvalidToken)
        );
    }

    #[test]
    fn me_url_is_joined_onto_base() {
        let base = Url::parse("http://auth.local/api/").unwrap();
        let resolver = HttpIdentityResolver::new(reqwest::Client::new(), &base).unwrap();
        assert_eq!(resolver.me_url.as_str(), "http://auth.local/api/users/me");
    }
}
