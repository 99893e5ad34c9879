//! Google service-account access tokens.
//!
//! A signed JWT assertion is exchanged at the key's `token_uri` for a
//! short-lived bearer token. The token is cached until shortly before it
//! expires, or until a store reports that the remote side rejected it.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::store::StoreError;

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Source of bearer tokens for the spreadsheet API.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String, StoreError>;

    /// Drop any cached token so the next call re-authenticates.
    async fn invalidate(&self);
}

/// The fields of a service-account key file that matter here.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ServiceAccountKey {
    pub fn from_json(blob: &str) -> Result<Self, StoreError> {
        serde_json::from_str(blob)
            .map_err(|e| StoreError::auth(format!("invalid service account credentials: {e}")))
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

pub struct ServiceAccountTokens {
    key: ServiceAccountKey,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokens {
    pub fn new(key: ServiceAccountKey, http: reqwest::Client) -> Self {
        Self {
            key,
            http,
            cached: Mutex::new(None),
        }
    }

    fn assertion(&self) -> Result<String, StoreError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| StoreError::auth(format!("invalid private key: {e}")))?;
        jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| StoreError::auth(format!("failed to sign assertion: {e}")))
    }

    async fn fetch(&self) -> Result<CachedToken, StoreError> {
        let assertion = self.assertion()?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| StoreError::unavailable(format!("token request failed: {e}")))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(StoreError::unavailable(format!("token endpoint returned {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::auth(format!("token endpoint returned {status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| StoreError::auth(format!("malformed token response: {e}")))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
        info!("Obtained spreadsheet access token for {}", self.key.client_email);
        Ok(CachedToken {
            value: token.access_token,
            refresh_at: Instant::now() + lifetime,
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokens {
    async fn token(&self) -> Result<String, StoreError> {
        let mut cached = self.cached.lock().await;
        if let Some(ref token) = *cached
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }
        let fresh = self.fetch().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    async fn invalidate(&self) {
        debug!("Invalidating cached spreadsheet token");
        *self.cached.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreErrorKind;
    use mockito::Matcher;

    const TEST_KEY_PEM: &str = include_str!("../../tests/fixtures/service_account_key.pem");

    fn tokens_for(server: &mockito::Server) -> ServiceAccountTokens {
        ServiceAccountTokens::new(
            key(format!("{}/token", server.url()), TEST_KEY_PEM),
            reqwest::Client::new(),
        )
    }

    fn grant_body() -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), JWT_GRANT_TYPE.into()),
            Matcher::Regex("assertion=".into()),
        ])
    }

    fn key(token_uri: String, private_key: &str) -> ServiceAccountKey {
        ServiceAccountKey {
            client_email: "intake@example.iam.gserviceaccount.com".to_string(),
            private_key: private_key.to_string(),
            private_key_id: None,
            token_uri,
        }
    }

    #[test]
    fn test_parse_key_blob() {
        let key = ServiceAccountKey::from_json(
            r#"{"type":"service_account","client_email":"a@b.c","private_key":"pem","private_key_id":"k1"}"#,
        )
        .unwrap();
        assert_eq!(key.client_email, "a@b.c");
        assert_eq!(key.private_key_id.as_deref(), Some("k1"));
        assert_eq!(key.token_uri, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn test_bad_blob_is_auth_failure() {
        let err = ServiceAccountKey::from_json("{ not json").unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::AuthFailure);
        let err = ServiceAccountKey::from_json(r#"{"client_email":"a@b.c"}"#).unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::AuthFailure);
    }

    #[tokio::test]
    async fn test_malformed_private_key_is_auth_failure() {
        let tokens = ServiceAccountTokens::new(
            key("http://127.0.0.1:1/token".to_string(), "not a pem"),
            reqwest::Client::new(),
        );
        let err = tokens.token().await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::AuthFailure);
    }

    #[tokio::test]
    async fn test_token_is_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(grant_body())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"tok-1","expires_in":3600,"token_type":"Bearer"}"#)
            .expect(1)
            .create_async()
            .await;

        let tokens = tokens_for(&server);
        assert_eq!(tokens.token().await.unwrap(), "tok-1");
        assert_eq!(tokens.token().await.unwrap(), "tok-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"tok-1","expires_in":3600}"#)
            .expect(2)
            .create_async()
            .await;

        let tokens = tokens_for(&server);
        tokens.token().await.unwrap();
        tokens.invalidate().await;
        tokens.token().await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_short_lived_token_is_not_reused() {
        let mut server = mockito::Server::new_async().await;
        // Expires inside the refresh margin.
        let mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"tok-1","expires_in":30}"#)
            .expect(2)
            .create_async()
            .await;

        let tokens = tokens_for(&server);
        tokens.token().await.unwrap();
        tokens.token().await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_grant_is_auth_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let err = tokens_for(&server).token().await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::AuthFailure);
        assert!(err.message.contains("invalid_grant"));
    }

    #[tokio::test]
    async fn test_token_endpoint_outage_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(503)
            .create_async()
            .await;

        let err = tokens_for(&server).token().await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("POST", "/token")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let tokens = tokens_for(&server);
        assert!(tokens.token().await.is_err());
        failing.remove_async().await;

        server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"tok-2"}"#)
            .create_async()
            .await;
        assert_eq!(tokens.token().await.unwrap(), "tok-2");
    }
}
