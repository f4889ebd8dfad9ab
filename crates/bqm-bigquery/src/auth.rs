//! OAuth access tokens for Google APIs.
//!
//! A service-account key is turned into an RS256-signed assertion and
//! exchanged at the key's token endpoint. Tokens are cached until shortly
//! before they expire.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{Error, Result, ServiceAccountKey};

const SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME: i64 = 3600;
/// Refresh this long before the reported expiry.
const EXPIRY_SLACK: i64 = 60;

#[derive(Debug, Serialize)]
struct Claims<'a> {
  iss:   &'a str,
  scope: &'a str,
  aud:   &'a str,
  iat:   i64,
  exp:   i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token: String,
  #[serde(default = "default_expires_in")]
  expires_in:   i64,
}

fn default_expires_in() -> i64 { ASSERTION_LIFETIME }

#[derive(Debug, Clone)]
struct CachedToken {
  value:      String,
  expires_at: DateTime<Utc>,
}

enum Source {
  ServiceAccount(ServiceAccountKey),
  Static(String),
}

pub struct Authenticator {
  http:   Client,
  source: Source,
  cached: Mutex<Option<CachedToken>>,
}

impl Authenticator {
  pub fn service_account(http: Client, key: ServiceAccountKey) -> Self {
    Self { http, source: Source::ServiceAccount(key), cached: Mutex::new(None) }
  }

  /// Use a token obtained elsewhere, e.g. `gcloud auth print-access-token`.
  pub fn static_token(http: Client, token: impl Into<String>) -> Self {
    Self { http, source: Source::Static(token.into()), cached: Mutex::new(None) }
  }

  /// A bearer token valid for at least [`EXPIRY_SLACK`] seconds.
  pub async fn token(&self) -> Result<String> {
    let key = match &self.source {
      Source::Static(token) => return Ok(token.clone()),
      Source::ServiceAccount(key) => key,
    };

    let mut cached = self.cached.lock().await;
    if let Some(token) = cached.as_ref() {
      if token.expires_at - Duration::seconds(EXPIRY_SLACK) > Utc::now() {
        return Ok(token.value.clone());
      }
    }

    let fresh = self.exchange(key).await?;
    let value = fresh.value.clone();
    *cached = Some(fresh);
    Ok(value)
  }

  async fn exchange(&self, key: &ServiceAccountKey) -> Result<CachedToken> {
    let now = Utc::now();
    let assertion = sign_assertion(key, now)?;

    tracing::debug!(account = %key.client_email, "requesting access token");
    let resp = self
      .http
      .post(&key.token_uri)
      .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
      .send()
      .await?;

    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(Error::Api {
        context: "token exchange".into(),
        status:  status.as_u16(),
        message: oauth_error_message(&body),
      });
    }

    let token: TokenResponse = resp.json().await?;
    Ok(CachedToken {
      value:      token.access_token,
      expires_at: now + Duration::seconds(token.expires_in),
    })
  }
}

fn sign_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String> {
  let mut header = Header::new(Algorithm::RS256);
  header.kid = key.private_key_id.clone();

  let claims = Claims {
    iss:   &key.client_email,
    scope: SCOPE,
    aud:   &key.token_uri,
    iat:   now.timestamp(),
    exp:   now.timestamp() + ASSERTION_LIFETIME,
  };

  let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
  Ok(encode(&header, &claims, &signing_key)?)
}

/// `error_description` (or `error`) from an OAuth error body, else the body.
fn oauth_error_message(body: &str) -> String {
  #[derive(Deserialize)]
  struct OAuthError {
    error:             Option<String>,
    error_description: Option<String>,
  }

  serde_json::from_str::<OAuthError>(body)
    .ok()
    .and_then(|e| e.error_description.or(e.error))
    .unwrap_or_else(|| body.trim().to_owned())
}
