//! Authenticated JSON client shared by the BigQuery and Data Transfer
//! backends.

use std::{sync::Arc, time::Duration};

use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, de::DeserializeOwned};

use crate::{Authenticator, Error, Result, ServiceAccountKey};

/// Cheap to clone: the inner [`reqwest::Client`] and authenticator are
/// reference-counted.
#[derive(Clone)]
pub struct GoogleClient {
  http: Client,
  auth: Arc<Authenticator>,
}

impl GoogleClient {
  fn http_client() -> Result<Client> {
    Ok(
      Client::builder()
        .timeout(Duration::from_secs(60))
        .user_agent(concat!("bqm/", env!("CARGO_PKG_VERSION")))
        .build()?,
    )
  }

  pub fn with_service_account(key: ServiceAccountKey) -> Result<Self> {
    let http = Self::http_client()?;
    let auth = Arc::new(Authenticator::service_account(http.clone(), key));
    Ok(Self { http, auth })
  }

  pub fn with_token(token: impl Into<String>) -> Result<Self> {
    let http = Self::http_client()?;
    let auth = Arc::new(Authenticator::static_token(http.clone(), token));
    Ok(Self { http, auth })
  }

  pub(crate) fn get(&self, url: &str) -> RequestBuilder { self.http.get(url) }

  pub(crate) fn post(&self, url: &str) -> RequestBuilder { self.http.post(url) }

  pub(crate) fn patch(&self, url: &str) -> RequestBuilder { self.http.patch(url) }

  /// Attach a bearer token, send, and decode a 2xx JSON body.
  pub(crate) async fn send_json<T: DeserializeOwned>(
    &self,
    req: RequestBuilder,
    context: &str,
  ) -> Result<T> {
    let token = self.auth.token().await?;
    let resp = req.bearer_auth(token).send().await?;

    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(api_error(context, status.as_u16(), &body));
    }
    Ok(resp.json().await?)
  }
}

/// Build [`Error::Api`] from a Google error body:
/// `{"error": {"code": 400, "message": "...", "status": "INVALID_ARGUMENT"}}`.
pub(crate) fn api_error(context: &str, status: u16, body: &str) -> Error {
  #[derive(Deserialize)]
  struct Envelope {
    error: Detail,
  }

  #[derive(Deserialize)]
  struct Detail {
    message: String,
  }

  let message = match serde_json::from_str::<Envelope>(body) {
    Ok(envelope) => envelope.error.message,
    Err(_) if body.trim().is_empty() => "empty response body".to_owned(),
    Err(_) => body.trim().to_owned(),
  };

  Error::Api { context: context.to_owned(), status, message }
}
