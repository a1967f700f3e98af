//! Async HTTP client wrapping the TapPass JSON API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tappass_core::{
  attempt::AccessAttempt,
  credential::{BadgeCard, Credential, NewCredential},
  session::{OperatorAction, PendingDecision, ScanPhase, ScanResult},
};
use uuid::Uuid;

/// Connection settings for the TapPass API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
  pub username: String,
  pub password: String,
}

/// One entry of `GET /api/readers`.
#[derive(Debug, Deserialize)]
pub struct ReaderView {
  pub reader_id:   String,
  pub operator_id: Uuid,
  pub location:    String,
  pub phase:       ScanPhase,
  pub pending:     Option<PendingDecision>,
}

/// Filters for [`ApiClient::list_attempts`].
#[derive(Debug, Default)]
pub struct LogFilter {
  pub digital_id: Option<String>,
  pub reader_id:  Option<String>,
  pub granted:    Option<bool>,
  pub limit:      Option<usize>,
}

/// Async HTTP client for the TapPass JSON REST API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!(
      "{}/api{}",
      self.config.base_url.trim_end_matches('/'),
      path
    )
  }

  fn auth(&self, req: RequestBuilder) -> RequestBuilder {
    if self.config.username.is_empty() {
      req
    } else {
      req.basic_auth(&self.config.username, Some(&self.config.password))
    }
  }

  /// Send `req` and decode a successful JSON body. Failures surface the
  /// server's `error` message.
  async fn send<T: DeserializeOwned>(&self, what: &str, req: RequestBuilder) -> Result<T> {
    tracing::debug!(request = what, "sending");
    let resp = self
      .auth(req)
      .send()
      .await
      .with_context(|| format!("{what} failed"))?;
    let resp = check(what, resp).await?;
    resp.json().await.with_context(|| format!("deserialising {what} response"))
  }

  // ── Credentials ───────────────────────────────────────────────────────────

  /// `GET /api/credentials/<id>`
  pub async fn get_credential(&self, digital_id: &str) -> Result<Credential> {
    let path = format!("/credentials/{digital_id}");
    self.send(&format!("GET {path}"), self.client.get(self.url(&path))).await
  }

  /// `POST /api/credentials`
  pub async fn register(&self, input: &NewCredential) -> Result<Credential> {
    self
      .send("POST /credentials", self.client.post(self.url("/credentials")).json(input))
      .await
  }

  /// `POST /api/credentials/<id>/activate` or `/deactivate`
  pub async fn set_active(&self, digital_id: &str, active: bool) -> Result<Credential> {
    let verb = if active { "activate" } else { "deactivate" };
    let path = format!("/credentials/{digital_id}/{verb}");
    self.send(&format!("POST {path}"), self.client.post(self.url(&path))).await
  }

  /// `GET /api/verify/<id>`
  pub async fn badge(&self, digital_id: &str) -> Result<BadgeCard> {
    let path = format!("/verify/{digital_id}");
    self.send(&format!("GET {path}"), self.client.get(self.url(&path))).await
  }

  // ── Readers ───────────────────────────────────────────────────────────────

  /// `GET /api/readers`
  pub async fn readers(&self) -> Result<Vec<ReaderView>> {
    self.send("GET /readers", self.client.get(self.url("/readers"))).await
  }

  /// `POST /api/readers/<reader>/scans`
  pub async fn begin_scan(&self, reader: &str, digital_id: &str) -> Result<PendingDecision> {
    let path = format!("/readers/{reader}/scans");
    let req = self.client.post(self.url(&path)).json(&json!({ "digital_id": digital_id }));
    self.send(&format!("POST {path}"), req).await
  }

  /// `POST /api/readers/<reader>/scans/<cycle>`
  pub async fn finalize(
    &self,
    reader: &str,
    cycle_id: Uuid,
    action: &OperatorAction,
  ) -> Result<ScanResult> {
    let path = format!("/readers/{reader}/scans/{cycle_id}");
    self
      .send(&format!("POST {path}"), self.client.post(self.url(&path)).json(action))
      .await
  }

  /// `DELETE /api/readers/<reader>/scans`
  pub async fn cancel(&self, reader: &str) -> Result<()> {
    let path = format!("/readers/{reader}/scans");
    let what = format!("DELETE {path}");
    let resp = self
      .auth(self.client.delete(self.url(&path)))
      .send()
      .await
      .with_context(|| format!("{what} failed"))?;
    check(&what, resp).await?;
    Ok(())
  }

  // ── Access log ────────────────────────────────────────────────────────────

  /// `GET /api/access-attempts`
  pub async fn list_attempts(&self, filter: &LogFilter) -> Result<Vec<AccessAttempt>> {
    let mut query = Vec::new();
    if let Some(id) = &filter.digital_id {
      query.push(("digital_id", id.clone()));
    }
    if let Some(reader) = &filter.reader_id {
      query.push(("reader_id", reader.clone()));
    }
    if let Some(granted) = filter.granted {
      query.push(("granted", granted.to_string()));
    }
    if let Some(limit) = filter.limit {
      query.push(("limit", limit.to_string()));
    }
    let req = self.client.get(self.url("/access-attempts")).query(&query);
    self.send("GET /access-attempts", req).await
  }
}

/// Turn a non-success response into an error carrying the server's message.
async fn check(what: &str, resp: Response) -> Result<Response> {
  let status = resp.status();
  if status.is_success() {
    return Ok(resp);
  }
  let body: Value = resp.json().await.unwrap_or(Value::Null);
  match body.get("error").and_then(Value::as_str) {
    Some(message) => Err(anyhow!("{message} ({what} → {status})")),
    None => Err(anyhow!("{what} → {status}")),
  }
}
