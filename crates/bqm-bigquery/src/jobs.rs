//! [`BigQueryBackend`]: runs SQL with `jobs.query` and waits for completion.
//!
//! `jobs.query` returns immediately with `jobComplete: false` for anything
//! slower than its `timeoutMs`; the job is then polled with
//! `jobs.getQueryResults` until it completes, and result pages are followed
//! via `pageToken`.
//!
//! The `errors` list on a query response may hold warnings only. A job has
//! failed when `jobs.get` reports an `errorResult`.

use std::{
  future::Future,
  time::{Duration, Instant},
};

use bqm_core::backend::{ParamValue, QueryBackend, QueryResult, Row, Statement};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, GoogleClient, Result};

pub const BIGQUERY_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Server-side wait per request, in milliseconds.
const SERVER_WAIT_MS: u64 = 10_000;

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
  query:            &'a str,
  use_legacy_sql:   bool,
  location:         &'a str,
  request_id:       String,
  timeout_ms:       u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  parameter_mode:   Option<&'static str>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  query_parameters: Vec<QueryParameter<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryParameter<'a> {
  name:            &'a str,
  parameter_type:  ParameterType,
  parameter_value: ParameterValue,
}

#[derive(Debug, Serialize)]
struct ParameterType {
  #[serde(rename = "type")]
  kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ParameterValue {
  /// Omitted for NULL.
  #[serde(skip_serializing_if = "Option::is_none")]
  value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
  job_reference: Option<JobReference>,
  #[serde(default)]
  job_complete:  bool,
  schema:        Option<TableSchema>,
  #[serde(default)]
  rows:          Vec<TableRow>,
  page_token:    Option<String>,
  #[serde(default)]
  errors:        Vec<ErrorProto>,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorProto {
  #[serde(default)]
  message: String,
}

#[derive(Debug, Deserialize)]
struct JobResource {
  #[serde(default)]
  status: JobStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
  error_result: Option<ErrorProto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
  job_id:   String,
  location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TableSchema {
  #[serde(default)]
  fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
struct FieldSchema {
  name: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
  #[serde(default)]
  f: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
struct Cell {
  #[serde(default)]
  v: Value,
}

fn encode_param<'a>(name: &'a str, value: &ParamValue) -> QueryParameter<'a> {
  let (kind, value) = match value {
    ParamValue::String(s) => ("STRING", s.clone()),
    ParamValue::Int64(i) => ("INT64", Some(i.to_string())),
    ParamValue::Bool(b) => ("BOOL", Some(b.to_string())),
    ParamValue::Timestamp(ts) => (
      "TIMESTAMP",
      Some(ts.format("%Y-%m-%d %H:%M:%S%.6f+00:00").to_string()),
    ),
  };
  QueryParameter {
    name,
    parameter_type: ParameterType { kind },
    parameter_value: ParameterValue { value },
  }
}

/// Zip a page of `{"f": [{"v": ..}]}` rows with the schema's column names.
/// Scalars arrive as JSON strings; nested values are kept as JSON text.
fn decode_rows(schema: &TableSchema, rows: Vec<TableRow>) -> Result<Vec<Row>> {
  rows
    .into_iter()
    .map(|row| {
      if row.f.len() != schema.fields.len() {
        return Err(Error::Decode(format!(
          "row has {} cells but schema has {} fields",
          row.f.len(),
          schema.fields.len()
        )));
      }
      let columns = schema
        .fields
        .iter()
        .zip(row.f)
        .map(|(field, cell)| {
          let value = match cell.v {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
          };
          (field.name.clone(), value)
        })
        .collect();
      Ok(Row::new(columns))
    })
    .collect()
}

// ─── Backend ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct BigQueryBackend {
  client:                   GoogleClient,
  project:                  String,
  endpoint:                 String,
  pub(crate) poll_interval: Duration,
  /// Give up waiting on a job after this long. The job itself keeps running.
  pub(crate) timeout:       Duration,
}

impl BigQueryBackend {
  pub fn new(client: GoogleClient, project: impl Into<String>) -> Self {
    Self {
      client,
      project: project.into(),
      endpoint: BIGQUERY_ENDPOINT.to_owned(),
      poll_interval: Duration::from_secs(2),
      timeout: Duration::from_secs(6 * 60 * 60),
    }
  }

  pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
    self.endpoint = endpoint.into().trim_end_matches('/').to_owned();
    self
  }

  async fn run(&self, statement: &Statement) -> Result<QueryResult> {
    let started = Instant::now();
    let request = QueryRequest {
      query:            &statement.sql,
      use_legacy_sql:   false,
      location:         &statement.location,
      request_id:       uuid::Uuid::new_v4().to_string(),
      timeout_ms:       SERVER_WAIT_MS,
      parameter_mode:   (!statement.params.is_empty()).then_some("NAMED"),
      query_parameters: statement
        .params
        .iter()
        .map(|p| encode_param(&p.name, &p.value))
        .collect(),
    };

    let url = format!("{}/projects/{}/queries", self.endpoint, self.project);
    let mut resp: QueryResponse =
      self.client.send_json(self.client.post(&url).json(&request), "jobs.query").await?;

    while !resp.job_complete {
      let job = resp
        .job_reference
        .clone()
        .ok_or_else(|| Error::Decode("incomplete job without jobReference".into()))?;
      if started.elapsed() >= self.timeout {
        return Err(Error::Timeout { job_id: job.job_id, waited: started.elapsed() });
      }
      tracing::debug!(job_id = %job.job_id, "waiting for query job");
      tokio::time::sleep(self.poll_interval).await;
      resp = self.results_page(&job, &statement.location, None).await?;
    }

    if !resp.errors.is_empty() {
      self.check_job(resp.job_reference.as_ref(), &statement.location, &resp.errors).await?;
    }

    let mut rows = match &resp.schema {
      Some(schema) => decode_rows(schema, std::mem::take(&mut resp.rows))?,
      None => Vec::new(),
    };

    while let (Some(token), Some(job), Some(schema)) =
      (resp.page_token.take(), resp.job_reference.clone(), resp.schema.clone())
    {
      let mut page = self.results_page(&job, &statement.location, Some(&token)).await?;
      rows.extend(decode_rows(&schema, std::mem::take(&mut page.rows))?);
      resp = QueryResponse { schema: page.schema.or(Some(schema)), ..page };
    }

    let elapsed = started.elapsed();
    tracing::debug!(rows = rows.len(), ?elapsed, "query complete");
    Ok(QueryResult { rows, elapsed })
  }

  /// Fail only if the job's final status carries an `errorResult`; other
  /// reported entries are logged as warnings.
  async fn check_job(
    &self,
    job: Option<&JobReference>,
    location: &str,
    reported: &[ErrorProto],
  ) -> Result<()> {
    let Some(job) = job else {
      let message = reported.first().map(|e| e.message.clone()).unwrap_or_default();
      return Err(Error::Job { job_id: String::new(), message });
    };

    let url = format!("{}/projects/{}/jobs/{}", self.endpoint, self.project, job.job_id);
    let query = [("location", job.location.as_deref().unwrap_or(location))];
    let resource: JobResource =
      self.client.send_json(self.client.get(&url).query(&query), "jobs.get").await?;

    if let Some(result) = resource.status.error_result {
      return Err(Error::Job { job_id: job.job_id.clone(), message: result.message });
    }
    for entry in reported {
      tracing::warn!(job_id = %job.job_id, message = %entry.message, "query job warning");
    }
    Ok(())
  }

  async fn results_page(
    &self,
    job: &JobReference,
    location: &str,
    page_token: Option<&str>,
  ) -> Result<QueryResponse> {
    let url = format!("{}/projects/{}/queries/{}", self.endpoint, self.project, job.job_id);
    let mut query = vec![
      ("location", job.location.as_deref().unwrap_or(location).to_owned()),
      ("timeoutMs", SERVER_WAIT_MS.to_string()),
    ];
    if let Some(token) = page_token {
      query.push(("pageToken", token.to_owned()));
    }
    self
      .client
      .send_json(self.client.get(&url).query(&query), "jobs.getQueryResults")
      .await
  }
}

impl QueryBackend for BigQueryBackend {
  type Error = Error;

  fn execute<'a>(
    &'a self,
    statement: &'a Statement,
  ) -> impl Future<Output = Result<QueryResult>> + Send + 'a {
    self.run(statement)
  }
}
