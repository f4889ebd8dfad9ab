//! [`DataTransferBackend`]: scheduled queries through the BigQuery Data
//! Transfer API, upserted by display name.

use std::future::Future;

use bqm_core::backend::{DeployedJob, ScheduleBackend, ScheduledJobDefinition};
use serde::{Deserialize, Serialize};

use crate::{Error, GoogleClient, Result};

pub const TRANSFER_ENDPOINT: &str = "https://bigquerydatatransfer.googleapis.com/v1";

const DATA_SOURCE_ID: &str = "scheduled_query";
const UPDATE_MASK: &str = "display_name,schedule,params,destination_dataset_id";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferConfigBody<'a> {
  display_name:           &'a str,
  data_source_id:         &'static str,
  destination_dataset_id: &'a str,
  schedule:               &'a str,
  params:                 QueryParams<'a>,
}

#[derive(Debug, Serialize)]
struct QueryParams<'a> {
  query: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferConfig {
  name:         String,
  #[serde(default)]
  display_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
  #[serde(default)]
  transfer_configs: Vec<TransferConfig>,
  next_page_token:  Option<String>,
}

impl<'a> TransferConfigBody<'a> {
  fn from_definition(def: &'a ScheduledJobDefinition) -> Self {
    Self {
      display_name:           &def.display_name,
      data_source_id:         DATA_SOURCE_ID,
      destination_dataset_id: &def.destination_dataset,
      schedule:               &def.schedule_expression,
      params:                 QueryParams { query: &def.query },
    }
  }
}

/// `projects/{project}/locations/{location}`; transfer locations are
/// lowercase.
fn parent(def: &ScheduledJobDefinition) -> String {
  format!("projects/{}/locations/{}", def.project, def.location.to_ascii_lowercase())
}

#[derive(Clone)]
pub struct DataTransferBackend {
  client:   GoogleClient,
  endpoint: String,
}

impl DataTransferBackend {
  pub fn new(client: GoogleClient) -> Self {
    Self { client, endpoint: TRANSFER_ENDPOINT.to_owned() }
  }

  pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
    self.endpoint = endpoint.into().trim_end_matches('/').to_owned();
    self
  }

  /// Resource name of the scheduled query called `display_name`, if any.
  async fn find(&self, parent: &str, display_name: &str) -> Result<Option<String>> {
    let url = format!("{}/{parent}/transferConfigs", self.endpoint);
    let mut page_token: Option<String> = None;

    loop {
      let mut query = vec![("dataSourceIds", DATA_SOURCE_ID.to_owned())];
      if let Some(token) = page_token.take() {
        query.push(("pageToken", token));
      }
      let page: ListResponse = self
        .client
        .send_json(self.client.get(&url).query(&query), "transferConfigs.list")
        .await?;

      if let Some(found) = page
        .transfer_configs
        .into_iter()
        .find(|c| c.display_name == display_name)
      {
        return Ok(Some(found.name));
      }

      match page.next_page_token.filter(|t| !t.is_empty()) {
        Some(token) => page_token = Some(token),
        None => return Ok(None),
      }
    }
  }

  async fn upsert_config(&self, def: &ScheduledJobDefinition) -> Result<DeployedJob> {
    let parent = parent(def);
    let body = TransferConfigBody::from_definition(def);

    match self.find(&parent, &def.display_name).await? {
      Some(name) => {
        let url = format!("{}/{name}", self.endpoint);
        let updated: TransferConfig = self
          .client
          .send_json(
            self
              .client
              .patch(&url)
              .query(&[("updateMask", UPDATE_MASK)])
              .json(&body),
            "transferConfigs.patch",
          )
          .await?;
        Ok(DeployedJob { name: updated.name, created: false })
      }
      None => {
        let url = format!("{}/{parent}/transferConfigs", self.endpoint);
        let created: TransferConfig = self
          .client
          .send_json(self.client.post(&url).json(&body), "transferConfigs.create")
          .await?;
        if created.name.is_empty() {
          return Err(Error::Decode("created transfer config has no name".into()));
        }
        Ok(DeployedJob { name: created.name, created: true })
      }
    }
  }
}

impl ScheduleBackend for DataTransferBackend {
  type Error = Error;

  fn upsert<'a>(
    &'a self,
    def: &'a ScheduledJobDefinition,
  ) -> impl Future<Output = Result<DeployedJob>> + Send + 'a {
    self.upsert_config(def)
  }
}
