use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use url::Url;

use super::{Completion, Job, JobStatus, JobStore, JobStoreError};
use crate::config::{base_url, PostgrestStoreConfig};

/// Job store backed by the hosted datastore's REST row API.
#[derive(Debug)]
pub struct PostgrestJobStore {
	table_url: Url,
	client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum PostgrestJobStoreError {
	#[error("invalid url: {0}")]
	InvalidUrl(#[from] url::ParseError),
	#[error("reqwest: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("invalid header value")]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
}

/// Only the columns the processor writes on insert, the rest keep their
/// database defaults.
#[derive(Debug, serde::Serialize)]
struct NewRow<'a> {
	id: &'a str,
	title: &'a str,
	prompt: Option<&'a str>,
	description: Option<&'a str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	content_hash: Option<&'a str>,
	status: JobStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl PostgrestJobStore {
	#[tracing::instrument(skip(config), name = "PostgrestJobStore::new", fields(table = %config.table), err)]
	pub async fn new(config: &PostgrestStoreConfig) -> Result<Self, PostgrestJobStoreError> {
		tracing::debug!("setting up postgrest job store");

		let table_url = base_url(&config.url).join("rest/v1/")?.join(&config.table)?;

		Ok(Self {
			table_url,
			client: {
				let mut builder = reqwest::Client::builder();

				if let Some(timeout) = config.timeout {
					builder = builder.timeout(timeout);
				}

				let mut headers = HeaderMap::new();

				let mut api_key = HeaderValue::from_str(&config.api_key)?;
				api_key.set_sensitive(true);
				headers.insert("apikey", api_key);

				let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))?;
				bearer.set_sensitive(true);
				headers.insert(AUTHORIZATION, bearer);

				builder = builder.default_headers(headers);

				builder.build()?
			},
		})
	}

	fn url(&self, filters: &[(&str, String)]) -> Url {
		let mut url = self.table_url.clone();

		{
			let mut query = url.query_pairs_mut();
			for (key, value) in filters {
				query.append_pair(key, value);
			}
		}

		url
	}

	async fn select(&self, url: Url) -> Result<Vec<Job>, PostgrestJobStoreError> {
		Ok(self.client.get(url).send().await?.error_for_status()?.json().await?)
	}

	/// Patches the row matching `id` and `from`, returns whether a row changed
	async fn transition(
		&self,
		id: &str,
		from: JobStatus,
		body: serde_json::Value,
	) -> Result<bool, PostgrestJobStoreError> {
		let url = self.url(&[("id", format!("eq.{id}")), ("status", format!("eq.{from}"))]);

		let rows: Vec<serde_json::Value> = self
			.client
			.patch(url)
			.header("Prefer", "return=representation")
			.json(&body)
			.send()
			.await?
			.error_for_status()?
			.json()
			.await?;

		Ok(!rows.is_empty())
	}
}

#[async_trait::async_trait]
impl JobStore for PostgrestJobStore {
	fn name(&self) -> &str {
		"postgrest"
	}

	#[tracing::instrument(skip(self), name = "PostgrestJobStore::fetch_next_pending", err)]
	async fn fetch_next_pending(&self) -> Result<Option<Job>, JobStoreError> {
		let url = self.url(&[
			("select", "*".to_owned()),
			("status", format!("eq.{}", JobStatus::Pending)),
			("order", "created_at.asc".to_owned()),
			("limit", "1".to_owned()),
		]);

		Ok(self.select(url).await?.into_iter().next())
	}

	#[tracing::instrument(skip(self, job), name = "PostgrestJobStore::insert", fields(job_id = %job.id), err)]
	async fn insert(&self, job: &Job) -> Result<(), JobStoreError> {
		let row = NewRow {
			id: &job.id,
			title: &job.title,
			prompt: job.prompt.as_deref(),
			description: job.description.as_deref(),
			content_hash: job.content_hash.as_deref(),
			status: job.status,
			created_at: job.created_at,
		};

		self.client
			.post(self.table_url.clone())
			.header("Prefer", "return=minimal")
			.json(&row)
			.send()
			.await
			.and_then(|response| response.error_for_status())
			.map_err(PostgrestJobStoreError::Reqwest)?;

		Ok(())
	}

	#[tracing::instrument(skip(self), name = "PostgrestJobStore::get", err)]
	async fn get(&self, id: &str) -> Result<Option<Job>, JobStoreError> {
		let url = self.url(&[("select", "*".to_owned()), ("id", format!("eq.{id}")), ("limit", "1".to_owned())]);

		Ok(self.select(url).await?.into_iter().next())
	}

	#[tracing::instrument(skip(self), name = "PostgrestJobStore::claim", err)]
	async fn claim(&self, id: &str, content_hash: Option<&str>) -> Result<bool, JobStoreError> {
		let mut body = serde_json::json!({ "status": JobStatus::Processing });
		if let Some(content_hash) = content_hash {
			body["content_hash"] = content_hash.into();
		}

		Ok(self.transition(id, JobStatus::Pending, body).await?)
	}

	#[tracing::instrument(skip(self, completion), name = "PostgrestJobStore::complete", err)]
	async fn complete(&self, id: &str, completion: &Completion) -> Result<bool, JobStoreError> {
		Ok(self
			.transition(
				id,
				JobStatus::Processing,
				serde_json::json!({
					"status": JobStatus::Completed,
					"transaction_ref": completion.transaction_ref,
					"coin_address": completion.coin_address,
					"completed_at": completion.completed_at,
				}),
			)
			.await?)
	}

	#[tracing::instrument(skip(self), name = "PostgrestJobStore::fail", err)]
	async fn fail(&self, id: &str, error_message: &str) -> Result<bool, JobStoreError> {
		Ok(self
			.transition(
				id,
				JobStatus::Processing,
				serde_json::json!({
					"status": JobStatus::Failed,
					"error_message": error_message,
				}),
			)
			.await?)
	}

	async fn healthy(&self) -> bool {
		let url = self.url(&[("select", "id".to_owned()), ("limit", "1".to_owned())]);

		match self.client.head(url).send().await {
			Ok(response) => response.status().is_success(),
			Err(err) => {
				tracing::error!("postgrest health check failed: {err}");
				false
			}
		}
	}
}
