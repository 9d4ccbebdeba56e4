use std::sync::Arc;

use chrono::{DateTime, Utc};

use self::memory::MemoryJobStore;
use self::postgres::{PostgresJobStore, PostgresJobStoreError};
use self::postgrest::{PostgrestJobStore, PostgrestJobStoreError};
use crate::config::StoreConfig;

pub mod memory;
pub mod postgres;
pub mod postgrest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
	#[default]
	Pending,
	Processing,
	Completed,
	Failed,
}

impl JobStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			JobStatus::Pending => "pending",
			JobStatus::Processing => "processing",
			JobStatus::Completed => "completed",
			JobStatus::Failed => "failed",
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, JobStatus::Completed | JobStatus::Failed)
	}
}

impl std::fmt::Display for JobStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for JobStatus {
	type Err = JobStoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending" => Ok(JobStatus::Pending),
			"processing" => Ok(JobStatus::Processing),
			"completed" => Ok(JobStatus::Completed),
			"failed" => Ok(JobStatus::Failed),
			_ => Err(JobStoreError::InvalidStatus(s.to_owned())),
		}
	}
}

/// A row of the queue table.
#[derive(Debug, Clone, PartialEq, Default, serde::Deserialize, serde::Serialize)]
pub struct Job {
	/// The id of the job
	pub id: String,
	/// Display label, also the coin name
	#[serde(alias = "name", default)]
	pub title: String,
	/// Text driving the image generation
	#[serde(default)]
	pub prompt: Option<String>,
	#[serde(default)]
	pub description: Option<String>,
	/// Content identifier of the uploaded image
	#[serde(default)]
	pub content_hash: Option<String>,
	#[serde(default)]
	pub status: JobStatus,
	/// Left to the database default when unset
	#[serde(skip_serializing_if = "Option::is_none")]
	pub created_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub completed_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub transaction_ref: Option<String>,
	#[serde(default)]
	pub coin_address: Option<String>,
	#[serde(default)]
	pub error_message: Option<String>,
}

impl Job {
	/// A new pending job with a generated id
	pub fn new(title: impl Into<String>, prompt: impl Into<String>) -> Self {
		Self {
			id: ulid::Ulid::new().to_string(),
			title: title.into(),
			prompt: Some(prompt.into()),
			status: JobStatus::Pending,
			created_at: Some(Utc::now()),
			..Default::default()
		}
	}

	/// The prompt handed to the image provider, the title stands in for rows
	/// uploaded without one.
	pub fn effective_prompt(&self) -> Option<&str> {
		self.prompt
			.as_deref()
			.map(str::trim)
			.filter(|p| !p.is_empty())
			.or_else(|| Some(self.title.trim()).filter(|t| !t.is_empty()))
	}
}

/// The terminal data written when a job completes.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
	pub transaction_ref: String,
	pub coin_address: String,
	pub completed_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
	#[error("postgrest: {0}")]
	Postgrest(#[from] PostgrestJobStoreError),
	#[error("postgres: {0}")]
	Postgres(#[from] PostgresJobStoreError),
	#[error("invalid status: {0}")]
	InvalidStatus(String),
	#[error("duplicate job id: {0}")]
	Duplicate(String),
}

/// Row level contract of the queue table.
///
/// Status writes are conditional on the status the caller expects the row to
/// be in and report whether a row was changed, which is how a worker learns it
/// lost a job to another worker.
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
	/// Get the name of the store
	fn name(&self) -> &str;

	/// The oldest pending job, if any
	async fn fetch_next_pending(&self) -> Result<Option<Job>, JobStoreError>;

	/// Inserts a new job
	async fn insert(&self, job: &Job) -> Result<(), JobStoreError>;

	/// Fetches a job by id
	async fn get(&self, id: &str) -> Result<Option<Job>, JobStoreError>;

	/// Moves a job from `pending` to `processing`. A given content hash replaces
	/// the stored one, `None` keeps it.
	async fn claim(&self, id: &str, content_hash: Option<&str>) -> Result<bool, JobStoreError>;

	/// Moves a job from `processing` to `completed`
	async fn complete(&self, id: &str, completion: &Completion) -> Result<bool, JobStoreError>;

	/// Moves a job from `processing` to `failed`
	async fn fail(&self, id: &str, error_message: &str) -> Result<bool, JobStoreError>;

	async fn healthy(&self) -> bool {
		true
	}
}

#[derive(Debug)]
pub enum AnyJobStore {
	Postgrest(PostgrestJobStore),
	Postgres(PostgresJobStore),
	Memory(MemoryJobStore),
}

#[async_trait::async_trait]
impl JobStore for AnyJobStore {
	fn name(&self) -> &str {
		match self {
			AnyJobStore::Postgrest(store) => store.name(),
			AnyJobStore::Postgres(store) => store.name(),
			AnyJobStore::Memory(store) => store.name(),
		}
	}

	async fn fetch_next_pending(&self) -> Result<Option<Job>, JobStoreError> {
		match self {
			AnyJobStore::Postgrest(store) => store.fetch_next_pending().await,
			AnyJobStore::Postgres(store) => store.fetch_next_pending().await,
			AnyJobStore::Memory(store) => store.fetch_next_pending().await,
		}
	}

	async fn insert(&self, job: &Job) -> Result<(), JobStoreError> {
		match self {
			AnyJobStore::Postgrest(store) => store.insert(job).await,
			AnyJobStore::Postgres(store) => store.insert(job).await,
			AnyJobStore::Memory(store) => store.insert(job).await,
		}
	}

	async fn get(&self, id: &str) -> Result<Option<Job>, JobStoreError> {
		match self {
			AnyJobStore::Postgrest(store) => store.get(id).await,
			AnyJobStore::Postgres(store) => store.get(id).await,
			AnyJobStore::Memory(store) => store.get(id).await,
		}
	}

	async fn claim(&self, id: &str, content_hash: Option<&str>) -> Result<bool, JobStoreError> {
		match self {
			AnyJobStore::Postgrest(store) => store.claim(id, content_hash).await,
			AnyJobStore::Postgres(store) => store.claim(id, content_hash).await,
			AnyJobStore::Memory(store) => store.claim(id, content_hash).await,
		}
	}

	async fn complete(&self, id: &str, completion: &Completion) -> Result<bool, JobStoreError> {
		match self {
			AnyJobStore::Postgrest(store) => store.complete(id, completion).await,
			AnyJobStore::Postgres(store) => store.complete(id, completion).await,
			AnyJobStore::Memory(store) => store.complete(id, completion).await,
		}
	}

	async fn fail(&self, id: &str, error_message: &str) -> Result<bool, JobStoreError> {
		match self {
			AnyJobStore::Postgrest(store) => store.fail(id, error_message).await,
			AnyJobStore::Postgres(store) => store.fail(id, error_message).await,
			AnyJobStore::Memory(store) => store.fail(id, error_message).await,
		}
	}

	async fn healthy(&self) -> bool {
		match self {
			AnyJobStore::Postgrest(store) => store.healthy().await,
			AnyJobStore::Postgres(store) => store.healthy().await,
			AnyJobStore::Memory(store) => store.healthy().await,
		}
	}
}

pub async fn build_job_store(config: &StoreConfig) -> Result<Arc<AnyJobStore>, JobStoreError> {
	Ok(Arc::new(match config {
		StoreConfig::Postgrest(postgrest) => AnyJobStore::Postgrest(PostgrestJobStore::new(postgrest).await?),
		StoreConfig::Postgres(postgres) => AnyJobStore::Postgres(PostgresJobStore::new(postgres).await?),
		StoreConfig::Memory => AnyJobStore::Memory(MemoryJobStore::new()),
	}))
}
