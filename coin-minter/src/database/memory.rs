use tokio::sync::RwLock;

use super::{Completion, Job, JobStatus, JobStore, JobStoreError};

#[derive(Debug, Default)]
pub struct MemoryJobStore {
	jobs: RwLock<Vec<Job>>,
}

impl MemoryJobStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Snapshot of every row, in insertion order
	pub async fn jobs(&self) -> Vec<Job> {
		self.jobs.read().await.clone()
	}

	async fn transition(
		&self,
		id: &str,
		from: JobStatus,
		update: impl FnOnce(&mut Job),
	) -> Result<bool, JobStoreError> {
		let mut jobs = self.jobs.write().await;

		let Some(job) = jobs.iter_mut().find(|job| job.id == id && job.status == from) else {
			return Ok(false);
		};

		update(job);

		Ok(true)
	}
}

#[async_trait::async_trait]
impl JobStore for MemoryJobStore {
	fn name(&self) -> &str {
		"memory"
	}

	#[tracing::instrument(skip(self), name = "MemoryJobStore::fetch_next_pending", err)]
	async fn fetch_next_pending(&self) -> Result<Option<Job>, JobStoreError> {
		// Ties on created_at fall back to insertion order
		let jobs = self.jobs.read().await;

		Ok(jobs
			.iter()
			.enumerate()
			.filter(|(_, job)| job.status == JobStatus::Pending)
			.min_by_key(|(idx, job)| (job.created_at, *idx))
			.map(|(_, job)| job.clone()))
	}

	#[tracing::instrument(skip(self, job), name = "MemoryJobStore::insert", fields(job_id = %job.id), err)]
	async fn insert(&self, job: &Job) -> Result<(), JobStoreError> {
		let mut jobs = self.jobs.write().await;

		if jobs.iter().any(|existing| existing.id == job.id) {
			return Err(JobStoreError::Duplicate(job.id.clone()));
		}

		let mut job = job.clone();
		job.created_at.get_or_insert_with(chrono::Utc::now);
		jobs.push(job);

		Ok(())
	}

	async fn get(&self, id: &str) -> Result<Option<Job>, JobStoreError> {
		Ok(self.jobs.read().await.iter().find(|job| job.id == id).cloned())
	}

	#[tracing::instrument(skip(self), name = "MemoryJobStore::claim", err)]
	async fn claim(&self, id: &str, content_hash: Option<&str>) -> Result<bool, JobStoreError> {
		self.transition(id, JobStatus::Pending, |job| {
			job.status = JobStatus::Processing;
			if let Some(content_hash) = content_hash {
				job.content_hash = Some(content_hash.to_owned());
			}
		})
		.await
	}

	#[tracing::instrument(skip(self, completion), name = "MemoryJobStore::complete", err)]
	async fn complete(&self, id: &str, completion: &Completion) -> Result<bool, JobStoreError> {
		self.transition(id, JobStatus::Processing, |job| {
			job.status = JobStatus::Completed;
			job.transaction_ref = Some(completion.transaction_ref.clone());
			job.coin_address = Some(completion.coin_address.clone());
			job.completed_at = Some(completion.completed_at);
		})
		.await
	}

	#[tracing::instrument(skip(self), name = "MemoryJobStore::fail", err)]
	async fn fail(&self, id: &str, error_message: &str) -> Result<bool, JobStoreError> {
		self.transition(id, JobStatus::Processing, |job| {
			job.status = JobStatus::Failed;
			job.error_message = Some(error_message.to_owned());
		})
		.await
	}
}
