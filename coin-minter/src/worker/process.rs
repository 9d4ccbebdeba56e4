use std::sync::Arc;

use chrono::Utc;

use super::fallback::{fallback_job, SuggestionClient};
use super::retry::RetryPolicy;
use crate::config::{CoinConfig, CoinMinterConfig, ConfigError, EmptyQueuePolicy, FallbackConfig};
use crate::database::{Completion, Job, JobStatus, JobStore, JobStoreError};
use crate::deployer::{Address, CoinDeployer, CoinParams, DeployedCoin, DeployerError};
use crate::image_provider::{ImageProvider, ImageProviderError};
use crate::notifier::Notifier;
use crate::uploader::{AssetUploader, UploadError};

/// A failure of one mint attempt.
#[derive(Debug, thiserror::Error)]
pub enum MintError {
	#[error(transparent)]
	Upload(#[from] UploadError),
	#[error(transparent)]
	Deploy(#[from] DeployerError),
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
	#[error("job store: {0}")]
	Store(#[from] JobStoreError),
	#[error("image generation: {0}")]
	Generate(#[from] ImageProviderError),
	#[error("image upload: {0}")]
	Upload(#[from] UploadError),
	#[error("job {0} was claimed by another worker")]
	Lost(String),
	#[error(transparent)]
	Mint(#[from] MintError),
}

/// The collaborators a [`Processor`] talks to.
#[derive(Clone)]
pub struct Dependencies {
	pub store: Arc<dyn JobStore>,
	pub image_provider: Arc<dyn ImageProvider>,
	pub uploader: Arc<dyn AssetUploader>,
	pub deployer: Arc<dyn CoinDeployer>,
	pub notifiers: Vec<Arc<dyn Notifier>>,
	pub suggestions: Option<Arc<SuggestionClient>>,
}

#[derive(Debug, Clone)]
pub struct ProcessorSettings {
	pub coin: CoinConfig,
	pub payout_recipient: Address,
	pub empty_queue: EmptyQueuePolicy,
	pub fallback: FallbackConfig,
	pub mint_retry: RetryPolicy,
}

impl ProcessorSettings {
	pub fn from_config(config: &CoinMinterConfig) -> Result<Self, ConfigError> {
		Ok(Self {
			payout_recipient: config
				.coin
				.payout_recipient
				.parse()
				.map_err(|_| ConfigError::InvalidAddress(config.coin.payout_recipient.clone()))?,
			coin: config.coin.clone(),
			empty_queue: config.worker.empty_queue,
			fallback: config.worker.fallback.clone(),
			mint_retry: config.worker.mint_retry.into(),
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintResult {
	pub job_id: String,
	pub content_hash: String,
	pub transaction_ref: String,
	pub coin_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
	/// The queue was empty and nothing was synthesized
	Idle,
	Minted(MintResult),
}

/// Drives one job at a time through generate, upload and mint.
pub struct Processor {
	deps: Dependencies,
	settings: ProcessorSettings,
	lock: tokio::sync::Mutex<()>,
}

/// Uppercase ASCII alphanumerics of the title, at most six of them.
pub fn derive_symbol(title: &str) -> String {
	let symbol: String = title
		.chars()
		.filter(|c| c.is_ascii_alphanumeric())
		.take(6)
		.map(|c| c.to_ascii_uppercase())
		.collect();

	if symbol.is_empty() {
		"COIN".into()
	} else {
		symbol
	}
}

impl Processor {
	pub fn new(deps: Dependencies, settings: ProcessorSettings) -> Self {
		Self {
			deps,
			settings,
			lock: tokio::sync::Mutex::new(()),
		}
	}

	/// Processes the oldest pending job, or the fallback job when the queue is
	/// empty and the policy asks for one. Invocations on the same processor
	/// never overlap.
	pub async fn run_once(&self) -> Result<RunOutcome, JobError> {
		let _guard = self.lock.lock().await;

		let job = match self.deps.store.fetch_next_pending().await? {
			Some(job) => job,
			None => match self.settings.empty_queue {
				EmptyQueuePolicy::Skip => {
					tracing::info!("no pending jobs");
					return Ok(RunOutcome::Idle);
				}
				EmptyQueuePolicy::Synthesize => {
					let job = fallback_job(&self.settings.fallback, self.deps.suggestions.as_deref()).await;
					tracing::info!(job_id = %job.id, "no pending jobs, synthesized fallback job");
					self.deps.store.insert(&job).await?;
					job
				}
			},
		};

		self.process(job).await.map(RunOutcome::Minted)
	}

	#[tracing::instrument(skip(self, job), fields(job_id = %job.id), name = "Processor::process")]
	async fn process(&self, mut job: Job) -> Result<MintResult, JobError> {
		tracing::info!("starting job");

		let start = tokio::time::Instant::now();

		// Rows from the upload flow arrive with their image already pinned
		let uploaded = job
			.content_hash
			.as_deref()
			.map(str::trim)
			.filter(|hash| !hash.is_empty())
			.map(str::to_owned);

		let content_hash = match uploaded {
			Some(content_hash) => {
				tracing::info!(%content_hash, "minting uploaded image");
				content_hash
			}
			None if job.effective_prompt().is_none() => {
				return self.reject(job, ImageProviderError::EmptyPrompt.into()).await;
			}
			None => match self.prepare(&job).await {
				Ok(content_hash) => content_hash,
				Err(err) => {
					tracing::error!("failed to prepare asset: {err}");
					crate::events::on_failure(&self.deps.notifiers, &job, &err, None).await;
					return Err(err);
				}
			},
		};

		job.content_hash = Some(content_hash.clone());
		let image_url = Some(self.deps.uploader.gateway_url(&content_hash));

		self.claim(&job, Some(&content_hash), image_url.clone()).await?;

		job.status = JobStatus::Processing;

		let minted = self
			.settings
			.mint_retry
			.run(|attempt| self.mint(&job, &content_hash, attempt))
			.await;

		match minted {
			Ok(coin) => {
				let result = MintResult {
					job_id: job.id.clone(),
					content_hash,
					transaction_ref: coin.transaction_hash,
					coin_address: coin.contract_address,
				};

				let completion = Completion {
					transaction_ref: result.transaction_ref.clone(),
					coin_address: result.coin_address.clone(),
					completed_at: Utc::now(),
				};

				match self.deps.store.complete(&job.id, &completion).await {
					Ok(true) => {}
					Ok(false) => tracing::warn!("job left processing before completion was recorded"),
					Err(err) => tracing::error!("failed to record completion: {err}"),
				}

				tracing::info!(
					coin_address = %result.coin_address,
					transaction_ref = %result.transaction_ref,
					"job completed in {:?}",
					start.elapsed()
				);

				crate::events::on_success(&self.deps.notifiers, &job, &result, image_url).await;

				Ok(result)
			}
			Err(err) => {
				let err = JobError::Mint(err);

				self.record_failure(&job.id, &err).await;

				tracing::error!("job failed in {:?}: {err}", start.elapsed());

				crate::events::on_failure(&self.deps.notifiers, &job, &err, image_url).await;

				Err(err)
			}
		}
	}

	/// Fails a job that can never produce an image, so the rows behind it get
	/// their turn.
	async fn reject(&self, job: Job, err: JobError) -> Result<MintResult, JobError> {
		tracing::error!("rejecting job: {err}");

		self.claim(&job, None, None).await?;
		self.record_failure(&job.id, &err).await;

		crate::events::on_failure(&self.deps.notifiers, &job, &err, None).await;

		Err(err)
	}

	/// Takes ownership of the job. A lost claim is not reported to notifiers.
	async fn claim(&self, job: &Job, content_hash: Option<&str>, image_url: Option<String>) -> Result<(), JobError> {
		match self.deps.store.claim(&job.id, content_hash).await {
			Ok(true) => Ok(()),
			Ok(false) => {
				tracing::warn!("lost job");
				Err(JobError::Lost(job.id.clone()))
			}
			Err(err) => {
				let err = JobError::Store(err);
				tracing::error!("failed to claim job: {err}");
				crate::events::on_failure(&self.deps.notifiers, job, &err, image_url).await;
				Err(err)
			}
		}
	}

	/// Best effort, a store error is only logged
	async fn record_failure(&self, id: &str, err: &JobError) {
		match self.deps.store.fail(id, &err.to_string()).await {
			Ok(true) => {}
			Ok(false) => tracing::warn!("job left processing before failure was recorded"),
			Err(store_err) => tracing::error!("failed to record failure: {store_err}"),
		}
	}

	/// Generates and pins the image, returns its content identifier
	async fn prepare(&self, job: &Job) -> Result<String, JobError> {
		let prompt = job.effective_prompt().ok_or(ImageProviderError::EmptyPrompt)?;

		let image_url = self.deps.image_provider.generate(prompt).await?;
		tracing::debug!(%image_url, "image generated");

		let content_hash = self.deps.uploader.upload_image(&image_url).await?;
		tracing::debug!(%content_hash, "image uploaded");

		Ok(content_hash)
	}

	#[tracing::instrument(skip(self, job, content_hash), name = "Processor::mint")]
	async fn mint(&self, job: &Job, content_hash: &str, attempt: u32) -> Result<DeployedCoin, MintError> {
		let coin = &self.settings.coin;

		let name = match job.title.trim() {
			"" => job.id.clone(),
			title => title.to_owned(),
		};

		let description = job
			.description
			.as_deref()
			.map(str::trim)
			.filter(|d| !d.is_empty())
			.unwrap_or(&coin.description);

		let metadata = serde_json::json!({
			"name": name,
			"description": description,
			"image": format!("ipfs://{content_hash}"),
			"properties": {
				"category": coin.category,
			},
		});

		let metadata_cid = self
			.deps
			.uploader
			.upload_json(&format!("{}-metadata.json", job.id), &metadata)
			.await?;

		let params = CoinParams {
			symbol: coin.symbol.clone().unwrap_or_else(|| derive_symbol(&name)),
			name,
			uri: format!("ipfs://{metadata_cid}"),
			payout_recipient: self.settings.payout_recipient.clone(),
			chain_id: coin.chain_id,
			currency: coin.currency,
		};

		Ok(self.deps.deployer.deploy(&params).await?)
	}
}
