use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use url::Url;

use crate::config::{CoinConfig, EmptyQueuePolicy, FallbackConfig, NotifyOn};
use crate::database::memory::MemoryJobStore;
use crate::database::{Completion, Job, JobStore, JobStoreError};
use crate::deployer::{CoinDeployer, CoinParams, DeployedCoin, DeployerError};
use crate::image_provider::{ImageProvider, ImageProviderError};
use crate::notifier::{Notification, Notifier, NotifierError};
use crate::uploader::{AssetUploader, UploadError};
use crate::worker::process::{Dependencies, ProcessorSettings};
use crate::worker::retry::RetryPolicy;
use crate::worker::Processor;

pub const PAYOUT: &str = "0xC27d4CcC62E64791c5B321C38E2aF647F091ddf5";

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn serve(router: axum::Router) -> Url {
	let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
	let addr = listener.local_addr().expect("local addr");

	tokio::spawn(async move {
		axum::serve(listener, router).await.expect("serve");
	});

	Url::parse(&format!("http://{addr}/")).expect("url")
}

pub fn settings() -> ProcessorSettings {
	ProcessorSettings {
		coin: CoinConfig {
			payout_recipient: PAYOUT.into(),
			..Default::default()
		},
		payout_recipient: PAYOUT.parse().expect("address"),
		empty_queue: EmptyQueuePolicy::Skip,
		fallback: FallbackConfig::default(),
		mint_retry: RetryPolicy::default(),
	}
}

pub fn pending_job(id: &str, prompt: Option<&str>) -> Job {
	Job {
		id: id.into(),
		prompt: prompt.map(Into::into),
		created_at: Some(chrono::Utc::now()),
		..Default::default()
	}
}

pub struct FakeImageProvider {
	outcome: Result<String, String>,
	pub prompts: Mutex<Vec<String>>,
}

impl FakeImageProvider {
	pub fn succeeding(url: &str) -> Self {
		Self {
			outcome: Ok(url.into()),
			prompts: Mutex::default(),
		}
	}

	pub fn failing(message: &str) -> Self {
		Self {
			outcome: Err(message.into()),
			prompts: Mutex::default(),
		}
	}

	pub fn prompts(&self) -> Vec<String> {
		self.prompts.lock().expect("lock").clone()
	}
}

#[async_trait::async_trait]
impl ImageProvider for FakeImageProvider {
	fn name(&self) -> &str {
		"fake"
	}

	async fn generate(&self, prompt: &str) -> Result<String, ImageProviderError> {
		self.prompts.lock().expect("lock").push(prompt.to_owned());
		self.outcome.clone().map_err(ImageProviderError::Failed)
	}
}

pub struct FakeUploader {
	image_cid: String,
	metadata_cid: String,
	pub sources: Mutex<Vec<String>>,
	pub documents: Mutex<Vec<(String, serde_json::Value)>>,
}

impl FakeUploader {
	pub fn new(image_cid: &str, metadata_cid: &str) -> Self {
		Self {
			image_cid: image_cid.into(),
			metadata_cid: metadata_cid.into(),
			sources: Mutex::default(),
			documents: Mutex::default(),
		}
	}

	pub fn sources(&self) -> Vec<String> {
		self.sources.lock().expect("lock").clone()
	}

	pub fn documents(&self) -> Vec<(String, serde_json::Value)> {
		self.documents.lock().expect("lock").clone()
	}
}

#[async_trait::async_trait]
impl AssetUploader for FakeUploader {
	fn name(&self) -> &str {
		"fake"
	}

	async fn upload_image(&self, source: &str) -> Result<String, UploadError> {
		self.sources.lock().expect("lock").push(source.to_owned());
		Ok(self.image_cid.clone())
	}

	async fn upload_json(&self, name: &str, value: &serde_json::Value) -> Result<String, UploadError> {
		self.documents.lock().expect("lock").push((name.to_owned(), value.clone()));
		Ok(self.metadata_cid.clone())
	}

	fn gateway_url(&self, cid: &str) -> String {
		format!("https://gateway.test/ipfs/{cid}")
	}
}

/// Fails the first `failures` deployments, then succeeds.
pub struct FakeDeployer {
	failures: u32,
	attempts: AtomicU32,
	pub calls: Mutex<Vec<(tokio::time::Instant, CoinParams)>>,
	transaction_hash: String,
	contract_address: String,
}

impl FakeDeployer {
	pub fn new(transaction_hash: &str, contract_address: &str, failures: u32) -> Self {
		Self {
			failures,
			attempts: AtomicU32::new(0),
			calls: Mutex::default(),
			transaction_hash: transaction_hash.into(),
			contract_address: contract_address.into(),
		}
	}

	pub fn calls(&self) -> Vec<(tokio::time::Instant, CoinParams)> {
		self.calls.lock().expect("lock").clone()
	}
}

#[async_trait::async_trait]
impl CoinDeployer for FakeDeployer {
	fn name(&self) -> &str {
		"fake"
	}

	async fn deploy(&self, params: &CoinParams) -> Result<DeployedCoin, DeployerError> {
		self.calls
			.lock()
			.expect("lock")
			.push((tokio::time::Instant::now(), params.clone()));

		let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
		if attempt <= self.failures {
			return Err(DeployerError::Rejected(format!("deploy failed on attempt {attempt}")));
		}

		Ok(DeployedCoin {
			transaction_hash: self.transaction_hash.clone(),
			contract_address: self.contract_address.clone(),
			deployment: serde_json::json!({ "block": 1 }),
		})
	}
}

pub struct FakeNotifier {
	name: String,
	events: Vec<NotifyOn>,
	pub received: Mutex<Vec<Notification>>,
}

impl FakeNotifier {
	pub fn new(name: &str, events: &[NotifyOn]) -> Self {
		Self {
			name: name.into(),
			events: events.to_vec(),
			received: Mutex::default(),
		}
	}

	pub fn received(&self) -> Vec<Notification> {
		self.received.lock().expect("lock").clone()
	}
}

#[async_trait::async_trait]
impl Notifier for FakeNotifier {
	fn name(&self) -> &str {
		&self.name
	}

	fn events(&self) -> &[NotifyOn] {
		&self.events
	}

	async fn notify(&self, notification: &Notification) -> Result<(), NotifierError> {
		self.received.lock().expect("lock").push(notification.clone());
		Ok(())
	}
}

/// Loses every claim to a competing worker right before making its own.
#[derive(Default)]
pub struct StealingJobStore {
	pub inner: MemoryJobStore,
}

#[async_trait::async_trait]
impl JobStore for StealingJobStore {
	fn name(&self) -> &str {
		"stealing"
	}

	async fn fetch_next_pending(&self) -> Result<Option<Job>, JobStoreError> {
		self.inner.fetch_next_pending().await
	}

	async fn insert(&self, job: &Job) -> Result<(), JobStoreError> {
		self.inner.insert(job).await
	}

	async fn get(&self, id: &str) -> Result<Option<Job>, JobStoreError> {
		self.inner.get(id).await
	}

	async fn claim(&self, id: &str, content_hash: Option<&str>) -> Result<bool, JobStoreError> {
		assert!(self.inner.claim(id, Some("bafyother")).await?);
		self.inner.claim(id, content_hash).await
	}

	async fn complete(&self, id: &str, completion: &Completion) -> Result<bool, JobStoreError> {
		self.inner.complete(id, completion).await
	}

	async fn fail(&self, id: &str, error_message: &str) -> Result<bool, JobStoreError> {
		self.inner.fail(id, error_message).await
	}
}

/// Accepts claims but fails every terminal write.
#[derive(Default)]
pub struct UnfinishableJobStore {
	pub inner: MemoryJobStore,
}

#[async_trait::async_trait]
impl JobStore for UnfinishableJobStore {
	fn name(&self) -> &str {
		"unfinishable"
	}

	async fn fetch_next_pending(&self) -> Result<Option<Job>, JobStoreError> {
		self.inner.fetch_next_pending().await
	}

	async fn insert(&self, job: &Job) -> Result<(), JobStoreError> {
		self.inner.insert(job).await
	}

	async fn get(&self, id: &str) -> Result<Option<Job>, JobStoreError> {
		self.inner.get(id).await
	}

	async fn claim(&self, id: &str, content_hash: Option<&str>) -> Result<bool, JobStoreError> {
		self.inner.claim(id, content_hash).await
	}

	async fn complete(&self, _: &str, _: &Completion) -> Result<bool, JobStoreError> {
		Err(JobStoreError::InvalidStatus("store unavailable".into()))
	}

	async fn fail(&self, _: &str, _: &str) -> Result<bool, JobStoreError> {
		Err(JobStoreError::InvalidStatus("store unavailable".into()))
	}
}

/// The fakes behind a processor, kept around for assertions.
pub struct Harness {
	pub store: Arc<MemoryJobStore>,
	pub provider: Arc<FakeImageProvider>,
	pub uploader: Arc<FakeUploader>,
	pub deployer: Arc<FakeDeployer>,
	pub notifier: Arc<FakeNotifier>,
}

impl Harness {
	pub fn new(provider: FakeImageProvider, deployer: FakeDeployer) -> Self {
		Self {
			store: Arc::new(MemoryJobStore::new()),
			provider: Arc::new(provider),
			uploader: Arc::new(FakeUploader::new("bafy123", "bafymeta")),
			deployer: Arc::new(deployer),
			notifier: Arc::new(FakeNotifier::new("fake", &[NotifyOn::Success, NotifyOn::Failure])),
		}
	}

	pub fn dependencies(&self) -> Dependencies {
		Dependencies {
			store: self.store.clone(),
			image_provider: self.provider.clone(),
			uploader: self.uploader.clone(),
			deployer: self.deployer.clone(),
			notifiers: vec![self.notifier.clone() as Arc<dyn Notifier>],
			suggestions: None,
		}
	}

	pub fn processor(&self, settings: ProcessorSettings) -> Processor {
		Processor::new(self.dependencies(), settings)
	}
}
