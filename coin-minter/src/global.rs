use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;

use crate::config::CoinMinterConfig;
use crate::database::{build_job_store, AnyJobStore, JobStore};
use crate::deployer::build_coin_deployer;
use crate::image_provider::build_image_provider;
use crate::notifier::{build_notifier, Notifier};
use crate::uploader::build_uploader;
use crate::worker::fallback::SuggestionClient;
use crate::worker::process::{Dependencies, ProcessorSettings};
use crate::worker::Processor;

pub struct Global {
	config: CoinMinterConfig,
	store: Arc<AnyJobStore>,
	processor: Arc<Processor>,
}

impl Global {
	pub async fn new(config: CoinMinterConfig) -> anyhow::Result<Self> {
		const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3);

		let settings = ProcessorSettings::from_config(&config).context("settings")?;

		tracing::debug!("setting up job store");

		let store = tokio::time::timeout(DEFAULT_TIMEOUT, build_job_store(&config.store))
			.await
			.context("job store timeout")?
			.context("job store")?;

		tracing::debug!("setting up image provider, uploader and deployer");

		let image_provider = tokio::time::timeout(DEFAULT_TIMEOUT, build_image_provider(&config.image_provider))
			.await
			.context("image provider timeout")?
			.context("image provider")?;

		let uploader = tokio::time::timeout(DEFAULT_TIMEOUT, build_uploader(&config.uploader))
			.await
			.context("uploader timeout")?
			.context("uploader")?;

		let deployer = tokio::time::timeout(DEFAULT_TIMEOUT, build_coin_deployer(&config.deployer))
			.await
			.context("deployer timeout")?
			.context("deployer")?;

		tracing::debug!("setting up notifiers");

		let mut names = HashSet::new();
		let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

		for notifier in &config.notifiers {
			let notifier = tokio::time::timeout(DEFAULT_TIMEOUT, build_notifier(notifier))
				.await
				.context("notifier timeout")?
				.context("notifier")?;

			let name = notifier.name().to_string();
			if !names.insert(name.clone()) {
				anyhow::bail!("duplicate notifier name: {name}");
			}

			notifiers.push(notifier);
		}

		if config.notifiers.is_empty() {
			tracing::warn!("no notifiers configured");
		}

		let suggestions = SuggestionClient::new(&config.worker.fallback)
			.context("suggestion client")?
			.map(Arc::new);

		let processor = Processor::new(
			Dependencies {
				store: store.clone(),
				image_provider,
				uploader,
				deployer,
				notifiers,
				suggestions,
			},
			settings,
		);

		Ok(Self {
			config,
			store,
			processor: Arc::new(processor),
		})
	}

	pub fn config(&self) -> &CoinMinterConfig {
		&self.config
	}

	pub fn processor(&self) -> &Arc<Processor> {
		&self.processor
	}

	pub async fn healthy(&self) -> bool {
		if !self.store.healthy().await {
			tracing::error!(name = %self.store.name(), "job store check failed");
			return false;
		}

		true
	}
}
