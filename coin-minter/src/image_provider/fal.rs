use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use url::Url;

use super::{poll_until_done, render_prompt, GenerationStatus, ImageProvider, ImageProviderError};
use crate::config::{base_url, FalConfig, PollingConfig};

#[derive(Debug)]
pub struct FalImageProvider {
	submit_url: Url,
	prompt_template: String,
	input: serde_json::Map<String, serde_json::Value>,
	polling: PollingConfig,
	client: reqwest::Client,
}

#[derive(Debug, serde::Deserialize)]
struct QueuedRequest {
	request_id: String,
	status_url: Url,
	response_url: Url,
}

#[derive(Debug, serde::Deserialize)]
struct QueueStatus {
	status: String,
	#[serde(default)]
	error: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct QueueResult {
	#[serde(default)]
	images: Vec<QueueImage>,
}

#[derive(Debug, serde::Deserialize)]
struct QueueImage {
	url: String,
}

impl FalImageProvider {
	#[tracing::instrument(skip(config), name = "FalImageProvider::new", fields(model = %config.model), err)]
	pub async fn new(config: &FalConfig) -> Result<Self, ImageProviderError> {
		tracing::debug!("setting up fal image provider");

		Ok(Self {
			submit_url: base_url(&config.base_url).join(config.model.trim_matches('/'))?,
			prompt_template: config.prompt_template.clone(),
			input: config.input.clone(),
			polling: config.polling,
			client: {
				let mut builder = reqwest::Client::builder();

				if let Some(timeout) = config.polling.timeout {
					builder = builder.timeout(timeout);
				}

				let mut headers = HeaderMap::new();

				let mut key = HeaderValue::from_str(&format!("Key {}", config.api_key))?;
				key.set_sensitive(true);
				headers.insert(AUTHORIZATION, key);

				builder = builder.default_headers(headers);

				builder.build()?
			},
		})
	}

	async fn status(&self, request: &QueuedRequest) -> Result<GenerationStatus, ImageProviderError> {
		let status: QueueStatus = self
			.client
			.get(request.status_url.clone())
			.send()
			.await?
			.error_for_status()?
			.json()
			.await?;

		match status.status.as_str() {
			"IN_QUEUE" | "IN_PROGRESS" => Ok(GenerationStatus::Pending),
			"COMPLETED" => {
				if let Some(error) = status.error {
					return Ok(GenerationStatus::Failed(error));
				}

				let result: QueueResult = self
					.client
					.get(request.response_url.clone())
					.send()
					.await?
					.error_for_status()?
					.json()
					.await?;

				result
					.images
					.into_iter()
					.next()
					.map(|image| GenerationStatus::Succeeded(image.url))
					.ok_or(ImageProviderError::NoOutput)
			}
			other => Ok(GenerationStatus::Failed(
				status.error.unwrap_or_else(|| format!("request {other}")),
			)),
		}
	}
}

#[async_trait::async_trait]
impl ImageProvider for FalImageProvider {
	fn name(&self) -> &str {
		"fal"
	}

	#[tracing::instrument(skip(self), name = "FalImageProvider::generate", err)]
	async fn generate(&self, prompt: &str) -> Result<String, ImageProviderError> {
		let mut input = self.input.clone();
		input.insert("prompt".into(), render_prompt(&self.prompt_template, prompt)?.into());

		let request: QueuedRequest = self
			.client
			.post(self.submit_url.clone())
			.json(&input)
			.send()
			.await?
			.error_for_status()?
			.json()
			.await?;

		tracing::debug!(request_id = %request.request_id, "request queued");

		poll_until_done(self.polling.poll_interval, self.polling.max_polls, || self.status(&request)).await
	}
}
