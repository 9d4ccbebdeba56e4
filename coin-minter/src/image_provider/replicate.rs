use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use url::Url;

use super::{poll_until_done, render_prompt, GenerationStatus, ImageProvider, ImageProviderError};
use crate::config::{base_url, PollingConfig, ReplicateConfig};

#[derive(Debug)]
pub struct ReplicateImageProvider {
	base_url: Url,
	model: String,
	version: Option<String>,
	prompt_template: String,
	input: serde_json::Map<String, serde_json::Value>,
	polling: PollingConfig,
	client: reqwest::Client,
}

#[derive(Debug, serde::Deserialize)]
pub struct Prediction {
	pub id: String,
	pub status: String,
	#[serde(default)]
	pub output: Option<PredictionOutput>,
	#[serde(default)]
	pub error: Option<serde_json::Value>,
}

/// Models answer with either a single URL or a list of them.
#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
pub enum PredictionOutput {
	One(String),
	Many(Vec<String>),
}

impl PredictionOutput {
	fn first(self) -> Option<String> {
		match self {
			PredictionOutput::One(url) => Some(url),
			PredictionOutput::Many(urls) => urls.into_iter().next(),
		}
	}
}

impl Prediction {
	fn into_status(self) -> Result<GenerationStatus, ImageProviderError> {
		match self.status.as_str() {
			"succeeded" => self
				.output
				.and_then(PredictionOutput::first)
				.map(GenerationStatus::Succeeded)
				.ok_or(ImageProviderError::NoOutput),
			"failed" | "canceled" => Ok(GenerationStatus::Failed(match self.error {
				Some(serde_json::Value::String(error)) => error,
				Some(error) => error.to_string(),
				None => format!("prediction {}", self.status),
			})),
			_ => Ok(GenerationStatus::Pending),
		}
	}
}

impl ReplicateImageProvider {
	#[tracing::instrument(skip(config), name = "ReplicateImageProvider::new", fields(model = %config.model), err)]
	pub async fn new(config: &ReplicateConfig) -> Result<Self, ImageProviderError> {
		tracing::debug!("setting up replicate image provider");

		Ok(Self {
			base_url: base_url(&config.base_url),
			model: config.model.clone(),
			version: config.version.clone(),
			prompt_template: config.prompt_template.clone(),
			input: config.input.clone(),
			polling: config.polling,
			client: {
				let mut builder = reqwest::Client::builder();

				if let Some(timeout) = config.polling.timeout {
					builder = builder.timeout(timeout);
				}

				let mut headers = HeaderMap::new();

				let mut token = HeaderValue::from_str(&format!("Token {}", config.api_key))?;
				token.set_sensitive(true);
				headers.insert(AUTHORIZATION, token);

				builder = builder.default_headers(headers);

				builder.build()?
			},
		})
	}

	async fn submit(&self, prompt: String) -> Result<Prediction, ImageProviderError> {
		let mut input = self.input.clone();
		input.insert("prompt".into(), prompt.into());

		let (url, body) = match &self.version {
			Some(version) => (
				self.base_url.join("predictions")?,
				serde_json::json!({ "version": version, "input": input }),
			),
			None => (
				self.base_url.join(&format!("models/{}/predictions", self.model))?,
				serde_json::json!({ "input": input }),
			),
		};

		Ok(self
			.client
			.post(url)
			.json(&body)
			.send()
			.await?
			.error_for_status()?
			.json()
			.await?)
	}

	async fn status(&self, id: &str) -> Result<GenerationStatus, ImageProviderError> {
		let url = self.base_url.join(&format!("predictions/{id}"))?;

		let prediction: Prediction = self.client.get(url).send().await?.error_for_status()?.json().await?;

		prediction.into_status()
	}
}

#[async_trait::async_trait]
impl ImageProvider for ReplicateImageProvider {
	fn name(&self) -> &str {
		"replicate"
	}

	#[tracing::instrument(skip(self), name = "ReplicateImageProvider::generate", err)]
	async fn generate(&self, prompt: &str) -> Result<String, ImageProviderError> {
		let prompt = render_prompt(&self.prompt_template, prompt)?;

		let prediction = self.submit(prompt).await?;
		let id = prediction.id.clone();

		tracing::debug!(prediction_id = %id, "prediction submitted");

		match prediction.into_status()? {
			GenerationStatus::Succeeded(url) => return Ok(url),
			GenerationStatus::Failed(error) => return Err(ImageProviderError::Failed(error)),
			GenerationStatus::Pending => {}
		}

		poll_until_done(self.polling.poll_interval, self.polling.max_polls, || self.status(&id)).await
	}
}
