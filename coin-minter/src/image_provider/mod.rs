use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use self::fal::FalImageProvider;
use self::replicate::ReplicateImageProvider;
use crate::config::ImageProviderConfig;

pub mod fal;
pub mod replicate;

#[derive(Debug, thiserror::Error)]
pub enum ImageProviderError {
	#[error("reqwest: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("invalid url: {0}")]
	InvalidUrl(#[from] url::ParseError),
	#[error("invalid header value")]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("image generation failed: {0}")]
	Failed(String),
	#[error("image generation timed out after {0} polls")]
	TimedOut(u32),
	#[error("no image returned")]
	NoOutput,
	#[error("empty prompt")]
	EmptyPrompt,
}

/// The state of a submitted generation request, normalized across providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationStatus {
	Pending,
	Succeeded(String),
	Failed(String),
}

#[async_trait::async_trait]
pub trait ImageProvider: Send + Sync {
	fn name(&self) -> &str;

	/// Generates an image for the prompt and returns its URL
	async fn generate(&self, prompt: &str) -> Result<String, ImageProviderError>;
}

/// Polls `status` until it leaves [`GenerationStatus::Pending`], sleeping
/// `interval` between polls and giving up after `max_polls`.
pub async fn poll_until_done<F, Fut>(interval: Duration, max_polls: u32, mut status: F) -> Result<String, ImageProviderError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<GenerationStatus, ImageProviderError>>,
{
	for poll in 1..=max_polls {
		match status().await? {
			GenerationStatus::Succeeded(url) => return Ok(url),
			GenerationStatus::Failed(error) => return Err(ImageProviderError::Failed(error)),
			GenerationStatus::Pending => {
				tracing::trace!(poll, "generation pending");
			}
		}

		if poll < max_polls {
			tokio::time::sleep(interval).await;
		}
	}

	Err(ImageProviderError::TimedOut(max_polls))
}

/// Substitutes `{prompt}` in the template, an empty template sends the prompt
/// as is.
pub fn render_prompt(template: &str, prompt: &str) -> Result<String, ImageProviderError> {
	let prompt = prompt.trim();
	if prompt.is_empty() {
		return Err(ImageProviderError::EmptyPrompt);
	}

	if template.trim().is_empty() {
		return Ok(prompt.to_owned());
	}

	Ok(template.replace("{prompt}", prompt))
}

#[derive(Debug)]
pub enum AnyImageProvider {
	Replicate(ReplicateImageProvider),
	Fal(FalImageProvider),
}

#[async_trait::async_trait]
impl ImageProvider for AnyImageProvider {
	fn name(&self) -> &str {
		match self {
			AnyImageProvider::Replicate(provider) => provider.name(),
			AnyImageProvider::Fal(provider) => provider.name(),
		}
	}

	async fn generate(&self, prompt: &str) -> Result<String, ImageProviderError> {
		match self {
			AnyImageProvider::Replicate(provider) => provider.generate(prompt).await,
			AnyImageProvider::Fal(provider) => provider.generate(prompt).await,
		}
	}
}

pub async fn build_image_provider(config: &ImageProviderConfig) -> Result<Arc<AnyImageProvider>, ImageProviderError> {
	Ok(Arc::new(match config {
		ImageProviderConfig::Replicate(replicate) => AnyImageProvider::Replicate(ReplicateImageProvider::new(replicate).await?),
		ImageProviderConfig::Fal(fal) => AnyImageProvider::Fal(FalImageProvider::new(fal).await?),
	}))
}
