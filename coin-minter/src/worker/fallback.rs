use url::Url;

use crate::config::FallbackConfig;
use crate::database::Job;

/// Reads the top voted prompt suggestion.
#[derive(Debug)]
pub struct SuggestionClient {
	url: Url,
	client: reqwest::Client,
}

#[derive(Debug, serde::Deserialize)]
struct Suggestion {
	#[serde(default)]
	text: String,
}

impl SuggestionClient {
	#[tracing::instrument(skip(config), name = "SuggestionClient::new", err)]
	pub fn new(config: &FallbackConfig) -> Result<Option<Self>, reqwest::Error> {
		let Some(url) = &config.suggestion_url else {
			return Ok(None);
		};

		let mut builder = reqwest::Client::builder();

		if let Some(timeout) = config.suggestion_timeout {
			builder = builder.timeout(timeout);
		}

		Ok(Some(Self {
			url: url.clone(),
			client: builder.build()?,
		}))
	}

	/// The suggested prompt, `None` when the endpoint has nothing to offer
	pub async fn fetch(&self) -> Result<Option<String>, reqwest::Error> {
		let suggestion: Suggestion = self
			.client
			.get(self.url.clone())
			.send()
			.await?
			.error_for_status()?
			.json()
			.await?;

		let text = suggestion.text.trim();
		Ok((!text.is_empty()).then(|| text.to_owned()))
	}
}

/// Builds the job processed when the queue is empty. The prompt comes from the
/// suggestion endpoint when it answers, from the configured prompt otherwise.
pub async fn fallback_job(config: &FallbackConfig, suggestions: Option<&SuggestionClient>) -> Job {
	let suggested = match suggestions {
		Some(client) => match client.fetch().await {
			Ok(text) => text,
			Err(err) => {
				tracing::warn!("failed to fetch prompt suggestion: {err}");
				None
			}
		},
		None => None,
	};

	Job::new(config.title.clone(), suggested.unwrap_or_else(|| config.prompt.clone()))
}
