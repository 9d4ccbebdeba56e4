use reqwest::header::{HeaderMap, HeaderValue};
use url::Url;

use super::{Notification, Notifier, NotifierError};
use crate::config::{base_url, FarcasterNotifierConfig, NotifyOn};

/// Casts are capped at 320 bytes.
const MAX_CAST_LEN: usize = 320;

#[derive(Debug)]
pub struct FarcasterNotifier {
	name: String,
	cast_url: Url,
	signer_uuid: String,
	channel_id: Option<String>,
	events: Vec<NotifyOn>,
	client: reqwest::Client,
}

#[derive(Debug, serde::Serialize)]
struct Cast<'a> {
	signer_uuid: &'a str,
	text: String,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	embeds: Vec<CastEmbed<'a>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	channel_id: Option<&'a str>,
}

#[derive(Debug, serde::Serialize)]
struct CastEmbed<'a> {
	url: &'a str,
}

impl FarcasterNotifier {
	#[tracing::instrument(skip(config), name = "FarcasterNotifier::new", fields(name = %config.name), err)]
	pub async fn new(config: &FarcasterNotifierConfig) -> Result<Self, NotifierError> {
		tracing::debug!("setting up farcaster notifier");

		Ok(Self {
			name: config.name.clone(),
			cast_url: base_url(&config.base_url).join("v2/farcaster/cast")?,
			signer_uuid: config.signer_uuid.clone(),
			channel_id: config.channel_id.clone(),
			events: config.events.clone(),
			client: {
				let mut builder = reqwest::Client::builder();

				if let Some(timeout) = config.timeout {
					builder = builder.timeout(timeout);
				}

				let mut headers = HeaderMap::new();

				let mut api_key = HeaderValue::from_str(&config.api_key)?;
				api_key.set_sensitive(true);
				headers.insert("x-api-key", api_key);

				builder = builder.default_headers(headers);

				builder.build()?
			},
		})
	}
}

/// Joins title and message and cuts the result on a char boundary.
pub fn cast_text(notification: &Notification) -> String {
	let mut text = format!("{}\n{}", notification.title, notification.message);

	if text.len() > MAX_CAST_LEN {
		let mut end = MAX_CAST_LEN;
		while !text.is_char_boundary(end) {
			end -= 1;
		}
		text.truncate(end);
	}

	text
}

#[async_trait::async_trait]
impl Notifier for FarcasterNotifier {
	fn name(&self) -> &str {
		&self.name
	}

	fn events(&self) -> &[NotifyOn] {
		&self.events
	}

	#[tracing::instrument(skip(self, notification), name = "FarcasterNotifier::notify", fields(name = %self.name, job_id = %notification.job_id), err)]
	async fn notify(&self, notification: &Notification) -> Result<(), NotifierError> {
		let cast = Cast {
			signer_uuid: &self.signer_uuid,
			text: cast_text(notification),
			embeds: notification.image_url.as_deref().map(|url| CastEmbed { url }).into_iter().collect(),
			channel_id: self.channel_id.as_deref(),
		};

		self.client
			.post(self.cast_url.clone())
			.json(&cast)
			.send()
			.await?
			.error_for_status()?;

		Ok(())
	}
}
