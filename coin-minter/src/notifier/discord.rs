use url::Url;

use super::{Notification, Notifier, NotifierError};
use crate::config::{DiscordNotifierConfig, NotifyOn};

const SUCCESS_COLOR: u32 = 0x2ecc71;
const FAILURE_COLOR: u32 = 0xe74c3c;

#[derive(Debug)]
pub struct DiscordNotifier {
	name: String,
	url: Url,
	username: Option<String>,
	events: Vec<NotifyOn>,
	client: reqwest::Client,
}

#[derive(Debug, serde::Serialize)]
struct WebhookMessage<'a> {
	content: &'a str,
	#[serde(skip_serializing_if = "Option::is_none")]
	username: Option<&'a str>,
	embeds: Vec<Embed<'a>>,
}

#[derive(Debug, serde::Serialize)]
struct Embed<'a> {
	title: &'a str,
	description: &'a str,
	color: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	image: Option<EmbedImage<'a>>,
	footer: EmbedFooter<'a>,
}

#[derive(Debug, serde::Serialize)]
struct EmbedImage<'a> {
	url: &'a str,
}

#[derive(Debug, serde::Serialize)]
struct EmbedFooter<'a> {
	text: &'a str,
}

impl DiscordNotifier {
	#[tracing::instrument(skip(config), name = "DiscordNotifier::new", fields(name = %config.name), err)]
	pub async fn new(config: &DiscordNotifierConfig) -> Result<Self, NotifierError> {
		tracing::debug!("setting up discord notifier");

		Ok(Self {
			name: config.name.clone(),
			url: config.url.clone(),
			username: config.username.clone(),
			events: config.events.clone(),
			client: {
				let mut builder = reqwest::Client::builder();

				if let Some(timeout) = config.timeout {
					builder = builder.timeout(timeout);
				}

				builder.build()?
			},
		})
	}
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
	fn name(&self) -> &str {
		&self.name
	}

	fn events(&self) -> &[NotifyOn] {
		&self.events
	}

	#[tracing::instrument(skip(self, notification), name = "DiscordNotifier::notify", fields(name = %self.name, job_id = %notification.job_id), err)]
	async fn notify(&self, notification: &Notification) -> Result<(), NotifierError> {
		let (content, color) = match notification.outcome {
			NotifyOn::Success => ("New coin minted", SUCCESS_COLOR),
			NotifyOn::Failure => ("Coin minting failed", FAILURE_COLOR),
		};

		let message = WebhookMessage {
			content,
			username: self.username.as_deref(),
			embeds: vec![Embed {
				title: &notification.title,
				description: &notification.message,
				color,
				image: notification.image_url.as_deref().map(|url| EmbedImage { url }),
				footer: EmbedFooter {
					text: &notification.job_id,
				},
			}],
		};

		self.client
			.post(self.url.clone())
			.json(&message)
			.send()
			.await?
			.error_for_status()?;

		Ok(())
	}
}
