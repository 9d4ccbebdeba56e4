use std::sync::Arc;

use self::discord::DiscordNotifier;
use self::farcaster::FarcasterNotifier;
use crate::config::{NotifierConfig, NotifyOn};

pub mod discord;
pub mod farcaster;

#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
	#[error("reqwest: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("invalid url: {0}")]
	InvalidUrl(#[from] url::ParseError),
	#[error("invalid header value")]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
}

/// A human readable job outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
	pub outcome: NotifyOn,
	pub job_id: String,
	pub title: String,
	/// One or more lines of plain text
	pub message: String,
	/// Public link to the generated image, when one exists
	pub image_url: Option<String>,
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
	fn name(&self) -> &str;

	/// Outcomes this notifier wants to hear about
	fn events(&self) -> &[NotifyOn];

	fn subscribed(&self, outcome: NotifyOn) -> bool {
		self.events().contains(&outcome)
	}

	async fn notify(&self, notification: &Notification) -> Result<(), NotifierError>;
}

#[derive(Debug)]
pub enum AnyNotifier {
	Discord(DiscordNotifier),
	Farcaster(FarcasterNotifier),
}

#[async_trait::async_trait]
impl Notifier for AnyNotifier {
	fn name(&self) -> &str {
		match self {
			AnyNotifier::Discord(notifier) => notifier.name(),
			AnyNotifier::Farcaster(notifier) => notifier.name(),
		}
	}

	fn events(&self) -> &[NotifyOn] {
		match self {
			AnyNotifier::Discord(notifier) => notifier.events(),
			AnyNotifier::Farcaster(notifier) => notifier.events(),
		}
	}

	async fn notify(&self, notification: &Notification) -> Result<(), NotifierError> {
		match self {
			AnyNotifier::Discord(notifier) => notifier.notify(notification).await,
			AnyNotifier::Farcaster(notifier) => notifier.notify(notification).await,
		}
	}
}

pub async fn build_notifier(config: &NotifierConfig) -> Result<Arc<AnyNotifier>, NotifierError> {
	Ok(Arc::new(match config {
		NotifierConfig::Discord(discord) => AnyNotifier::Discord(DiscordNotifier::new(discord).await?),
		NotifierConfig::Farcaster(farcaster) => AnyNotifier::Farcaster(FarcasterNotifier::new(farcaster).await?),
	}))
}
