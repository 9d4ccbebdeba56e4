use std::sync::Arc;

use crate::config::NotifyOn;
use crate::database::Job;
use crate::notifier::{Notification, Notifier};
use crate::worker::process::MintResult;
use crate::worker::JobError;

/// Delivers the notification to every subscribed notifier. Failures are
/// logged and never reach the caller.
#[tracing::instrument(skip(notifiers, notification), fields(job_id = %notification.job_id, outcome = ?notification.outcome))]
pub async fn notify_all(notifiers: &[Arc<dyn Notifier>], notification: Notification) {
	for notifier in notifiers.iter().filter(|notifier| notifier.subscribed(notification.outcome)) {
		if let Err(err) = notifier.notify(&notification).await {
			tracing::error!(name = %notifier.name(), "failed to send notification: {err}");
		}
	}
}

fn display_title(job: &Job) -> &str {
	let title = job.title.trim();
	if title.is_empty() {
		&job.id
	} else {
		title
	}
}

pub fn success_notification(job: &Job, result: &MintResult, image_url: Option<String>) -> Notification {
	Notification {
		outcome: NotifyOn::Success,
		job_id: job.id.clone(),
		title: display_title(job).to_owned(),
		message: format!(
			"Coin: {}\nTransaction: {}\nImage: ipfs://{}",
			result.coin_address, result.transaction_ref, result.content_hash
		),
		image_url,
	}
}

pub fn failure_notification(job: &Job, err: &JobError, image_url: Option<String>) -> Notification {
	Notification {
		outcome: NotifyOn::Failure,
		job_id: job.id.clone(),
		title: display_title(job).to_owned(),
		message: format!("Job {} failed: {err}", job.id),
		image_url,
	}
}

pub async fn on_success(notifiers: &[Arc<dyn Notifier>], job: &Job, result: &MintResult, image_url: Option<String>) {
	notify_all(notifiers, success_notification(job, result, image_url)).await;
}

pub async fn on_failure(notifiers: &[Arc<dyn Notifier>], job: &Job, err: &JobError, image_url: Option<String>) {
	notify_all(notifiers, failure_notification(job, err, image_url)).await;
}
