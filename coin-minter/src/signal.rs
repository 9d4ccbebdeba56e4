use futures::FutureExt;
use tokio::signal::unix::{Signal, SignalKind};

/// Waits on any of a set of unix signals.
#[derive(Default)]
pub struct SignalHandler {
	signals: Vec<(SignalKind, Signal)>,
}

impl SignalHandler {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_signal(mut self, kind: SignalKind) -> std::io::Result<Self> {
		if !self.signals.iter().any(|(k, _)| k == &kind) {
			self.signals.push((kind, tokio::signal::unix::signal(kind)?));
		}

		Ok(self)
	}

	/// The next signal received, `None` when no signal is registered
	pub async fn recv(&mut self) -> Option<SignalKind> {
		if self.signals.is_empty() {
			return None;
		}

		let (kind, _, _) = futures::future::select_all(
			self.signals
				.iter_mut()
				.map(|(kind, signal)| Box::pin(signal.recv().map(|_| *kind))),
		)
		.await;

		Some(kind)
	}
}
