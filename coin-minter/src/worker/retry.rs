use std::future::Future;
use std::time::Duration;

/// Delay before the next attempt, given the number of the attempt that just
/// failed (starting at 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
	None,
	Fixed(Duration),
	Linear(Duration),
}

impl Backoff {
	pub fn delay(&self, attempt: u32) -> Duration {
		match self {
			Backoff::None => Duration::ZERO,
			Backoff::Fixed(delay) => *delay,
			Backoff::Linear(step) => step.saturating_mul(attempt),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	max_attempts: u32,
	backoff: Backoff,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self::new(3, Backoff::Linear(Duration::from_secs(2)))
	}
}

impl RetryPolicy {
	/// At least one attempt is always made.
	pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
		Self {
			max_attempts: max_attempts.max(1),
			backoff,
		}
	}

	pub fn max_attempts(&self) -> u32 {
		self.max_attempts
	}

	pub fn backoff(&self) -> Backoff {
		self.backoff
	}

	/// Runs `op` until it succeeds or the attempts are used up, returning the
	/// last error in that case. `op` receives the attempt number.
	pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
	where
		F: FnMut(u32) -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: std::fmt::Display,
	{
		let mut attempt = 1;

		loop {
			match op(attempt).await {
				Ok(value) => return Ok(value),
				Err(err) if attempt < self.max_attempts => {
					let delay = self.backoff.delay(attempt);
					tracing::warn!(attempt, max_attempts = self.max_attempts, ?delay, "attempt failed: {err}");
					tokio::time::sleep(delay).await;
					attempt += 1;
				}
				Err(err) => {
					tracing::error!(attempt, "giving up: {err}");
					return Err(err);
				}
			}
		}
	}
}
