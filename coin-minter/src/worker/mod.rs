use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;

pub mod fallback;
pub mod process;
pub mod retry;
pub mod schedule;

pub use self::process::{JobError, Processor, RunOutcome};

async fn run(processor: &Processor) {
	match processor.run_once().await {
		Ok(RunOutcome::Idle) => {}
		Ok(RunOutcome::Minted(result)) => {
			tracing::info!(job_id = %result.job_id, coin_address = %result.coin_address, "minted coin");
		}
		Err(err) => tracing::error!("run failed: {err}"),
	}
}

/// Runs the processor once at startup (when enabled) and then once a day at
/// the configured UTC time until `ctx` is cancelled. Runs are awaited in turn
/// and cancellation is only observed between them.
pub async fn start(processor: Arc<Processor>, config: WorkerConfig, ctx: CancellationToken) -> anyhow::Result<()> {
	if config.run_on_start && !ctx.is_cancelled() {
		run(&processor).await;
	}

	loop {
		let now = Utc::now();
		let next = schedule::next_run_after(now, config.daily_at);
		let wait = (next - now).to_std().unwrap_or_default();

		tracing::info!(%next, "next run scheduled");

		tokio::select! {
			_ = ctx.cancelled() => break,
			_ = tokio::time::sleep(wait) => {}
		}

		run(&processor).await;
	}

	tracing::info!("worker stopped");

	Ok(())
}
