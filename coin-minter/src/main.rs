use std::sync::Arc;

use anyhow::Context;
use scuffle_coin_minter::global::Global;
use scuffle_coin_minter::signal::SignalHandler;
use scuffle_coin_minter::{cli, logging, worker};
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
	if let Err(err) = run().await {
		tracing::error!("{err:#}");
		eprintln!("error: {err:#}");
		std::process::exit(1);
	}

	std::process::exit(0);
}

async fn run() -> anyhow::Result<()> {
	let matches = cli::parse()?;
	let config = matches.config;

	logging::init(&config.logging.level, config.logging.mode).context("logging")?;

	config.validate().context("invalid configuration")?;

	tracing::info!("starting coin minter");

	let global = Arc::new(Global::new(config).await.context("global")?);

	if !global.healthy().await {
		tracing::warn!("job store is not reachable yet");
	}

	if matches.once {
		let outcome = global.processor().run_once().await?;
		tracing::info!(?outcome, "run finished");
		return Ok(());
	}

	let ctx = CancellationToken::new();

	let mut handle = tokio::spawn(worker::start(
		global.processor().clone(),
		global.config().worker.clone(),
		ctx.child_token(),
	));

	let mut signal = SignalHandler::new()
		.with_signal(SignalKind::interrupt())?
		.with_signal(SignalKind::terminate())?;

	tokio::select! {
		_ = signal.recv() => {
			tracing::info!("received signal, shutting down");
		}
		result = &mut handle => {
			match result.context("spawn task failed")? {
				Ok(()) => tracing::warn!("worker completed unexpectedly without error"),
				Err(err) => tracing::error!("error in worker: {err:#}"),
			}

			return Ok(());
		}
	}

	ctx.cancel();

	tokio::select! {
		_ = signal.recv() => {
			tracing::warn!("received signal again, forcing exit");
		},
		r = tokio::time::timeout(std::time::Duration::from_secs(60), &mut handle) => {
			if r.is_err() {
				tracing::warn!("shutdown timed out, forcing exit");
			} else {
				tracing::info!("coin minter stopped");
			}
		}
	}

	Ok(())
}
