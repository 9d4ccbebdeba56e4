use std::io;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use rustls::RootCertStore;
use tokio_postgres::config::SslMode;
use tokio_postgres::{NoTls, Row};

use super::{Completion, Job, JobStatus, JobStore, JobStoreError};
use crate::config::{validate_table, PostgresStoreConfig, TlsConfig};

const COLUMNS: &str = "id, title, prompt, description, content_hash, status, created_at, completed_at, transaction_ref, coin_address, error_message";

/// Job store talking to Postgres directly.
pub struct PostgresJobStore {
	table: String,
	pool: Pool,
}

impl std::fmt::Debug for PostgresJobStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PostgresJobStore").field("table", &self.table).finish()
	}
}

#[derive(Debug, thiserror::Error)]
pub enum PostgresJobStoreError {
	#[error("invalid uri: {0}")]
	InvalidUri(tokio_postgres::Error),
	#[error("invalid table name: {0}")]
	InvalidTable(String),
	#[error("tls: {0}")]
	Tls(String),
	#[error("io: {0}")]
	Io(#[from] io::Error),
	#[error("pool build: {0}")]
	Build(#[from] deadpool_postgres::BuildError),
	#[error("pool: {0}")]
	Pool(#[from] deadpool_postgres::PoolError),
	#[error("query: {0}")]
	Query(#[from] tokio_postgres::Error),
}

impl PostgresJobStore {
	#[tracing::instrument(skip(config), name = "PostgresJobStore::new", fields(table = %config.table), err)]
	pub async fn new(config: &PostgresStoreConfig) -> Result<Self, PostgresJobStoreError> {
		tracing::debug!("setting up postgres job store");

		validate_table(&config.table).map_err(|_| PostgresJobStoreError::InvalidTable(config.table.clone()))?;

		let mut pg_config = config
			.uri
			.parse::<tokio_postgres::Config>()
			.map_err(PostgresJobStoreError::InvalidUri)?;

		pg_config.ssl_mode(if config.tls.is_some() {
			SslMode::Require
		} else {
			SslMode::Disable
		});

		let manager_config = ManagerConfig {
			recycling_method: RecyclingMethod::Fast,
		};

		let manager = if let Some(tls) = &config.tls {
			Manager::from_config(
				pg_config,
				tokio_postgres_rustls::MakeRustlsConnect::new(tls_config(tls).await?),
				manager_config,
			)
		} else {
			Manager::from_config(pg_config, NoTls, manager_config)
		};

		let pool = Pool::builder(manager)
			.config(PoolConfig::new(config.max_connections.max(1)))
			.runtime(Runtime::Tokio1)
			.build()?;

		let store = Self {
			table: config.table.clone(),
			pool,
		};

		store.setup_table().await?;

		Ok(store)
	}

	async fn setup_table(&self) -> Result<(), PostgresJobStoreError> {
		let client = self.pool.get().await?;

		client
			.batch_execute(&format!(
				"CREATE TABLE IF NOT EXISTS {table} (
					id TEXT PRIMARY KEY,
					title TEXT NOT NULL DEFAULT '',
					prompt TEXT,
					description TEXT,
					content_hash TEXT,
					status TEXT NOT NULL DEFAULT 'pending',
					created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
					completed_at TIMESTAMPTZ,
					transaction_ref TEXT,
					coin_address TEXT,
					error_message TEXT
				);
				CREATE INDEX IF NOT EXISTS {table}_status_created_at_idx ON {table} (status, created_at);",
				table = self.table,
			))
			.await?;

		Ok(())
	}

	async fn execute(
		&self,
		query: &str,
		params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
	) -> Result<u64, PostgresJobStoreError> {
		let client = self.pool.get().await?;
		Ok(client.execute(query, params).await?)
	}

	async fn query_opt(
		&self,
		query: &str,
		params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
	) -> Result<Option<Job>, JobStoreError> {
		let client = self.pool.get().await.map_err(PostgresJobStoreError::from)?;
		let row = client.query_opt(query, params).await.map_err(PostgresJobStoreError::from)?;

		row.as_ref().map(job_from_row).transpose()
	}
}

fn job_from_row(row: &Row) -> Result<Job, JobStoreError> {
	let get = |err: tokio_postgres::Error| JobStoreError::from(PostgresJobStoreError::Query(err));

	Ok(Job {
		id: row.try_get("id").map_err(get)?,
		title: row.try_get("title").map_err(get)?,
		prompt: row.try_get("prompt").map_err(get)?,
		description: row.try_get("description").map_err(get)?,
		content_hash: row.try_get("content_hash").map_err(get)?,
		status: row.try_get::<_, String>("status").map_err(get)?.parse()?,
		created_at: row.try_get::<_, Option<DateTime<Utc>>>("created_at").map_err(get)?,
		completed_at: row.try_get("completed_at").map_err(get)?,
		transaction_ref: row.try_get("transaction_ref").map_err(get)?,
		coin_address: row.try_get("coin_address").map_err(get)?,
		error_message: row.try_get("error_message").map_err(get)?,
	})
}

async fn tls_config(tls: &TlsConfig) -> Result<rustls::ClientConfig, PostgresJobStoreError> {
	let ca_cert = tokio::fs::read(&tls.ca_cert).await?;

	let mut cert_store = RootCertStore::empty();
	for cert in rustls_pemfile::certs(&mut io::BufReader::new(io::Cursor::new(ca_cert))) {
		cert_store
			.add(cert?)
			.map_err(|err| PostgresJobStoreError::Tls(format!("failed to add ca cert: {err}")))?;
	}

	let builder = rustls::ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
		.with_safe_default_protocol_versions()
		.map_err(|err| PostgresJobStoreError::Tls(err.to_string()))?
		.with_root_certificates(cert_store);

	match (&tls.cert, &tls.key) {
		(Some(cert), Some(key)) => {
			let cert = tokio::fs::read(cert).await?;
			let key = tokio::fs::read(key).await?;

			let certs = rustls_pemfile::certs(&mut io::BufReader::new(io::Cursor::new(cert))).collect::<Result<Vec<_>, _>>()?;

			let key = rustls_pemfile::pkcs8_private_keys(&mut io::BufReader::new(io::Cursor::new(key)))
				.next()
				.ok_or_else(|| PostgresJobStoreError::Tls("no private key found".into()))??
				.into();

			builder
				.with_client_auth_cert(certs, key)
				.map_err(|err| PostgresJobStoreError::Tls(err.to_string()))
		}
		(None, None) => Ok(builder.with_no_client_auth()),
		_ => Err(PostgresJobStoreError::Tls("cert and key must be set together".into())),
	}
}

#[async_trait::async_trait]
impl JobStore for PostgresJobStore {
	fn name(&self) -> &str {
		"postgres"
	}

	#[tracing::instrument(skip(self), name = "PostgresJobStore::fetch_next_pending", err)]
	async fn fetch_next_pending(&self) -> Result<Option<Job>, JobStoreError> {
		self.query_opt(
			&format!(
				"SELECT {COLUMNS} FROM {} WHERE status = $1 ORDER BY created_at ASC LIMIT 1",
				self.table
			),
			&[&JobStatus::Pending.as_str()],
		)
		.await
	}

	#[tracing::instrument(skip(self, job), name = "PostgresJobStore::insert", fields(job_id = %job.id), err)]
	async fn insert(&self, job: &Job) -> Result<(), JobStoreError> {
		self.execute(
			&format!(
				"INSERT INTO {} (id, title, prompt, description, content_hash, status, created_at) VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, now()))",
				self.table
			),
			&[
				&job.id,
				&job.title,
				&job.prompt,
				&job.description,
				&job.content_hash,
				&job.status.as_str(),
				&job.created_at,
			],
		)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self), name = "PostgresJobStore::get", err)]
	async fn get(&self, id: &str) -> Result<Option<Job>, JobStoreError> {
		self.query_opt(&format!("SELECT {COLUMNS} FROM {} WHERE id = $1", self.table), &[&id])
			.await
	}

	#[tracing::instrument(skip(self), name = "PostgresJobStore::claim", err)]
	async fn claim(&self, id: &str, content_hash: Option<&str>) -> Result<bool, JobStoreError> {
		let updated = self
			.execute(
				&format!(
					"UPDATE {} SET status = $1, content_hash = COALESCE($2, content_hash) WHERE id = $3 AND status = $4",
					self.table
				),
				&[
					&JobStatus::Processing.as_str(),
					&content_hash,
					&id,
					&JobStatus::Pending.as_str(),
				],
			)
			.await?;

		Ok(updated == 1)
	}

	#[tracing::instrument(skip(self, completion), name = "PostgresJobStore::complete", err)]
	async fn complete(&self, id: &str, completion: &Completion) -> Result<bool, JobStoreError> {
		let updated = self
			.execute(
				&format!(
					"UPDATE {} SET status = $1, transaction_ref = $2, coin_address = $3, completed_at = $4 WHERE id = $5 AND status = $6",
					self.table
				),
				&[
					&JobStatus::Completed.as_str(),
					&completion.transaction_ref,
					&completion.coin_address,
					&completion.completed_at,
					&id,
					&JobStatus::Processing.as_str(),
				],
			)
			.await?;

		Ok(updated == 1)
	}

	#[tracing::instrument(skip(self), name = "PostgresJobStore::fail", err)]
	async fn fail(&self, id: &str, error_message: &str) -> Result<bool, JobStoreError> {
		let updated = self
			.execute(
				&format!(
					"UPDATE {} SET status = $1, error_message = $2 WHERE id = $3 AND status = $4",
					self.table
				),
				&[
					&JobStatus::Failed.as_str(),
					&error_message,
					&id,
					&JobStatus::Processing.as_str(),
				],
			)
			.await?;

		Ok(updated == 1)
	}

	async fn healthy(&self) -> bool {
		match self.pool.get().await {
			Ok(client) => client.simple_query("SELECT 1").await.is_ok(),
			Err(err) => {
				tracing::error!("postgres health check failed: {err}");
				false
			}
		}
	}
}
