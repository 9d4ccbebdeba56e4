use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use super::{CoinDeployer, CoinParams, DeployedCoin, DeployerError};
use crate::config::HttpDeployerConfig;

/// Deploys coins through an HTTP endpoint hosting the coin SDK, which owns the
/// signing key and waits for the receipt before answering.
#[derive(Debug)]
pub struct HttpCoinDeployer {
	url: Url,
	gas_multiplier: u32,
	client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum HttpCoinDeployerError {
	#[error("reqwest: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("invalid header name")]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error("invalid header value")]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
}

#[derive(Debug, serde::Serialize)]
struct DeployRequest<'a> {
	#[serde(flatten)]
	params: &'a CoinParams,
	gas_multiplier: u32,
}

#[derive(Debug, serde::Deserialize)]
struct DeployFailure {
	error: String,
}

impl HttpCoinDeployer {
	#[tracing::instrument(skip(config), name = "HttpCoinDeployer::new", fields(url = %config.url), err)]
	pub async fn new(config: &HttpDeployerConfig) -> Result<Self, DeployerError> {
		tracing::debug!("setting up http coin deployer");

		Ok(Self {
			url: config.url.clone(),
			gas_multiplier: config.gas_multiplier,
			client: {
				let mut builder = reqwest::Client::builder();

				if let Some(timeout) = config.timeout {
					builder = builder.timeout(timeout);
				}

				let mut headers = HeaderMap::new();

				for (key, value) in &config.headers {
					headers.insert(
						key.parse::<HeaderName>().map_err(HttpCoinDeployerError::from)?,
						value.parse::<HeaderValue>().map_err(HttpCoinDeployerError::from)?,
					);
				}

				builder = builder.default_headers(headers);

				builder.build().map_err(HttpCoinDeployerError::Reqwest)?
			},
		})
	}
}

#[async_trait::async_trait]
impl CoinDeployer for HttpCoinDeployer {
	fn name(&self) -> &str {
		"http"
	}

	#[tracing::instrument(skip(self, params), name = "HttpCoinDeployer::deploy", fields(name = %params.name, symbol = %params.symbol), err)]
	async fn deploy(&self, params: &CoinParams) -> Result<DeployedCoin, DeployerError> {
		let response = self
			.client
			.post(self.url.clone())
			.json(&DeployRequest {
				params,
				gas_multiplier: self.gas_multiplier,
			})
			.send()
			.await
			.map_err(HttpCoinDeployerError::Reqwest)?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.map_err(HttpCoinDeployerError::Reqwest)?;

			return Err(DeployerError::Rejected(match serde_json::from_str::<DeployFailure>(&body) {
				Ok(failure) => failure.error,
				Err(_) => format!("deployer responded with {status}: {body}"),
			}));
		}

		Ok(response.json().await.map_err(HttpCoinDeployerError::Reqwest)?)
	}
}
