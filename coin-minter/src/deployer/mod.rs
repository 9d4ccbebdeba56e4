use std::sync::Arc;

use self::http::{HttpCoinDeployer, HttpCoinDeployerError};
use crate::config::DeployerConfig;

pub mod http;

/// A 20 byte account address in its `0x` prefixed hex form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

#[derive(Debug, thiserror::Error)]
#[error("expected 0x followed by 40 hex characters")]
pub struct InvalidAddress;

impl std::str::FromStr for Address {
	type Err = InvalidAddress;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).ok_or(InvalidAddress)?;

		if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
			return Err(InvalidAddress);
		}

		Ok(Self(format!("0x{hex}")))
	}
}

impl TryFrom<String> for Address {
	type Error = InvalidAddress;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<Address> for String {
	fn from(value: Address) -> Self {
		value.0
	}
}

impl std::fmt::Display for Address {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
	#[default]
	Eth,
	Zora,
}

/// Everything the deployer needs to create one coin.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CoinParams {
	pub name: String,
	pub symbol: String,
	/// Metadata URI, `ipfs://<cid>`
	pub uri: String,
	pub payout_recipient: Address,
	pub chain_id: u64,
	pub currency: Currency,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct DeployedCoin {
	pub transaction_hash: String,
	pub contract_address: String,
	#[serde(default)]
	pub deployment: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum DeployerError {
	#[error("http: {0}")]
	Http(#[from] HttpCoinDeployerError),
	#[error("{0}")]
	Rejected(String),
}

#[async_trait::async_trait]
pub trait CoinDeployer: Send + Sync {
	fn name(&self) -> &str;

	/// Deploys the coin and waits for the transaction to land
	async fn deploy(&self, params: &CoinParams) -> Result<DeployedCoin, DeployerError>;
}

#[derive(Debug)]
pub enum AnyCoinDeployer {
	Http(HttpCoinDeployer),
}

#[async_trait::async_trait]
impl CoinDeployer for AnyCoinDeployer {
	fn name(&self) -> &str {
		match self {
			AnyCoinDeployer::Http(deployer) => deployer.name(),
		}
	}

	async fn deploy(&self, params: &CoinParams) -> Result<DeployedCoin, DeployerError> {
		match self {
			AnyCoinDeployer::Http(deployer) => deployer.deploy(params).await,
		}
	}
}

pub async fn build_coin_deployer(config: &DeployerConfig) -> Result<Arc<AnyCoinDeployer>, DeployerError> {
	Ok(Arc::new(match config {
		DeployerConfig::Http(http) => AnyCoinDeployer::Http(HttpCoinDeployer::new(http).await?),
	}))
}
