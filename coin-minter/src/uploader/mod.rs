use std::sync::Arc;

use bytes::Bytes;
use url::Url;

use self::normalize::NormalizeError;
use self::pinata::PinataUploader;
use crate::config::UploaderConfig;

pub mod normalize;
pub mod pinata;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
	#[error("reqwest: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("invalid url: {0}")]
	InvalidUrl(#[from] url::ParseError),
	#[error("invalid header value")]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("io: {0}")]
	Io(#[from] std::io::Error),
	#[error("normalize: {0}")]
	Normalize(#[from] NormalizeError),
	#[error("json: {0}")]
	Json(#[from] serde_json::Error),
	#[error("invalid source: {0}")]
	InvalidSource(String),
}

#[async_trait::async_trait]
pub trait AssetUploader: Send + Sync {
	fn name(&self) -> &str;

	/// Fetches the image at `source`, normalizes its format and pins it.
	/// Returns the content identifier.
	async fn upload_image(&self, source: &str) -> Result<String, UploadError>;

	/// Pins a JSON document under `name` and returns its content identifier
	async fn upload_json(&self, name: &str, value: &serde_json::Value) -> Result<String, UploadError>;

	/// Public link to the content behind `cid`
	fn gateway_url(&self, cid: &str) -> String;
}

/// Reads an image source, which is either an `http(s)://` URL, a `file://`
/// URL or a plain local path.
#[tracing::instrument(skip(client), err)]
pub async fn read_source(client: &reqwest::Client, source: &str) -> Result<Bytes, UploadError> {
	let source = source.trim();
	if source.is_empty() {
		return Err(UploadError::InvalidSource(source.to_owned()));
	}

	if source.starts_with("http://") || source.starts_with("https://") {
		let url = Url::parse(source)?;
		return Ok(client.get(url).send().await?.error_for_status()?.bytes().await?);
	}

	let path = if source.starts_with("file://") {
		Url::parse(source)?
			.to_file_path()
			.map_err(|_| UploadError::InvalidSource(source.to_owned()))?
	} else {
		source.into()
	};

	Ok(Bytes::from(tokio::fs::read(path).await?))
}

#[derive(Debug)]
pub enum AnyAssetUploader {
	Pinata(PinataUploader),
}

#[async_trait::async_trait]
impl AssetUploader for AnyAssetUploader {
	fn name(&self) -> &str {
		match self {
			AnyAssetUploader::Pinata(uploader) => uploader.name(),
		}
	}

	async fn upload_image(&self, source: &str) -> Result<String, UploadError> {
		match self {
			AnyAssetUploader::Pinata(uploader) => uploader.upload_image(source).await,
		}
	}

	async fn upload_json(&self, name: &str, value: &serde_json::Value) -> Result<String, UploadError> {
		match self {
			AnyAssetUploader::Pinata(uploader) => uploader.upload_json(name, value).await,
		}
	}

	fn gateway_url(&self, cid: &str) -> String {
		match self {
			AnyAssetUploader::Pinata(uploader) => uploader.gateway_url(cid),
		}
	}
}

pub async fn build_uploader(config: &UploaderConfig) -> Result<Arc<AnyAssetUploader>, UploadError> {
	Ok(Arc::new(match config {
		UploaderConfig::Pinata(pinata) => AnyAssetUploader::Pinata(PinataUploader::new(pinata).await?),
	}))
}
