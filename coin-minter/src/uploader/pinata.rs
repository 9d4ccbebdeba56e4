use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart;
use url::Url;

use super::normalize::normalize;
use super::{read_source, AssetUploader, UploadError};
use crate::config::{base_url, PinataConfig};

#[derive(Debug)]
pub struct PinataUploader {
	api_url: Url,
	gateway: String,
	client: reqwest::Client,
	/// Fetches remote sources, kept apart so the JWT never leaves for them
	source_client: reqwest::Client,
}

#[derive(Debug, serde::Deserialize)]
struct PinResponse {
	#[serde(rename = "IpfsHash")]
	ipfs_hash: String,
}

impl PinataUploader {
	#[tracing::instrument(skip(config), name = "PinataUploader::new", fields(api_url = %config.api_url), err)]
	pub async fn new(config: &PinataConfig) -> Result<Self, UploadError> {
		tracing::debug!("setting up pinata uploader");

		let mut source_builder = reqwest::Client::builder();
		if let Some(timeout) = config.timeout {
			source_builder = source_builder.timeout(timeout);
		}

		Ok(Self {
			api_url: base_url(&config.api_url),
			gateway: config
				.gateway
				.trim_start_matches("https://")
				.trim_start_matches("http://")
				.trim_end_matches('/')
				.to_owned(),
			client: {
				let mut builder = reqwest::Client::builder();

				if let Some(timeout) = config.timeout {
					builder = builder.timeout(timeout);
				}

				let mut headers = HeaderMap::new();

				let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.jwt))?;
				bearer.set_sensitive(true);
				headers.insert(AUTHORIZATION, bearer);

				builder = builder.default_headers(headers);

				builder.build()?
			},
			source_client: source_builder.build()?,
		})
	}

	fn metadata(name: &str) -> Result<String, UploadError> {
		Ok(serde_json::to_string(&serde_json::json!({ "name": name }))?)
	}
}

#[async_trait::async_trait]
impl AssetUploader for PinataUploader {
	fn name(&self) -> &str {
		"pinata"
	}

	#[tracing::instrument(skip(self), name = "PinataUploader::upload_image", err)]
	async fn upload_image(&self, source: &str) -> Result<String, UploadError> {
		let data = read_source(&self.source_client, source).await?;
		let image = normalize(data).await?;

		let file_name = format!("image.{}", image.kind.extension());

		tracing::debug!(size = image.data.len(), kind = ?image.kind, "pinning image");

		let form = multipart::Form::new()
			.part(
				"file",
				multipart::Part::bytes(image.data.to_vec())
					.file_name(file_name.clone())
					.mime_str(image.kind.mime_type())?,
			)
			.text("pinataMetadata", Self::metadata(&file_name)?);

		let response: PinResponse = self
			.client
			.post(self.api_url.join("pinning/pinFileToIPFS")?)
			.multipart(form)
			.send()
			.await?
			.error_for_status()?
			.json()
			.await?;

		Ok(response.ipfs_hash)
	}

	#[tracing::instrument(skip(self, value), name = "PinataUploader::upload_json", err)]
	async fn upload_json(&self, name: &str, value: &serde_json::Value) -> Result<String, UploadError> {
		let response: PinResponse = self
			.client
			.post(self.api_url.join("pinning/pinJSONToIPFS")?)
			.json(&serde_json::json!({
				"pinataContent": value,
				"pinataMetadata": { "name": name },
			}))
			.send()
			.await?
			.error_for_status()?
			.json()
			.await?;

		Ok(response.ipfs_hash)
	}

	fn gateway_url(&self, cid: &str) -> String {
		format!("https://{}/ipfs/{cid}", self.gateway)
	}
}
