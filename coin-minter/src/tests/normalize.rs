use std::io::{Cursor, Write};

use bytes::Bytes;
use file_format::FileFormat;

use crate::uploader::normalize::{normalize, ImageKind, NormalizeError};
use crate::uploader::read_source;

pub fn encode(format: image::ImageFormat) -> Vec<u8> {
	let image = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(4, 3, image::Rgba([200, 30, 60, 255])));

	let mut out = Cursor::new(Vec::new());
	image.write_to(&mut out, format).expect("encode");
	out.into_inner()
}

#[tokio::test]
async fn png_passes_through_untouched() {
	let png = Bytes::from(encode(image::ImageFormat::Png));

	let normalized = normalize(png.clone()).await.expect("normalize");
	assert_eq!(normalized.kind, ImageKind::Png);
	assert_eq!(normalized.data, png);
}

#[tokio::test]
async fn jpeg_passes_through_untouched() {
	let image = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(4, 3, image::Rgb([10, 20, 30])));
	let mut out = Cursor::new(Vec::new());
	image.write_to(&mut out, image::ImageFormat::Jpeg).expect("encode");
	let jpeg = Bytes::from(out.into_inner());

	let normalized = normalize(jpeg.clone()).await.expect("normalize");
	assert_eq!(normalized.kind, ImageKind::Jpeg);
	assert_eq!(normalized.data, jpeg);
	assert_eq!(normalized.kind.mime_type(), "image/jpeg");
}

#[tokio::test]
async fn webp_is_converted_to_png() {
	let webp = Bytes::from(encode(image::ImageFormat::WebP));
	assert_eq!(FileFormat::from_bytes(&webp), FileFormat::Webp);

	let normalized = normalize(webp).await.expect("normalize");
	assert_eq!(normalized.kind, ImageKind::Png);
	assert_eq!(FileFormat::from_bytes(&normalized.data), FileFormat::PortableNetworkGraphics);

	let decoded = image::load_from_memory(&normalized.data).expect("decode");
	assert_eq!((decoded.width(), decoded.height()), (4, 3));
}

#[tokio::test]
async fn other_formats_are_rejected() {
	let err = normalize(Bytes::from_static(b"definitely not an image"))
		.await
		.expect_err("should reject");
	assert!(matches!(err, NormalizeError::UnsupportedFormat(_)));
}

#[tokio::test]
async fn sources_can_be_local_files() {
	let png = encode(image::ImageFormat::Png);

	let mut file = tempfile::NamedTempFile::new().expect("tempfile");
	file.write_all(&png).expect("write");

	let client = reqwest::Client::new();

	let by_path = read_source(&client, &file.path().to_string_lossy())
		.await
		.expect("read path");
	assert_eq!(by_path.as_ref(), png.as_slice());

	let url = url::Url::from_file_path(file.path()).expect("file url");
	let by_url = read_source(&client, url.as_str()).await.expect("read file url");
	assert_eq!(by_url.as_ref(), png.as_slice());

	assert!(read_source(&client, "  ").await.is_err());
}
