use std::io::Cursor;

use bytes::Bytes;
use file_format::FileFormat;

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
	#[error("unsupported image format: {0}")]
	UnsupportedFormat(FileFormat),
	#[error("image: {0}")]
	Image(#[from] image::ImageError),
	#[error("join error: {0}")]
	Join(#[from] tokio::task::JoinError),
}

/// Formats every gateway and wallet renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
	Png,
	Jpeg,
	Gif,
}

impl ImageKind {
	pub const fn extension(&self) -> &'static str {
		match self {
			ImageKind::Png => "png",
			ImageKind::Jpeg => "jpg",
			ImageKind::Gif => "gif",
		}
	}

	pub const fn mime_type(&self) -> &'static str {
		match self {
			ImageKind::Png => "image/png",
			ImageKind::Jpeg => "image/jpeg",
			ImageKind::Gif => "image/gif",
		}
	}
}

#[derive(Debug, Clone)]
pub struct NormalizedImage {
	pub kind: ImageKind,
	pub data: Bytes,
}

enum Action {
	Keep(ImageKind),
	ToPng,
}

const fn action(format: FileFormat) -> Result<Action, NormalizeError> {
	match format {
		FileFormat::PortableNetworkGraphics // .png
		| FileFormat::AnimatedPortableNetworkGraphics => Ok(Action::Keep(ImageKind::Png)), // .apng
		FileFormat::JointPhotographicExpertsGroup => Ok(Action::Keep(ImageKind::Jpeg)), // .jpg
		FileFormat::GraphicsInterchangeFormat => Ok(Action::Keep(ImageKind::Gif)), // .gif
		FileFormat::Webp => Ok(Action::ToPng), // .webp
		_ => Err(NormalizeError::UnsupportedFormat(format)),
	}
}

/// Detects the format from the magic bytes and re-encodes anything that is not
/// widely renderable to PNG.
#[tracing::instrument(skip(data), fields(size = data.len()), err)]
pub async fn normalize(data: Bytes) -> Result<NormalizedImage, NormalizeError> {
	let format = FileFormat::from_bytes(&data);

	match action(format)? {
		Action::Keep(kind) => Ok(NormalizedImage { kind, data }),
		Action::ToPng => {
			tracing::debug!(%format, "re-encoding image to png");

			let span = tracing::Span::current();
			let data = tokio::task::spawn_blocking(move || {
				let _guard = span.enter();
				to_png(&data)
			})
			.await??;

			Ok(NormalizedImage {
				kind: ImageKind::Png,
				data,
			})
		}
	}
}

fn to_png(data: &[u8]) -> Result<Bytes, NormalizeError> {
	let image = image::load_from_memory(data)?;

	let mut out = Cursor::new(Vec::new());
	image.write_to(&mut out, image::ImageFormat::Png)?;

	Ok(Bytes::from(out.into_inner()))
}
