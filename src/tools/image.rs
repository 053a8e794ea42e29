use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::chat::ChainError;

/// Resolution hint sent along with an image
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detail {
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "high")]
    High,
}

/// Wire-ready image reference, the `image_url` object of a content part.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Detail>,
    /// Pixel size, known only for in-memory rasters. Used for token estimates.
    #[serde(skip)]
    pub dimensions: Option<(u32, u32)>,
}

/// Where the pixels of a described image come from
#[derive(Debug, Clone)]
pub enum ImageSource {
    Url(String),
    Raster(DynamicImage),
}

/// Structured image description: source, encoding format name and detail hint.
#[derive(Debug, Clone, Default)]
pub struct ImageDescriptor {
    pub url: Option<ImageSource>,
    /// Encoding format name such as `PNG` or `JPEG`, used for rasters only.
    pub format_type: Option<String>,
    pub detail: Option<Detail>,
}

impl ImageDescriptor {
    pub fn new(source: ImageSource) -> Self {
        Self {
            url: Some(source),
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format_type: impl Into<String>) -> Self {
        self.format_type = Some(format_type.into());
        self
    }

    pub fn with_detail(mut self, detail: Detail) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Any image accepted by [`crate::Chain::link_with`]
#[derive(Debug, Clone)]
pub enum ImageRef {
    Url(String),
    Raster {
        image: DynamicImage,
        format: ImageFormat,
    },
    Descriptor(ImageDescriptor),
}

impl ImageRef {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    /// An in-memory image, encoded as PNG
    pub fn raster(image: DynamicImage) -> Self {
        Self::Raster {
            image,
            format: ImageFormat::Png,
        }
    }

    pub fn raster_as(image: DynamicImage, format: ImageFormat) -> Self {
        Self::Raster { image, format }
    }

    /// Resolve the reference into its wire form, encoding rasters into data URIs.
    pub fn normalize(self) -> Result<ImageUrl, ChainError> {
        match self {
            Self::Url(url) => Ok(ImageUrl {
                url,
                detail: None,
                dimensions: None,
            }),
            Self::Raster { image, format } => encode_raster(&image, format, None),
            Self::Descriptor(descriptor) => {
                let Some(source) = descriptor.url else {
                    return Err(ChainError::Usage(
                        "image descriptor must have a url".to_string(),
                    ));
                };

                match source {
                    ImageSource::Url(url) => Ok(ImageUrl {
                        url,
                        detail: descriptor.detail,
                        dimensions: None,
                    }),
                    ImageSource::Raster(image) => {
                        let format = match descriptor.format_type.as_deref() {
                            Some(name) => parse_format(name)?,
                            None => ImageFormat::Png,
                        };
                        encode_raster(&image, format, descriptor.detail)
                    }
                }
            }
        }
    }
}

impl From<&str> for ImageRef {
    fn from(value: &str) -> Self {
        Self::Url(value.to_string())
    }
}

impl From<String> for ImageRef {
    fn from(value: String) -> Self {
        Self::Url(value)
    }
}

impl From<DynamicImage> for ImageRef {
    fn from(value: DynamicImage) -> Self {
        Self::raster(value)
    }
}

impl From<ImageDescriptor> for ImageRef {
    fn from(value: ImageDescriptor) -> Self {
        Self::Descriptor(value)
    }
}

fn parse_format(name: &str) -> Result<ImageFormat, ChainError> {
    ImageFormat::from_extension(name.to_ascii_lowercase())
        .ok_or_else(|| ChainError::Usage(format!("unsupported image format: {name}")))
}

fn encode_raster(
    image: &DynamicImage,
    format: ImageFormat,
    detail: Option<Detail>,
) -> Result<ImageUrl, ChainError> {
    let dimensions = (image.width(), image.height());
    debug!(?format, ?dimensions, "Encoding image");

    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .map_err(|e| ChainError::Usage(format!("cannot encode image as {format:?}: {e}")))?;

    trace!(size = bytes.len(), "Image encoded");

    Ok(ImageUrl {
        url: format!(
            "data:{};base64,{}",
            format.to_mime_type(),
            BASE64.encode(&bytes)
        ),
        detail,
        dimensions: Some(dimensions),
    })
}
