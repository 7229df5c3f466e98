//! Image loading and embedding for composed documents.
//!
//! PNG and GIF payloads are decoded and stored as Flate-compressed pixels,
//! with any alpha channel split into a soft mask. Baseline JPEGs in gray or
//! RGB pass through untouched with the DCTDecode filter.

use std::io::Write;
use std::path::PathBuf;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{ColorType, DynamicImage, GenericImageView};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffer::decode_base64_payload;
use crate::error::{Error, Result};

/// Where image bytes come from
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Bytes(Vec<u8>),
    /// `data:image/...;base64,...` or bare base64
    DataUrl(String),
    /// Fetched over HTTP(S)
    Url(String),
    File(PathBuf),
}

impl ImageSource {
    /// Classify a textual reference: data URL, http(s) URL or file path
    pub fn parse(reference: &str) -> Self {
        let trimmed = reference.trim();
        if trimmed.starts_with("data:") {
            ImageSource::DataUrl(trimmed.to_string())
        } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            ImageSource::Url(trimmed.to_string())
        } else {
            ImageSource::File(PathBuf::from(trimmed))
        }
    }

    /// Resolve the source to raw bytes
    pub async fn fetch(&self, client: &reqwest::Client) -> Result<Vec<u8>> {
        match self {
            ImageSource::Bytes(bytes) => Ok(bytes.clone()),
            ImageSource::DataUrl(url) => decode_base64_payload(url),
            ImageSource::Url(url) => {
                debug!("Fetching image from {}", url);
                let response = client.get(url).send().await?.error_for_status()?;
                Ok(response.bytes().await?.to_vec())
            }
            ImageSource::File(path) => Ok(tokio::fs::read(path).await?),
        }
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::Bytes(bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
}

impl ImageFormat {
    fn codec(self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Gif => image::ImageFormat::Gif,
        }
    }
}

/// Detect the format from signature bytes, assuming PNG when unsure
pub fn detect_format(bytes: &[u8]) -> ImageFormat {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        ImageFormat::Jpeg
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        ImageFormat::Gif
    } else {
        ImageFormat::Png
    }
}

/// Deflate effort for decoded pixel data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageCompression {
    None,
    #[default]
    Fast,
    Medium,
    Slow,
}

impl ImageCompression {
    fn level(self) -> Option<u32> {
        match self {
            ImageCompression::None => None,
            ImageCompression::Fast => Some(1),
            ImageCompression::Medium => Some(6),
            ImageCompression::Slow => Some(9),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageOptions {
    /// Skip signature detection
    pub format: Option<ImageFormat>,
    pub compression: ImageCompression,
}

/// A decoded image ready to become an Image XObject
#[derive(Debug)]
pub struct EmbeddedImage {
    pub width: u32,
    pub height: u32,
    color_space: &'static str,
    filter: Option<&'static str>,
    data: Vec<u8>,
    soft_mask: Option<Vec<u8>>,
}

impl EmbeddedImage {
    pub fn decode(
        bytes: &[u8],
        format: ImageFormat,
        compression: ImageCompression,
    ) -> Result<Self> {
        let img = image::load_from_memory_with_format(bytes, format.codec())
            .map_err(|e| Error::ImageEmbed(format!("{:?} decode failed: {}", format, e)))?;
        let (width, height) = img.dimensions();

        if format == ImageFormat::Jpeg {
            let color_space = match img.color() {
                ColorType::L8 => Some("DeviceGray"),
                ColorType::Rgb8 => Some("DeviceRGB"),
                _ => None,
            };
            if let Some(color_space) = color_space {
                return Ok(Self {
                    width,
                    height,
                    color_space,
                    filter: Some("DCTDecode"),
                    data: bytes.to_vec(),
                    soft_mask: None,
                });
            }
        }

        let (color_space, pixels, alpha) = split_channels(&img);
        let level = compression.level();
        Ok(Self {
            width,
            height,
            color_space,
            filter: level.map(|_| "FlateDecode"),
            data: pack(&pixels, level)?,
            soft_mask: alpha.map(|a| pack(&a, level)).transpose()?,
        })
    }

    /// Add the image (and its soft mask) to `doc`
    pub fn embed(self, doc: &mut Document) -> ObjectId {
        let EmbeddedImage {
            width,
            height,
            color_space,
            filter,
            data,
            soft_mask,
        } = self;
        let mask_filter = filter.filter(|f| *f == "FlateDecode");
        let smask_id = soft_mask.map(|mask| {
            let dict = image_dict(width, height, "DeviceGray", mask_filter, None);
            doc.add_object(Stream::new(dict, mask))
        });
        let dict = image_dict(width, height, color_space, filter, smask_id);
        doc.add_object(Stream::new(dict, data))
    }
}

fn image_dict(
    width: u32,
    height: u32,
    color_space: &str,
    filter: Option<&str>,
    smask: Option<ObjectId>,
) -> Dictionary {
    let mut dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Image".to_vec())),
        ("Width", Object::Integer(i64::from(width))),
        ("Height", Object::Integer(i64::from(height))),
        ("ColorSpace", Object::Name(color_space.as_bytes().to_vec())),
        ("BitsPerComponent", Object::Integer(8)),
    ]);
    if let Some(filter) = filter {
        dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));
    }
    if let Some(id) = smask {
        dict.set("SMask", Object::Reference(id));
    }
    dict
}

/// Color samples and an optional alpha plane
fn split_channels(img: &DynamicImage) -> (&'static str, Vec<u8>, Option<Vec<u8>>) {
    let opaque = |alpha: &[u8]| alpha.iter().all(|&a| a == u8::MAX);
    match img.color() {
        ColorType::L8 | ColorType::L16 => ("DeviceGray", img.to_luma8().into_raw(), None),
        ColorType::La8 | ColorType::La16 => {
            let la = img.to_luma_alpha8();
            let gray = la.pixels().map(|p| p.0[0]).collect();
            let alpha: Vec<u8> = la.pixels().map(|p| p.0[1]).collect();
            ("DeviceGray", gray, (!opaque(&alpha)).then_some(alpha))
        }
        color if color.has_alpha() => {
            let rgba = img.to_rgba8();
            let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
            let mut alpha = Vec::with_capacity(rgba.len() / 4);
            for pixel in rgba.pixels() {
                rgb.extend_from_slice(&pixel.0[..3]);
                alpha.push(pixel.0[3]);
            }
            ("DeviceRGB", rgb, (!opaque(&alpha)).then_some(alpha))
        }
        _ => ("DeviceRGB", img.to_rgb8().into_raw(), None),
    }
}

fn pack(data: &[u8], level: Option<u32>) -> Result<Vec<u8>> {
    let Some(level) = level else {
        return Ok(data.to_vec());
    };
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use std::io::Cursor;

    /// A small PNG, optionally with a translucent pixel
    pub(crate) fn png_bytes(translucent: bool) -> Vec<u8> {
        let img = ImageBuffer::from_fn(4, 3, |x, y| {
            let alpha = if translucent && x == 0 && y == 0 { 128 } else { 255 };
            Rgba([x as u8 * 60, y as u8 * 80, 200, alpha])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(&png_bytes(false)), ImageFormat::Png);
        assert_eq!(detect_format(&[0xFF, 0xD8, 0xFF, 0xE0]), ImageFormat::Jpeg);
        assert_eq!(detect_format(b"GIF89a...."), ImageFormat::Gif);
        assert_eq!(detect_format(b"????"), ImageFormat::Png);
    }

    #[test]
    fn test_source_parsing() {
        assert!(matches!(ImageSource::parse("data:image/png;base64,AAA"), ImageSource::DataUrl(_)));
        assert!(matches!(ImageSource::parse("https://example.org/a.png"), ImageSource::Url(_)));
        assert!(matches!(ImageSource::parse("assets/logo.png"), ImageSource::File(_)));
    }

    #[test]
    fn test_opaque_png_has_no_soft_mask() {
        let image =
            EmbeddedImage::decode(&png_bytes(false), ImageFormat::Png, ImageCompression::Fast)
                .unwrap();
        assert_eq!((image.width, image.height), (4, 3));
        assert!(image.soft_mask.is_none());
        assert_eq!(image.color_space, "DeviceRGB");
    }

    #[test]
    fn test_translucent_png_gets_soft_mask() {
        let image =
            EmbeddedImage::decode(&png_bytes(true), ImageFormat::Png, ImageCompression::None)
                .unwrap();
        assert_eq!(image.soft_mask.as_ref().map(Vec::len), Some(12));
        assert_eq!(image.data.len(), 4 * 3 * 3);

        let mut doc = Document::with_version("1.5");
        let id = image.embed(&mut doc);
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert!(stream.dict.has(b"SMask"));
        assert!(!stream.dict.has(b"Filter"));
    }

    #[test]
    fn test_garbage_is_an_embed_error() {
        let result = EmbeddedImage::decode(b"nope", ImageFormat::Png, ImageCompression::Fast);
        assert!(matches!(result, Err(Error::ImageEmbed(_))));
    }
}
