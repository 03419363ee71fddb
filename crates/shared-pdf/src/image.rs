//! Signature raster decoding and embedding as PDF image XObjects

use crate::error::ImageError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Object, Stream};
use std::io::Write;

const DATA_URL_PREFIX: &str = "data:";
const PNG_MIME: &str = "image/png";

/// Color model of the decoded pixels (alpha is carried separately)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageColor {
    Gray,
    Rgb,
}

impl ImageColor {
    fn components(self) -> usize {
        match self {
            ImageColor::Gray => 1,
            ImageColor::Rgb => 3,
        }
    }

    fn pdf_color_space(self) -> &'static str {
        match self {
            ImageColor::Gray => "DeviceGray",
            ImageColor::Rgb => "DeviceRGB",
        }
    }
}

/// A decoded 8-bit signature raster
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureImage {
    pub width: u32,
    pub height: u32,
    pub color: ImageColor,
    /// Row-major color samples, `color.components()` bytes per pixel
    pub pixels: Vec<u8>,
    /// One byte per pixel when the source had an alpha channel
    pub alpha: Option<Vec<u8>>,
}

/// Decode a captured signature: a bare base64 PNG or a `data:image/png;base64,` URL
pub fn decode_signature_payload(payload: &str) -> Result<SignatureImage, ImageError> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(ImageError::Empty);
    }

    let encoded = match payload.strip_prefix(DATA_URL_PREFIX) {
        Some(rest) => {
            let (header, data) = rest
                .split_once(',')
                .ok_or_else(|| ImageError::UnsupportedFormat("Data URL has no payload".into()))?;
            let mut parts = header.split(';');
            let mime = parts.next().unwrap_or_default();
            if !mime.eq_ignore_ascii_case(PNG_MIME) {
                return Err(ImageError::UnsupportedFormat(mime.to_string()));
            }
            if !parts.any(|p| p.eq_ignore_ascii_case("base64")) {
                return Err(ImageError::UnsupportedFormat(
                    "Data URL is not base64 encoded".to_string(),
                ));
            }
            data
        }
        None => payload,
    };

    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| ImageError::Base64(e.to_string()))?;
    decode_png(&bytes)
}

/// Decode PNG bytes into 8-bit samples with alpha split out
pub fn decode_png(bytes: &[u8]) -> Result<SignatureImage, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }

    let mut decoder = png::Decoder::new(bytes);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .map_err(|e| ImageError::Png(e.to_string()))?;

    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| ImageError::Png(e.to_string()))?;
    buf.truncate(info.buffer_size());

    if info.bit_depth != png::BitDepth::Eight {
        return Err(ImageError::Png(format!(
            "Unexpected bit depth after expansion: {:?}",
            info.bit_depth
        )));
    }

    let (color, has_alpha) = match info.color_type {
        png::ColorType::Grayscale => (ImageColor::Gray, false),
        png::ColorType::GrayscaleAlpha => (ImageColor::Gray, true),
        png::ColorType::Rgb => (ImageColor::Rgb, false),
        png::ColorType::Rgba => (ImageColor::Rgb, true),
        png::ColorType::Indexed => {
            return Err(ImageError::Png("Palette was not expanded".to_string()))
        }
    };

    let (pixels, alpha) = if has_alpha {
        let stride = color.components() + 1;
        let pixel_count = (info.width * info.height) as usize;
        let mut pixels = Vec::with_capacity(pixel_count * color.components());
        let mut alpha = Vec::with_capacity(pixel_count);
        for px in buf.chunks_exact(stride) {
            pixels.extend_from_slice(&px[..stride - 1]);
            alpha.push(px[stride - 1]);
        }
        (pixels, Some(alpha))
    } else {
        (buf, None)
    };

    Ok(SignatureImage {
        width: info.width,
        height: info.height,
        color,
        pixels,
        alpha,
    })
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, ImageError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| ImageError::Png(format!("Failed to compress image: {}", e)))
}

impl SignatureImage {
    /// Build the image XObject stream. `smask` references a previously
    /// added soft-mask object when the image carries alpha.
    pub fn to_xobject(&self, smask: Option<Object>) -> Result<Stream, ImageError> {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => self.width as i64,
            "Height" => self.height as i64,
            "ColorSpace" => self.color.pdf_color_space(),
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        };
        if let Some(mask) = smask {
            dict.set("SMask", mask);
        }
        Ok(Stream::new(dict, deflate(&self.pixels)?))
    }

    /// Build the soft mask stream for the alpha channel, if any
    pub fn to_smask(&self) -> Result<Option<Stream>, ImageError> {
        let Some(alpha) = &self.alpha else {
            return Ok(None);
        };
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => self.width as i64,
            "Height" => self.height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        };
        Ok(Some(Stream::new(dict, deflate(alpha)?)))
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    //! PNG fixtures for tests

    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

    /// Encode an RGBA PNG of the given size with one opaque black pixel in
    /// the top-left corner and everything else transparent.
    pub fn rgba_png(width: u32, height: u32) -> Vec<u8> {
        let mut data = vec![0u8; (width * height * 4) as usize];
        if !data.is_empty() {
            data[3] = 255;
        }
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, width, height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            if let Ok(mut writer) = encoder.write_header() {
                let _ = writer.write_image_data(&data);
            }
        }
        out
    }

    /// The same PNG as a data URL, the way a capture surface delivers it
    pub fn rgba_png_data_url(width: u32, height: u32) -> String {
        format!("data:image/png;base64,{}", BASE64.encode(rgba_png(width, height)))
    }
}
