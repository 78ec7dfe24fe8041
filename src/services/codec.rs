//! Image codec boundary
//!
//! The segmentation engine only understands RGBA8 pixel buffers. Everything that
//! turns encoded bytes into pixels, or pixels back into a file format, sits behind
//! [`ImageCodec`] so the processor can be driven by other decoders.

use crate::{
    config::OutputFormat,
    error::{BgRemovalError, Result},
    services::OutputFormatHandler,
    types::PixelBuffer,
};
use image::{ExtendedColorType, ImageFormat};
use std::io::Cursor;

/// Decoder/encoder between encoded image bytes and RGBA8 pixel buffers
pub trait ImageCodec: Send + Sync {
    /// Decode encoded bytes into a non-premultiplied RGBA8 buffer
    ///
    /// # Errors
    /// Unknown or corrupt input.
    fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer>;

    /// Encode a buffer, keeping its alpha channel
    ///
    /// # Errors
    /// Encoder failures or formats this codec cannot write.
    fn encode(&self, buffer: &PixelBuffer, format: OutputFormat) -> Result<Vec<u8>>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Codec backed by the `image` crate
///
/// Decodes every format enabled on the `image` dependency; gray, RGB and 16-bit
/// sources are converted to RGBA8 with opaque alpha where the source had none.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateCodec;

impl ImageCrateCodec {
    /// Decode with an explicit format instead of content sniffing
    ///
    /// # Errors
    /// Input not decodable as `format`.
    pub fn decode_with_format(&self, bytes: &[u8], format: ImageFormat) -> Result<PixelBuffer> {
        let image = image::load_from_memory_with_format(bytes, format)?;
        Ok(PixelBuffer::from(image.to_rgba8()))
    }
}

impl ImageCodec for ImageCrateCodec {
    fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer> {
        if bytes.is_empty() {
            return Err(BgRemovalError::processing_stage_error(
                "decoding",
                "empty input",
                None,
            ));
        }

        let format = image::guess_format(bytes).map_err(|_| {
            BgRemovalError::unsupported_format(format!(
                "unrecognised image data ({} bytes)",
                bytes.len()
            ))
        })?;

        let image = image::load_from_memory_with_format(bytes, format).map_err(|e| {
            BgRemovalError::processing_stage_error(
                "decoding",
                &e.to_string(),
                Some(&format!("{} bytes", bytes.len())),
            )
        })?;

        Ok(PixelBuffer::from(image.to_rgba8()))
    }

    fn encode(&self, buffer: &PixelBuffer, format: OutputFormat) -> Result<Vec<u8>> {
        let Some(image_format) = OutputFormatHandler::image_format(format) else {
            return Ok(buffer.as_bytes().to_vec());
        };

        let mut out = Cursor::new(Vec::new());
        image::write_buffer_with_format(
            &mut out,
            buffer.as_bytes(),
            buffer.width(),
            buffer.height(),
            ExtendedColorType::Rgba8,
            image_format,
        )
        .map_err(|e| {
            BgRemovalError::processing_stage_error(
                "encoding",
                &format!("Failed to encode as {}: {}", format, e),
                Some(&format!("{}x{}", buffer.width(), buffer.height())),
            )
        })?;

        Ok(out.into_inner())
    }

    fn name(&self) -> &'static str {
        "image"
    }
}
