//! Image I/O operations service
//!
//! Keeps file system and stream handling out of the processor. Decoding and
//! encoding go through an [`ImageCodec`].

use crate::{
    config::OutputFormat,
    error::{BgRemovalError, Result},
    services::ImageCodec,
    types::PixelBuffer,
};
use std::path::Path;

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Read a whole file into memory
    ///
    /// # Errors
    /// Missing or unreadable file; the error names the path.
    pub fn read_bytes<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(BgRemovalError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        std::fs::read(path_ref)
            .map_err(|e| BgRemovalError::file_io_error("read image file", path_ref, &e))
    }

    /// Write bytes to a file, creating parent directories as needed
    ///
    /// # Errors
    /// Directory creation or write failures.
    pub fn write_bytes<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    BgRemovalError::file_io_error("create output directory", parent, &e)
                })?;
            }
        }

        std::fs::write(path_ref, bytes)
            .map_err(|e| BgRemovalError::file_io_error("write output file", path_ref, &e))
    }

    /// Load and decode an image file into an RGBA8 buffer
    ///
    /// # Examples
    /// ```rust,no_run
    /// use pixel_bgremove::services::{ImageCrateCodec, ImageIOService};
    ///
    /// let buffer = ImageIOService::load_buffer("input.jpg", &ImageCrateCodec)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// # Errors
    /// Read or decode failures.
    pub fn load_buffer<P: AsRef<Path>>(path: P, codec: &dyn ImageCodec) -> Result<PixelBuffer> {
        let path_ref = path.as_ref();
        let bytes = Self::read_bytes(path_ref)?;

        codec.decode(&bytes).map_err(|e| {
            BgRemovalError::processing_stage_error(
                "image loading",
                &e.to_string(),
                Some(&format!("path: {}, size: {} bytes", path_ref.display(), bytes.len())),
            )
        })
    }

    /// Encode a buffer and save it to `path`
    ///
    /// # Errors
    /// Encode or write failures.
    pub fn save_buffer<P: AsRef<Path>>(
        buffer: &PixelBuffer,
        path: P,
        format: OutputFormat,
        codec: &dyn ImageCodec,
    ) -> Result<()> {
        let bytes = codec.encode(buffer, format)?;
        Self::write_bytes(path.as_ref(), &bytes)?;

        log::debug!(
            "Saved {}x{} {} image to {}",
            buffer.width(),
            buffer.height(),
            format,
            path.as_ref().display()
        );
        Ok(())
    }

    /// Check if a file path has a supported input image extension
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_lowercase().as_str(),
                    "jpg" | "jpeg" | "png" | "webp" | "tiff" | "tif" | "bmp"
                )
            })
    }

    /// Read an async stream to the end and decode it
    ///
    /// # Examples
    /// ```rust,no_run
    /// use pixel_bgremove::services::{ImageCrateCodec, ImageIOService};
    /// use tokio::fs::File;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let file = File::open("image.png").await?;
    /// let buffer = ImageIOService::load_from_reader(file, &ImageCrateCodec).await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Stream read or decode failures.
    pub async fn load_from_reader<R: tokio::io::AsyncRead + Unpin>(
        mut reader: R,
        codec: &dyn ImageCodec,
    ) -> Result<PixelBuffer> {
        use tokio::io::AsyncReadExt;

        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await.map_err(|e| {
            BgRemovalError::processing(format!("Failed to read from stream: {}", e))
        })?;

        codec.decode(&bytes)
    }

    /// Encode a buffer and write it to an async writer, returning the byte count
    ///
    /// # Errors
    /// Encode or stream write failures.
    pub async fn save_to_writer<W: tokio::io::AsyncWrite + Unpin>(
        buffer: &PixelBuffer,
        mut writer: W,
        format: OutputFormat,
        codec: &dyn ImageCodec,
    ) -> Result<u64> {
        use tokio::io::AsyncWriteExt;

        let bytes = codec.encode(buffer, format)?;
        writer.write_all(&bytes).await.map_err(|e| {
            BgRemovalError::processing(format!("Failed to write to stream: {}", e))
        })?;
        writer.flush().await.map_err(|e| {
            BgRemovalError::processing(format!("Failed to flush stream: {}", e))
        })?;

        Ok(bytes.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ImageCrateCodec;
    use tempfile::tempdir;

    fn checker(width: u32, height: u32) -> PixelBuffer {
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                data.extend_from_slice(&[v, v, v, 200]);
            }
        }
        PixelBuffer::from_raw(width, height, data).unwrap()
    }

    #[test]
    fn test_is_supported_format() {
        assert!(ImageIOService::is_supported_format("test.jpg"));
        assert!(ImageIOService::is_supported_format("test.PNG"));
        assert!(ImageIOService::is_supported_format("dir/test.tif"));
        assert!(!ImageIOService::is_supported_format("test.txt"));
        assert!(!ImageIOService::is_supported_format("test"));
        assert!(!ImageIOService::is_supported_format(".png.bak"));
    }

    #[test]
    fn test_read_nonexistent_file() {
        let err = ImageIOService::read_bytes("/nonexistent/image.png").unwrap_err();
        assert!(matches!(err, BgRemovalError::Io(_)));
        assert!(err.to_string().contains("/nonexistent/image.png"));
    }

    #[test]
    fn test_save_buffer_creates_directory() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested/deeper/out.png");

        ImageIOService::save_buffer(&checker(8, 8), &path, OutputFormat::Png, &ImageCrateCodec)
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_save_and_load_roundtrip_png() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("checker.png");
        let buffer = checker(6, 5);

        ImageIOService::save_buffer(&buffer, &path, OutputFormat::Png, &ImageCrateCodec).unwrap();
        let loaded = ImageIOService::load_buffer(&path, &ImageCrateCodec).unwrap();
        assert_eq!(loaded, buffer);
    }

    #[test]
    fn test_save_raw_rgba8() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("out.raw");
        let buffer = checker(3, 3);

        ImageIOService::save_buffer(&buffer, &path, OutputFormat::Rgba8, &ImageCrateCodec)
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), buffer.as_bytes());
    }

    #[test]
    fn test_load_invalid_file_reports_path() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();

        let err = ImageIOService::load_buffer(&path, &ImageCrateCodec).unwrap_err();
        assert!(err.to_string().contains("broken.png"));
    }

    #[tokio::test]
    async fn test_reader_and_writer() {
        let buffer = checker(4, 4);
        let mut encoded = Vec::new();
        let written =
            ImageIOService::save_to_writer(&buffer, &mut encoded, OutputFormat::Png, &ImageCrateCodec)
                .await
                .unwrap();
        assert_eq!(written as usize, encoded.len());

        let loaded = ImageIOService::load_from_reader(encoded.as_slice(), &ImageCrateCodec)
            .await
            .unwrap();
        assert_eq!(loaded, buffer);
    }
}
