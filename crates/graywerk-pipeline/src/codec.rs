// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image codec seam — reading an input file into an RGBA buffer and writing
// the converted buffer back out.
//
// Workers only talk to the `ImageCodec` trait, so tests can swap in codecs
// that delay, fail, or never touch the disk.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, ImageReader, RgbImage, RgbaImage};
use tracing::debug;

use graywerk_core::error::{GraywerkError, Result};

/// Decode/encode collaborator used by every image worker.
///
/// Implementations are called from blocking worker threads and must be
/// shareable across them.
pub trait ImageCodec: Send + Sync + 'static {
    /// Read `path` into an RGBA buffer. Any failure is a `Decode` error.
    fn decode(&self, path: &Path) -> Result<RgbaImage>;

    /// Write `image` to `path`. Any failure is an `Encode` error.
    fn encode(&self, image: &RgbaImage, path: &Path) -> Result<()>;
}

/// Codec backed by the `image` crate, reading and writing real files.
///
/// The input format is sniffed from the file contents; the output format
/// follows the output path's extension.
#[derive(Debug, Clone)]
pub struct FileCodec {
    jpeg_quality: u8,
}

impl FileCodec {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }
}

impl Default for FileCodec {
    fn default() -> Self {
        Self::new(75)
    }
}

impl ImageCodec for FileCodec {
    fn decode(&self, path: &Path) -> Result<RgbaImage> {
        let decode_err = |reason: String| GraywerkError::Decode {
            path: path.to_path_buf(),
            reason,
        };
        let image = ImageReader::open(path)
            .map_err(|e| decode_err(e.to_string()))?
            .with_guessed_format()
            .map_err(|e| decode_err(e.to_string()))?
            .decode()
            .map_err(|e| decode_err(e.to_string()))?;
        debug!(width = image.width(), height = image.height(), "image decoded");
        Ok(image.into_rgba8())
    }

    fn encode(&self, image: &RgbaImage, path: &Path) -> Result<()> {
        let encode_err = |reason: String| GraywerkError::Encode {
            path: path.to_path_buf(),
            reason,
        };
        let format = ImageFormat::from_path(path).map_err(|e| encode_err(e.to_string()))?;

        let file = File::create(path).map_err(|e| encode_err(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        match format {
            // JPEG has no alpha channel.
            ImageFormat::Jpeg => {
                let rgb: RgbImage = image.convert();
                let encoder = JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality);
                rgb.write_with_encoder(encoder)
                    .map_err(|e| encode_err(e.to_string()))?;
            }
            other => image
                .write_to(&mut writer, other)
                .map_err(|e| encode_err(e.to_string()))?,
        }
        // Dropping a BufWriter swallows the final write error.
        writer
            .into_inner()
            .map_err(|e| encode_err(e.error().to_string()))?;
        debug!(path = %path.display(), ?format, "image encoded");
        Ok(())
    }
}
