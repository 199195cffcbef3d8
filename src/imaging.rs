//! Reference image preparation: grid stitching and data-URL encoding.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{imageops, DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

use crate::error::{JobError, JobResult};

/// Most reference images accepted per request.
pub const MAX_REFERENCE_IMAGES: usize = 4;

/// Side length of one grid cell in pixels.
pub const GRID_CELL: u32 = 512;

const GRID_COLUMNS: u32 = 2;

/// A reference image ready to be forwarded verbatim to the vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    data_url: String,
}

impl EncodedImage {
    /// Wrap JPEG bytes as a `data:` URL.
    pub fn from_jpeg(bytes: &[u8]) -> Self {
        Self {
            data_url: format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.data_url
    }

    /// Decode the payload back to bytes.
    pub fn decode(&self) -> Option<Vec<u8>> {
        let (_, b64) = self.data_url.split_once(";base64,")?;
        STANDARD.decode(b64).ok()
    }
}

fn load(bytes: &[u8], index: usize) -> JobResult<DynamicImage> {
    image::load_from_memory(bytes)
        .map_err(|e| JobError::invalid(format!("reference image {} unreadable: {}", index + 1, e)))
}

fn to_jpeg(image: &DynamicImage) -> JobResult<Vec<u8>> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image.to_rgb8())
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .map_err(|e| JobError::invalid(format!("JPEG encoding failed: {}", e)))?;
    Ok(buf)
}

/// Stitch images into a two-column grid of square cells, each image fitted
/// inside its cell on a white background.
pub fn stitch_grid(images: &[DynamicImage], cell: u32) -> RgbImage {
    let count = images.len().max(1) as u32;
    let columns = count.min(GRID_COLUMNS);
    let rows = count.div_ceil(GRID_COLUMNS);
    let mut canvas = RgbImage::from_pixel(columns * cell, rows * cell, Rgb([255, 255, 255]));

    for (i, img) in images.iter().enumerate() {
        let i = i as u32;
        let fitted = img
            .resize(cell, cell, imageops::FilterType::Triangle)
            .to_rgb8();
        let x = (i % GRID_COLUMNS) * cell + (cell - fitted.width()) / 2;
        let y = (i / GRID_COLUMNS) * cell + (cell - fitted.height()) / 2;
        imageops::overlay(&mut canvas, &fitted, x as i64, y as i64);
    }
    canvas
}

/// Turn uploaded image bytes into the single encoded image sent with a job.
///
/// One image is re-encoded as JPEG; several are stitched into a grid first.
pub fn prepare_reference(images: &[Vec<u8>]) -> JobResult<Option<EncodedImage>> {
    if images.is_empty() {
        return Ok(None);
    }
    if images.len() > MAX_REFERENCE_IMAGES {
        return Err(JobError::invalid(format!(
            "at most {} reference images are supported, got {}",
            MAX_REFERENCE_IMAGES,
            images.len()
        )));
    }

    let decoded = images
        .iter()
        .enumerate()
        .map(|(i, bytes)| load(bytes, i))
        .collect::<JobResult<Vec<_>>>()?;

    let combined = if decoded.len() == 1 {
        decoded.into_iter().next().map(|img| DynamicImage::ImageRgb8(img.to_rgb8()))
    } else {
        Some(DynamicImage::ImageRgb8(stitch_grid(&decoded, GRID_CELL)))
    };

    match combined {
        Some(img) => Ok(Some(EncodedImage::from_jpeg(&to_jpeg(&img)?))),
        None => Ok(None),
    }
}
