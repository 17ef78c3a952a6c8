use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use image::DynamicImage;

use crate::foundation::error::{VirtbandError, VirtbandResult};
use crate::raster::buffer::{BufferSample, RasterBuffer};
use crate::raster::contributor::{DatasetOpener, RasterBand, RasterDataset};
use crate::raster::memory::{MemDataset, MemRasterBand};

/// Opener decoding image files (PNG, TIFF, JPEG, ...) into one band per channel.
///
/// 8-bit images produce `byte` bands, 16-bit images `uint16` bands and float images `float32`
/// bands. Relative names resolve against `root` when one is set.
#[derive(Debug, Clone, Default)]
pub struct ImageFileOpener {
    root: Option<PathBuf>,
}

impl ImageFileOpener {
    /// Opener resolving names as given.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opener resolving relative names against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let p = Path::new(name);
        match &self.root {
            Some(root) if p.is_relative() => root.join(p),
            _ => p.to_path_buf(),
        }
    }
}

impl DatasetOpener for ImageFileOpener {
    fn open(&self, name: &str) -> VirtbandResult<Arc<dyn RasterDataset>> {
        let path = self.resolve(name);
        if !path.is_file() {
            return Err(VirtbandError::resource(format!(
                "image file '{}' does not exist",
                path.display()
            )));
        }
        let img = image::open(&path)
            .with_context(|| format!("decode image '{}'", path.display()))?;
        let file = path.display().to_string();
        let bands = split_channels(img)?
            .into_iter()
            .map(|buf| MemRasterBand::new(buf).with_file(file.clone()).into_shared())
            .collect();
        Ok(Arc::new(MemDataset::new(name, bands)))
    }
}

/// Split a decoded image into one buffer per channel.
pub(crate) fn split_channels(img: DynamicImage) -> VirtbandResult<Vec<RasterBuffer>> {
    let (w, h) = (img.width(), img.height());
    let channels = usize::from(img.color().channel_count());
    match img {
        DynamicImage::ImageLuma8(i) => deinterleave(w, h, 1, i.into_raw()),
        DynamicImage::ImageLumaA8(i) => deinterleave(w, h, 2, i.into_raw()),
        DynamicImage::ImageRgb8(i) => deinterleave(w, h, 3, i.into_raw()),
        DynamicImage::ImageRgba8(i) => deinterleave(w, h, 4, i.into_raw()),
        DynamicImage::ImageLuma16(i) => deinterleave(w, h, 1, i.into_raw()),
        DynamicImage::ImageLumaA16(i) => deinterleave(w, h, 2, i.into_raw()),
        DynamicImage::ImageRgb16(i) => deinterleave(w, h, 3, i.into_raw()),
        DynamicImage::ImageRgba16(i) => deinterleave(w, h, 4, i.into_raw()),
        DynamicImage::ImageRgb32F(i) => deinterleave(w, h, 3, i.into_raw()),
        DynamicImage::ImageRgba32F(i) => deinterleave(w, h, 4, i.into_raw()),
        other => {
            let rgba = other.to_rgba8();
            let n = channels.clamp(1, 4);
            let mut bufs = deinterleave(w, h, 4, rgba.into_raw())?;
            bufs.truncate(n);
            Ok(bufs)
        }
    }
}

fn deinterleave<T: BufferSample>(
    width: u32,
    height: u32,
    channels: usize,
    raw: Vec<T>,
) -> VirtbandResult<Vec<RasterBuffer>> {
    (0..channels)
        .map(|c| {
            let plane: Vec<T> = raw.iter().skip(c).step_by(channels).copied().collect();
            RasterBuffer::from_vec(width, height, plane)
        })
        .collect()
}

/// Open a single band of an image file without going through a registry.
pub fn open_image_band(path: impl AsRef<Path>, band: usize) -> VirtbandResult<Arc<dyn RasterBand>> {
    let path = path.as_ref();
    let ds = ImageFileOpener::new().open(&path.display().to_string())?;
    ds.band(band).ok_or_else(|| {
        VirtbandError::resource(format!(
            "band {band} out of range for '{}' ({} bands)",
            path.display(),
            ds.band_count()
        ))
    })
}

#[cfg(test)]
#[path = "../../tests/unit/raster/image_file.rs"]
mod tests;
