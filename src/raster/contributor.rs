//! Capabilities consumed from the surrounding framework.
//!
//! A composed band never touches files or drivers directly: it asks a [`DatasetOpener`] for a
//! [`RasterDataset`] by canonical name and reads windows from its [`RasterBand`]s.

use std::fmt;
use std::sync::Arc;

use crate::foundation::core::{DataType, Rect};
use crate::foundation::error::{VirtbandError, VirtbandResult};
use crate::raster::buffer::BufferViewMut;

/// Resampling kernel used when a source window and its output size differ.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    /// Nearest neighbour.
    #[default]
    Nearest,
    /// Bilinear interpolation between the four closest samples.
    Bilinear,
    /// Mean of every sample under the output pixel footprint.
    Average,
}

impl Resampling {
    /// Stable lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Bilinear => "bilinear",
            Self::Average => "average",
        }
    }
}

/// Windowed read request against a contributor band.
///
/// `window` is the fractional source window in contributor pixel space; the output size is the
/// size of the view passed alongside the request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReadRequest {
    /// Fractional source window.
    pub window: Rect,
    /// Resampling kernel.
    pub resampling: Resampling,
}

/// Palette attached to a paletted band.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColorTable {
    entries: Vec<[u8; 4]>,
}

impl ColorTable {
    /// Build a palette from RGBA entries.
    pub fn new(entries: Vec<[u8; 4]>) -> Self {
        Self { entries }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when the palette has no entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Channel `component` (1 = red .. 4 = alpha) of every entry, in index order.
    pub fn component(&self, component: u8) -> VirtbandResult<Vec<f64>> {
        if !(1..=4).contains(&component) {
            return Err(VirtbandError::configuration(format!(
                "color table component must be in 1..=4, got {component}"
            )));
        }
        let c = usize::from(component - 1);
        Ok(self.entries.iter().map(|e| f64::from(e[c])).collect())
    }
}

/// Histogram bucketing parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HistogramRequest {
    /// Lower bound of the first bucket.
    pub min: f64,
    /// Upper bound of the last bucket.
    pub max: f64,
    /// Number of buckets.
    pub buckets: usize,
    /// Count values outside `[min, max)` into the first/last bucket.
    pub include_out_of_range: bool,
}

impl HistogramRequest {
    /// Check that the request describes at least one non-empty bucket.
    pub fn validate(&self) -> VirtbandResult<()> {
        if self.buckets == 0 {
            return Err(VirtbandError::configuration("histogram needs at least one bucket"));
        }
        if self.min.is_nan() || self.max.is_nan() || self.max <= self.min {
            return Err(VirtbandError::configuration(format!(
                "histogram range [{}, {}) is empty",
                self.min, self.max
            )));
        }
        Ok(())
    }

    /// Bucket index for `value`, or `None` when it is not counted.
    pub fn bucket_of(&self, value: f64) -> Option<usize> {
        if value.is_nan() {
            return None;
        }
        let scale = self.buckets as f64 / (self.max - self.min);
        let idx = ((value - self.min) * scale).floor();
        if idx < 0.0 {
            return self.include_out_of_range.then_some(0);
        }
        if idx >= self.buckets as f64 {
            return self.include_out_of_range.then_some(self.buckets - 1);
        }
        Some(idx as usize)
    }
}

/// One band of a contributor raster.
pub trait RasterBand: Send + Sync + fmt::Debug {
    /// Raster size as `(width, height)`.
    fn size(&self) -> (u32, u32);

    /// Native sample type.
    fn data_type(&self) -> DataType;

    /// Declared nodata value.
    fn nodata(&self) -> Option<f64> {
        None
    }

    /// Palette, for paletted bands.
    fn color_table(&self) -> Option<ColorTable> {
        None
    }

    /// Per-pixel validity band (0 = invalid, non-zero = valid).
    fn mask_band(&self) -> Option<Arc<dyn RasterBand>> {
        None
    }

    /// Read `request.window`, resampled to the size of `out`, converting to the type of `out`.
    fn read_into(&self, request: &ReadRequest, out: &mut BufferViewMut<'_>) -> VirtbandResult<()>;

    /// Minimum sample value, when cheaply known.
    fn minimum(&self) -> Option<f64> {
        None
    }

    /// Maximum sample value, when cheaply known.
    fn maximum(&self) -> Option<f64> {
        None
    }

    /// Histogram over the whole band, when supported.
    fn histogram(&self, _request: &HistogramRequest) -> Option<Vec<u64>> {
        None
    }

    /// Files backing this band.
    fn file_list(&self) -> Vec<String> {
        Vec::new()
    }

    /// Flush pending state to the backing store.
    fn flush(&self) -> VirtbandResult<()> {
        Ok(())
    }
}

/// An opened multi-band contributor.
pub trait RasterDataset: Send + Sync + fmt::Debug {
    /// Human readable name, usually the canonical identifier it was opened under.
    fn description(&self) -> &str;

    /// Number of bands.
    fn band_count(&self) -> usize;

    /// Band by 1-based index.
    fn band(&self, index: usize) -> Option<Arc<dyn RasterBand>>;

    /// Files backing this dataset.
    fn file_list(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Opens contributors by canonical name.
pub trait DatasetOpener: Send + Sync + fmt::Debug {
    /// Open the dataset named `name`.
    fn open(&self, name: &str) -> VirtbandResult<Arc<dyn RasterDataset>>;
}

/// Resample a `width × height` raster exposed through `get` into `out`.
///
/// Shared by the in-memory and file-backed bands. Samples equal to `nodata` are skipped by the
/// bilinear and average kernels.
pub(crate) fn resample_into(
    get: impl Fn(u32, u32) -> f64,
    size: (u32, u32),
    nodata: Option<f64>,
    request: &ReadRequest,
    out: &mut BufferViewMut<'_>,
) -> VirtbandResult<()> {
    let (width, height) = size;
    let win = request.window;
    if width == 0 || height == 0 {
        return Err(VirtbandError::io("cannot read from an empty raster"));
    }
    if win.x0 < -0.5
        || win.y0 < -0.5
        || win.x1 > f64::from(width) + 0.5
        || win.y1 > f64::from(height) + 0.5
    {
        return Err(VirtbandError::io(format!(
            "read window ({}, {}, {}, {}) outside raster {width}x{height}",
            win.x0, win.y0, win.x1, win.y1
        )));
    }
    let (out_w, out_h) = (out.width(), out.height());
    if out_w == 0 || out_h == 0 {
        return Ok(());
    }
    let sx = win.width() / f64::from(out_w);
    let sy = win.height() / f64::from(out_h);
    let is_nodata = |v: f64| match nodata {
        Some(nd) if nd.is_nan() => v.is_nan(),
        Some(nd) => v == nd,
        None => false,
    };
    let clamp_x = |x: f64| (x.floor().max(0.0) as u32).min(width - 1);
    let clamp_y = |y: f64| (y.floor().max(0.0) as u32).min(height - 1);

    for j in 0..out_h {
        let cy = win.y0 + (f64::from(j) + 0.5) * sy;
        for i in 0..out_w {
            let cx = win.x0 + (f64::from(i) + 0.5) * sx;
            let value = match request.resampling {
                Resampling::Nearest => get(clamp_x(cx), clamp_y(cy)),
                Resampling::Bilinear => {
                    let fx = cx - 0.5;
                    let fy = cy - 0.5;
                    let x0 = clamp_x(fx);
                    let y0 = clamp_y(fy);
                    let x1 = (x0 + 1).min(width - 1);
                    let y1 = (y0 + 1).min(height - 1);
                    let tx = (fx - fx.floor()).clamp(0.0, 1.0);
                    let ty = (fy - fy.floor()).clamp(0.0, 1.0);
                    let taps = [get(x0, y0), get(x1, y0), get(x0, y1), get(x1, y1)];
                    if taps.iter().any(|&v| is_nodata(v)) {
                        get(clamp_x(cx), clamp_y(cy))
                    } else {
                        let top = taps[0] + (taps[1] - taps[0]) * tx;
                        let bottom = taps[2] + (taps[3] - taps[2]) * tx;
                        top + (bottom - top) * ty
                    }
                }
                Resampling::Average => {
                    let x_start = clamp_x(win.x0 + f64::from(i) * sx);
                    let x_end = clamp_x((win.x0 + f64::from(i + 1) * sx - 1e-9).max(0.0));
                    let y_start = clamp_y(win.y0 + f64::from(j) * sy);
                    let y_end = clamp_y((win.y0 + f64::from(j + 1) * sy - 1e-9).max(0.0));
                    let mut sum = 0.0;
                    let mut count = 0u64;
                    for py in y_start..=y_end.max(y_start) {
                        for px in x_start..=x_end.max(x_start) {
                            let v = get(px, py);
                            if !is_nodata(v) {
                                sum += v;
                                count += 1;
                            }
                        }
                    }
                    if count == 0 {
                        nodata.unwrap_or(0.0)
                    } else {
                        sum / count as f64
                    }
                }
            };
            out.put(i, j, value);
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/raster/contributor.rs"]
mod tests;
