use std::fmt;
use std::sync::Arc;

use crate::foundation::core::{PixelWindow, Rect};
use crate::foundation::error::VirtbandResult;
use crate::geometry::window::{BandRequest, WindowMapper, overlap};
use crate::raster::buffer::BufferViewMut;
use crate::scratch::WorkingBuffers;

/// Tile handed to a [`FuncSource`] callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileRequest {
    /// Band pixels to generate.
    pub window: PixelWindow,
}

impl TileRequest {
    /// Width of the tile.
    pub fn width(&self) -> u32 {
        self.window.x_size
    }

    /// Height of the tile.
    pub fn height(&self) -> u32 {
        self.window.y_size
    }
}

/// Generator filling a row-major `width * height` tile.
pub type TileFn = dyn Fn(&TileRequest, &mut [f64]) -> VirtbandResult<()> + Send + Sync;

/// Source generating pixels programmatically instead of reading a contributor.
#[derive(Clone)]
pub struct FuncSource {
    callback: Arc<TileFn>,
    dst: Option<Rect>,
    nodata: Option<f64>,
}

impl fmt::Debug for FuncSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncSource")
            .field("dst", &self.dst)
            .field("nodata", &self.nodata)
            .finish_non_exhaustive()
    }
}

impl FuncSource {
    /// Source covering the whole band.
    pub fn new(
        callback: impl Fn(&TileRequest, &mut [f64]) -> VirtbandResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            callback: Arc::new(callback),
            dst: None,
            nodata: None,
        }
    }

    /// Restrict the source to a destination rectangle.
    pub fn with_dst(mut self, dst: Rect) -> Self {
        self.dst = Some(dst);
        self
    }

    /// Generated values equal to `nodata` carry no contribution.
    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    /// Destination rectangle, `None` for the whole band.
    pub fn dst(&self) -> Option<Rect> {
        self.dst
    }

    /// Value treated as "no contribution".
    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Destination rectangle clipped to the band.
    pub fn footprint(&self, band_size: (u32, u32)) -> Option<Rect> {
        let band = PixelWindow::full(band_size.0, band_size.1).to_rect();
        overlap(self.dst.unwrap_or(band), band)
    }

    /// Generate the served part of `request` and write it into `out`.
    ///
    /// The callback always produces band-resolution pixels; scaled requests pick the nearest
    /// generated pixel.
    pub fn read(
        &self,
        request: &BandRequest,
        band_size: (u32, u32),
        out: &mut BufferViewMut<'_>,
        scratch: &mut WorkingBuffers,
    ) -> VirtbandResult<()> {
        let Some(footprint) = self.footprint(band_size) else {
            return Ok(());
        };
        // Identity mapping: generated pixels are band pixels.
        let m = WindowMapper::new(footprint, footprint)?;
        let Some(clip) = m.resolve(request, band_size)? else {
            return Ok(());
        };
        let tile = clip.read;
        let n = tile.pixel_count();
        let mut values = scratch.take::<f64>(n);
        (self.callback)(&TileRequest { window: tile }, values.as_mut_slice())?;

        let (ow, oh) = (clip.out.x_size as usize, clip.out.y_size as usize);
        let mut picked = scratch.take::<f64>(ow * oh);
        let mut valid = scratch.take::<u8>(ow * oh);
        let sx = clip.src.width() / ow as f64;
        let sy = clip.src.height() / oh as f64;
        let tw = tile.x_size as usize;
        for j in 0..oh {
            let y = (clip.src.y0 + (j as f64 + 0.5) * sy).floor() - f64::from(tile.y_off);
            let ty = (y.max(0.0) as usize).min(tile.y_size as usize - 1);
            for i in 0..ow {
                let x = (clip.src.x0 + (i as f64 + 0.5) * sx).floor() - f64::from(tile.x_off);
                let tx = (x.max(0.0) as usize).min(tw - 1);
                let v = values[ty * tw + tx];
                picked[j * ow + i] = v;
                valid[j * ow + i] = u8::from(!self.is_nodata(v));
            }
        }
        let mask = self.nodata.is_some().then_some(valid.as_slice());
        let result = out.sub_view(clip.out)?.write_from(&picked, mask);

        scratch.give(values);
        scratch.give(picked);
        scratch.give(valid);
        result
    }

    fn is_nodata(&self, v: f64) -> bool {
        match self.nodata {
            Some(nd) if nd.is_nan() => v.is_nan(),
            Some(nd) => v == nd,
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/source/func.rs"]
mod tests;
