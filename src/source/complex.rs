use std::sync::Arc;

use crate::foundation::core::{DataType, PixelWindow, Rect};
use crate::foundation::error::{VirtbandError, VirtbandResult};
use crate::foundation::math::Working;
use crate::geometry::window::{BandRequest, ClippedWindow};
use crate::raster::buffer::{BufferViewMut, RasterBuffer};
use crate::raster::contributor::{HistogramRequest, RasterBand, ReadRequest, Resampling};
use crate::scratch::{ScratchElem, WorkingBuffers};
use crate::source::pipeline::{Pipeline, Transform, WorkingType};
use crate::source::simple::SimpleSource;

/// Receiver of transformed tiles.
///
/// `window` is the tile position inside the request buffer; pixels whose `valid` flag is zero
/// carry no contribution and must be left untouched.
pub(crate) trait ValueSink {
    fn accept<W: Working>(
        &mut self,
        window: PixelWindow,
        values: &[W],
        valid: Option<&[u8]>,
    ) -> VirtbandResult<()>;
}

impl ValueSink for BufferViewMut<'_> {
    fn accept<W: Working>(
        &mut self,
        window: PixelWindow,
        values: &[W],
        valid: Option<&[u8]>,
    ) -> VirtbandResult<()> {
        self.sub_view(window)?.write_from(values, valid)
    }
}

/// Windowed source running its samples through a [`Transform`].
#[derive(Debug)]
pub struct ComplexSource {
    base: SimpleSource,
    transform: Transform,
}

impl ComplexSource {
    /// Transforming source over `base` with an identity transform.
    pub fn new(base: SimpleSource) -> Self {
        Self {
            base,
            transform: Transform::new(),
        }
    }

    /// Replace the transform.
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Windowed reference this source reads through.
    pub fn base(&self) -> &SimpleSource {
        &self.base
    }

    pub(crate) fn base_mut(&mut self) -> &mut SimpleSource {
        &mut self.base
    }

    /// Configured transform.
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Mutable transform, for setters applied before the first read.
    pub fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    /// Return `true` when no pixel is ever left without contribution.
    pub fn is_opaque(&self) -> bool {
        !self.transform.may_mask()
    }

    /// Return `true` when samples pass through unchanged.
    pub fn is_value_preserving(&self) -> bool {
        self.transform.is_identity()
    }

    /// Transform and write the served part of `request` into `out`.
    pub fn read(
        &self,
        request: &BandRequest,
        band_size: (u32, u32),
        out: &mut BufferViewMut<'_>,
        scratch: &mut WorkingBuffers,
    ) -> VirtbandResult<()> {
        let dst_type = out.data_type();
        self.read_with(request, band_size, dst_type, scratch, out)
    }

    pub(crate) fn read_with<S: ValueSink>(
        &self,
        request: &BandRequest,
        band_size: (u32, u32),
        dst_type: DataType,
        scratch: &mut WorkingBuffers,
        sink: &mut S,
    ) -> VirtbandResult<()> {
        let Some((clip, band)) = self.base.resolve(request, band_size)? else {
            return Ok(());
        };
        let pipeline = self.transform.resolve(band.as_ref(), dst_type)?;
        match pipeline.working {
            WorkingType::F32 => self.run::<f32, S>(&pipeline, &clip, band, scratch, sink),
            WorkingType::F64 => self.run::<f64, S>(&pipeline, &clip, band, scratch, sink),
        }
    }

    fn run<W: Working + ScratchElem, S: ValueSink>(
        &self,
        pipeline: &Pipeline,
        clip: &ClippedWindow,
        band: &Arc<dyn RasterBand>,
        scratch: &mut WorkingBuffers,
        sink: &mut S,
    ) -> VirtbandResult<()> {
        let (w, h) = (clip.out.x_size, clip.out.y_size);
        let n = clip.out.pixel_count();
        let request = ReadRequest {
            window: clip.src,
            resampling: self.base.resampling(),
        };

        let mut tile = RasterBuffer::from_vec(w, h, scratch.take::<W>(n))?;
        band.read_into(&request, &mut tile.full_view_mut())?;
        let mut values = tile
            .into_vec::<W>()
            .ok_or_else(|| VirtbandError::io("working tile changed sample type"))?;

        let mut valid = scratch.take::<u8>(n);
        valid.fill(1);
        if pipeline.use_mask {
            read_mask(band.as_ref(), clip.src, w, h, &mut valid, scratch)?;
        }

        pipeline.apply(&mut values, &mut valid);
        let mask = pipeline.needs_validity().then_some(valid.as_slice());
        let result = sink.accept(clip.out, &values, mask);

        scratch.give(values);
        scratch.give(valid);
        result
    }

    /// Contributor minimum, when samples pass through unchanged.
    pub fn minimum(&self, band_size: (u32, u32)) -> Option<f64> {
        self.is_value_preserving()
            .then(|| self.base.minimum(band_size))
            .flatten()
    }

    /// Contributor maximum, when samples pass through unchanged.
    pub fn maximum(&self, band_size: (u32, u32)) -> Option<f64> {
        self.is_value_preserving()
            .then(|| self.base.maximum(band_size))
            .flatten()
    }

    /// Contributor histogram, when samples pass through unchanged.
    pub fn histogram(&self, band_size: (u32, u32), request: &HistogramRequest) -> Option<Vec<u64>> {
        self.is_value_preserving()
            .then(|| self.base.histogram(band_size, request))
            .flatten()
    }
}

/// Clear `valid` where the contributor's mask band reads zero.
///
/// A contributor without a mask band leaves every pixel valid.
fn read_mask(
    band: &dyn RasterBand,
    window: Rect,
    width: u32,
    height: u32,
    valid: &mut [u8],
    scratch: &mut WorkingBuffers,
) -> VirtbandResult<()> {
    let Some(mask) = band.mask_band() else {
        return Ok(());
    };
    if mask.size() != band.size() {
        return Err(VirtbandError::io(format!(
            "mask band size {:?} differs from band size {:?}",
            mask.size(),
            band.size()
        )));
    }
    let n = valid.len();
    let mut tile = RasterBuffer::from_vec(width, height, scratch.take::<u8>(n))?;
    mask.read_into(
        &ReadRequest {
            window,
            resampling: Resampling::Nearest,
        },
        &mut tile.full_view_mut(),
    )?;
    let flags = tile
        .into_vec::<u8>()
        .ok_or_else(|| VirtbandError::io("mask tile changed sample type"))?;
    for (ok, m) in valid.iter_mut().zip(&flags) {
        *ok &= u8::from(*m > 0);
    }
    scratch.give(flags);
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/source/complex.rs"]
mod tests;
