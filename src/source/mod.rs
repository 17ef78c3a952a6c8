//! Sources: windowed, optionally transformed references that paint into a composed band.

/// Transforming source.
pub mod complex;
/// Callback source.
pub mod func;
/// Convolution-filtered source.
pub mod kernel;
/// Per-pixel value transform.
pub mod pipeline;
/// Plain windowed source.
pub mod simple;

use crate::foundation::core::{DataType, Rect};
use crate::foundation::error::VirtbandResult;
use crate::geometry::window::BandRequest;
use crate::raster::buffer::BufferViewMut;
use crate::raster::contributor::HistogramRequest;
use crate::registry::SourceRegistry;
use crate::scratch::WorkingBuffers;

pub use complex::ComplexSource;
pub use func::{FuncSource, TileRequest};
pub use kernel::{Kernel, KernelFilteredSource};
pub use pipeline::{ExpScaling, Lut, Stages, Transform};
pub use simple::{ContributorRef, NamedContributor, SimpleSource};

/// One entry of a composed band's paint list.
#[derive(Debug)]
pub enum Source {
    /// Plain windowed copy.
    Simple(SimpleSource),
    /// Windowed copy through a value transform.
    Complex(ComplexSource),
    /// Transformed copy followed by a convolution.
    Kernel(KernelFilteredSource),
    /// Programmatically generated pixels.
    Func(FuncSource),
}

impl From<SimpleSource> for Source {
    fn from(s: SimpleSource) -> Self {
        Self::Simple(s)
    }
}

impl From<ComplexSource> for Source {
    fn from(s: ComplexSource) -> Self {
        Self::Complex(s)
    }
}

impl From<KernelFilteredSource> for Source {
    fn from(s: KernelFilteredSource) -> Self {
        Self::Kernel(s)
    }
}

impl From<FuncSource> for Source {
    fn from(s: FuncSource) -> Self {
        Self::Func(s)
    }
}

impl Source {
    /// Declaration tag of this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Simple(_) => "PlainSource",
            Self::Complex(_) => "TransformingSource",
            Self::Kernel(_) => "ConvolutionFilteredSource",
            Self::Func(_) => "CallbackSource",
        }
    }

    /// Windowed contributor reference, for every variant except callbacks.
    pub fn simple(&self) -> Option<&SimpleSource> {
        match self {
            Self::Simple(s) => Some(s),
            Self::Complex(c) => Some(c.base()),
            Self::Kernel(k) => Some(k.inner().base()),
            Self::Func(_) => None,
        }
    }

    pub(crate) fn simple_mut(&mut self) -> Option<&mut SimpleSource> {
        match self {
            Self::Simple(s) => Some(s),
            Self::Complex(c) => Some(c.base_mut()),
            Self::Kernel(k) => Some(k.inner_mut().base_mut()),
            Self::Func(_) => None,
        }
    }

    pub(crate) fn bind_registry(&mut self, registry: &SourceRegistry) {
        if let Some(s) = self.simple_mut() {
            s.bind_registry(registry);
        }
    }

    /// Check that this source can produce samples of `data_type`.
    pub fn check_output_type(&self, data_type: DataType) -> VirtbandResult<()> {
        match self {
            Self::Kernel(k) => k.check_type(data_type),
            _ => Ok(()),
        }
    }

    /// Write the served part of `request` into `out`, which spans the whole request buffer.
    pub fn read(
        &self,
        request: &BandRequest,
        band_size: (u32, u32),
        out: &mut BufferViewMut<'_>,
        scratch: &mut WorkingBuffers,
    ) -> VirtbandResult<()> {
        match self {
            Self::Simple(s) => s.read(request, band_size, out),
            Self::Complex(c) => c.read(request, band_size, out, scratch),
            Self::Kernel(k) => k.read(request, band_size, out, scratch),
            Self::Func(f) => f.read(request, band_size, out, scratch),
        }
    }

    /// Minimum over this source's contribution, when cheaply known.
    pub fn minimum(&self, band_size: (u32, u32)) -> Option<f64> {
        match self {
            Self::Simple(s) => s.minimum(band_size),
            Self::Complex(c) => c.minimum(band_size),
            Self::Kernel(_) | Self::Func(_) => None,
        }
    }

    /// Maximum over this source's contribution, when cheaply known.
    pub fn maximum(&self, band_size: (u32, u32)) -> Option<f64> {
        match self {
            Self::Simple(s) => s.maximum(band_size),
            Self::Complex(c) => c.maximum(band_size),
            Self::Kernel(_) | Self::Func(_) => None,
        }
    }

    /// Histogram of this source's contribution, when cheaply known.
    pub fn histogram(&self, band_size: (u32, u32), request: &HistogramRequest) -> Option<Vec<u64>> {
        match self {
            Self::Simple(s) => s.histogram(band_size, request),
            Self::Complex(c) => c.histogram(band_size, request),
            Self::Kernel(_) | Self::Func(_) => None,
        }
    }

    /// Return `true` when samples reach the band unchanged and never masked.
    pub fn is_value_preserving(&self) -> bool {
        match self {
            Self::Simple(_) => true,
            Self::Complex(c) => c.is_value_preserving(),
            Self::Kernel(_) | Self::Func(_) => false,
        }
    }

    /// Return `true` when every pixel of the footprint receives a value.
    pub fn is_opaque(&self) -> bool {
        match self {
            Self::Simple(_) => true,
            Self::Complex(c) => c.is_opaque(),
            Self::Kernel(k) => k.inner().is_opaque(),
            Self::Func(f) => f.nodata().is_none(),
        }
    }

    /// Declared destination rectangle clipped to the band; never opens a contributor.
    pub fn declared_footprint(&self, band_size: (u32, u32)) -> Option<Rect> {
        match self {
            Self::Func(f) => f.footprint(band_size),
            _ => self.simple()?.declared_footprint(band_size),
        }
    }

    /// Destination rectangle actually painted, clipped to the band.
    pub fn effective_footprint(&self, band_size: (u32, u32)) -> Option<Rect> {
        match self {
            Self::Func(f) => f.footprint(band_size),
            _ => self.simple()?.effective_footprint(band_size),
        }
    }

    /// Files referenced by this source.
    pub fn file_list(&self) -> Vec<String> {
        self.simple().map(SimpleSource::file_list).unwrap_or_default()
    }

    /// Flush the opened contributor, if any.
    pub fn flush(&self) -> VirtbandResult<()> {
        self.simple().map_or(Ok(()), SimpleSource::flush)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/source/mod.rs"]
mod tests;
