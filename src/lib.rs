//! virtband composes raster bands on demand from windowed, optionally transformed references into
//! other rasters.
//!
//! A [`ComposedBand`] holds an ordered list of [`Source`]s. Reading a window clips it to the band,
//! offers it to every source in paint order and lets later sources overwrite earlier ones:
//!
//! - [`SimpleSource`] copies (and resamples) a window of a contributor band
//! - [`ComplexSource`] adds nodata/mask exclusion, palette lookup, scaling and a lookup table
//! - [`KernelFilteredSource`] convolves the transformed pixels with a kernel
//! - [`FuncSource`] generates pixels from a callback
//!
//! Named contributors are opened lazily through a [`SourceRegistry`], which shares one open handle
//! per canonical name. Bands are declared in JSON through [`BandDecl`].
#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Composed band.
pub mod band;
/// Composition options.
pub mod config;
/// Declarative JSON format.
pub mod decl;
pub(crate) mod foundation;
/// Window geometry.
pub mod geometry;
/// Buffers and contributor capabilities.
pub mod raster;
/// Shared contributor registry.
pub mod registry;
/// Per-read scratch buffers.
pub mod scratch;
/// Source variants.
pub mod source;

pub use crate::band::{BandStatistics, ComposedBand, CoverageStatus};
pub use crate::config::ComposeOpts;
pub use crate::decl::{BandDecl, SourceDecl};
pub use crate::foundation::core::{DataType, PixelWindow, Point, Rect};
pub use crate::foundation::error::{VirtbandError, VirtbandResult};
pub use crate::foundation::math::{Pixel, round_edge};
pub use crate::geometry::window::{
    BandRequest, ClippedWindow, PaddedWindow, SourceWindow, WindowMapper, pad_window,
};
pub use crate::raster::buffer::{BufferViewMut, RasterBuffer};
pub use crate::raster::contributor::{
    ColorTable, DatasetOpener, HistogramRequest, RasterBand, RasterDataset, ReadRequest,
    Resampling,
};
pub use crate::raster::image_file::ImageFileOpener;
pub use crate::raster::memory::{MemDataset, MemOpener, MemRasterBand};
pub use crate::registry::{HandleTable, Ownership, SourceRegistry};
pub use crate::scratch::{ScratchOpts, WorkingBuffers};
pub use crate::source::{
    ComplexSource, ContributorRef, ExpScaling, FuncSource, Kernel, KernelFilteredSource, Lut,
    NamedContributor, SimpleSource, Source, Transform,
};
