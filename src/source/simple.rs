use std::sync::{Arc, OnceLock};

use crate::foundation::core::{PixelWindow, Rect};
use crate::foundation::error::{VirtbandError, VirtbandResult};
use crate::geometry::window::{
    BandRequest, ClippedWindow, SourceWindow, WindowMapper, contains_rect, overlap,
};
use crate::raster::buffer::BufferViewMut;
use crate::raster::contributor::{HistogramRequest, RasterBand, ReadRequest, Resampling};
use crate::registry::{DatasetHandle, Ownership, SourceRegistry, canonical_name};

/// Contributor named in a declaration and opened through a [`SourceRegistry`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedContributor {
    /// Dataset name as declared.
    pub name: String,
    /// Resolve `name` against the registry's base directory.
    pub relative: bool,
    /// Explicit ownership override; `None` uses the registry default.
    pub shared: Option<bool>,
}

impl NamedContributor {
    /// Absolute (non-relative) reference using the default ownership.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relative: false,
            shared: None,
        }
    }
}

/// Where a source reads its pixels from.
#[derive(Clone, Debug)]
pub enum ContributorRef {
    /// Opened lazily by name.
    Named(NamedContributor),
    /// Bound directly to an already opened band.
    Bound(Arc<dyn RasterBand>),
}

impl From<NamedContributor> for ContributorRef {
    fn from(n: NamedContributor) -> Self {
        Self::Named(n)
    }
}

impl From<Arc<dyn RasterBand>> for ContributorRef {
    fn from(band: Arc<dyn RasterBand>) -> Self {
        Self::Bound(band)
    }
}

#[derive(Debug)]
struct Opened {
    band: Arc<dyn RasterBand>,
    _handle: Option<DatasetHandle>,
}

/// Windowed copy of one contributor band, without value transform.
///
/// The contributor is opened on first access. The outcome of that open, success or failure, is
/// kept for the lifetime of the source; a failed open is never retried.
#[derive(Debug)]
pub struct SimpleSource {
    reference: ContributorRef,
    band_index: usize,
    window: SourceWindow,
    resampling: Resampling,
    reads_mask: bool,
    registry: Option<SourceRegistry>,
    opened: OnceLock<Result<Opened, String>>,
}

impl SimpleSource {
    /// Source reading band `band_index` (1-based) of `reference` at full extent.
    pub fn new(reference: impl Into<ContributorRef>, band_index: usize) -> Self {
        Self {
            reference: reference.into(),
            band_index,
            window: SourceWindow::full(),
            resampling: Resampling::default(),
            reads_mask: false,
            registry: None,
            opened: OnceLock::new(),
        }
    }

    /// Source bound to an opened band.
    pub fn bound(band: Arc<dyn RasterBand>) -> Self {
        Self::new(ContributorRef::Bound(band), 1)
    }

    /// Source opening `name` lazily.
    pub fn named(name: impl Into<String>, band_index: usize) -> Self {
        Self::new(NamedContributor::new(name), band_index)
    }

    /// Set the source/destination windows.
    pub fn with_window(mut self, window: SourceWindow) -> Self {
        self.window = window;
        self
    }

    /// Set the resampling kernel.
    pub fn with_resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }

    /// Read the contributor band's mask band instead of the band itself.
    pub fn with_contributor_mask(mut self, on: bool) -> Self {
        self.reads_mask = on;
        self
    }

    /// Open named contributors through `registry`.
    pub fn with_registry(mut self, registry: SourceRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub(crate) fn bind_registry(&mut self, registry: &SourceRegistry) {
        if self.registry.is_none() {
            self.registry = Some(registry.clone());
        }
    }

    pub(crate) fn set_window(&mut self, window: SourceWindow) {
        self.window = window;
    }

    /// Contributor reference.
    pub fn reference(&self) -> &ContributorRef {
        &self.reference
    }

    /// 1-based contributor band index.
    pub fn band_index(&self) -> usize {
        self.band_index
    }

    /// Declared windows.
    pub fn window(&self) -> &SourceWindow {
        &self.window
    }

    /// Resampling kernel.
    pub fn resampling(&self) -> Resampling {
        self.resampling
    }

    /// Return `true` when pixels come from the contributor's mask band.
    pub fn reads_contributor_mask(&self) -> bool {
        self.reads_mask
    }

    /// Return `true` once the contributor has been opened successfully.
    pub fn is_open(&self) -> bool {
        matches!(self.opened.get(), Some(Ok(_)))
    }

    /// Short label for diagnostics.
    pub fn describe(&self) -> String {
        let label = match &self.reference {
            ContributorRef::Named(n) => format!("{}#{}", n.name, self.band_index),
            ContributorRef::Bound(_) => "<bound band>".to_owned(),
        };
        if self.reads_mask {
            format!("{label}/mask")
        } else {
            label
        }
    }

    fn open(&self) -> VirtbandResult<Opened> {
        let opened = self.open_band()?;
        if !self.reads_mask {
            return Ok(opened);
        }
        let mask = opened.band.mask_band().ok_or_else(|| {
            VirtbandError::resource(format!(
                "contributor of {} has no mask band",
                self.describe()
            ))
        })?;
        Ok(Opened {
            band: mask,
            _handle: opened._handle,
        })
    }

    fn open_band(&self) -> VirtbandResult<Opened> {
        let named = match &self.reference {
            ContributorRef::Bound(band) => {
                return Ok(Opened {
                    band: band.clone(),
                    _handle: None,
                });
            }
            ContributorRef::Named(n) => n,
        };
        let registry = self.registry.as_ref().ok_or_else(|| {
            VirtbandError::resource(format!("no registry available to open '{}'", named.name))
        })?;
        let name = canonical_name(&named.name, named.relative, registry.base_dir())?;
        let ownership = Ownership::from_flag(named.shared, registry.shared_by_default());
        let handle = registry.open_or_attach(&name, ownership)?;
        let band = handle.dataset().band(self.band_index).ok_or_else(|| {
            VirtbandError::resource(format!(
                "band {} out of range for '{name}' ({} bands)",
                self.band_index,
                handle.dataset().band_count()
            ))
        })?;
        Ok(Opened {
            band,
            _handle: Some(handle),
        })
    }

    /// Contributor band, opening it on first use.
    pub fn contributor(&self) -> VirtbandResult<&Arc<dyn RasterBand>> {
        let opened = self.opened.get_or_init(|| {
            self.open().map_err(|e| {
                tracing::warn!(source = %self.describe(), error = %e, "contributor unavailable");
                e.to_string()
            })
        });
        match opened {
            Ok(o) => Ok(&o.band),
            Err(msg) => Err(VirtbandError::resource(format!(
                "contributor {} unavailable ({msg})",
                self.describe()
            ))),
        }
    }

    /// Window mapper with full-extent sentinels resolved.
    pub fn mapper(&self, band_size: (u32, u32)) -> VirtbandResult<WindowMapper> {
        let band = self.contributor()?;
        WindowMapper::from_declared(&self.window, band.size(), band_size)
    }

    /// Declared destination rectangle clipped to the band; never opens the contributor.
    pub fn declared_footprint(&self, band_size: (u32, u32)) -> Option<Rect> {
        let band = PixelWindow::full(band_size.0, band_size.1).to_rect();
        overlap(self.window.dst.unwrap_or(band), band)
    }

    /// Destination rectangle actually backed by contributor pixels, clipped to the band.
    pub fn effective_footprint(&self, band_size: (u32, u32)) -> Option<Rect> {
        let band = self.contributor().ok()?;
        let m = WindowMapper::from_declared(&self.window, band.size(), band_size).ok()?;
        let dst = m.effective_dst(band.size())?;
        overlap(dst, PixelWindow::full(band_size.0, band_size.1).to_rect())
    }

    /// Return `true` when every contributor pixel lands inside the band.
    pub fn shows_whole_contributor(&self, band_size: (u32, u32)) -> bool {
        let Ok(band) = self.contributor() else {
            return false;
        };
        let Ok(m) = WindowMapper::from_declared(&self.window, band.size(), band_size) else {
            return false;
        };
        let (w, h) = band.size();
        let full = PixelWindow::full(w, h).to_rect();
        contains_rect(m.src(), full)
            && contains_rect(
                PixelWindow::full(band_size.0, band_size.1).to_rect(),
                m.rect_to_destination(full),
            )
    }

    /// Return `true` when one source pixel maps to exactly one destination pixel.
    pub fn is_unit_scale(&self, band_size: (u32, u32)) -> bool {
        self.mapper(band_size).is_ok_and(|m| m.scale() == (1.0, 1.0))
    }

    /// Clip the declared windows against the contributor and the band.
    ///
    /// Both rectangles shrink together so the scale is preserved. Fails with a geometry error when
    /// nothing remains.
    pub fn clip_window(&mut self, band_size: (u32, u32)) -> VirtbandResult<()> {
        let band = self.contributor()?.clone();
        let m = WindowMapper::from_declared(&self.window, band.size(), band_size)?;
        let (w, h) = band.size();
        let src = overlap(m.src(), PixelWindow::full(w, h).to_rect());
        let dst = src
            .and_then(|s| overlap(m.rect_to_destination(s), m.dst()))
            .and_then(|d| overlap(d, PixelWindow::full(band_size.0, band_size.1).to_rect()));
        let Some(dst) = dst else {
            return Err(VirtbandError::geometry(format!(
                "window of {} lies outside its contributor or the band",
                self.describe()
            )));
        };
        self.window = SourceWindow {
            src: Some(m.rect_to_source(dst)),
            dst: Some(dst),
        };
        Ok(())
    }

    /// Resolve `request` into the part this source serves.
    pub(crate) fn resolve(
        &self,
        request: &BandRequest,
        band_size: (u32, u32),
    ) -> VirtbandResult<Option<(ClippedWindow, &Arc<dyn RasterBand>)>> {
        if let Some(dst) = self.window.dst
            && overlap(dst, request.window.to_rect()).is_none()
        {
            return Ok(None);
        }
        let band = self.contributor()?;
        let m = WindowMapper::from_declared(&self.window, band.size(), band_size)?;
        Ok(m.resolve(request, band.size())?.map(|c| (c, band)))
    }

    /// Copy the served part of `request` into `out`, which spans the whole request buffer.
    pub fn read(
        &self,
        request: &BandRequest,
        band_size: (u32, u32),
        out: &mut BufferViewMut<'_>,
    ) -> VirtbandResult<()> {
        let Some((c, band)) = self.resolve(request, band_size)? else {
            return Ok(());
        };
        let mut view = out.sub_view(c.out)?;
        band.read_into(
            &ReadRequest {
                window: c.src,
                resampling: self.resampling,
            },
            &mut view,
        )
    }

    /// Contributor minimum, when every contributor pixel is shown unchanged.
    pub fn minimum(&self, band_size: (u32, u32)) -> Option<f64> {
        if !self.shows_whole_contributor(band_size) {
            return None;
        }
        self.contributor().ok()?.minimum()
    }

    /// Contributor maximum, when every contributor pixel is shown unchanged.
    pub fn maximum(&self, band_size: (u32, u32)) -> Option<f64> {
        if !self.shows_whole_contributor(band_size) {
            return None;
        }
        self.contributor().ok()?.maximum()
    }

    /// Contributor histogram, when every contributor pixel is shown once and unchanged.
    pub fn histogram(&self, band_size: (u32, u32), request: &HistogramRequest) -> Option<Vec<u64>> {
        if !self.shows_whole_contributor(band_size) || !self.is_unit_scale(band_size) {
            return None;
        }
        self.contributor().ok()?.histogram(request)
    }

    /// Files this source refers to; never opens a named contributor.
    pub fn file_list(&self) -> Vec<String> {
        match &self.reference {
            ContributorRef::Bound(band) => band.file_list(),
            ContributorRef::Named(n) => {
                let base = self.registry.as_ref().and_then(|r| r.base_dir());
                canonical_name(&n.name, n.relative, base)
                    .map(|name| vec![name])
                    .unwrap_or_default()
            }
        }
    }

    /// Flush the contributor when it has been opened.
    pub fn flush(&self) -> VirtbandResult<()> {
        match self.opened.get() {
            Some(Ok(o)) => o.band.flush(),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/source/simple.rs"]
mod tests;
