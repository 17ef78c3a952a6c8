//! The composed band: an ordered paint list of sources read on demand.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ComposeOpts;
use crate::decl::{BandDecl, NodataDecl, SourceDecl};
use crate::foundation::core::{DataType, PixelWindow, Point, Rect};
use crate::foundation::error::{VirtbandError, VirtbandResult};
use crate::foundation::math::{EDGE_EPSILON, round_edge};
use crate::geometry::window::{BandRequest, SourceWindow, contains_rect, overlap};
use crate::raster::buffer::{BufferViewMut, RasterBuffer};
use crate::raster::contributor::{
    HistogramRequest, RasterBand, ReadRequest, Resampling, resample_into,
};
use crate::registry::SourceRegistry;
use crate::scratch::WorkingBuffers;
use crate::source::{
    ComplexSource, ContributorRef, FuncSource, Kernel, KernelFilteredSource, SimpleSource, Source,
    Transform,
};

/// How much of a window is painted by at least one source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CoverageStatus {
    /// No source paints any pixel of the window.
    Empty,
    /// Sources paint the given fraction (in `(0, 1)`) of the window.
    Partial(f64),
    /// Every pixel of the window is painted.
    Full,
}

/// Full-scan statistics of a band, ignoring nodata and NaN pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BandStatistics {
    /// Smallest valid value.
    pub min: f64,
    /// Largest valid value.
    pub max: f64,
    /// Mean of valid values.
    pub mean: f64,
    /// Population standard deviation of valid values.
    pub std_dev: f64,
    /// Number of valid pixels.
    pub valid_count: u64,
}

/// A raster band defined by an ordered list of sources.
///
/// Sources paint in list order: where footprints overlap, the later source wins. Pixels painted by
/// no source keep whatever the caller's buffer held.
///
/// The min/max and location caches are interior state; reads from several threads are safe, but a
/// source list mutated through `&mut self` invalidates both.
#[derive(Debug)]
pub struct ComposedBand {
    width: u32,
    height: u32,
    data_type: DataType,
    nodata: Option<f64>,
    sources: Vec<Source>,
    registry: Option<SourceRegistry>,
    opts: ComposeOpts,
    min_max: Mutex<Option<(f64, f64)>>,
    location: Mutex<Option<((u32, u32), String)>>,
    parse_failures: Vec<String>,
}

impl ComposedBand {
    /// Empty band of `width × height` samples of `data_type`.
    pub fn new(width: u32, height: u32, data_type: DataType) -> VirtbandResult<Self> {
        if width == 0 || height == 0 {
            return Err(VirtbandError::configuration(format!(
                "band size {width}x{height} is empty"
            )));
        }
        Ok(Self {
            width,
            height,
            data_type,
            nodata: None,
            sources: Vec::new(),
            registry: None,
            opts: ComposeOpts::default(),
            min_max: Mutex::new(None),
            location: Mutex::new(None),
            parse_failures: Vec::new(),
        })
    }

    /// Set the band nodata value.
    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self.invalidate();
        self
    }

    /// Open named contributors through `registry`.
    pub fn with_registry(mut self, registry: SourceRegistry) -> Self {
        for s in &mut self.sources {
            s.bind_registry(&registry);
        }
        self.registry = Some(registry);
        self
    }

    /// Replace the composition options.
    pub fn with_opts(mut self, opts: ComposeOpts) -> Self {
        self.opts = opts;
        self
    }

    /// Raster size as `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Sample type.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Band nodata value.
    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Composition options.
    pub fn opts(&self) -> &ComposeOpts {
        &self.opts
    }

    /// Sources in paint order.
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Messages of source declarations that failed to parse.
    pub fn parse_failures(&self) -> &[String] {
        &self.parse_failures
    }

    fn invalidate(&mut self) {
        *self.min_max.get_mut() = None;
        *self.location.get_mut() = None;
    }

    // ----------------------------
    // Source management
    // ----------------------------

    /// Append `source` to the paint list.
    pub fn add_source(&mut self, source: impl Into<Source>) -> VirtbandResult<usize> {
        let mut source = source.into();
        source.check_output_type(self.data_type)?;
        if let Some(registry) = &self.registry {
            source.bind_registry(registry);
        }
        self.sources.push(source);
        self.invalidate();
        Ok(self.sources.len() - 1)
    }

    /// Append `source` after clipping its windows to the contributor and the band.
    ///
    /// Degenerate windows and windows falling entirely outside the contributor or the band are
    /// rejected with a geometry error.
    pub fn add_source_validated(&mut self, source: impl Into<Source>) -> VirtbandResult<usize> {
        let mut source = source.into();
        if let Some(registry) = &self.registry {
            source.bind_registry(registry);
        }
        let size = self.size();
        match source.simple_mut() {
            Some(s) => s.clip_window(size)?,
            None => {
                if source.declared_footprint(size).is_none() {
                    return Err(VirtbandError::geometry(format!(
                        "{} lies outside the band",
                        source.kind()
                    )));
                }
            }
        }
        self.add_source(source)
    }

    fn windowed(
        reference: impl Into<ContributorRef>,
        band_index: usize,
        window: SourceWindow,
    ) -> SimpleSource {
        SimpleSource::new(reference, band_index).with_window(window)
    }

    fn add_checked(&mut self, source: Source, validate: bool) -> VirtbandResult<usize> {
        if validate {
            self.add_source_validated(source)
        } else {
            self.add_source(source)
        }
    }

    /// Append a plain windowed copy of band `band_index` of `reference`.
    pub fn add_simple_source(
        &mut self,
        reference: impl Into<ContributorRef>,
        band_index: usize,
        window: SourceWindow,
        validate: bool,
    ) -> VirtbandResult<usize> {
        let s = Self::windowed(reference, band_index, window);
        self.add_checked(s.into(), validate)
    }

    /// Append a windowed copy of the contributor band's mask band.
    pub fn add_mask_band_source(
        &mut self,
        reference: impl Into<ContributorRef>,
        band_index: usize,
        window: SourceWindow,
        validate: bool,
    ) -> VirtbandResult<usize> {
        let s = Self::windowed(reference, band_index, window).with_contributor_mask(true);
        self.add_checked(s.into(), validate)
    }

    /// Append a windowed copy passed through `transform`.
    pub fn add_complex_source(
        &mut self,
        reference: impl Into<ContributorRef>,
        band_index: usize,
        window: SourceWindow,
        transform: Transform,
        validate: bool,
    ) -> VirtbandResult<usize> {
        let s = ComplexSource::new(Self::windowed(reference, band_index, window))
            .with_transform(transform);
        self.add_checked(s.into(), validate)
    }

    /// Append a transformed copy filtered by `kernel`.
    pub fn add_kernel_source(
        &mut self,
        reference: impl Into<ContributorRef>,
        band_index: usize,
        window: SourceWindow,
        transform: Transform,
        kernel: Kernel,
        validate: bool,
    ) -> VirtbandResult<usize> {
        let inner = ComplexSource::new(Self::windowed(reference, band_index, window))
            .with_transform(transform);
        self.add_checked(KernelFilteredSource::new(inner, kernel).into(), validate)
    }

    /// Append a generated source.
    pub fn add_func_source(&mut self, source: FuncSource) -> VirtbandResult<usize> {
        self.add_source(source)
    }

    /// Remove and return the source at `index`.
    pub fn remove_source(&mut self, index: usize) -> Option<Source> {
        if index >= self.sources.len() {
            return None;
        }
        self.invalidate();
        Some(self.sources.remove(index))
    }

    /// Drop every source whose painted area is fully repainted by a later opaque source.
    ///
    /// Returns the number of removed sources. Only sources whose footprint is known are pruned;
    /// the pruned band reads exactly like the original one.
    pub fn remove_covered_sources(&mut self) -> usize {
        let size = self.size();
        let footprints: Vec<Option<Rect>> =
            self.sources.iter().map(|s| s.effective_footprint(size)).collect();
        let covered: Vec<bool> = footprints
            .iter()
            .enumerate()
            .map(|(i, fp)| {
                let Some(fp) = fp else {
                    return false;
                };
                self.sources
                    .iter()
                    .zip(&footprints)
                    .skip(i + 1)
                    .any(|(later, later_fp)| {
                        later.is_opaque()
                            && later_fp.is_some_and(|l| {
                                contains_rect(l, *fp)
                                    && l.area() >= fp.area()
                            })
                    })
            })
            .collect();
        let removed = covered.iter().filter(|c| **c).count();
        if removed > 0 {
            let mut flags = covered.into_iter();
            self.sources.retain(|_| !flags.next().unwrap_or(false));
            self.invalidate();
            tracing::debug!(removed, remaining = self.sources.len(), "pruned covered sources");
        }
        removed
    }

    // ----------------------------
    // Reads
    // ----------------------------

    /// The contributor of a single plain source showing it 1:1 over the whole band.
    fn passthrough(&self) -> Option<(&Arc<dyn RasterBand>, Resampling)> {
        let [Source::Simple(s)] = self.sources.as_slice() else {
            return None;
        };
        let band = s.contributor().ok()?;
        let full = PixelWindow::full(self.width, self.height).to_rect();
        let w = s.window();
        (band.size() == self.size()
            && band.data_type() == self.data_type
            && w.src.is_none_or(|r| r == full)
            && w.dst.is_none_or(|r| r == full))
        .then_some((band, s.resampling()))
    }

    /// Compose `window` into `out`, resampling to the size of `out`.
    ///
    /// The window is clipped to the band first; the matching part of `out` is painted. On error
    /// the buffer content is unspecified.
    #[tracing::instrument(
        level = "debug",
        skip(self, out),
        fields(buf_w = out.width(), buf_h = out.height())
    )]
    pub fn read(&self, window: PixelWindow, out: &mut BufferViewMut<'_>) -> VirtbandResult<()> {
        let request = BandRequest {
            window,
            buf_width: out.width(),
            buf_height: out.height(),
        };
        if window.is_empty() || request.buf_width == 0 || request.buf_height == 0 {
            return Err(VirtbandError::geometry(format!(
                "degenerate read ({},{},{},{}) into {}x{} buffer",
                window.x_off,
                window.y_off,
                window.x_size,
                window.y_size,
                request.buf_width,
                request.buf_height
            )));
        }
        let Some((request, out_window)) = self.clip_request(&request) else {
            return Ok(());
        };
        let mut view = out.sub_view(out_window)?;

        if let Some((band, resampling)) = self.passthrough() {
            tracing::debug!("single source passthrough");
            return band.read_into(
                &ReadRequest {
                    window: request.window.to_rect(),
                    resampling,
                },
                &mut view,
            );
        }

        let mut scratch = WorkingBuffers::new(self.opts.scratch);
        for source in &self.sources {
            source.read(&request, self.size(), &mut view, &mut scratch)?;
        }
        Ok(())
    }

    /// Clip `request` to the band, returning the clipped request and the buffer part it fills.
    fn clip_request(&self, request: &BandRequest) -> Option<(BandRequest, PixelWindow)> {
        let full = PixelWindow::full(request.buf_width, request.buf_height);
        let win = request.window;
        if win.x_end() <= u64::from(self.width) && win.y_end() <= u64::from(self.height) {
            return Some((*request, full));
        }
        let band = PixelWindow::full(self.width, self.height).to_rect();
        let clipped = overlap(win.to_rect(), band)?;
        let sx = f64::from(request.buf_width) / f64::from(win.x_size);
        let sy = f64::from(request.buf_height) / f64::from(win.y_size);
        let edge = |v: f64, scale: f64, origin: u32, max: u32| {
            round_edge((v - f64::from(origin)) * scale).clamp(0, i64::from(max)) as u32
        };
        let ox0 = edge(clipped.x0, sx, win.x_off, request.buf_width);
        let ox1 = edge(clipped.x1, sx, win.x_off, request.buf_width);
        let oy0 = edge(clipped.y0, sy, win.y_off, request.buf_height);
        let oy1 = edge(clipped.y1, sy, win.y_off, request.buf_height);
        if ox1 <= ox0 || oy1 <= oy0 {
            return None;
        }
        let window = PixelWindow::new(
            clipped.x0 as u32,
            clipped.y0 as u32,
            clipped.width() as u32,
            clipped.height() as u32,
        );
        Some((
            BandRequest {
                window,
                buf_width: ox1 - ox0,
                buf_height: oy1 - oy0,
            },
            PixelWindow::new(ox0, oy0, ox1 - ox0, oy1 - oy0),
        ))
    }

    /// Fill value of freshly allocated buffers: the band nodata, or zero.
    fn fill_value(&self) -> f64 {
        self.nodata
            .and_then(|nd| self.data_type.adjust_nodata(nd))
            .unwrap_or(0.0)
    }

    /// Read `window` at full resolution into a new buffer of the band type.
    ///
    /// Unpainted pixels hold the band nodata value, or zero.
    pub fn read_window(&self, window: PixelWindow) -> VirtbandResult<RasterBuffer> {
        window.check_within(self.width, self.height)?;
        let mut buf = RasterBuffer::filled(
            self.data_type,
            window.x_size,
            window.y_size,
            self.fill_value(),
        );
        self.read(window, &mut buf.full_view_mut())?;
        Ok(buf)
    }

    /// Block size used by [`ComposedBand::read_block`].
    pub fn block_size(&self) -> (u32, u32) {
        self.opts.block_size
    }

    /// Number of blocks per axis.
    pub fn block_count(&self) -> (u32, u32) {
        let (bw, bh) = self.block_size();
        (self.width.div_ceil(bw), self.height.div_ceil(bh))
    }

    /// Read block `(bx, by)` into the top-left corner of `out`.
    ///
    /// Edge blocks are partial; the returned window is the band area actually read.
    pub fn read_block(
        &self,
        bx: u32,
        by: u32,
        out: &mut BufferViewMut<'_>,
    ) -> VirtbandResult<PixelWindow> {
        let (bw, bh) = self.block_size();
        let (nx, ny) = self.block_count();
        if bx >= nx || by >= ny {
            return Err(VirtbandError::geometry(format!(
                "block ({bx}, {by}) outside the {nx}x{ny} block grid"
            )));
        }
        let x = bx * bw;
        let y = by * bh;
        let window = PixelWindow::new(x, y, bw.min(self.width - x), bh.min(self.height - y));
        let mut view = out.sub_view(PixelWindow::full(window.x_size, window.y_size))?;
        self.read(window, &mut view)?;
        Ok(window)
    }

    // ----------------------------
    // Statistics
    // ----------------------------

    /// Visit every valid pixel of the band, strip by strip. Returns the number visited.
    fn scan(&self, mut visit: impl FnMut(f64)) -> VirtbandResult<u64> {
        let nodata = self.nodata.and_then(|nd| self.data_type.adjust_nodata(nd));
        let fill = nodata.unwrap_or(0.0);
        let rows = self.opts.scan_rows.clamp(1, self.height);
        let mut strip = RasterBuffer::new(self.data_type, self.width, rows);
        let mut count = 0u64;
        let mut y = 0;
        while y < self.height {
            let h = rows.min(self.height - y);
            let mut view = strip.view_mut(PixelWindow::full(self.width, h))?;
            view.fill(fill);
            self.read(PixelWindow::new(0, y, self.width, h), &mut view)?;
            for v in view.read_f64() {
                if v.is_nan() || nodata.is_some_and(|nd| v == nd) {
                    continue;
                }
                visit(v);
                count += 1;
            }
            y += h;
        }
        Ok(count)
    }

    /// Return `true` when `source` writes contributor samples exactly as its contributor reports
    /// statistics over them.
    fn reports_exact_stats(&self, source: &Source) -> bool {
        let size = self.size();
        let Some(simple) = source.simple() else {
            return false;
        };
        let Ok(band) = simple.contributor() else {
            return false;
        };
        let theirs = band
            .nodata()
            .and_then(|nd| band.data_type().adjust_nodata(nd));
        let ours = self.nodata.and_then(|nd| self.data_type.adjust_nodata(nd));
        let same_nodata = match (theirs, ours) {
            (None, None) => true,
            (Some(a), Some(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => false,
        };
        source.is_value_preserving()
            && same_nodata
            && band.data_type() == self.data_type
            && simple.shows_whole_contributor(size)
            && simple.is_unit_scale(size)
    }

    /// Effective footprints of all sources when they are pairwise disjoint.
    fn disjoint_footprints(&self) -> Option<Vec<Rect>> {
        let size = self.size();
        let rects = self
            .sources
            .iter()
            .map(|s| s.effective_footprint(size))
            .collect::<Option<Vec<_>>>()?;
        let disjoint = rects
            .iter()
            .enumerate()
            .all(|(i, a)| rects[i + 1..].iter().all(|b| overlap(*a, *b).is_none()));
        disjoint.then_some(rects)
    }

    fn min_max_from_sources(&self) -> Option<(f64, f64)> {
        if self.sources.is_empty() || !self.sources.iter().all(|s| self.reports_exact_stats(s)) {
            return None;
        }
        let rects = self.disjoint_footprints()?;
        let full = PixelWindow::full(self.width, self.height).to_rect();
        if self.nodata.is_none() && coverage(&rects, full) != CoverageStatus::Full {
            return None;
        }
        let size = self.size();
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for s in &self.sources {
            lo = lo.min(s.minimum(size)?);
            hi = hi.max(s.maximum(size)?);
        }
        Some((lo, hi))
    }

    /// Band minimum and maximum, or `None` when no pixel is valid.
    ///
    /// Uses the cached value, then per-source statistics when they provably equal a full scan,
    /// then a full scan.
    #[tracing::instrument(skip(self))]
    pub fn compute_min_max(&self) -> VirtbandResult<Option<(f64, f64)>> {
        if let Some(cached) = *self.min_max.lock() {
            return Ok(Some(cached));
        }
        let result = match self.min_max_from_sources() {
            Some(v) => {
                tracing::debug!("min/max from source statistics");
                Some(v)
            }
            None => {
                tracing::debug!("min/max by full scan");
                let mut lo = f64::INFINITY;
                let mut hi = f64::NEG_INFINITY;
                let n = self.scan(|v| {
                    lo = lo.min(v);
                    hi = hi.max(v);
                })?;
                (n > 0).then_some((lo, hi))
            }
        };
        if let Some(v) = result {
            *self.min_max.lock() = Some(v);
        }
        Ok(result)
    }

    /// Band minimum.
    pub fn minimum(&self) -> VirtbandResult<Option<f64>> {
        Ok(self.compute_min_max()?.map(|(lo, _)| lo))
    }

    /// Band maximum.
    pub fn maximum(&self) -> VirtbandResult<Option<f64>> {
        Ok(self.compute_min_max()?.map(|(_, hi)| hi))
    }

    /// Min, max, mean and standard deviation by full scan.
    pub fn compute_statistics(&self) -> VirtbandResult<Option<BandStatistics>> {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let n = self.scan(|v| {
            lo = lo.min(v);
            hi = hi.max(v);
            sum += v;
            sum_sq += v * v;
        })?;
        if n == 0 {
            return Ok(None);
        }
        *self.min_max.lock() = Some((lo, hi));
        let mean = sum / n as f64;
        let variance = (sum_sq / n as f64 - mean * mean).max(0.0);
        Ok(Some(BandStatistics {
            min: lo,
            max: hi,
            mean,
            std_dev: variance.sqrt(),
            valid_count: n,
        }))
    }

    fn histogram_from_sources(&self, request: &HistogramRequest) -> Option<Vec<u64>> {
        if self.sources.is_empty() || !self.sources.iter().all(|s| self.reports_exact_stats(s)) {
            return None;
        }
        let rects = self.disjoint_footprints()?;
        let full = PixelWindow::full(self.width, self.height).to_rect();
        if coverage(&rects, full) != CoverageStatus::Full {
            return None;
        }
        let size = self.size();
        let mut merged = vec![0u64; request.buckets];
        for s in &self.sources {
            let counts = s.histogram(size, request)?;
            if counts.len() != merged.len() {
                return None;
            }
            for (m, c) in merged.iter_mut().zip(counts) {
                *m += c;
            }
        }
        Some(merged)
    }

    /// Histogram of valid pixels.
    ///
    /// Per-source histograms are merged when the sources are disjoint, cover the band and show
    /// their contributors unchanged; otherwise the band is scanned.
    #[tracing::instrument(skip(self), fields(buckets = request.buckets))]
    pub fn histogram(&self, request: &HistogramRequest) -> VirtbandResult<Vec<u64>> {
        request.validate()?;
        if let Some(merged) = self.histogram_from_sources(request) {
            tracing::debug!("histogram merged from sources");
            return Ok(merged);
        }
        tracing::debug!("histogram by full scan");
        let mut counts = vec![0u64; request.buckets];
        self.scan(|v| {
            if let Some(b) = request.bucket_of(v) {
                counts[b] += 1;
            }
        })?;
        Ok(counts)
    }

    // ----------------------------
    // Coverage and introspection
    // ----------------------------

    /// Classify how much of `window` the sources paint.
    pub fn coverage_status(&self, window: PixelWindow) -> VirtbandResult<CoverageStatus> {
        window.check_within(self.width, self.height)?;
        let size = self.size();
        let rects: Vec<Rect> = self
            .sources
            .iter()
            .filter_map(|s| s.effective_footprint(size))
            .collect();
        Ok(coverage(&rects, window.to_rect()))
    }

    /// Files referenced by the sources painting pixel `(x, y)`, as a JSON document.
    ///
    /// The last answer is cached.
    pub fn location_info(&self, x: u32, y: u32) -> VirtbandResult<String> {
        if x >= self.width || y >= self.height {
            return Err(VirtbandError::geometry(format!(
                "pixel ({x}, {y}) outside {}x{} band",
                self.width, self.height
            )));
        }
        if let Some((at, info)) = &*self.location.lock()
            && *at == (x, y)
        {
            return Ok(info.clone());
        }
        let center = Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
        let mut files: Vec<String> = self
            .sources
            .iter()
            .filter(|s| {
                s.effective_footprint(self.size())
                    .is_some_and(|fp| fp.contains(center))
            })
            .flat_map(Source::file_list)
            .collect();
        files.sort();
        files.dedup();
        let info = serde_json::json!({ "Pixel": [x, y], "Files": files }).to_string();
        *self.location.lock() = Some(((x, y), info.clone()));
        Ok(info)
    }

    /// Files referenced by every source, sorted and deduplicated.
    pub fn file_list(&self) -> Vec<String> {
        let mut files: Vec<String> = self.sources.iter().flat_map(Source::file_list).collect();
        files.sort();
        files.dedup();
        files
    }

    /// Flush every opened contributor.
    pub fn flush(&self) -> VirtbandResult<()> {
        self.sources.iter().try_for_each(Source::flush)
    }

    // ----------------------------
    // Declarations
    // ----------------------------

    /// Build a band from its declaration.
    ///
    /// A source whose declaration is malformed is skipped and recorded in
    /// [`ComposedBand::parse_failures`]; the remaining sources are kept. `opts.shared_by_default`
    /// replaces the registry's default ownership mode.
    #[tracing::instrument(skip_all, fields(width = decl.width, height = decl.height))]
    pub fn from_declaration(
        decl: &BandDecl,
        registry: SourceRegistry,
        opts: ComposeOpts,
    ) -> VirtbandResult<Self> {
        let mut opts = opts;
        if let Some([bw, bh]) = decl.block_size {
            opts = opts.with_block_size(bw, bh);
        }
        let registry = registry.with_shared_by_default(opts.shared_by_default);
        let mut band = Self::new(decl.width, decl.height, decl.data_type)?
            .with_opts(opts)
            .with_registry(registry);
        band.nodata = decl.no_data_value.as_ref().map(NodataDecl::value).transpose()?;

        for (i, raw) in decl.sources.iter().enumerate() {
            let added = SourceDecl::from_value(raw.clone())
                .and_then(|d| Source::from_declaration(&d))
                .and_then(|s| band.add_source(s));
            if let Err(e) = added {
                tracing::warn!(index = i, error = %e, "skipping source declaration");
                band.parse_failures.push(format!("source {i}: {e}"));
            }
        }
        Ok(band)
    }

    /// Parse a band from JSON text.
    pub fn from_json(
        text: &str,
        registry: SourceRegistry,
        opts: ComposeOpts,
    ) -> VirtbandResult<Self> {
        Self::from_declaration(&BandDecl::from_json(text)?, registry, opts)
    }

    /// Declaration of this band.
    ///
    /// Sources with no declarative form (callbacks, in-process bindings) are left out with a
    /// warning.
    pub fn to_declaration(&self) -> VirtbandResult<BandDecl> {
        let mut sources = Vec::with_capacity(self.sources.len());
        for (i, s) in self.sources.iter().enumerate() {
            match s.to_declaration() {
                Some(d) => sources.push(d.to_value()?),
                None => tracing::warn!(index = i, kind = s.kind(), "source has no declaration"),
            }
        }
        let (bw, bh) = self.opts.block_size;
        Ok(BandDecl {
            width: self.width,
            height: self.height,
            data_type: self.data_type,
            no_data_value: self.nodata.map(NodataDecl::from_f64),
            block_size: Some([bw, bh]),
            sources,
        })
    }

    /// Encode the declaration as JSON.
    pub fn to_json(&self) -> VirtbandResult<String> {
        self.to_declaration()?.to_json()
    }
}

/// `r` as an integer window inside a raster of `size`, when every edge is integral.
fn pixel_aligned(r: Rect, size: (u32, u32)) -> Option<PixelWindow> {
    let edges = [r.x0, r.y0, r.x1, r.y1];
    if edges.iter().any(|v| (v - v.round()).abs() >= EDGE_EPSILON) {
        return None;
    }
    let [x0, y0, x1, y1] = edges.map(|v| v.round() as i64);
    let inside = x0 >= 0 && y0 >= 0 && x1 <= i64::from(size.0) && y1 <= i64::from(size.1);
    (inside && x1 > x0 && y1 > y0).then(|| {
        PixelWindow::new(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
    })
}

/// Coverage of `window` by the union of `rects`, by coordinate compression.
fn coverage(rects: &[Rect], window: Rect) -> CoverageStatus {
    let clipped: Vec<Rect> = rects.iter().filter_map(|r| overlap(*r, window)).collect();
    if clipped.is_empty() {
        return CoverageStatus::Empty;
    }
    let mut xs: Vec<f64> = clipped.iter().flat_map(|r| [r.x0, r.x1]).collect();
    xs.sort_by(f64::total_cmp);
    xs.dedup();

    let mut covered = 0.0;
    for pair in xs.windows(2) {
        let (xa, xb) = (pair[0], pair[1]);
        let mut spans: Vec<(f64, f64)> = clipped
            .iter()
            .filter(|r| r.x0 <= xa && r.x1 >= xb)
            .map(|r| (r.y0, r.y1))
            .collect();
        spans.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut height = 0.0;
        let mut current: Option<(f64, f64)> = None;
        for (y0, y1) in spans {
            current = match current {
                Some((c0, c1)) if y0 <= c1 => Some((c0, c1.max(y1))),
                Some((c0, c1)) => {
                    height += c1 - c0;
                    Some((y0, y1))
                }
                None => Some((y0, y1)),
            };
        }
        if let Some((c0, c1)) = current {
            height += c1 - c0;
        }
        covered += (xb - xa) * height;
    }

    let total = window.area();
    let fraction = covered / total;
    if fraction >= 1.0 - 1e-12 {
        CoverageStatus::Full
    } else if covered <= 0.0 {
        CoverageStatus::Empty
    } else {
        CoverageStatus::Partial(fraction)
    }
}

impl RasterBand for ComposedBand {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Pixel-aligned requests matching the size of `out` compose straight into it. Any other
    /// request composes the integer pixels around the window first and resamples them, so a
    /// nested band samples exactly like a stored raster holding the same pixels.
    fn read_into(&self, request: &ReadRequest, out: &mut BufferViewMut<'_>) -> VirtbandResult<()> {
        let w = request.window;
        if let Some(window) = pixel_aligned(w, self.size())
            && (window.x_size, window.y_size) == (out.width(), out.height())
        {
            return ComposedBand::read(self, window, out);
        }

        // One extra pixel on each side feeds the bilinear taps at the window edges.
        let x0 = (w.x0.floor() as i64 - 1).max(0);
        let y0 = (w.y0.floor() as i64 - 1).max(0);
        let x1 = (w.x1.ceil() as i64 + 1).min(i64::from(self.width));
        let y1 = (w.y1.ceil() as i64 + 1).min(i64::from(self.height));
        if x1 <= x0 || y1 <= y0 {
            return Err(VirtbandError::io(format!(
                "read window ({}, {}, {}, {}) outside composed band",
                w.x0, w.y0, w.x1, w.y1
            )));
        }
        let around = PixelWindow::new(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32);
        let pixels = self.read_window(around)?;
        let (ox, oy) = (f64::from(around.x_off), f64::from(around.y_off));
        resample_into(
            |x, y| pixels.get(x, y),
            (around.x_size, around.y_size),
            self.nodata.and_then(|nd| self.data_type.adjust_nodata(nd)),
            &ReadRequest {
                window: Rect::new(w.x0 - ox, w.y0 - oy, w.x1 - ox, w.y1 - oy),
                resampling: request.resampling,
            },
            out,
        )
    }

    fn minimum(&self) -> Option<f64> {
        (*self.min_max.lock())
            .or_else(|| self.min_max_from_sources())
            .map(|(lo, _)| lo)
    }

    fn maximum(&self) -> Option<f64> {
        (*self.min_max.lock())
            .or_else(|| self.min_max_from_sources())
            .map(|(_, hi)| hi)
    }

    fn histogram(&self, request: &HistogramRequest) -> Option<Vec<u64>> {
        request.validate().ok()?;
        self.histogram_from_sources(request)
    }

    fn file_list(&self) -> Vec<String> {
        ComposedBand::file_list(self)
    }

    fn flush(&self) -> VirtbandResult<()> {
        ComposedBand::flush(self)
    }
}

#[cfg(test)]
#[path = "../tests/unit/band.rs"]
mod tests;
