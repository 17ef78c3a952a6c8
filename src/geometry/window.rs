//! Destination-to-source window arithmetic.
//!
//! A source relates a rectangle of its contributor (source space) to a rectangle of the composed
//! band (destination space) through an independent per-axis scale and offset. Fractional edges
//! become integer pixel edges only through [`round_edge`].

use crate::foundation::core::{PixelWindow, Point, Rect};
use crate::foundation::error::{VirtbandError, VirtbandResult};
use crate::foundation::math::{EDGE_EPSILON, round_edge};

/// Declared source/destination rectangles of a source.
///
/// `None` stands for the full extent of the respective raster.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SourceWindow {
    /// Window in contributor pixel space.
    pub src: Option<Rect>,
    /// Window in composed band pixel space.
    pub dst: Option<Rect>,
}

impl SourceWindow {
    /// Both rectangles at full extent.
    pub fn full() -> Self {
        Self::default()
    }

    /// Explicit source and destination rectangles given as `(x_off, y_off, x_size, y_size)`.
    pub fn new(src: [f64; 4], dst: [f64; 4]) -> Self {
        Self {
            src: Some(rect_from_off_size(src)),
            dst: Some(rect_from_off_size(dst)),
        }
    }

    /// Replace the source rectangle.
    pub fn with_src(mut self, src: [f64; 4]) -> Self {
        self.src = Some(rect_from_off_size(src));
        self
    }

    /// Replace the destination rectangle.
    pub fn with_dst(mut self, dst: [f64; 4]) -> Self {
        self.dst = Some(rect_from_off_size(dst));
        self
    }
}

/// Build a rectangle from `[x_off, y_off, x_size, y_size]`.
pub fn rect_from_off_size(v: [f64; 4]) -> Rect {
    Rect::new(v[0], v[1], v[0] + v[2], v[1] + v[3])
}

/// Express a rectangle as `[x_off, y_off, x_size, y_size]`.
pub fn rect_to_off_size(r: Rect) -> [f64; 4] {
    [r.x0, r.y0, r.width(), r.height()]
}

fn is_degenerate(r: Rect) -> bool {
    !(r.width() > 0.0 && r.height() > 0.0) || !r.x0.is_finite() || !r.y0.is_finite()
}

/// Intersection with positive area, if any.
pub fn overlap(a: Rect, b: Rect) -> Option<Rect> {
    let r = a.intersect(b);
    (r.width() > 0.0 && r.height() > 0.0).then_some(r)
}

/// Return `true` when `outer` contains every point of `inner`.
pub fn contains_rect(outer: Rect, inner: Rect) -> bool {
    outer.x0 <= inner.x0 && outer.y0 <= inner.y0 && outer.x1 >= inner.x1 && outer.y1 >= inner.y1
}

/// Band read request: a band-space window delivered into a `buf_width × buf_height` buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandRequest {
    /// Requested window in band pixels.
    pub window: PixelWindow,
    /// Buffer width in pixels.
    pub buf_width: u32,
    /// Buffer height in pixels.
    pub buf_height: u32,
}

impl BandRequest {
    /// Request whose buffer has the size of the window.
    pub fn unscaled(window: PixelWindow) -> Self {
        Self {
            window,
            buf_width: window.x_size,
            buf_height: window.y_size,
        }
    }

    /// Return `true` when the buffer size equals the window size.
    pub fn is_unscaled(&self) -> bool {
        self.buf_width == self.window.x_size && self.buf_height == self.window.y_size
    }

    fn check(&self) -> VirtbandResult<()> {
        if self.window.is_empty() || self.buf_width == 0 || self.buf_height == 0 {
            return Err(VirtbandError::geometry(format!(
                "degenerate request ({},{},{},{}) into {}x{} buffer",
                self.window.x_off,
                self.window.y_off,
                self.window.x_size,
                self.window.y_size,
                self.buf_width,
                self.buf_height
            )));
        }
        Ok(())
    }
}

/// Outcome of resolving a request against one source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClippedWindow {
    /// Part of the request served by this source, in band space.
    pub dst: Rect,
    /// Fractional source window matching the integer output window, clamped to the contributor.
    pub src: Rect,
    /// Integer source window covering `src`.
    pub read: PixelWindow,
    /// Integer window written in the caller's buffer.
    pub out: PixelWindow,
}

/// Resolved per-axis affine between a source rectangle and a destination rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowMapper {
    src: Rect,
    dst: Rect,
}

impl WindowMapper {
    /// Mapper between two non-degenerate rectangles.
    pub fn new(src: Rect, dst: Rect) -> VirtbandResult<Self> {
        if is_degenerate(src) || is_degenerate(dst) {
            return Err(VirtbandError::geometry(format!(
                "degenerate window: src {:?}, dst {:?}",
                rect_to_off_size(src),
                rect_to_off_size(dst)
            )));
        }
        Ok(Self { src, dst })
    }

    /// Fill full-extent sentinels from the contributor and band sizes, then build the mapper.
    pub fn from_declared(
        window: &SourceWindow,
        contributor_size: (u32, u32),
        band_size: (u32, u32),
    ) -> VirtbandResult<Self> {
        let src = window.src.unwrap_or_else(|| {
            PixelWindow::full(contributor_size.0, contributor_size.1).to_rect()
        });
        let dst = window
            .dst
            .unwrap_or_else(|| PixelWindow::full(band_size.0, band_size.1).to_rect());
        Self::new(src, dst)
    }

    /// Source rectangle.
    pub fn src(&self) -> Rect {
        self.src
    }

    /// Destination rectangle.
    pub fn dst(&self) -> Rect {
        self.dst
    }

    /// Source pixels per destination pixel, per axis.
    pub fn scale(&self) -> (f64, f64) {
        (
            self.src.width() / self.dst.width(),
            self.src.height() / self.dst.height(),
        )
    }

    /// Map a destination point into source space.
    pub fn to_source(&self, p: Point) -> Point {
        let (sx, sy) = self.scale();
        Point::new(
            (p.x - self.dst.x0) * sx + self.src.x0,
            (p.y - self.dst.y0) * sy + self.src.y0,
        )
    }

    /// Map a source point into destination space.
    pub fn to_destination(&self, p: Point) -> Point {
        let (sx, sy) = self.scale();
        Point::new(
            (p.x - self.src.x0) / sx + self.dst.x0,
            (p.y - self.src.y0) / sy + self.dst.y0,
        )
    }

    /// Map a destination rectangle into source space.
    pub fn rect_to_source(&self, r: Rect) -> Rect {
        Rect::from_points(self.to_source(r.origin()), self.to_source(Point::new(r.x1, r.y1)))
    }

    /// Map a source rectangle into destination space.
    pub fn rect_to_destination(&self, r: Rect) -> Rect {
        Rect::from_points(
            self.to_destination(r.origin()),
            self.to_destination(Point::new(r.x1, r.y1)),
        )
    }

    /// Destination footprint actually backed by contributor pixels.
    ///
    /// Parts of the declared source window outside the contributor raster produce no pixels.
    pub fn effective_dst(&self, contributor_size: (u32, u32)) -> Option<Rect> {
        let raster = PixelWindow::full(contributor_size.0, contributor_size.1).to_rect();
        self.clip_to_raster(self.dst, raster)
    }

    /// Shrink destination rectangle `dst` to the part whose source lies inside `raster`.
    ///
    /// Only the edges the raster actually cuts are mapped back from source space; an edge whose
    /// mapped position overshoots the raster by less than [`EDGE_EPSILON`] keeps its destination
    /// value, so edges shared with a neighbouring source stay bit-identical.
    fn clip_to_raster(&self, dst: Rect, raster: Rect) -> Option<Rect> {
        let mapped = self.rect_to_source(dst);
        let src = overlap(mapped, raster)?;
        let back = self.rect_to_destination(src);
        let low = |m: f64, r: f64, b: f64, d: f64| if m < r - EDGE_EPSILON { b } else { d };
        let high = |m: f64, r: f64, b: f64, d: f64| if m > r + EDGE_EPSILON { b } else { d };
        let clipped = Rect::new(
            low(mapped.x0, raster.x0, back.x0, dst.x0),
            low(mapped.y0, raster.y0, back.y0, dst.y0),
            high(mapped.x1, raster.x1, back.x1, dst.x1),
            high(mapped.y1, raster.y1, back.y1, dst.y1),
        );
        overlap(clipped, dst)
    }

    /// Clip `request` against the destination rectangle and the contributor raster.
    ///
    /// Returns `Ok(None)` when this source contributes no buffer pixel to the request.
    pub fn resolve(
        &self,
        request: &BandRequest,
        contributor_size: (u32, u32),
    ) -> VirtbandResult<Option<ClippedWindow>> {
        request.check()?;
        let req = request.window.to_rect();
        let Some(dst) = overlap(req, self.dst) else {
            return Ok(None);
        };
        let raster = PixelWindow::full(contributor_size.0, contributor_size.1).to_rect();
        let Some(dst) = self.clip_to_raster(dst, raster) else {
            return Ok(None);
        };

        // Band space to buffer space.
        let bx = f64::from(request.buf_width) / req.width();
        let by = f64::from(request.buf_height) / req.height();
        let out_x0 = clamp_edge(round_edge((dst.x0 - req.x0) * bx), request.buf_width);
        let out_x1 = clamp_edge(round_edge((dst.x1 - req.x0) * bx), request.buf_width);
        let out_y0 = clamp_edge(round_edge((dst.y0 - req.y0) * by), request.buf_height);
        let out_y1 = clamp_edge(round_edge((dst.y1 - req.y0) * by), request.buf_height);
        if out_x1 <= out_x0 || out_y1 <= out_y0 {
            return Ok(None);
        }
        let out = PixelWindow::new(out_x0, out_y0, out_x1 - out_x0, out_y1 - out_y0);

        // Source window matching the rounded output pixels.
        let snapped = Rect::new(
            req.x0 + f64::from(out_x0) / bx,
            req.y0 + f64::from(out_y0) / by,
            req.x0 + f64::from(out_x1) / bx,
            req.y0 + f64::from(out_y1) / by,
        );
        let Some(src) = overlap(self.rect_to_source(snapped), raster) else {
            return Ok(None);
        };
        let read = integer_window(src, contributor_size);

        Ok(Some(ClippedWindow {
            dst: snapped,
            src,
            read,
            out,
        }))
    }
}

fn clamp_edge(v: i64, max: u32) -> u32 {
    v.clamp(0, i64::from(max)) as u32
}

/// Integer window covering `r`, clamped to the raster and at least one pixel wide.
fn integer_window(r: Rect, size: (u32, u32)) -> PixelWindow {
    let axis = |lo: f64, hi: f64, max: u32| {
        let mut a = clamp_edge(round_edge(lo), max);
        let mut b = clamp_edge(round_edge(hi), max);
        if b <= a {
            if a >= max {
                a = max.saturating_sub(1);
            }
            b = a + 1;
        }
        (a, b - a)
    };
    let (x, w) = axis(r.x0, r.x1, size.0);
    let (y, h) = axis(r.y0, r.y1, size.1);
    PixelWindow::new(x, y, w, h)
}

/// A window grown by a filter radius, clipped to raster bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaddedWindow {
    /// Padded window in raster space.
    pub outer: PixelWindow,
    /// Original window relative to `outer`.
    pub inner: PixelWindow,
}

/// Grow `window` by `radius` pixels in every direction without leaving `bounds`.
pub fn pad_window(
    window: PixelWindow,
    radius: u32,
    bounds: (u32, u32),
) -> VirtbandResult<PaddedWindow> {
    window.check_within(bounds.0, bounds.1)?;
    let x0 = window.x_off.saturating_sub(radius);
    let y0 = window.y_off.saturating_sub(radius);
    let x1 = (window.x_end() + u64::from(radius)).min(u64::from(bounds.0)) as u32;
    let y1 = (window.y_end() + u64::from(radius)).min(u64::from(bounds.1)) as u32;
    Ok(PaddedWindow {
        outer: PixelWindow::new(x0, y0, x1 - x0, y1 - y0),
        inner: PixelWindow::new(
            window.x_off - x0,
            window.y_off - y0,
            window.x_size,
            window.y_size,
        ),
    })
}

#[cfg(test)]
#[path = "../../tests/unit/geometry/window.rs"]
mod tests;
